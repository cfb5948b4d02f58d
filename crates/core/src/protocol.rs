// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! DDP wire messages.
//!
//! Every message is a JSON object tagged by its `msg` field. Payload values
//! (method params and results, document fields) are carried in their EJSON
//! wire form and decoded by the engine's [`Codec`](crate::Codec).

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value as Json};

use crate::error::{Error, Result};

/// Protocol versions understood by this client, preferred first.
pub const SUPPORTED_VERSIONS: &[&str] = &["1", "pre2", "pre1"];

/// Messages sent from client to server.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "msg", rename_all = "camelCase")]
pub enum ClientMessage {
    /// Handshake. Always the first message on a fresh transport.
    Connect {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        session: Option<String>,
        version: String,
        support: Vec<String>,
    },

    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    /// Remote method call, answered by `result` and `updated`.
    Method {
        id: String,
        method: String,
        #[serde(default)]
        params: Vec<Json>,
        #[serde(rename = "randomSeed", default, skip_serializing_if = "Option::is_none")]
        random_seed: Option<Json>,
    },

    Sub {
        id: String,
        name: String,
        #[serde(default)]
        params: Vec<Json>,
    },

    Unsub {
        id: String,
    },
}

/// Messages sent from server to client.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(tag = "msg", rename_all = "camelCase")]
pub enum ServerMessage {
    Connected {
        session: String,
    },

    /// Handshake rejected; `version` is the server's suggestion.
    Failed {
        version: String,
    },

    Ping {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    Pong {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        id: Option<String>,
    },

    Result {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        result: Option<Json>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<MethodError>,
    },

    /// All writes of the listed methods are now reflected in `added`/`changed`.
    Updated {
        methods: Vec<String>,
    },

    Ready {
        subs: Vec<String>,
    },

    Nosub {
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        error: Option<MethodError>,
    },

    Added {
        collection: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Map<String, Json>>,
    },

    AddedBefore {
        collection: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Map<String, Json>>,
        #[serde(default)]
        before: Option<String>,
    },

    Changed {
        collection: String,
        id: String,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        fields: Option<Map<String, Json>>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        cleared: Option<Vec<String>>,
    },

    MovedBefore {
        collection: String,
        id: String,
        #[serde(default)]
        before: Option<String>,
    },

    Removed {
        collection: String,
        id: String,
    },

    /// Protocol-level error; the connection stays open.
    Error {
        reason: String,
        #[serde(rename = "offendingMessage", default, skip_serializing_if = "Option::is_none")]
        offending_message: Option<Json>,
    },
}

/// Normalized error handed to callers of methods and resources.
///
/// This is also the shape of the `error` field of `result` and `nosub`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize, thiserror::Error)]
#[error("{}", self.describe())]
pub struct MethodError {
    /// Error code. Numeric codes from the server are kept as text.
    #[serde(deserialize_with = "code_as_string")]
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub details: Option<Json>,
}

impl MethodError {
    pub const CONNECTION_LOST: &'static str = "ConnectionLost";
    pub const CANCELED: &'static str = "Canceled";
    pub const HANDSHAKE_FAILED: &'static str = "HandshakeFailed";
    pub const INVALID_RESULT: &'static str = "InvalidResult";

    pub fn new(error: impl Into<String>, reason: impl Into<String>) -> Self {
        MethodError { error: error.into(), reason: Some(reason.into()), details: None }
    }

    /// The connection dropped while the call was in `state`.
    pub fn connection_lost(state: &str) -> Self {
        MethodError {
            error: Self::CONNECTION_LOST.to_string(),
            reason: Some("connection lost before the call completed".to_string()),
            details: Some(serde_json::json!({ "state": state })),
        }
    }

    pub fn canceled() -> Self {
        MethodError::new(Self::CANCELED, "call was canceled")
    }

    pub fn handshake_failed(version: &str) -> Self {
        MethodError {
            error: Self::HANDSHAKE_FAILED.to_string(),
            reason: Some("server does not support any offered protocol version".to_string()),
            details: Some(serde_json::json!({ "suggested": version })),
        }
    }

    pub fn is_connection_lost(&self) -> bool {
        self.error == Self::CONNECTION_LOST
    }

    pub fn is_canceled(&self) -> bool {
        self.error == Self::CANCELED
    }

    fn describe(&self) -> String {
        match &self.reason {
            Some(reason) => format!("{} [{}]", reason, self.error),
            None => format!("[{}]", self.error),
        }
    }
}

fn code_as_string<'de, D>(deserializer: D) -> std::result::Result<String, D::Error>
where
    D: Deserializer<'de>,
{
    match Json::deserialize(deserializer)? {
        Json::String(s) => Ok(s),
        Json::Null => Ok(String::new()),
        other => Ok(other.to_string()),
    }
}

impl ClientMessage {
    /// Creates the handshake message.
    pub fn connect(version: impl Into<String>, support: &[String], session: Option<String>) -> Self {
        ClientMessage::Connect { session, version: version.into(), support: support.to_vec() }
    }

    pub fn ping(id: Option<String>) -> Self {
        ClientMessage::Ping { id }
    }

    pub fn pong(id: Option<String>) -> Self {
        ClientMessage::Pong { id }
    }

    pub fn method(id: impl Into<String>, method: impl Into<String>, params: Vec<Json>) -> Self {
        ClientMessage::Method { id: id.into(), method: method.into(), params, random_seed: None }
    }

    pub fn sub(id: impl Into<String>, name: impl Into<String>, params: Vec<Json>) -> Self {
        ClientMessage::Sub { id: id.into(), name: name.into(), params }
    }

    pub fn unsub(id: impl Into<String>) -> Self {
        ClientMessage::Unsub { id: id.into() }
    }

    /// The `msg` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ClientMessage::Connect { .. } => "connect",
            ClientMessage::Ping { .. } => "ping",
            ClientMessage::Pong { .. } => "pong",
            ClientMessage::Method { .. } => "method",
            ClientMessage::Sub { .. } => "sub",
            ClientMessage::Unsub { .. } => "unsub",
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }
}

impl ServerMessage {
    pub fn connected(session: impl Into<String>) -> Self {
        ServerMessage::Connected { session: session.into() }
    }

    pub fn result(id: impl Into<String>, result: Json) -> Self {
        ServerMessage::Result { id: id.into(), result: Some(result), error: None }
    }

    pub fn result_error(id: impl Into<String>, error: MethodError) -> Self {
        ServerMessage::Result { id: id.into(), result: None, error: Some(error) }
    }

    pub fn updated(methods: &[&str]) -> Self {
        ServerMessage::Updated { methods: methods.iter().map(|m| m.to_string()).collect() }
    }

    pub fn ready(subs: &[&str]) -> Self {
        ServerMessage::Ready { subs: subs.iter().map(|s| s.to_string()).collect() }
    }

    /// The `msg` tag.
    pub fn kind(&self) -> &'static str {
        match self {
            ServerMessage::Connected { .. } => "connected",
            ServerMessage::Failed { .. } => "failed",
            ServerMessage::Ping { .. } => "ping",
            ServerMessage::Pong { .. } => "pong",
            ServerMessage::Result { .. } => "result",
            ServerMessage::Updated { .. } => "updated",
            ServerMessage::Ready { .. } => "ready",
            ServerMessage::Nosub { .. } => "nosub",
            ServerMessage::Added { .. } => "added",
            ServerMessage::AddedBefore { .. } => "addedBefore",
            ServerMessage::Changed { .. } => "changed",
            ServerMessage::MovedBefore { .. } => "movedBefore",
            ServerMessage::Removed { .. } => "removed",
            ServerMessage::Error { .. } => "error",
        }
    }

    /// Serializes the message to JSON.
    pub fn to_json(&self) -> std::result::Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }

    /// Deserializes the message from JSON.
    pub fn from_json(s: &str) -> std::result::Result<Self, serde_json::Error> {
        serde_json::from_str(s)
    }

    /// Parses one inbound frame.
    ///
    /// Returns `Ok(None)` for frames that carry no protocol message, such as
    /// the `server_id` greeting. Anything else that is not a known message is
    /// a [`Error::Protocol`].
    pub fn parse_frame(text: &str) -> Result<Option<Self>> {
        let json: Json = serde_json::from_str(text)
            .map_err(|e| Error::Protocol(format!("malformed frame: {e}")))?;
        let Json::Object(ref map) = json else {
            return Err(Error::Protocol(format!("expected an object, got {json}")));
        };
        if !map.contains_key("msg") {
            if map.contains_key("server_id") {
                return Ok(None);
            }
            return Err(Error::Protocol(format!("missing msg field in {json}")));
        }
        serde_json::from_value(json)
            .map(Some)
            .map_err(|e| Error::Protocol(format!("unrecognized message: {e}")))
    }
}

#[cfg(test)]
#[path = "protocol_tests.rs"]
mod tests;
