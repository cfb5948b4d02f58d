// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Engine events, interceptors, and notifications.
//!
//! Every input to the engine becomes an [`Event`]. Interceptors see each
//! event in registration order and may pass it on, replace it, or drop it
//! before the engine reduces it into state.

use serde_json::{Map, Value as Json};

use ddp_core::{Codec, MethodError, ServerMessage, Value};

use crate::collection::{Document, Entities};
use crate::connection::ConnectionState;
use crate::method::MethodResult;
use crate::queue::QueuedCommand;
use crate::resource::ResourceKind;
use crate::session::LoginState;
use crate::timer::TimerTask;
use crate::transport::TransportEvent;

#[derive(Debug, Clone)]
pub enum Event {
    /// Outbound command headed for the queue.
    Send { connection: String, command: QueuedCommand },
    /// Raw transport activity reported by the driver.
    Transport { connection: String, event: TransportEvent },
    /// A classified inbound message.
    Inbound { connection: String, message: Inbound },
    Timer(TimerTask),
}

/// Inbound message with payloads decoded.
#[derive(Debug, Clone, PartialEq)]
pub enum Inbound {
    Connected { session: String },
    Failed { version: String },
    Ping { id: Option<String> },
    Pong { id: Option<String> },
    Result { id: String, outcome: MethodResult },
    Updated { methods: Vec<String> },
    Ready { subs: Vec<String> },
    NoSub { id: String, error: Option<MethodError> },
    Added { collection: String, id: String, fields: Document },
    Changed { collection: String, id: String, fields: Document, cleared: Vec<String> },
    Removed { collection: String, id: String },
    /// Accepted but without effect on the store.
    Ignored { kind: &'static str },
    ProtocolError { reason: String },
}

/// Maps a wire message to its internal event.
pub fn classify(message: ServerMessage, codec: &Codec) -> Inbound {
    match message {
        ServerMessage::Connected { session } => Inbound::Connected { session },
        ServerMessage::Failed { version } => Inbound::Failed { version },
        ServerMessage::Ping { id } => Inbound::Ping { id },
        ServerMessage::Pong { id } => Inbound::Pong { id },
        ServerMessage::Result { id, result, error } => {
            let outcome = match (error, result) {
                (Some(error), _) => Err(error),
                (None, Some(result)) => match codec.decode(&result) {
                    Ok(value) => Ok(value),
                    Err(e) => Err(MethodError::new(MethodError::INVALID_RESULT, format!("result {id}: {e}"))),
                },
                (None, None) => Ok(Value::Null),
            };
            Inbound::Result { id, outcome }
        }
        ServerMessage::Updated { methods } => Inbound::Updated { methods },
        ServerMessage::Ready { subs } => Inbound::Ready { subs },
        ServerMessage::Nosub { id, error } => Inbound::NoSub { id, error },
        ServerMessage::Added { collection, id, fields }
        | ServerMessage::AddedBefore { collection, id, fields, .. } => {
            match decode_fields(codec, fields) {
                Ok(fields) => Inbound::Added { collection, id, fields },
                Err(reason) => Inbound::ProtocolError { reason },
            }
        }
        ServerMessage::Changed { collection, id, fields, cleared } => {
            match decode_fields(codec, fields) {
                Ok(fields) => {
                    Inbound::Changed { collection, id, fields, cleared: cleared.unwrap_or_default() }
                }
                Err(reason) => Inbound::ProtocolError { reason },
            }
        }
        ServerMessage::MovedBefore { .. } => Inbound::Ignored { kind: "movedBefore" },
        ServerMessage::Removed { collection, id } => Inbound::Removed { collection, id },
        ServerMessage::Error { reason, .. } => Inbound::ProtocolError { reason },
    }
}

fn decode_fields(codec: &Codec, fields: Option<Map<String, Json>>) -> Result<Document, String> {
    let Some(fields) = fields else {
        return Ok(Document::new());
    };
    match codec.decode(&Json::Object(fields)) {
        Ok(Value::Object(doc)) => Ok(doc),
        Ok(other) => Err(format!("fields decoded to a non-object: {other:?}")),
        Err(e) => Err(format!("undecodable fields: {e}")),
    }
}

/// Sees every event before the engine reduces it.
pub trait Interceptor: Send {
    /// Returns the event to pass on, or `None` to drop it.
    fn intercept(&mut self, event: Event) -> Option<Event>;
}

impl<F> Interceptor for F
where
    F: FnMut(Event) -> Option<Event> + Send,
{
    fn intercept(&mut self, event: Event) -> Option<Event> {
        self(event)
    }
}

/// Something the embedder may want to react to.
#[derive(Debug, Clone, PartialEq)]
pub enum Notification {
    ConnectionStateChanged { connection: String, state: ConnectionState },
    HandshakeFailed { connection: String, suggested: String },
    ResourceReady { kind: ResourceKind, id: String },
    ResourceFailed { kind: ResourceKind, id: String, error: Option<MethodError> },
    /// An idle resource was deleted along with the entities it contributed.
    /// Subscriptions carry `entities: None`: their documents live in the
    /// connection snapshot and go away on `removed` or when the connection
    /// closes.
    ResourceDeleted { kind: ResourceKind, id: String, entities: Option<Entities> },
    MethodUpdated { id: String },
    CollectionsFlushed { collections: Vec<String> },
    LoginStateChanged { connection: String, state: LoginState },
    ProtocolError { connection: String, reason: String },
}

#[cfg(test)]
#[path = "event_tests.rs"]
mod tests;
