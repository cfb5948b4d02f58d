// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Connection table and per-connection handshake state.
//!
//! Connections are shared: opening the same endpoint with codec-equal
//! params returns the existing connection and bumps its user count.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use ddp_core::ejson::{equals, EqualsOptions};
use ddp_core::Value;

use crate::queue::OutboundQueue;
use crate::timer::TimerId;
use crate::transport::Transport;

/// Handshake state of one connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ConnectionState {
    Disconnected,
    /// Transport is open and the handshake has been sent.
    Connecting,
    Connected,
}

/// Inputs to [`ConnectionState::transition`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConnectionEvent {
    TransportOpened,
    HandshakeAccepted,
    HandshakeRejected,
    TransportClosed,
}

impl ConnectionState {
    pub fn transition(self, event: ConnectionEvent) -> Self {
        use ConnectionEvent as E;
        match (self, event) {
            (_, E::TransportOpened) => ConnectionState::Connecting,
            (ConnectionState::Connecting, E::HandshakeAccepted) => ConnectionState::Connected,
            (_, E::HandshakeRejected) | (_, E::TransportClosed) => ConnectionState::Disconnected,
            (state, E::HandshakeAccepted) => state,
        }
    }
}

/// One logical connection to an endpoint.
pub struct Connection {
    pub id: String,
    pub endpoint: String,
    pub params: Value,
    pub state: ConnectionState,
    /// Number of logical users holding this connection open.
    pub users: u32,
    /// Session id from the last `connected`.
    pub session: Option<String>,
    pub(crate) transport: Option<Box<dyn Transport>>,
    pub(crate) queue: OutboundQueue,
    pub(crate) close_timer: Option<TimerId>,
    pub(crate) reconnect_timer: Option<TimerId>,
    /// Set when the server rejected every offered protocol version.
    pub(crate) handshake_failed: bool,
}

impl Connection {
    pub fn new(id: impl Into<String>, endpoint: impl Into<String>, params: Value) -> Self {
        Connection {
            id: id.into(),
            endpoint: endpoint.into(),
            params,
            state: ConnectionState::Disconnected,
            users: 1,
            session: None,
            transport: None,
            queue: OutboundQueue::new(),
            close_timer: None,
            reconnect_timer: None,
            handshake_failed: false,
        }
    }

    /// Applies an event; returns the new state if it changed.
    pub(crate) fn apply(&mut self, event: ConnectionEvent) -> Option<ConnectionState> {
        let next = self.state.transition(event);
        if next == self.state {
            return None;
        }
        tracing::debug!(connection = %self.id, from = ?self.state, to = ?next, "connection state");
        self.state = next;
        Some(next)
    }

    pub fn is_connected(&self) -> bool {
        self.state == ConnectionState::Connected
    }

    /// Commands can only be released after the handshake completed.
    pub(crate) fn can_send(&self) -> bool {
        self.is_connected() && self.transport.is_some()
    }

    pub fn queue(&self) -> &OutboundQueue {
        &self.queue
    }

    pub(crate) fn matches(&self, endpoint: &str, params: &Value) -> bool {
        self.endpoint == endpoint && equals(&self.params, params, EqualsOptions::default())
    }
}

impl std::fmt::Debug for Connection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Connection")
            .field("id", &self.id)
            .field("endpoint", &self.endpoint)
            .field("state", &self.state)
            .field("users", &self.users)
            .field("queued", &self.queue.len())
            .field("pending", &self.queue.pending_len())
            .finish()
    }
}

#[derive(Debug, Default)]
pub struct ConnectionTable {
    connections: IndexMap<String, Connection>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Finds a connection to `endpoint` whose params are codec-equal.
    pub fn find(&self, endpoint: &str, params: &Value) -> Option<&str> {
        self.connections.values().find(|c| c.matches(endpoint, params)).map(|c| c.id.as_str())
    }

    pub fn insert(&mut self, connection: Connection) {
        self.connections.insert(connection.id.clone(), connection);
    }

    pub fn get(&self, id: &str) -> Option<&Connection> {
        self.connections.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut Connection> {
        self.connections.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<Connection> {
        self.connections.shift_remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.connections.contains_key(id)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Connection> {
        self.connections.values()
    }

    pub fn len(&self) -> usize {
        self.connections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.connections.is_empty()
    }
}

#[cfg(test)]
#[path = "connection_tests.rs"]
mod tests;
