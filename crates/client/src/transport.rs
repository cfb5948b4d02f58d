// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Transport abstraction.
//!
//! The engine does no I/O itself. A [`TransportFactory`] opens one
//! [`Transport`] per connection; whatever drives the socket reports what
//! happened back through [`Engine::handle_transport_event`](crate::Engine::handle_transport_event).
//! This keeps real sockets in the driver and lets tests use mocks.

/// Error type for transport operations.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// Connection failed.
    #[error("connection failed: {0}")]
    ConnectionFailed(String),

    /// Connection closed.
    #[error("connection closed")]
    ConnectionClosed,

    /// Send failed.
    #[error("send failed: {0}")]
    SendFailed(String),
}

/// Result type for transport operations.
pub type TransportResult<T> = Result<T, TransportError>;

/// One bidirectional message channel.
pub trait Transport: Send {
    /// Queues one text frame for delivery.
    fn send(&mut self, frame: String) -> TransportResult<()>;

    /// Closes the channel. The driver still reports [`TransportEvent::Close`].
    fn close(&mut self);
}

/// Opens transports on behalf of the connection manager.
pub trait TransportFactory: Send {
    /// Starts opening `endpoint` for `connection`.
    ///
    /// The returned transport may not be usable until the driver reports
    /// [`TransportEvent::Open`].
    fn open(&mut self, connection: &str, endpoint: &str) -> TransportResult<Box<dyn Transport>>;
}

/// What happened on a transport.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TransportEvent {
    Open,
    Message(String),
    Close,
}
