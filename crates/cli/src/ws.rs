// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! WebSocket transport using tokio-tungstenite.
//!
//! Each opened transport runs as one tokio task that owns the socket. The
//! engine hands it frames through an unbounded channel; the task reports
//! open, inbound text, and close on the shared event channel the driver
//! reads.

use futures_util::{SinkExt, StreamExt};
use tokio::sync::mpsc;
use tokio_tungstenite::tungstenite::Message;
use tracing::{debug, info, warn};

use ddp_client::transport::TransportResult;
use ddp_client::{Transport, TransportError, TransportEvent, TransportFactory};

/// Transport activity tagged with its connection id.
pub type TransportUpdate = (String, TransportEvent);

/// Opens one socket task per connection.
///
/// Must be used from inside a tokio runtime.
pub struct WebSocketTransportFactory {
    events: mpsc::UnboundedSender<TransportUpdate>,
}

impl WebSocketTransportFactory {
    /// Returns the factory and the receiving end of its event channel.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<TransportUpdate>) {
        let (events, rx) = mpsc::unbounded_channel();
        (WebSocketTransportFactory { events }, rx)
    }
}

impl TransportFactory for WebSocketTransportFactory {
    fn open(&mut self, connection: &str, endpoint: &str) -> TransportResult<Box<dyn Transport>> {
        let (outbound, frames) = mpsc::unbounded_channel();
        tokio::spawn(run_socket(connection.to_string(), endpoint.to_string(), frames, self.events.clone()));
        Ok(Box::new(WebSocketTransport { outbound: Some(outbound) }))
    }
}

/// Engine-side handle of a socket task.
pub struct WebSocketTransport {
    outbound: Option<mpsc::UnboundedSender<String>>,
}

impl Transport for WebSocketTransport {
    fn send(&mut self, frame: String) -> TransportResult<()> {
        let outbound = self.outbound.as_ref().ok_or(TransportError::ConnectionClosed)?;
        outbound.send(frame).map_err(|e| TransportError::SendFailed(e.to_string()))
    }

    fn close(&mut self) {
        // Dropping the sender ends the writer side of the task.
        self.outbound = None;
    }
}

async fn run_socket(
    connection: String,
    endpoint: String,
    mut frames: mpsc::UnboundedReceiver<String>,
    events: mpsc::UnboundedSender<TransportUpdate>,
) {
    let report = |event: TransportEvent| {
        let _ = events.send((connection.clone(), event));
    };

    let ws = match tokio_tungstenite::connect_async(endpoint.as_str()).await {
        Ok((ws, _)) => ws,
        Err(e) => {
            warn!(connection = %connection, endpoint = %endpoint, error = %e, "connect failed");
            report(TransportEvent::Close);
            return;
        }
    };
    info!(connection = %connection, endpoint = %endpoint, "socket open");
    report(TransportEvent::Open);

    let (mut sink, mut stream) = ws.split();
    loop {
        tokio::select! {
            frame = frames.recv() => match frame {
                Some(frame) => {
                    if let Err(e) = sink.send(Message::Text(frame.into())).await {
                        warn!(connection = %connection, error = %e, "socket send failed");
                        break;
                    }
                }
                None => {
                    debug!(connection = %connection, "closing socket");
                    let _ = sink.close().await;
                    break;
                }
            },
            message = stream.next() => match message {
                Some(Ok(Message::Text(text))) => report(TransportEvent::Message(text.to_string())),
                Some(Ok(Message::Close(_))) | None => {
                    debug!(connection = %connection, "socket closed by server");
                    break;
                }
                Some(Ok(_)) => {}
                Some(Err(e)) => {
                    warn!(connection = %connection, error = %e, "socket receive failed");
                    break;
                }
            },
        }
    }
    report(TransportEvent::Close);
}
