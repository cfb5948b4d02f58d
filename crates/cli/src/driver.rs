// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Runs an [`Engine`] on tokio.
//!
//! Each turn waits for either the next transport event or the next timer
//! deadline, feeds it to the engine, then fires due timers.

use std::io::Write;
use std::time::Duration;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use ddp_client::session::resume_key;
use ddp_client::{
    CallOptions, ClockSource, Codec, Document, Engine, MemoryTokenStorage, Notification, ResourceKind,
    SystemClock, TokenStorage, Value,
};

use crate::config::Config;
use crate::error::{Error, Result};
use crate::ws::{TransportUpdate, WebSocketTransportFactory};

/// How long a turn waits when no timer is scheduled.
const IDLE_WAIT: Duration = Duration::from_secs(60);

pub struct Driver {
    engine: Engine,
    events: mpsc::UnboundedReceiver<TransportUpdate>,
    clock: SystemClock,
}

impl Driver {
    /// Builds an engine over WebSocket transports. Must be called inside
    /// a tokio runtime.
    pub fn new(config: &Config) -> Self {
        let (factory, events) = WebSocketTransportFactory::channel();
        let mut tokens = MemoryTokenStorage::new();
        if let (Some(token), Some(endpoint)) = (&config.resume_token, &config.endpoint) {
            tokens.set(&resume_key(endpoint), token);
        }
        let engine = Engine::builder(factory)
            .config(config.engine.clone())
            .clock(SystemClock)
            .token_storage(tokens)
            .build();
        Driver { engine, events, clock: SystemClock }
    }

    pub fn engine(&mut self) -> &mut Engine {
        &mut self.engine
    }

    /// Waits for one transport event or timer deadline and applies it.
    pub async fn turn(&mut self) -> Result<()> {
        let wait = match self.engine.next_deadline() {
            Some(deadline) => Duration::from_millis(deadline.saturating_sub(self.clock.now_ms())),
            None => IDLE_WAIT,
        };
        tokio::select! {
            update = self.events.recv() => {
                let Some((connection, event)) = update else {
                    return Err(Error::DriverStopped);
                };
                self.engine.handle_transport_event(&connection, event);
            }
            _ = tokio::time::sleep(wait) => {}
        }
        self.engine.run_timers();
        Ok(())
    }

    /// Drains notifications, turning a rejected handshake into an error.
    fn notifications(&mut self) -> Result<Vec<Notification>> {
        let notifications = self.engine.drain_notifications();
        for notification in &notifications {
            match notification {
                Notification::HandshakeFailed { suggested, .. } => {
                    return Err(Error::HandshakeFailed(suggested.clone()));
                }
                Notification::ConnectionStateChanged { connection, state } => {
                    debug!(connection = %connection, state = ?state, "connection state")
                }
                Notification::LoginStateChanged { connection, state } => {
                    info!(connection = %connection, state = ?state, "login state")
                }
                _ => {}
            }
        }
        Ok(notifications)
    }

    /// Calls `method` and waits for it to settle.
    pub async fn call(
        &mut self,
        connection: &str,
        method: &str,
        params: Vec<Value>,
        retry: bool,
    ) -> Result<Value> {
        let options = CallOptions { retry, ..Default::default() };
        let mut handle = self.engine.call(connection, method, params, options);
        loop {
            self.notifications()?;
            if let Some(outcome) = handle.try_result() {
                return Ok(outcome?);
            }
            self.turn().await?;
        }
    }

    /// Subscribes to `name` and writes each flushed document to `out`
    /// until Ctrl-C or the server stops the subscription.
    pub async fn watch<W: Write>(
        &mut self,
        connection: &str,
        name: &str,
        params: Vec<Value>,
        out: &mut W,
    ) -> Result<()> {
        let sub = self.engine.subscribe(connection, name, params);
        loop {
            tokio::select! {
                result = self.turn() => result?,
                _ = tokio::signal::ctrl_c() => {
                    info!(subscription = %sub, "interrupted");
                    self.engine.unsubscribe(&sub);
                    return Ok(());
                }
            }
            for notification in self.notifications()? {
                match notification {
                    Notification::ResourceReady { kind: ResourceKind::Subscription, id } if id == sub => {
                        info!(subscription = %sub, "ready");
                    }
                    Notification::ResourceFailed { kind: ResourceKind::Subscription, id, error } if id == sub => {
                        let reason = error.map_or_else(|| "stopped by server".to_string(), |e| e.to_string());
                        return Err(Error::Subscription { name: name.to_string(), reason });
                    }
                    Notification::CollectionsFlushed { collections } => {
                        for collection in &collections {
                            for doc in self.engine.collections().find(collection) {
                                writeln!(out, "{}", render_document(self.engine.codec(), collection, doc)?)?;
                            }
                        }
                        out.flush()?;
                    }
                    Notification::ProtocolError { reason, .. } => warn!(reason = %reason, "server error"),
                    _ => {}
                }
            }
        }
    }
}

/// Parses command-line params, one JSON value each, as EJSON.
pub fn parse_params(codec: &Codec, inputs: &[String]) -> Result<Vec<Value>> {
    inputs
        .iter()
        .map(|input| {
            let json: serde_json::Value = serde_json::from_str(input)
                .map_err(|e| Error::InvalidParams { input: input.clone(), reason: e.to_string() })?;
            Ok(codec.decode(&json)?)
        })
        .collect()
}

pub fn render_value(codec: &Codec, value: &Value) -> Result<String> {
    Ok(serde_json::to_string(&codec.encode(value))?)
}

/// One output line for a document: `{"collection": ..., "document": ...}`.
pub fn render_document(codec: &Codec, collection: &str, doc: &Document) -> Result<String> {
    let line = serde_json::json!({
        "collection": collection,
        "document": codec.encode(&Value::Object(doc.clone())),
    });
    Ok(serde_json::to_string(&line)?)
}

#[cfg(test)]
#[path = "driver_tests.rs"]
mod tests;
