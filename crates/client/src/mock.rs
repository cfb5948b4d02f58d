// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! In-memory transport for tests.
//!
//! Nothing is delivered anywhere: sent frames are recorded per connection
//! and the test reports transport events to the engine itself.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use ddp_core::ClientMessage;

use crate::transport::{Transport, TransportError, TransportFactory, TransportResult};

#[derive(Debug, Default)]
struct Recorded {
    sent: HashMap<String, Vec<String>>,
    opened: Vec<String>,
    closed: Vec<String>,
    fail_open: bool,
    fail_send: bool,
}

/// Factory handing out [`MockTransport`]s that share one recorder.
///
/// Clones share the recorder, so a test keeps one clone for inspection.
#[derive(Debug, Default, Clone)]
pub struct MockTransportFactory {
    recorded: Arc<Mutex<Recorded>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, Recorded> {
        self.recorded.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Makes the next opens fail.
    pub fn set_fail_open(&self, fail: bool) {
        self.lock().fail_open = fail;
    }

    /// Makes every send fail.
    pub fn set_fail_send(&self, fail: bool) {
        self.lock().fail_send = fail;
    }

    /// Connection ids in the order their transports were opened.
    pub fn opened(&self) -> Vec<String> {
        self.lock().opened.clone()
    }

    /// Connection ids whose transport the engine closed.
    pub fn closed(&self) -> Vec<String> {
        self.lock().closed.clone()
    }

    /// Raw frames sent on `connection`.
    pub fn frames(&self, connection: &str) -> Vec<String> {
        self.lock().sent.get(connection).cloned().unwrap_or_default()
    }

    /// Messages sent on `connection`, parsed back.
    pub fn sent(&self, connection: &str) -> Vec<ClientMessage> {
        self.frames(connection)
            .iter()
            .filter_map(|frame| ClientMessage::from_json(frame).ok())
            .collect()
    }

    /// Like [`MockTransportFactory::sent`], clearing the record.
    pub fn take_sent(&self, connection: &str) -> Vec<ClientMessage> {
        let frames = self.lock().sent.remove(connection).unwrap_or_default();
        frames.iter().filter_map(|frame| ClientMessage::from_json(frame).ok()).collect()
    }

    /// `msg` tags of the messages sent on `connection`.
    pub fn kinds(&self, connection: &str) -> Vec<&'static str> {
        self.sent(connection).iter().map(ClientMessage::kind).collect()
    }
}

impl TransportFactory for MockTransportFactory {
    fn open(&mut self, connection: &str, _endpoint: &str) -> TransportResult<Box<dyn Transport>> {
        let mut recorded = self.lock();
        if recorded.fail_open {
            return Err(TransportError::ConnectionFailed("mock failure".into()));
        }
        recorded.opened.push(connection.to_string());
        Ok(Box::new(MockTransport {
            connection: connection.to_string(),
            recorded: Arc::clone(&self.recorded),
        }))
    }
}

/// Transport that records what it is asked to send.
#[derive(Debug)]
pub struct MockTransport {
    connection: String,
    recorded: Arc<Mutex<Recorded>>,
}

impl Transport for MockTransport {
    fn send(&mut self, frame: String) -> TransportResult<()> {
        let mut recorded = self.recorded.lock().unwrap_or_else(PoisonError::into_inner);
        if recorded.fail_send {
            return Err(TransportError::SendFailed("mock failure".into()));
        }
        recorded.sent.entry(self.connection.clone()).or_default().push(frame);
        Ok(())
    }

    fn close(&mut self) {
        let mut recorded = self.recorded.lock().unwrap_or_else(PoisonError::into_inner);
        recorded.closed.push(self.connection.clone());
    }
}
