// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Remote method tracking.
//!
//! A call settles once both its `result` and its `updated` confirmation
//! have arrived, in either order. The caller holds a [`MethodHandle`]; the
//! engine keeps the sending half in a table keyed by method id.

use std::future::Future;
use std::pin::Pin;
use std::task::{Context, Poll};

use indexmap::IndexMap;
use tokio::sync::oneshot;

use ddp_core::{MethodError, Value};

use crate::collection::Entities;
use crate::queue::Priority;

/// Outcome delivered to the caller of a method.
pub type MethodResult = Result<Value, MethodError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodState {
    /// Held by flow control, or waiting for a reconnect to retry.
    Queued,
    Pending,
    /// Server-side writes are visible, result not yet received.
    Updated,
    /// Result received, writes not yet confirmed.
    Returned,
    /// Both halves observed; the record is settled and removed.
    Completed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MethodEvent {
    Sent,
    Updated,
    Returned,
}

impl MethodState {
    pub fn transition(self, event: MethodEvent) -> Self {
        use MethodEvent as E;
        use MethodState::*;
        match (self, event) {
            (Queued, E::Sent) => Pending,
            (Pending, E::Updated) => Updated,
            (Pending, E::Returned) => Returned,
            (Updated, E::Returned) | (Returned, E::Updated) => Completed,
            (state, _) => state,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            MethodState::Queued => "queued",
            MethodState::Pending => "pending",
            MethodState::Updated => "updated",
            MethodState::Returned => "returned",
            MethodState::Completed => "completed",
        }
    }
}

/// Where the outcome of a method goes.
#[derive(Debug)]
pub enum Reply {
    Caller(oneshot::Sender<MethodResult>),
    /// Fetch of a query resource.
    Resource(String),
    Login { resume: bool, caller: Option<oneshot::Sender<MethodResult>> },
    Logout { caller: oneshot::Sender<MethodResult> },
}

impl Reply {
    /// Calls that the engine re-issues on its own after a reconnect.
    pub(crate) fn is_internal(&self) -> bool {
        matches!(self, Reply::Resource(_) | Reply::Login { resume: true, .. })
    }
}

/// One outstanding remote call.
#[derive(Debug)]
pub struct MethodRecord {
    pub id: String,
    pub name: String,
    pub params: Vec<Value>,
    pub connection_id: String,
    pub state: MethodState,
    pub priority: Priority,
    /// Re-issue after a reconnect instead of failing.
    pub retry: bool,
    /// Overlay the result's entities into the collection store.
    pub overlay: bool,
    pub outcome: Option<MethodResult>,
    pub(crate) awaiting_retry: bool,
    pub(crate) overlay_entities: Option<Entities>,
    pub(crate) reply: Reply,
}

impl MethodRecord {
    pub fn new(
        id: impl Into<String>,
        name: impl Into<String>,
        params: Vec<Value>,
        connection_id: impl Into<String>,
        priority: Priority,
        reply: Reply,
    ) -> Self {
        MethodRecord {
            id: id.into(),
            name: name.into(),
            params,
            connection_id: connection_id.into(),
            state: MethodState::Queued,
            priority,
            retry: false,
            overlay: false,
            outcome: None,
            awaiting_retry: false,
            overlay_entities: None,
            reply,
        }
    }

    pub fn with_retry(mut self, retry: bool) -> Self {
        self.retry = retry;
        self
    }

    pub fn with_overlay(mut self, overlay: bool) -> Self {
        self.overlay = overlay;
        self
    }
}

/// Future side of a method call.
///
/// Resolves with the server result or a [`MethodError`]. If the engine is
/// dropped before settling the call, it resolves with the canceled error.
#[derive(Debug)]
pub struct MethodHandle {
    id: String,
    receiver: oneshot::Receiver<MethodResult>,
}

impl MethodHandle {
    /// Creates a handle together with its sending half.
    pub fn channel(id: impl Into<String>) -> (oneshot::Sender<MethodResult>, Self) {
        let (sender, receiver) = oneshot::channel();
        (sender, MethodHandle { id: id.into(), receiver })
    }

    /// A handle that is already settled.
    pub fn settled(id: impl Into<String>, outcome: MethodResult) -> Self {
        let (sender, handle) = Self::channel(id);
        let _ = sender.send(outcome);
        handle
    }

    /// Id of the first attempt. Retries after a reconnect use fresh ids.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the outcome if the call has settled, without waiting.
    pub fn try_result(&mut self) -> Option<MethodResult> {
        match self.receiver.try_recv() {
            Ok(outcome) => Some(outcome),
            Err(oneshot::error::TryRecvError::Empty) => None,
            Err(oneshot::error::TryRecvError::Closed) => Some(Err(MethodError::canceled())),
        }
    }
}

impl Future for MethodHandle {
    type Output = MethodResult;

    fn poll(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Self::Output> {
        Pin::new(&mut self.receiver)
            .poll(cx)
            .map(|received| received.unwrap_or_else(|_| Err(MethodError::canceled())))
    }
}

#[derive(Debug, Default)]
pub struct MethodTable {
    methods: IndexMap<String, MethodRecord>,
}

impl MethodTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, record: MethodRecord) {
        self.methods.insert(record.id.clone(), record);
    }

    /// Applies an event; returns the new state.
    pub fn apply(&mut self, id: &str, event: MethodEvent) -> Option<MethodState> {
        let record = self.methods.get_mut(id)?;
        let next = record.state.transition(event);
        if next != record.state {
            tracing::debug!(method = %id, from = ?record.state, to = ?next, "method state");
            record.state = next;
        }
        Some(next)
    }

    /// Ids of every call bound to `connection`, in call order.
    pub fn on_connection(&self, connection: &str) -> Vec<String> {
        self.methods
            .values()
            .filter(|m| m.connection_id == connection)
            .map(|m| m.id.clone())
            .collect()
    }

    /// Calls on `connection` waiting to be re-issued.
    pub fn awaiting_retry(&self, connection: &str) -> Vec<String> {
        self.methods
            .values()
            .filter(|m| m.connection_id == connection && m.awaiting_retry)
            .map(|m| m.id.clone())
            .collect()
    }

    pub fn get(&self, id: &str) -> Option<&MethodRecord> {
        self.methods.get(id)
    }

    pub fn get_mut(&mut self, id: &str) -> Option<&mut MethodRecord> {
        self.methods.get_mut(id)
    }

    pub fn remove(&mut self, id: &str) -> Option<MethodRecord> {
        self.methods.shift_remove(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.methods.contains_key(id)
    }

    pub fn len(&self) -> usize {
        self.methods.len()
    }

    pub fn is_empty(&self) -> bool {
        self.methods.is_empty()
    }
}

#[cfg(test)]
#[path = "method_tests.rs"]
mod tests;
