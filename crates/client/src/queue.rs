// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Per-connection outbound queue with priority flow control.
//!
//! Commands that expect an acknowledgement are tracked in a pending set
//! while in flight. The highest pending priority is the connection's
//! threshold: a command is only released once its priority reaches it.
//! Held commands wait in descending priority order, ties in arrival order.

use std::collections::{HashMap, VecDeque};

use ddp_core::ClientMessage;

/// Larger is more urgent.
pub type Priority = i32;

/// An outbound message and how to schedule it.
#[derive(Debug, Clone, PartialEq)]
pub struct QueuedCommand {
    pub message: ClientMessage,
    pub priority: Priority,
    /// Key of the acknowledgement that clears this command once sent.
    pub ack: Option<String>,
}

impl QueuedCommand {
    pub fn new(message: ClientMessage, priority: Priority) -> Self {
        QueuedCommand { message, priority, ack: None }
    }

    /// Method calls wait for their `result`.
    pub fn method(message: ClientMessage, priority: Priority) -> Self {
        let ack = match &message {
            ClientMessage::Method { id, .. } => Some(id.clone()),
            _ => None,
        };
        QueuedCommand { message, priority, ack }
    }

    pub fn with_ack(mut self, ack: impl Into<String>) -> Self {
        self.ack = Some(ack.into());
        self
    }
}

#[derive(Debug, Default)]
pub struct OutboundQueue {
    queued: VecDeque<QueuedCommand>,
    pending: HashMap<String, Priority>,
}

impl OutboundQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Maximum priority awaiting acknowledgement; `None` stands for −∞.
    pub fn threshold(&self) -> Option<Priority> {
        self.pending.values().copied().max()
    }

    /// Whether a command of `priority` may be sent right now.
    pub fn admits(&self, priority: Priority) -> bool {
        self.threshold().is_none_or(|threshold| priority >= threshold)
    }

    /// Holds a command, after every queued command of equal or higher priority.
    pub fn push(&mut self, command: QueuedCommand) {
        let at = self
            .queued
            .iter()
            .position(|queued| queued.priority < command.priority)
            .unwrap_or(self.queued.len());
        self.queued.insert(at, command);
    }

    /// Releases the head command if the threshold admits it.
    pub fn pop_ready(&mut self) -> Option<QueuedCommand> {
        let head = self.queued.front()?;
        if !self.admits(head.priority) {
            return None;
        }
        self.queued.pop_front()
    }

    /// Records a sent command as awaiting acknowledgement.
    pub fn mark_pending(&mut self, ack: impl Into<String>, priority: Priority) {
        self.pending.insert(ack.into(), priority);
    }

    /// Clears an acknowledgement. Returns false if it was not pending.
    pub fn acknowledge(&mut self, ack: &str) -> bool {
        self.pending.remove(ack).is_some()
    }

    /// Forgets everything in flight, e.g. after the transport dropped.
    pub fn clear_pending(&mut self) {
        self.pending.clear();
    }

    /// Drops held commands matching `predicate` and returns them.
    pub fn remove_where<F>(&mut self, predicate: F) -> Vec<QueuedCommand>
    where
        F: Fn(&QueuedCommand) -> bool,
    {
        let (removed, kept): (Vec<QueuedCommand>, Vec<QueuedCommand>) =
            std::mem::take(&mut self.queued).into_iter().partition(predicate);
        self.queued = kept.into();
        removed
    }

    /// Drops every held command.
    pub fn clear(&mut self) -> Vec<QueuedCommand> {
        self.queued.drain(..).collect()
    }

    pub fn iter(&self) -> impl Iterator<Item = &QueuedCommand> {
        self.queued.iter()
    }

    pub fn len(&self) -> usize {
        self.queued.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queued.is_empty()
    }

    pub fn pending_len(&self) -> usize {
        self.pending.len()
    }
}

#[cfg(test)]
#[path = "queue_tests.rs"]
mod tests;
