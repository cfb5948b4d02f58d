// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Cancelable deadline table.
//!
//! The engine never sleeps; a driver asks for [`Timers::next_deadline`],
//! waits, and lets the engine pop everything that is due.

use std::collections::{BTreeMap, HashMap};
use std::time::Duration;

/// Handle used to cancel a scheduled task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TimerId(u64);

/// Work performed when a timer fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerTask {
    /// Close a connection nobody uses anymore.
    CloseConnection(String),
    /// Re-open a connection that dropped unexpectedly.
    Reconnect(String),
    /// Delete an idle subscription.
    CleanupSubscription(String),
    /// Delete an idle query resource.
    CleanupResource(String),
    /// Publish pending collection changes.
    Flush,
}

#[derive(Debug, Default)]
pub struct Timers {
    next_id: u64,
    queue: BTreeMap<(u64, TimerId), TimerTask>,
    deadlines: HashMap<TimerId, u64>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedules `task` to fire `delay` after `now_ms`.
    pub fn schedule(&mut self, now_ms: u64, delay: Duration, task: TimerTask) -> TimerId {
        self.next_id += 1;
        let id = TimerId(self.next_id);
        let deadline = now_ms.saturating_add(delay.as_millis() as u64);
        self.queue.insert((deadline, id), task);
        self.deadlines.insert(id, deadline);
        id
    }

    /// Cancels a timer. Returns false if it already fired or was canceled.
    pub fn cancel(&mut self, id: TimerId) -> bool {
        match self.deadlines.remove(&id) {
            Some(deadline) => self.queue.remove(&(deadline, id)).is_some(),
            None => false,
        }
    }

    /// Removes and returns the earliest task due at `now_ms`.
    ///
    /// Tasks with equal deadlines fire in scheduling order.
    pub fn pop_due(&mut self, now_ms: u64) -> Option<(TimerId, TimerTask)> {
        let (&(deadline, id), _) = self.queue.first_key_value()?;
        if deadline > now_ms {
            return None;
        }
        self.deadlines.remove(&id);
        self.queue.remove(&(deadline, id)).map(|task| (id, task))
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.queue.keys().next().map(|(deadline, _)| *deadline)
    }

    pub fn len(&self) -> usize {
        self.queue.len()
    }

    pub fn is_empty(&self) -> bool {
        self.queue.is_empty()
    }
}

#[cfg(test)]
#[path = "timer_tests.rs"]
mod tests;
