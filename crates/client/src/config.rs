// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Engine configuration.
//!
//! Every field has a default, so an empty table deserializes to
//! [`EngineConfig::default`]. Durations are plain millisecond integers.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use ddp_core::protocol::SUPPORTED_VERSIONS;

use crate::queue::Priority;

/// Tunables for one [`Engine`](crate::Engine).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Delay before re-opening a connection that dropped unexpectedly.
    ///
    /// Fixed: there is no backoff growth between attempts.
    pub reconnect_delay_ms: u64,
    /// Grace period before closing a connection with no users.
    pub connection_close_delay_ms: u64,
    /// Idle time before an unused subscription is deleted.
    pub subscription_cleanup_delay_ms: u64,
    /// Idle time before an unused query resource is deleted.
    pub resource_cleanup_delay_ms: u64,
    /// Debounce applied to collection flushes after a mutation.
    pub flush_debounce_ms: u64,
    /// Version proposed in the handshake.
    pub protocol_version: String,
    /// Versions advertised in the handshake.
    pub supported_versions: Vec<String>,
    pub priorities: Priorities,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            reconnect_delay_ms: 5_000,
            connection_close_delay_ms: 30_000,
            subscription_cleanup_delay_ms: 30_000,
            resource_cleanup_delay_ms: 30_000,
            flush_debounce_ms: 10,
            protocol_version: SUPPORTED_VERSIONS[0].to_string(),
            supported_versions: SUPPORTED_VERSIONS.iter().map(|v| v.to_string()).collect(),
            priorities: Priorities::default(),
        }
    }
}

impl EngineConfig {
    pub fn reconnect_delay(&self) -> Duration {
        Duration::from_millis(self.reconnect_delay_ms)
    }

    pub fn connection_close_delay(&self) -> Duration {
        Duration::from_millis(self.connection_close_delay_ms)
    }

    pub fn subscription_cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.subscription_cleanup_delay_ms)
    }

    pub fn resource_cleanup_delay(&self) -> Duration {
        Duration::from_millis(self.resource_cleanup_delay_ms)
    }

    pub fn flush_debounce(&self) -> Duration {
        Duration::from_millis(self.flush_debounce_ms)
    }
}

/// Default priority per outbound command kind.
///
/// Higher values are sent first and hold back lower ones while awaiting
/// acknowledgement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct Priorities {
    pub login: Priority,
    pub method: Priority,
    pub keepalive: Priority,
    pub unsubscribe: Priority,
    pub subscribe: Priority,
    pub query: Priority,
}

impl Default for Priorities {
    fn default() -> Self {
        Priorities { login: 1_000, method: 100, keepalive: 50, unsubscribe: 10, subscribe: 0, query: 0 }
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
