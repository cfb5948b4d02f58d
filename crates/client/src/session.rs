// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Login state and resume tokens.

use std::collections::HashMap;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

use ddp_core::Value;

/// Persistent key/value storage for resume tokens.
pub trait TokenStorage: Send {
    fn get(&self, key: &str) -> Option<String>;
    fn set(&mut self, key: &str, value: &str);
    fn del(&mut self, key: &str);
}

/// Token storage that lives as long as the engine.
#[derive(Debug, Default, Clone)]
pub struct MemoryTokenStorage {
    tokens: HashMap<String, String>,
}

impl MemoryTokenStorage {
    pub fn new() -> Self {
        Self::default()
    }

    /// Storage pre-seeded with one token.
    pub fn with_token(key: impl Into<String>, token: impl Into<String>) -> Self {
        let mut storage = Self::new();
        storage.tokens.insert(key.into(), token.into());
        storage
    }
}

impl TokenStorage for MemoryTokenStorage {
    fn get(&self, key: &str) -> Option<String> {
        self.tokens.get(key).cloned()
    }

    fn set(&mut self, key: &str, value: &str) {
        self.tokens.insert(key.to_string(), value.to_string());
    }

    fn del(&mut self, key: &str) {
        self.tokens.remove(key);
    }
}

/// Storage key of the resume token for `endpoint`.
pub fn resume_key(endpoint: &str) -> String {
    format!("resume:{endpoint}")
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum LoginState {
    LoggedOut,
    LoggingIn,
    LoggedIn { user_id: String },
}

/// What a successful `login` returns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoginResult {
    pub user_id: String,
    pub token: String,
}

impl LoginResult {
    /// Reads `{id, token}` from a login method result.
    pub fn from_value(value: &Value) -> Option<Self> {
        Some(LoginResult {
            user_id: value.get("id")?.as_str()?.to_string(),
            token: value.get("token")?.as_str()?.to_string(),
        })
    }
}

/// Login state per connection.
#[derive(Debug, Default)]
pub struct Sessions {
    states: IndexMap<String, LoginState>,
}

impl Sessions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, connection: &str) -> LoginState {
        self.states.get(connection).cloned().unwrap_or(LoginState::LoggedOut)
    }

    /// Records a new state. Returns false if it was already current.
    pub fn set(&mut self, connection: &str, state: LoginState) -> bool {
        if self.get(connection) == state {
            return false;
        }
        tracing::debug!(connection = %connection, state = ?state, "login state");
        self.states.insert(connection.to_string(), state);
        true
    }

    pub fn remove(&mut self, connection: &str) {
        self.states.shift_remove(connection);
    }
}

#[cfg(test)]
#[path = "session_tests.rs"]
mod tests;
