// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Client configuration.
//!
//! Read from `--config <path>`, or from `ddp.toml` in the working directory
//! when that file exists:
//! - `endpoint`: WebSocket URL of the server
//! - `resume_token`: token used to resume a login on connect
//! - `[engine]`: engine tunables, see [`EngineConfig`]

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use ddp_client::EngineConfig;

use crate::error::{Error, Result};

pub const CONFIG_FILE_NAME: &str = "ddp.toml";

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Server URL, e.g. `ws://localhost:3000/websocket`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resume_token: Option<String>,
    #[serde(default)]
    pub engine: EngineConfig,
}

impl Config {
    pub fn load(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| Error::Config(format!("failed to read {}: {}", path.display(), e)))?;
        Ok(toml::from_str(&content)?)
    }

    /// Loads `explicit` if given, else `ddp.toml` in `dir` if present,
    /// else the defaults.
    pub fn discover(explicit: Option<&Path>, dir: &Path) -> Result<Self> {
        if let Some(path) = explicit {
            return Self::load(path);
        }
        let candidate: PathBuf = dir.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Self::load(&candidate);
        }
        Ok(Config::default())
    }

    /// Applies command-line overrides.
    pub fn with_endpoint(mut self, endpoint: Option<String>) -> Self {
        if endpoint.is_some() {
            self.endpoint = endpoint;
        }
        self
    }

    pub fn endpoint(&self) -> Result<&str> {
        self.endpoint.as_deref().ok_or(Error::NoEndpoint)
    }
}

#[cfg(test)]
#[path = "config_tests.rs"]
mod tests;
