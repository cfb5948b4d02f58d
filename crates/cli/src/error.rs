// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

use thiserror::Error;

use ddp_client::MethodError;

/// Errors surfaced by the `ddp` binary.
#[derive(Debug, Error)]
pub enum Error {
    #[error("no endpoint configured\n  hint: pass --endpoint or set `endpoint` in ddp.toml")]
    NoEndpoint,

    #[error("config error: {0}")]
    Config(String),

    #[error("failed to parse config: {0}")]
    Toml(#[from] toml::de::Error),

    #[error("invalid params '{input}': {reason}\n  hint: each param is one JSON value, e.g. '\"text\"' or '{{\"a\":1}}'")]
    InvalidParams { input: String, reason: String },

    #[error("handshake failed: server suggests protocol version {0}")]
    HandshakeFailed(String),

    #[error("method failed: {0}")]
    Method(#[from] MethodError),

    #[error("subscription {name} failed: {reason}")]
    Subscription { name: String, reason: String },

    #[error("transport driver stopped")]
    DriverStopped,

    #[error("codec error: {0}")]
    Codec(#[from] ddp_core::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
