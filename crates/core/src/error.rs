// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Error types for ddp-core operations.

use thiserror::Error;

/// All possible errors that can occur while encoding, decoding or parsing.
#[derive(Debug, Error)]
pub enum Error {
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("invalid $date value: {0}")]
    InvalidDate(String),

    #[error("invalid $binary value: {0}")]
    InvalidBinary(#[from] base64::DecodeError),

    #[error("invalid $InfNaN value: {0}")]
    InvalidInfNaN(String),

    #[error("invalid $regexp value: {0}")]
    InvalidRegExp(String),

    #[error("unknown custom type: '{0}'\n  hint: register it with TypeRegistry::add_type before decoding")]
    UnknownCustomType(String),

    #[error("custom type already registered: '{0}'")]
    DuplicateCustomType(String),

    #[error("custom type '{name}' rejected its value: {reason}")]
    CustomTypeFactory { name: String, reason: String },

    #[error("protocol error: {0}")]
    Protocol(String),
}

/// A specialized Result type for ddp-core operations.
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
#[path = "error_tests.rs"]
mod tests;
