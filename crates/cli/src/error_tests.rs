// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

#[parameterized(
    no_endpoint = { Error::NoEndpoint, "hint: pass --endpoint" },
    handshake = { Error::HandshakeFailed("pre1".into()), "suggests protocol version pre1" },
    params = { Error::InvalidParams { input: "{".into(), reason: "eof".into() }, "invalid params '{'" },
    method = { Error::Method(MethodError::new("404", "not found")), "method failed" },
)]
fn error_messages(error: Error, expected: &str) {
    let message = error.to_string();
    assert!(message.contains(expected), "{message:?} should contain {expected:?}");
}
