// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use yare::parameterized;

#[parameterized(
    unknown_type = { Error::UnknownCustomType("point".into()), "point" },
    duplicate_type = { Error::DuplicateCustomType("point".into()), "already registered" },
    protocol = { Error::Protocol("missing msg".into()), "missing msg" },
    bad_date = { Error::InvalidDate("\"x\"".into()), "$date" },
)]
fn error_display_contains(err: Error, expected: &str) {
    assert!(err.to_string().contains(expected));
}

#[test]
fn error_from_json() {
    let json_err = serde_json::from_str::<()>("invalid").unwrap_err();
    let err: Error = json_err.into();
    assert!(matches!(err, Error::Json(_)));
}

#[test]
fn error_from_base64() {
    use base64::Engine as _;
    let b64_err = base64::engine::general_purpose::STANDARD.decode("!!").unwrap_err();
    let err: Error = b64_err.into();
    assert!(matches!(err, Error::InvalidBinary(_)));
}
