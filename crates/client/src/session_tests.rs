// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;

#[test]
fn memory_storage_get_set_del() {
    let mut storage = MemoryTokenStorage::new();
    assert_eq!(storage.get("k"), None);
    storage.set("k", "v");
    assert_eq!(storage.get("k").as_deref(), Some("v"));
    storage.del("k");
    assert_eq!(storage.get("k"), None);
}

#[test]
fn resume_key_is_per_endpoint() {
    assert_eq!(resume_key("ws://a/websocket"), "resume:ws://a/websocket");
}

#[test]
fn login_result_from_value() {
    let value = Value::from(json!({ "id": "u1", "token": "t1", "tokenExpires": { "$date": 0 } }));
    assert_eq!(
        LoginResult::from_value(&value),
        Some(LoginResult { user_id: "u1".into(), token: "t1".into() })
    );
    assert_eq!(LoginResult::from_value(&Value::from(json!({ "id": "u1" }))), None);
}

#[test]
fn sessions_report_changes_only() {
    let mut sessions = Sessions::new();
    assert_eq!(sessions.get("c1"), LoginState::LoggedOut);
    assert!(!sessions.set("c1", LoginState::LoggedOut));
    assert!(sessions.set("c1", LoginState::LoggingIn));
    assert!(sessions.set("c1", LoginState::LoggedIn { user_id: "u1".into() }));
    assert!(!sessions.set("c1", LoginState::LoggedIn { user_id: "u1".into() }));
    sessions.remove("c1");
    assert_eq!(sessions.get("c1"), LoginState::LoggedOut);
}

#[test]
fn login_state_serializes_tagged() {
    let state = LoginState::LoggedIn { user_id: "u1".into() };
    assert_eq!(
        serde_json::to_value(&state).unwrap(),
        json!({ "state": "logged_in", "user_id": "u1" })
    );
}
