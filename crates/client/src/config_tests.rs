// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;

#[test]
fn empty_object_uses_defaults() {
    let config: EngineConfig = serde_json::from_str("{}").unwrap();
    assert_eq!(config, EngineConfig::default());
    assert_eq!(config.reconnect_delay(), Duration::from_secs(5));
    assert_eq!(config.connection_close_delay(), Duration::from_secs(30));
    assert_eq!(config.supported_versions, vec!["1", "pre2", "pre1"]);
}

#[test]
fn partial_override_keeps_other_defaults() {
    let config: EngineConfig =
        serde_json::from_str(r#"{"reconnect_delay_ms":10000,"priorities":{"query":5}}"#).unwrap();
    assert_eq!(config.reconnect_delay_ms, 10_000);
    assert_eq!(config.priorities.query, 5);
    assert_eq!(config.priorities.login, Priorities::default().login);
    assert_eq!(config.flush_debounce_ms, 10);
}

#[test]
fn default_priorities_order() {
    let p = Priorities::default();
    assert!(p.login > p.method);
    assert!(p.method > p.keepalive);
    assert!(p.keepalive > p.subscribe);
}
