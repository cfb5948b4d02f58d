// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

#[parameterized(
    open_from_disconnected = { ConnectionState::Disconnected, ConnectionEvent::TransportOpened, ConnectionState::Connecting },
    accepted = { ConnectionState::Connecting, ConnectionEvent::HandshakeAccepted, ConnectionState::Connected },
    accepted_twice = { ConnectionState::Connected, ConnectionEvent::HandshakeAccepted, ConnectionState::Connected },
    accepted_without_open = { ConnectionState::Disconnected, ConnectionEvent::HandshakeAccepted, ConnectionState::Disconnected },
    rejected = { ConnectionState::Connecting, ConnectionEvent::HandshakeRejected, ConnectionState::Disconnected },
    closed = { ConnectionState::Connected, ConnectionEvent::TransportClosed, ConnectionState::Disconnected },
)]
fn connection_transitions(from: ConnectionState, event: ConnectionEvent, to: ConnectionState) {
    assert_eq!(from.transition(event), to);
}

#[test]
fn find_matches_by_deep_equal_params() {
    let mut table = ConnectionTable::new();
    table.insert(Connection::new(
        "c1",
        "ws://a/websocket",
        Value::from(json!({ "x": 1, "y": [1, 2] })),
    ));

    let same = Value::from(json!({ "y": [1, 2], "x": 1 }));
    assert_eq!(table.find("ws://a/websocket", &same), Some("c1"));
    assert_eq!(table.find("ws://b/websocket", &same), None);
    assert_eq!(table.find("ws://a/websocket", &Value::from(json!({ "x": 2 }))), None);
}

#[test]
fn apply_reports_only_changes() {
    let mut conn = Connection::new("c1", "ws://a", Value::Null);
    assert_eq!(conn.apply(ConnectionEvent::TransportOpened), Some(ConnectionState::Connecting));
    assert_eq!(conn.apply(ConnectionEvent::TransportOpened), None);
    assert_eq!(conn.apply(ConnectionEvent::HandshakeAccepted), Some(ConnectionState::Connected));
    assert!(conn.is_connected());
    // no transport attached
    assert!(!conn.can_send());
}
