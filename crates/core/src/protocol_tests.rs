// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

#[parameterized(
    connect = { ClientMessage::connect("1", &["1".to_string(), "pre2".to_string()], None), "connect" },
    ping = { ClientMessage::ping(Some("7".into())), "ping" },
    method = { ClientMessage::method("m1", "inc", vec![json!(1)]), "method" },
    sub = { ClientMessage::sub("s1", "feed", vec![json!([1, 2, 3])]), "sub" },
    unsub = { ClientMessage::unsub("s1"), "unsub" },
)]
fn client_message_tagged_by_msg(msg: ClientMessage, tag: &str) {
    let json = msg.to_json().unwrap();
    assert!(json.contains(&format!("\"msg\":\"{tag}\"")));
    assert_eq!(msg.kind(), tag);
    assert_eq!(ClientMessage::from_json(&json).unwrap(), msg);
}

#[test]
fn method_message_wire_format() {
    let msg = ClientMessage::method("m1", "inc", vec![json!({ "by": 2 })]);
    let json: Json = serde_json::from_str(&msg.to_json().unwrap()).unwrap();
    assert_eq!(
        json,
        json!({ "msg": "method", "id": "m1", "method": "inc", "params": [{ "by": 2 }] })
    );
}

#[parameterized(
    connected = { r#"{"msg":"connected","session":"abc"}"#, "connected" },
    failed = { r#"{"msg":"failed","version":"pre1"}"#, "failed" },
    result = { r#"{"msg":"result","id":"m1","result":5}"#, "result" },
    updated = { r#"{"msg":"updated","methods":["m1"]}"#, "updated" },
    ready = { r#"{"msg":"ready","subs":["s1"]}"#, "ready" },
    nosub = { r#"{"msg":"nosub","id":"s1"}"#, "nosub" },
    added = { r#"{"msg":"added","collection":"col","id":"1","fields":{"a":1}}"#, "added" },
    added_before = { r#"{"msg":"addedBefore","collection":"col","id":"1","before":null}"#, "addedBefore" },
    changed = { r#"{"msg":"changed","collection":"col","id":"1","cleared":["a"]}"#, "changed" },
    moved_before = { r#"{"msg":"movedBefore","collection":"col","id":"1"}"#, "movedBefore" },
    removed = { r#"{"msg":"removed","collection":"col","id":"1"}"#, "removed" },
    ping = { r#"{"msg":"ping","id":"x"}"#, "ping" },
    error = { r#"{"msg":"error","reason":"bad"}"#, "error" },
)]
fn parse_frame_classifies(text: &str, kind: &str) {
    let msg = ServerMessage::parse_frame(text).unwrap().unwrap();
    assert_eq!(msg.kind(), kind);
}

#[test]
fn parse_frame_ignores_server_id() {
    assert!(ServerMessage::parse_frame(r#"{"server_id":"0"}"#).unwrap().is_none());
}

#[parameterized(
    not_json = { "{nope" },
    not_object = { "[1,2]" },
    missing_msg = { r#"{"id":"1"}"# },
    unknown_msg = { r#"{"msg":"teleport"}"# },
    missing_field = { r#"{"msg":"result"}"# },
)]
fn parse_frame_rejects(text: &str) {
    assert!(matches!(ServerMessage::parse_frame(text), Err(Error::Protocol(_))));
}

#[test]
fn result_error_normalizes_numeric_code() {
    let text = r#"{"msg":"result","id":"m1","error":{"error":403,"reason":"denied","errorType":"Meteor.Error"}}"#;
    let Some(ServerMessage::Result { error: Some(error), .. }) =
        ServerMessage::parse_frame(text).unwrap()
    else {
        unreachable!("expected result with error");
    };
    assert_eq!(error.error, "403");
    assert_eq!(error.reason.as_deref(), Some("denied"));
    assert_eq!(error.to_string(), "denied [403]");
}

#[test]
fn method_error_constructors() {
    let lost = MethodError::connection_lost("pending");
    assert!(lost.is_connection_lost());
    assert_eq!(lost.details, Some(json!({ "state": "pending" })));
    assert!(MethodError::canceled().is_canceled());
    assert_eq!(MethodError::handshake_failed("pre1").error, MethodError::HANDSHAKE_FAILED);
}

#[test]
fn server_message_roundtrip() {
    let msg = ServerMessage::result_error("m2", MethodError::new("500", "boom"));
    let parsed = ServerMessage::from_json(&msg.to_json().unwrap()).unwrap();
    assert_eq!(parsed, msg);
}
