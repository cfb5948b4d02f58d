// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

fn strings(inputs: &[&str]) -> Vec<String> {
    inputs.iter().map(|s| s.to_string()).collect()
}

#[test]
fn params_are_decoded_as_ejson() {
    let codec = Codec::default();
    let params = parse_params(&codec, &strings(&["\"open\"", "3", r#"{"$date":0}"#])).unwrap();
    assert_eq!(params[0], Value::from("open"));
    assert_eq!(params[1], Value::from(3));
    assert!(matches!(params[2], Value::Date(_)));
}

#[parameterized(
    not_json = { "open" },
    truncated = { "{\"a\":" },
)]
fn bad_params_are_rejected(input: &str) {
    let result = parse_params(&Codec::default(), &strings(&[input]));
    assert!(matches!(result, Err(Error::InvalidParams { .. })));
}

#[test]
fn malformed_ejson_param_is_a_codec_error() {
    let result = parse_params(&Codec::default(), &strings(&[r#"{"$date":"soon"}"#]));
    assert!(matches!(result, Err(Error::Codec(_))));
}

#[test]
fn values_render_as_ejson() {
    let codec = Codec::default();
    let value = Value::Binary(vec![1, 2]);
    assert_eq!(render_value(&codec, &value).unwrap(), r#"{"$binary":"AQI="}"#);
}

#[test]
fn documents_render_with_collection() {
    let codec = Codec::default();
    let Value::Object(doc) = Value::from(json!({ "_id": "1", "n": 2 })) else {
        unreachable!("object expected");
    };
    let line: serde_json::Value = serde_json::from_str(&render_document(&codec, "tasks", &doc).unwrap()).unwrap();
    assert_eq!(line, json!({ "collection": "tasks", "document": { "_id": "1", "n": 2 } }));
}
