// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

#![allow(clippy::unwrap_used)]

use super::*;
use serde_json::json;
use yare::parameterized;

#[derive(Debug)]
struct Point {
    x: f64,
    y: f64,
}

impl CustomType for Point {
    fn type_name(&self) -> &str {
        "point"
    }

    fn to_json_value(&self) -> Value {
        Value::from(json!({ "x": self.x, "y": self.y }))
    }

    fn clone_custom(&self) -> Option<Arc<dyn CustomType>> {
        Some(Arc::new(Point { x: self.x, y: self.y }))
    }
}

fn point_registry() -> TypeRegistry {
    let mut registry = TypeRegistry::new();
    registry
        .add_type("point", |value: Value| {
            let x = value.get("x").and_then(Value::as_f64);
            let y = value.get("y").and_then(Value::as_f64);
            match (x, y) {
                (Some(x), Some(y)) => Ok(Arc::new(Point { x, y }) as Arc<dyn CustomType>),
                _ => Err(Error::CustomTypeFactory {
                    name: "point".into(),
                    reason: "expected numeric x and y".into(),
                }),
            }
        })
        .unwrap();
    registry
}

fn date(millis: i64) -> Value {
    Value::Date(DateTime::from_timestamp_millis(millis).unwrap())
}

#[parameterized(
    a_date = { date(1_700_000_000_123) },
    regexp = { Value::RegExp { source: "^a+$".into(), flags: "gi".into() } },
    nan = { Value::Number(f64::NAN) },
    infinity = { Value::Number(f64::INFINITY) },
    neg_infinity = { Value::Number(f64::NEG_INFINITY) },
    binary = { Value::Binary(vec![0, 1, 2, 254, 255]) },
    reserved_looking = { Value::from(json!({ "nested": { "$date": 5 } })) },
    reserved_looking_pair = { Value::from(json!({ "$type": "point", "$value": 1 })) },
    escape_looking = { Value::from(json!({ "$escape": { "$date": 1 } })) },
    float = { Value::Number(1.5) },
)]
fn decode_inverts_encode(value: Value) {
    let codec = Codec::default();
    let decoded = codec.decode(&codec.encode(&value)).unwrap();
    assert_eq!(decoded, value);
}

#[test]
fn encode_wire_shapes() {
    let codec = Codec::default();
    assert_eq!(codec.encode(&date(42)), json!({ "$date": 42 }));
    assert_eq!(codec.encode(&Value::Number(f64::NAN)), json!({ "$InfNaN": 0 }));
    assert_eq!(codec.encode(&Value::Number(f64::NEG_INFINITY)), json!({ "$InfNaN": -1 }));
    assert_eq!(codec.encode(&Value::Binary(b"hi".to_vec())), json!({ "$binary": "aGk=" }));
    assert_eq!(codec.encode(&Value::Number(5.0)), json!(5));
}

#[test]
fn reserved_looking_object_is_escaped_one_level() {
    let codec = Codec::default();
    let value = Value::from(json!({ "$date": "not a date" }));
    assert_eq!(codec.encode(&value), json!({ "$escape": { "$date": "not a date" } }));
}

#[test]
fn escaped_fields_are_still_decoded() {
    let codec = Codec::default();
    let decoded = codec.decode(&json!({ "$escape": { "$binary": { "$date": 7 } } })).unwrap();
    let inner = decoded.get("$binary").unwrap();
    assert_eq!(*inner, date(7));
}

#[test]
fn custom_type_roundtrip() {
    let codec = Codec::new(point_registry());
    let value = Value::Custom(Arc::new(Point { x: 1.0, y: 2.0 }));
    let json = codec.encode(&value);
    assert_eq!(json, json!({ "$type": "point", "$value": { "x": 1, "y": 2 } }));
    assert_eq!(codec.decode(&json).unwrap(), value);
}

#[test]
fn custom_type_unknown_fails() {
    let codec = Codec::default();
    let err = codec.decode(&json!({ "$type": "point", "$value": {} })).unwrap_err();
    assert!(matches!(err, Error::UnknownCustomType(name) if name == "point"));
}

#[test]
fn custom_type_reregistration_fails() {
    let mut registry = point_registry();
    let err = registry
        .add_type("point", |_| Err(Error::Protocol("unused".into())))
        .unwrap_err();
    assert!(matches!(err, Error::DuplicateCustomType(_)));
}

#[test]
fn registries_are_independent() {
    let with_point = Codec::new(point_registry());
    let without = Codec::default();
    assert!(with_point.registry().has_type("point"));
    assert!(!without.registry().has_type("point"));
}

#[parameterized(
    nan = { Value::Number(f64::NAN), Value::Number(f64::NAN), true },
    numbers = { Value::Number(1.0), Value::Number(2.0), false },
    dates = { date(10), date(10), true },
    dates_differ = { date(10), date(11), false },
    binary = { Value::Binary(vec![1, 2]), Value::Binary(vec![1, 2]), true },
    binary_differ = { Value::Binary(vec![1, 2]), Value::Binary(vec![1]), false },
    date_vs_number = { date(10), Value::Number(10.0), false },
    arrays = { Value::from(json!([1, [2, 3]])), Value::from(json!([1, [2, 3]])), true },
    objects_any_order = { Value::from(json!({ "a": 1, "b": 2 })), Value::from(json!({ "b": 2, "a": 1 })), true },
    objects_extra_key = { Value::from(json!({ "a": 1 })), Value::from(json!({ "a": 1, "b": 2 })), false },
)]
fn equals_cases(a: Value, b: Value, expected: bool) {
    assert_eq!(equals(&a, &b, EqualsOptions::default()), expected);
}

#[test]
fn equals_key_order_sensitive() {
    let a = Value::from(json!({ "a": 1, "b": 2 }));
    let b = Value::from(json!({ "b": 2, "a": 1 }));
    let options = EqualsOptions { key_order_sensitive: true };
    assert!(!equals(&a, &b, options));
    assert!(equals(&a, &a.clone(), options));
}

#[test]
fn clone_uses_custom_clone() {
    let original = Arc::new(Point { x: 3.0, y: 4.0 });
    let value = Value::Custom(original.clone());
    let cloned = value.deep_clone();
    let Value::Custom(custom) = &cloned else {
        unreachable!("expected custom value, got {cloned:?}");
    };
    let original_ptr = Arc::as_ptr(&original) as *const u8;
    let cloned_ptr = Arc::as_ptr(custom) as *const u8;
    assert_ne!(original_ptr, cloned_ptr);
    assert_eq!(cloned, value);
}

#[test]
fn stringify_canonical_sorts_keys() {
    let codec = Codec::default();
    let value = Value::from(json!({ "b": 1, "a": { "d": 2, "c": 3 } }));
    let canonical = StringifyOptions { canonical: true, ..Default::default() };
    assert_eq!(codec.stringify(&value, canonical).unwrap(), r#"{"a":{"c":3,"d":2},"b":1}"#);
    assert_eq!(
        codec.stringify(&value, StringifyOptions::default()).unwrap(),
        r#"{"b":1,"a":{"d":2,"c":3}}"#
    );
}

#[test]
fn parse_decodes_extended_types() {
    let codec = Codec::default();
    let value = codec.parse(r#"{"when":{"$date":1000},"n":{"$InfNaN":1}}"#).unwrap();
    assert_eq!(value.get("when"), Some(&date(1000)));
    assert_eq!(value.get("n").and_then(Value::as_f64), Some(f64::INFINITY));
}

#[test]
fn parse_rejects_bad_date() {
    let codec = Codec::default();
    assert!(matches!(codec.parse(r#"{"$date":"soon"}"#), Err(Error::InvalidDate(_))));
}
