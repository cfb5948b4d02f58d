// SPDX-License-Identifier: MIT
// Copyright (c) 2026 Alfred Jean LLC

//! Extended JSON (EJSON) value model and codec.
//!
//! EJSON adds a handful of types to plain JSON. Each one travels on the wire
//! as an object with a reserved key shape:
//!
//! | type      | wire shape                          |
//! |-----------|-------------------------------------|
//! | Date      | `{"$date": <millis>}`               |
//! | RegExp    | `{"$regexp": <src>, "$flags": <f>}` |
//! | NaN/±Inf  | `{"$InfNaN": 0 \| 1 \| -1}`         |
//! | Binary    | `{"$binary": <base64>}`             |
//! | escaped   | `{"$escape": {...}}`                |
//! | custom    | `{"$type": <name>, "$value": ...}`  |
//!
//! A plain object that happens to look like one of these shapes is wrapped
//! in `$escape` on encode so it decodes back to a plain object.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use chrono::{DateTime, Utc};
use indexmap::IndexMap;
use serde_json::{Map, Number, Value as Json};

use crate::error::{Error, Result};

/// Field map of an EJSON object. Insertion order is preserved.
pub type Object = IndexMap<String, Value>;

/// Largest integer an f64 represents exactly.
const MAX_SAFE_INTEGER: f64 = 9_007_199_254_740_991.0;

/// An EJSON value.
#[derive(Debug, Clone)]
pub enum Value {
    Null,
    Bool(bool),
    /// All numbers are doubles, including NaN and the infinities.
    Number(f64),
    String(String),
    Array(Vec<Value>),
    Object(Object),
    Date(DateTime<Utc>),
    RegExp { source: String, flags: String },
    Binary(Vec<u8>),
    Custom(Arc<dyn CustomType>),
}

/// A user-defined EJSON type.
///
/// Instances are created from their JSON form by the factory registered
/// under [`CustomType::type_name`] in a [`TypeRegistry`].
pub trait CustomType: fmt::Debug + Send + Sync {
    /// Name used in the `$type` field.
    fn type_name(&self) -> &str;

    /// The value stored in the `$value` field.
    fn to_json_value(&self) -> Value;

    /// Structural equality against another custom value.
    fn equals(&self, other: &dyn CustomType) -> bool {
        self.type_name() == other.type_name()
            && equals(&self.to_json_value(), &other.to_json_value(), EqualsOptions::default())
    }

    /// Type-specific deep copy. `None` shares the existing instance.
    fn clone_custom(&self) -> Option<Arc<dyn CustomType>> {
        None
    }
}

impl Value {
    /// Converts plain JSON without interpreting reserved shapes.
    pub fn from_plain_json(json: Json) -> Self {
        match json {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => Value::Number(n.as_f64().unwrap_or(f64::NAN)),
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Array(items.into_iter().map(Value::from_plain_json).collect()),
            Json::Object(map) => Value::Object(
                map.into_iter().map(|(k, v)| (k, Value::from_plain_json(v))).collect(),
            ),
        }
    }

    /// An empty object.
    pub fn object() -> Self {
        Value::Object(Object::new())
    }

    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    pub fn as_array(&self) -> Option<&Vec<Value>> {
        match self {
            Value::Array(items) => Some(items),
            _ => None,
        }
    }

    pub fn as_object(&self) -> Option<&Object> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    pub fn as_object_mut(&mut self) -> Option<&mut Object> {
        match self {
            Value::Object(map) => Some(map),
            _ => None,
        }
    }

    /// Looks up a field if this is an object.
    pub fn get(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|map| map.get(key))
    }

    /// Deep copy, honoring [`CustomType::clone_custom`].
    pub fn deep_clone(&self) -> Value {
        match self {
            Value::Array(items) => Value::Array(items.iter().map(Value::deep_clone).collect()),
            Value::Object(map) => {
                Value::Object(map.iter().map(|(k, v)| (k.clone(), v.deep_clone())).collect())
            }
            Value::Custom(custom) => {
                Value::Custom(custom.clone_custom().unwrap_or_else(|| Arc::clone(custom)))
            }
            other => other.clone(),
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        equals(self, other, EqualsOptions::default())
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(f64::from(n))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl From<Vec<Value>> for Value {
    fn from(items: Vec<Value>) -> Self {
        Value::Array(items)
    }
}

impl From<Object> for Value {
    fn from(map: Object) -> Self {
        Value::Object(map)
    }
}

impl From<DateTime<Utc>> for Value {
    fn from(date: DateTime<Utc>) -> Self {
        Value::Date(date)
    }
}

impl From<Json> for Value {
    fn from(json: Json) -> Self {
        Value::from_plain_json(json)
    }
}

/// Options for [`equals`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct EqualsOptions {
    /// Objects with the same fields in a different order are unequal.
    pub key_order_sensitive: bool,
}

/// Structural equality.
///
/// NaN equals NaN, dates compare by instant, binaries byte-wise, and
/// objects field-wise (optionally requiring identical key order).
pub fn equals(a: &Value, b: &Value, options: EqualsOptions) -> bool {
    match (a, b) {
        (Value::Null, Value::Null) => true,
        (Value::Bool(x), Value::Bool(y)) => x == y,
        (Value::Number(x), Value::Number(y)) => x == y || (x.is_nan() && y.is_nan()),
        (Value::String(x), Value::String(y)) => x == y,
        (Value::Date(x), Value::Date(y)) => x == y,
        (Value::Binary(x), Value::Binary(y)) => x == y,
        (
            Value::RegExp { source: xs, flags: xf },
            Value::RegExp { source: ys, flags: yf },
        ) => xs == ys && xf == yf,
        (Value::Array(x), Value::Array(y)) => {
            x.len() == y.len() && x.iter().zip(y).all(|(l, r)| equals(l, r, options))
        }
        (Value::Object(x), Value::Object(y)) => {
            if x.len() != y.len() {
                return false;
            }
            if options.key_order_sensitive {
                x.iter()
                    .zip(y)
                    .all(|((lk, lv), (rk, rv))| lk == rk && equals(lv, rv, options))
            } else {
                x.iter().all(|(k, v)| y.get(k).is_some_and(|other| equals(v, other, options)))
            }
        }
        (Value::Custom(x), Value::Custom(y)) => x.equals(y.as_ref()),
        _ => false,
    }
}

/// Constructs a custom value from its decoded `$value`.
pub type Factory = Box<dyn Fn(Value) -> Result<Arc<dyn CustomType>> + Send + Sync>;

/// Name to factory table for custom types.
///
/// Owned by a [`Codec`]; separate engines keep separate registries.
#[derive(Default)]
pub struct TypeRegistry {
    factories: HashMap<String, Factory>,
}

impl TypeRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a factory. Re-registering a name is an error.
    pub fn add_type<F>(&mut self, name: impl Into<String>, factory: F) -> Result<()>
    where
        F: Fn(Value) -> Result<Arc<dyn CustomType>> + Send + Sync + 'static,
    {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::DuplicateCustomType(name));
        }
        self.factories.insert(name, Box::new(factory));
        Ok(())
    }

    pub fn has_type(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }

    fn construct(&self, name: &str, value: Value) -> Result<Arc<dyn CustomType>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::UnknownCustomType(name.to_string()))?;
        factory(value)
    }
}

impl fmt::Debug for TypeRegistry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut names: Vec<&String> = self.factories.keys().collect();
        names.sort();
        f.debug_struct("TypeRegistry").field("types", &names).finish()
    }
}

/// Options for [`Codec::stringify`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StringifyOptions {
    /// Sort object keys recursively.
    pub canonical: bool,
    /// Pretty-print with two-space indentation.
    pub indent: bool,
}

/// Reserved shapes, in the order they are tried on decode.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Shape {
    Date,
    RegExp,
    InfNaN,
    Binary,
    Escape,
    Custom,
}

fn reserved_shape<V>(map: &IndexMap<String, V>) -> Option<Shape> {
    classify_keys(map.len(), |k| map.contains_key(k))
}

fn reserved_json_shape(map: &Map<String, Json>) -> Option<Shape> {
    classify_keys(map.len(), |k| map.contains_key(k))
}

fn classify_keys(len: usize, has: impl Fn(&str) -> bool) -> Option<Shape> {
    match len {
        1 if has("$date") => Some(Shape::Date),
        1 if has("$InfNaN") => Some(Shape::InfNaN),
        1 if has("$binary") => Some(Shape::Binary),
        1 if has("$escape") => Some(Shape::Escape),
        2 if has("$regexp") && has("$flags") => Some(Shape::RegExp),
        2 if has("$type") && has("$value") => Some(Shape::Custom),
        _ => None,
    }
}

/// Encoder/decoder bound to a custom type registry.
#[derive(Debug, Clone, Default)]
pub struct Codec {
    registry: Arc<TypeRegistry>,
}

impl Codec {
    pub fn new(registry: TypeRegistry) -> Self {
        Codec { registry: Arc::new(registry) }
    }

    pub fn registry(&self) -> &TypeRegistry {
        &self.registry
    }

    /// Converts a value into its JSON wire form.
    pub fn encode(&self, value: &Value) -> Json {
        match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(n) => encode_number(*n),
            Value::String(s) => Json::String(s.clone()),
            Value::Array(items) => Json::Array(items.iter().map(|v| self.encode(v)).collect()),
            Value::Object(map) => {
                let fields: Map<String, Json> =
                    map.iter().map(|(k, v)| (k.clone(), self.encode(v))).collect();
                if reserved_shape(map).is_some() {
                    single("$escape", Json::Object(fields))
                } else {
                    Json::Object(fields)
                }
            }
            Value::Date(date) => single("$date", Json::from(date.timestamp_millis())),
            Value::RegExp { source, flags } => {
                let mut map = Map::new();
                map.insert("$regexp".into(), Json::String(source.clone()));
                map.insert("$flags".into(), Json::String(flags.clone()));
                Json::Object(map)
            }
            Value::Binary(bytes) => single("$binary", Json::String(STANDARD.encode(bytes))),
            Value::Custom(custom) => {
                let mut map = Map::new();
                map.insert("$type".into(), Json::String(custom.type_name().to_string()));
                map.insert("$value".into(), self.encode(&custom.to_json_value()));
                Json::Object(map)
            }
        }
    }

    /// Converts a JSON wire form back into a value.
    pub fn decode(&self, json: &Json) -> Result<Value> {
        match json {
            Json::Null => Ok(Value::Null),
            Json::Bool(b) => Ok(Value::Bool(*b)),
            Json::Number(n) => Ok(Value::Number(n.as_f64().unwrap_or(f64::NAN))),
            Json::String(s) => Ok(Value::String(s.clone())),
            Json::Array(items) => {
                Ok(Value::Array(items.iter().map(|v| self.decode(v)).collect::<Result<_>>()?))
            }
            Json::Object(map) => match reserved_json_shape(map) {
                Some(shape) => self.decode_reserved(shape, map),
                None => self.decode_fields(map).map(Value::Object),
            },
        }
    }

    fn decode_fields(&self, map: &Map<String, Json>) -> Result<Object> {
        map.iter().map(|(k, v)| Ok((k.clone(), self.decode(v)?))).collect()
    }

    fn decode_reserved(&self, shape: Shape, map: &Map<String, Json>) -> Result<Value> {
        match shape {
            Shape::Date => {
                let raw = &map["$date"];
                let millis = raw.as_f64().ok_or_else(|| Error::InvalidDate(raw.to_string()))?;
                DateTime::from_timestamp_millis(millis.round() as i64)
                    .map(Value::Date)
                    .ok_or_else(|| Error::InvalidDate(raw.to_string()))
            }
            Shape::RegExp => match (&map["$regexp"], &map["$flags"]) {
                (Json::String(source), Json::String(flags)) => {
                    Ok(Value::RegExp { source: source.clone(), flags: flags.clone() })
                }
                _ => Err(Error::InvalidRegExp(Json::Object(map.clone()).to_string())),
            },
            Shape::InfNaN => {
                let raw = &map["$InfNaN"];
                match raw.as_f64() {
                    Some(sign) if sign > 0.0 => Ok(Value::Number(f64::INFINITY)),
                    Some(sign) if sign < 0.0 => Ok(Value::Number(f64::NEG_INFINITY)),
                    Some(_) => Ok(Value::Number(f64::NAN)),
                    None => Err(Error::InvalidInfNaN(raw.to_string())),
                }
            }
            Shape::Binary => match &map["$binary"] {
                Json::String(b64) => Ok(Value::Binary(STANDARD.decode(b64)?)),
                other => Err(Error::Protocol(format!("$binary must be a string, got {other}"))),
            },
            Shape::Escape => match &map["$escape"] {
                Json::Object(inner) => self.decode_fields(inner).map(Value::Object),
                other => Err(Error::Protocol(format!("$escape must be an object, got {other}"))),
            },
            Shape::Custom => {
                let name = map["$type"]
                    .as_str()
                    .ok_or_else(|| Error::Protocol("$type must be a string".into()))?;
                let value = self.decode(&map["$value"])?;
                self.registry.construct(name, value).map(Value::Custom)
            }
        }
    }

    /// Serializes a value to EJSON text.
    pub fn stringify(&self, value: &Value, options: StringifyOptions) -> Result<String> {
        let mut json = self.encode(value);
        if options.canonical {
            json = canonicalize(json);
        }
        let text = if options.indent {
            serde_json::to_string_pretty(&json)?
        } else {
            serde_json::to_string(&json)?
        };
        Ok(text)
    }

    /// Parses EJSON text.
    pub fn parse(&self, text: &str) -> Result<Value> {
        let json: Json = serde_json::from_str(text)?;
        self.decode(&json)
    }

    /// Deep copy. Equivalent to [`Value::deep_clone`].
    pub fn clone_value(&self, value: &Value) -> Value {
        value.deep_clone()
    }

    /// Structural equality. Equivalent to the free [`equals`].
    pub fn equals(&self, a: &Value, b: &Value, options: EqualsOptions) -> bool {
        equals(a, b, options)
    }
}

fn single(key: &str, value: Json) -> Json {
    let mut map = Map::new();
    map.insert(key.to_string(), value);
    Json::Object(map)
}

fn encode_number(n: f64) -> Json {
    if n.is_nan() {
        return single("$InfNaN", Json::from(0));
    }
    if n.is_infinite() {
        return single("$InfNaN", Json::from(if n > 0.0 { 1 } else { -1 }));
    }
    if n.fract() == 0.0 && n.abs() <= MAX_SAFE_INTEGER {
        return Json::from(n as i64);
    }
    Number::from_f64(n).map(Json::Number).unwrap_or(Json::Null)
}

fn canonicalize(json: Json) -> Json {
    match json {
        Json::Array(items) => Json::Array(items.into_iter().map(canonicalize).collect()),
        Json::Object(map) => {
            let mut entries: Vec<(String, Json)> = map.into_iter().collect();
            entries.sort_by(|a, b| a.0.cmp(&b.0));
            Json::Object(entries.into_iter().map(|(k, v)| (k, canonicalize(v))).collect())
        }
        other => other,
    }
}

#[cfg(test)]
#[path = "ejson_tests.rs"]
mod tests;
