//! JSON interop for element trees.
//!
//! JSON carries booleans while the element model does not; they are folded
//! into the 0/1 int convention understood by `query::get::<bool>`.

use serde_json::{Map, Number, Value as JsonValue};
use thiserror::Error;

use crate::{Element, MapType};

/// Errors produced while reading or writing element JSON.
#[derive(Debug, Error)]
pub enum JsonError {
    #[error("element json parse error: {0}")]
    Parse(#[source] serde_json::Error),
    #[error("serialize element json: {0}")]
    Serialize(#[source] serde_json::Error),
}

/// Convert a JSON document into an element tree.
pub fn from_json(value: JsonValue) -> Element {
    match value {
        JsonValue::Null => Element::None,
        JsonValue::Bool(b) => Element::Int(i64::from(b)),
        JsonValue::Number(n) => match n.as_i64() {
            Some(i) => Element::Int(i),
            None => Element::Float(n.as_f64().unwrap_or(f64::NAN)),
        },
        JsonValue::String(s) => Element::String(s),
        JsonValue::Array(items) => Element::List(items.into_iter().map(from_json).collect()),
        JsonValue::Object(obj) => Element::Map(
            obj.into_iter()
                .map(|(k, v)| (k, from_json(v)))
                .collect::<MapType>(),
        ),
    }
}

/// Convert an element tree into JSON. Non-finite floats become `null`.
pub fn to_json(element: &Element) -> JsonValue {
    match element {
        Element::Map(map) => {
            let mut obj = Map::new();
            for (k, v) in map {
                obj.insert(k.clone(), to_json(v));
            }
            JsonValue::Object(obj)
        }
        Element::List(list) => JsonValue::Array(list.iter().map(to_json).collect()),
        Element::Int(i) => JsonValue::Number((*i).into()),
        Element::Float(f) => Number::from_f64(*f)
            .map(JsonValue::Number)
            .unwrap_or(JsonValue::Null),
        Element::String(s) => JsonValue::String(s.clone()),
        Element::None => JsonValue::Null,
    }
}

/// Parse JSON text into an element tree.
pub fn parse_str(text: &str) -> Result<Element, JsonError> {
    let value: JsonValue = serde_json::from_str(text).map_err(JsonError::Parse)?;
    Ok(from_json(value))
}

/// Render an element tree as indented JSON text.
pub fn to_string_pretty(element: &Element) -> Result<String, JsonError> {
    serde_json::to_string_pretty(&to_json(element)).map_err(JsonError::Serialize)
}
