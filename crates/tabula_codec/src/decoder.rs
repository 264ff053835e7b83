//! Serde decoder reading attribute trees.

use crate::error::{CodecError, CodecResult};
use crate::value::{AttributeValue, Attributes};
use serde::de::DeserializeOwned;
use serde_json::{Map, Number, Value as JsonValue};

/// Decodes attribute trees into serde values.
///
/// Sets decode as sequences, so a `Vec<String>` or `BTreeSet<String>` field
/// can be read from a string set attribute.
#[derive(Debug, Clone, Default)]
pub struct AttributeDecoder {
    _private: (),
}

impl AttributeDecoder {
    /// Creates a new decoder.
    pub fn new() -> Self {
        Self { _private: () }
    }

    /// Decodes an attribute tree into a value.
    pub fn decode<T: DeserializeOwned>(&self, value: AttributeValue) -> CodecResult<T> {
        let json = Self::convert(value)?;
        serde_json::from_value(json).map_err(|e| CodecError::decoding_failed(e.to_string()))
    }

    /// Decodes a top-level attribute map into a value.
    pub fn decode_attributes<T: DeserializeOwned>(&self, attributes: Attributes) -> CodecResult<T> {
        self.decode(AttributeValue::M(attributes))
    }

    fn convert(value: AttributeValue) -> CodecResult<JsonValue> {
        Ok(match value {
            AttributeValue::Null => JsonValue::Null,
            AttributeValue::Bool(b) => JsonValue::Bool(b),
            AttributeValue::S(s) => JsonValue::String(s),
            AttributeValue::N(n) => JsonValue::Number(parse_number(&n)?),
            AttributeValue::B(bytes) => binary(bytes),
            AttributeValue::SS(items) => {
                JsonValue::Array(items.into_iter().map(JsonValue::String).collect())
            }
            AttributeValue::NS(items) => JsonValue::Array(
                items
                    .iter()
                    .map(|n| parse_number(n).map(JsonValue::Number))
                    .collect::<CodecResult<_>>()?,
            ),
            AttributeValue::BS(items) => JsonValue::Array(items.into_iter().map(binary).collect()),
            AttributeValue::L(items) => JsonValue::Array(
                items
                    .into_iter()
                    .map(Self::convert)
                    .collect::<CodecResult<_>>()?,
            ),
            AttributeValue::M(fields) => {
                let mut map = Map::with_capacity(fields.len());
                for (name, value) in fields {
                    map.insert(name, Self::convert(value)?);
                }
                JsonValue::Object(map)
            }
        })
    }
}

fn binary(bytes: Vec<u8>) -> JsonValue {
    JsonValue::Array(bytes.into_iter().map(|b| JsonValue::from(b)).collect())
}

fn parse_number(text: &str) -> CodecResult<Number> {
    let invalid = || CodecError::InvalidNumber {
        value: text.to_string(),
    };
    if let Ok(n) = text.parse::<i64>() {
        return Ok(Number::from(n));
    }
    if let Ok(n) = text.parse::<u64>() {
        return Ok(Number::from(n));
    }
    text.parse::<f64>()
        .ok()
        .and_then(Number::from_f64)
        .ok_or_else(invalid)
}
