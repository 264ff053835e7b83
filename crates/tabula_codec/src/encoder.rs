//! Serde encoder producing attribute trees.

use crate::error::{CodecError, CodecResult};
use crate::value::{AttributeValue, Attributes};
use serde::Serialize;
use serde_json::Value as JsonValue;

/// Encodes serde values into attribute trees.
///
/// By default `null` map entries (e.g. `Option::None` fields) are omitted,
/// so an absent optional field and a missing attribute look the same to the
/// diff engine.
#[derive(Debug, Clone)]
pub struct AttributeEncoder {
    omit_nulls: bool,
}

impl AttributeEncoder {
    /// Creates an encoder that omits null map entries.
    pub fn new() -> Self {
        Self { omit_nulls: true }
    }

    /// Sets whether null map entries are omitted.
    #[must_use]
    pub fn with_omit_nulls(mut self, omit_nulls: bool) -> Self {
        self.omit_nulls = omit_nulls;
        self
    }

    /// Encodes a value into an attribute tree.
    pub fn encode<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<AttributeValue> {
        let json =
            serde_json::to_value(value).map_err(|e| CodecError::encoding_failed(e.to_string()))?;
        Ok(self.convert(json))
    }

    /// Encodes a value that must serialize as a map (a struct or map type).
    pub fn encode_attributes<T: Serialize + ?Sized>(&self, value: &T) -> CodecResult<Attributes> {
        match self.encode(value)? {
            AttributeValue::M(map) => Ok(map),
            other => Err(CodecError::NotAMap { found: other.kind() }),
        }
    }

    fn convert(&self, json: JsonValue) -> AttributeValue {
        match json {
            JsonValue::Null => AttributeValue::Null,
            JsonValue::Bool(b) => AttributeValue::Bool(b),
            JsonValue::Number(n) => AttributeValue::N(n.to_string()),
            JsonValue::String(s) => AttributeValue::S(s),
            JsonValue::Array(items) => {
                AttributeValue::L(items.into_iter().map(|v| self.convert(v)).collect())
            }
            JsonValue::Object(fields) => AttributeValue::M(
                fields
                    .into_iter()
                    .filter(|(_, v)| !(self.omit_nulls && v.is_null()))
                    .map(|(k, v)| (k, self.convert(v)))
                    .collect(),
            ),
        }
    }
}

impl Default for AttributeEncoder {
    fn default() -> Self {
        Self::new()
    }
}
