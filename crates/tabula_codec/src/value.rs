//! Dynamic attribute value type.

use std::collections::BTreeMap;

/// The top-level attribute map of a stored item.
///
/// A `BTreeMap` keeps attribute order deterministic, so encoded items and
/// rendered statements are stable across runs.
pub type Attributes = BTreeMap<String, AttributeValue>;

/// A dynamic attribute value.
///
/// This is the tagged union every row is stored as. Numbers are carried as
/// their decimal text so that no precision is lost between the codec and the
/// backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AttributeValue {
    /// String value.
    S(String),
    /// Number value, as decimal text.
    N(String),
    /// Binary value.
    B(Vec<u8>),
    /// Set of strings.
    SS(Vec<String>),
    /// Set of numbers, as decimal text.
    NS(Vec<String>),
    /// Set of binary values.
    BS(Vec<Vec<u8>>),
    /// Map of named attributes.
    M(Attributes),
    /// Ordered list of values.
    L(Vec<AttributeValue>),
    /// Null value.
    Null,
    /// Boolean value.
    Bool(bool),
}

impl AttributeValue {
    /// Creates a map value from name/value pairs.
    pub fn map<K: Into<String>>(pairs: impl IntoIterator<Item = (K, AttributeValue)>) -> Self {
        AttributeValue::M(pairs.into_iter().map(|(k, v)| (k.into(), v)).collect())
    }

    /// Creates a number value from anything that displays as a number.
    pub fn number(n: impl ToString) -> Self {
        AttributeValue::N(n.to_string())
    }

    /// Short name of this value's kind, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            AttributeValue::S(_) => "string",
            AttributeValue::N(_) => "number",
            AttributeValue::B(_) => "binary",
            AttributeValue::SS(_) => "string set",
            AttributeValue::NS(_) => "number set",
            AttributeValue::BS(_) => "binary set",
            AttributeValue::M(_) => "map",
            AttributeValue::L(_) => "list",
            AttributeValue::Null => "null",
            AttributeValue::Bool(_) => "bool",
        }
    }

    /// Check if this value is null.
    pub fn is_null(&self) -> bool {
        matches!(self, AttributeValue::Null)
    }

    /// Get this value as a string, if it is one.
    pub fn as_s(&self) -> Option<&str> {
        match self {
            AttributeValue::S(s) => Some(s),
            _ => None,
        }
    }

    /// Get the decimal text of this value, if it is a number.
    pub fn as_n(&self) -> Option<&str> {
        match self {
            AttributeValue::N(n) => Some(n),
            _ => None,
        }
    }

    /// Parse this number value as an unsigned integer.
    pub fn as_u64(&self) -> Option<u64> {
        self.as_n().and_then(|n| n.parse().ok())
    }

    /// Parse this number value as a signed integer.
    pub fn as_i64(&self) -> Option<i64> {
        self.as_n().and_then(|n| n.parse().ok())
    }

    /// Get this value as a boolean, if it is one.
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            AttributeValue::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Get this value as a map, if it is one.
    pub fn as_map(&self) -> Option<&Attributes> {
        match self {
            AttributeValue::M(m) => Some(m),
            _ => None,
        }
    }

    /// Get this value as a list, if it is one.
    pub fn as_list(&self) -> Option<&[AttributeValue]> {
        match self {
            AttributeValue::L(l) => Some(l),
            _ => None,
        }
    }

    /// Look up a key in this map value.
    pub fn get(&self, key: &str) -> Option<&AttributeValue> {
        self.as_map().and_then(|m| m.get(key))
    }
}

impl From<bool> for AttributeValue {
    fn from(b: bool) -> Self {
        AttributeValue::Bool(b)
    }
}

impl From<i64> for AttributeValue {
    fn from(n: i64) -> Self {
        AttributeValue::N(n.to_string())
    }
}

impl From<u64> for AttributeValue {
    fn from(n: u64) -> Self {
        AttributeValue::N(n.to_string())
    }
}

impl From<String> for AttributeValue {
    fn from(s: String) -> Self {
        AttributeValue::S(s)
    }
}

impl From<&str> for AttributeValue {
    fn from(s: &str) -> Self {
        AttributeValue::S(s.to_string())
    }
}

impl From<Vec<u8>> for AttributeValue {
    fn from(b: Vec<u8>) -> Self {
        AttributeValue::B(b)
    }
}

impl From<Attributes> for AttributeValue {
    fn from(m: Attributes) -> Self {
        AttributeValue::M(m)
    }
}

impl From<Vec<AttributeValue>> for AttributeValue {
    fn from(l: Vec<AttributeValue>) -> Self {
        AttributeValue::L(l)
    }
}
