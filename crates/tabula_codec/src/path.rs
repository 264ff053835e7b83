//! Structural pointers into an attribute tree.

use crate::error::{CodecError, CodecResult};
use crate::value::{AttributeValue, Attributes};
use std::fmt;

/// One step of an [`AttributePath`].
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum PathSegment {
    /// A named attribute of a map.
    Attribute(String),
    /// A position in a list.
    Index(usize),
}

/// A path to a nested attribute, e.g. `"orders"[2]."total"`.
///
/// A path always starts with a top-level attribute name. It renders with
/// double-quoted names, dot-joined map steps and bracketed list indices,
/// which is the form statements use.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct AttributePath {
    segments: Vec<PathSegment>,
}

impl AttributePath {
    /// Creates a path to a top-level attribute.
    pub fn attribute(name: impl Into<String>) -> Self {
        Self {
            segments: vec![PathSegment::Attribute(name.into())],
        }
    }

    /// Builds a path from raw segments.
    ///
    /// Returns `None` if the segments are empty or do not start with an
    /// attribute name.
    pub fn from_segments(segments: Vec<PathSegment>) -> Option<Self> {
        match segments.first() {
            Some(PathSegment::Attribute(_)) => Some(Self { segments }),
            _ => None,
        }
    }

    /// Returns a path to the named child of the map at this path.
    #[must_use]
    pub fn child(&self, name: impl Into<String>) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Attribute(name.into()));
        Self { segments }
    }

    /// Returns a path to the element at `index` of the list at this path.
    #[must_use]
    pub fn index(&self, index: usize) -> Self {
        let mut segments = self.segments.clone();
        segments.push(PathSegment::Index(index));
        Self { segments }
    }

    /// Returns the segments of this path.
    pub fn segments(&self) -> &[PathSegment] {
        &self.segments
    }

    /// Returns the top-level attribute name.
    pub fn root(&self) -> &str {
        match self.segments.first() {
            Some(PathSegment::Attribute(name)) => name,
            _ => "",
        }
    }

    /// Resolves this path against `attributes`.
    pub fn get<'a>(&self, attributes: &'a Attributes) -> Option<&'a AttributeValue> {
        let mut current = attributes.get(self.root())?;
        for segment in &self.segments[1..] {
            current = match (segment, current) {
                (PathSegment::Attribute(name), AttributeValue::M(map)) => map.get(name)?,
                (PathSegment::Index(i), AttributeValue::L(list)) => list.get(*i)?,
                _ => return None,
            };
        }
        Some(current)
    }

    /// Sets the value at this path.
    ///
    /// Every container above the last segment must already exist. Setting a
    /// list index at or past the end appends to the list.
    pub fn set(&self, attributes: &mut Attributes, value: AttributeValue) -> CodecResult<()> {
        let Some((last, parent)) = self.segments.split_last() else {
            return Err(CodecError::path_not_found(self));
        };
        if parent.is_empty() {
            attributes.insert(self.root().to_string(), value);
            return Ok(());
        }

        match (last, self.parent_mut(attributes, parent)?) {
            (PathSegment::Attribute(name), AttributeValue::M(map)) => {
                map.insert(name.clone(), value);
                Ok(())
            }
            (PathSegment::Index(i), AttributeValue::L(list)) => {
                if *i < list.len() {
                    list[*i] = value;
                } else {
                    list.push(value);
                }
                Ok(())
            }
            (PathSegment::Attribute(_), _) => Err(self.type_mismatch("map")),
            (PathSegment::Index(_), _) => Err(self.type_mismatch("list")),
        }
    }

    /// Removes the value at this path, returning it if it was present.
    ///
    /// Removing a list element shifts the following elements down.
    pub fn remove(&self, attributes: &mut Attributes) -> CodecResult<Option<AttributeValue>> {
        let Some((last, parent)) = self.segments.split_last() else {
            return Err(CodecError::path_not_found(self));
        };
        if parent.is_empty() {
            return Ok(attributes.remove(self.root()));
        }

        match (last, self.parent_mut(attributes, parent)?) {
            (PathSegment::Attribute(name), AttributeValue::M(map)) => Ok(map.remove(name)),
            (PathSegment::Index(i), AttributeValue::L(list)) => {
                Ok((*i < list.len()).then(|| list.remove(*i)))
            }
            (PathSegment::Attribute(_), _) => Err(self.type_mismatch("map")),
            (PathSegment::Index(_), _) => Err(self.type_mismatch("list")),
        }
    }

    fn parent_mut<'a>(
        &self,
        attributes: &'a mut Attributes,
        parent: &[PathSegment],
    ) -> CodecResult<&'a mut AttributeValue> {
        let mut current = attributes
            .get_mut(self.root())
            .ok_or_else(|| CodecError::path_not_found(self))?;
        for segment in &parent[1..] {
            current = match (segment, current) {
                (PathSegment::Attribute(name), AttributeValue::M(map)) => map.get_mut(name),
                (PathSegment::Index(i), AttributeValue::L(list)) => list.get_mut(*i),
                _ => None,
            }
            .ok_or_else(|| CodecError::path_not_found(self))?;
        }
        Ok(current)
    }

    fn type_mismatch(&self, expected: &'static str) -> CodecError {
        CodecError::PathTypeMismatch {
            path: self.to_string(),
            expected,
        }
    }
}

impl fmt::Display for AttributePath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (position, segment) in self.segments.iter().enumerate() {
            match segment {
                PathSegment::Attribute(name) => {
                    if position > 0 {
                        f.write_str(".")?;
                    }
                    write!(f, "\"{}\"", name.replace('"', "\"\""))?;
                }
                PathSegment::Index(i) => write!(f, "[{i}]")?,
            }
        }
        Ok(())
    }
}
