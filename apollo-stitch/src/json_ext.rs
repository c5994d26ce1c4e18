//! JSON helpers shared by requests, responses and resolution.

use std::fmt;

use apollo_compiler::response::ResponseDataPathSegment;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Map;

pub use serde_json_bytes::Value;

/// A JSON object.
pub type Object = Map<ByteString, Value>;

/// An element of a response path.
#[derive(Clone, Debug, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(untagged)]
pub enum PathElement {
    /// An index into a list.
    Index(usize),

    /// A key into an object.
    Key(String),
}

/// A path into a GraphQL response, as used in the `path` of field errors.
#[derive(Clone, Debug, Default, Eq, PartialEq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Path(pub Vec<PathElement>);

impl Path {
    pub fn empty() -> Self {
        Self(Vec::new())
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathElement> {
        self.0.iter()
    }

    /// Returns a new path with `key` appended.
    pub fn join_key(&self, key: impl Into<String>) -> Self {
        let mut elements = self.0.clone();
        elements.push(PathElement::Key(key.into()));
        Self(elements)
    }

    /// Returns a new path with `index` appended.
    pub fn join_index(&self, index: usize) -> Self {
        let mut elements = self.0.clone();
        elements.push(PathElement::Index(index));
        Self(elements)
    }

    pub fn last_key(&self) -> Option<&str> {
        match self.0.last() {
            Some(PathElement::Key(key)) => Some(key),
            _ => None,
        }
    }
}

impl fmt::Display for Path {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        for (index, element) in self.0.iter().enumerate() {
            if index > 0 {
                f.write_str("/")?;
            }
            match element {
                PathElement::Index(i) => write!(f, "{i}")?,
                PathElement::Key(key) => f.write_str(key)?,
            }
        }
        Ok(())
    }
}

impl From<&[ResponseDataPathSegment]> for Path {
    fn from(segments: &[ResponseDataPathSegment]) -> Self {
        Self(
            segments
                .iter()
                .map(|segment| match segment {
                    ResponseDataPathSegment::Field(name) => PathElement::Key(name.to_string()),
                    ResponseDataPathSegment::ListIndex(i) => PathElement::Index(*i),
                })
                .collect(),
        )
    }
}

impl<'a> FromIterator<&'a str> for Path {
    fn from_iter<T: IntoIterator<Item = &'a str>>(iter: T) -> Self {
        Self(
            iter.into_iter()
                .map(|key| match key.parse::<usize>() {
                    Ok(index) => PathElement::Index(index),
                    Err(_) => PathElement::Key(key.to_string()),
                })
                .collect(),
        )
    }
}

/// Extension methods on JSON values.
pub(crate) trait ValueExt {
    /// Looks up `key` when the value is an object.
    fn get_key(&self, key: &str) -> Option<&Value>;

    /// Human readable name of the JSON kind, for error messages.
    fn kind(&self) -> &'static str;
}

impl ValueExt for Value {
    fn get_key(&self, key: &str) -> Option<&Value> {
        self.as_object().and_then(|object| object.get(key))
    }

    fn kind(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::String(_) => "string",
            Value::Array(_) => "list",
            Value::Object(_) => "object",
        }
    }
}
