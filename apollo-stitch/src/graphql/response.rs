use serde::Deserialize;
use serde::Serialize;

use crate::graphql::Error;
use crate::json_ext::Object;
use crate::json_ext::Value;

/// A GraphQL response, as produced by executing a request against a stitched
/// schema or returned by a remote source.
#[derive(Clone, Debug, Eq, PartialEq, Serialize, Deserialize, Default)]
#[serde(rename_all = "camelCase")]
#[non_exhaustive]
pub struct Response {
    /// The response data.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub data: Option<Value>,

    /// The optional graphql errors encountered.
    #[serde(skip_serializing_if = "Vec::is_empty", default)]
    pub errors: Vec<Error>,

    /// The optional graphql extensions.
    #[serde(skip_serializing_if = "Object::is_empty", default)]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Response {
    /// Constructor
    #[builder(visibility = "pub")]
    fn new(data: Option<Value>, errors: Vec<Error>) -> Self {
        Self {
            data,
            errors,
            extensions: Object::new(),
        }
    }

    /// A response carrying only errors, as returned for request errors.
    pub fn from_errors(errors: Vec<Error>) -> Self {
        Self {
            data: None,
            errors,
            extensions: Object::new(),
        }
    }

    /// Returns `data[key]`, or `null` when there is no data.
    pub fn data_field(&self, key: &str) -> Value {
        self.data
            .as_ref()
            .and_then(|data| data.as_object())
            .and_then(|object| object.get(key))
            .cloned()
            .unwrap_or(Value::Null)
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn test_response_deserialization() {
        let response: Response = serde_json_bytes::from_value(json!({
            "data": { "hello": "world" },
            "errors": [{ "message": "boom", "path": ["hello"], "extensions": { "code": "X" } }],
        }))
        .unwrap();
        assert_eq!(response.data_field("hello"), json!("world"));
        assert_eq!(response.data_field("missing"), Value::Null);
        assert_eq!(response.errors.len(), 1);
        assert_eq!(response.errors[0].extension_code().as_deref(), Some("X"));
    }
}
