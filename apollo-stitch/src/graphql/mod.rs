//! Types related to GraphQL requests, responses, etc.

mod request;
mod response;

use std::fmt;

use apollo_compiler::response::GraphQLError as CompilerExecutionError;
pub use request::Request;
pub use response::Response;
use serde::Deserialize;
use serde::Serialize;
use serde_json_bytes::ByteString;
use serde_json_bytes::Value;

use crate::json_ext::Object;
use crate::json_ext::Path;

#[derive(Serialize, Deserialize, Debug, PartialEq, Eq, Clone)]
#[serde(rename_all = "camelCase")]
/// The error location
pub struct Location {
    /// The line number
    pub line: u32,
    /// The column number
    pub column: u32,
}

/// A [GraphQL error](https://spec.graphql.org/October2021/#sec-Errors)
/// as may be found in the `errors` field of a GraphQL [`Response`].
///
/// Converted to (or from) JSON with serde.
#[derive(Clone, Debug, Default, Eq, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
#[non_exhaustive]
pub struct Error {
    /// The error message.
    pub message: String,

    /// The locations of the error in the GraphQL document of the originating request.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub locations: Vec<Location>,

    /// If this is a field error, the JSON path to that field in [`Response::data`]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<Path>,

    /// The optional GraphQL extensions for this error.
    #[serde(skip_serializing_if = "Object::is_empty")]
    pub extensions: Object,
}

#[buildstructor::buildstructor]
impl Error {
    /// Returns a builder that builds a GraphQL [`Error`] from a message and an
    /// optional `extensions.code`.
    #[builder(visibility = "pub")]
    fn new(message: String, extension_code: Option<String>) -> Self {
        let mut extensions = Object::new();
        if let Some(code) = extension_code {
            extensions.insert("code", Value::String(ByteString::from(code)));
        }
        Self {
            message,
            locations: Vec::new(),
            path: None,
            extensions,
        }
    }

    /// Extract the error code from [`Error::extensions`] as a String if it is set.
    pub fn extension_code(&self) -> Option<String> {
        self.extensions.get("code").and_then(|c| match c {
            Value::String(s) => Some(s.as_str().to_owned()),
            Value::Number(n) => Some(n.to_string()),
            Value::Null | Value::Array(_) | Value::Object(_) | Value::Bool(_) => None,
        })
    }
}

/// Displays (only) the error message.
impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

/// The `extensions.code` reported for an error type.
pub(crate) trait ErrorExtension {
    fn extension_code(&self) -> String;
}

impl From<CompilerExecutionError> for Error {
    fn from(error: CompilerExecutionError) -> Self {
        let CompilerExecutionError {
            message,
            locations,
            path,
            extensions,
        } = error;
        let locations = locations
            .into_iter()
            .map(|location| Location {
                line: location.line as u32,
                column: location.column as u32,
            })
            .collect::<Vec<_>>();
        let path = if !path.is_empty() {
            Some(Path::from(path.as_slice()))
        } else {
            None
        };
        Self {
            message,
            locations,
            path,
            extensions,
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;

    #[test]
    fn serializes_without_empty_members() {
        let error = Error::builder().message("boom").extension_code("BOOM").build();
        assert_eq!(error.extension_code().as_deref(), Some("BOOM"));
        assert_eq!(
            serde_json_bytes::to_value(&error).unwrap(),
            json!({"message": "boom", "extensions": {"code": "BOOM"}})
        );

        let error = Error {
            path: Some(Path::empty().join_key("hello")),
            ..Error::builder().message("boom").build()
        };
        assert_eq!(
            serde_json_bytes::to_value(&error).unwrap(),
            json!({"message": "boom", "path": ["hello"]})
        );
    }

    #[test]
    fn converts_compiler_diagnostics() {
        let schema = apollo_compiler::Schema::parse_and_validate(
            "type Query { a: Int }",
            "schema.graphql",
        )
        .unwrap();
        let errors = apollo_compiler::ExecutableDocument::parse_and_validate(
            &schema,
            "{ b }",
            "query.graphql",
        )
        .unwrap_err()
        .errors;
        let error: Error = errors.iter().next().unwrap().to_json().into();
        assert_eq!(error.message, r#"type `Query` does not have a field `b`"#);
        assert_eq!(error.locations, vec![Location { line: 1, column: 3 }]);
        assert_eq!(error.path, None);
    }
}
