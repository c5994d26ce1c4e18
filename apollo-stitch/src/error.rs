//! Stitching errors.
use std::fmt;

use apollo_compiler::validation::DiagnosticList;
use apollo_compiler::validation::WithErrors;
use displaydoc::Display;
use serde::Serialize;
use thiserror::Error;

use crate::configuration::ConfigurationError;
use crate::graphql::Error;
use crate::graphql::ErrorExtension;
use crate::graphql::Location;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::registry::FieldPath;

pub(crate) const CONFIGURATION_ERROR_CODE: &str = "STITCH_CONFIGURATION_ERROR";

/// Errors raised while registering contributions or building the stitched schema.
///
/// These are fatal configuration errors: a request served through a failing
/// configuration gets an error response and no cache entry is populated.
#[derive(Error, Display, Debug, Clone, PartialEq)]
#[non_exhaustive]
pub enum StitchError {
    /// no schemas defined
    NoSchemasDefined,

    /// {path}: you can only specify one resolver for a path
    DuplicateResolver {
        /// The path that already has a resolver.
        path: FieldPath,
    },

    /// specify either a url or a link to define a remote schema
    MissingRemoteTarget,

    /// unsupported definition type found in schema: '{kind}'
    UnsupportedDefinition {
        /// The kind of the offending definition.
        kind: String,
    },

    /// invalid field path '{path}': expected `Type.field`
    InvalidFieldPath {
        /// The path as given.
        path: String,
    },

    /// {path}: no such field in the merged schema
    UnknownField {
        /// The path of the binding.
        path: FieldPath,
    },

    /// {path}: invalid resolver fragment: {message}
    InvalidFragment {
        /// The path of the binding.
        path: FieldPath,
        /// The parser and validation diagnostics.
        message: String,
    },

    /// merge conflict at {path}: {reason}
    MergeConflict {
        /// The conflicting type or field.
        path: String,
        /// What differs.
        reason: String,
    },

    /// could not parse {source_name}: {message}
    Parse {
        /// The name of the document.
        source_name: String,
        /// The parser diagnostics.
        message: String,
    },

    /// invalid schema: {message}
    InvalidSchema {
        /// The validation diagnostics.
        message: String,
    },

    /// could not introspect remote schema: {0}
    Introspection(FetchError),

    /// invalid configuration: {0}
    InvalidConfiguration(String),
}

impl StitchError {
    pub(crate) fn parse<T>(source_name: impl Into<String>, errors: WithErrors<T>) -> Self {
        Self::Parse {
            source_name: source_name.into(),
            message: errors.errors.to_string(),
        }
    }

    pub(crate) fn invalid_schema(errors: &DiagnosticList) -> Self {
        Self::InvalidSchema {
            message: errors.to_string(),
        }
    }

    /// Convert the configuration error to a GraphQL error.
    pub fn to_graphql_error(&self) -> Error {
        Error::builder()
            .message(self.to_string())
            .extension_code(self.extension_code())
            .build()
    }
}

impl From<ConfigurationError> for StitchError {
    fn from(error: ConfigurationError) -> Self {
        Self::InvalidConfiguration(error.to_string())
    }
}

impl ErrorExtension for StitchError {
    fn extension_code(&self) -> String {
        CONFIGURATION_ERROR_CODE.to_string()
    }
}

/// Errors raised by the transport while talking to a remote source.
#[derive(Error, Display, Debug, Clone, Serialize, Eq, PartialEq)]
#[serde(untagged)]
#[ignore_extra_doc_attributes]
#[non_exhaustive]
pub enum FetchError {
    /// HTTP fetch failed from '{service}': {reason}
    ///
    /// note that this relates to a transport error and not a GraphQL error
    SubrequestHttpError {
        status_code: Option<u16>,

        /// The service failed.
        service: String,

        /// The reason the fetch failed.
        reason: String,
    },

    /// service '{service}' response was malformed: {reason}
    SubrequestMalformedResponse {
        /// The service that responded with the malformed response.
        service: String,

        /// The reason the serialization failed.
        reason: String,
    },

    /// introspection of service '{service}' failed: {reason}
    IntrospectionFailed {
        /// The service that was introspected.
        service: String,

        /// The reason the introspection failed.
        reason: String,
    },
}

impl FetchError {
    /// Convert the fetch error to a GraphQL error.
    pub fn to_graphql_error(&self, path: Option<Path>) -> Error {
        let mut extensions = match serde_json_bytes::to_value(self) {
            Ok(Value::Object(object)) => object,
            _ => Object::new(),
        };
        extensions
            .entry("code")
            .or_insert_with(|| self.extension_code().into());
        extensions.remove("reason");
        if let FetchError::SubrequestHttpError { status_code, .. } = self {
            extensions.remove("status_code");
            if let Some(status_code) = status_code {
                extensions.insert("http", serde_json_bytes::json!({ "status": status_code }));
            }
        }

        Error {
            message: self.to_string(),
            locations: Default::default(),
            path,
            extensions,
        }
    }
}

impl ErrorExtension for FetchError {
    fn extension_code(&self) -> String {
        match self {
            FetchError::SubrequestHttpError { .. } => "SUBREQUEST_HTTP_ERROR",
            FetchError::SubrequestMalformedResponse { .. } => "SUBREQUEST_MALFORMED_RESPONSE",
            FetchError::IntrospectionFailed { .. } => "INTROSPECTION_FAILED",
        }
        .to_string()
    }
}

/// An error raised while resolving one field.
///
/// Resolvers, middleware and delegation return it; the executor turns it into a
/// [`graphql::Error`](crate::graphql::Error) carrying the field's path and location.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldError {
    /// The error message.
    pub message: String,
    /// Extensions copied to the GraphQL error.
    pub extensions: Object,
}

impl FieldError {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            message: message.into(),
            extensions: Object::new(),
        }
    }

    pub fn with_extension(mut self, key: &'static str, value: impl Into<Value>) -> Self {
        self.extensions.insert(key, value.into());
        self
    }

    pub fn with_code(self, code: impl Into<String>) -> Self {
        self.with_extension("code", code.into())
    }

    pub(crate) fn into_graphql_error(self, path: Path, locations: Vec<Location>) -> Error {
        Error {
            message: self.message,
            locations,
            path: Some(path),
            extensions: self.extensions,
        }
    }
}

impl fmt::Display for FieldError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        self.message.fmt(f)
    }
}

impl std::error::Error for FieldError {}

impl From<String> for FieldError {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<&str> for FieldError {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<FetchError> for FieldError {
    fn from(error: FetchError) -> Self {
        let Error {
            message,
            extensions,
            ..
        } = error.to_graphql_error(None);
        Self {
            message,
            extensions,
        }
    }
}

impl From<StitchError> for FieldError {
    fn from(error: StitchError) -> Self {
        Self::new(error.to_string()).with_code(error.extension_code())
    }
}

impl From<Error> for FieldError {
    fn from(error: Error) -> Self {
        Self {
            message: error.message,
            extensions: error.extensions,
        }
    }
}
