//! Logic for loading configuration in to an object model

use std::str::FromStr;
use std::time::Duration;

use displaydoc::Display;
use http::HeaderName;
use schemars::JsonSchema;
use schemars::schema::RootSchema;
use serde::Deserialize;
use serde::Serialize;
use thiserror::Error;
use url::Url;

use crate::merge::ConflictPolicy;
use crate::remote::ForwardHeaders;

/// Configuration error.
#[derive(Debug, Error, Display)]
#[non_exhaustive]
pub enum ConfigurationError {
    /// could not deserialize configuration: {0}
    DeserializeConfigError(String),
    /// remote schema {schema}: invalid header name '{header}'
    InvalidHeaderName { schema: String, header: String },
}

/// The configuration of a [`Stitcher`](crate::Stitcher).
///
/// Can be created through `serde::Deserialize` from YAML or JSON, or inline in
/// Rust code.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Configuration {
    /// Where built schemas are cached.
    #[serde(default)]
    pub cache: Cache,

    /// How contributions are merged.
    #[serde(default)]
    pub merge: Merge,

    /// Request handling.
    #[serde(default)]
    pub server: Server,

    /// Local schemas given as inline SDL, in registration order.
    #[serde(default)]
    pub schemas: Vec<SchemaSource>,

    /// Remote schemas, registered after the local ones.
    #[serde(default)]
    pub remote_schemas: Vec<RemoteSchemaSource>,
}

impl Configuration {
    /// Parses a JSON configuration.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json)
            .map_err(|error| ConfigurationError::DeserializeConfigError(error.to_string()))
    }

    /// The JSON schema of the configuration file.
    pub fn json_schema() -> RootSchema {
        schemars::schema_for!(Configuration)
    }
}

impl FromStr for Configuration {
    type Err = ConfigurationError;

    /// Parses a YAML configuration.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        serde_yaml::from_str(s)
            .map_err(|error| ConfigurationError::DeserializeConfigError(error.to_string()))
    }
}

/// Schema cache settings.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Cache {
    /// `context` builds schemas once per request, `shared` once per process.
    /// default: context
    #[serde(default)]
    pub strategy: CacheScope,

    /// Namespace of the shared cache entries.
    /// default: "stitch"
    #[serde(default = "default_cache_key")]
    pub key: String,
}

impl Default for Cache {
    fn default() -> Self {
        Self {
            strategy: CacheScope::default(),
            key: default_cache_key(),
        }
    }
}

fn default_cache_key() -> String {
    "stitch".to_string()
}

/// Lifetime of built schemas.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum CacheScope {
    #[default]
    Context,
    Shared,
}

/// Merge settings.
#[derive(Clone, Debug, Default, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Merge {
    /// What to do when two schemas define the same field differently.
    /// default: last_wins
    #[serde(default)]
    pub conflict_policy: ConflictPolicy,
}

/// Request handling settings.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct Server {
    /// Keep `extensions.exception` on errors.
    /// default: true
    #[serde(default = "default_debug")]
    pub debug: bool,

    /// Add timing information under `extensions.tracing`.
    /// default: false
    #[serde(default)]
    pub tracing: bool,

    /// Copied to `extensions.cacheControl` of every response.
    #[serde(default)]
    pub cache_control: Option<serde_json::Value>,
}

impl Default for Server {
    fn default() -> Self {
        Self {
            debug: default_debug(),
            tracing: false,
            cache_control: None,
        }
    }
}

fn default_debug() -> bool {
    true
}

/// A local schema.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct SchemaSource {
    /// Name of the contribution, generated when missing.
    #[serde(default)]
    pub name: Option<String>,
    /// Type definitions.
    pub sdl: String,
}

/// A remote schema reached over HTTP.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema)]
#[serde(deny_unknown_fields)]
pub struct RemoteSchemaSource {
    /// Name of the contribution, generated when missing.
    #[serde(default)]
    pub name: Option<String>,

    /// GraphQL endpoint of the service.
    pub url: Url,

    /// `true` forwards every incoming header except hop-by-hop ones, a list
    /// forwards the named headers only.
    /// default: false
    #[serde(default)]
    pub forward_headers: ForwardHeadersConfig,

    /// Request timeout in human-readable format, e.g. `5s`.
    #[serde(with = "humantime_serde", default)]
    #[schemars(with = "Option<String>", default)]
    pub timeout: Option<Duration>,
}

/// Header forwarding as written in the configuration.
#[derive(Clone, Debug, Deserialize, Serialize, JsonSchema, PartialEq)]
#[serde(untagged)]
pub enum ForwardHeadersConfig {
    Enabled(bool),
    Named(Vec<String>),
}

impl Default for ForwardHeadersConfig {
    fn default() -> Self {
        Self::Enabled(false)
    }
}

impl RemoteSchemaSource {
    pub(crate) fn forward_headers(&self) -> Result<ForwardHeaders, ConfigurationError> {
        match &self.forward_headers {
            ForwardHeadersConfig::Enabled(false) => Ok(ForwardHeaders::None),
            ForwardHeadersConfig::Enabled(true) => Ok(ForwardHeaders::All),
            ForwardHeadersConfig::Named(names) => names
                .iter()
                .map(|header| {
                    HeaderName::from_str(header).map_err(|_| ConfigurationError::InvalidHeaderName {
                        schema: self
                            .name
                            .clone()
                            .unwrap_or_else(|| self.url.to_string()),
                        header: header.clone(),
                    })
                })
                .collect::<Result<Vec<_>, _>>()
                .map(ForwardHeaders::Named),
        }
    }
}
