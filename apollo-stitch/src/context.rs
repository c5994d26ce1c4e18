//! Request-scoped state.

use dashmap::DashMap;
use http::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::cache::SchemaCache;
use crate::json_ext::Value;
use crate::registry::Registry;

/// Holds everything registered and cached for one request.
///
/// Steps populate the registry through `&mut Context`; once execution starts the
/// context is shared behind an `Arc` and handed to every resolver. User data can
/// be attached under string keys as JSON.
#[derive(Debug, Default)]
pub struct Context {
    registry: Registry,
    headers: HeaderMap,
    entries: DashMap<String, Value>,
    pub(crate) schemas: SchemaCache,
}

impl Context {
    pub fn new() -> Self {
        Self::default()
    }

    /// A context for a request that arrived with `headers`.
    pub fn with_headers(headers: HeaderMap) -> Self {
        Self {
            headers,
            ..Self::default()
        }
    }

    pub fn registry(&self) -> &Registry {
        &self.registry
    }

    pub fn registry_mut(&mut self) -> &mut Registry {
        &mut self.registry
    }

    /// The headers of the incoming request.
    pub fn headers(&self) -> &HeaderMap {
        &self.headers
    }

    /// Stores `value` under `key`, returning the previous value if any.
    pub fn insert<K, V>(&self, key: K, value: V) -> Result<Option<Value>, serde_json::Error>
    where
        K: Into<String>,
        V: Serialize,
    {
        let value = serde_json_bytes::to_value(value)?;
        Ok(self.entries.insert(key.into(), value))
    }

    /// Reads the value stored under `key`.
    pub fn get<V>(&self, key: &str) -> Result<Option<V>, serde_json::Error>
    where
        V: DeserializeOwned,
    {
        self.entries
            .get(key)
            .map(|value| serde_json_bytes::from_value(value.clone()))
            .transpose()
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.entries.contains_key(key)
    }
}
