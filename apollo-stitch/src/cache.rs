//! Caching of built schemas.

use std::future::Future;
use std::sync::Arc;

use dashmap::DashMap;
use tokio::sync::OnceCell;

use crate::error::StitchError;
use crate::schema::StitchedSchema;

pub(crate) const MERGED_KEY: &str = "merged";
pub(crate) const FINAL_KEY: &str = "final";

/// A keyed store of built schemas.
///
/// Each key is built at most once: concurrent callers for a key that is being
/// built wait for that build instead of starting their own. A failed build
/// leaves the key empty, so the next caller builds again.
#[derive(Default)]
pub struct SchemaCache {
    cells: DashMap<String, Arc<OnceCell<Arc<StitchedSchema>>>>,
}

impl std::fmt::Debug for SchemaCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SchemaCache")
            .field("entries", &self.cells.len())
            .finish()
    }
}

impl SchemaCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the schema cached under `key`, building it with `build` if absent.
    pub async fn get_or_try_build<F, Fut>(
        &self,
        key: &str,
        build: F,
    ) -> Result<Arc<StitchedSchema>, StitchError>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<StitchedSchema, StitchError>>,
    {
        // the map guard must not be held across the build
        let cell = self.cells.entry(key.to_string()).or_default().clone();
        cell.get_or_try_init(|| async move {
            tracing::debug!(key, "building schema");
            build().await.map(Arc::new)
        })
        .await
        .cloned()
    }

    /// Returns the schema cached under `key` without building it.
    pub fn get(&self, key: &str) -> Option<Arc<StitchedSchema>> {
        self.cells.get(key).and_then(|cell| cell.get().cloned())
    }
}

/// Where built schemas are cached.
#[derive(Clone, Debug, Default)]
pub enum CacheStrategy {
    /// Schemas are built once per request context.
    #[default]
    Context,
    /// Schemas are built once per process and shared by every context, under
    /// `<key>.merged` and `<key>.final`.
    Shared { key: String, cache: Arc<SchemaCache> },
}

impl CacheStrategy {
    /// A shared strategy backed by a new cache.
    pub fn shared(key: impl Into<String>) -> Self {
        Self::Shared {
            key: key.into(),
            cache: Arc::new(SchemaCache::new()),
        }
    }

    pub(crate) fn key_for(&self, suffix: &str) -> String {
        match self {
            CacheStrategy::Context => suffix.to_string(),
            CacheStrategy::Shared { key, .. } => format!("{key}.{suffix}"),
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::AtomicUsize;
    use std::sync::atomic::Ordering;

    use super::*;
    use crate::merge::build_merged_schema;
    use crate::merge::ConflictPolicy;
    use crate::registry::Registry;

    fn registry() -> Registry {
        let mut registry = Registry::new();
        registry.register_schema(None, "type Query { hello: String }".parse().unwrap());
        registry
    }

    #[tokio::test]
    async fn builds_once_per_key() {
        let cache = SchemaCache::new();
        let builds = &AtomicUsize::new(0);
        let registry = &registry();
        let build = || async move {
            builds.fetch_add(1, Ordering::SeqCst);
            build_merged_schema(registry, ConflictPolicy::LastWins)
        };

        let (first, second) = tokio::join!(
            cache.get_or_try_build("merged", build),
            cache.get_or_try_build("merged", build)
        );
        let first = first.unwrap();
        assert!(Arc::ptr_eq(&first, &second.unwrap()));
        assert!(Arc::ptr_eq(&first, &cache.get("merged").unwrap()));
        assert_eq!(builds.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failures_are_not_cached() {
        let cache = SchemaCache::new();
        let error = cache
            .get_or_try_build("merged", || async {
                build_merged_schema(&Registry::new(), ConflictPolicy::LastWins)
            })
            .await
            .unwrap_err();
        assert_eq!(error, StitchError::NoSchemasDefined);
        assert!(cache.get("merged").is_none());

        let registry = registry();
        let schema = cache
            .get_or_try_build("merged", || async move {
                build_merged_schema(&registry, ConflictPolicy::LastWins)
            })
            .await;
        assert!(schema.is_ok());
    }

    #[test]
    fn shared_keys_are_namespaced() {
        assert_eq!(CacheStrategy::Context.key_for(MERGED_KEY), "merged");
        assert_eq!(CacheStrategy::shared("stitch").key_for(FINAL_KEY), "stitch.final");
    }
}
