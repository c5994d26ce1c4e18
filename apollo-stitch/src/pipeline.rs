//! Registration steps and the [`Stitcher`] facade serving requests.

use std::sync::Arc;
use std::task::Poll;

use async_trait::async_trait;
use futures::future::BoxFuture;
use http::HeaderMap;
use tokio::sync::OnceCell;
use tower::BoxError;
use tower::Service;

use crate::cache::CacheStrategy;
use crate::cache::FINAL_KEY;
use crate::cache::MERGED_KEY;
use crate::cache::SchemaCache;
use crate::configuration::CacheScope;
use crate::configuration::Configuration;
use crate::context::Context;
use crate::error::StitchError;
use crate::execution::Executor;
use crate::execution::ResolverExecutor;
use crate::graphql;
use crate::merge::ConflictPolicy;
use crate::merge::build_merged_schema;
use crate::middleware::FieldMiddleware;
use crate::options::ServerOptions;
use crate::registry::FieldPath;
use crate::registry::Registry;
use crate::registry::ResolverMap;
use crate::remote::Link;
use crate::remote::RemoteSchema;
use crate::resolver::IntoResolverSpec;
use crate::resolver::ResolverSpec;
use crate::schema::StitchedSchema;
use crate::transform::transform;
use crate::type_graph::TypeGraph;

/// One registration applied to every request context, in order.
#[async_trait]
pub trait Step: Send + Sync + 'static {
    async fn apply(&self, context: &mut Context) -> Result<(), StitchError>;
}

struct SchemaStep {
    name: Option<String>,
    graph: TypeGraph,
}

#[async_trait]
impl Step for SchemaStep {
    async fn apply(&self, context: &mut Context) -> Result<(), StitchError> {
        context
            .registry_mut()
            .register_schema(self.name.clone(), self.graph.clone());
        Ok(())
    }
}

/// Registers a remote schema. The type graph is introspected by the first
/// request and reused afterwards, unless one was given up front.
struct RemoteSchemaStep {
    name: Option<String>,
    link: Arc<dyn Link>,
    graph: OnceCell<TypeGraph>,
}

impl RemoteSchemaStep {
    fn new(remote: &RemoteSchema) -> Result<Self, StitchError> {
        let graph = match &remote.graph {
            Some(graph) => OnceCell::new_with(Some(graph.clone())),
            None => OnceCell::new(),
        };
        Ok(Self {
            name: remote.name.clone(),
            link: remote.link()?,
            graph,
        })
    }
}

#[async_trait]
impl Step for RemoteSchemaStep {
    async fn apply(&self, context: &mut Context) -> Result<(), StitchError> {
        let graph = self
            .graph
            .get_or_try_init(|| async {
                tracing::info!(service = self.link.name(), "introspecting remote schema");
                self.link
                    .introspect()
                    .await
                    .map_err(StitchError::Introspection)
            })
            .await?;
        context.registry_mut().register_remote_schema(
            self.name.clone(),
            graph.clone(),
            self.link.clone(),
        );
        Ok(())
    }
}

struct ResolverStep {
    path: FieldPath,
    spec: ResolverSpec,
}

#[async_trait]
impl Step for ResolverStep {
    async fn apply(&self, context: &mut Context) -> Result<(), StitchError> {
        context
            .registry_mut()
            .register_resolver(self.path.clone(), self.spec.clone())
    }
}

struct ResolversStep {
    resolvers: ResolverMap,
}

#[async_trait]
impl Step for ResolversStep {
    async fn apply(&self, context: &mut Context) -> Result<(), StitchError> {
        context
            .registry_mut()
            .register_resolvers(self.resolvers.clone())
    }
}

struct MiddlewareStep {
    path: FieldPath,
    middleware: Arc<dyn FieldMiddleware>,
}

#[async_trait]
impl Step for MiddlewareStep {
    async fn apply(&self, context: &mut Context) -> Result<(), StitchError> {
        context
            .registry_mut()
            .register_middleware(self.path.clone(), self.middleware.clone());
        Ok(())
    }
}

struct TransformStep {
    target: String,
}

#[async_trait]
impl Step for TransformStep {
    async fn apply(&self, context: &mut Context) -> Result<(), StitchError> {
        context.registry_mut().register_transform(self.target.clone());
        Ok(())
    }
}

/// Serves GraphQL requests against the schema stitched from its steps.
///
/// Every request gets a fresh [`Context`]: the steps register their
/// contributions into it, the merged schema (and the transformed one, when a
/// transform is registered) is built or taken from the cache, and the executor
/// runs the request. A failing step or build answers the request with a
/// `STITCH_CONFIGURATION_ERROR`.
#[derive(Clone)]
pub struct Stitcher {
    steps: Arc<[Arc<dyn Step>]>,
    executor: Arc<dyn Executor>,
    cache: CacheStrategy,
    conflict_policy: ConflictPolicy,
}

impl std::fmt::Debug for Stitcher {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Stitcher")
            .field("steps", &self.steps.len())
            .field("cache", &self.cache)
            .field("conflict_policy", &self.conflict_policy)
            .finish()
    }
}

impl Stitcher {
    pub fn builder() -> StitcherBuilder {
        StitcherBuilder::default()
    }

    /// Executes `request`, which arrived with `headers`.
    #[tracing::instrument(
        skip_all,
        level = "debug",
        fields(operation_name = request.operation_name.as_deref().unwrap_or_default())
    )]
    pub async fn execute(
        &self,
        request: graphql::Request,
        headers: HeaderMap,
    ) -> graphql::Response {
        let mut context = Context::with_headers(headers);
        let schemas = match self.prepare(&mut context).await {
            Ok(schemas) => schemas,
            Err(error) => {
                tracing::error!(error = %error, "could not stitch schema");
                return graphql::Response::from_errors(vec![error.to_graphql_error()]);
            }
        };
        let (schema, merged) = schemas;
        self.executor
            .execute(schema, merged, request, Arc::new(context))
            .await
    }

    /// Builds the schema a request would be executed against, e.g. to publish
    /// its SDL.
    pub async fn stitched_schema(&self) -> Result<Arc<StitchedSchema>, StitchError> {
        let mut context = Context::new();
        self.prepare(&mut context)
            .await
            .map(|(schema, _merged)| schema)
    }

    /// Runs the steps, then returns the final and the merged schema.
    async fn prepare(
        &self,
        context: &mut Context,
    ) -> Result<(Arc<StitchedSchema>, Arc<StitchedSchema>), StitchError> {
        for step in self.steps.iter() {
            step.apply(context).await?;
        }

        let cache: &SchemaCache = match &self.cache {
            CacheStrategy::Context => &context.schemas,
            CacheStrategy::Shared { cache, .. } => cache.as_ref(),
        };
        let registry = context.registry();
        let conflict_policy = self.conflict_policy;
        let merged = cache
            .get_or_try_build(&self.cache.key_for(MERGED_KEY), || async move {
                build_merged_schema(registry, conflict_policy)
            })
            .await?;
        let schema = match registry.transform() {
            Some(target) => {
                let merged = &merged;
                cache
                    .get_or_try_build(&self.cache.key_for(FINAL_KEY), || async move {
                        transform(merged, target)
                    })
                    .await?
            }
            None => merged.clone(),
        };
        Ok((schema, merged))
    }
}

impl Service<http::Request<graphql::Request>> for Stitcher {
    type Response = graphql::Response;
    type Error = BoxError;
    type Future = BoxFuture<'static, Result<Self::Response, Self::Error>>;

    fn poll_ready(&mut self, _cx: &mut std::task::Context<'_>) -> Poll<Result<(), Self::Error>> {
        Poll::Ready(Ok(()))
    }

    fn call(&mut self, request: http::Request<graphql::Request>) -> Self::Future {
        let this = self.clone();
        let (parts, body) = request.into_parts();
        Box::pin(async move { Ok(this.execute(body, parts.headers).await) })
    }
}

/// Collects the steps and settings of a [`Stitcher`].
///
/// Registrations are checked as they are added: the first invalid path,
/// duplicate resolver, remote schema without a target or unparsable SDL is
/// returned by [`build`](Self::build).
#[derive(Default)]
pub struct StitcherBuilder {
    steps: Vec<Arc<dyn Step>>,
    bindings: Registry,
    options: ServerOptions,
    executor: Option<Arc<dyn Executor>>,
    cache: CacheStrategy,
    conflict_policy: ConflictPolicy,
    error: Option<StitchError>,
}

impl StitcherBuilder {
    fn fail(&mut self, error: StitchError) {
        if self.error.is_none() {
            self.error = Some(error);
        }
    }

    fn step(mut self, step: impl Step) -> Self {
        self.steps.push(Arc::new(step));
        self
    }

    /// Adds a local schema given as SDL.
    pub fn schema(self, sdl: &str) -> Self {
        self.named_schema(None, sdl)
    }

    /// Adds a local schema under `name`; a missing name is generated.
    pub fn named_schema(mut self, name: Option<&str>, sdl: &str) -> Self {
        let source_name = format!("{}.graphql", name.unwrap_or("schema"));
        match TypeGraph::parse(sdl, source_name) {
            Ok(graph) => self.type_graph(name.map(str::to_string), graph),
            Err(error) => {
                self.fail(error);
                self
            }
        }
    }

    /// Adds a pre-built local type graph.
    pub fn type_graph(self, name: Option<String>, graph: TypeGraph) -> Self {
        self.step(SchemaStep { name, graph })
    }

    pub fn remote_schema(mut self, remote: RemoteSchema) -> Self {
        match RemoteSchemaStep::new(&remote) {
            Ok(step) => self.step(step),
            Err(error) => {
                self.fail(error);
                self
            }
        }
    }

    /// Binds a resolver to `path` (`Type.field`).
    pub fn resolver(mut self, path: &str, spec: impl IntoResolverSpec) -> Self {
        let spec = spec.into_resolver_spec();
        let registered = path.parse::<FieldPath>().and_then(|path| {
            self.bindings
                .register_resolver(path.clone(), spec.clone())
                .map(|()| path)
        });
        match registered {
            Ok(path) => self.step(ResolverStep { path, spec }),
            Err(error) => {
                self.fail(error);
                self
            }
        }
    }

    /// Binds resolvers by parent type and field name.
    pub fn resolvers(mut self, resolvers: ResolverMap) -> Self {
        match self.bindings.register_resolvers(resolvers.clone()) {
            Ok(()) => self.step(ResolversStep { resolvers }),
            Err(error) => {
                self.fail(error);
                self
            }
        }
    }

    /// Appends a middleware to the chain of `path` (`Type.field`).
    pub fn middleware(mut self, path: &str, middleware: impl FieldMiddleware) -> Self {
        match path.parse::<FieldPath>() {
            Ok(path) => self.step(MiddlewareStep {
                path,
                middleware: Arc::new(middleware),
            }),
            Err(error) => {
                self.fail(error);
                self
            }
        }
    }

    /// Prunes the served schema to `target_sdl`.
    pub fn transform(self, target_sdl: impl Into<String>) -> Self {
        self.step(TransformStep {
            target: target_sdl.into(),
        })
    }

    /// Adds a custom registration step.
    pub fn custom_step(self, step: impl Step) -> Self {
        self.step(step)
    }

    pub fn options(mut self, options: ServerOptions) -> Self {
        self.options = options;
        self
    }

    /// Replaces the default [`ResolverExecutor`]. The options are not applied
    /// to a custom executor.
    pub fn executor(mut self, executor: impl Executor) -> Self {
        self.executor = Some(Arc::new(executor));
        self
    }

    pub fn cache(mut self, cache: CacheStrategy) -> Self {
        self.cache = cache;
        self
    }

    pub fn conflict_policy(mut self, conflict_policy: ConflictPolicy) -> Self {
        self.conflict_policy = conflict_policy;
        self
    }

    /// Applies a loaded [`Configuration`]: cache, merge and server settings,
    /// then the configured local and remote schemas.
    pub fn configuration(mut self, configuration: &Configuration) -> Self {
        self.cache = match configuration.cache.strategy {
            CacheScope::Context => CacheStrategy::Context,
            CacheScope::Shared => CacheStrategy::shared(configuration.cache.key.clone()),
        };
        self.conflict_policy = configuration.merge.conflict_policy;
        self.options.debug = configuration.server.debug;
        self.options.tracing = configuration.server.tracing;
        self.options.cache_control = configuration
            .server
            .cache_control
            .clone()
            .map(Into::into);

        for schema in &configuration.schemas {
            self = self.named_schema(schema.name.as_deref(), &schema.sdl);
        }
        for remote in &configuration.remote_schemas {
            let forward_headers = match remote.forward_headers() {
                Ok(forward_headers) => forward_headers,
                Err(error) => {
                    self.fail(error.into());
                    continue;
                }
            };
            let mut remote_schema =
                RemoteSchema::from_url(remote.url.clone()).with_forward_headers(forward_headers);
            if let Some(name) = &remote.name {
                remote_schema = remote_schema.with_name(name.clone());
            }
            if let Some(timeout) = remote.timeout {
                remote_schema = remote_schema.with_timeout(timeout);
            }
            self = self.remote_schema(remote_schema);
        }
        self
    }

    pub fn build(self) -> Result<Stitcher, StitchError> {
        if let Some(error) = self.error {
            return Err(error);
        }
        let executor = self
            .executor
            .unwrap_or_else(|| Arc::new(ResolverExecutor::new(self.options)));
        tracing::debug!(steps = self.steps.len(), "stitcher built");
        Ok(Stitcher {
            steps: self.steps.into(),
            executor,
            cache: self.cache,
            conflict_policy: self.conflict_policy,
        })
    }
}
