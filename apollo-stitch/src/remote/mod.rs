//! Remote schemas: the transport seam and the descriptor of a remote contribution.

mod headers;
mod http_link;

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use derivative::Derivative;
pub use headers::ForwardHeaders;
pub use http_link::HeaderHook;
pub use http_link::HttpLink;
use url::Url;

use crate::context::Context;
use crate::error::FetchError;
use crate::error::StitchError;
use crate::graphql;
use crate::type_graph::TypeGraph;

/// Transport to a remote GraphQL service.
#[async_trait]
pub trait Link: Send + Sync + 'static {
    /// Name used in logs and transport errors.
    fn name(&self) -> &str;

    /// Fetches the type graph of the service.
    async fn introspect(&self) -> Result<TypeGraph, FetchError>;

    /// Executes `request` on behalf of the request `context` belongs to.
    async fn execute(
        &self,
        request: graphql::Request,
        context: &Context,
    ) -> Result<graphql::Response, FetchError>;
}

/// Derives a bearer token from the request context.
pub type TokenFn = Arc<dyn Fn(&Context) -> Option<String> + Send + Sync>;

/// Description of a remote schema contribution.
///
/// Either a URL, from which an [`HttpLink`] is built, or a pre-built [`Link`]
/// must be given. The bearer token and forwarded headers apply to the link
/// built from a URL; a pre-built link handles its own headers.
#[derive(Clone, Default, Derivative)]
#[derivative(Debug)]
pub struct RemoteSchema {
    pub(crate) name: Option<String>,
    pub(crate) url: Option<Url>,
    #[derivative(Debug = "ignore")]
    pub(crate) link: Option<Arc<dyn Link>>,
    pub(crate) graph: Option<TypeGraph>,
    #[derivative(Debug = "ignore")]
    pub(crate) token: Option<TokenFn>,
    pub(crate) forward_headers: ForwardHeaders,
    pub(crate) timeout: Option<Duration>,
}

impl RemoteSchema {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn from_url(url: Url) -> Self {
        Self {
            url: Some(url),
            ..Self::default()
        }
    }

    pub fn from_link(link: impl Link) -> Self {
        Self {
            link: Some(Arc::new(link)),
            ..Self::default()
        }
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    /// Uses `graph` instead of introspecting the service.
    pub fn with_graph(mut self, graph: TypeGraph) -> Self {
        self.graph = Some(graph);
        self
    }

    /// Sends `Authorization: Bearer <token>` with each request that `token` returns one for.
    pub fn with_token(
        mut self,
        token: impl Fn(&Context) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.token = Some(Arc::new(token));
        self
    }

    pub fn with_forward_headers(mut self, forward_headers: ForwardHeaders) -> Self {
        self.forward_headers = forward_headers;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }

    /// Resolves the link of this remote schema.
    pub(crate) fn link(&self) -> Result<Arc<dyn Link>, StitchError> {
        if let Some(link) = &self.link {
            return Ok(link.clone());
        }
        let Some(url) = &self.url else {
            return Err(StitchError::MissingRemoteTarget);
        };
        let name = self
            .name
            .clone()
            .or_else(|| url.host_str().map(str::to_string))
            .unwrap_or_else(|| url.to_string());
        let forward_headers = self.forward_headers.clone();
        let token = self.token.clone();
        let link = HttpLink::builder()
            .name(name)
            .url(url.clone())
            .and_timeout(self.timeout)
            .build()
            .with_header_hook(move |context, outgoing| {
                forward_headers.apply(context.headers(), outgoing);
                if let Some(token) = token.as_ref().and_then(|token| token(context)) {
                    headers::insert_bearer_token(outgoing, &token);
                }
            });
        Ok(Arc::new(link))
    }
}
