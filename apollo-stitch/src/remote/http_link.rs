use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use cynic::GraphQlResponse;
use cynic::QueryBuilder;
use cynic_introspection::query::IntrospectionQuery;
use derivative::Derivative;
use http::HeaderMap;
use serde::Serialize;
use serde::de::DeserializeOwned;
use url::Url;

use super::Link;
use crate::context::Context;
use crate::error::FetchError;
use crate::graphql;
use crate::type_graph::TypeGraph;

/// Called for every outgoing request with the context of the incoming one.
pub type HeaderHook = Arc<dyn Fn(&Context, &mut HeaderMap) + Send + Sync>;

/// A [`Link`] posting GraphQL requests as JSON over HTTP.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct HttpLink {
    name: String,
    url: Url,
    #[derivative(Debug = "ignore")]
    client: reqwest::Client,
    headers: HeaderMap,
    timeout: Option<Duration>,
    #[derivative(Debug = "ignore")]
    header_hook: Option<HeaderHook>,
}

#[buildstructor::buildstructor]
impl HttpLink {
    /// Returns a builder for an [`HttpLink`].
    ///
    /// `headers` are sent with every request, including introspection. `timeout`
    /// bounds each request.
    #[builder(visibility = "pub")]
    fn new(
        name: String,
        url: Url,
        headers: Option<HeaderMap>,
        timeout: Option<Duration>,
        client: Option<reqwest::Client>,
    ) -> Self {
        Self {
            name,
            url,
            client: client.unwrap_or_default(),
            headers: headers.unwrap_or_default(),
            timeout,
            header_hook: None,
        }
    }
}

impl HttpLink {
    /// Sets the hook deriving request headers from the incoming request context.
    pub fn with_header_hook(
        mut self,
        hook: impl Fn(&Context, &mut HeaderMap) + Send + Sync + 'static,
    ) -> Self {
        self.header_hook = Some(Arc::new(hook));
        self
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    async fn post<T>(&self, body: &impl Serialize, headers: HeaderMap) -> Result<T, FetchError>
    where
        T: DeserializeOwned,
    {
        let mut request = self.client.post(self.url.clone()).headers(headers).json(body);
        if let Some(timeout) = self.timeout {
            request = request.timeout(timeout);
        }
        tracing::debug!(service = %self.name, url = %self.url, "sending request to remote schema");
        let response = request
            .send()
            .await
            .map_err(|err| FetchError::SubrequestHttpError {
                status_code: err.status().map(|status| status.as_u16()),
                service: self.name.clone(),
                reason: err.to_string(),
            })?;
        let status = response.status();
        let body = response
            .bytes()
            .await
            .map_err(|err| FetchError::SubrequestHttpError {
                status_code: Some(status.as_u16()),
                service: self.name.clone(),
                reason: err.to_string(),
            })?;
        if !status.is_success() {
            return Err(FetchError::SubrequestHttpError {
                status_code: Some(status.as_u16()),
                service: self.name.clone(),
                reason: status
                    .canonical_reason()
                    .unwrap_or("unexpected status")
                    .to_string(),
            });
        }
        serde_json::from_slice(&body).map_err(|err| FetchError::SubrequestMalformedResponse {
            service: self.name.clone(),
            reason: err.to_string(),
        })
    }
}

#[async_trait]
impl Link for HttpLink {
    fn name(&self) -> &str {
        &self.name
    }

    #[tracing::instrument(skip_all, level = "debug", fields(service = %self.name))]
    async fn introspect(&self) -> Result<TypeGraph, FetchError> {
        let introspection_failed = |reason: String| FetchError::IntrospectionFailed {
            service: self.name.clone(),
            reason,
        };
        let operation = IntrospectionQuery::build(());
        let response: GraphQlResponse<IntrospectionQuery> =
            self.post(&operation, self.headers.clone()).await?;
        if let Some(error) = response.errors.as_ref().and_then(|errors| errors.first()) {
            return Err(introspection_failed(error.message.clone()));
        }
        let Some(data) = response.data else {
            return Err(introspection_failed("no data in introspection response".to_string()));
        };
        let schema = data
            .into_schema()
            .map_err(|err| introspection_failed(err.to_string()))?;
        TypeGraph::parse(schema.to_sdl(), format!("{}.graphql", self.name))
            .map_err(|err| introspection_failed(err.to_string()))
    }

    async fn execute(
        &self,
        request: graphql::Request,
        context: &Context,
    ) -> Result<graphql::Response, FetchError> {
        let mut headers = self.headers.clone();
        if let Some(hook) = &self.header_hook {
            hook(context, &mut headers);
        }
        self.post(&request, headers).await
    }
}
