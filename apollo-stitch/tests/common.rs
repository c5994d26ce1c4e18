use std::sync::Arc;

use apollo_stitch::Context;
use apollo_stitch::FetchError;
use apollo_stitch::Stitcher;
use apollo_stitch::TypeGraph;
use apollo_stitch::graphql;
use apollo_stitch::remote::Link;
use async_trait::async_trait;
use http::HeaderMap;
use parking_lot::Mutex;

pub(crate) fn request(query: &str) -> graphql::Request {
    graphql::Request::builder().query(query).build()
}

pub(crate) async fn execute(stitcher: &Stitcher, query: &str) -> graphql::Response {
    stitcher.execute(request(query), HeaderMap::new()).await
}

/// A [`Link`] to a stitcher running in the same process, recording the
/// requests and headers it receives.
#[derive(Clone)]
pub(crate) struct InProcessLink {
    name: String,
    stitcher: Stitcher,
    pub(crate) received: Arc<Mutex<Vec<(graphql::Request, HeaderMap)>>>,
}

impl InProcessLink {
    pub(crate) fn new(name: &str, stitcher: Stitcher) -> Self {
        Self {
            name: name.to_string(),
            stitcher,
            received: Default::default(),
        }
    }

    pub(crate) fn queries(&self) -> Vec<String> {
        self.received
            .lock()
            .iter()
            .filter_map(|(request, _)| request.query.clone())
            .collect()
    }
}

#[async_trait]
impl Link for InProcessLink {
    fn name(&self) -> &str {
        &self.name
    }

    async fn introspect(&self) -> Result<TypeGraph, FetchError> {
        let schema = self.stitcher.stitched_schema().await.map_err(|error| {
            FetchError::IntrospectionFailed {
                service: self.name.clone(),
                reason: error.to_string(),
            }
        })?;
        TypeGraph::parse(schema.sdl(), format!("{}.graphql", self.name)).map_err(|error| {
            FetchError::IntrospectionFailed {
                service: self.name.clone(),
                reason: error.to_string(),
            }
        })
    }

    async fn execute(
        &self,
        request: graphql::Request,
        context: &Context,
    ) -> Result<graphql::Response, FetchError> {
        self.received
            .lock()
            .push((request.clone(), context.headers().clone()));
        Ok(self
            .stitcher
            .execute(request, context.headers().clone())
            .await)
    }
}
