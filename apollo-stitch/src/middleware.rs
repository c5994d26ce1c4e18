//! Field-level middleware chains.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::FieldError;
use crate::event::ResolutionEvent;
use crate::json_ext::Value;
use crate::resolver::FieldResolver;

/// Wraps the resolution of a field.
///
/// A middleware may inspect or rewrite the event before calling [`Next::run`],
/// post-process the result, or return without calling `next` at all.
#[async_trait]
pub trait FieldMiddleware: Send + Sync + 'static {
    async fn call(&self, event: ResolutionEvent, next: Next) -> Result<Value, FieldError>;
}

#[async_trait]
impl<F, Fut> FieldMiddleware for F
where
    F: Fn(ResolutionEvent, Next) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, FieldError>> + Send + 'static,
{
    async fn call(&self, event: ResolutionEvent, next: Next) -> Result<Value, FieldError> {
        (self)(event, next).await
    }
}

/// The rest of a middleware chain, ending with the field's resolver.
#[derive(Clone)]
pub struct Next {
    chain: Arc<[Arc<dyn FieldMiddleware>]>,
    index: usize,
    resolver: Arc<dyn FieldResolver>,
}

impl Next {
    pub(crate) fn new(
        chain: Arc<[Arc<dyn FieldMiddleware>]>,
        resolver: Arc<dyn FieldResolver>,
    ) -> Self {
        Self {
            chain,
            index: 0,
            resolver,
        }
    }

    /// Runs the remaining middleware, then the resolver.
    pub async fn run(self, event: ResolutionEvent) -> Result<Value, FieldError> {
        match self.chain.get(self.index) {
            Some(middleware) => {
                let middleware = middleware.clone();
                let next = Next {
                    index: self.index + 1,
                    ..self
                };
                middleware.call(event, next).await
            }
            None => self.resolver.resolve(event).await,
        }
    }
}
