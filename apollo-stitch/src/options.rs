//! Options applied by the executor to every request.

use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Schema;
use apollo_compiler::validation::Valid;
use derivative::Derivative;

use crate::context::Context;
use crate::graphql;
use crate::json_ext::Value;
use crate::resolver::FieldResolver;

pub type FormatError = Arc<dyn Fn(graphql::Error) -> graphql::Error + Send + Sync>;
pub type FormatParams = Arc<dyn Fn(graphql::Request, &Context) -> graphql::Request + Send + Sync>;
pub type FormatResponse = Arc<dyn Fn(graphql::Response) -> graphql::Response + Send + Sync>;
pub type LogFunction = Arc<dyn Fn(&LogEvent) + Send + Sync>;
pub type ValidationRule =
    Arc<dyn Fn(&Valid<Schema>, &Valid<ExecutableDocument>) -> Vec<graphql::Error> + Send + Sync>;

/// The stages of a request reported to [`ServerOptions::log_function`].
#[derive(Clone, Debug, PartialEq)]
pub enum LogEvent {
    RequestStarted {
        query: Option<String>,
        operation_name: Option<String>,
    },
    Parsed,
    Validated,
    Executed {
        errors: usize,
    },
}

/// Request handling options.
#[derive(Clone, Derivative)]
#[derivative(Debug, Default)]
pub struct ServerOptions {
    #[derivative(Debug = "ignore")]
    pub format_error: Option<FormatError>,
    /// Parent value of root fields.
    pub root_value: Option<Value>,
    #[derivative(Debug = "ignore")]
    pub log_function: Option<LogFunction>,
    #[derivative(Debug = "ignore")]
    pub format_params: Option<FormatParams>,
    #[derivative(Debug = "ignore")]
    pub validation_rules: Vec<ValidationRule>,
    #[derivative(Debug = "ignore")]
    pub format_response: Option<FormatResponse>,
    /// Replaces property lookup for fields without a bound resolver.
    #[derivative(Debug = "ignore")]
    pub field_resolver: Option<Arc<dyn FieldResolver>>,
    /// Keeps `extensions.exception` on errors.
    #[derivative(Default(value = "true"))]
    pub debug: bool,
    /// Adds timing information under `extensions.tracing`.
    pub tracing: bool,
    /// Copied to `extensions.cacheControl`.
    pub cache_control: Option<Value>,
}

impl ServerOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_format_error(
        mut self,
        format_error: impl Fn(graphql::Error) -> graphql::Error + Send + Sync + 'static,
    ) -> Self {
        self.format_error = Some(Arc::new(format_error));
        self
    }

    pub fn with_root_value(mut self, root_value: impl Into<Value>) -> Self {
        self.root_value = Some(root_value.into());
        self
    }

    pub fn with_log_function(mut self, log: impl Fn(&LogEvent) + Send + Sync + 'static) -> Self {
        self.log_function = Some(Arc::new(log));
        self
    }

    pub fn with_format_params(
        mut self,
        format_params: impl Fn(graphql::Request, &Context) -> graphql::Request
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.format_params = Some(Arc::new(format_params));
        self
    }

    pub fn with_validation_rule(
        mut self,
        rule: impl Fn(&Valid<Schema>, &Valid<ExecutableDocument>) -> Vec<graphql::Error>
        + Send
        + Sync
        + 'static,
    ) -> Self {
        self.validation_rules.push(Arc::new(rule));
        self
    }

    pub fn with_format_response(
        mut self,
        format_response: impl Fn(graphql::Response) -> graphql::Response + Send + Sync + 'static,
    ) -> Self {
        self.format_response = Some(Arc::new(format_response));
        self
    }

    pub fn with_field_resolver(mut self, resolver: impl FieldResolver) -> Self {
        self.field_resolver = Some(Arc::new(resolver));
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn with_tracing(mut self, tracing: bool) -> Self {
        self.tracing = tracing;
        self
    }

    pub fn with_cache_control(mut self, cache_control: impl Into<Value>) -> Self {
        self.cache_control = Some(cache_control.into());
        self
    }

    pub(crate) fn log(&self, event: LogEvent) {
        if let Some(log) = &self.log_function {
            log(&event);
        }
    }
}
