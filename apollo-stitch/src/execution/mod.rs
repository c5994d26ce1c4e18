//! Execution of operations against a stitched schema.
//!
//! The engine follows the algorithms of the GraphQL specification
//! (`CollectFields`, `ExecuteField`, `CompleteValue`) over `apollo-compiler`
//! documents, with asynchronous resolvers:
//!
//! * sibling fields are resolved concurrently, mutation root fields in order,
//! * every resolver call goes through the middleware chain bound to its field,
//! * root fields owned by a remote source are delegated to it.

pub(crate) mod engine;
pub(crate) mod input_coercion;
pub(crate) mod result_coercion;

use std::sync::Arc;
use std::time::Instant;
use std::time::SystemTime;

use apollo_compiler::ast;
use apollo_compiler::executable::OperationType;
use apollo_compiler::validation::DiagnosticList;
use async_trait::async_trait;
use serde_json_bytes::json;

use self::engine::ExecutionContext;
use crate::context::Context;
use crate::graphql;
use crate::options::LogEvent;
use crate::options::ServerOptions;
use crate::schema::StitchedSchema;

pub(crate) const PARSE_FAILED_CODE: &str = "GRAPHQL_PARSE_FAILED";
pub(crate) const VALIDATION_FAILED_CODE: &str = "GRAPHQL_VALIDATION_FAILED";

/// Runs requests against a stitched schema.
///
/// `schema` is the schema clients see (the transformed schema when a transform
/// is registered); `merged` is the full merged schema, used to find the owner of
/// delegated root fields.
#[async_trait]
pub trait Executor: Send + Sync + 'static {
    async fn execute(
        &self,
        schema: Arc<StitchedSchema>,
        merged: Arc<StitchedSchema>,
        request: graphql::Request,
        context: Arc<Context>,
    ) -> graphql::Response;
}

/// The default [`Executor`]: resolves fields with the bound resolvers and
/// applies [`ServerOptions`] to every request.
#[derive(Clone, Debug, Default)]
pub struct ResolverExecutor {
    options: Arc<ServerOptions>,
}

impl ResolverExecutor {
    pub fn new(options: ServerOptions) -> Self {
        Self {
            options: Arc::new(options),
        }
    }

    pub fn options(&self) -> &ServerOptions {
        &self.options
    }
}

#[async_trait]
impl Executor for ResolverExecutor {
    async fn execute(
        &self,
        schema: Arc<StitchedSchema>,
        merged: Arc<StitchedSchema>,
        request: graphql::Request,
        context: Arc<Context>,
    ) -> graphql::Response {
        execute_request(schema, merged, request, context, self.options.clone()).await
    }
}

/// Executes a client request, applying the request and response hooks of `options`.
#[tracing::instrument(
    skip_all,
    level = "debug",
    fields(operation_name = request.operation_name.as_deref().unwrap_or_default())
)]
pub(crate) async fn execute_request(
    schema: Arc<StitchedSchema>,
    merged: Arc<StitchedSchema>,
    request: graphql::Request,
    context: Arc<Context>,
    options: Arc<ServerOptions>,
) -> graphql::Response {
    let start_time = SystemTime::now();
    let started = Instant::now();
    let request = match &options.format_params {
        Some(format_params) => format_params(request, &context),
        None => request,
    };
    options.log(LogEvent::RequestStarted {
        query: request.query.clone(),
        operation_name: request.operation_name.clone(),
    });

    let mut response = execute(schema, merged, request, context, options.clone()).await;

    if !options.debug {
        for error in &mut response.errors {
            error.extensions.remove("exception");
        }
    }
    if let Some(format_error) = &options.format_error {
        response.errors = response.errors.into_iter().map(|error| format_error(error)).collect();
    }
    if options.tracing {
        let end_time = SystemTime::now();
        response.extensions.insert(
            "tracing",
            json!({
                "version": 1,
                "startTime": humantime::format_rfc3339_millis(start_time).to_string(),
                "endTime": humantime::format_rfc3339_millis(end_time).to_string(),
                "duration": started.elapsed().as_nanos() as u64,
            }),
        );
    }
    if let Some(cache_control) = &options.cache_control {
        response.extensions.insert("cacheControl", cache_control.clone());
    }
    let response = match &options.format_response {
        Some(format_response) => format_response(response),
        None => response,
    };
    tracing::debug!(errors = response.errors.len(), "request executed");
    options.log(LogEvent::Executed {
        errors: response.errors.len(),
    });
    response
}

/// Parses, validates and executes `request` without the request hooks.
///
/// Delegation to the merged schema goes through here, so that a delegated
/// operation is not formatted or logged as a client request.
pub(crate) async fn execute(
    schema: Arc<StitchedSchema>,
    merged: Arc<StitchedSchema>,
    request: graphql::Request,
    context: Arc<Context>,
    options: Arc<ServerOptions>,
) -> graphql::Response {
    let Some(query) = request.query.as_deref() else {
        return request_error("Must provide query string.", PARSE_FAILED_CODE);
    };
    let parsed = match ast::Document::parse(query, "query.graphql") {
        Ok(parsed) => parsed,
        Err(with_errors) => {
            return graphql::Response::from_errors(diagnostics(
                &with_errors.errors,
                PARSE_FAILED_CODE,
            ));
        }
    };
    options.log(LogEvent::Parsed);

    let operation_type = requested_operation_type(&parsed, request.operation_name.as_deref());
    if let Some(operation_type) = operation_type {
        if operation_type == OperationType::Subscription {
            return request_error("subscriptions are not supported", VALIDATION_FAILED_CODE);
        }
        if schema.schema().root_operation(operation_type).is_none() {
            return request_error(
                format!("{} is not supported", describe(operation_type)),
                VALIDATION_FAILED_CODE,
            );
        }
    }

    let document = match parsed.to_executable_validate(schema.schema()) {
        Ok(document) => Arc::new(document),
        Err(with_errors) => {
            return graphql::Response::from_errors(diagnostics(
                &with_errors.errors,
                VALIDATION_FAILED_CODE,
            ));
        }
    };
    let rule_errors: Vec<graphql::Error> = options
        .validation_rules
        .iter()
        .flat_map(|rule| rule(schema.schema(), &document))
        .map(|error| with_default_code(error, VALIDATION_FAILED_CODE))
        .collect();
    if !rule_errors.is_empty() {
        return graphql::Response::from_errors(rule_errors);
    }
    options.log(LogEvent::Validated);

    let Ok(operation) = document.operations.get(request.operation_name.as_deref()) else {
        let message = match &request.operation_name {
            Some(name) => format!("Unknown operation named \"{name}\"."),
            None => {
                "Must provide operation name if query contains multiple operations.".to_string()
            }
        };
        return request_error(message, VALIDATION_FAILED_CODE);
    };
    let Some(root_type) = schema.schema().root_operation(operation.operation_type).cloned() else {
        return request_error(
            format!("{} is not supported", describe(operation.operation_type)),
            VALIDATION_FAILED_CODE,
        );
    };
    let variables = match input_coercion::coerce_variable_values(
        schema.schema(),
        operation,
        &request.variables,
    ) {
        Ok(variables) => variables,
        Err(message) => return request_error(message, VALIDATION_FAILED_CODE),
    };

    let execution = ExecutionContext::new(
        schema,
        merged,
        document.clone(),
        variables,
        operation.operation_type,
        context,
        options,
    );
    let (data, errors) = execution.execute_operation(operation, root_type).await;
    graphql::Response::builder().data(data).errors(errors).build()
}

/// The type of the operation a request selects, if it can be told from the
/// document alone.
fn requested_operation_type(
    document: &ast::Document,
    operation_name: Option<&str>,
) -> Option<OperationType> {
    let mut operations = document.definitions.iter().filter_map(|definition| match definition {
        ast::Definition::OperationDefinition(operation) => Some(operation),
        _ => None,
    });
    match operation_name {
        Some(name) => operations
            .find(|operation| operation.name.as_ref().is_some_and(|n| n.as_str() == name))
            .map(|operation| operation.operation_type),
        None => {
            let first = operations.next()?;
            operations.next().is_none().then_some(first.operation_type)
        }
    }
}

pub(crate) fn describe(operation_type: OperationType) -> &'static str {
    match operation_type {
        OperationType::Query => "query",
        OperationType::Mutation => "mutation",
        OperationType::Subscription => "subscription",
    }
}

fn request_error(message: impl Into<String>, code: &str) -> graphql::Response {
    graphql::Response::from_errors(vec![
        graphql::Error::builder()
            .message(message)
            .extension_code(code)
            .build(),
    ])
}

fn diagnostics(errors: &DiagnosticList, code: &str) -> Vec<graphql::Error> {
    errors
        .iter()
        .map(|diagnostic| with_default_code(diagnostic.to_json().into(), code))
        .collect()
}

fn with_default_code(mut error: graphql::Error, code: &str) -> graphql::Error {
    error
        .extensions
        .entry("code")
        .or_insert_with(|| code.into());
    error
}
