//! Stitches local and remote GraphQL schemas into one executable schema.
//!
//! Schemas, resolvers and middleware are registered by [`Step`]s into a
//! per-request [`Context`]. The contributions are merged once per cache
//! lifetime, optionally pruned to a public schema, and executed with the bound
//! resolvers. Resolvers may delegate to the source that owns a root field,
//! local or remote.

pub mod json_ext;

mod cache;
pub mod configuration;
mod context;
mod delegate;
pub mod error;
mod event;
mod execution;
pub mod graphql;
mod merge;
mod middleware;
mod options;
mod pipeline;
mod registry;
pub mod remote;
mod resolver;
mod schema;
mod transform;
mod type_graph;

pub use cache::CacheStrategy;
pub use cache::SchemaCache;
pub use configuration::Configuration;
pub use context::Context;
pub use error::FetchError;
pub use error::FieldError;
pub use error::StitchError;
pub use event::ResolutionEvent;
pub use event::ResolveInfo;
pub use execution::Executor;
pub use execution::ResolverExecutor;
pub use merge::ConflictPolicy;
pub use merge::build_merged_schema;
pub use middleware::FieldMiddleware;
pub use middleware::Next;
pub use options::LogEvent;
pub use options::ServerOptions;
pub use pipeline::Step;
pub use pipeline::Stitcher;
pub use pipeline::StitcherBuilder;
pub use registry::Contribution;
pub use registry::FieldPath;
pub use registry::Registry;
pub use registry::ResolverMap;
pub use registry::Source;
pub use remote::RemoteSchema;
pub use resolver::FieldResolver;
pub use resolver::IntoResolverSpec;
pub use resolver::IsTypeOf;
pub use resolver::ResolveType;
pub use resolver::ResolverSpec;
pub use schema::StitchedSchema;
pub use transform::transform;
pub use type_graph::TypeGraph;
