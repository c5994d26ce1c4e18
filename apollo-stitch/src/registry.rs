//! Accumulates schema contributions and resolver/middleware bindings.

use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use apollo_compiler::Name;
use indexmap::IndexMap;
use indexmap::map::Entry;

use crate::error::StitchError;
use crate::middleware::FieldMiddleware;
use crate::remote::Link;
use crate::resolver::IntoResolverSpec;
use crate::resolver::ResolverSpec;
use crate::type_graph::TypeGraph;

/// The address of a field binding: `Parent.field`.
#[derive(Clone, Debug, PartialEq, Eq, Hash)]
pub struct FieldPath {
    pub type_name: Name,
    pub field_name: Name,
}

impl FieldPath {
    pub fn new(type_name: &str, field_name: &str) -> Result<Self, StitchError> {
        let invalid = || StitchError::InvalidFieldPath {
            path: format!("{type_name}.{field_name}"),
        };
        Ok(Self {
            type_name: Name::new(type_name).map_err(|_| invalid())?,
            field_name: Name::new(field_name).map_err(|_| invalid())?,
        })
    }
}

impl FromStr for FieldPath {
    type Err = StitchError;

    fn from_str(path: &str) -> Result<Self, Self::Err> {
        match path.split_once('.') {
            Some((type_name, field_name)) => Self::new(type_name, field_name),
            None => Err(StitchError::InvalidFieldPath {
                path: path.to_string(),
            }),
        }
    }
}

impl TryFrom<&str> for FieldPath {
    type Error = StitchError;

    fn try_from(path: &str) -> Result<Self, Self::Error> {
        path.parse()
    }
}

impl fmt::Display for FieldPath {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}", self.type_name, self.field_name)
    }
}

/// Where the data of a contribution lives.
#[derive(Clone)]
pub enum Source {
    /// Resolved in process by bound resolvers or default property resolution.
    Local,
    /// Owned by a remote service; root fields are delegated through the link.
    Remote(Arc<dyn Link>),
}

impl fmt::Debug for Source {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Source::Local => f.write_str("Local"),
            Source::Remote(link) => f.debug_tuple("Remote").field(&link.name()).finish(),
        }
    }
}

/// A named schema fragment.
#[derive(Clone, Debug)]
pub struct Contribution {
    pub name: String,
    pub graph: TypeGraph,
    pub source: Source,
}

/// Bulk resolver registration: parent type name, then field name.
pub type ResolverMap = IndexMap<String, IndexMap<String, ResolverSpec>>;

/// Everything contributed to one stitched schema, in registration order.
#[derive(Clone, Default)]
pub struct Registry {
    schemas: IndexMap<String, Contribution>,
    resolvers: IndexMap<FieldPath, ResolverSpec>,
    middlewares: IndexMap<FieldPath, Vec<Arc<dyn FieldMiddleware>>>,
    transform: Option<String>,
}

impl fmt::Debug for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Registry")
            .field("schemas", &self.schemas.keys().collect::<Vec<_>>())
            .field(
                "resolvers",
                &self.resolvers.keys().map(ToString::to_string).collect::<Vec<_>>(),
            )
            .field(
                "middlewares",
                &self.middlewares.keys().map(ToString::to_string).collect::<Vec<_>>(),
            )
            .field("transform", &self.transform.is_some())
            .finish()
    }
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a local schema fragment and returns the name it was stored under.
    ///
    /// A missing name becomes `schema<N>`, `N` being the number of contributions
    /// already registered. Re-using a name replaces that contribution in place.
    pub fn register_schema(&mut self, name: Option<String>, graph: TypeGraph) -> String {
        self.insert_contribution(name, graph, Source::Local)
    }

    /// Registers the type graph of a remote source together with its link.
    pub fn register_remote_schema(
        &mut self,
        name: Option<String>,
        graph: TypeGraph,
        link: Arc<dyn Link>,
    ) -> String {
        self.insert_contribution(name, graph, Source::Remote(link))
    }

    fn insert_contribution(
        &mut self,
        name: Option<String>,
        graph: TypeGraph,
        source: Source,
    ) -> String {
        let name = name.unwrap_or_else(|| format!("schema{}", self.schemas.len()));
        tracing::debug!(schema = %name, "registering schema contribution");
        self.schemas.insert(
            name.clone(),
            Contribution {
                name: name.clone(),
                graph,
                source,
            },
        );
        name
    }

    /// Binds a resolver to `path`. Only one resolver may be bound per path; the
    /// first binding is kept.
    pub fn register_resolver(
        &mut self,
        path: FieldPath,
        spec: impl IntoResolverSpec,
    ) -> Result<(), StitchError> {
        match self.resolvers.entry(path) {
            Entry::Occupied(entry) => Err(StitchError::DuplicateResolver {
                path: entry.key().clone(),
            }),
            Entry::Vacant(entry) => {
                tracing::debug!(path = %entry.key(), "registering resolver");
                entry.insert(spec.into_resolver_spec());
                Ok(())
            }
        }
    }

    /// Binds a set of resolvers at once. Nothing is registered unless every path
    /// is valid and free.
    pub fn register_resolvers(&mut self, resolvers: ResolverMap) -> Result<(), StitchError> {
        let mut pending = IndexMap::new();
        for (type_name, fields) in resolvers {
            for (field_name, spec) in fields {
                let path = FieldPath::new(&type_name, &field_name)?;
                if self.resolvers.contains_key(&path) || pending.contains_key(&path) {
                    return Err(StitchError::DuplicateResolver { path });
                }
                pending.insert(path, spec);
            }
        }
        tracing::debug!(count = pending.len(), "registering resolvers");
        self.resolvers.extend(pending);
        Ok(())
    }

    /// Appends a middleware to the chain of `path`.
    pub fn register_middleware(&mut self, path: FieldPath, middleware: Arc<dyn FieldMiddleware>) {
        tracing::debug!(%path, "registering middleware");
        self.middlewares.entry(path).or_default().push(middleware);
    }

    /// Sets the SDL the merged schema is pruned to. The last registration wins.
    pub fn register_transform(&mut self, target: impl Into<String>) {
        self.transform = Some(target.into());
    }

    pub fn schemas(&self) -> &IndexMap<String, Contribution> {
        &self.schemas
    }

    pub fn resolvers(&self) -> &IndexMap<FieldPath, ResolverSpec> {
        &self.resolvers
    }

    pub fn resolver(&self, path: &FieldPath) -> Option<&ResolverSpec> {
        self.resolvers.get(path)
    }

    pub fn middlewares(&self) -> &IndexMap<FieldPath, Vec<Arc<dyn FieldMiddleware>>> {
        &self.middlewares
    }

    pub fn transform(&self) -> Option<&str> {
        self.transform.as_deref()
    }
}
