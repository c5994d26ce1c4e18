//! The executable result of stitching.

use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::executable::OperationType;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::validation::Valid;
use indexmap::IndexMap;

use crate::middleware::FieldMiddleware;
use crate::registry::Contribution;
use crate::registry::FieldPath;
use crate::registry::Source;
use crate::resolver::ResolverSpec;

/// Resolver and middleware bindings of a stitched schema.
#[derive(Default)]
pub(crate) struct Bindings {
    pub(crate) resolvers: IndexMap<FieldPath, ResolverSpec>,
    pub(crate) middlewares: IndexMap<FieldPath, Arc<[Arc<dyn FieldMiddleware>]>>,
    /// Parsed resolver fragments, keyed like `resolvers`.
    pub(crate) requirements: IndexMap<FieldPath, SelectionSet>,
}

/// Which contribution owns each root field, per operation type.
#[derive(Debug, Default, Clone)]
pub(crate) struct RootOwners {
    query: IndexMap<Name, String>,
    mutation: IndexMap<Name, String>,
    subscription: IndexMap<Name, String>,
}

impl RootOwners {
    fn table(&self, operation_type: OperationType) -> &IndexMap<Name, String> {
        match operation_type {
            OperationType::Query => &self.query,
            OperationType::Mutation => &self.mutation,
            OperationType::Subscription => &self.subscription,
        }
    }

    pub(crate) fn insert(&mut self, operation_type: OperationType, field: Name, owner: String) {
        let table = match operation_type {
            OperationType::Query => &mut self.query,
            OperationType::Mutation => &mut self.mutation,
            OperationType::Subscription => &mut self.subscription,
        };
        table.insert(field, owner);
    }

    pub(crate) fn get(&self, operation_type: OperationType, field: &str) -> Option<&str> {
        self.table(operation_type).get(field).map(String::as_str)
    }
}

/// A merged (or transformed) schema, ready to execute.
///
/// A transformed schema shares its bindings, sources and root owners with the
/// merged schema it was derived from.
#[derive(Clone)]
pub struct StitchedSchema {
    pub(crate) schema: Arc<Valid<Schema>>,
    pub(crate) bindings: Arc<Bindings>,
    pub(crate) sources: Arc<IndexMap<String, Contribution>>,
    pub(crate) root_owners: Arc<RootOwners>,
}

impl std::fmt::Debug for StitchedSchema {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StitchedSchema")
            .field("types", &self.schema.types.len())
            .field("sources", &self.sources.keys().collect::<Vec<_>>())
            .finish()
    }
}

impl StitchedSchema {
    pub fn schema(&self) -> &Valid<Schema> {
        &self.schema
    }

    /// Prints the schema as SDL.
    pub fn sdl(&self) -> String {
        self.schema.to_string()
    }

    pub fn resolver(&self, type_name: &str, field_name: &str) -> Option<&ResolverSpec> {
        let path = FieldPath::new(type_name, field_name).ok()?;
        self.bindings.resolvers.get(&path)
    }

    /// The selection a resolver bound to `type_name.field_name` needs on its parent.
    pub(crate) fn requirement(&self, type_name: &str, field_name: &str) -> Option<&SelectionSet> {
        let path = FieldPath::new(type_name, field_name).ok()?;
        self.bindings.requirements.get(&path)
    }

    pub(crate) fn middlewares(
        &self,
        type_name: &str,
        field_name: &str,
    ) -> Option<Arc<[Arc<dyn FieldMiddleware>]>> {
        let path = FieldPath::new(type_name, field_name).ok()?;
        self.bindings.middlewares.get(&path).cloned()
    }

    /// All bindings targeting `type_name`, as used for `is_type_of` checks.
    pub(crate) fn type_resolvers<'a>(
        &'a self,
        type_name: &'a str,
    ) -> impl Iterator<Item = &'a ResolverSpec> + 'a {
        self.bindings
            .resolvers
            .iter()
            .filter(move |(path, _)| path.type_name.as_str() == type_name)
            .map(|(_, spec)| spec)
    }

    /// The contribution that owns root field `field_name` of `operation_type`.
    pub fn owner(&self, operation_type: OperationType, field_name: &str) -> Option<&Contribution> {
        self.root_owners
            .get(operation_type, field_name)
            .and_then(|name| self.sources.get(name))
    }

    /// True when the root field is owned by a remote source.
    pub(crate) fn is_remote_root(&self, operation_type: OperationType, field_name: &str) -> bool {
        matches!(
            self.owner(operation_type, field_name),
            Some(Contribution {
                source: Source::Remote(_),
                ..
            })
        )
    }

    pub fn sources(&self) -> &IndexMap<String, Contribution> {
        &self.sources
    }

    /// Returns true if both values share the same bindings table.
    pub fn shares_bindings_with(&self, other: &StitchedSchema) -> bool {
        Arc::ptr_eq(&self.bindings, &other.bindings)
    }
}
