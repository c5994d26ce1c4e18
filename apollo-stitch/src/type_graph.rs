//! Schema fragments contributed to the stitched schema.

use std::str::FromStr;

use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::executable::OperationType;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;

use crate::error::StitchError;

/// A schema's named types and their fields, independent of where it came from.
///
/// Built from SDL text, from an already built [`Schema`], or from the
/// introspection result of a remote source. Orphan `extend type` blocks are
/// adopted, so a fragment may extend a type owned by another contribution.
#[derive(Debug, Clone)]
pub struct TypeGraph {
    schema: Schema,
}

impl TypeGraph {
    /// Parses SDL text. `path` names the document in diagnostics.
    pub fn parse(
        sdl: impl AsRef<str>,
        path: impl AsRef<std::path::Path>,
    ) -> Result<Self, StitchError> {
        let path = path.as_ref();
        let schema = Schema::builder()
            .adopt_orphan_extensions()
            .parse(sdl.as_ref(), path)
            .build()
            .map_err(|errors| StitchError::parse(path.display().to_string(), errors))?;
        Ok(Self { schema })
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn into_inner(self) -> Schema {
        self.schema
    }

    /// The type names this fragment defines, built-in types excluded.
    pub fn type_names(&self) -> impl Iterator<Item = &Name> {
        self.schema
            .types
            .iter()
            .filter(|(_, ty)| !ty.is_built_in())
            .map(|(name, _)| name)
    }

    /// Returns true if `type_name` is defined here and has a field named `field_name`.
    pub fn has_field(&self, type_name: &str, field_name: &str) -> bool {
        match self.schema.types.get(type_name) {
            Some(ExtendedType::Object(ty)) => ty.fields.contains_key(field_name),
            Some(ExtendedType::Interface(ty)) => ty.fields.contains_key(field_name),
            _ => false,
        }
    }

    /// The name of the root type for `operation_type`, if this fragment declares one.
    pub fn root_operation(&self, operation_type: OperationType) -> Option<&Name> {
        self.schema.root_operation(operation_type)
    }

    /// Prints the fragment back to SDL.
    pub fn to_sdl(&self) -> String {
        self.schema.to_string()
    }
}

impl FromStr for TypeGraph {
    type Err = StitchError;

    fn from_str(sdl: &str) -> Result<Self, Self::Err> {
        Self::parse(sdl, "schema.graphql")
    }
}

impl From<Schema> for TypeGraph {
    fn from(schema: Schema) -> Self {
        Self { schema }
    }
}

impl From<Valid<Schema>> for TypeGraph {
    fn from(schema: Valid<Schema>) -> Self {
        Self {
            schema: schema.into_inner(),
        }
    }
}
