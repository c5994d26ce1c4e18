//! What a resolver sees of the field being resolved.

use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::OperationType;
use apollo_compiler::executable::Selection;
use apollo_compiler::schema::Type;
use apollo_compiler::validation::Valid;

use crate::context::Context;
use crate::delegate;
use crate::error::FieldError;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::options::ServerOptions;
use crate::schema::StitchedSchema;

const TYPENAME: &str = "__typename";

/// One field resolution.
///
/// Built by the executor for every bound resolver, middleware and default
/// resolver call. Cloning is cheap: the documents and schemas are shared.
#[derive(Clone)]
pub struct ResolutionEvent {
    /// The value of the parent object.
    pub parent: Value,
    /// The coerced arguments of the field.
    pub args: Object,
    pub context: Arc<Context>,
    pub info: ResolveInfo,
}

impl std::fmt::Debug for ResolutionEvent {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolutionEvent")
            .field("parent", &self.parent)
            .field("args", &self.args)
            .field("info", &self.info)
            .finish()
    }
}

impl ResolutionEvent {
    /// Executes root field `field_name` of `operation_type` on the source that
    /// owns it, selecting what the current field selects.
    ///
    /// `args` defaults to the current field's arguments.
    pub async fn delegate(
        &self,
        operation_type: OperationType,
        field_name: &str,
        args: Option<Object>,
    ) -> Result<Value, FieldError> {
        let args = args.unwrap_or_else(|| self.args.clone());
        delegate::delegate(self, operation_type, field_name, &args).await
    }

    /// Executes `query` against the merged schema with the current context.
    ///
    /// Returns the value of the single root selection, or the whole `data`
    /// object when there are several.
    pub async fn delegate_query(
        &self,
        query: &str,
        variables: Option<Object>,
    ) -> Result<Value, FieldError> {
        delegate::delegate_query(self, query, variables.unwrap_or_default()).await
    }

    /// Adds fields to the selection of the current field, for delegation.
    pub fn add_fields<I, S>(&mut self, fields: I) -> Result<(), FieldError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        self.info = self.info.with_fields(fields)?;
        Ok(())
    }

    /// Adds `__typename` to the selection of the current field.
    pub fn add_typename_field(&mut self) {
        self.info = self.info.with_typename_field();
    }
}

/// The field being resolved, where it sits in the response, and the operation
/// it belongs to.
#[derive(Clone)]
pub struct ResolveInfo {
    pub(crate) field: Node<Field>,
    pub(crate) parent_type: Name,
    pub(crate) path: Path,
    pub(crate) operation_type: OperationType,
    pub(crate) document: Arc<Valid<ExecutableDocument>>,
    pub(crate) variables: Arc<Object>,
    pub(crate) schema: Arc<StitchedSchema>,
    pub(crate) merged: Arc<StitchedSchema>,
    pub(crate) options: Arc<ServerOptions>,
}

impl std::fmt::Debug for ResolveInfo {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolveInfo")
            .field("field", &self.field.name)
            .field("parent_type", &self.parent_type)
            .field("path", &self.path)
            .field("operation_type", &self.operation_type)
            .finish()
    }
}

impl ResolveInfo {
    pub fn field_name(&self) -> &Name {
        &self.field.name
    }

    /// The alias of the field if it has one, its name otherwise.
    pub fn response_key(&self) -> &Name {
        self.field.response_key()
    }

    pub fn field(&self) -> &Node<Field> {
        &self.field
    }

    pub fn parent_type(&self) -> &Name {
        &self.parent_type
    }

    pub fn return_type(&self) -> &Type {
        &self.field.definition.ty
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn operation_type(&self) -> OperationType {
        self.operation_type
    }

    pub fn document(&self) -> &Valid<ExecutableDocument> {
        &self.document
    }

    pub fn variables(&self) -> &Object {
        &self.variables
    }

    /// The schema the operation executes against.
    pub fn schema(&self) -> &Valid<Schema> {
        self.schema.schema()
    }

    /// Names of the fields directly selected on this field, fragments excluded.
    pub fn selected_fields(&self) -> Vec<&str> {
        self.field
            .selection_set
            .selections
            .iter()
            .filter_map(|selection| match selection {
                Selection::Field(field) => Some(field.name.as_str()),
                _ => None,
            })
            .collect()
    }

    /// Returns a copy whose selection set also selects `fields`.
    ///
    /// Field names are looked up on the output type of the current field. Fields
    /// already selected without an alias are not added twice.
    pub fn with_fields<I, S>(&self, fields: I) -> Result<Self, FieldError>
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let mut info = self.clone();
        let field = info.field.make_mut();
        for name in fields {
            let name = name.as_ref();
            let already_selected = field.selection_set.selections.iter().any(|selection| {
                matches!(selection, Selection::Field(f) if f.alias.is_none() && f.name == name)
            });
            if already_selected {
                continue;
            }
            let name = Name::new(name)
                .map_err(|_| FieldError::new(format!("invalid field name '{name}'")))?;
            let new_field = field
                .selection_set
                .new_field(self.schema.schema(), name.clone())
                .map_err(|_| {
                    FieldError::new(format!(
                        "cannot select {name} on type {}",
                        field.selection_set.ty
                    ))
                })?;
            field.selection_set.push(new_field);
        }
        Ok(info)
    }

    /// Returns a copy whose selection set also selects `__typename`.
    pub fn with_typename_field(&self) -> Self {
        match self.with_fields([TYPENAME]) {
            Ok(info) => info,
            // `__typename` is defined on every composite type
            Err(_) => self.clone(),
        }
    }
}
