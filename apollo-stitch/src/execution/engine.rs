use std::sync::Arc;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::Operation;
use apollo_compiler::executable::OperationType;
use apollo_compiler::executable::Selection;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::Type;
use apollo_compiler::validation::Valid;
use async_trait::async_trait;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::join_all;
use indexmap::IndexMap;
use parking_lot::Mutex;

use super::input_coercion::coerce_argument_values;
use super::input_coercion::is_selected;
use crate::context::Context;
use crate::error::FieldError;
use crate::event::ResolutionEvent;
use crate::event::ResolveInfo;
use crate::graphql;
use crate::graphql::Location;
use crate::json_ext::Object;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;
use crate::middleware::Next;
use crate::options::ServerOptions;
use crate::resolver::FieldResolver;
use crate::schema::StitchedSchema;

/// Sibling fields are resolved concurrently, except for mutation root fields.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub(crate) enum ExecutionMode {
    Concurrent,
    Sequential,
}

/// Returned by execution functions when a field error was recorded and the
/// `null` value must propagate to the closest nullable parent.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PropagateNull;

/// State shared by every field of one operation.
pub(crate) struct ExecutionContext {
    pub(crate) schema: Arc<StitchedSchema>,
    pub(crate) merged: Arc<StitchedSchema>,
    pub(crate) document: Arc<Valid<ExecutableDocument>>,
    pub(crate) variables: Arc<Object>,
    pub(crate) operation_type: OperationType,
    pub(crate) context: Arc<Context>,
    pub(crate) options: Arc<ServerOptions>,
    errors: Mutex<Vec<graphql::Error>>,
}

impl ExecutionContext {
    pub(crate) fn new(
        schema: Arc<StitchedSchema>,
        merged: Arc<StitchedSchema>,
        document: Arc<Valid<ExecutableDocument>>,
        variables: Object,
        operation_type: OperationType,
        context: Arc<Context>,
        options: Arc<ServerOptions>,
    ) -> Self {
        Self {
            schema,
            merged,
            document,
            variables: Arc::new(variables),
            operation_type,
            context,
            options,
            errors: Mutex::new(Vec::new()),
        }
    }

    /// <https://spec.graphql.org/October2021/#ExecuteQuery()>
    ///
    /// The caller has checked that the schema defines the root of the operation.
    pub(crate) async fn execute_operation(
        &self,
        operation: &Operation,
        root_type: Name,
    ) -> (Value, Vec<graphql::Error>) {
        let mode = match operation.operation_type {
            OperationType::Mutation => ExecutionMode::Sequential,
            _ => ExecutionMode::Concurrent,
        };
        let root_value = self
            .options
            .root_value
            .clone()
            .unwrap_or_else(|| Value::Object(Object::new()));
        let data = self
            .execute_selection_set(
                Path::empty(),
                root_type,
                root_value,
                operation.selection_set.selections.iter().collect(),
                mode,
            )
            .await;
        let data = match data {
            Ok(object) => Value::Object(object),
            Err(PropagateNull) => Value::Null,
        };
        (data, std::mem::take(&mut *self.errors.lock()))
    }

    /// <https://spec.graphql.org/October2021/#ExecuteSelectionSet()>
    pub(crate) fn execute_selection_set<'a>(
        &'a self,
        path: Path,
        object_type: Name,
        parent: Value,
        selections: Vec<&'a Selection>,
        mode: ExecutionMode,
    ) -> BoxFuture<'a, Result<Object, PropagateNull>> {
        async move {
            let grouped = self.collect_fields(&object_type, selections);
            let mut data = Object::new();
            match mode {
                ExecutionMode::Concurrent => {
                    let results = join_all(grouped.iter().map(|(key, fields)| {
                        self.execute_field(
                            path.join_key(key.as_str()),
                            &object_type,
                            &parent,
                            fields,
                        )
                    }))
                    .await;
                    for ((key, fields), result) in grouped.iter().zip(results) {
                        let value = try_nullify(&fields[0].definition.ty, result)?;
                        data.insert(key.as_str(), value);
                    }
                }
                ExecutionMode::Sequential => {
                    for (key, fields) in &grouped {
                        let result = self
                            .execute_field(
                                path.join_key(key.as_str()),
                                &object_type,
                                &parent,
                                fields,
                            )
                            .await;
                        let value = try_nullify(&fields[0].definition.ty, result)?;
                        data.insert(key.as_str(), value);
                    }
                }
            }
            Ok(data)
        }
        .boxed()
    }

    /// <https://spec.graphql.org/October2021/#CollectFields()>
    pub(crate) fn collect_fields<'a>(
        &'a self,
        object_type: &Name,
        selections: Vec<&'a Selection>,
    ) -> IndexMap<Name, Vec<&'a Node<Field>>> {
        let mut grouped: IndexMap<Name, Vec<&'a Node<Field>>> = IndexMap::new();
        let mut visited_fragments = Vec::new();
        self.collect_fields_into(object_type, selections, &mut visited_fragments, &mut grouped);
        grouped
    }

    fn collect_fields_into<'a>(
        &'a self,
        object_type: &Name,
        selections: Vec<&'a Selection>,
        visited_fragments: &mut Vec<&'a Name>,
        grouped: &mut IndexMap<Name, Vec<&'a Node<Field>>>,
    ) {
        for selection in selections {
            if !is_selected(selection.directives(), &self.variables) {
                continue;
            }
            match selection {
                Selection::Field(field) => grouped
                    .entry(field.response_key().clone())
                    .or_default()
                    .push(field),
                Selection::FragmentSpread(spread) => {
                    if visited_fragments.contains(&&spread.fragment_name) {
                        continue;
                    }
                    visited_fragments.push(&spread.fragment_name);
                    let Some(fragment) = self.document.fragments.get(&spread.fragment_name) else {
                        continue;
                    };
                    if !self.does_fragment_type_apply(object_type, fragment.type_condition()) {
                        continue;
                    }
                    self.collect_fields_into(
                        object_type,
                        fragment.selection_set.selections.iter().collect(),
                        visited_fragments,
                        grouped,
                    );
                }
                Selection::InlineFragment(inline) => {
                    if let Some(condition) = &inline.type_condition {
                        if !self.does_fragment_type_apply(object_type, condition) {
                            continue;
                        }
                    }
                    self.collect_fields_into(
                        object_type,
                        inline.selection_set.selections.iter().collect(),
                        visited_fragments,
                        grouped,
                    );
                }
            }
        }
    }

    /// <https://spec.graphql.org/October2021/#DoesFragmentTypeApply()>
    pub(crate) fn does_fragment_type_apply(&self, object_type: &Name, condition: &Name) -> bool {
        let schema = self.schema.schema();
        match schema.types.get(condition) {
            Some(ExtendedType::Object(_)) => condition == object_type,
            Some(ExtendedType::Interface(_)) => {
                schema.get_object(object_type).is_some_and(|object| {
                    object
                        .implements_interfaces
                        .iter()
                        .any(|interface| interface.name == *condition)
                })
            }
            Some(ExtendedType::Union(union_type)) => union_type
                .members
                .iter()
                .any(|member| member.name == *object_type),
            _ => false,
        }
    }

    /// <https://spec.graphql.org/October2021/#ExecuteField()>
    async fn execute_field<'a>(
        &'a self,
        path: Path,
        object_type: &Name,
        parent: &Value,
        fields: &[&'a Node<Field>],
    ) -> Result<Value, PropagateNull> {
        let field = fields[0];
        if field.name == "__typename" {
            return Ok(object_type.as_str().into());
        }
        if field.name == "__schema" || field.name == "__type" {
            return Err(self.field_error(
                FieldError::new("introspection is not supported by the stitched executor"),
                path,
                field,
            ));
        }
        let args = match coerce_argument_values(field, &self.variables) {
            Ok(args) => args,
            Err(error) => return Err(self.field_error(error, path, field)),
        };
        let event = ResolutionEvent {
            parent: parent.clone(),
            args,
            context: self.context.clone(),
            info: ResolveInfo {
                field: field.clone(),
                parent_type: object_type.clone(),
                path: path.clone(),
                operation_type: self.operation_type,
                document: self.document.clone(),
                variables: self.variables.clone(),
                schema: self.schema.clone(),
                merged: self.merged.clone(),
                options: self.options.clone(),
            },
        };
        let resolver = self.resolver_for(object_type, field, path.len() == 1);
        let resolved = match self.schema.middlewares(object_type, &field.name) {
            Some(chain) => Next::new(chain, resolver).run(event).await,
            None => resolver.resolve(event).await,
        };
        match resolved {
            Ok(value) => {
                self.complete_value(path, &field.definition.ty, value, fields.to_vec())
                    .await
            }
            Err(error) => {
                tracing::debug!(path = %path, error = %error, "field resolution failed");
                Err(self.field_error(error, path, field))
            }
        }
    }

    /// Picks, in order: the bound resolver, delegation to the remote owner of a
    /// root field, the configured field resolver, then property lookup.
    fn resolver_for(
        &self,
        object_type: &Name,
        field: &Field,
        is_root: bool,
    ) -> Arc<dyn FieldResolver> {
        if let Some(spec) = self.schema.resolver(object_type, &field.name) {
            return spec.resolve.clone();
        }
        if is_root
            && self.is_root_type(object_type)
            && self.merged.is_remote_root(self.operation_type, &field.name)
        {
            return Arc::new(DelegateToOwner {
                operation_type: self.operation_type,
            });
        }
        if let Some(field_resolver) = &self.options.field_resolver {
            return field_resolver.clone();
        }
        Arc::new(PropertyResolver)
    }

    fn is_root_type(&self, object_type: &Name) -> bool {
        self.schema
            .schema()
            .root_operation(self.operation_type)
            .is_some_and(|root| root == object_type)
    }

    /// Records a field error and returns the marker to propagate `null`.
    pub(crate) fn field_error(
        &self,
        error: FieldError,
        path: Path,
        field: &Node<Field>,
    ) -> PropagateNull {
        let locations = field
            .line_column_range(&self.document.sources)
            .map(|range| Location {
                line: range.start.line as u32,
                column: range.start.column as u32,
            })
            .into_iter()
            .collect();
        self.errors.lock().push(error.into_graphql_error(path, locations));
        PropagateNull
    }
}

/// Returns `null` in place of a propagated error when the type is nullable.
pub(crate) fn try_nullify(
    ty: &Type,
    result: Result<Value, PropagateNull>,
) -> Result<Value, PropagateNull> {
    match result {
        Ok(value) => Ok(value),
        Err(PropagateNull) if ty.is_non_null() => Err(PropagateNull),
        Err(PropagateNull) => Ok(Value::Null),
    }
}

/// Resolves a field by reading it from the parent value, under its response
/// key first and its name second.
struct PropertyResolver;

#[async_trait]
impl FieldResolver for PropertyResolver {
    async fn resolve(&self, event: ResolutionEvent) -> Result<Value, FieldError> {
        let info = &event.info;
        Ok(event
            .parent
            .get_key(info.response_key().as_str())
            .or_else(|| event.parent.get_key(info.field_name().as_str()))
            .cloned()
            .unwrap_or_default())
    }
}

/// Resolves a root field owned by a remote source by delegating it.
struct DelegateToOwner {
    operation_type: OperationType,
}

#[async_trait]
impl FieldResolver for DelegateToOwner {
    async fn resolve(&self, event: ResolutionEvent) -> Result<Value, FieldError> {
        let field_name = event.info.field_name().clone();
        event.delegate(self.operation_type, &field_name, None).await
    }
}
