use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::executable::Field;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::Type;
use futures::FutureExt;
use futures::future::BoxFuture;
use futures::future::join_all;

use super::engine::ExecutionContext;
use super::engine::ExecutionMode;
use super::engine::PropagateNull;
use super::engine::try_nullify;
use crate::error::FieldError;
use crate::json_ext::Path;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;

impl ExecutionContext {
    /// <https://spec.graphql.org/October2021/#CompleteValue()>
    ///
    /// Returns `Err` for a field error being propagated upwards to find a nullable place
    pub(crate) fn complete_value<'a>(
        &'a self,
        path: Path,
        ty: &'a Type,
        resolved: Value,
        fields: Vec<&'a Node<Field>>,
    ) -> BoxFuture<'a, Result<Value, PropagateNull>> {
        async move {
            let field = fields[0];
            macro_rules! field_error {
                ($($arg: tt)+) => {
                    return Err(self.field_error(FieldError::new(format!($($arg)+)), path, field))
                };
            }
            if resolved.is_null() {
                if ty.is_non_null() {
                    field_error!("Non-null type {ty} resolved to null")
                } else {
                    return Ok(Value::Null);
                }
            }
            let ty_name = match ty {
                Type::List(inner_ty) | Type::NonNullList(inner_ty) => {
                    let kind = resolved.kind();
                    let Value::Array(items) = resolved else {
                        field_error!("List type {ty} resolved to a {kind}")
                    };
                    let completed = join_all(items.into_iter().enumerate().map(|(index, item)| {
                        self.complete_value(path.join_index(index), inner_ty, item, fields.clone())
                    }))
                    .await;
                    let mut completed_list = Vec::with_capacity(completed.len());
                    for inner_result in completed {
                        // On field error, try to nullify that item
                        match try_nullify(inner_ty, inner_result) {
                            Ok(inner_value) => completed_list.push(inner_value),
                            // If the item is non-null, try to nullify the list
                            Err(PropagateNull) => return try_nullify(ty, Err(PropagateNull)),
                        }
                    }
                    return Ok(completed_list.into());
                }
                Type::Named(name) | Type::NonNullNamed(name) => name,
            };
            if resolved.is_array() {
                field_error!("Non-list type {ty} resolved to a list")
            }
            let schema = self.schema.schema();
            let Some(ty_def) = schema.types.get(ty_name) else {
                field_error!("Undefined type {ty_name}")
            };
            let object_type = match ty_def {
                ExtendedType::InputObject(_) => {
                    field_error!("Field with input object type {ty_name}")
                }
                ExtendedType::Enum(enum_def) => {
                    // https://spec.graphql.org/October2021/#sec-Enums.Result-Coercion
                    if !resolved
                        .as_str()
                        .is_some_and(|str| enum_def.values.contains_key(str))
                    {
                        field_error!("Resolver returned {resolved}, expected enum {ty_name}")
                    }
                    return Ok(resolved);
                }
                ExtendedType::Scalar(_) => {
                    if let Err(message) = check_scalar(ty_name, &resolved) {
                        field_error!("{message}")
                    }
                    return Ok(resolved);
                }
                ExtendedType::Object(_) => ty_name.clone(),
                ExtendedType::Interface(_) | ExtendedType::Union(_) => {
                    match self.resolve_abstract_type(ty_name, &resolved) {
                        Some(object_type) => object_type,
                        None => field_error!(
                            "Abstract type {ty_name} must resolve to an Object type at runtime \
                             for field {}",
                            field.name
                        ),
                    }
                }
            };
            if !resolved.is_object() {
                field_error!(
                    "Resolver returned a {} but expected an object for type {ty_name}",
                    resolved.kind()
                )
            }
            self.execute_selection_set(
                path,
                object_type,
                resolved,
                fields
                    .iter()
                    .flat_map(|field| &field.selection_set.selections)
                    .collect(),
                ExecutionMode::Concurrent,
            )
            .await
            .map(Value::Object)
        }
        .boxed()
    }

    /// Finds the concrete object type of a value of an interface or union type.
    ///
    /// Tries the `__resolveType` binding of the abstract type, the `__typename`
    /// of the value, the `is_type_of` checks bound on possible types, and finally
    /// the single possible type if there is only one.
    fn resolve_abstract_type(&self, abstract_type: &Name, value: &Value) -> Option<Name> {
        let schema = self.schema.schema();
        let possible_types: Vec<&Name> = match schema.types.get(abstract_type)? {
            ExtendedType::Union(union_type) => {
                union_type.members.iter().map(|member| &member.name).collect()
            }
            ExtendedType::Interface(_) => schema
                .types
                .iter()
                .filter_map(|(name, ty)| match ty {
                    ExtendedType::Object(object)
                        if object
                            .implements_interfaces
                            .iter()
                            .any(|interface| interface.name == *abstract_type) =>
                    {
                        Some(name)
                    }
                    _ => None,
                })
                .collect(),
            _ => return None,
        };
        let is_possible = |name: &str| {
            possible_types
                .iter()
                .find(|possible| possible.as_str() == name)
                .map(|name| (*name).clone())
        };

        if let Some(resolve_type) = self
            .schema
            .resolver(abstract_type, "__resolveType")
            .and_then(|spec| spec.resolve_type.clone())
        {
            return resolve_type(value, &self.context).and_then(|name| is_possible(&name));
        }
        if let Some(type_name) = value.get_key("__typename").and_then(Value::as_str) {
            return is_possible(type_name);
        }
        let matching = possible_types.iter().find(|possible| {
            self.schema
                .type_resolvers(possible.as_str())
                .filter_map(|spec| spec.is_type_of.as_ref())
                .any(|is_type_of| is_type_of(value, &self.context))
        });
        if let Some(matching) = matching {
            return Some((*matching).clone());
        }
        match possible_types.as_slice() {
            [single] => Some((*single).clone()),
            _ => None,
        }
    }
}

fn check_scalar(ty_name: &Name, value: &Value) -> Result<(), String> {
    match ty_name.as_str() {
        "Int" => {
            // https://spec.graphql.org/October2021/#sec-Int.Result-Coercion
            // > GraphQL services may coerce non-integer internal values to integers
            // > when reasonable without losing information
            //
            // We choose not to, to keep with Rust’s strong typing
            if let Some(int) = value.as_i64() {
                if i32::try_from(int).is_err() {
                    return Err(format!("Resolver returned {value} which overflows Int"));
                }
            } else {
                return Err(format!("Resolver returned {value}, expected Int"));
            }
        }
        "Float" => {
            // https://spec.graphql.org/October2021/#sec-Float.Result-Coercion
            if !value.is_number() {
                return Err(format!("Resolver returned {value}, expected Float"));
            }
        }
        "String" => {
            // https://spec.graphql.org/October2021/#sec-String.Result-Coercion
            if !value.is_string() {
                return Err(format!("Resolver returned {value}, expected String"));
            }
        }
        "Boolean" => {
            // https://spec.graphql.org/October2021/#sec-Boolean.Result-Coercion
            if !value.is_boolean() {
                return Err(format!("Resolver returned {value}, expected Boolean"));
            }
        }
        "ID" => {
            // https://spec.graphql.org/October2021/#sec-ID.Result-Coercion
            if !(value.is_string() || value.is_i64()) {
                return Err(format!("Resolver returned {value}, expected ID"));
            }
        }
        _ => {
            // Custom scalar: accept any JSON value (including an array or object,
            // despite this being a "leaf" as far as GraphQL resolution is concerned)
        }
    }
    Ok(())
}
