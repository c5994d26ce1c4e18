use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast;
use apollo_compiler::executable::Field;
use apollo_compiler::executable::Operation;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::Type;

use crate::error::FieldError;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::json_ext::ValueExt;

/// <https://spec.graphql.org/October2021/#CoerceVariableValues()>
pub(crate) fn coerce_variable_values(
    schema: &Schema,
    operation: &Operation,
    values: &Object,
) -> Result<Object, String> {
    let mut coerced = Object::new();
    for variable in &operation.variables {
        let name = variable.name.as_str();
        match values.get(name) {
            Some(value) => {
                let value = coerce_input_value(schema, &variable.ty, value)
                    .map_err(|reason| format!("Variable ${name} got invalid value: {reason}"))?;
                coerced.insert(name, value);
            }
            None => {
                if let Some(default) = &variable.default_value {
                    coerced.insert(name, value_to_json(default, &Object::new()));
                } else if variable.ty.is_non_null() {
                    return Err(format!(
                        "Variable ${name} of required type {} was not provided",
                        variable.ty
                    ));
                }
            }
        }
    }
    Ok(coerced)
}

/// <https://spec.graphql.org/October2021/#CoerceArgumentValues()>
pub(crate) fn coerce_argument_values(
    field: &Field,
    variables: &Object,
) -> Result<Object, FieldError> {
    let mut coerced = Object::new();
    for definition in &field.definition.arguments {
        let name = definition.name.as_str();
        let given = field
            .arguments
            .iter()
            .find(|argument| argument.name == definition.name)
            .map(|argument| &argument.value);
        let value = match given.map(|value| value.as_ref()) {
            Some(ast::Value::Variable(variable)) => variables.get(variable.as_str()).cloned(),
            Some(value) => Some(value_to_json(value, variables)),
            None => None,
        };
        match value {
            Some(value) => {
                if value.is_null() && definition.ty.is_non_null() {
                    return Err(FieldError::new(format!(
                        "Argument {name} of non-null type {} must not be null",
                        definition.ty
                    )));
                }
                coerced.insert(name, value);
            }
            None => {
                if let Some(default) = &definition.default_value {
                    coerced.insert(name, value_to_json(default, variables));
                } else if definition.ty.is_non_null() {
                    return Err(FieldError::new(format!(
                        "Argument {name} of required type {} was not provided",
                        definition.ty
                    )));
                }
            }
        }
    }
    Ok(coerced)
}

/// Converts a GraphQL literal to JSON, substituting variables.
///
/// Variables without a value become `null`.
pub(crate) fn value_to_json(value: &ast::Value, variables: &Object) -> Value {
    match value {
        ast::Value::Null => Value::Null,
        ast::Value::Enum(name) => name.as_str().into(),
        ast::Value::Variable(name) => variables.get(name.as_str()).cloned().unwrap_or_default(),
        ast::Value::String(string) => string.as_str().into(),
        ast::Value::Float(float) => float
            .try_to_f64()
            .ok()
            .and_then(serde_json::Number::from_f64)
            .map(Value::Number)
            .unwrap_or_default(),
        ast::Value::Int(int) => match int.try_to_i32() {
            Ok(int) => Value::from(i64::from(int)),
            Err(_) => int
                .try_to_f64()
                .ok()
                .and_then(serde_json::Number::from_f64)
                .map(Value::Number)
                .unwrap_or_default(),
        },
        ast::Value::Boolean(boolean) => Value::Bool(*boolean),
        ast::Value::List(items) => items
            .iter()
            .map(|item| value_to_json(item, variables))
            .collect::<Vec<_>>()
            .into(),
        ast::Value::Object(fields) => Value::Object(
            fields
                .iter()
                .map(|(name, value)| (name.as_str().into(), value_to_json(value, variables)))
                .collect(),
        ),
    }
}

/// <https://spec.graphql.org/October2021/#sec-Input-Values>
fn coerce_input_value(schema: &Schema, ty: &Type, value: &Value) -> Result<Value, String> {
    if value.is_null() {
        return if ty.is_non_null() {
            Err(format!("null for non-null type {ty}"))
        } else {
            Ok(Value::Null)
        };
    }
    match ty {
        Type::List(inner) | Type::NonNullList(inner) => match value {
            Value::Array(items) => items
                .iter()
                .map(|item| coerce_input_value(schema, inner, item))
                .collect::<Result<Vec<_>, _>>()
                .map(Value::from),
            // a single item is coerced to a list of one
            _ => Ok(Value::from(vec![coerce_input_value(schema, inner, value)?])),
        },
        Type::Named(name) | Type::NonNullNamed(name) => match schema.types.get(name) {
            Some(ExtendedType::Scalar(_)) => coerce_scalar(name.as_str(), value),
            Some(ExtendedType::Enum(enum_type)) => {
                if value
                    .as_str()
                    .is_some_and(|value| enum_type.values.contains_key(value))
                {
                    Ok(value.clone())
                } else {
                    Err(format!("{value} is not a value of enum {name}"))
                }
            }
            Some(ExtendedType::InputObject(input_object)) => {
                let Value::Object(object) = value else {
                    return Err(format!("expected an object for {name}, got a {}", value.kind()));
                };
                if let Some(unknown) = object
                    .keys()
                    .find(|key| !input_object.fields.contains_key(key.as_str()))
                {
                    return Err(format!("unknown field {} for {name}", unknown.as_str()));
                }
                let mut coerced = Object::new();
                for (field_name, field) in &input_object.fields {
                    match object.get(field_name.as_str()) {
                        Some(field_value) => {
                            coerced.insert(
                                field_name.as_str(),
                                coerce_input_value(schema, &field.ty, field_value)?,
                            );
                        }
                        None => {
                            if let Some(default) = &field.default_value {
                                coerced.insert(
                                    field_name.as_str(),
                                    value_to_json(default, &Object::new()),
                                );
                            } else if field.ty.is_non_null() {
                                return Err(format!("missing required field {name}.{field_name}"));
                            }
                        }
                    }
                }
                Ok(Value::Object(coerced))
            }
            _ => Err(format!("{name} is not an input type")),
        },
    }
}

fn coerce_scalar(name: &str, value: &Value) -> Result<Value, String> {
    let valid = match name {
        "Int" => value.as_i64().is_some_and(|int| i32::try_from(int).is_ok()),
        "Float" => value.is_number(),
        "String" => value.is_string(),
        "Boolean" => value.is_boolean(),
        "ID" => value.is_string() || value.is_i64(),
        // custom scalars accept any JSON value
        _ => true,
    };
    if valid {
        Ok(value.clone())
    } else {
        Err(format!("{value} is not a valid {name}"))
    }
}

/// True when the `@skip` and `@include` directives of a selection let it through.
pub(crate) fn is_selected(directives: &ast::DirectiveList, variables: &Object) -> bool {
    let condition = |directive_name: &str| {
        directives
            .get(directive_name)
            .and_then(|directive| directive.specified_argument_by_name("if"))
            .map(|value: &Node<ast::Value>| match value.as_ref() {
                ast::Value::Boolean(condition) => *condition,
                ast::Value::Variable(name) => variables
                    .get(name.as_str())
                    .and_then(Value::as_bool)
                    .unwrap_or(false),
                _ => false,
            })
    };
    !condition("skip").unwrap_or(false) && condition("include").unwrap_or(true)
}
