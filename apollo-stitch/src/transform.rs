//! Derives a restricted public schema from the merged schema.

use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::ast;
use apollo_compiler::executable::OperationType;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::validation::Valid;
use indexmap::IndexMap;
use indexmap::IndexSet;

use crate::error::StitchError;
use crate::schema::StitchedSchema;

const TARGET_SOURCE: &str = "transform.graphql";

/// Prunes `merged` to the types and fields described by `target_sdl`.
///
/// Only the members named in a target definition survive: fields of objects,
/// interfaces and input objects, enum values and union members. Types the
/// target does not mention are kept as they are, and target types unknown to
/// the merged schema are ignored. A root operation type missing from the target
/// loses its root designation.
///
/// The result shares its bindings with `merged`, so the surviving fields keep
/// their resolvers and middleware.
#[tracing::instrument(skip_all, level = "debug")]
pub fn transform(merged: &StitchedSchema, target_sdl: &str) -> Result<StitchedSchema, StitchError> {
    let target = ast::Document::parse(target_sdl, TARGET_SOURCE)
        .map_err(|errors| StitchError::parse(TARGET_SOURCE, errors))?;

    let mut schema = merged.schema().clone().into_inner();
    let mut target_names = IndexSet::new();
    for definition in &target.definitions {
        if let Some(name) = definition.name() {
            target_names.insert(name.clone());
        }
        let kept = kept_members(definition)?;
        let Some(name) = definition.name() else {
            continue;
        };
        let Some(ty) = schema.types.get_mut(name) else {
            tracing::debug!(type_name = %name, "transform target type not in merged schema");
            continue;
        };
        let pruned = match ty {
            ExtendedType::Object(object) => {
                let fields = &mut object.make_mut().fields;
                retain_named(fields, &kept)
            }
            ExtendedType::Interface(interface) => {
                let fields = &mut interface.make_mut().fields;
                retain_named(fields, &kept)
            }
            ExtendedType::InputObject(input_object) => {
                let fields = &mut input_object.make_mut().fields;
                retain_named(fields, &kept)
            }
            ExtendedType::Enum(enum_type) => {
                let values = &mut enum_type.make_mut().values;
                retain_named(values, &kept)
            }
            ExtendedType::Union(union) => {
                let members = &mut union.make_mut().members;
                let before = members.len();
                members.retain(|member| kept.contains(&member.name));
                before - members.len()
            }
            ExtendedType::Scalar(_) => 0,
        };
        if pruned > 0 {
            tracing::debug!(type_name = %name, pruned, "pruned type");
        }
    }

    let root_names: Vec<(OperationType, Name)> = [
        OperationType::Query,
        OperationType::Mutation,
        OperationType::Subscription,
    ]
    .into_iter()
    .filter_map(|op| schema.root_operation(op).map(|name| (op, name.clone())))
    .collect();
    for (operation_type, root_name) in root_names {
        if target_names.contains(&root_name) {
            continue;
        }
        tracing::debug!(root = %root_name, "removing root operation absent from transform target");
        let definition = schema.schema_definition.make_mut();
        match operation_type {
            OperationType::Query => definition.query = None,
            OperationType::Mutation => definition.mutation = None,
            OperationType::Subscription => definition.subscription = None,
        }
    }

    // Removing roots leaves a schema validation would reject; it is only ever
    // executed through the operation-type checks of the executor.
    Ok(StitchedSchema {
        schema: Arc::new(Valid::assume_valid(schema)),
        bindings: merged.bindings.clone(),
        sources: merged.sources.clone(),
        root_owners: merged.root_owners.clone(),
    })
}

/// The member names a target definition keeps.
fn kept_members(definition: &ast::Definition) -> Result<IndexSet<Name>, StitchError> {
    let names = match definition {
        ast::Definition::ObjectTypeDefinition(def) => {
            def.fields.iter().map(|field| field.name.clone()).collect()
        }
        ast::Definition::InterfaceTypeDefinition(def) => {
            def.fields.iter().map(|field| field.name.clone()).collect()
        }
        ast::Definition::InputObjectTypeDefinition(def) => {
            def.fields.iter().map(|field| field.name.clone()).collect()
        }
        ast::Definition::EnumTypeDefinition(def) => {
            def.values.iter().map(|value| value.value.clone()).collect()
        }
        ast::Definition::UnionTypeDefinition(def) => def.members.iter().cloned().collect(),
        other => {
            return Err(StitchError::UnsupportedDefinition {
                kind: unsupported_kind(other).to_string(),
            });
        }
    };
    Ok(names)
}

fn unsupported_kind(definition: &ast::Definition) -> &'static str {
    match definition {
        ast::Definition::OperationDefinition(_) => "OperationDefinition",
        ast::Definition::FragmentDefinition(_) => "FragmentDefinition",
        ast::Definition::DirectiveDefinition(_) => "DirectiveDefinition",
        ast::Definition::SchemaDefinition(_) => "SchemaDefinition",
        ast::Definition::ScalarTypeDefinition(_) => "ScalarTypeDefinition",
        ast::Definition::SchemaExtension(_) => "SchemaExtension",
        ast::Definition::ScalarTypeExtension(_) => "ScalarTypeExtension",
        ast::Definition::ObjectTypeExtension(_) => "ObjectTypeExtension",
        ast::Definition::InterfaceTypeExtension(_) => "InterfaceTypeExtension",
        ast::Definition::UnionTypeExtension(_) => "UnionTypeExtension",
        ast::Definition::EnumTypeExtension(_) => "EnumTypeExtension",
        ast::Definition::InputObjectTypeExtension(_) => "InputObjectTypeExtension",
        _ => "TypeDefinition",
    }
}

fn retain_named<V, S>(members: &mut IndexMap<Name, V, S>, kept: &IndexSet<Name>) -> usize {
    let before = members.len();
    members.retain(|name, _| kept.contains(name));
    before - members.len()
}
