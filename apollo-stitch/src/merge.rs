//! Merges registered contributions into one executable schema.

use std::sync::Arc;

use apollo_compiler::Name;
use apollo_compiler::Node;
use apollo_compiler::Schema;
use apollo_compiler::ast::DirectiveDefinition;
use apollo_compiler::ast::FieldDefinition;
use apollo_compiler::ast::InputValueDefinition;
use apollo_compiler::executable::OperationType;
use apollo_compiler::schema::Component;
use apollo_compiler::schema::ComponentName;
use apollo_compiler::schema::ComponentOrigin;
use apollo_compiler::schema::DirectiveList;
use apollo_compiler::schema::EnumType;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::InputObjectType;
use apollo_compiler::schema::InterfaceType;
use apollo_compiler::schema::ObjectType;
use apollo_compiler::schema::ScalarType;
use apollo_compiler::schema::UnionType;
use apollo_compiler::collections::IndexMap as CompilerIndexMap;
use indexmap::IndexMap;
use indexmap::map::Entry::Occupied;
use indexmap::map::Entry::Vacant;
use itertools::Itertools;
use schemars::JsonSchema;
use serde::Deserialize;
use serde::Serialize;

use crate::error::StitchError;
use crate::registry::Contribution;
use crate::registry::Registry;
use crate::schema::Bindings;
use crate::schema::RootOwners;
use crate::schema::StitchedSchema;

const OPERATION_TYPES: [OperationType; 3] = [
    OperationType::Query,
    OperationType::Mutation,
    OperationType::Subscription,
];

/// What to do when two contributions define the same field differently.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Deserialize, Serialize, JsonSchema)]
#[serde(rename_all = "snake_case")]
pub enum ConflictPolicy {
    /// The contribution registered last replaces the earlier definition.
    #[default]
    LastWins,
    /// Differing definitions fail the merge.
    Reject,
}

struct Merger {
    policy: ConflictPolicy,
    composition_hints: Vec<String>,
}

/// Merges every contribution of `registry` and binds its resolvers and middleware.
#[tracing::instrument(skip_all, fields(schemas = registry.schemas().len()))]
pub fn build_merged_schema(
    registry: &Registry,
    policy: ConflictPolicy,
) -> Result<StitchedSchema, StitchError> {
    if registry.schemas().is_empty() {
        return Err(StitchError::NoSchemasDefined);
    }
    let mut merger = Merger {
        policy,
        composition_hints: Vec::new(),
    };
    let (schema, root_owners) = merger.merge(registry.schemas())?;
    for hint in &merger.composition_hints {
        tracing::warn!(hint = %hint, "schema merge");
    }

    for path in registry.resolvers().keys() {
        // `__resolveType` / `__isTypeOf` bindings attach to the type itself
        let exists = if path.field_name.starts_with("__") {
            schema.types.contains_key(&path.type_name)
        } else {
            has_field(&schema, &path.type_name, &path.field_name)
        };
        if !exists {
            return Err(StitchError::UnknownField { path: path.clone() });
        }
    }
    for path in registry.middlewares().keys() {
        if !has_field(&schema, &path.type_name, &path.field_name) {
            return Err(StitchError::UnknownField { path: path.clone() });
        }
    }

    let schema = schema
        .validate()
        .map_err(|invalid| StitchError::invalid_schema(&invalid.errors))?;

    let mut requirements = IndexMap::new();
    for (path, spec) in registry.resolvers() {
        if let Some(selection) = spec.required_selection(&schema, path)? {
            requirements.insert(path.clone(), selection);
        }
    }

    let bindings = Bindings {
        resolvers: registry.resolvers().clone(),
        requirements,
        middlewares: registry
            .middlewares()
            .iter()
            .map(|(path, chain)| (path.clone(), Arc::from(chain.as_slice())))
            .collect(),
    };
    tracing::debug!(
        types = schema.types.len(),
        resolvers = bindings.resolvers.len(),
        "merged schema built"
    );
    Ok(StitchedSchema {
        schema: Arc::new(schema),
        bindings: Arc::new(bindings),
        sources: Arc::new(registry.schemas().clone()),
        root_owners: Arc::new(root_owners),
    })
}

fn has_field(schema: &Schema, type_name: &str, field_name: &str) -> bool {
    match schema.types.get(type_name) {
        Some(ExtendedType::Object(ty)) => ty.fields.contains_key(field_name),
        Some(ExtendedType::Interface(ty)) => ty.fields.contains_key(field_name),
        _ => false,
    }
}

impl Merger {
    fn merge(
        &mut self,
        contributions: &IndexMap<String, Contribution>,
    ) -> Result<(Schema, RootOwners), StitchError> {
        let mut merged = Schema::new();
        let mut root_owners = RootOwners::default();

        for contribution in contributions.values() {
            let schema = contribution.graph.schema();
            let sources = Arc::make_mut(&mut merged.sources);
            for (key, source) in schema.sources.iter() {
                sources.entry(*key).or_insert_with(|| source.clone());
            }

            self.merge_schema(&mut merged, schema);

            for (type_name, ty) in &schema.types {
                if ty.is_built_in() {
                    continue;
                }
                // fields of a differently named root land on the merged root
                let target_name = OPERATION_TYPES
                    .iter()
                    .find(|op| contribution_root(schema, **op) == Some(type_name))
                    .and_then(|op| merged.root_operation(*op))
                    .cloned()
                    .unwrap_or_else(|| type_name.clone());

                match ty {
                    ExtendedType::Enum(value) => {
                        self.merge_enum_type(&mut merged.types, target_name, value)?
                    }
                    ExtendedType::InputObject(value) => {
                        self.merge_input_object_type(&mut merged.types, target_name, value)?
                    }
                    ExtendedType::Interface(value) => {
                        self.merge_interface_type(&mut merged.types, target_name, value)?
                    }
                    ExtendedType::Object(value) => {
                        self.merge_object_type(&mut merged.types, target_name, value)?
                    }
                    ExtendedType::Union(value) => {
                        self.merge_union_type(&mut merged.types, target_name, value)?
                    }
                    ExtendedType::Scalar(value) => {
                        self.merge_scalar_type(&mut merged.types, target_name, value)?
                    }
                }
            }

            for (_, directive) in schema.directive_definitions.iter() {
                merge_directive(&mut merged.directive_definitions, directive);
            }

            for operation_type in OPERATION_TYPES {
                let Some(root) = contribution_root(schema, operation_type)
                    .and_then(|name| schema.get_object(name))
                else {
                    continue;
                };
                for field_name in root.fields.keys() {
                    root_owners.insert(
                        operation_type,
                        field_name.clone(),
                        contribution.name.clone(),
                    );
                }
            }
        }

        self.add_implicit_roots(&mut merged);
        Ok((merged, root_owners))
    }

    /// The first contribution declaring a root for an operation fixes its name.
    fn merge_schema(&mut self, merged: &mut Schema, contribution: &Schema) {
        let merged_def = merged.schema_definition.make_mut();
        let contribution_def = &contribution.schema_definition;
        if merged_def.query.is_none() {
            merged_def.query.clone_from(&contribution_def.query);
        }
        if merged_def.mutation.is_none() {
            merged_def.mutation.clone_from(&contribution_def.mutation);
        }
        if merged_def.subscription.is_none() {
            merged_def
                .subscription
                .clone_from(&contribution_def.subscription);
        }
    }

    fn add_implicit_roots(&mut self, merged: &mut Schema) {
        for operation_type in OPERATION_TYPES {
            if merged.root_operation(operation_type).is_some() {
                continue;
            }
            let Some(ExtendedType::Object(object)) =
                merged.types.get(default_root_name(operation_type))
            else {
                continue;
            };
            let name: ComponentName = object.name.clone().into();
            let def = merged.schema_definition.make_mut();
            match operation_type {
                OperationType::Query => def.query = Some(name),
                OperationType::Mutation => def.mutation = Some(name),
                OperationType::Subscription => def.subscription = Some(name),
            }
        }
    }

    fn merge_scalar_type(
        &mut self,
        types: &mut CompilerIndexMap<Name, ExtendedType>,
        scalar_name: Name,
        scalar: &Node<ScalarType>,
    ) -> Result<(), StitchError> {
        let existing_type = types
            .entry(scalar_name.clone())
            .or_insert_with(|| copy_scalar_type(scalar));
        if !matches!(existing_type, ExtendedType::Scalar(_)) {
            return Err(kind_conflict(&scalar_name, existing_type, "scalar"));
        }
        Ok(())
    }

    fn merge_enum_type(
        &mut self,
        types: &mut CompilerIndexMap<Name, ExtendedType>,
        enum_name: Name,
        enum_type: &Node<EnumType>,
    ) -> Result<(), StitchError> {
        let existing_type = types
            .entry(enum_name.clone())
            .or_insert_with(|| copy_enum_type(enum_type));
        let ExtendedType::Enum(e) = existing_type else {
            return Err(kind_conflict(&enum_name, existing_type, "enum"));
        };
        let e = e.make_mut();
        merge_descriptions(&mut e.description, &enum_type.description);
        for (value_name, value) in enum_type.values.iter() {
            e.values
                .entry(value_name.clone())
                .or_insert_with(|| as_definition(value));
        }
        Ok(())
    }

    fn merge_input_object_type(
        &mut self,
        types: &mut CompilerIndexMap<Name, ExtendedType>,
        input_object_name: Name,
        input_object: &Node<InputObjectType>,
    ) -> Result<(), StitchError> {
        let existing_type = types
            .entry(input_object_name.clone())
            .or_insert_with(|| copy_input_object_type(input_object));
        let ExtendedType::InputObject(obj) = existing_type else {
            return Err(kind_conflict(&input_object_name, existing_type, "input object"));
        };
        let mutable_object = obj.make_mut();
        merge_descriptions(&mut mutable_object.description, &input_object.description);
        for (field_name, field) in input_object.fields.iter() {
            match mutable_object.fields.entry(field_name.clone()) {
                Vacant(entry) => {
                    entry.insert(as_definition(field));
                }
                Occupied(mut entry) => {
                    if let Some(reason) = input_value_difference(entry.get(), field) {
                        self.resolve_conflict(&input_object_name, field_name, reason)?;
                        entry.insert(as_definition(field));
                    }
                }
            }
        }
        Ok(())
    }

    fn merge_interface_type(
        &mut self,
        types: &mut CompilerIndexMap<Name, ExtendedType>,
        interface_name: Name,
        interface: &Node<InterfaceType>,
    ) -> Result<(), StitchError> {
        let existing_type = types
            .entry(interface_name.clone())
            .or_insert_with(|| copy_interface_type(interface));
        let ExtendedType::Interface(intf) = existing_type else {
            return Err(kind_conflict(&interface_name, existing_type, "interface"));
        };
        let mutable_intf = intf.make_mut();
        merge_descriptions(&mut mutable_intf.description, &interface.description);
        for intf_name in &interface.implements_interfaces {
            // IndexSet::insert deduplicates
            mutable_intf
                .implements_interfaces
                .insert(intf_name.name.clone().into());
        }
        self.merge_fields(&interface_name, &mut mutable_intf.fields, &interface.fields)
    }

    fn merge_object_type(
        &mut self,
        types: &mut CompilerIndexMap<Name, ExtendedType>,
        object_name: Name,
        object: &Node<ObjectType>,
    ) -> Result<(), StitchError> {
        let existing_type = types
            .entry(object_name.clone())
            .or_insert_with(|| copy_object_type_stub(&object_name, object));
        let ExtendedType::Object(obj) = existing_type else {
            return Err(kind_conflict(&object_name, existing_type, "object"));
        };
        let mutable_object = obj.make_mut();
        merge_descriptions(&mut mutable_object.description, &object.description);
        for intf_name in &object.implements_interfaces {
            // IndexSet::insert deduplicates
            mutable_object
                .implements_interfaces
                .insert(intf_name.name.clone().into());
        }
        self.merge_fields(&object_name, &mut mutable_object.fields, &object.fields)
    }

    fn merge_union_type(
        &mut self,
        types: &mut CompilerIndexMap<Name, ExtendedType>,
        union_name: Name,
        union: &Node<UnionType>,
    ) -> Result<(), StitchError> {
        let existing_type = types
            .entry(union_name.clone())
            .or_insert_with(|| copy_union_type(union));
        let ExtendedType::Union(u) = existing_type else {
            return Err(kind_conflict(&union_name, existing_type, "union"));
        };
        let u = u.make_mut();
        merge_descriptions(&mut u.description, &union.description);
        for union_member in union.members.iter() {
            // IndexSet::insert deduplicates
            u.members.insert(union_member.name.clone().into());
        }
        Ok(())
    }

    fn merge_fields(
        &mut self,
        type_name: &Name,
        merged: &mut CompilerIndexMap<Name, Component<FieldDefinition>>,
        fields: &CompilerIndexMap<Name, Component<FieldDefinition>>,
    ) -> Result<(), StitchError> {
        for (field_name, field) in fields.iter() {
            match merged.entry(field_name.clone()) {
                Vacant(entry) => {
                    entry.insert(as_definition(field));
                }
                Occupied(mut entry) => {
                    if let Some(reason) = field_difference(entry.get(), field) {
                        self.resolve_conflict(type_name, field_name, reason)?;
                        entry.insert(as_definition(field));
                    }
                }
            }
        }
        Ok(())
    }

    fn resolve_conflict(
        &mut self,
        type_name: &Name,
        field_name: &Name,
        reason: String,
    ) -> Result<(), StitchError> {
        let path = format!("{type_name}.{field_name}");
        match self.policy {
            ConflictPolicy::Reject => Err(StitchError::MergeConflict { path, reason }),
            ConflictPolicy::LastWins => {
                self.composition_hints
                    .push(format!("{path} redefined, keeping the last definition: {reason}"));
                Ok(())
            }
        }
    }
}

fn default_root_name(operation_type: OperationType) -> &'static str {
    match operation_type {
        OperationType::Query => "Query",
        OperationType::Mutation => "Mutation",
        OperationType::Subscription => "Subscription",
    }
}

/// The root type of a contribution, falling back to the conventional name when
/// the fragment only extends it.
fn contribution_root(schema: &Schema, operation_type: OperationType) -> Option<&Name> {
    schema.root_operation(operation_type).or_else(|| {
        schema
            .get_object(default_root_name(operation_type))
            .map(|object| &object.name)
    })
}

fn kind_conflict(name: &Name, existing: &ExtendedType, kind: &str) -> StitchError {
    StitchError::MergeConflict {
        path: name.to_string(),
        reason: format!("defined both as {} and as {kind}", describe(existing)),
    }
}

fn describe(ty: &ExtendedType) -> &'static str {
    match ty {
        ExtendedType::Scalar(_) => "scalar",
        ExtendedType::Object(_) => "object",
        ExtendedType::Interface(_) => "interface",
        ExtendedType::Union(_) => "union",
        ExtendedType::Enum(_) => "enum",
        ExtendedType::InputObject(_) => "input object",
    }
}

fn field_difference(existing: &FieldDefinition, new: &FieldDefinition) -> Option<String> {
    if existing.ty != new.ty {
        return Some(format!("type {} differs from {}", existing.ty, new.ty));
    }
    let signature = |arguments: &[Node<InputValueDefinition>]| {
        arguments
            .iter()
            .map(|arg| format!("{}: {}", arg.name, arg.ty))
            .join(", ")
    };
    let (before, after) = (signature(&existing.arguments), signature(&new.arguments));
    (before != after).then(|| format!("arguments ({before}) differ from ({after})"))
}

fn input_value_difference(
    existing: &InputValueDefinition,
    new: &InputValueDefinition,
) -> Option<String> {
    (existing.ty != new.ty).then(|| format!("type {} differs from {}", existing.ty, new.ty))
}

fn merge_descriptions<T: Clone>(merged: &mut Option<T>, new: &Option<T>) {
    if merged.is_none() {
        merged.clone_from(new);
    }
}

/// Re-homes a component on the merged type's own definition.
fn as_definition<T>(component: &Component<T>) -> Component<T> {
    Component {
        origin: ComponentOrigin::Definition,
        node: component.node.clone(),
    }
}

fn definition_directives(directives: &DirectiveList) -> DirectiveList {
    DirectiveList(directives.iter().map(as_definition).collect())
}

fn copy_scalar_type(scalar: &Node<ScalarType>) -> ExtendedType {
    let mut copy = scalar.as_ref().clone();
    copy.directives = definition_directives(&scalar.directives);
    ExtendedType::Scalar(Node::new(copy))
}

fn copy_enum_type(enum_type: &Node<EnumType>) -> ExtendedType {
    let mut copy = enum_type.as_ref().clone();
    copy.directives = definition_directives(&enum_type.directives);
    copy.values.clear();
    ExtendedType::Enum(Node::new(copy))
}

fn copy_input_object_type(input_object: &Node<InputObjectType>) -> ExtendedType {
    let mut copy = input_object.as_ref().clone();
    copy.directives = definition_directives(&input_object.directives);
    copy.fields.clear();
    ExtendedType::InputObject(Node::new(copy))
}

fn copy_interface_type(interface: &Node<InterfaceType>) -> ExtendedType {
    let mut copy = interface.as_ref().clone();
    copy.directives = definition_directives(&interface.directives);
    copy.implements_interfaces.clear();
    copy.fields.clear();
    ExtendedType::Interface(Node::new(copy))
}

fn copy_object_type_stub(object_name: &Name, object: &Node<ObjectType>) -> ExtendedType {
    let mut copy = object.as_ref().clone();
    copy.name = object_name.clone();
    copy.directives = definition_directives(&object.directives);
    copy.implements_interfaces.clear();
    copy.fields.clear();
    ExtendedType::Object(Node::new(copy))
}

fn copy_union_type(union: &Node<UnionType>) -> ExtendedType {
    let mut copy = union.as_ref().clone();
    copy.directives = definition_directives(&union.directives);
    copy.members.clear();
    ExtendedType::Union(Node::new(copy))
}

fn merge_directive(
    directive_definitions: &mut CompilerIndexMap<Name, Node<DirectiveDefinition>>,
    directive: &Node<DirectiveDefinition>,
) {
    if !directive_definitions.contains_key(&directive.name) {
        directive_definitions.insert(directive.name.clone(), directive.clone());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::FieldError;
    use crate::event::ResolutionEvent;
    use crate::json_ext::Value;
    use crate::registry::FieldPath;
    use crate::resolver::ResolverSpec;
    use crate::type_graph::TypeGraph;

    fn registry(schemas: &[&str]) -> Registry {
        let mut registry = Registry::new();
        for (index, sdl) in schemas.iter().enumerate() {
            let graph = TypeGraph::parse(sdl, format!("schema{index}.graphql")).unwrap();
            registry.register_schema(None, graph);
        }
        registry
    }

    fn field_names(schema: &StitchedSchema, type_name: &str) -> Vec<String> {
        match schema.schema().types.get(type_name) {
            Some(ExtendedType::Object(object)) => {
                object.fields.keys().map(|name| name.to_string()).collect()
            }
            _ => Vec::new(),
        }
    }

    #[test]
    fn no_schemas() {
        assert_eq!(
            build_merged_schema(&Registry::new(), ConflictPolicy::LastWins).unwrap_err(),
            StitchError::NoSchemasDefined
        );
    }

    #[test]
    fn merges_types_across_contributions() {
        let registry = registry(&[
            r#"
            type Query { user: User }
            type User { name: String address: Address }
            type Address { city: String }
            "#,
            r#"
            type Query { getWeatherByCity(city: String!): WeatherPayload }
            extend type Address { weather: WeatherPayload }
            type WeatherPayload { temp(unit: UnitEnum = C): Float }
            enum UnitEnum { C F }
            "#,
        ]);
        let merged = build_merged_schema(&registry, ConflictPolicy::LastWins).unwrap();
        assert_eq!(field_names(&merged, "Query"), ["user", "getWeatherByCity"]);
        assert_eq!(field_names(&merged, "Address"), ["city", "weather"]);
        assert_eq!(
            merged.owner(OperationType::Query, "getWeatherByCity").map(|c| c.name.as_str()),
            Some("schema1")
        );
        assert_eq!(
            merged.owner(OperationType::Query, "user").map(|c| c.name.as_str()),
            Some("schema0")
        );
        let sdl = merged.sdl();
        assert!(sdl.contains("getWeatherByCity(city: String!): WeatherPayload"));
        assert!(sdl.contains("temp(unit: UnitEnum = C): Float"));
        assert!(!sdl.contains("extend type"));
    }

    #[test]
    fn unions_and_enums_are_unioned() {
        let registry = registry(&[
            "type Query { a: Int } type A { a: Int } union AB = A enum E { X }",
            "type B { b: Int } union AB = B enum E { Y }",
        ]);
        let merged = build_merged_schema(&registry, ConflictPolicy::LastWins).unwrap();
        let Some(ExtendedType::Union(union)) = merged.schema().types.get("AB") else {
            panic!("AB should be a union");
        };
        let members: Vec<_> = union.members.iter().map(|m| m.name.as_str()).collect();
        assert_eq!(members, ["A", "B"]);
        let Some(ExtendedType::Enum(e)) = merged.schema().types.get("E") else {
            panic!("E should be an enum");
        };
        assert_eq!(e.values.keys().map(Name::as_str).collect::<Vec<_>>(), ["X", "Y"]);
    }

    #[test]
    fn kind_mismatch_is_fatal() {
        let registry = registry(&[
            "type Query { a: Thing } type Thing { a: Int }",
            "enum Thing { A }",
        ]);
        let error = build_merged_schema(&registry, ConflictPolicy::LastWins).unwrap_err();
        assert_eq!(
            error.to_string(),
            "merge conflict at Thing: defined both as object and as enum"
        );
    }

    #[test]
    #[tracing_test::traced_test]
    fn field_conflicts_follow_the_policy() {
        let schemas = ["type Query { a: Int }", "type Query { a: String }"];
        let merged = build_merged_schema(&registry(&schemas), ConflictPolicy::LastWins).unwrap();
        let Some(ExtendedType::Object(query)) = merged.schema().types.get("Query") else {
            panic!("Query should be an object");
        };
        assert_eq!(query.fields["a"].ty.to_string(), "String");
        assert!(logs_contain("Query.a redefined, keeping the last definition"));
        assert_eq!(
            merged.owner(OperationType::Query, "a").map(|c| c.name.as_str()),
            Some("schema1")
        );

        let error = build_merged_schema(&registry(&schemas), ConflictPolicy::Reject).unwrap_err();
        assert!(matches!(error, StitchError::MergeConflict { ref path, .. } if path == "Query.a"));
    }

    #[test]
    fn bindings_must_target_existing_fields() {
        let mut registry = registry(&["type Query { a: Int }"]);
        registry
            .register_resolver("Query.b".parse().unwrap(), |_event: ResolutionEvent| async {
                Ok::<_, FieldError>(Value::Null)
            })
            .unwrap();
        let error = build_merged_schema(&registry, ConflictPolicy::LastWins).unwrap_err();
        assert_eq!(
            error,
            StitchError::UnknownField {
                path: FieldPath::new("Query", "b").unwrap()
            }
        );
    }

    #[test]
    fn resolver_fragments_are_parsed_once_merged() {
        let mut registry = registry(&[
            "type Query { user: User } type User { address: Address }",
            "type Address { city: String } extend type User { summary: String }",
        ]);
        registry
            .register_resolver(
                "User.summary".parse().unwrap(),
                ResolverSpec::new(|_event: ResolutionEvent| async {
                    Ok::<_, FieldError>(Value::Null)
                })
                .with_fragment("{ address { city } }"),
            )
            .unwrap();
        let merged = build_merged_schema(&registry, ConflictPolicy::LastWins).unwrap();
        let required = merged.requirement("User", "summary").unwrap();
        assert_eq!(required.serialize().no_indent().to_string(), "{ address { city } }");

        registry = self::registry(&[
            "type Query { user: User } type User { name: String summary: String }",
        ]);
        registry
            .register_resolver(
                "User.summary".parse().unwrap(),
                ResolverSpec::new(|_event: ResolutionEvent| async {
                    Ok::<_, FieldError>(Value::Null)
                })
                .with_fragment("{ city }"),
            )
            .unwrap();
        let error = build_merged_schema(&registry, ConflictPolicy::LastWins).unwrap_err();
        assert!(matches!(error, StitchError::InvalidFragment { .. }), "{error}");
    }

    #[test]
    fn invalid_merged_schema_is_reported() {
        let registry = registry(&["type Query { a: Missing }"]);
        let error = build_merged_schema(&registry, ConflictPolicy::LastWins).unwrap_err();
        assert!(matches!(error, StitchError::InvalidSchema { .. }));
    }
}
