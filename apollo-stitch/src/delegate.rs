//! Delegation of fields to the source schema that owns them.

use std::fmt::Write as _;

use apollo_compiler::ExecutableDocument;
use apollo_compiler::Name;
use apollo_compiler::Schema;
use apollo_compiler::executable::OperationType;
use apollo_compiler::executable::Selection;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::schema::ExtendedType;
use apollo_compiler::schema::FieldDefinition;
use apollo_compiler::schema::Type;
use indexmap::IndexSet;

use crate::error::FieldError;
use crate::event::ResolutionEvent;
use crate::execution;
use crate::execution::describe;
use crate::execution::input_coercion::is_selected;
use crate::execution::input_coercion::value_to_json;
use crate::graphql;
use crate::json_ext::Object;
use crate::json_ext::Value;
use crate::registry::Source;
use crate::schema::StitchedSchema;

const TYPENAME: &str = "__typename";

#[tracing::instrument(
    skip_all,
    level = "debug",
    fields(operation_type = describe(operation_type), field = field_name)
)]
pub(crate) async fn delegate(
    event: &ResolutionEvent,
    operation_type: OperationType,
    field_name: &str,
    args: &Object,
) -> Result<Value, FieldError> {
    let info = &event.info;
    let merged = &info.merged;
    let Some(owner) = merged.owner(operation_type, field_name) else {
        return Err(FieldError::new(format!(
            "no schema defines {} field {field_name}",
            describe(operation_type)
        )));
    };
    let (target, link) = match &owner.source {
        Source::Remote(link) => (owner.graph.schema(), Some(link.clone())),
        Source::Local => (&**merged.schema(), None),
    };
    let root_field = target
        .root_operation(operation_type)
        .and_then(|root| target.get_object(root))
        .and_then(|root| root.fields.get(field_name))
        .ok_or_else(|| {
            FieldError::new(format!(
                "schema {} does not define {} field {field_name}",
                owner.name,
                describe(operation_type)
            ))
        })?;

    let rewriter = SelectionRewriter {
        source: &info.schema,
        target,
        document: info.document(),
        variables: info.variables(),
    };
    let query = format!(
        "{} {{ {field_name}{}{} }}",
        describe(operation_type),
        rewriter.arguments(root_field, args),
        rewriter.selection_set(
            root_field.ty.inner_named_type(),
            &info.field.selection_set.selections
        ),
    );
    tracing::debug!(target_schema = %owner.name, %query, "delegating");
    let request = graphql::Request::builder().query(query).build();

    let response = match link {
        Some(link) => link.execute(request, &event.context).await?,
        None => {
            execution::execute(
                merged.clone(),
                merged.clone(),
                request,
                event.context.clone(),
                info.options.clone(),
            )
            .await
        }
    };
    let value = response.data_field(field_name);
    field_result(value, response.errors)
}

#[tracing::instrument(skip_all, level = "debug")]
pub(crate) async fn delegate_query(
    event: &ResolutionEvent,
    query: &str,
    variables: Object,
) -> Result<Value, FieldError> {
    let info = &event.info;
    let mut request = graphql::Request::builder().query(query).build();
    request.variables = variables;
    let response = execution::execute(
        info.merged.clone(),
        info.merged.clone(),
        request,
        event.context.clone(),
        info.options.clone(),
    )
    .await;
    let value = match response.data {
        Some(Value::Object(data)) if data.len() == 1 => {
            data.into_iter().next().map(|(_, value)| value).unwrap_or_default()
        }
        Some(data) => data,
        None => Value::Null,
    };
    field_result(value, response.errors)
}

/// Turns the errors of a delegated operation into a field error.
///
/// The first error gives the message; the others are attached under
/// `extensions.downstreamErrors`. Data returned along with errors wins.
fn field_result(value: Value, errors: Vec<graphql::Error>) -> Result<Value, FieldError> {
    if errors.is_empty() {
        return Ok(value);
    }
    if !value.is_null() {
        tracing::warn!(
            errors = errors.len(),
            "delegated operation returned data along with errors"
        );
        return Ok(value);
    }
    let mut errors = errors.into_iter();
    let Some(first) = errors.next() else {
        return Ok(value);
    };
    let mut error = FieldError::from(first);
    let rest: Vec<graphql::Error> = errors.collect();
    if !rest.is_empty() {
        if let Ok(rest) = serde_json_bytes::to_value(&rest) {
            error.extensions.insert("downstreamErrors", rest);
        }
    }
    Err(error)
}

/// Prints the selection of a field as it must be sent to the target schema.
pub(crate) struct SelectionRewriter<'a> {
    /// The schema the selection was written against, with its bindings.
    pub(crate) source: &'a StitchedSchema,
    pub(crate) target: &'a Schema,
    pub(crate) document: &'a ExecutableDocument,
    pub(crate) variables: &'a Object,
}

impl SelectionRewriter<'_> {
    /// Returns ` { ... }` for a composite type of the target, and nothing for
    /// a leaf type.
    pub(crate) fn selection_set(&self, type_name: &Name, selections: &[Selection]) -> String {
        let Some(ty) = self.target.types.get(type_name) else {
            return String::new();
        };
        let is_abstract = match ty {
            ExtendedType::Interface(_) | ExtendedType::Union(_) => true,
            ExtendedType::Object(_) => false,
            _ => return String::new(),
        };
        let mut items = Items::default();
        self.collect(type_name, selections, &mut items, &mut Vec::new());
        // what bound resolvers read from their parent, which may require more
        loop {
            let required = std::mem::take(&mut items.required);
            if required.is_empty() {
                break;
            }
            for selection_set in required {
                self.collect(type_name, &selection_set.selections, &mut items, &mut Vec::new());
            }
        }
        if is_abstract || items.is_empty() {
            items.push_plain(TYPENAME);
        }
        format!(" {{ {} }}", items.printed.join(" "))
    }

    fn collect(
        &self,
        type_name: &Name,
        selections: &[Selection],
        items: &mut Items,
        visited_fragments: &mut Vec<Name>,
    ) {
        for selection in selections {
            if !is_selected(selection.directives(), self.variables) {
                continue;
            }
            match selection {
                Selection::Field(field) => {
                    if field.name == TYPENAME {
                        if field.alias.is_some() {
                            items.push(format!("{}: {TYPENAME}", field.response_key()));
                        } else {
                            items.push_plain(TYPENAME);
                        }
                        continue;
                    }
                    if items.expanded.insert(field.name.clone()) {
                        if let Some(required) = self.source.requirement(type_name, &field.name) {
                            items.required.push(required.clone());
                        }
                    }
                    let Some(definition) = self.target_field(type_name, &field.name) else {
                        continue;
                    };
                    let arguments: Object = field
                        .arguments
                        .iter()
                        .map(|argument| {
                            (
                                argument.name.as_str().into(),
                                value_to_json(&argument.value, self.variables),
                            )
                        })
                        .collect();
                    let printed = format!(
                        "{}{}{}",
                        field.name,
                        self.arguments(definition, &arguments),
                        self.selection_set(
                            definition.ty.inner_named_type(),
                            &field.selection_set.selections
                        ),
                    );
                    match &field.alias {
                        Some(alias) => items.push(format!("{alias}: {printed}")),
                        None if printed == field.name.as_str() => items.push_plain(&field.name),
                        None => items.push(printed),
                    }
                }
                Selection::InlineFragment(inline) => match &inline.type_condition {
                    Some(condition) if condition != type_name => {
                        self.push_fragment(condition, &inline.selection_set.selections, items);
                    }
                    _ => self.collect(
                        type_name,
                        &inline.selection_set.selections,
                        items,
                        visited_fragments,
                    ),
                },
                Selection::FragmentSpread(spread) => {
                    if visited_fragments.contains(&spread.fragment_name) {
                        continue;
                    }
                    let Some(fragment) = self.document.fragments.get(&spread.fragment_name) else {
                        continue;
                    };
                    visited_fragments.push(spread.fragment_name.clone());
                    let condition = fragment.type_condition();
                    if condition == type_name {
                        self.collect(
                            type_name,
                            &fragment.selection_set.selections,
                            items,
                            visited_fragments,
                        );
                    } else {
                        self.push_fragment(condition, &fragment.selection_set.selections, items);
                    }
                    visited_fragments.pop();
                }
            }
        }
    }

    fn push_fragment(&self, condition: &Name, selections: &[Selection], items: &mut Items) {
        if !self.target.types.contains_key(condition) {
            return;
        }
        items.push(format!(
            "... on {condition}{}",
            self.selection_set(condition, selections)
        ));
    }

    fn target_field(&self, type_name: &str, field_name: &str) -> Option<&FieldDefinition> {
        match self.target.types.get(type_name)? {
            ExtendedType::Object(object) => object.fields.get(field_name).map(|f| &***f),
            ExtendedType::Interface(interface) => interface.fields.get(field_name).map(|f| &***f),
            _ => None,
        }
    }

    /// Prints `(name: literal, ...)` for the arguments the target field defines.
    pub(crate) fn arguments(&self, definition: &FieldDefinition, arguments: &Object) -> String {
        let printed: Vec<String> = arguments
            .iter()
            .filter_map(|(name, value)| {
                let argument = definition.argument_by_name(name.as_str())?;
                Some(format!(
                    "{}: {}",
                    name.as_str(),
                    literal(self.target, Some(&argument.ty), value)
                ))
            })
            .collect();
        if printed.is_empty() {
            String::new()
        } else {
            format!("({})", printed.join(", "))
        }
    }
}

/// Printed selections of one selection set.
#[derive(Default)]
struct Items {
    printed: Vec<String>,
    /// Fields selected without alias, arguments or sub-selection.
    plain: IndexSet<String>,
    /// Selections needed by bound resolvers, not yet collected.
    required: Vec<SelectionSet>,
    /// Fields whose resolver requirements were already queued.
    expanded: IndexSet<Name>,
}

impl Items {
    fn push(&mut self, printed: String) {
        self.printed.push(printed);
    }

    fn push_plain(&mut self, name: &str) {
        if self.plain.insert(name.to_string()) {
            self.printed.push(name.to_string());
        }
    }

    fn is_empty(&self) -> bool {
        self.printed.is_empty()
    }
}

/// Prints a JSON value as a GraphQL literal of type `ty`.
///
/// Enum values are printed bare, input object keys unquoted. Without a known
/// type, strings are printed as string literals.
fn literal(schema: &Schema, ty: Option<&Type>, value: &Value) -> String {
    match value {
        Value::Null => "null".to_string(),
        Value::Bool(_) | Value::Number(_) => value.to_string(),
        Value::String(string) => {
            let is_enum = ty
                .and_then(|ty| schema.types.get(ty.inner_named_type()))
                .is_some_and(|ty| ty.is_enum());
            if is_enum {
                string.as_str().to_string()
            } else {
                value.to_string()
            }
        }
        Value::Array(items) => {
            let item_type = ty.map(Type::item_type);
            let items: Vec<String> = items
                .iter()
                .map(|item| literal(schema, item_type, item))
                .collect();
            format!("[{}]", items.join(", "))
        }
        Value::Object(object) => {
            let input_object = ty.and_then(|ty| match schema.types.get(ty.inner_named_type()) {
                Some(ExtendedType::InputObject(input_object)) => Some(input_object),
                _ => None,
            });
            let mut printed = String::from("{");
            for (index, (key, value)) in object.iter().enumerate() {
                let field_type = input_object
                    .and_then(|input_object| input_object.fields.get(key.as_str()))
                    .map(|field| &*field.ty);
                if index > 0 {
                    printed.push_str(", ");
                }
                let _ = write!(printed, "{}: {}", key.as_str(), literal(schema, field_type, value));
            }
            printed.push('}');
            printed
        }
    }
}

#[cfg(test)]
mod tests {
    use serde_json_bytes::json;

    use super::*;
    use crate::merge::ConflictPolicy;
    use crate::merge::build_merged_schema;
    use crate::registry::Registry;
    use crate::resolver::ResolverSpec;

    const USERS: &str = r#"
        type Query { user(id: ID!, role: Role): User node(id: ID!): Node }
        interface Node { id: ID! }
        enum Role { ADMIN MEMBER }
        type User implements Node { id: ID! name: String address: Address }
        type Address { city: String country: String }
    "#;

    const POSTS: &str = r#"
        extend type User { posts(first: Int): [String] summary: String }
    "#;

    async fn posts(_event: ResolutionEvent) -> Result<Value, FieldError> {
        Ok(json!(["first post"]))
    }

    fn rewrite(query: &str, variables: Value) -> String {
        let mut registry = Registry::new();
        registry.register_schema(Some("users".into()), USERS.parse().unwrap());
        registry.register_schema(Some("posts".into()), POSTS.parse().unwrap());
        registry
            .register_resolver(
                "User.posts".parse().unwrap(),
                ResolverSpec::new(posts).with_fragment("{ id name }"),
            )
            .unwrap();
        registry
            .register_resolver(
                "User.summary".parse().unwrap(),
                ResolverSpec::new(posts).with_fragment("{ address { country } }"),
            )
            .unwrap();
        let merged = build_merged_schema(&registry, ConflictPolicy::LastWins).unwrap();
        let target = registry.schemas()["users"].graph.schema();
        let document =
            ExecutableDocument::parse_and_validate(merged.schema(), query, "query.graphql")
                .unwrap();
        let operation = document.operations.get(None).unwrap();
        let Selection::Field(root) = &operation.selection_set.selections[0] else {
            panic!("expected a field");
        };
        let rewriter = SelectionRewriter {
            source: &merged,
            target,
            document: &document,
            variables: variables.as_object().unwrap(),
        };
        let definition = rewriter.target_field("Query", &root.name).unwrap();
        let arguments: Object = root
            .arguments
            .iter()
            .map(|argument| {
                (
                    argument.name.as_str().into(),
                    value_to_json(&argument.value, rewriter.variables),
                )
            })
            .collect();
        format!(
            "{}{}{}",
            root.name,
            rewriter.arguments(definition, &arguments),
            rewriter.selection_set(definition.ty.inner_named_type(), &root.selection_set.selections)
        )
    }

    #[test]
    fn drops_unknown_fields_and_adds_resolver_fragments() {
        let rewritten = rewrite(
            r#"
            query($id: ID!) {
                user(id: $id, role: ADMIN) { me: name posts(first: 2) address { city } }
            }
            "#,
            json!({ "id": "1" }),
        );
        insta::assert_snapshot!(
            rewritten,
            @r#"user(id: "1", role: ADMIN) { me: name address { city } id name }"#
        );
    }

    #[test]
    fn resolver_fragments_keep_nested_selections() {
        let rewritten = rewrite(r#"{ user(id: "1") { summary } }"#, json!({}));
        insta::assert_snapshot!(rewritten, @r#"user(id: "1") { address { country } }"#);

        let rewritten = rewrite(
            r#"{ user(id: "1") { summary address { city } } }"#,
            json!({}),
        );
        insta::assert_snapshot!(
            rewritten,
            @r#"user(id: "1") { address { city } address { country } }"#
        );
    }

    #[test]
    fn inlines_fragments_and_evaluates_conditions() {
        let rewritten = rewrite(
            r#"
            query($withCity: Boolean!) {
                node(id: "1") {
                    ...UserParts
                    ... on User { address @include(if: $withCity) { city } }
                }
            }
            fragment UserParts on User { name @skip(if: true) id }
            "#,
            json!({ "withCity": false }),
        );
        insta::assert_snapshot!(
            rewritten,
            @r#"node(id: "1") { ... on User { id } ... on User { __typename } __typename }"#
        );
    }

    #[test]
    fn prints_typed_literals() {
        let schema = Schema::parse_and_validate(
            r#"
            type Query { f(input: In): Int }
            input In { tags: [String] role: Role }
            enum Role { ADMIN }
            "#,
            "schema.graphql",
        )
        .unwrap();
        let ty = Type::Named(Name::new("In").unwrap());
        let value = json!({ "tags": ["a \"quoted\" tag"], "role": "ADMIN" });
        assert_eq!(
            literal(&schema, Some(&ty), &value),
            r#"{tags: ["a \"quoted\" tag"], role: ADMIN}"#
        );
    }

    #[test]
    fn errors_become_field_errors() {
        let errors = vec![
            graphql::Error::builder().message("first").extension_code("A").build(),
            graphql::Error::builder().message("second").build(),
        ];
        let error = field_result(Value::Null, errors.clone()).unwrap_err();
        assert_eq!(error.message, "first");
        assert_eq!(error.extensions.get("code"), Some(&json!("A")));
        assert_eq!(
            error.extensions.get("downstreamErrors"),
            Some(&json!([{ "message": "second" }]))
        );

        let value = field_result(json!({ "id": 1 }), errors).unwrap();
        assert_eq!(value, json!({ "id": 1 }));
    }
}
