//! Field resolvers and their bindings.

use std::future::Future;
use std::sync::Arc;

use apollo_compiler::Schema;
use apollo_compiler::executable::FieldSet;
use apollo_compiler::executable::SelectionSet;
use apollo_compiler::validation::Valid;
use async_trait::async_trait;
use derivative::Derivative;

use crate::context::Context;
use crate::error::FieldError;
use crate::error::StitchError;
use crate::event::ResolutionEvent;
use crate::json_ext::Value;
use crate::registry::FieldPath;

/// Computes the value of one field.
///
/// Implemented for any `Fn(ResolutionEvent) -> impl Future<Output = Result<Value, FieldError>>`,
/// so plain async functions and closures can be bound directly.
#[async_trait]
pub trait FieldResolver: Send + Sync + 'static {
    async fn resolve(&self, event: ResolutionEvent) -> Result<Value, FieldError>;
}

#[async_trait]
impl<F, Fut> FieldResolver for F
where
    F: Fn(ResolutionEvent) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, FieldError>> + Send + 'static,
{
    async fn resolve(&self, event: ResolutionEvent) -> Result<Value, FieldError> {
        (self)(event).await
    }
}

/// Decides whether a value belongs to the object type the binding is attached to.
pub type IsTypeOf = Arc<dyn Fn(&Value, &Context) -> bool + Send + Sync>;

/// Returns the concrete object type name of a value of an abstract type.
pub type ResolveType = Arc<dyn Fn(&Value, &Context) -> Option<String> + Send + Sync>;

/// A resolver binding.
///
/// `fragment` lists extra fields of the parent type (e.g. `"{ city }"` or
/// `"... on Address { city }"`) that must be fetched whenever the bound field is
/// selected, so the resolver can read them from its parent value.
#[derive(Clone, Derivative)]
#[derivative(Debug)]
pub struct ResolverSpec {
    pub fragment: Option<String>,
    #[derivative(Debug = "ignore")]
    pub resolve: Arc<dyn FieldResolver>,
    #[derivative(Debug = "ignore")]
    pub is_type_of: Option<IsTypeOf>,
    #[derivative(Debug = "ignore")]
    pub resolve_type: Option<ResolveType>,
}

impl ResolverSpec {
    pub fn new(resolver: impl FieldResolver) -> Self {
        Self {
            fragment: None,
            resolve: Arc::new(resolver),
            is_type_of: None,
            resolve_type: None,
        }
    }

    pub fn with_fragment(mut self, fragment: impl Into<String>) -> Self {
        self.fragment = Some(fragment.into());
        self
    }

    pub fn with_is_type_of(
        mut self,
        is_type_of: impl Fn(&Value, &Context) -> bool + Send + Sync + 'static,
    ) -> Self {
        self.is_type_of = Some(Arc::new(is_type_of));
        self
    }

    pub fn with_resolve_type(
        mut self,
        resolve_type: impl Fn(&Value, &Context) -> Option<String> + Send + Sync + 'static,
    ) -> Self {
        self.resolve_type = Some(Arc::new(resolve_type));
        self
    }

    /// Parses the fragment into the selection set it requires on the parent
    /// type of `path`.
    ///
    /// Accepts a selection set with or without braces (`{ city }`), an inline
    /// fragment (`... on Address { city }`) or a fragment definition
    /// (`fragment AddressFragment on Address { city }`).
    pub(crate) fn required_selection(
        &self,
        schema: &Valid<Schema>,
        path: &FieldPath,
    ) -> Result<Option<SelectionSet>, StitchError> {
        let Some(fragment) = &self.fragment else {
            return Ok(None);
        };
        let source = match fragment
            .trim_start()
            .strip_prefix("fragment")
            .filter(|rest| rest.starts_with(char::is_whitespace))
        {
            // the name of the definition is dropped, its type condition kept
            Some(definition) => {
                let condition = definition
                    .trim_start()
                    .split_once(char::is_whitespace)
                    .map(|(_name, condition)| condition)
                    .unwrap_or_default();
                format!("{{ ... {condition} }}")
            }
            None => fragment.clone(),
        };
        FieldSet::parse_and_validate(
            schema,
            path.type_name.clone(),
            source,
            format!("{path}.fragment.graphql"),
        )
        .map(|field_set| Some(field_set.into_inner().selection_set))
        .map_err(|with_errors| StitchError::InvalidFragment {
            path: path.clone(),
            message: with_errors.errors.to_string(),
        })
    }
}

/// Conversion into a [`ResolverSpec`], so registration accepts both bare
/// resolvers and full specs.
pub trait IntoResolverSpec {
    fn into_resolver_spec(self) -> ResolverSpec;
}

impl IntoResolverSpec for ResolverSpec {
    fn into_resolver_spec(self) -> ResolverSpec {
        self
    }
}

impl<R: FieldResolver> IntoResolverSpec for R {
    fn into_resolver_spec(self) -> ResolverSpec {
        ResolverSpec::new(self)
    }
}

#[cfg(test)]
mod tests {
    use rstest::rstest;

    use super::*;

    const SCHEMA: &str = r#"
        type Query { user: User }
        type User { name: String address: Address summary: String }
        type Address { city: String label(format: String): String location: Location }
        type Location { lat: Float lng: Float }
    "#;

    async fn noop(_event: ResolutionEvent) -> Result<Value, FieldError> {
        Ok(Value::Null)
    }

    fn required(path: &str, fragment: &str) -> Result<String, StitchError> {
        let schema = Schema::parse_and_validate(SCHEMA, "schema.graphql").unwrap();
        let spec = ResolverSpec::new(noop).with_fragment(fragment);
        let selection = spec.required_selection(&schema, &path.parse().unwrap())?;
        Ok(selection.unwrap().serialize().no_indent().to_string())
    }

    #[rstest]
    #[case("User.summary", "{ address { city } }", "{ address { city } }")]
    #[case("User.summary", "name", "{ name }")]
    #[case(
        "Address.label",
        r#"{ city label(format: "short form") }"#,
        r#"{ city label(format: "short form") }"#
    )]
    #[case(
        "Address.label",
        "fragment AddressFragment on Address { location { lat lng } }",
        "{ ... on Address { location { lat lng } } }"
    )]
    #[case("Address.label", "... on Address { city }", "{ ... on Address { city } }")]
    fn fragments_are_parsed_against_the_parent_type(
        #[case] path: &str,
        #[case] fragment: &str,
        #[case] expected: &str,
    ) {
        assert_eq!(required(path, fragment).unwrap(), expected);
    }

    #[test]
    fn fragments_must_select_fields_of_the_parent_type() {
        let error = required("User.summary", "{ address { zip } }").unwrap_err();
        assert!(
            matches!(
                error,
                StitchError::InvalidFragment { ref path, .. } if path.to_string() == "User.summary"
            ),
            "{error}"
        );
        assert!(required("User.summary", "{ address }").is_err());
    }

    #[test]
    fn bindings_without_fragment_require_nothing() {
        let schema = Schema::parse_and_validate(SCHEMA, "schema.graphql").unwrap();
        let spec = ResolverSpec::new(noop);
        let path = "User.summary".parse().unwrap();
        assert_eq!(spec.required_selection(&schema, &path).unwrap(), None);
    }
}
