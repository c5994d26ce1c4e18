use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use apollo_compiler::executable::OperationType;
use apollo_stitch::CacheStrategy;
use apollo_stitch::FieldError;
use apollo_stitch::ResolutionEvent;
use apollo_stitch::ResolverSpec;
use apollo_stitch::Stitcher;
use apollo_stitch::json_ext::Value;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;

use crate::common::execute;

async fn hello(event: ResolutionEvent) -> Result<Value, FieldError> {
    let name = event
        .args
        .get("name")
        .and_then(Value::as_str)
        .unwrap_or("stranger");
    Ok(json!({ "message": format!("Hello {name}!") }))
}

fn hello_stitcher() -> Stitcher {
    Stitcher::builder()
        .schema(
            r#"
            type Query { hello(name: String): HelloPayload }
            type HelloPayload { message: String }
            "#,
        )
        .resolver("Query.hello", hello)
        .build()
        .unwrap()
}

#[tokio::test]
async fn hello_world() {
    let response = execute(&hello_stitcher(), r#"{ hello(name: "World") { message } }"#).await;
    assert_eq!(response.errors, vec![]);
    assert_eq!(
        response.data,
        Some(json!({ "hello": { "message": "Hello World!" } }))
    );
}

#[tokio::test]
async fn variables_and_fragments() {
    let stitcher = hello_stitcher();
    let mut request = crate::common::request(
        r#"
        query Greet($name: String) { greeting: hello(name: $name) { ...Message } }
        fragment Message on HelloPayload { message }
        "#,
    );
    request.variables.insert("name", json!("Ada"));
    let response = stitcher.execute(request, Default::default()).await;
    assert_eq!(
        response.data,
        Some(json!({ "greeting": { "message": "Hello Ada!" } }))
    );
}

#[tokio::test]
async fn disjoint_schemas_only_resolve_what_is_selected() {
    let calls_a = Arc::new(AtomicUsize::new(0));
    let calls_b = Arc::new(AtomicUsize::new(0));
    let counter = |calls: &Arc<AtomicUsize>, value: &'static str| {
        let calls = calls.clone();
        move |_event: ResolutionEvent| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, FieldError>(Value::from(value))
            }
        }
    };
    let stitcher = Stitcher::builder()
        .schema("type Query { a: String }")
        .schema("type Query { b: String }")
        .resolver("Query.a", counter(&calls_a, "a"))
        .resolver("Query.b", counter(&calls_b, "b"))
        .build()
        .unwrap();

    let response = execute(&stitcher, "{ a }").await;
    assert_eq!(response.data, Some(json!({ "a": "a" })));
    assert_eq!(calls_a.load(Ordering::SeqCst), 1);
    assert_eq!(calls_b.load(Ordering::SeqCst), 0);

    let response = execute(&stitcher, "{ b a }").await;
    assert_eq!(response.data, Some(json!({ "b": "b", "a": "a" })));
}

fn owned(fields: Vec<&str>) -> Vec<String> {
    fields.into_iter().map(String::from).collect()
}

#[tokio::test]
async fn add_fields_extends_a_copy_of_the_selection() {
    let seen: Arc<Mutex<Vec<Vec<String>>>> = Default::default();
    let recorder = seen.clone();
    let stitcher = Stitcher::builder()
        .schema(
            r#"
            type Query { user: User }
            type User { name: String city: String }
            "#,
        )
        .resolver("Query.user", move |mut event: ResolutionEvent| {
            let seen = recorder.clone();
            async move {
                let original = event.info.clone();
                event.add_fields(["city"])?;
                seen.lock().push(owned(event.info.selected_fields()));
                seen.lock().push(owned(original.selected_fields()));
                Ok::<_, FieldError>(json!({ "name": "Ada", "city": "London" }))
            }
        })
        .build()
        .unwrap();

    let response = execute(&stitcher, "{ user { name } }").await;
    assert_eq!(response.data, Some(json!({ "user": { "name": "Ada" } })));
    assert_eq!(
        *seen.lock(),
        vec![vec!["name".to_string(), "city".to_string()], vec!["name".to_string()]]
    );
}

#[tokio::test]
async fn field_errors_are_nulled_with_their_path() {
    let stitcher = Stitcher::builder()
        .schema(
            r#"
            type Query { user: User }
            type User { name: String! email: String }
            "#,
        )
        .resolver("Query.user", |_event: ResolutionEvent| async {
            Ok::<_, FieldError>(json!({ "name": "Ada" }))
        })
        .resolver("User.email", |_event: ResolutionEvent| async {
            Err::<Value, _>(FieldError::new("forbidden").with_code("FORBIDDEN"))
        })
        .build()
        .unwrap();

    let response = execute(&stitcher, "{ user { name email } }").await;
    assert_eq!(
        response.data,
        Some(json!({ "user": { "name": "Ada", "email": null } }))
    );
    assert_eq!(response.errors.len(), 1);
    let error = &response.errors[0];
    assert_eq!(error.message, "forbidden");
    assert_eq!(
        serde_json_bytes::to_value(&error.path).unwrap(),
        json!(["user", "email"])
    );
    assert_eq!(error.extensions.get("code"), Some(&json!("FORBIDDEN")));
}

#[tokio::test]
async fn abstract_types_use_resolve_type() {
    let stitcher = Stitcher::builder()
        .schema(
            r#"
            type Query { search: [SearchResult] }
            union SearchResult = User | Post
            type User { name: String }
            type Post { title: String }
            "#,
        )
        .resolver("Query.search", |_event: ResolutionEvent| async {
            Ok::<_, FieldError>(json!([{ "name": "Ada" }, { "title": "Notes" }]))
        })
        .resolver(
            "SearchResult.__resolveType",
            ResolverSpec::new(|_event: ResolutionEvent| async { Ok::<_, FieldError>(Value::Null) })
                .with_resolve_type(|value, _context| {
                    let kind = if value.get("name").is_some() { "User" } else { "Post" };
                    Some(kind.to_string())
                }),
        )
        .build()
        .unwrap();

    let response = execute(
        &stitcher,
        "{ search { __typename ... on User { name } ... on Post { title } } }",
    )
    .await;
    assert_eq!(response.errors, vec![]);
    assert_eq!(
        response.data,
        Some(json!({ "search": [
            { "__typename": "User", "name": "Ada" },
            { "__typename": "Post", "title": "Notes" },
        ] }))
    );
}

fn users_stitcher(cache: CacheStrategy) -> Stitcher {
    Stitcher::builder()
        .schema(
            r#"
            type Query { user: User users: [User] }
            type Mutation { deleteUser: Boolean }
            type User { name: String email: String role: Role }
            enum Role { ADMIN VIEWER }
            "#,
        )
        .resolver("Query.user", |_event: ResolutionEvent| async {
            Ok::<_, FieldError>(json!({
                "name": "Ada",
                "email": "ada@example.com",
                "role": "ADMIN",
            }))
        })
        .transform(
            r#"
            type Query { user: User }
            type User { name: String role: Role }
            enum Role { ADMIN }
            "#,
        )
        .cache(cache)
        .build()
        .unwrap()
}

#[tokio::test]
async fn transform_restricts_the_public_schema() {
    let stitcher = users_stitcher(CacheStrategy::Context);

    let response = execute(&stitcher, "{ user { name role } }").await;
    assert_eq!(
        response.data,
        Some(json!({ "user": { "name": "Ada", "role": "ADMIN" } }))
    );

    let response = execute(&stitcher, "{ user { email } }").await;
    assert_eq!(response.data, None);
    assert_eq!(
        response.errors[0].extensions.get("code"),
        Some(&json!("GRAPHQL_VALIDATION_FAILED"))
    );

    let response = execute(&stitcher, "mutation { deleteUser }").await;
    assert_eq!(response.errors[0].message, "mutation is not supported");

    let schema = stitcher.stitched_schema().await.unwrap();
    assert!(schema.schema().root_operation(OperationType::Mutation).is_none());
    assert!(schema.resolver("Query", "user").is_some());
    let sdl = schema.sdl();
    assert!(sdl.contains("type Query {\n  user: User\n}"));
    assert!(!sdl.contains("email"));
}

#[tokio::test]
async fn shared_cache_builds_once_for_every_context() {
    let stitcher = users_stitcher(CacheStrategy::shared("users"));
    let first = stitcher.stitched_schema().await.unwrap();
    let second = stitcher.stitched_schema().await.unwrap();
    assert!(Arc::ptr_eq(&first, &second));
}

#[tokio::test]
async fn context_cache_builds_per_context() {
    let stitcher = users_stitcher(CacheStrategy::Context);
    let first = stitcher.stitched_schema().await.unwrap();
    let second = stitcher.stitched_schema().await.unwrap();
    assert!(!Arc::ptr_eq(&first, &second));
    assert!(!first.shares_bindings_with(&second));
}

#[tokio::test]
async fn requests_without_a_query_are_rejected() {
    let response = hello_stitcher()
        .execute(Default::default(), Default::default())
        .await;
    assert_eq!(response.errors[0].message, "Must provide query string.");
    assert_eq!(
        response.errors[0].extensions.get("code"),
        Some(&json!("GRAPHQL_PARSE_FAILED"))
    );
}

#[tokio::test]
async fn subscriptions_are_rejected() {
    let stitcher = Stitcher::builder()
        .schema("type Query { a: String } type Subscription { ticks: Int }")
        .build()
        .unwrap();
    let response = execute(&stitcher, "subscription { ticks }").await;
    assert_eq!(response.errors[0].message, "subscriptions are not supported");
}
