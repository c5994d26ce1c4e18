use std::sync::Arc;
use std::sync::atomic::AtomicUsize;
use std::sync::atomic::Ordering;

use apollo_stitch::FieldError;
use apollo_stitch::Next;
use apollo_stitch::ResolutionEvent;
use apollo_stitch::Stitcher;
use apollo_stitch::json_ext::Value;
use futures::future::BoxFuture;
use http::HeaderMap;
use http::HeaderValue;
use parking_lot::Mutex;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;

use crate::common::request;

type Log = Arc<Mutex<Vec<&'static str>>>;

type Chained = BoxFuture<'static, Result<Value, FieldError>>;

fn recording(
    log: &Log,
    label: &'static str,
) -> impl Fn(ResolutionEvent, Next) -> Chained + Send + Sync + 'static {
    let log = log.clone();
    move |event, next| {
        let log = log.clone();
        Box::pin(async move {
            log.lock().push(label);
            let value = next.run(event).await?;
            Ok(Value::from(format!("{}{label}", value.as_str().unwrap_or_default())))
        })
    }
}

async fn require_scope(event: ResolutionEvent, next: Next) -> Result<Value, FieldError> {
    let allowed = event
        .context
        .headers()
        .get("scopes")
        .and_then(|scopes| scopes.to_str().ok())
        .is_some_and(|scopes| scopes.split(' ').any(|scope| scope == "read:secret"));
    if !allowed {
        return Err(FieldError::new("Insufficient permissions"));
    }
    next.run(event).await
}

#[tokio::test]
async fn chains_run_in_registration_order_and_may_short_circuit() {
    let log: Log = Default::default();
    let secret_calls = Arc::new(AtomicUsize::new(0));
    let resolver_log = log.clone();
    let calls = secret_calls.clone();
    let stitcher = Stitcher::builder()
        .schema(
            r#"
            type Query { user: User }
            type User { name: String secret: String }
            "#,
        )
        .resolver("Query.user", |_event: ResolutionEvent| async {
            Ok::<_, FieldError>(json!({}))
        })
        .resolver("User.name", move |_event: ResolutionEvent| {
            let log = resolver_log.clone();
            async move {
                log.lock().push("resolver");
                Ok::<_, FieldError>(Value::from("Ada"))
            }
        })
        .resolver("User.secret", move |_event: ResolutionEvent| {
            let calls = calls.clone();
            async move {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, FieldError>(Value::from("42"))
            }
        })
        .middleware("User.name", recording(&log, "first"))
        .middleware("User.name", recording(&log, "second"))
        .middleware("User.secret", require_scope)
        .build()
        .unwrap();

    let response = stitcher
        .execute(request("{ user { name secret } }"), HeaderMap::new())
        .await;
    assert_eq!(
        response.data,
        Some(json!({ "user": { "name": "Adasecondfirst", "secret": null } }))
    );
    assert_eq!(*log.lock(), ["first", "second", "resolver"]);
    assert_eq!(response.errors[0].message, "Insufficient permissions");
    assert_eq!(secret_calls.load(Ordering::SeqCst), 0);

    let mut headers = HeaderMap::new();
    headers.insert("scopes", HeaderValue::from_static("read:name read:secret"));
    let response = stitcher
        .execute(request("{ user { secret } }"), headers)
        .await;
    assert_eq!(response.data, Some(json!({ "user": { "secret": "42" } })));
    assert_eq!(secret_calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn middleware_wraps_default_property_resolution() {
    let stitcher = Stitcher::builder()
        .schema("type Query { user: User } type User { name: String }")
        .resolver("Query.user", |_event: ResolutionEvent| async {
            Ok::<_, FieldError>(json!({ "name": "ada" }))
        })
        .middleware("User.name", |event: ResolutionEvent, next: Next| async move {
            let value = next.run(event).await?;
            Ok::<_, FieldError>(Value::from(
                value.as_str().unwrap_or_default().to_uppercase(),
            ))
        })
        .build()
        .unwrap();

    let response = stitcher
        .execute(request("{ user { name } }"), HeaderMap::new())
        .await;
    assert_eq!(response.data, Some(json!({ "user": { "name": "ADA" } })));
}
