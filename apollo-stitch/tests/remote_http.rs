use apollo_stitch::RemoteSchema;
use apollo_stitch::Stitcher;
use apollo_stitch::remote::ForwardHeaders;
use http::HeaderMap;
use http::HeaderName;
use http::HeaderValue;
use pretty_assertions::assert_eq;
use serde_json_bytes::json;
use url::Url;
use wiremock::Mock;
use wiremock::MockServer;
use wiremock::ResponseTemplate;
use wiremock::matchers::header;
use wiremock::matchers::method;
use wiremock::matchers::path;

use crate::common::execute;
use crate::common::request;

fn greetings(server: &MockServer) -> RemoteSchema {
    let url = Url::parse(&format!("{}/graphql", server.uri())).unwrap();
    RemoteSchema::from_url(url)
        .with_name("greetings")
        .with_graph("type Query { hello: String }".parse().unwrap())
}

fn incoming_headers() -> HeaderMap {
    let mut headers = HeaderMap::new();
    headers.insert("x-tenant", HeaderValue::from_static("acme"));
    headers.insert("x-internal", HeaderValue::from_static("secret"));
    headers.insert("authorization", HeaderValue::from_static("Bearer user-token"));
    headers.insert("host", HeaderValue::from_static("stitch.local"));
    headers
}

#[tokio::test]
async fn forwards_configured_headers_and_bearer_token() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/graphql"))
        .and(header("x-tenant", "acme"))
        .and(header("authorization", "Bearer service-token"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "data": { "hello": "world" } })),
        )
        .expect(1)
        .mount(&server)
        .await;

    let stitcher = Stitcher::builder()
        .remote_schema(
            greetings(&server)
                .with_forward_headers(ForwardHeaders::Named(vec![
                    HeaderName::from_static("x-tenant"),
                    HeaderName::from_static("authorization"),
                ]))
                .with_token(|context| {
                    context
                        .headers()
                        .contains_key("x-tenant")
                        .then(|| "service-token".to_string())
                }),
        )
        .build()
        .unwrap();

    let response = stitcher
        .execute(request("{ hello }"), incoming_headers())
        .await;
    assert_eq!(response.errors, vec![]);
    assert_eq!(response.data, Some(json!({ "hello": "world" })));

    let received = server.received_requests().await.unwrap();
    assert_eq!(received.len(), 1);
    assert!(!received[0].headers.contains_key("x-internal"));
    assert_ne!(received[0].headers["host"], "stitch.local");
    let body: serde_json::Value = received[0].body_json().unwrap();
    assert_eq!(body, serde_json::json!({ "query": "query { hello }" }));
}

#[tokio::test]
async fn forward_all_skips_hop_by_hop_headers() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(
            ResponseTemplate::new(200)
                .set_body_json(serde_json::json!({ "data": { "hello": "world" } })),
        )
        .mount(&server)
        .await;

    let stitcher = Stitcher::builder()
        .remote_schema(greetings(&server).with_forward_headers(ForwardHeaders::All))
        .build()
        .unwrap();
    stitcher
        .execute(request("{ hello }"), incoming_headers())
        .await;

    let received = server.received_requests().await.unwrap();
    let headers = &received[0].headers;
    assert_eq!(headers["x-tenant"], "acme");
    assert_eq!(headers["x-internal"], "secret");
    assert_eq!(headers["authorization"], "Bearer user-token");
    assert_ne!(headers["host"], "stitch.local");
}

#[tokio::test]
async fn http_failures_are_field_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(502))
        .mount(&server)
        .await;

    let stitcher = Stitcher::builder()
        .remote_schema(greetings(&server))
        .build()
        .unwrap();
    let response = execute(&stitcher, "{ hello }").await;
    assert_eq!(response.data, Some(json!({ "hello": null })));
    let error = &response.errors[0];
    assert_eq!(error.message, "HTTP fetch failed from 'greetings': Bad Gateway");
    assert_eq!(
        error.extensions.get("code"),
        Some(&json!("SUBREQUEST_HTTP_ERROR"))
    );
    assert_eq!(error.extensions.get("http"), Some(&json!({ "status": 502 })));
}

#[tokio::test]
async fn introspection_failures_are_configuration_errors() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": null,
            "errors": [{ "message": "introspection is disabled" }],
        })))
        .mount(&server)
        .await;

    let url = Url::parse(&format!("{}/graphql", server.uri())).unwrap();
    let stitcher = Stitcher::builder()
        .remote_schema(RemoteSchema::from_url(url).with_name("locked"))
        .build()
        .unwrap();
    let response = execute(&stitcher, "{ hello }").await;
    assert_eq!(response.data, None);
    assert_eq!(
        response.errors[0].message,
        "could not introspect remote schema: introspection of service 'locked' failed: introspection is disabled"
    );
    assert_eq!(
        response.errors[0].extensions.get("code"),
        Some(&json!("STITCH_CONFIGURATION_ERROR"))
    );
}
