mod support;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use markbridge::{
    application::{adapter::SUBST_UNSUPPORTED, convert::UNCACHEABLE},
    infra::http::{CONTENT_REVISION_HEADER, REQUEST_ID_HEADER},
};

use support::{Harness, MemoryContent, RecordingPreprocessor, body_json, body_text, send};

fn harness() -> Harness {
    Harness::new(MemoryContent::with_page(
        "Main_Page",
        &[(41, "Old *page*\n"), (42, "Hello page\n")],
    ))
}

fn get(uri: &str) -> Request<Body> {
    Request::builder()
        .uri(uri)
        .body(Body::empty())
        .expect("request")
}

fn post_json(uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .expect("request")
}

fn post_form(uri: &str, form: &str) -> Request<Body> {
    Request::builder()
        .method(Method::POST)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from(form.to_string()))
        .expect("request")
}

#[tokio::test]
async fn health_probe_answers_no_content() {
    let router = harness().router();
    let response = send(&router, get("/_health")).await;
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn request_ids_are_echoed_or_generated() {
    let router = harness().router();
    let tagged = Request::builder()
        .uri("/_health")
        .header(REQUEST_ID_HEADER, "edit-17")
        .body(Body::empty())
        .expect("request");
    let response = send(&router, tagged).await;
    assert_eq!(response.headers()[REQUEST_ID_HEADER], "edit-17");

    let response = send(&router, get("/enwiki/Main_Page?oldid=999")).await;
    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert!(response.headers().contains_key(REQUEST_ID_HEADER));
}

#[tokio::test]
async fn legacy_get_without_revision_redirects_to_latest() {
    let router = harness().router();
    let response = send(&router, get("/enwiki/Main_Page?body=1")).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/enwiki/Main_Page?oldid=42&body=1"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], UNCACHEABLE);
}

#[tokio::test]
async fn legacy_get_with_revision_is_cacheable_without_a_session() {
    let router = harness().router();
    let response = send(&router, get("/enwiki/Main_Page?oldid=41")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[CONTENT_REVISION_HEADER], "41");
    assert_eq!(
        response.headers()[header::CACHE_CONTROL],
        "public, max-age=86400"
    );
    assert!(body_text(response).await.contains("<em>page</em>"));

    let with_session = Request::builder()
        .uri("/enwiki/Main_Page?oldid=41")
        .header(header::COOKIE, "enwikiSession=abc")
        .body(Body::empty())
        .expect("request");
    let response = send(&router, with_session).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], UNCACHEABLE);
}

#[tokio::test]
async fn legacy_post_renders_inline_markup() {
    let router = harness().router();
    let response = send(
        &router,
        post_form("/enwiki/Sandbox", "wt=Some%20**bold**%20text&body=1"),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("<strong>bold</strong>"), "{html}");
    assert!(!html.contains("<head>"), "{html}");
}

#[tokio::test]
async fn legacy_unknown_prefix_is_a_client_error() {
    let router = harness().router();
    let response = send(&router, get("/xxwiki/Main_Page")).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_text(response).await, "Invalid domain");
}

#[tokio::test]
async fn versioned_get_without_revision_redirects_to_latest() {
    let router = harness().router();
    let response = send(&router, get("/v2/en.example.org/html/Main_Page")).await;

    assert_eq!(response.status(), StatusCode::FOUND);
    assert_eq!(
        response.headers()[header::LOCATION],
        "/v2/en.example.org/html/Main_Page/42"
    );
    assert_eq!(response.headers()[header::CACHE_CONTROL], UNCACHEABLE);
}

#[tokio::test]
async fn versioned_get_with_revision_renders_without_annotations() {
    let router = harness().router();
    let response = send(&router, get("/v2/en.example.org/html/Main_Page/41")).await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(response.headers()[header::CACHE_CONTROL], UNCACHEABLE);
    let html = body_text(response).await;
    assert!(html.contains("<em>page</em>"), "{html}");
    assert!(!html.contains("data-mb"), "{html}");
}

#[tokio::test]
async fn versioned_get_rejects_the_markup_format() {
    let router = harness().router();
    let response = send(&router, get("/v2/en.example.org/markup/Main_Page")).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let body = body_json(response).await;
    assert_eq!(body["error"]["code"], "bad_request");
    assert_eq!(body["error"]["message"], "Invalid format");
}

#[tokio::test]
async fn versioned_unknown_domain_is_rejected() {
    let router = harness().router();
    let response = send(&router, get("/v2/fr.example.org/html/Main_Page")).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["message"], "Invalid domain");
}

#[tokio::test]
async fn versioned_substitution_only_for_rendered_format() {
    let mut harness = harness();
    harness.preprocessor = RecordingPreprocessor::replying("Hello World\n");
    let router = harness.router();
    let body = serde_json::json!({
        "wikitext": "Hello {{Template}}",
        "html": "<p>Hello</p>",
    });

    let accepted = send(
        &router,
        post_json("/v2/en.example.org/rendered/Main_Page?subst=true", body.clone()),
    )
    .await;
    assert_eq!(accepted.status(), StatusCode::OK);
    assert!(body_text(accepted).await.contains("Hello World"));
    assert_eq!(
        harness.preprocessor.seen(),
        vec!["Hello {{subst:Template}}".to_string()]
    );

    let rejected = send(
        &router,
        post_json("/v2/en.example.org/markup/Main_Page?subst=true", body),
    )
    .await;
    assert_eq!(rejected.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(rejected).await["error"]["message"], SUBST_UNSUPPORTED);
}

#[tokio::test]
async fn versioned_pagebundle_splits_annotations_out() {
    let router = harness().router();
    let response = send(
        &router,
        post_json(
            "/v2/en.example.org/pagebundle/Main_Page",
            serde_json::json!({"wikitext": "# Title\n\nText\n"}),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    let bundle = body_json(response).await;
    let html = bundle["html"]["body"].as_str().expect("html body");
    assert!(html.contains("<h1"), "{html}");
    assert!(!html.contains("data-mb"), "{html}");
    assert_eq!(bundle["data-parsoid"]["body"]["counter"], 2);
    assert!(bundle["data-parsoid"]["body"]["ids"]["mb0"]["dsr"].is_array());
}

#[tokio::test]
async fn versioned_serialization_answers_markup() {
    let router = harness().router();
    let response = send(
        &router,
        post_json(
            "/v2/en.example.org/markup/Main_Page",
            serde_json::json!({"html": "<h2>Section</h2><p>Some <em>text</em></p>"}),
        ),
    )
    .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        response.headers()[header::CONTENT_TYPE],
        "text/plain; charset=utf-8"
    );
    assert_eq!(body_text(response).await, "## Section\n\nSome *text*\n");
}

#[tokio::test]
async fn multibyte_text_and_markup_characters_survive_both_directions() {
    let router = harness().router();
    let response = send(
        &router,
        post_form(
            "/enwiki/Sandbox",
            "wt=Caf%C3%A9%20%E2%80%94%20**%E6%9D%B1%E4%BA%AC**&body=1",
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    let html = body_text(response).await;
    assert!(html.contains("Café — <strong>東京</strong>"), "{html}");

    let response = send(
        &router,
        post_json(
            "/v2/en.example.org/markup/Main_Page",
            serde_json::json!({"html": "<p>Grüße &amp; <b>東京</b> &lt;i&gt; *x*</p>"}),
        ),
    )
    .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_text(response).await, "Grüße & **東京** \\<i> \\*x\\*\n");
}

#[tokio::test]
async fn versioned_serialization_without_html_is_rejected() {
    let router = harness().router();
    let response = send(
        &router,
        post_json("/v2/en.example.org/markup/Main_Page", serde_json::json!({})),
    )
    .await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn malformed_versioned_body_is_rejected() {
    let router = harness().router();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/v2/en.example.org/html/Main_Page")
        .body(Body::from("{not json"))
        .expect("request");
    let response = send(&router, request).await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(body_json(response).await["error"]["message"], "Invalid request body");
}

#[tokio::test]
async fn missing_page_keeps_the_remote_status() {
    let router = Harness::new(Arc::new(MemoryContent::default())).router();
    let response = send(&router, get("/v2/en.example.org/html/Nowhere")).await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    assert_eq!(body_json(response).await["error"]["code"], "upstream_error");
}
