mod support;

use std::sync::Arc;

use axum::{
    body::Body,
    http::{Method, Request, StatusCode, header},
};
use markbridge::{
    application::{
        context::{ConversionInput, RequestContext, RequestMeta},
        roundtrip::{RoundTripValidator, RoundTripVariant, SELSER_SENTINEL, diff::DiffRun},
        timeout::RecordingHeartbeat,
    },
    domain::types::{ApiVersion, ConversionFlags, Direction},
};
use markbridge_api_types::{HeartbeatMessage, UpdateKinds};

use support::{Harness, MemoryContent, body_json, body_text, send};

const CANONICAL: &str = "# Heading\n\nSome *text* with `code`.\n\n- one\n- two\n";

fn inline_context(markup: &str) -> RequestContext {
    RequestContext {
        site: Arc::new(support::site()),
        api_version: ApiVersion::V1,
        direction: Direction::MarkupToRendered,
        format: None,
        title: "Sandbox".to_string(),
        revision: None,
        input: ConversionInput::Markup(markup.to_string()),
        flags: ConversionFlags::default(),
        original: None,
        previous: None,
        update: UpdateKinds::default(),
        cache_id: None,
        meta: RequestMeta {
            request_url: "/_rt/enwiki/Sandbox".to_string(),
            ..RequestMeta::default()
        },
    }
}

fn validator() -> RoundTripValidator {
    RoundTripValidator::new(Harness::new(Arc::new(MemoryContent::default())).orchestrator())
}

#[tokio::test]
async fn canonical_markup_round_trips_without_changes() {
    let report = validator()
        .check(&inline_context(CANONICAL), RoundTripVariant::Plain)
        .await
        .expect("round trip");

    assert!(report.is_clean(), "{:?}", report.changes());
    assert_eq!(report.markup(), CANONICAL);
    assert_eq!(report.original_markup(), CANONICAL);
    assert_eq!(report.request_url(), "/_rt/enwiki/Sandbox");
    assert!(
        report
            .headers()
            .is_some_and(|base| base.contains("//en.example.org/wiki/"))
    );
    assert_eq!(report.body_fragments().len(), 3);
    assert!(report.rendered_text().contains("&lt;h1"));
}

#[tokio::test]
async fn sentinel_variant_reuses_the_source_and_drops_the_comment() {
    let source = "Odd   spacing  here\n\n* star bullet\n";
    let report = validator()
        .check(&inline_context(source), RoundTripVariant::SelserSentinel)
        .await
        .expect("round trip");

    assert!(!report.markup().contains(SELSER_SENTINEL));
    assert_eq!(report.markup(), source);
    assert!(report.is_clean());
}

#[tokio::test]
async fn full_serialization_normalizes_and_reports_the_change() {
    let source = "Odd   spacing  here\n\n* star bullet\n";
    let report = validator()
        .check(&inline_context(source), RoundTripVariant::Plain)
        .await
        .expect("round trip");

    assert!(!report.is_clean());
    assert!(
        report
            .changes()
            .iter()
            .any(|run| run.lines().iter().any(|line| line == "- star bullet"))
    );
}

#[tokio::test]
async fn stored_revisions_are_checked_over_http_as_json() {
    let harness = Harness::new(MemoryContent::with_page("Main_Page", &[(42, CANONICAL)]));
    let router = harness.router();
    let request = Request::builder()
        .uri("/_rt/enwiki/Main_Page?oldid=42")
        .header(header::ACCEPT, "application/json")
        .body(Body::empty())
        .expect("request");

    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["variant"], "plain");
    assert_eq!(report["markup"], CANONICAL);
    assert_eq!(report["original_markup"], CANONICAL);
    assert_eq!(report["request_url"], "/_rt/enwiki/Main_Page?oldid=42");
}

#[tokio::test]
async fn posted_markup_gets_an_html_report() {
    let router = Harness::new(Arc::new(MemoryContent::default())).router();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/_rtve/enwiki/Sandbox")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .body(Body::from("wt=Just%20a%20line%0Aand%20its%20tail%0A"))
        .expect("request");

    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let page = body_text(response).await;
    assert!(page.contains("Just a lineand its tail"), "{page}");
}

#[tokio::test]
async fn strip_newlines_flattens_multi_line_blocks() {
    let source = "First line\nsecond line\n\n- one\n- two\n";
    let report = validator()
        .check(&inline_context(source), RoundTripVariant::StripNewlines)
        .await
        .expect("round trip");

    assert_eq!(report.body_fragments().len(), 2);
    assert!(report.body_fragments().iter().all(|fragment| !fragment.contains('\n')));
    assert!(report.body_fragments()[0].contains("First linesecond line"));
    assert!(report.body_fragments()[1].contains("<li>one</li><li>two</li>"));
    assert_eq!(report.markup(), "First linesecond line\n\n- one\n- two\n");
    assert_eq!(
        report.changes(),
        vec![
            &DiffRun::Delete(vec!["First line".to_string(), "second line".to_string()]),
            &DiffRun::Insert(vec!["First linesecond line".to_string()]),
        ]
    );
}

#[tokio::test]
async fn multibyte_markup_round_trips_cleanly() {
    let source = "# Grüße\n\nCafé déjà vu — {{Grüße|名前=東京}}\n\n- naïve\n";
    for variant in [RoundTripVariant::Plain, RoundTripVariant::SelserSentinel] {
        let report = validator()
            .check(&inline_context(source), variant)
            .await
            .expect("round trip");
        assert!(report.is_clean(), "{variant:?}: {:?}", report.changes());
        assert_eq!(report.markup(), source);
    }
}

#[tokio::test]
async fn one_check_runs_under_a_single_request_token() {
    let heartbeat = Arc::new(RecordingHeartbeat::new());
    let mut harness = Harness::new(MemoryContent::with_page("Main_Page", &[(42, CANONICAL)]));
    harness.heartbeat = Some(heartbeat.clone());
    let validator = RoundTripValidator::new(harness.orchestrator());

    let mut ctx = inline_context(CANONICAL);
    ctx.title = "Main_Page".to_string();
    ctx.input = ConversionInput::None;
    for variant in [RoundTripVariant::Plain, RoundTripVariant::SelserSentinel] {
        validator.check(&ctx, variant).await.expect("round trip");
    }

    let messages = heartbeat.messages();
    assert_eq!(messages.len(), 4, "{messages:?}");
    for pair in messages.chunks(2) {
        match pair {
            [
                HeartbeatMessage::Start { timeout_id, .. },
                HeartbeatMessage::Done { timeout_id: done_id },
            ] => assert_eq!(timeout_id, done_id),
            other => panic!("unexpected heartbeat sequence {other:?}"),
        }
    }
}

#[tokio::test]
async fn posted_multibyte_markup_survives_the_form_and_the_report() {
    let router = Harness::new(Arc::new(MemoryContent::default())).router();
    let request = Request::builder()
        .method(Method::POST)
        .uri("/_rt/enwiki/Sandbox")
        .header(header::CONTENT_TYPE, "application/x-www-form-urlencoded")
        .header(header::ACCEPT, "application/json")
        .body(Body::from("wt=Caf%C3%A9%20%E6%9D%B1%E4%BA%AC%0A"))
        .expect("request");

    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::OK);
    let report = body_json(response).await;
    assert_eq!(report["markup"], "Café 東京\n");
    assert_eq!(report["original_markup"], "Café 東京\n");
}

#[tokio::test]
async fn unknown_prefix_is_rejected_before_rendering() {
    let router = Harness::new(Arc::new(MemoryContent::default())).router();
    let request = Request::builder()
        .uri("/_rtselser/xxwiki/Main_Page")
        .body(Body::empty())
        .expect("request");
    let response = send(&router, request).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}
