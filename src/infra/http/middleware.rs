//! Request tagging and outcome accounting shared by every route.

use std::time::Instant;

use axum::{
    body::Body,
    http::{HeaderValue, Request, StatusCode},
    middleware::Next,
    response::Response,
};
use metrics::counter;
use tracing::{error, warn};
use uuid::Uuid;

use crate::application::error::ErrorReport;

pub const REQUEST_ID_HEADER: &str = "x-request-id";
pub const METRIC_HTTP_RESPONSES: &str = "markbridge_http_responses_total";

const MAX_REQUEST_ID_LEN: usize = 128;

/// Correlates log lines of one request. Taken from the caller when it sends
/// a usable `x-request-id`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestId(pub String);

impl RequestId {
    fn from_request(request: &Request<Body>) -> Self {
        let supplied = request
            .headers()
            .get(REQUEST_ID_HEADER)
            .and_then(|value| value.to_str().ok())
            .map(str::trim)
            .filter(|value| !value.is_empty() && value.len() <= MAX_REQUEST_ID_LEN);
        match supplied {
            Some(value) => Self(value.to_string()),
            None => Self(Uuid::new_v4().to_string()),
        }
    }
}

pub async fn tag_request(mut request: Request<Body>, next: Next) -> Response {
    let request_id = RequestId::from_request(&request);
    request.extensions_mut().insert(request_id.clone());

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id.0) {
        response.headers_mut().insert(REQUEST_ID_HEADER, value);
    }
    response.extensions_mut().insert(request_id);
    response
}

/// Count every response by status class and log the failures, using the
/// [`ErrorReport`] the handler attached when there is one.
pub async fn record_outcome(request: Request<Body>, next: Next) -> Response {
    let started = Instant::now();
    let method = request.method().clone();
    let path = request.uri().path().to_string();
    let request_id = request
        .extensions()
        .get::<RequestId>()
        .map(|id| id.0.clone())
        .unwrap_or_default();

    let mut response = next.run(request).await;
    let status = response.status();
    counter!(METRIC_HTTP_RESPONSES, "class" => status_class(status)).increment(1);

    if !(status.is_client_error() || status.is_server_error()) {
        return response;
    }

    let (source, chain) = match response.extensions_mut().remove::<ErrorReport>() {
        Some(report) => (report.source, report.messages),
        None => ("unreported", Vec::new()),
    };
    let elapsed_ms = started.elapsed().as_millis() as u64;
    if status.is_server_error() {
        error!(
            target = "markbridge::http",
            request_id = %request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            elapsed_ms,
            source,
            chain = ?chain,
            "conversion request failed"
        );
    } else {
        warn!(
            target = "markbridge::http",
            request_id = %request_id,
            method = %method,
            path = %path,
            status = status.as_u16(),
            elapsed_ms,
            source,
            chain = ?chain,
            "conversion request rejected"
        );
    }
    response
}

fn status_class(status: StatusCode) -> &'static str {
    match status.as_u16() / 100 {
        2 => "2xx",
        3 => "3xx",
        4 => "4xx",
        5 => "5xx",
        _ => "other",
    }
}
