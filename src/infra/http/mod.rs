//! HTTP surface: legacy and versioned conversion routes, round-trip reports
//! and a health probe.

mod error;
mod middleware;
mod request;
mod response;
mod roundtrip;
mod v1;
mod v2;

pub use error::{ApiError, ApiErrorBody, ApiErrorMessage, codes};
pub use middleware::{METRIC_HTTP_RESPONSES, REQUEST_ID_HEADER};
pub use request::{MAX_BODY_BYTES, request_meta};
pub use response::{CONTENT_REVISION_HEADER, conversion_response};

use std::sync::Arc;

use axum::{
    Router,
    http::StatusCode,
    middleware as axum_middleware,
    routing::get,
};

use crate::application::{
    convert::Orchestrator, roundtrip::RoundTripValidator, sites::SiteRegistry,
};

use self::middleware::{record_outcome, tag_request};

#[derive(Clone)]
pub struct HttpState {
    pub orchestrator: Orchestrator,
    pub validator: RoundTripValidator,
    pub sites: Arc<SiteRegistry>,
}

impl HttpState {
    pub fn new(orchestrator: Orchestrator, sites: SiteRegistry) -> Self {
        Self {
            validator: RoundTripValidator::new(orchestrator.clone()),
            orchestrator,
            sites: Arc::new(sites),
        }
    }
}

pub fn build_router(state: HttpState) -> Router {
    Router::new()
        .route("/_health", get(health))
        .route(
            "/v2/{domain}/{format}/{title}",
            get(v2::transform).post(v2::transform),
        )
        .route(
            "/v2/{domain}/{format}/{title}/{revision}",
            get(v2::transform).post(v2::transform),
        )
        .route(
            "/_rt/{prefix}/{*title}",
            get(roundtrip::plain).post(roundtrip::plain),
        )
        .route(
            "/_rtve/{prefix}/{*title}",
            get(roundtrip::strip_newlines).post(roundtrip::strip_newlines),
        )
        .route(
            "/_rtselser/{prefix}/{*title}",
            get(roundtrip::selser).post(roundtrip::selser),
        )
        .route(
            "/{prefix}/{*title}",
            get(v1::transform).post(v1::transform),
        )
        .with_state(state)
        .layer(axum_middleware::from_fn(record_outcome))
        .layer(axum_middleware::from_fn(tag_request))
}

async fn health() -> StatusCode {
    StatusCode::NO_CONTENT
}
