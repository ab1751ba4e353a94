//! Round-trip report routes: `/_rt`, `/_rtve` and `/_rtselser`.

use axum::{
    Json,
    extract::State,
    http::StatusCode,
    response::{IntoResponse, Response},
};

use crate::application::{
    adapter::{self, LegacyRequest},
    error::HttpError,
    roundtrip::RoundTripVariant,
};
use crate::presentation::views::{RoundTripTemplate, RoundTripView, render_template_response};

use super::{HttpState, request::LegacyParts};

pub(super) async fn plain(state: State<HttpState>, parts: LegacyParts) -> Response {
    check(state, parts, RoundTripVariant::Plain).await
}

pub(super) async fn strip_newlines(state: State<HttpState>, parts: LegacyParts) -> Response {
    check(state, parts, RoundTripVariant::StripNewlines).await
}

pub(super) async fn selser(state: State<HttpState>, parts: LegacyParts) -> Response {
    check(state, parts, RoundTripVariant::SelserSentinel).await
}

async fn check(
    State(state): State<HttpState>,
    parts: LegacyParts,
    variant: RoundTripVariant,
) -> Response {
    let accept_json = parts.meta.accept_json;
    let ctx = match adapter::from_legacy(
        &state.sites,
        LegacyRequest {
            method: &parts.method,
            prefix: &parts.prefix,
            title: &parts.title,
            params: &parts.params,
            meta: parts.meta.clone(),
        },
    ) {
        Ok(ctx) => ctx,
        Err(err) => return HttpError::from(err).into_response(),
    };

    let report = match state.validator.check(&ctx, variant).await {
        Ok(report) => report,
        Err(err) => return HttpError::from(err).into_response(),
    };

    if accept_json {
        Json(report).into_response()
    } else {
        render_template_response(
            RoundTripTemplate {
                view: RoundTripView::from_report(&report),
            },
            StatusCode::OK,
        )
    }
}
