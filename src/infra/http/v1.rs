//! Legacy path-addressed routes: `/{prefix}/{*title}`.

use axum::{
    extract::State,
    response::{IntoResponse, Response},
};

use crate::application::{
    adapter::{self, LegacyRequest},
    error::HttpError,
};

use super::{HttpState, request::LegacyParts, response::conversion_response};

pub(super) async fn transform(State(state): State<HttpState>, parts: LegacyParts) -> Response {
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

    match state.orchestrator.convert(&ctx).await {
        Ok(conversion) => conversion_response(conversion),
        Err(err) => HttpError::from(err).into_response(),
    }
}
