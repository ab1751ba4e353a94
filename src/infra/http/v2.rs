//! Versioned routes: `/v2/{domain}/{format}/{title}[/{revision}]`.

use std::collections::BTreeMap;

use axum::{
    body::Bytes,
    extract::{Path, Query, State},
    http::{HeaderMap, Method, Uri},
    response::{IntoResponse, Response},
};
use markbridge_api_types::TransformBody;
use serde::Deserialize;

use crate::application::adapter::{self, VersionedRequest};

use super::{
    HttpState,
    error::ApiError,
    request::request_meta,
    response::conversion_response,
};

#[derive(Debug, Deserialize)]
pub(super) struct VersionedPath {
    domain: String,
    format: String,
    title: String,
    #[serde(default)]
    revision: Option<String>,
}

pub(super) async fn transform(
    State(state): State<HttpState>,
    method: Method,
    Path(path): Path<VersionedPath>,
    Query(query): Query<BTreeMap<String, String>>,
    headers: HeaderMap,
    uri: Uri,
    body: Bytes,
) -> Response {
    let body = match parse_body(&body) {
        Ok(body) => body,
        Err(err) => return err.into_response(),
    };

    let ctx = match adapter::from_versioned(
        &state.sites,
        VersionedRequest {
            method: &method,
            domain: &path.domain,
            format: &path.format,
            title: &path.title,
            revision: path.revision.as_deref(),
            query: &query,
            body,
            meta: request_meta(&headers, &uri),
        },
    ) {
        Ok(ctx) => ctx,
        Err(err) => return ApiError::from(err).into_response(),
    };

    match state.orchestrator.convert(&ctx).await {
        Ok(conversion) => conversion_response(conversion),
        Err(err) => ApiError::from(err).into_response(),
    }
}

fn parse_body(bytes: &Bytes) -> Result<Option<TransformBody>, ApiError> {
    if bytes.iter().all(u8::is_ascii_whitespace) {
        return Ok(None);
    }
    serde_json::from_slice(bytes)
        .map(Some)
        .map_err(|err| ApiError::bad_request("Invalid request body", Some(err.to_string())))
}
