use axum::{
    Json,
    http::{HeaderName, HeaderValue, StatusCode, header},
    response::{IntoResponse, Response},
};
use tracing::warn;

use crate::application::{
    convert::{CachePolicy, Conversion, ConvertedBody},
    error::HttpError,
};

pub const CONTENT_REVISION_HEADER: HeaderName = HeaderName::from_static("content-revision-id");

/// Turn a pipeline result into an HTTP response with its cache headers.
pub fn conversion_response(conversion: Conversion) -> Response {
    match conversion {
        Conversion::Redirect { location, cache } => {
            let location = match HeaderValue::from_str(&location) {
                Ok(value) => value,
                Err(err) => {
                    return HttpError::from_error(
                        "infra::http::response",
                        StatusCode::INTERNAL_SERVER_ERROR,
                        "Redirect location could not be built",
                        &err,
                    )
                    .into_response();
                }
            };
            let mut response = StatusCode::FOUND.into_response();
            response.headers_mut().insert(header::LOCATION, location);
            apply_cache_policy(&mut response, &cache);
            response
        }
        Conversion::Document { body, cache } => {
            let content_type = body.content_type();
            let mut response = match body {
                ConvertedBody::Html(text) | ConvertedBody::Markup(text) => {
                    ([(header::CONTENT_TYPE, content_type)], text).into_response()
                }
                ConvertedBody::PageBundle(bundle) => Json(bundle).into_response(),
                ConvertedBody::MarkupBundle(bundle) => Json(bundle).into_response(),
            };
            apply_cache_policy(&mut response, &cache);
            response
        }
    }
}

fn apply_cache_policy(response: &mut Response, cache: &CachePolicy) {
    match HeaderValue::from_str(&cache.cache_control) {
        Ok(value) => {
            response.headers_mut().insert(header::CACHE_CONTROL, value);
        }
        Err(err) => warn!(
            target = "markbridge::http::response",
            cache_control = %cache.cache_control,
            error = %err,
            "cache policy is not a valid header value"
        ),
    }
    if let Some(revision) = cache.content_revision {
        response
            .headers_mut()
            .insert(CONTENT_REVISION_HEADER, HeaderValue::from(revision.get()));
    }
}
