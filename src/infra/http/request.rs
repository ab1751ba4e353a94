//! Transport facts shared by every route: request metadata and the legacy
//! parameter bag.

use std::collections::BTreeMap;

use axum::{
    body::{Bytes, to_bytes},
    extract::{FromRequest, FromRequestParts, Path, Request},
    http::{HeaderMap, Method, StatusCode, Uri, header},
    response::{IntoResponse, Response},
};

use crate::application::{context::RequestMeta, error::HttpError};
use crate::infra::remote::CACHE_ORIGIN_HEADER;

pub const MAX_BODY_BYTES: usize = 10 * 1024 * 1024;

const FORM_CONTENT_TYPE: &str = "application/x-www-form-urlencoded";
const JSON_MEDIA_TYPE: &str = "application/json";

pub fn request_meta(headers: &HeaderMap, uri: &Uri) -> RequestMeta {
    RequestMeta {
        has_session: has_session_cookie(headers),
        cache_origin: headers.contains_key(CACHE_ORIGIN_HEADER),
        query: uri.query().map(str::to_string),
        request_url: uri
            .path_and_query()
            .map(|pq| pq.as_str().to_string())
            .unwrap_or_else(|| uri.path().to_string()),
        accept_json: header_contains(headers, header::ACCEPT, JSON_MEDIA_TYPE),
    }
}

/// Any cookie whose name ends in `session` marks a logged-in caller.
fn has_session_cookie(headers: &HeaderMap) -> bool {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .flat_map(|value| value.split(';'))
        .filter_map(|pair| pair.split('=').next())
        .any(|name| name.trim().to_ascii_lowercase().ends_with("session"))
}

pub fn header_contains(headers: &HeaderMap, name: header::HeaderName, needle: &str) -> bool {
    headers
        .get_all(name)
        .iter()
        .filter_map(|value| value.to_str().ok())
        .any(|value| value.to_ascii_lowercase().contains(needle))
}

pub fn query_params(query: Option<&str>) -> BTreeMap<String, String> {
    query
        .map(|query| {
            url::form_urlencoded::parse(query.as_bytes())
                .into_owned()
                .collect()
        })
        .unwrap_or_default()
}

pub async fn read_body(body: axum::body::Body) -> Result<Bytes, HttpError> {
    to_bytes(body, MAX_BODY_BYTES).await.map_err(|err| {
        HttpError::from_error(
            "infra::http::request::read_body",
            StatusCode::PAYLOAD_TOO_LARGE,
            "Request body too large",
            &err,
        )
    })
}

/// Everything a `/{prefix}/{*title}` route needs.
///
/// Query parameters and urlencoded form fields are merged into one map, form
/// fields winning.
#[derive(Debug, Clone)]
pub struct LegacyParts {
    pub method: Method,
    pub prefix: String,
    pub title: String,
    pub params: BTreeMap<String, String>,
    pub meta: RequestMeta,
}

impl<S> FromRequest<S> for LegacyParts
where
    S: Send + Sync,
{
    type Rejection = Response;

    async fn from_request(request: Request, state: &S) -> Result<Self, Self::Rejection> {
        let (mut parts, body) = request.into_parts();
        let Path((prefix, title)) =
            Path::<(String, String)>::from_request_parts(&mut parts, state)
                .await
                .map_err(IntoResponse::into_response)?;

        let meta = request_meta(&parts.headers, &parts.uri);
        let mut params = query_params(parts.uri.query());
        if header_contains(&parts.headers, header::CONTENT_TYPE, FORM_CONTENT_TYPE) {
            let bytes = read_body(body)
                .await
                .map_err(IntoResponse::into_response)?;
            params.extend(url::form_urlencoded::parse(&bytes).into_owned());
        }

        Ok(Self {
            method: parts.method,
            prefix,
            title,
            params,
            meta,
        })
    }
}

#[cfg(test)]
mod tests {
    use axum::http::HeaderValue;

    use super::*;

    #[test]
    fn meta_reads_session_cache_origin_and_accept() {
        let mut headers = HeaderMap::new();
        headers.insert(
            header::COOKIE,
            HeaderValue::from_static("theme=dark; enwikiSession=abc"),
        );
        headers.insert(CACHE_ORIGIN_HEADER, HeaderValue::from_static("1"));
        headers.insert(
            header::ACCEPT,
            HeaderValue::from_static("application/json; charset=utf-8"),
        );
        let uri: Uri = "/enwiki/Main_Page?oldid=3".parse().expect("uri");

        let meta = request_meta(&headers, &uri);
        assert!(meta.has_session);
        assert!(meta.cache_origin);
        assert!(meta.accept_json);
        assert_eq!(meta.query.as_deref(), Some("oldid=3"));
        assert_eq!(meta.request_url, "/enwiki/Main_Page?oldid=3");
    }

    #[test]
    fn plain_cookies_are_not_sessions() {
        let mut headers = HeaderMap::new();
        headers.insert(header::COOKIE, HeaderValue::from_static("theme=dark"));
        let uri: Uri = "/enwiki/Main_Page".parse().expect("uri");
        let meta = request_meta(&headers, &uri);
        assert!(!meta.has_session);
        assert!(!meta.cache_origin);
        assert!(!meta.accept_json);
        assert_eq!(meta.query, None);
    }

    #[test]
    fn query_params_decode() {
        let params = query_params(Some("wt=a%20b&body=1"));
        assert_eq!(params.get("wt").map(String::as_str), Some("a b"));
        assert_eq!(params.get("body").map(String::as_str), Some("1"));
    }
}
