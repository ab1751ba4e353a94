use crate::application::error::{ConversionError, ErrorReport};
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

#[derive(Debug, Serialize)]
pub struct ApiErrorBody {
    pub error: ApiErrorMessage,
}

pub mod codes {
    pub const BAD_REQUEST: &str = "bad_request";
    pub const NOT_FOUND: &str = "not_found";
    pub const UPSTREAM: &str = "upstream_error";
    pub const TIMEOUT: &str = "timeout";
    pub const PARSE: &str = "parse_error";
    pub const SERIALIZE: &str = "serialize_error";
    pub const INTERNAL: &str = "internal_error";
    pub const PAYLOAD_TOO_LARGE: &str = "payload_too_large";
}

#[derive(Debug, Serialize)]
pub struct ApiErrorMessage {
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hint: Option<String>,
}

/// JSON error answered by the versioned API.
#[derive(Debug)]
pub struct ApiError {
    status: StatusCode,
    code: &'static str,
    message: String,
    hint: Option<String>,
    detail: Option<Vec<String>>,
}

impl ApiError {
    pub fn new(
        status: StatusCode,
        code: &'static str,
        message: impl Into<String>,
        hint: Option<String>,
    ) -> Self {
        Self {
            status,
            code,
            message: message.into(),
            hint,
            detail: None,
        }
    }

    pub fn bad_request(message: impl Into<String>, hint: Option<String>) -> Self {
        Self::new(StatusCode::BAD_REQUEST, codes::BAD_REQUEST, message, hint)
    }

    pub fn status(&self) -> StatusCode {
        self.status
    }
}

impl From<ConversionError> for ApiError {
    fn from(error: ConversionError) -> Self {
        let status = error.status_code();
        let code = match &error {
            ConversionError::Client { .. } if status == StatusCode::NOT_FOUND => codes::NOT_FOUND,
            ConversionError::Client { .. } => codes::BAD_REQUEST,
            ConversionError::Upstream { .. } => codes::UPSTREAM,
            ConversionError::Timeout => codes::TIMEOUT,
            ConversionError::Parse(_) => codes::PARSE,
            ConversionError::Serialize(_) => codes::SERIALIZE,
            ConversionError::Internal { .. } => codes::INTERNAL,
        };
        let detail = ErrorReport::from_error("infra::http::v2", status, &error).messages;
        Self {
            status,
            code,
            message: error.public_message(),
            hint: None,
            detail: Some(detail),
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let report = match self.detail {
            Some(messages) => ErrorReport {
                source: "infra::http::v2",
                status: self.status,
                messages,
            },
            None => ErrorReport::from_message(
                "infra::http::v2",
                self.status,
                format!(
                    "{}: {}",
                    self.code,
                    self.hint.as_deref().unwrap_or(&self.message)
                ),
            ),
        };
        let body = ApiErrorBody {
            error: ApiErrorMessage {
                code: self.code.to_string(),
                message: self.message,
                hint: self.hint,
            },
        };
        let mut response = (self.status, Json(body)).into_response();
        report.attach(&mut response);
        response
    }
}
