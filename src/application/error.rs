use std::error::Error as StdError;

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::{domain::error::DomainError, infra::error::InfraError};

use super::ports::PortError;

/// Message returned for every soft-deadline expiry. The underlying cause is
/// never exposed.
pub const TIMEOUT_MESSAGE: &str = "request timed out";

#[derive(Debug, Clone)]
pub struct ErrorReport {
    pub source: &'static str,
    pub status: StatusCode,
    pub messages: Vec<String>,
}

impl ErrorReport {
    pub fn from_error(source: &'static str, status: StatusCode, error: &dyn StdError) -> Self {
        let mut messages = Vec::new();
        messages.push(error.to_string());
        let mut current = error.source();
        while let Some(inner) = current {
            messages.push(inner.to_string());
            current = inner.source();
        }
        Self {
            source,
            status,
            messages,
        }
    }

    pub fn from_message(
        source: &'static str,
        status: StatusCode,
        message: impl Into<String>,
    ) -> Self {
        Self {
            source,
            status,
            messages: vec![message.into()],
        }
    }

    pub fn attach(self, response: &mut Response) {
        response.extensions_mut().insert(self);
    }
}

/// Plain-text error used by the legacy API, which never answered with JSON.
#[derive(Debug)]
pub struct HttpError {
    status: StatusCode,
    public_message: String,
    report: ErrorReport,
}

impl HttpError {
    pub fn new(
        source: &'static str,
        status: StatusCode,
        public_message: impl Into<String>,
        detail: impl Into<String>,
    ) -> Self {
        let report = ErrorReport::from_message(source, status, detail);
        Self {
            status,
            public_message: public_message.into(),
            report,
        }
    }

    pub fn from_error(
        source: &'static str,
        status: StatusCode,
        public_message: impl Into<String>,
        error: &dyn StdError,
    ) -> Self {
        let report = ErrorReport::from_error(source, status, error);
        Self {
            status,
            public_message: public_message.into(),
            report,
        }
    }
}

impl IntoResponse for HttpError {
    fn into_response(self) -> Response {
        let mut response = (self.status, self.public_message).into_response();
        self.report.attach(&mut response);
        response
    }
}

impl From<ConversionError> for HttpError {
    fn from(error: ConversionError) -> Self {
        HttpError::from_error(
            "application::error::ConversionError",
            error.status_code(),
            error.public_message(),
            &error,
        )
    }
}

/// Failures a conversion pipeline reports to its caller.
#[derive(Debug, Error)]
pub enum ConversionError {
    /// Malformed input or a disallowed flag combination.
    #[error("{message}")]
    Client { status: StatusCode, message: String },
    /// The content source or another remote collaborator failed.
    #[error("upstream failure: {message}")]
    Upstream {
        status: Option<StatusCode>,
        message: String,
    },
    #[error("request timed out")]
    Timeout,
    #[error("parse failed: {0}")]
    Parse(#[source] PortError),
    #[error("serialization failed: {0}")]
    Serialize(#[source] PortError),
    /// A pipeline produced something its caller cannot use.
    #[error("internal error: {message}")]
    Internal { message: String },
}

impl ConversionError {
    pub fn client(message: impl Into<String>) -> Self {
        Self::Client {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Map a content-source failure, keeping the remote status when known.
    pub fn upstream(error: PortError) -> Self {
        let status = match &error {
            PortError::NotFound { .. } => Some(StatusCode::NOT_FOUND),
            PortError::Upstream { status, .. } => StatusCode::from_u16(*status).ok(),
            PortError::Unavailable { .. } | PortError::Failed { .. } => None,
        };
        Self::Upstream {
            status,
            message: error.to_string(),
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            ConversionError::Client { status, .. } => *status,
            ConversionError::Upstream { status, .. } => status.unwrap_or(StatusCode::BAD_GATEWAY),
            ConversionError::Timeout => StatusCode::GATEWAY_TIMEOUT,
            ConversionError::Parse(_)
            | ConversionError::Serialize(_)
            | ConversionError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    /// Text safe to show to the caller.
    pub fn public_message(&self) -> String {
        match self {
            ConversionError::Client { message, .. } => message.clone(),
            ConversionError::Upstream {
                status: Some(status),
                ..
            } => format!(
                "Remote content source answered {}",
                status.canonical_reason().unwrap_or("with an error")
            ),
            ConversionError::Upstream { status: None, .. } => {
                "Remote content source unavailable".to_string()
            }
            ConversionError::Timeout => TIMEOUT_MESSAGE.to_string(),
            ConversionError::Parse(_) => "Markup could not be rendered".to_string(),
            ConversionError::Serialize(_) => "Document could not be serialized".to_string(),
            ConversionError::Internal { .. } => "Internal error".to_string(),
        }
    }
}

impl From<DomainError> for ConversionError {
    fn from(error: DomainError) -> Self {
        match error {
            DomainError::Validation { message } => ConversionError::client(message),
        }
    }
}

/// Process-level failures surfaced by `main`.
#[derive(Debug, Error)]
pub enum AppError {
    #[error(transparent)]
    Domain(#[from] DomainError),
    #[error(transparent)]
    Infra(#[from] InfraError),
    #[error(transparent)]
    Conversion(#[from] ConversionError),
    #[error("unexpected error: {0}")]
    Unexpected(String),
}

impl AppError {
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Domain(DomainError::validation(message))
    }

    pub fn unexpected(message: impl Into<String>) -> Self {
        Self::Unexpected(message.into())
    }
}
