use thiserror::Error;

use crate::application::ports::PortError;

/// Attribute carrying a node's serialized annotation inline.
pub const ANNOTATION_ATTR: &str = "data-mb";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum RenderError {
    #[error("markdown rendering failed: {message}")]
    Markdown { message: String },
    #[error("document processing failed: {message}")]
    Document { message: String },
}

impl RenderError {
    pub fn document(message: impl std::fmt::Display) -> Self {
        Self::Document {
            message: message.to_string(),
        }
    }
}

impl From<RenderError> for PortError {
    fn from(error: RenderError) -> Self {
        PortError::failed(error)
    }
}
