//! Reference rendering engine and the document model it works on.
//!
//! The engine turns markup into an annotated HTML document with comrak and
//! back again with a small HTML-to-markup converter. Remote deployments may
//! replace it with any other implementation of the parse and serialize ports.

pub mod document;
pub mod expansions;
mod service;
mod types;

pub use service::{ComrakEngine, reference_engine};
pub use types::{ANNOTATION_ATTR, RenderError};
