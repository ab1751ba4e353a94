//! Traits describing the external collaborators a conversion depends on.

use std::sync::Arc;

use async_trait::async_trait;
use markbridge_api_types::RevisionRecord;
use thiserror::Error;

use crate::application::{render::document::Document, sites::Site};
use crate::domain::{expansion::ExpansionSet, types::RevisionId};

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum PortError {
    #[error("{what} not found")]
    NotFound { what: String },
    #[error("remote answered {status}: {message}")]
    Upstream { status: u16, message: String },
    #[error("remote unavailable: {message}")]
    Unavailable { message: String },
    #[error("{message}")]
    Failed { message: String },
}

impl PortError {
    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound { what: what.into() }
    }

    pub fn unavailable(message: impl std::fmt::Display) -> Self {
        Self::Unavailable {
            message: message.to_string(),
        }
    }

    pub fn failed(message: impl std::fmt::Display) -> Self {
        Self::Failed {
            message: message.to_string(),
        }
    }
}

/// Everything the parse operation needs for one page.
#[derive(Debug, Clone, Copy)]
pub struct ParseInput<'a> {
    pub title: &'a str,
    pub markup: &'a str,
    pub expansions: Option<&'a ExpansionSet>,
    /// Collapse redundant blank lines before parsing.
    pub scrub: bool,
}

#[derive(Debug, Clone, Copy)]
pub enum SerializeMode<'a> {
    Full,
    /// Reuse source slices of nodes that are unchanged relative to the
    /// baseline.
    Selective {
        baseline_source: &'a str,
        baseline: Option<&'a Document>,
    },
}

impl SerializeMode<'_> {
    pub fn is_selective(&self) -> bool {
        matches!(self, SerializeMode::Selective { .. })
    }
}

#[async_trait]
pub trait MarkupParser: Send + Sync {
    async fn parse(&self, site: &Site, input: ParseInput<'_>) -> Result<Document, PortError>;
}

#[async_trait]
pub trait MarkupSerializer: Send + Sync {
    async fn serialize(
        &self,
        site: &Site,
        document: &Document,
        mode: SerializeMode<'_>,
    ) -> Result<String, PortError>;
}

/// Remote pass that performs template substitution and nothing else.
#[async_trait]
pub trait Preprocessor: Send + Sync {
    async fn substitute(&self, site: &Site, title: &str, markup: &str)
    -> Result<String, PortError>;
}

#[async_trait]
pub trait ContentSource: Send + Sync {
    async fn fetch(
        &self,
        site: &Site,
        title: &str,
        revision: Option<RevisionId>,
    ) -> Result<RevisionRecord, PortError>;

    async fn latest_revision(&self, site: &Site, title: &str) -> Result<RevisionId, PortError>;
}

/// Previously rendered pages keyed by title and cache id.
#[async_trait]
pub trait RenderCache: Send + Sync {
    async fn lookup(
        &self,
        site: &Site,
        title: &str,
        cache_id: &str,
    ) -> Result<Option<String>, PortError>;
}

/// The collaborator set one orchestrator runs against.
#[derive(Clone)]
pub struct Ports {
    pub parser: Arc<dyn MarkupParser>,
    pub serializer: Arc<dyn MarkupSerializer>,
    pub preprocessor: Arc<dyn Preprocessor>,
    pub content: Arc<dyn ContentSource>,
    pub render_cache: Option<Arc<dyn RenderCache>>,
}

/// Stand-in for remote collaborators when running without a network, as the
/// `convert` command does.
#[derive(Debug, Default, Clone, Copy)]
pub struct Offline;

#[async_trait]
impl Preprocessor for Offline {
    async fn substitute(
        &self,
        _site: &Site,
        _title: &str,
        _markup: &str,
    ) -> Result<String, PortError> {
        Err(PortError::unavailable("no preprocessor configured"))
    }
}

#[async_trait]
impl ContentSource for Offline {
    async fn fetch(
        &self,
        _site: &Site,
        title: &str,
        _revision: Option<RevisionId>,
    ) -> Result<RevisionRecord, PortError> {
        Err(PortError::unavailable(format!(
            "no content source configured for `{title}`"
        )))
    }

    async fn latest_revision(&self, _site: &Site, title: &str) -> Result<RevisionId, PortError> {
        Err(PortError::unavailable(format!(
            "no content source configured for `{title}`"
        )))
    }
}
