//! The canonical, immutable description of one conversion request.
//!
//! Built once at the API boundary by [`crate::application::adapter`] and
//! passed by shared reference through every later stage. Nothing downstream
//! mutates it; stages that need a modified view (for example after
//! pre-substitution) keep that state locally.

use std::sync::Arc;

use markbridge_api_types::{PageAnnotations, PriorRevision, UpdateKinds};

use crate::application::sites::Site;
use crate::domain::{
    expansion::ExpansionKind,
    types::{ApiVersion, ConversionFlags, Direction, Format, RevisionId},
};

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversionInput {
    /// Nothing inline: the source comes from the content source.
    None,
    Markup(String),
    Rendered(String),
}

/// Revision state the caller sent along (`original` or `previous`).
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PriorState {
    pub revision: Option<RevisionId>,
    pub html: Option<String>,
    pub annotations: Option<PageAnnotations>,
    pub markup: Option<String>,
}

impl From<PriorRevision> for PriorState {
    fn from(prior: PriorRevision) -> Self {
        Self {
            revision: prior.revid.and_then(RevisionId::new),
            html: prior.html.map(|html| html.into_text()),
            annotations: prior.data_parsoid.map(|part| part.body),
            markup: prior.wikitext.map(|text| text.into_text()),
        }
    }
}

/// Request facts that come from transport metadata rather than the body.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RequestMeta {
    pub has_session: bool,
    /// Set when the request was issued by the render cache itself.
    pub cache_origin: bool,
    pub query: Option<String>,
    pub request_url: String,
    /// The caller asked for a JSON answer.
    pub accept_json: bool,
}

#[derive(Debug, Clone)]
pub struct RequestContext {
    pub site: Arc<Site>,
    pub api_version: ApiVersion,
    pub direction: Direction,
    /// Only versioned requests negotiate a format.
    pub format: Option<Format>,
    pub title: String,
    pub revision: Option<RevisionId>,
    pub input: ConversionInput,
    pub flags: ConversionFlags,
    pub original: Option<PriorState>,
    pub previous: Option<PriorState>,
    pub update: UpdateKinds,
    pub cache_id: Option<String>,
    pub meta: RequestMeta,
}

impl RequestContext {
    /// Human-readable `domain/title/revision` string used in logs and
    /// heartbeats.
    pub fn location(&self) -> String {
        let revision = self
            .revision
            .map(|rev| rev.to_string())
            .unwrap_or_else(|| "latest".to_string());
        format!("{}/{}/{}", self.site.domain, self.title, revision)
    }

    pub fn inline_markup(&self) -> Option<&str> {
        match &self.input {
            ConversionInput::Markup(markup) => Some(markup),
            _ => None,
        }
    }

    pub fn rendered_input(&self) -> Option<&str> {
        match &self.input {
            ConversionInput::Rendered(html) => Some(html),
            _ => None,
        }
    }

    /// Expansion kinds the caller reported as edited.
    pub fn updated_kinds(&self) -> impl Iterator<Item = ExpansionKind> + '_ {
        ExpansionKind::ALL
            .into_iter()
            .filter(|kind| match kind {
                ExpansionKind::Templates => self.update.templates,
                ExpansionKind::Files => self.update.files,
            })
    }
}
