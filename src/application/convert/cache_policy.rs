use crate::application::context::RequestContext;
use crate::domain::types::{ApiVersion, RevisionId};

pub const UNCACHEABLE: &str = "private, max-age=0, s-maxage=0, must-revalidate";

/// Cache headers for one response.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    pub cache_control: String,
    /// Sent as `content-revision-id` when the response is pinned to a revision.
    pub content_revision: Option<RevisionId>,
}

impl CachePolicy {
    pub fn uncacheable() -> Self {
        Self {
            cache_control: UNCACHEABLE.to_string(),
            content_revision: None,
        }
    }

    /// Only legacy responses for a caller-named revision without a session
    /// may be cached publicly.
    pub fn for_rendering(ctx: &RequestContext, max_age_seconds: u64) -> Self {
        if ctx.api_version == ApiVersion::V2 || ctx.meta.has_session {
            return Self::uncacheable();
        }
        match ctx.revision {
            Some(revision) => Self {
                cache_control: format!("public, max-age={max_age_seconds}"),
                content_revision: Some(revision),
            },
            None => Self::uncacheable(),
        }
    }

    pub fn is_cacheable(&self) -> bool {
        self.cache_control != UNCACHEABLE
    }
}
