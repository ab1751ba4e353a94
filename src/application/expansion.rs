//! Decides which previously computed expansions a rendering may reuse.

use std::sync::Arc;

use metrics::counter;
use tracing::{debug, warn};

use crate::application::{
    context::{PriorState, RequestContext},
    error::ConversionError,
    ports::RenderCache,
    render::{document::Document, expansions::collect_expansions},
};
use crate::domain::{expansion::ExpansionSet, types::RevisionId};

pub const METRIC_EXPANSION_REUSE: &str = "markbridge_expansion_reuse_total";
pub const METRIC_RENDER_CACHE_FAILURES: &str = "markbridge_render_cache_failures_total";

const MISSING_TITLE: &str = "No title was supplied.";

/// Facts learned while resolving the source that affect reuse.
#[derive(Debug, Clone, Copy, Default)]
pub struct ReuseHints {
    /// Parent of the fetched revision, the fallback render-cache key.
    pub parent_revision: Option<RevisionId>,
    /// Set once the source was rewritten, which makes any carried rendering
    /// stale.
    pub ignore_prior: bool,
}

#[derive(Clone, Default)]
pub struct ExpansionReuseResolver {
    render_cache: Option<Arc<dyn RenderCache>>,
}

impl ExpansionReuseResolver {
    pub fn new(render_cache: Option<Arc<dyn RenderCache>>) -> Self {
        Self { render_cache }
    }

    /// Expansions the parser may reuse, or `None` when nothing is available.
    ///
    /// Render-cache failures are treated as a miss.
    pub async fn resolve(
        &self,
        ctx: &RequestContext,
        hints: ReuseHints,
    ) -> Result<Option<ExpansionSet>, ConversionError> {
        if ctx.title.trim().is_empty() {
            return Err(ConversionError::client(MISSING_TITLE));
        }

        let found = match self.from_prior(ctx, hints) {
            Some(set) => Some(set),
            None => self.from_render_cache(ctx, hints).await,
        };

        Ok(found.map(|mut set| {
            for kind in ctx.updated_kinds() {
                set.invalidate(kind);
            }
            set
        }))
    }

    fn from_prior(&self, ctx: &RequestContext, hints: ReuseHints) -> Option<ExpansionSet> {
        if hints.ignore_prior {
            return None;
        }
        let html = [ctx.previous.as_ref(), ctx.original.as_ref()]
            .into_iter()
            .flatten()
            .find_map(|prior: &PriorState| prior.html.as_deref())?;

        match Document::parse(html) {
            Ok(document) => {
                counter!(METRIC_EXPANSION_REUSE, "source" => "prior").increment(1);
                Some(collect_expansions(&document))
            }
            Err(err) => {
                debug!(
                    target = "markbridge::expansion",
                    location = %ctx.location(),
                    error = %err,
                    "prior rendering is unreadable, not reusing it"
                );
                None
            }
        }
    }

    async fn from_render_cache(
        &self,
        ctx: &RequestContext,
        hints: ReuseHints,
    ) -> Option<ExpansionSet> {
        let cache = self.render_cache.as_ref()?;
        if ctx.meta.cache_origin {
            return None;
        }
        let cache_id = ctx
            .cache_id
            .clone()
            .or_else(|| hints.parent_revision.map(|rev| rev.to_string()))?;

        let html = match cache.lookup(&ctx.site, &ctx.title, &cache_id).await {
            Ok(Some(html)) => html,
            Ok(None) => return None,
            Err(err) => {
                counter!(METRIC_RENDER_CACHE_FAILURES).increment(1);
                warn!(
                    target = "markbridge::expansion",
                    location = %ctx.location(),
                    cache_id = %cache_id,
                    error = %err,
                    "render cache lookup failed, continuing without reuse"
                );
                return None;
            }
        };

        match Document::parse(&html) {
            Ok(document) => {
                counter!(METRIC_EXPANSION_REUSE, "source" => "cache").increment(1);
                Some(collect_expansions(&document))
            }
            Err(err) => {
                counter!(METRIC_RENDER_CACHE_FAILURES).increment(1);
                warn!(
                    target = "markbridge::expansion",
                    location = %ctx.location(),
                    cache_id = %cache_id,
                    error = %err,
                    "cached rendering is unreadable, continuing without reuse"
                );
                None
            }
        }
    }
}
