//! The conversion pipelines: markup to rendered document and back.
//!
//! Every pipeline runs under one [`TimeoutToken`]: the whole pipeline is
//! wrapped with [`TimeoutSupervisor::with_timeouts`] and each suspension
//! point inside it with [`TimeoutSupervisor::bounded`].

mod cache_policy;
mod presubst;
mod to_markup;
mod to_rendered;

use std::future::Future;

use markbridge_api_types::{MarkupBundle, PageBundle};
use tracing::error;

use crate::application::{
    context::RequestContext,
    error::ConversionError,
    expansion::ExpansionReuseResolver,
    ports::{PortError, Ports},
    timeout::{SupervisedError, TimeoutSupervisor, TimeoutToken},
};
use crate::domain::types::{Direction, RevisionId};

pub use cache_policy::{CachePolicy, UNCACHEABLE};
pub use presubst::{mark_for_substitution, substitution_edits};

pub const METRIC_REDIRECTS: &str = "markbridge_redirects_total";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ConversionSettings {
    /// Allow selective serialization when a request qualifies for it.
    pub selective_serialization: bool,
    /// `max-age` for responses pinned to a caller-supplied revision.
    pub cacheable_max_age_seconds: u64,
}

impl Default for ConversionSettings {
    fn default() -> Self {
        Self {
            selective_serialization: true,
            cacheable_max_age_seconds: 86_400,
        }
    }
}

/// What a pipeline hands back to the transport layer.
#[derive(Debug, Clone, PartialEq)]
pub enum Conversion {
    Redirect {
        location: String,
        cache: CachePolicy,
    },
    Document {
        body: ConvertedBody,
        cache: CachePolicy,
    },
}

#[derive(Debug, Clone, PartialEq)]
pub enum ConvertedBody {
    Html(String),
    Markup(String),
    PageBundle(PageBundle),
    MarkupBundle(MarkupBundle),
}

impl ConvertedBody {
    pub fn content_type(&self) -> &'static str {
        match self {
            ConvertedBody::Html(_) => HTML_CONTENT_TYPE,
            ConvertedBody::Markup(_) => MARKUP_CONTENT_TYPE,
            ConvertedBody::PageBundle(_) | ConvertedBody::MarkupBundle(_) => JSON_CONTENT_TYPE,
        }
    }
}

pub const HTML_CONTENT_TYPE: &str = "text/html; charset=utf-8";
pub const MARKUP_CONTENT_TYPE: &str = "text/plain; charset=utf-8";
pub const JSON_CONTENT_TYPE: &str = "application/json";

#[derive(Clone)]
pub struct Orchestrator {
    ports: Ports,
    resolver: ExpansionReuseResolver,
    supervisor: TimeoutSupervisor,
    settings: ConversionSettings,
}

impl Orchestrator {
    pub fn new(ports: Ports, supervisor: TimeoutSupervisor, settings: ConversionSettings) -> Self {
        let resolver = ExpansionReuseResolver::new(ports.render_cache.clone());
        Self {
            ports,
            resolver,
            supervisor,
            settings,
        }
    }

    pub fn ports(&self) -> &Ports {
        &self.ports
    }

    pub fn supervisor(&self) -> &TimeoutSupervisor {
        &self.supervisor
    }

    pub fn settings(&self) -> ConversionSettings {
        self.settings
    }

    pub async fn markup_to_rendered(
        &self,
        ctx: &RequestContext,
    ) -> Result<Conversion, ConversionError> {
        let token = self.supervisor.token(ctx.location());
        let outcome = self
            .supervisor
            .with_timeouts(&token, to_rendered::run(self, ctx, &token))
            .await
            .map_err(ConversionError::from);
        settle(ctx, "markup_to_rendered", outcome)
    }

    pub async fn rendered_to_markup(
        &self,
        ctx: &RequestContext,
    ) -> Result<Conversion, ConversionError> {
        let token = self.supervisor.token(ctx.location());
        let outcome = self
            .supervisor
            .with_timeouts(&token, to_markup::run(self, ctx, &token))
            .await
            .map_err(ConversionError::from);
        settle(ctx, "rendered_to_markup", outcome)
    }

    /// Render under a token whose deadlines the caller already supervises.
    pub(crate) async fn markup_to_rendered_with(
        &self,
        ctx: &RequestContext,
        token: &TimeoutToken,
    ) -> Result<Conversion, ConversionError> {
        let outcome = to_rendered::run(self, ctx, token).await;
        settle(ctx, "markup_to_rendered", outcome)
    }

    /// Dispatch on the request's direction.
    pub async fn convert(&self, ctx: &RequestContext) -> Result<Conversion, ConversionError> {
        match ctx.direction {
            Direction::MarkupToRendered => self.markup_to_rendered(ctx).await,
            Direction::RenderedToMarkup => self.rendered_to_markup(ctx).await,
        }
    }

    /// Run one suspension point under the request's soft deadline.
    pub(crate) async fn step<T, Fut>(
        &self,
        token: &TimeoutToken,
        op: Fut,
        on_error: fn(PortError) -> ConversionError,
    ) -> Result<T, ConversionError>
    where
        Fut: Future<Output = Result<T, PortError>>,
    {
        self.supervisor
            .bounded(token, op)
            .await
            .map_err(|err| match err {
                SupervisedError::TimedOut => ConversionError::Timeout,
                SupervisedError::Failed(inner) => on_error(inner),
            })
    }

    pub(crate) fn resolver(&self) -> &ExpansionReuseResolver {
        &self.resolver
    }
}

/// Every failure that reaches the top of a pipeline is logged here.
fn settle(
    ctx: &RequestContext,
    pipeline: &'static str,
    outcome: Result<Conversion, ConversionError>,
) -> Result<Conversion, ConversionError> {
    if let Err(err) = &outcome {
        error!(
            target = "markbridge::convert",
            pipeline,
            location = %ctx.location(),
            title = %ctx.title,
            revision = ctx.revision.map(RevisionId::get),
            status = err.status_code().as_u16(),
            error = %err,
            "conversion failed"
        );
    }
    outcome
}
