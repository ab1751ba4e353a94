//! Round-trip fidelity checks: render markup, serialize it back and diff the
//! two.

pub mod diff;

use serde::Serialize;
use tracing::info;

use crate::application::{
    context::{ConversionInput, RequestContext},
    convert::{Conversion, ConvertedBody, Orchestrator},
    error::ConversionError,
    ports::SerializeMode,
    render::{
        ANNOTATION_ATTR,
        document::{Document, Node, escape_text},
    },
    sites::Site,
    timeout::TimeoutToken,
};
use crate::domain::types::{ApiVersion, Direction, RevisionId};

use self::diff::{DiffRun, line_diff};

/// Comment appended to the body before a selective pass.
pub const SELSER_SENTINEL: &str = "rtSelserEditTestComment";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RoundTripVariant {
    Plain,
    /// Line breaks removed from the body first, as some editors do.
    StripNewlines,
    /// Add a sentinel comment, then serialize selectively against the
    /// unedited rendering.
    SelserSentinel,
}

impl RoundTripVariant {
    pub fn route_prefix(self) -> &'static str {
        match self {
            RoundTripVariant::Plain => "_rt",
            RoundTripVariant::StripNewlines => "_rtve",
            RoundTripVariant::SelserSentinel => "_rtselser",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RoundTripReport {
    variant: RoundTripVariant,
    headers: Option<String>,
    body_fragments: Vec<String>,
    rendered_text: String,
    original_markup: String,
    markup: String,
    diff: Vec<DiffRun>,
    request_url: String,
}

impl RoundTripReport {
    pub fn variant(&self) -> RoundTripVariant {
        self.variant
    }

    /// The `<base>` element, for resolving relative links.
    pub fn headers(&self) -> Option<&str> {
        self.headers.as_deref()
    }

    pub fn body_fragments(&self) -> &[String] {
        &self.body_fragments
    }

    /// HTML-escaped rendering, ready to show as text.
    pub fn rendered_text(&self) -> &str {
        &self.rendered_text
    }

    pub fn original_markup(&self) -> &str {
        &self.original_markup
    }

    pub fn markup(&self) -> &str {
        &self.markup
    }

    pub fn diff(&self) -> &[DiffRun] {
        &self.diff
    }

    /// Only the insert and delete runs.
    pub fn changes(&self) -> Vec<&DiffRun> {
        self.diff.iter().filter(|run| run.is_change()).collect()
    }

    pub fn is_clean(&self) -> bool {
        self.diff.iter().all(|run| !run.is_change())
    }

    pub fn request_url(&self) -> &str {
        &self.request_url
    }
}

#[derive(Clone)]
pub struct RoundTripValidator {
    orchestrator: Orchestrator,
}

impl RoundTripValidator {
    pub fn new(orchestrator: Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Resolve the page source, render it and validate the result, all
    /// under one request token.
    pub async fn check(
        &self,
        ctx: &RequestContext,
        variant: RoundTripVariant,
    ) -> Result<RoundTripReport, ConversionError> {
        let supervisor = self.orchestrator.supervisor();
        let token = supervisor.token(ctx.location());
        supervisor
            .with_timeouts(&token, self.check_with(ctx, variant, &token))
            .await
            .map_err(ConversionError::from)
    }

    async fn check_with(
        &self,
        ctx: &RequestContext,
        variant: RoundTripVariant,
        token: &TimeoutToken,
    ) -> Result<RoundTripReport, ConversionError> {
        let (markup, revision) = match ctx.inline_markup() {
            Some(markup) => (markup.to_string(), ctx.revision),
            None => {
                let record = self
                    .orchestrator
                    .step(
                        token,
                        self.orchestrator
                            .ports()
                            .content
                            .fetch(&ctx.site, &ctx.title, ctx.revision),
                        ConversionError::upstream,
                    )
                    .await?;
                (record.markup, RevisionId::new(record.revision_id))
            }
        };

        let render_ctx = RequestContext {
            api_version: ApiVersion::V1,
            direction: Direction::MarkupToRendered,
            format: None,
            revision,
            input: ConversionInput::Markup(markup.clone()),
            flags: Default::default(),
            ..ctx.clone()
        };
        let html = match self
            .orchestrator
            .markup_to_rendered_with(&render_ctx, token)
            .await?
        {
            Conversion::Document {
                body: ConvertedBody::Html(html),
                ..
            } => html,
            _ => {
                return Err(ConversionError::internal(
                    "rendering did not produce a document",
                ));
            }
        };
        let document = Document::parse(&html)
            .map_err(|err| ConversionError::client(format!("Invalid html: {err}")))?;

        self.validate_with(
            &ctx.site,
            document,
            &markup,
            variant,
            &ctx.meta.request_url,
            token,
        )
        .await
    }

    pub async fn validate(
        &self,
        site: &Site,
        document: Document,
        original_markup: &str,
        variant: RoundTripVariant,
        request_url: &str,
    ) -> Result<RoundTripReport, ConversionError> {
        let supervisor = self.orchestrator.supervisor();
        let token = supervisor.token(format!("roundtrip {request_url}"));
        supervisor
            .with_timeouts(
                &token,
                self.validate_with(site, document, original_markup, variant, request_url, &token),
            )
            .await
            .map_err(ConversionError::from)
    }

    async fn validate_with(
        &self,
        site: &Site,
        document: Document,
        original_markup: &str,
        variant: RoundTripVariant,
        request_url: &str,
        token: &TimeoutToken,
    ) -> Result<RoundTripReport, ConversionError> {
        let (working, baseline) = match variant {
            RoundTripVariant::Plain => (document, None),
            RoundTripVariant::StripNewlines => (strip_newlines(&document)?, None),
            RoundTripVariant::SelserSentinel => {
                let mut edited = document.clone();
                edited.body.push(Node::Comment(SELSER_SENTINEL.to_string()));
                (edited, Some(document))
            }
        };

        let rematerialized = Document::parse(&working.to_html())
            .map_err(|err| ConversionError::client(format!("Invalid html: {err}")))?;

        let mode = match &baseline {
            Some(baseline) => SerializeMode::Selective {
                baseline_source: original_markup,
                baseline: Some(baseline),
            },
            None => SerializeMode::Full,
        };
        let produced = self
            .orchestrator
            .step(
                token,
                self.orchestrator
                    .ports()
                    .serializer
                    .serialize(site, &rematerialized, mode),
                ConversionError::Serialize,
            )
            .await?;
        let markup = strip_sentinel(&produced);

        let diff = line_diff(original_markup, &markup);
        let report = RoundTripReport {
            variant,
            headers: rematerialized.base_element().map(|base| base.outer_html()),
            body_fragments: rematerialized
                .body
                .iter()
                .filter(|node| !node.is_whitespace())
                .map(fragment_text)
                .collect(),
            rendered_text: escape_text(&rematerialized.to_html()),
            original_markup: original_markup.to_string(),
            markup,
            diff,
            request_url: request_url.to_string(),
        };
        info!(
            target = "markbridge::roundtrip",
            variant = variant.route_prefix(),
            request_url,
            changes = report.changes().len(),
            "round trip checked"
        );
        Ok(report)
    }
}

fn strip_newlines(document: &Document) -> Result<Document, ConversionError> {
    let flattened = document.body_html().replace(['\n', '\r'], "");
    let body = Document::parse_fragment(&flattened)
        .map_err(|err| ConversionError::client(format!("Invalid html: {err}")))?;
    Ok(Document {
        head: document.head.clone(),
        body,
    })
}

fn strip_sentinel(markup: &str) -> String {
    let comment = format!("<!--{SELSER_SENTINEL}-->");
    markup
        .replace(&format!("\n\n{comment}"), "")
        .replace(&comment, "")
}

fn fragment_text(node: &Node) -> String {
    match node {
        Node::Element(element) => element.outer_html_without(&[ANNOTATION_ATTR]),
        Node::Text(text) => text.clone(),
        Node::Comment(comment) => format!("<!--{comment}-->"),
    }
}
