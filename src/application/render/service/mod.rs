mod annotate;
mod config;
mod serialize;

use std::sync::Arc;

use async_trait::async_trait;
use comrak::{Arena, format_html, parse_document};
use once_cell::sync::Lazy;
use tracing::debug;

use crate::application::{
    ports::{MarkupParser, MarkupSerializer, ParseInput, PortError, SerializeMode},
    render::{
        document::{Document, Element, Node},
        types::RenderError,
    },
    sites::Site,
};

use annotate::annotate_body;
use config::default_options;
use serialize::{serialize_full, serialize_selective};

/// Comrak-based engine used when no remote renderer is configured.
pub struct ComrakEngine {
    options: comrak::Options<'static>,
}

impl ComrakEngine {
    fn new() -> Self {
        Self {
            options: default_options(),
        }
    }

    /// Render markup into an annotated document for `site`.
    pub fn render(
        &self,
        site: &Site,
        input: ParseInput<'_>,
    ) -> Result<Document, RenderError> {
        let scrubbed;
        let markup = if input.scrub {
            scrubbed = scrub_markup(input.markup);
            scrubbed.as_str()
        } else {
            input.markup
        };

        let html = render_html(markup, &self.options)?;
        let nodes = Document::parse_fragment(&html)?;
        let body = annotate_body(nodes, markup, input.expansions);

        debug!(
            target = "markbridge::render",
            title = input.title,
            domain = %site.domain,
            blocks = body.len(),
            "rendered markup"
        );

        Ok(Document {
            head: page_head(site, input.title),
            body,
        })
    }

    pub fn to_markup(&self, document: &Document, mode: SerializeMode<'_>) -> String {
        match mode {
            SerializeMode::Full => serialize_full(document),
            SerializeMode::Selective {
                baseline_source,
                baseline,
            } => serialize_selective(document, baseline_source, baseline),
        }
    }
}

static ENGINE: Lazy<Arc<ComrakEngine>> = Lazy::new(|| Arc::new(ComrakEngine::new()));

/// Access the shared reference engine, initialised on first use.
pub fn reference_engine() -> Arc<ComrakEngine> {
    Arc::clone(&ENGINE)
}

impl Default for ComrakEngine {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl MarkupParser for ComrakEngine {
    async fn parse(&self, site: &Site, input: ParseInput<'_>) -> Result<Document, PortError> {
        self.render(site, input).map_err(PortError::from)
    }
}

#[async_trait]
impl MarkupSerializer for ComrakEngine {
    async fn serialize(
        &self,
        _site: &Site,
        document: &Document,
        mode: SerializeMode<'_>,
    ) -> Result<String, PortError> {
        Ok(self.to_markup(document, mode))
    }
}

fn render_html(markup: &str, options: &comrak::Options<'static>) -> Result<String, RenderError> {
    let arena = Arena::new();
    let root = parse_document(&arena, markup, options);
    let mut html = String::new();
    format_html(root, options, &mut html).map_err(|err| RenderError::Markdown {
        message: err.to_string(),
    })?;
    Ok(html)
}

fn page_head(site: &Site, title: &str) -> Vec<Node> {
    let display_title = title.replace('_', " ");
    vec![
        Node::Element(Element::new("meta").with_attr("charset", "utf-8")),
        Node::Element(Element::new("base").with_attr("href", site.base_href())),
        Node::Element(Element::new("title").with_children(vec![Node::Text(display_title)])),
    ]
}

/// Trim trailing whitespace and collapse runs of blank lines. Fenced code is
/// copied untouched.
fn scrub_markup(markup: &str) -> String {
    let mut out = String::with_capacity(markup.len());
    let mut fence: Option<&str> = None;
    let mut blank_run = 0usize;

    for line in markup.lines() {
        let trimmed = line.trim_start();
        if let Some(open) = fence {
            out.push_str(line);
            out.push('\n');
            if trimmed.starts_with(open) {
                fence = None;
            }
            continue;
        }
        if trimmed.starts_with("```") || trimmed.starts_with("~~~") {
            fence = Some(&trimmed[..3]);
            blank_run = 0;
            out.push_str(line.trim_end());
            out.push('\n');
            continue;
        }
        if line.trim().is_empty() {
            blank_run += 1;
            if blank_run == 1 && !out.is_empty() {
                out.push('\n');
            }
            continue;
        }
        blank_run = 0;
        out.push_str(line.trim_end());
        out.push('\n');
    }

    while out.ends_with("\n\n") {
        out.pop();
    }
    out
}
