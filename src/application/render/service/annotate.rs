//! Post-processing of comrak output into an annotated body.

use markbridge_api_types::NodeAnnotation;
use sha2::{Digest, Sha256};

use crate::application::render::{
    document::{Document, Element, Node},
    expansions::{FILE_ATTR, TEMPLATE_ATTR},
    types::ANNOTATION_ATTR,
};
use crate::domain::{
    expansion::{ExpansionKind, ExpansionSet},
    template::scan_text,
};

const SOURCEPOS_ATTR: &str = "data-sourcepos";
const ID_PREFIX: &str = "mb";
const LITERAL_ELEMENTS: [&str; 4] = ["code", "pre", "script", "style"];

pub(crate) fn hash_node(element: &Element) -> String {
    let mut hasher = Sha256::new();
    hasher.update(element.outer_html_without(&[ANNOTATION_ATTR]).as_bytes());
    hex::encode(hasher.finalize())
}

/// Annotate every top-level element with an id, its source range and a hash
/// of its rendered form, and render template invocations and image files.
pub(crate) fn annotate_body(
    nodes: Vec<Node>,
    source: &str,
    expansions: Option<&ExpansionSet>,
) -> Vec<Node> {
    let lines = LineIndex::new(source);
    let mut next_id = 0usize;

    nodes
        .into_iter()
        .map(|node| {
            let Node::Element(mut element) = node else {
                return node;
            };
            let dsr = element
                .attr(SOURCEPOS_ATTR)
                .and_then(|pos| lines.range(pos));
            element.remove_attr_deep(SOURCEPOS_ATTR);

            if !LITERAL_ELEMENTS.contains(&element.name.as_str()) {
                expand_templates(&mut element.children, expansions);
            }
            resolve_files(&mut element, expansions);

            if element.attr("id").is_none() {
                element.set_attr("id", format!("{ID_PREFIX}{next_id}"));
            }
            next_id += 1;

            let annotation = NodeAnnotation {
                dsr,
                hash: Some(hash_node(&element)),
            };
            if let Ok(encoded) = serde_json::to_string(&annotation) {
                element.set_attr(ANNOTATION_ATTR, encoded);
            }
            Node::Element(element)
        })
        .collect()
}

fn expand_templates(nodes: &mut Vec<Node>, expansions: Option<&ExpansionSet>) {
    let mut expanded = Vec::with_capacity(nodes.len());
    for node in nodes.drain(..) {
        match node {
            Node::Text(text) => split_invocations(text, expansions, &mut expanded),
            Node::Element(mut element) => {
                if !LITERAL_ELEMENTS.contains(&element.name.as_str())
                    && element.attr(TEMPLATE_ATTR).is_none()
                {
                    expand_templates(&mut element.children, expansions);
                }
                expanded.push(Node::Element(element));
            }
            other => expanded.push(other),
        }
    }
    *nodes = expanded;
}

fn split_invocations(text: String, expansions: Option<&ExpansionSet>, out: &mut Vec<Node>) {
    let invocations = scan_text(&text);
    if invocations.is_empty() {
        out.push(Node::Text(text));
        return;
    }

    let mut cursor = 0;
    for invocation in invocations {
        let range = invocation.range();
        if range.start > cursor {
            out.push(Node::Text(text[cursor..range.start].to_string()));
        }
        out.push(Node::Element(transclusion(
            invocation.source(&text),
            invocation.target(&text),
            expansions,
        )));
        cursor = range.end;
    }
    if cursor < text.len() {
        out.push(Node::Text(text[cursor..].to_string()));
    }
}

fn transclusion(source: &str, target: &str, expansions: Option<&ExpansionSet>) -> Element {
    let reused = expansions
        .and_then(|set| set.get(ExpansionKind::Templates, source))
        .and_then(|fragment| Document::parse_fragment(fragment).ok());
    let children = reused.unwrap_or_else(|| vec![Node::Text(target.to_string())]);

    Element::new("span")
        .with_attr("typeof", "mw:Transclusion")
        .with_attr(TEMPLATE_ATTR, source)
        .with_children(children)
}

fn resolve_files(element: &mut Element, expansions: Option<&ExpansionSet>) {
    if element.name == "img"
        && let Some(src) = element.attr("src").map(str::to_string)
        && is_file_reference(&src)
    {
        let resolved = expansions
            .and_then(|set| set.get(ExpansionKind::Files, &src))
            .map(str::to_string)
            .unwrap_or_else(|| format!("/media/{src}"));
        element.set_attr("src", resolved);
        element.set_attr(FILE_ATTR, src);
        return;
    }
    for child in &mut element.children {
        if let Node::Element(child) = child {
            resolve_files(child, expansions);
        }
    }
}

/// Bare names such as `Cat.png` refer to site files; anything with a scheme
/// or a path is left alone.
fn is_file_reference(src: &str) -> bool {
    !src.is_empty() && !src.contains(':') && !src.contains('/')
}

/// Maps comrak's `line:col-line:col` positions to byte ranges.
struct LineIndex {
    starts: Vec<usize>,
    len: usize,
}

impl LineIndex {
    fn new(source: &str) -> Self {
        let mut starts = vec![0];
        starts.extend(source.match_indices('\n').map(|(index, _)| index + 1));
        Self {
            starts,
            len: source.len(),
        }
    }

    /// Columns are 1-based byte columns and the end position is inclusive.
    fn range(&self, sourcepos: &str) -> Option<(usize, usize)> {
        let (start, end) = sourcepos.split_once('-')?;
        let (start_line, start_col) = parse_position(start)?;
        let (end_line, end_col) = parse_position(end)?;

        let start = self.starts.get(start_line.checked_sub(1)?)? + start_col.saturating_sub(1);
        let end = self.starts.get(end_line.checked_sub(1)?)? + end_col;
        let start = start.min(self.len);
        let end = end.min(self.len).max(start);
        Some((start, end))
    }
}

fn parse_position(raw: &str) -> Option<(usize, usize)> {
    let (line, col) = raw.split_once(':')?;
    Some((line.trim().parse().ok()?, col.trim().parse().ok()?))
}
