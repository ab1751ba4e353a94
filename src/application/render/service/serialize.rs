//! HTML-to-markup conversion.
//!
//! Full serialization writes canonical markup for every block. Selective
//! serialization copies the original source of every top-level block that is
//! unchanged and only writes the rest.

use crate::application::render::{
    document::{Document, Element, Node},
    expansions::{FILE_ATTR, TEMPLATE_ATTR},
    types::ANNOTATION_ATTR,
};

use super::annotate::hash_node;

const BLOCK_SEPARATOR: &str = "\n\n";
const GENERATED_ID_PREFIX: &str = "mb";
const BLOCK_ELEMENTS: [&str; 13] = [
    "p",
    "h1",
    "h2",
    "h3",
    "h4",
    "h5",
    "h6",
    "ul",
    "ol",
    "pre",
    "blockquote",
    "hr",
    "div",
];

pub(crate) fn serialize_full(document: &Document) -> String {
    let blocks: Vec<String> = document
        .body
        .iter()
        .filter(|node| !node.is_whitespace())
        .map(block)
        .filter(|block| !block.is_empty())
        .collect();
    if blocks.is_empty() {
        return String::new();
    }
    let mut out = blocks.join(BLOCK_SEPARATOR);
    out.push('\n');
    out
}

enum Piece {
    Reused { start: usize, end: usize },
    Fresh(String),
}

pub(crate) fn serialize_selective(
    document: &Document,
    source: &str,
    baseline: Option<&Document>,
) -> String {
    let pieces: Vec<Piece> = document
        .body
        .iter()
        .filter(|node| !node.is_whitespace())
        .map(|node| match reusable_range(node, source, baseline) {
            Some((start, end)) => Piece::Reused { start, end },
            None => Piece::Fresh(block(node)),
        })
        .filter(|piece| !matches!(piece, Piece::Fresh(text) if text.is_empty()))
        .collect();

    let mut out = String::new();
    let mut previous_end: Option<usize> = None;
    for (index, piece) in pieces.iter().enumerate() {
        match piece {
            Piece::Reused { start, end } => {
                let gap = match (index, previous_end) {
                    (0, _) => source.get(..*start).filter(|gap| is_blank(gap)),
                    (_, Some(previous)) if previous <= *start => {
                        source.get(previous..*start).filter(|gap| is_blank(gap))
                    }
                    _ => None,
                };
                match gap {
                    Some(gap) => out.push_str(gap),
                    None if index > 0 => out.push_str(BLOCK_SEPARATOR),
                    None => {}
                }
                out.push_str(&source[*start..*end]);
                previous_end = Some(*end);
            }
            Piece::Fresh(text) => {
                if index > 0 {
                    out.push_str(BLOCK_SEPARATOR);
                }
                out.push_str(text);
                previous_end = None;
            }
        }
    }

    match (pieces.last(), previous_end) {
        (None, _) => {}
        (Some(Piece::Reused { .. }), Some(end)) => {
            match source.get(end..).filter(|rest| is_blank(rest)) {
                Some(rest) => out.push_str(rest),
                None => out.push('\n'),
            }
        }
        _ => out.push('\n'),
    }
    out
}

fn is_blank(text: &str) -> bool {
    text.chars().all(char::is_whitespace)
}

/// Source range of a top-level node whose rendering did not change.
fn reusable_range(node: &Node, source: &str, baseline: Option<&Document>) -> Option<(usize, usize)> {
    let element = node.as_element()?;
    let annotation = element.annotation()?;
    let (start, end) = annotation.dsr?;
    source.get(start..end)?;

    let current = element.outer_html_without(&[ANNOTATION_ATTR]);
    let unchanged = match baseline
        .zip(element.attr("id"))
        .and_then(|(baseline, id)| baseline.find_by_id(id))
    {
        Some(original) => original.outer_html_without(&[ANNOTATION_ATTR]) == current,
        None => annotation.hash.as_deref() == Some(hash_node(element).as_str()),
    };
    unchanged.then_some((start, end))
}

fn block(node: &Node) -> String {
    match node {
        Node::Element(element) => block_element(element),
        Node::Text(text) => escape_markup(text.trim(), true),
        Node::Comment(comment) => format!("<!--{comment}-->"),
    }
}

fn block_element(element: &Element) -> String {
    match element.name.as_str() {
        "p" => inline_children(&element.children).trim().to_string(),
        "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
            let level = element.name[1..].parse::<usize>().unwrap_or(1);
            let text = inline_children(&element.children);
            format!("{} {}", "#".repeat(level), escape_closing_hashes(text.trim()))
        }
        "hr" => "---".to_string(),
        "pre" => code_block(element),
        "ul" => list(element, None),
        "ol" => {
            let start = element
                .attr("start")
                .and_then(|start| start.parse::<u64>().ok())
                .unwrap_or(1);
            list(element, Some(start))
        }
        "blockquote" => {
            let inner = blocks(&element.children, BLOCK_SEPARATOR);
            inner
                .lines()
                .map(|line| {
                    if line.is_empty() {
                        ">".to_string()
                    } else {
                        format!("> {line}")
                    }
                })
                .collect::<Vec<_>>()
                .join("\n")
        }
        _ => raw_html(element),
    }
}

fn blocks(nodes: &[Node], separator: &str) -> String {
    nodes
        .iter()
        .filter(|node| !node.is_whitespace())
        .map(block)
        .filter(|block| !block.is_empty())
        .collect::<Vec<_>>()
        .join(separator)
}

fn code_block(element: &Element) -> String {
    let code = element
        .child_elements()
        .find(|child| child.name == "code");
    let (language, mut text) = match code {
        Some(code) => (
            code.attr("class")
                .and_then(|class| {
                    class
                        .split_whitespace()
                        .find_map(|class| class.strip_prefix("language-"))
                })
                .unwrap_or_default()
                .to_string(),
            code.text_content(),
        ),
        None => (String::new(), element.text_content()),
    };
    if !text.ends_with('\n') {
        text.push('\n');
    }
    let fence = if text.contains("```") { "~~~" } else { "```" };
    format!("{fence}{language}\n{text}{fence}")
}

fn list(element: &Element, start: Option<u64>) -> String {
    let items: Vec<&Element> = element
        .child_elements()
        .filter(|child| child.name == "li")
        .collect();
    let loose = items
        .iter()
        .any(|item| item.child_elements().any(|child| child.name == "p"));
    let separator = if loose { BLOCK_SEPARATOR } else { "\n" };

    items
        .iter()
        .enumerate()
        .map(|(index, item)| {
            let marker = match start {
                Some(start) => format!("{}. ", start + index as u64),
                None => "- ".to_string(),
            };
            let body = list_item(item, separator);
            indent_continuation(&marker, &body)
        })
        .collect::<Vec<_>>()
        .join(separator)
}

/// Inline runs and nested blocks of one list item.
fn list_item(item: &Element, separator: &str) -> String {
    let mut parts = Vec::new();
    let mut inline_run: Vec<Node> = Vec::new();

    for child in &item.children {
        let is_block = matches!(child, Node::Element(element) if BLOCK_ELEMENTS.contains(&element.name.as_str()));
        if is_block {
            flush_inline(&mut inline_run, &mut parts);
            parts.push(block(child));
        } else {
            inline_run.push(child.clone());
        }
    }
    flush_inline(&mut inline_run, &mut parts);

    parts.retain(|part| !part.is_empty());
    parts.join(separator)
}

fn flush_inline(run: &mut Vec<Node>, parts: &mut Vec<String>) {
    if run.is_empty() {
        return;
    }
    let text = inline_children(run);
    run.clear();
    let text = text.trim();
    if !text.is_empty() {
        parts.push(text.to_string());
    }
}

fn indent_continuation(marker: &str, body: &str) -> String {
    let padding = " ".repeat(marker.len());
    let mut out = String::from(marker);
    for (index, line) in body.split('\n').enumerate() {
        if index > 0 {
            out.push('\n');
            if !line.is_empty() {
                out.push_str(&padding);
            }
        }
        out.push_str(line);
    }
    out
}

fn inline_children(nodes: &[Node]) -> String {
    let mut out = String::new();
    let mut after_break = false;
    for node in nodes {
        match node {
            Node::Text(text) => {
                let text = if after_break {
                    text.strip_prefix('\n').unwrap_or(text)
                } else {
                    text
                };
                let at_line_start = out.is_empty() || out.ends_with('\n');
                out.push_str(&escape_markup(text, at_line_start));
            }
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
            Node::Element(element) => out.push_str(&inline_element(element)),
        }
        after_break = matches!(node, Node::Element(element) if element.name == "br");
    }
    out
}

fn inline_element(element: &Element) -> String {
    if let Some(source) = element.attr(TEMPLATE_ATTR) {
        return source.to_string();
    }
    match element.name.as_str() {
        "em" | "i" => format!("*{}*", inline_children(&element.children)),
        "strong" | "b" => format!("**{}**", inline_children(&element.children)),
        "del" | "s" => format!("~~{}~~", inline_children(&element.children)),
        "code" => code_span(&element.text_content()),
        "br" => "\\\n".to_string(),
        "a" => link(element),
        "img" => {
            let target = element
                .attr(FILE_ATTR)
                .or_else(|| element.attr("src"))
                .unwrap_or_default();
            let alt = element.attr("alt").unwrap_or_default();
            format!("![{alt}]({target}{})", title_suffix(element))
        }
        _ => raw_html(element),
    }
}

fn link(element: &Element) -> String {
    let href = element.attr("href").unwrap_or_default();
    let plain = element.text_content();
    let bare = href.strip_prefix("mailto:").unwrap_or(href);
    if element.attr("title").is_none() && !href.is_empty() && (plain == href || plain == bare) {
        return format!("<{plain}>");
    }
    let text = inline_children(&element.children);
    format!("[{text}]({href}{})", title_suffix(element))
}

fn title_suffix(element: &Element) -> String {
    element
        .attr("title")
        .map(|title| format!(" \"{title}\""))
        .unwrap_or_default()
}

fn code_span(text: &str) -> String {
    if text.contains('`') {
        format!("`` {text} ``")
    } else {
        format!("`{text}`")
    }
}

/// Backslash-escape everything in a text run that would parse as markup.
/// `at_line_start` tells whether the run begins a line of output.
fn escape_markup(text: &str, mut at_line_start: bool) -> String {
    let chars: Vec<char> = text.chars().collect();
    let mut out = String::with_capacity(text.len());
    // Digits seen since the start of the line, while nothing else was.
    let mut marker_digits = at_line_start.then_some(0usize);

    for (index, &ch) in chars.iter().enumerate() {
        let previous = index.checked_sub(1).map(|previous| chars[previous]);
        let next = chars.get(index + 1).copied();
        let escape = match ch {
            '\\' | '*' | '`' | '[' | ']' | '~' | '<' => true,
            '_' => !(previous.is_some_and(char::is_alphanumeric)
                && next.is_some_and(char::is_alphanumeric)),
            '&' => starts_reference(&chars[index + 1..]),
            '#' | '-' | '+' | '=' | '>' => at_line_start,
            '.' | ')' => {
                marker_digits.is_some_and(|digits| (1..=9).contains(&digits))
                    && next.is_none_or(char::is_whitespace)
            }
            _ => false,
        };
        if escape {
            out.push('\\');
        }
        out.push(ch);

        marker_digits = match ch {
            '\n' => Some(0),
            ' ' | '\t' if at_line_start => marker_digits,
            ch if ch.is_ascii_digit() => marker_digits.map(|digits| digits + 1),
            _ => None,
        };
        at_line_start = ch == '\n' || (at_line_start && (ch == ' ' || ch == '\t'));
    }
    out
}

/// Whether the text after an `&` reads as a character reference.
fn starts_reference(rest: &[char]) -> bool {
    let name_len = rest
        .iter()
        .take_while(|ch| ch.is_ascii_alphanumeric() || **ch == '#')
        .count();
    name_len > 0 && rest.get(name_len) == Some(&';')
}

/// A heading ending in ` #` would lose the hashes as a closing sequence.
fn escape_closing_hashes(text: &str) -> String {
    let body = text.trim_end_matches('#');
    if body.len() == text.len() || !body.ends_with(' ') {
        return text.to_string();
    }
    format!("{body}\\{}", &text[body.len()..])
}

/// Elements without a markup form are kept as HTML, minus the annotation
/// and any id the engine generated.
fn raw_html(element: &Element) -> String {
    let generated_id = element.attr("id").is_some_and(|id| {
        id.strip_prefix(GENERATED_ID_PREFIX)
            .is_some_and(|rest| !rest.is_empty() && rest.bytes().all(|b| b.is_ascii_digit()))
    });
    let mut skipped = vec![ANNOTATION_ATTR];
    if generated_id {
        skipped.push("id");
    }
    element.outer_html_without(&skipped)
}
