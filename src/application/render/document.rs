//! A minimal HTML element tree.
//!
//! Parsing drives lol_html's streaming callbacks into a stack of open
//! elements. Missing end tags are closed implicitly when an ancestor closes
//! or the input ends; no other HTML tree-construction rules are applied.

use std::{cell::RefCell, collections::HashMap, rc::Rc};

use lol_html::{
    RewriteStrSettings, doc_comments, doc_text, element, html_content::EndTag, rewrite_str,
};
use markbridge_api_types::{NodeAnnotation, PageAnnotations};
use once_cell::sync::Lazy;

use super::types::{ANNOTATION_ATTR, RenderError};

type EndTagResult = Result<(), Box<dyn std::error::Error + Send + Sync>>;

const VOID_ELEMENTS: [&str; 14] = [
    "area", "base", "br", "col", "embed", "hr", "img", "input", "link", "meta", "param", "source",
    "track", "wbr",
];
const RAW_TEXT_ELEMENTS: [&str; 2] = ["script", "style"];
const HEAD_ELEMENTS: [&str; 5] = ["base", "link", "meta", "title", "style"];

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Node {
    Element(Element),
    /// Decoded text.
    Text(String),
    Comment(String),
}

impl Node {
    pub fn as_element(&self) -> Option<&Element> {
        match self {
            Node::Element(element) => Some(element),
            _ => None,
        }
    }

    pub fn is_whitespace(&self) -> bool {
        matches!(self, Node::Text(text) if text.trim().is_empty())
    }

    fn write_html(&self, out: &mut String, skip: &dyn Fn(&str) -> bool, raw_text: bool) {
        match self {
            Node::Element(element) => element.write_html(out, skip),
            Node::Text(text) if raw_text => out.push_str(text),
            Node::Text(text) => out.push_str(&escape_text(text)),
            Node::Comment(comment) => {
                out.push_str("<!--");
                out.push_str(comment);
                out.push_str("-->");
            }
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Element {
    pub name: String,
    pub attrs: Vec<(String, String)>,
    pub children: Vec<Node>,
}

impl Element {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            attrs: Vec::new(),
            children: Vec::new(),
        }
    }

    pub fn with_attr(mut self, name: &str, value: impl Into<String>) -> Self {
        self.set_attr(name, value);
        self
    }

    pub fn with_children(mut self, children: Vec<Node>) -> Self {
        self.children = children;
        self
    }

    pub fn attr(&self, name: &str) -> Option<&str> {
        self.attrs
            .iter()
            .find(|(key, _)| key == name)
            .map(|(_, value)| value.as_str())
    }

    /// Replace an existing attribute in place or append a new one.
    pub fn set_attr(&mut self, name: &str, value: impl Into<String>) {
        let value = value.into();
        match self.attrs.iter_mut().find(|(key, _)| key == name) {
            Some((_, existing)) => *existing = value,
            None => self.attrs.push((name.to_string(), value)),
        }
    }

    pub fn remove_attr(&mut self, name: &str) -> Option<String> {
        let index = self.attrs.iter().position(|(key, _)| key == name)?;
        Some(self.attrs.remove(index).1)
    }

    /// Remove an attribute from this element and every descendant.
    pub fn remove_attr_deep(&mut self, name: &str) {
        self.remove_attr(name);
        for child in &mut self.children {
            if let Node::Element(element) = child {
                element.remove_attr_deep(name);
            }
        }
    }

    pub fn is_void(&self) -> bool {
        VOID_ELEMENTS.contains(&self.name.as_str())
    }

    pub fn child_elements(&self) -> impl Iterator<Item = &Element> {
        self.children.iter().filter_map(Node::as_element)
    }

    pub fn outer_html(&self) -> String {
        self.outer_html_without(&[])
    }

    /// Outer HTML with the named attributes left out at every depth.
    pub fn outer_html_without(&self, skipped: &[&str]) -> String {
        let mut out = String::new();
        self.write_html(&mut out, &|name| skipped.contains(&name));
        out
    }

    pub fn inner_html(&self) -> String {
        let mut out = String::new();
        let raw = RAW_TEXT_ELEMENTS.contains(&self.name.as_str());
        for child in &self.children {
            child.write_html(&mut out, &|_| false, raw);
        }
        out
    }

    pub fn text_content(&self) -> String {
        let mut out = String::new();
        collect_text(&self.children, &mut out);
        out
    }

    pub fn annotation(&self) -> Option<NodeAnnotation> {
        self.attr(ANNOTATION_ATTR)
            .and_then(|raw| serde_json::from_str(raw).ok())
    }

    fn write_html(&self, out: &mut String, skip: &dyn Fn(&str) -> bool) {
        out.push('<');
        out.push_str(&self.name);
        for (name, value) in &self.attrs {
            if skip(name) {
                continue;
            }
            out.push(' ');
            out.push_str(name);
            out.push_str("=\"");
            out.push_str(&escape_attr(value));
            out.push('"');
        }
        out.push('>');
        if self.is_void() {
            return;
        }
        let raw = RAW_TEXT_ELEMENTS.contains(&self.name.as_str());
        for child in &self.children {
            child.write_html(out, skip, raw);
        }
        out.push_str("</");
        out.push_str(&self.name);
        out.push('>');
    }

    fn find_by_id(&self, id: &str) -> Option<&Element> {
        if self.attr("id") == Some(id) {
            return Some(self);
        }
        self.child_elements()
            .find_map(|element| element.find_by_id(id))
    }

    fn visit_mut(&mut self, visit: &mut dyn FnMut(&mut Element)) {
        visit(self);
        for child in &mut self.children {
            if let Node::Element(element) = child {
                element.visit_mut(visit);
            }
        }
    }

    fn visit(&self, visit: &mut dyn FnMut(&Element)) {
        visit(self);
        for element in self.child_elements() {
            element.visit(visit);
        }
    }
}

fn collect_text(nodes: &[Node], out: &mut String) {
    for node in nodes {
        match node {
            Node::Text(text) => out.push_str(text),
            Node::Element(element) => collect_text(&element.children, out),
            Node::Comment(_) => {}
        }
    }
}

/// A rendered page: head and body children.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Document {
    pub head: Vec<Node>,
    pub body: Vec<Node>,
}

impl Document {
    /// Parse a full document or a bare body fragment.
    pub fn parse(html: &str) -> Result<Self, RenderError> {
        let nodes = parse_nodes(html)?;
        Ok(split_document(nodes))
    }

    pub fn parse_fragment(html: &str) -> Result<Vec<Node>, RenderError> {
        parse_nodes(html)
    }

    pub fn to_html(&self) -> String {
        let mut out = String::from("<!DOCTYPE html>\n<html><head>");
        for node in &self.head {
            node.write_html(&mut out, &|_| false, false);
        }
        out.push_str("</head><body>");
        out.push_str(&self.body_html());
        out.push_str("</body></html>");
        out
    }

    pub fn body_html(&self) -> String {
        let mut out = String::new();
        for node in &self.body {
            node.write_html(&mut out, &|_| false, false);
        }
        out
    }

    pub fn base_element(&self) -> Option<&Element> {
        self.head
            .iter()
            .filter_map(Node::as_element)
            .find(|element| element.name == "base")
    }

    pub fn body_elements(&self) -> impl Iterator<Item = &Element> {
        self.body.iter().filter_map(Node::as_element)
    }

    pub fn find_by_id(&self, id: &str) -> Option<&Element> {
        self.body_elements()
            .find_map(|element| element.find_by_id(id))
    }

    pub fn for_each_element(&self, visit: &mut dyn FnMut(&Element)) {
        for element in self.body_elements() {
            element.visit(visit);
        }
    }

    pub fn for_each_element_mut(&mut self, visit: &mut dyn FnMut(&mut Element)) {
        for node in &mut self.body {
            if let Node::Element(element) = node {
                element.visit_mut(visit);
            }
        }
    }

    /// Collect the inline annotations of every element that has an id.
    pub fn extract_annotations(&self) -> PageAnnotations {
        let mut annotations = PageAnnotations::default();
        self.for_each_element(&mut |element| {
            if let (Some(id), Some(annotation)) = (element.attr("id"), element.annotation()) {
                annotations.ids.insert(id.to_string(), annotation);
            }
        });
        annotations.counter = annotations.ids.len() as u64;
        annotations
    }

    /// Attach annotations to the elements with matching ids.
    pub fn apply_annotations(&mut self, annotations: &PageAnnotations) {
        self.for_each_element_mut(&mut |element| {
            let Some(annotation) = element.attr("id").and_then(|id| annotations.ids.get(id))
            else {
                return;
            };
            if let Ok(encoded) = serde_json::to_string(annotation) {
                element.set_attr(ANNOTATION_ATTR, encoded);
            }
        });
    }

    pub fn strip_annotations(&mut self) {
        self.for_each_element_mut(&mut |element| {
            element.remove_attr(ANNOTATION_ATTR);
        });
    }
}

fn split_document(nodes: Vec<Node>) -> Document {
    let nodes = match nodes
        .iter()
        .position(|node| matches!(node, Node::Element(el) if el.name == "html"))
    {
        Some(index) => match nodes.into_iter().nth(index) {
            Some(Node::Element(html)) => html.children,
            _ => Vec::new(),
        },
        None => nodes,
    };

    let mut document = Document::default();
    for node in nodes {
        match node {
            Node::Element(element) if element.name == "head" => {
                document.head.extend(element.children)
            }
            Node::Element(element) if element.name == "body" => {
                document.body.extend(element.children)
            }
            Node::Element(element) if HEAD_ELEMENTS.contains(&element.name.as_str()) => {
                document.head.push(Node::Element(element))
            }
            node if node.is_whitespace() => {}
            node => document.body.push(node),
        }
    }
    document
}

#[derive(Default, Clone)]
struct TreeBuilder {
    open: Vec<Element>,
    root: Vec<Node>,
    /// Raw text not yet decoded. Chunks may split a character reference, so
    /// decoding waits for the next structural event.
    pending_text: String,
}

impl TreeBuilder {
    fn open(&mut self, element: Element) {
        self.flush_text();
        self.open.push(element);
    }

    fn close(&mut self, name: &str) {
        self.flush_text();
        if !self.open.iter().any(|element| element.name == name) {
            return;
        }
        while let Some(element) = self.open.pop() {
            let matched = element.name == name;
            self.append(Node::Element(element));
            if matched {
                break;
            }
        }
    }

    fn comment(&mut self, text: String) {
        self.flush_text();
        self.append(Node::Comment(text));
    }

    fn text(&mut self, raw: &str) {
        self.pending_text.push_str(raw);
    }

    fn flush_text(&mut self) {
        if self.pending_text.is_empty() {
            return;
        }
        let raw = std::mem::take(&mut self.pending_text);
        let in_raw_text = self
            .open
            .last()
            .is_some_and(|parent| RAW_TEXT_ELEMENTS.contains(&parent.name.as_str()));
        let text = if in_raw_text {
            raw
        } else {
            decode_entities(&raw)
        };
        self.append(Node::Text(text));
    }

    fn append(&mut self, node: Node) {
        let siblings = match self.open.last_mut() {
            Some(parent) => &mut parent.children,
            None => &mut self.root,
        };
        match (siblings.last_mut(), node) {
            (Some(Node::Text(previous)), Node::Text(text)) => previous.push_str(&text),
            (_, node) => siblings.push(node),
        }
    }

    fn finish(mut self) -> Vec<Node> {
        self.flush_text();
        while let Some(element) = self.open.pop() {
            self.append(Node::Element(element));
        }
        self.root
    }
}

fn parse_nodes(html: &str) -> Result<Vec<Node>, RenderError> {
    let builder = Rc::new(RefCell::new(TreeBuilder::default()));

    rewrite_str(
        html,
        RewriteStrSettings {
            element_content_handlers: vec![element!("*", {
                let builder = Rc::clone(&builder);
                move |el| {
                    let name = el.tag_name();
                    let attrs = el
                        .attributes()
                        .iter()
                        .map(|attr| (attr.name(), decode_entities(&attr.value())))
                        .collect();
                    builder.borrow_mut().open(Element {
                        name: name.clone(),
                        attrs,
                        children: Vec::new(),
                    });
                    match el.end_tag_handlers() {
                        Some(handlers) => {
                            let builder = Rc::clone(&builder);
                            handlers.push(Box::new(move |_end: &mut EndTag<'_>| -> EndTagResult {
                                builder.borrow_mut().close(&name);
                                Ok(())
                            }) as lol_html::EndTagHandler<'static>);
                        }
                        None => builder.borrow_mut().close(&name),
                    }
                    Ok(())
                }
            })],
            document_content_handlers: vec![
                doc_text!({
                    let builder = Rc::clone(&builder);
                    move |chunk| {
                        builder.borrow_mut().text(chunk.as_str());
                        Ok(())
                    }
                }),
                doc_comments!({
                    let builder = Rc::clone(&builder);
                    move |comment| {
                        builder.borrow_mut().comment(comment.text());
                        Ok(())
                    }
                }),
            ],
            ..RewriteStrSettings::default()
        },
    )
    .map_err(RenderError::document)?;

    let builder = Rc::try_unwrap(builder)
        .map(RefCell::into_inner)
        .unwrap_or_else(|rc| rc.borrow().clone());
    Ok(builder.finish())
}

pub fn escape_text(text: &str) -> String {
    let mut escaped = String::with_capacity(text.len());
    for ch in text.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

pub fn escape_attr(value: &str) -> String {
    let mut escaped = String::with_capacity(value.len());
    for ch in value.chars() {
        match ch {
            '&' => escaped.push_str("&amp;"),
            '"' => escaped.push_str("&quot;"),
            '<' => escaped.push_str("&lt;"),
            '>' => escaped.push_str("&gt;"),
            _ => escaped.push(ch),
        }
    }
    escaped
}

/// Decode numeric references and the full HTML5 named reference table.
/// Unknown named references are kept verbatim.
pub fn decode_entities(raw: &str) -> String {
    if !raw.contains('&') {
        return raw.to_string();
    }
    let mut decoded = String::with_capacity(raw.len());
    let mut rest = raw;
    while let Some(amp) = rest.find('&') {
        decoded.push_str(&rest[..amp]);
        rest = &rest[amp..];
        let Some(semi) = rest
            .char_indices()
            .take(MAX_REFERENCE_LEN)
            .find(|(_, ch)| *ch == ';')
            .map(|(index, _)| index)
        else {
            decoded.push('&');
            rest = &rest[1..];
            continue;
        };
        if push_reference(&mut decoded, &rest[1..semi]) {
            rest = &rest[semi + 1..];
        } else {
            decoded.push('&');
            rest = &rest[1..];
        }
    }
    decoded.push_str(rest);
    decoded
}

// "&CounterClockwiseContourIntegral;" is the longest named reference.
const MAX_REFERENCE_LEN: usize = 34;

static NAMED_REFERENCES: Lazy<HashMap<&'static str, &'static str>> = Lazy::new(|| {
    entities::ENTITIES
        .iter()
        .filter_map(|entity| {
            let name = entity.entity.strip_prefix('&')?.strip_suffix(';')?;
            Some((name, entity.characters))
        })
        .collect()
});

fn push_reference(decoded: &mut String, reference: &str) -> bool {
    if let Some(numeric) = reference.strip_prefix('#') {
        let code = match numeric.strip_prefix(['x', 'X']) {
            Some(hex) => u32::from_str_radix(hex, 16).ok(),
            None => numeric.parse::<u32>().ok(),
        };
        return match code.and_then(char::from_u32) {
            Some(ch) => {
                decoded.push(ch);
                true
            }
            None => false,
        };
    }
    match NAMED_REFERENCES.get(reference) {
        Some(characters) => {
            decoded.push_str(characters);
            true
        }
        None => false,
    }
}
