//! Locating template invocations (`{{Name|args}}`) in markup.
//!
//! Only top-level invocations are reported: an invocation nested inside
//! another one belongs to its parent's source range. Template parameters
//! (`{{{1}}}`) are not invocations and are skipped as a unit.

use std::ops::Range;

const OPEN: &str = "{{";
const CLOSE: &str = "}}";
const PARAM_OPEN: &str = "{{{";
const PARAM_CLOSE: &str = "}}}";

/// Prefixes that already mark an invocation for substitution.
const SUBST_PREFIXES: [&str; 2] = ["subst:", "safesubst:"];

/// Byte range of one top-level invocation, delimiters included.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TemplateInvocation {
    start: usize,
    end: usize,
}

impl TemplateInvocation {
    pub fn range(&self) -> Range<usize> {
        self.start..self.end
    }

    /// Offset of the first byte after the opening delimiter.
    pub fn inner_start(&self) -> usize {
        self.start + OPEN.len()
    }

    pub fn source<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }

    pub fn inner<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start + OPEN.len()..self.end - CLOSE.len()]
    }

    /// Template name as written, without arguments.
    pub fn target<'a>(&self, text: &'a str) -> &'a str {
        let inner = self.inner(text);
        inner.split('|').next().unwrap_or(inner).trim()
    }

    pub fn is_substituted(&self, text: &str) -> bool {
        let target = self.inner(text).trim_start().to_ascii_lowercase();
        SUBST_PREFIXES
            .iter()
            .any(|prefix| target.starts_with(prefix))
    }
}

/// Invocations in page markup. Code spans and fenced code blocks are literal
/// and never contain invocations.
pub fn scan_markup(text: &str) -> Vec<TemplateInvocation> {
    scan(text, true)
}

/// Invocations in plain text, with no markup context to honor.
pub fn scan_text(text: &str) -> Vec<TemplateInvocation> {
    scan(text, false)
}

fn scan(text: &str, skip_code: bool) -> Vec<TemplateInvocation> {
    let bytes = text.as_bytes();
    let mut found = Vec::new();
    let mut index = 0;
    let mut at_line_start = true;

    while index < bytes.len() {
        if skip_code {
            if at_line_start && let Some(end) = fenced_block_end(text, index) {
                index = end;
                continue;
            }
            if bytes[index] == b'`' {
                index = code_span_end(bytes, index);
                at_line_start = false;
                continue;
            }
        }

        let rest = &text[index..];
        if rest.starts_with(PARAM_OPEN) {
            index = skip_parameter(text, index);
            at_line_start = false;
            continue;
        }
        if rest.starts_with(OPEN) {
            match matching_close(text, index) {
                Some(end) => {
                    found.push(TemplateInvocation { start: index, end });
                    index = end;
                }
                None => index += OPEN.len(),
            }
            at_line_start = false;
            continue;
        }

        at_line_start = rest.starts_with('\n');
        index += rest.chars().next().map_or(1, char::len_utf8);
    }

    found
}

fn matching_close(text: &str, start: usize) -> Option<usize> {
    let mut depth = 1usize;
    let mut index = start + OPEN.len();
    while index < text.len() {
        let rest = &text[index..];
        if rest.starts_with(PARAM_OPEN) {
            index = skip_parameter(text, index);
        } else if rest.starts_with(OPEN) {
            depth += 1;
            index += OPEN.len();
        } else if rest.starts_with(CLOSE) {
            depth -= 1;
            index += CLOSE.len();
            if depth == 0 {
                return Some(index);
            }
        } else {
            index += rest.chars().next().map_or(1, char::len_utf8);
        }
    }
    None
}

fn skip_parameter(text: &str, start: usize) -> usize {
    let body = start + PARAM_OPEN.len();
    match text[body..].find(PARAM_CLOSE) {
        Some(offset) => body + offset + PARAM_CLOSE.len(),
        None => body,
    }
}

fn code_span_end(bytes: &[u8], start: usize) -> usize {
    let run = bytes[start..].iter().take_while(|&&b| b == b'`').count();
    let mut index = start + run;
    while index < bytes.len() {
        if bytes[index] == b'`' {
            let closing = bytes[index..].iter().take_while(|&&b| b == b'`').count();
            if closing == run {
                return index + closing;
            }
            index += closing;
        } else {
            index += 1;
        }
    }
    // An unmatched run is literal backticks.
    start + run
}

/// End of a fenced code block opening at `line_start`, if one does.
fn fenced_block_end(text: &str, line_start: usize) -> Option<usize> {
    let line = text[line_start..].split('\n').next().unwrap_or_default();
    let (fence_char, fence_len) = fence_marker(line)?;

    let mut offset = line_start + line.len();
    while offset < text.len() {
        // Skip the newline that ended the previous line.
        offset += 1;
        let next = text[offset..].split('\n').next().unwrap_or_default();
        if let Some((ch, len)) = fence_marker(next)
            && ch == fence_char
            && len >= fence_len
            && next.trim_start().trim_start_matches(ch).trim().is_empty()
        {
            let end = offset + next.len();
            return Some((end + 1).min(text.len()));
        }
        offset += next.len();
    }
    Some(text.len())
}

fn fence_marker(line: &str) -> Option<(char, usize)> {
    let indent = line.len() - line.trim_start_matches(' ').len();
    if indent > 3 {
        return None;
    }
    let trimmed = &line[indent..];
    let ch = trimmed.chars().next().filter(|ch| *ch == '`' || *ch == '~')?;
    let len = trimmed.chars().take_while(|c| *c == ch).count();
    (len >= 3).then_some((ch, len))
}
