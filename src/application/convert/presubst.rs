//! Marking every top-level template invocation for substitution.
//!
//! Edits are computed against the original offsets and applied in one
//! left-to-right pass; the text is never modified while offsets are still
//! being read.

use crate::domain::template::scan_markup;

const SUBST_MARKER: &str = "subst:";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InsertEdit {
    /// Byte offset in the original text.
    pub offset: usize,
    pub text: &'static str,
}

/// One insertion per top-level invocation that is not already substituted,
/// in ascending offset order.
pub fn substitution_edits(markup: &str) -> Vec<InsertEdit> {
    scan_markup(markup)
        .into_iter()
        .filter(|invocation| !invocation.is_substituted(markup))
        .map(|invocation| InsertEdit {
            offset: invocation.inner_start(),
            text: SUBST_MARKER,
        })
        .collect()
}

pub fn apply_edits(markup: &str, edits: &[InsertEdit]) -> String {
    let mut out = markup.to_string();
    let mut delta = 0usize;
    for edit in edits {
        out.insert_str(edit.offset + delta, edit.text);
        delta += edit.text.len();
    }
    out
}

/// `Hello {{Template}}` becomes `Hello {{subst:Template}}`.
pub fn mark_for_substitution(markup: &str) -> String {
    apply_edits(markup, &substitution_edits(markup))
}
