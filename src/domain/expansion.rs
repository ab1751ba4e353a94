//! Previously computed expansions that may be carried into a new conversion.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ExpansionKind {
    Templates,
    Files,
}

impl ExpansionKind {
    pub const ALL: [ExpansionKind; 2] = [ExpansionKind::Templates, ExpansionKind::Files];
}

/// Expansion fragments keyed first by kind, then by expansion key.
///
/// Template keys are the full invocation source (`{{Name|arg}}`); file keys
/// are file names.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExpansionSet {
    templates: BTreeMap<String, String>,
    files: BTreeMap<String, String>,
}

impl ExpansionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(
        &mut self,
        kind: ExpansionKind,
        key: impl Into<String>,
        fragment: impl Into<String>,
    ) {
        self.kind_mut(kind).insert(key.into(), fragment.into());
    }

    pub fn get(&self, kind: ExpansionKind, key: &str) -> Option<&str> {
        self.kind(kind).get(key).map(String::as_str)
    }

    pub fn kind(&self, kind: ExpansionKind) -> &BTreeMap<String, String> {
        match kind {
            ExpansionKind::Templates => &self.templates,
            ExpansionKind::Files => &self.files,
        }
    }

    fn kind_mut(&mut self, kind: ExpansionKind) -> &mut BTreeMap<String, String> {
        match kind {
            ExpansionKind::Templates => &mut self.templates,
            ExpansionKind::Files => &mut self.files,
        }
    }

    /// Drop every fragment of one kind. Used when the caller reports that
    /// kind as edited.
    pub fn invalidate(&mut self, kind: ExpansionKind) {
        self.kind_mut(kind).clear();
    }

    pub fn is_empty(&self) -> bool {
        self.templates.is_empty() && self.files.is_empty()
    }

    pub fn len(&self) -> usize {
        self.templates.len() + self.files.len()
    }
}
