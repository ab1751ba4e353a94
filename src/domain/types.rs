//! Value types shared by every conversion request.

use std::{fmt, num::NonZeroU64, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::DomainError;

/// Which API generation a request arrived through.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ApiVersion {
    V1,
    V2,
}

impl ApiVersion {
    pub fn as_str(self) -> &'static str {
        match self {
            ApiVersion::V1 => "v1",
            ApiVersion::V2 => "v2",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Direction {
    MarkupToRendered,
    RenderedToMarkup,
}

/// Output shape negotiated by versioned requests.
///
/// The canonical names are the ones that appear in URLs. `bundle`,
/// `rendered` and `markup` are accepted as aliases.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Format {
    PageBundle,
    Html,
    Wikitext,
}

impl Format {
    pub fn as_str(self) -> &'static str {
        match self {
            Format::PageBundle => "pagebundle",
            Format::Html => "html",
            Format::Wikitext => "wikitext",
        }
    }

    /// Formats that a GET request may ask for.
    pub fn is_rendering(self) -> bool {
        matches!(self, Format::PageBundle | Format::Html)
    }

    pub fn direction(self) -> Direction {
        if self.is_rendering() {
            Direction::MarkupToRendered
        } else {
            Direction::RenderedToMarkup
        }
    }
}

impl fmt::Display for Format {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Format {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "pagebundle" | "bundle" => Ok(Format::PageBundle),
            "html" | "rendered" => Ok(Format::Html),
            "wikitext" | "markup" => Ok(Format::Wikitext),
            _ => Err(DomainError::validation("Invalid format")),
        }
    }
}

/// A concrete page revision. Zero is never a valid revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct RevisionId(NonZeroU64);

impl RevisionId {
    pub fn new(value: u64) -> Option<Self> {
        NonZeroU64::new(value).map(Self)
    }

    pub fn get(self) -> u64 {
        self.0.get()
    }

    /// Parse an optional revision parameter. Empty input and `0` both mean
    /// "no revision".
    pub fn parse_optional(raw: Option<&str>) -> Result<Option<Self>, DomainError> {
        let Some(raw) = raw.map(str::trim).filter(|value| !value.is_empty()) else {
            return Ok(None);
        };
        raw.parse::<u64>()
            .map(Self::new)
            .map_err(|_| DomainError::validation(format!("Invalid revision `{raw}`")))
    }
}

impl fmt::Display for RevisionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Per-request switches, fixed once the request context is built.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct ConversionFlags {
    pub selective_serialization: bool,
    pub scrub_markup: bool,
    pub substitute_templates: bool,
    pub body_only: bool,
}

/// Truthiness of legacy query and form flags (`body=1`, `subst=true`, ...).
pub fn parse_flag(raw: Option<&str>) -> bool {
    match raw.map(|value| value.trim().to_ascii_lowercase()) {
        None => false,
        Some(value) => !matches!(value.as_str(), "0" | "false" | "no" | "off"),
    }
}
