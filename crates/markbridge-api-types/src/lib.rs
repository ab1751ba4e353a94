//! Wire types shared by the markbridge service, its clients and the worker
//! pool supervisor.
//!
//! Field names follow the public HTTP contract, which is why several of them
//! are renamed (`data-parsoid`, `cacheId`, `timeoutId`).

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

/// Header/body pair used by every part of a page bundle.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundlePart<T> {
    #[serde(default)]
    pub headers: BTreeMap<String, String>,
    pub body: T,
}

impl<T> BundlePart<T> {
    pub fn new(content_type: &str, body: T) -> Self {
        let mut headers = BTreeMap::new();
        headers.insert("content-type".to_string(), content_type.to_string());
        Self { headers, body }
    }
}

/// Per-node metadata recorded when markup is rendered.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct NodeAnnotation {
    /// Byte range `[start, end)` of the node in the source markup.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dsr: Option<(usize, usize)>,
    /// Hex SHA-256 of the node's outer HTML as originally rendered.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub hash: Option<String>,
}

/// Annotation payload for a whole page, keyed by node id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PageAnnotations {
    #[serde(default)]
    pub counter: u64,
    #[serde(default)]
    pub ids: BTreeMap<String, NodeAnnotation>,
}

/// `pagebundle` response: the document and its annotations, separately.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageBundle {
    pub html: BundlePart<String>,
    #[serde(rename = "data-parsoid")]
    pub data_parsoid: BundlePart<PageAnnotations>,
}

/// Markup response in bundle form.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MarkupBundle {
    pub wikitext: BundlePart<String>,
}

/// Request fields that may be sent either as a bare string or as a bundle part.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TextOrPart {
    Text(String),
    Part(BundlePart<String>),
}

impl TextOrPart {
    pub fn into_text(self) -> String {
        match self {
            TextOrPart::Text(text) => text,
            TextOrPart::Part(part) => part.body,
        }
    }

    pub fn as_text(&self) -> &str {
        match self {
            TextOrPart::Text(text) => text,
            TextOrPart::Part(part) => &part.body,
        }
    }
}

/// Prior revision state supplied by the caller (`original` or `previous`).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct PriorRevision {
    #[serde(default)]
    pub revid: Option<u64>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub html: Option<TextOrPart>,
    #[serde(default, rename = "data-parsoid")]
    pub data_parsoid: Option<BundlePart<PageAnnotations>>,
    #[serde(default)]
    pub wikitext: Option<TextOrPart>,
}

/// Which expansion kinds the caller edited since the prior revision.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct UpdateKinds {
    #[serde(default)]
    pub templates: bool,
    #[serde(default)]
    pub files: bool,
}

/// JSON body accepted by the v2 transform endpoints.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, Default)]
pub struct TransformBody {
    #[serde(default)]
    pub wikitext: Option<TextOrPart>,
    #[serde(default)]
    pub html: Option<TextOrPart>,
    #[serde(default)]
    pub original: Option<PriorRevision>,
    #[serde(default)]
    pub previous: Option<PriorRevision>,
    #[serde(default)]
    pub update: Option<UpdateKinds>,
    #[serde(default, rename = "cacheId")]
    pub cache_id: Option<String>,
    #[serde(default)]
    pub body_only: Option<bool>,
    #[serde(default, rename = "scrubWikitext")]
    pub scrub_wikitext: Option<bool>,
    #[serde(default)]
    pub subst: Option<bool>,
}

/// A page revision as served by the remote content source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RevisionRecord {
    pub markup: String,
    pub revision_id: u64,
    #[serde(default)]
    pub parent_revision_id: Option<u64>,
}

/// Latest revision pointer, used when a request names neither a revision nor
/// inline markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LatestRevision {
    pub revision_id: u64,
}

/// Body sent to the remote pre-substitution preprocessor.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessRequest {
    pub title: String,
    pub text: String,
    pub only_substitute: bool,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreprocessResponse {
    pub text: String,
}

/// Heartbeat emitted to the worker pool supervisor around every supervised
/// operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "HeartbeatWire", try_from = "HeartbeatWire")]
pub enum HeartbeatMessage {
    Start {
        timeout_id: String,
        hard_deadline_ms: u64,
        location: String,
    },
    Done {
        timeout_id: String,
    },
}

impl HeartbeatMessage {
    pub fn timeout_id(&self) -> &str {
        match self {
            HeartbeatMessage::Start { timeout_id, .. } | HeartbeatMessage::Done { timeout_id } => {
                timeout_id
            }
        }
    }
}

const HEARTBEAT_TYPE: &str = "timeout";

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct HeartbeatWire {
    #[serde(rename = "type")]
    kind: String,
    timeout_id: String,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    done: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    hard_deadline_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    location: Option<String>,
}

impl From<HeartbeatMessage> for HeartbeatWire {
    fn from(message: HeartbeatMessage) -> Self {
        match message {
            HeartbeatMessage::Start {
                timeout_id,
                hard_deadline_ms,
                location,
            } => Self {
                kind: HEARTBEAT_TYPE.to_string(),
                timeout_id,
                done: false,
                hard_deadline_ms: Some(hard_deadline_ms),
                location: Some(location),
            },
            HeartbeatMessage::Done { timeout_id } => Self {
                kind: HEARTBEAT_TYPE.to_string(),
                timeout_id,
                done: true,
                hard_deadline_ms: None,
                location: None,
            },
        }
    }
}

impl TryFrom<HeartbeatWire> for HeartbeatMessage {
    type Error = String;

    fn try_from(wire: HeartbeatWire) -> Result<Self, Self::Error> {
        if wire.kind != HEARTBEAT_TYPE {
            return Err(format!("unexpected heartbeat type `{}`", wire.kind));
        }
        if wire.done {
            return Ok(HeartbeatMessage::Done {
                timeout_id: wire.timeout_id,
            });
        }
        let hard_deadline_ms = wire
            .hard_deadline_ms
            .ok_or_else(|| "start heartbeat without hardDeadlineMs".to_string())?;
        Ok(HeartbeatMessage::Start {
            timeout_id: wire.timeout_id,
            hard_deadline_ms,
            location: wire.location.unwrap_or_default(),
        })
    }
}
