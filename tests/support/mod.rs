//! In-memory collaborators shared by the integration tests.
#![allow(dead_code)]

use std::{
    collections::HashMap,
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use async_trait::async_trait;
use axum::{Router, body::Body, http::Request, response::Response};
use http_body_util::BodyExt;
use markbridge::{
    application::{
        convert::{ConversionSettings, Orchestrator},
        ports::{
            ContentSource, MarkupParser, MarkupSerializer, ParseInput, PortError, Ports,
            Preprocessor, RenderCache,
        },
        render::{document::Document, reference_engine},
        sites::{Site, SiteRegistry},
        timeout::{HeartbeatSink, TimeoutPolicy, TimeoutSupervisor},
    },
    domain::types::RevisionId,
    infra::http::{HttpState, build_router},
};
use markbridge_api_types::RevisionRecord;
use tower::ServiceExt;

pub const PREFIX: &str = "enwiki";
pub const DOMAIN: &str = "en.example.org";

pub fn site() -> Site {
    Site::new(PREFIX, DOMAIN, None)
}

/// Pages keyed by title, each with its revision history.
#[derive(Default)]
pub struct MemoryContent {
    revisions: Mutex<HashMap<String, Vec<RevisionRecord>>>,
    fetches: AtomicUsize,
}

impl MemoryContent {
    pub fn with_page(title: &str, revisions: &[(u64, &str)]) -> Arc<Self> {
        let content = Self::default();
        content.add_page(title, revisions);
        Arc::new(content)
    }

    pub fn add_page(&self, title: &str, revisions: &[(u64, &str)]) {
        let mut parent = None;
        let records = revisions
            .iter()
            .map(|(id, markup)| {
                let record = RevisionRecord {
                    markup: markup.to_string(),
                    revision_id: *id,
                    parent_revision_id: parent,
                };
                parent = Some(*id);
                record
            })
            .collect();
        self.revisions
            .lock()
            .expect("content lock")
            .insert(title.to_string(), records);
    }

    pub fn fetches(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ContentSource for MemoryContent {
    async fn fetch(
        &self,
        _site: &Site,
        title: &str,
        revision: Option<RevisionId>,
    ) -> Result<RevisionRecord, PortError> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let pages = self.revisions.lock().expect("content lock");
        let history = pages
            .get(title)
            .ok_or_else(|| PortError::not_found(format!("page {title}")))?;
        let record = match revision {
            Some(revision) => history
                .iter()
                .find(|record| record.revision_id == revision.get()),
            None => history.last(),
        };
        record
            .cloned()
            .ok_or_else(|| PortError::not_found(format!("revision of {title}")))
    }

    async fn latest_revision(&self, _site: &Site, title: &str) -> Result<RevisionId, PortError> {
        let pages = self.revisions.lock().expect("content lock");
        pages
            .get(title)
            .and_then(|history| history.last())
            .and_then(|record| RevisionId::new(record.revision_id))
            .ok_or_else(|| PortError::not_found(format!("page {title}")))
    }
}

/// Records what it was asked to substitute and answers a fixed text.
pub struct RecordingPreprocessor {
    reply: String,
    seen: Mutex<Vec<String>>,
}

impl RecordingPreprocessor {
    pub fn replying(reply: &str) -> Arc<Self> {
        Arc::new(Self {
            reply: reply.to_string(),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().expect("preprocessor lock").clone()
    }
}

#[async_trait]
impl Preprocessor for RecordingPreprocessor {
    async fn substitute(
        &self,
        _site: &Site,
        _title: &str,
        markup: &str,
    ) -> Result<String, PortError> {
        self.seen
            .lock()
            .expect("preprocessor lock")
            .push(markup.to_string());
        Ok(self.reply.clone())
    }
}

/// Delegates to the reference engine, counting calls and optionally stalling.
pub struct InstrumentedParser {
    delay: Option<Duration>,
    seen: Mutex<Vec<String>>,
}

impl InstrumentedParser {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            delay: None,
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn stalling(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay: Some(delay),
            seen: Mutex::new(Vec::new()),
        })
    }

    pub fn calls(&self) -> usize {
        self.seen.lock().expect("parser lock").len()
    }

    pub fn seen(&self) -> Vec<String> {
        self.seen.lock().expect("parser lock").clone()
    }
}

#[async_trait]
impl MarkupParser for InstrumentedParser {
    async fn parse(&self, site: &Site, input: ParseInput<'_>) -> Result<Document, PortError> {
        self.seen
            .lock()
            .expect("parser lock")
            .push(input.markup.to_string());
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }
        reference_engine()
            .render(site, input)
            .map_err(PortError::from)
    }
}

/// Cache whose every lookup fails.
pub struct BrokenCache;

#[async_trait]
impl RenderCache for BrokenCache {
    async fn lookup(
        &self,
        _site: &Site,
        _title: &str,
        _cache_id: &str,
    ) -> Result<Option<String>, PortError> {
        Err(PortError::unavailable("cache is down"))
    }
}

pub struct Harness {
    pub content: Arc<MemoryContent>,
    pub preprocessor: Arc<RecordingPreprocessor>,
    pub parser: Arc<InstrumentedParser>,
    pub render_cache: Option<Arc<dyn RenderCache>>,
    pub policy: TimeoutPolicy,
    pub heartbeat: Option<Arc<dyn HeartbeatSink>>,
    pub settings: ConversionSettings,
}

impl Harness {
    pub fn new(content: Arc<MemoryContent>) -> Self {
        Self {
            content,
            preprocessor: RecordingPreprocessor::replying(""),
            parser: InstrumentedParser::new(),
            render_cache: None,
            policy: TimeoutPolicy {
                soft: Duration::from_secs(5),
                hard: Duration::from_secs(10),
            },
            heartbeat: None,
            settings: ConversionSettings::default(),
        }
    }

    pub fn ports(&self) -> Ports {
        let serializer: Arc<dyn MarkupSerializer> = reference_engine();
        Ports {
            parser: self.parser.clone(),
            serializer,
            preprocessor: self.preprocessor.clone(),
            content: self.content.clone(),
            render_cache: self.render_cache.clone(),
        }
    }

    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.ports(),
            TimeoutSupervisor::new(self.policy, self.heartbeat.clone()),
            self.settings,
        )
    }

    pub fn router(&self) -> Router {
        build_router(HttpState::new(
            self.orchestrator(),
            SiteRegistry::new([site()]),
        ))
    }
}

pub async fn send(router: &Router, request: Request<Body>) -> Response {
    router
        .clone()
        .oneshot(request)
        .await
        .expect("router should respond")
}

pub async fn body_text(response: Response) -> String {
    let bytes = response
        .into_body()
        .collect()
        .await
        .expect("body should be readable")
        .to_bytes();
    String::from_utf8(bytes.to_vec()).expect("utf-8 body")
}

pub async fn body_json(response: Response) -> serde_json::Value {
    serde_json::from_str(&body_text(response).await).expect("json body")
}
