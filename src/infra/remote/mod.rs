//! HTTP implementations of the remote collaborator ports.

mod client;

pub use client::{CACHE_ORIGIN_HEADER, RemoteClient, endpoint};

use async_trait::async_trait;
use markbridge_api_types::{LatestRevision, PreprocessRequest, PreprocessResponse, RevisionRecord};
use reqwest::Url;
use tracing::debug;

use crate::application::{
    ports::{ContentSource, PortError, Preprocessor, RenderCache},
    sites::Site,
};
use crate::domain::types::RevisionId;

fn api_base(site: &Site) -> Result<&Url, PortError> {
    site.api_url
        .as_ref()
        .ok_or_else(|| PortError::unavailable(format!("no content api configured for {}", site.domain)))
}

/// Reads page revisions from each site's content API.
///
/// `GET {api}/pages/{title}/revisions/{rev|latest}` answers a
/// [`RevisionRecord`]; `GET {api}/pages/{title}/latest` a [`LatestRevision`].
#[derive(Clone, Debug)]
pub struct HttpContentSource {
    client: RemoteClient,
}

impl HttpContentSource {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ContentSource for HttpContentSource {
    async fn fetch(
        &self,
        site: &Site,
        title: &str,
        revision: Option<RevisionId>,
    ) -> Result<RevisionRecord, PortError> {
        let revision = revision
            .map(|rev| rev.to_string())
            .unwrap_or_else(|| "latest".to_string());
        let url = endpoint(api_base(site)?, &["pages", title, "revisions", &revision])?;
        debug!(target = "markbridge::remote", url = %url, "fetching revision");
        self.client
            .json(self.client.get(url), &format!("revision {revision} of {title}"))
            .await
    }

    async fn latest_revision(&self, site: &Site, title: &str) -> Result<RevisionId, PortError> {
        let url = endpoint(api_base(site)?, &["pages", title, "latest"])?;
        let latest: LatestRevision = self
            .client
            .json(self.client.get(url), &format!("latest revision of {title}"))
            .await?;
        RevisionId::new(latest.revision_id)
            .ok_or_else(|| PortError::failed(format!("content api returned revision 0 for {title}")))
    }
}

/// `POST {api}/preprocess` with `only_substitute` set.
#[derive(Clone, Debug)]
pub struct HttpPreprocessor {
    client: RemoteClient,
}

impl HttpPreprocessor {
    pub fn new(client: RemoteClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Preprocessor for HttpPreprocessor {
    async fn substitute(
        &self,
        site: &Site,
        title: &str,
        markup: &str,
    ) -> Result<String, PortError> {
        let url = endpoint(api_base(site)?, &["preprocess"])?;
        let request = PreprocessRequest {
            title: title.to_string(),
            text: markup.to_string(),
            only_substitute: true,
        };
        let response: PreprocessResponse = self
            .client
            .json(self.client.post_json(url, &request), "preprocess")
            .await?;
        Ok(response.text)
    }
}

/// `GET {cache}/{domain}/{title}/{cache_id}`; a 404 is a miss.
#[derive(Clone, Debug)]
pub struct HttpRenderCache {
    client: RemoteClient,
    base: Url,
}

impl HttpRenderCache {
    pub fn new(client: RemoteClient, base: Url) -> Self {
        Self { client, base }
    }
}

#[async_trait]
impl RenderCache for HttpRenderCache {
    async fn lookup(
        &self,
        site: &Site,
        title: &str,
        cache_id: &str,
    ) -> Result<Option<String>, PortError> {
        let url = endpoint(&self.base, &[&site.domain, title, cache_id])?;
        let request = self.client.get(url).header(CACHE_ORIGIN_HEADER, "1");
        self.client.optional_text(request, "render cache entry").await
    }
}
