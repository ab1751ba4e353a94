use std::time::Duration;

use reqwest::{Client, RequestBuilder, Response, StatusCode, Url};
use serde::{Serialize, de::DeserializeOwned};

use crate::application::ports::PortError;
use crate::infra::error::InfraError;

/// Marks requests made on behalf of the render cache, so that the receiving
/// instance does not consult the cache again.
pub const CACHE_ORIGIN_HEADER: &str = "x-markbridge-cache-origin";

/// Shared HTTP client for every remote collaborator.
#[derive(Clone, Debug)]
pub struct RemoteClient {
    client: Client,
}

impl RemoteClient {
    pub fn new(timeout: Duration) -> Result<Self, InfraError> {
        let client = Client::builder()
            .user_agent(Self::user_agent())
            .timeout(timeout)
            .build()
            .map_err(|err| InfraError::http(format!("failed to build http client: {err}")))?;
        Ok(Self { client })
    }

    pub fn user_agent() -> &'static str {
        concat!("markbridge/", env!("CARGO_PKG_VERSION"))
    }

    pub fn get(&self, url: Url) -> RequestBuilder {
        self.client.get(url)
    }

    pub fn post_json<B: Serialize + ?Sized>(&self, url: Url, body: &B) -> RequestBuilder {
        self.client.post(url).json(body)
    }

    pub async fn json<T: DeserializeOwned>(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<T, PortError> {
        let response = send(request, what).await?;
        response
            .json::<T>()
            .await
            .map_err(|err| PortError::failed(format!("invalid {what} response: {err}")))
    }

    /// Like [`RemoteClient::json`], but a 404 is an answer rather than an error.
    pub async fn optional_text(
        &self,
        request: RequestBuilder,
        what: &str,
    ) -> Result<Option<String>, PortError> {
        match send(request, what).await {
            Ok(response) => response
                .text()
                .await
                .map(Some)
                .map_err(|err| PortError::failed(format!("invalid {what} response: {err}"))),
            Err(PortError::NotFound { .. }) => Ok(None),
            Err(err) => Err(err),
        }
    }
}

async fn send(request: RequestBuilder, what: &str) -> Result<Response, PortError> {
    let response = request
        .send()
        .await
        .map_err(|err| PortError::unavailable(format!("{what}: {err}")))?;
    let status = response.status();
    if status == StatusCode::NOT_FOUND {
        return Err(PortError::not_found(what));
    }
    if !status.is_success() {
        let message = response.text().await.unwrap_or_default();
        return Err(PortError::Upstream {
            status: status.as_u16(),
            message: truncate(message, 200),
        });
    }
    Ok(response)
}

fn truncate(mut message: String, limit: usize) -> String {
    if message.len() > limit {
        let mut cut = limit;
        while !message.is_char_boundary(cut) {
            cut -= 1;
        }
        message.truncate(cut);
    }
    message
}

/// `base` joined with already-encoded path segments.
pub fn endpoint(base: &Url, segments: &[&str]) -> Result<Url, PortError> {
    let mut url = base.clone();
    url.path_segments_mut()
        .map_err(|()| PortError::failed(format!("`{base}` cannot be a base url")))?
        .pop_if_empty()
        .extend(segments);
    Ok(url)
}
