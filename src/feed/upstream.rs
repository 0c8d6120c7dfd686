use crate::util::{is_valid_channel_id, read_limited_bytes, LimitedReadError};
use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

/// Placeholder substituted with the channel id in [`HttpFeedSource`] templates.
pub const CHANNEL_PLACEHOLDER: &str = "{channel}";

/// Default bound on one whole upstream fetch, body included.
pub const UPSTREAM_TIMEOUT: Duration = Duration::from_secs(30);
const MAX_FEED_SIZE: usize = 10 * 1024 * 1024; // 10MB

/// Failure to obtain a channel's raw feed markup. Fatal to the request.
#[derive(Debug, Error)]
pub enum UpstreamError {
    #[error("Invalid channel id: {0:?}")]
    InvalidChannel(String),
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    #[error("Request timed out")]
    Timeout,
    #[error("Response too large")]
    ResponseTooLarge,
    #[error("Invalid UTF-8 in feed body")]
    InvalidUtf8,
}

impl From<LimitedReadError> for UpstreamError {
    fn from(e: LimitedReadError) -> Self {
        match e {
            LimitedReadError::Network(e) => UpstreamError::Network(e),
            LimitedReadError::TooLarge(_) => UpstreamError::ResponseTooLarge,
        }
    }
}

/// Produces raw RSS markup for a channel.
#[async_trait]
pub trait FeedSource: Send + Sync {
    async fn fetch(&self, channel_id: &str) -> Result<String, UpstreamError>;
}

/// Fetches channel feeds from an RSS bridge over HTTP.
///
/// The URL template must contain `{channel}`, e.g.
/// `https://rsshub.app/telegram/channel/{channel}`.
#[derive(Debug, Clone)]
pub struct HttpFeedSource {
    client: reqwest::Client,
    url_template: String,
    timeout: Duration,
}

impl HttpFeedSource {
    pub fn new(client: reqwest::Client, url_template: impl Into<String>) -> Self {
        Self {
            client,
            url_template: url_template.into(),
            timeout: UPSTREAM_TIMEOUT,
        }
    }

    /// Replaces [`UPSTREAM_TIMEOUT`].
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn feed_url(&self, channel_id: &str) -> Result<String, UpstreamError> {
        if !is_valid_channel_id(channel_id) {
            return Err(UpstreamError::InvalidChannel(channel_id.to_string()));
        }
        Ok(self.url_template.replace(CHANNEL_PLACEHOLDER, channel_id))
    }

    async fn fetch_body(&self, url: &str) -> Result<Vec<u8>, UpstreamError> {
        let response = self.client.get(url).send().await?;

        if !response.status().is_success() {
            return Err(UpstreamError::HttpStatus(response.status().as_u16()));
        }

        Ok(read_limited_bytes(response, MAX_FEED_SIZE).await?)
    }
}

#[async_trait]
impl FeedSource for HttpFeedSource {
    /// Single GET, no retries. The timeout covers the body as well as the
    /// headers, so a bridge that stalls mid-body still fails the request.
    async fn fetch(&self, channel_id: &str) -> Result<String, UpstreamError> {
        let url = self.feed_url(channel_id)?;

        let bytes = tokio::time::timeout(self.timeout, self.fetch_body(&url))
            .await
            .map_err(|_| UpstreamError::Timeout)??;

        tracing::debug!(channel = %channel_id, bytes = bytes.len(), "Fetched upstream feed");
        String::from_utf8(bytes).map_err(|_| UpstreamError::InvalidUtf8)
    }
}
