use crate::util::{
    read_limited_bytes, validate_url, LimitedReadError, UrlPolicy, UrlValidationError,
};
use reqwest::redirect::Policy;
use std::time::Duration;
use thiserror::Error;

/// Default cap on a single image body (20MB).
pub const DEFAULT_MAX_IMAGE_BYTES: usize = 20 * 1024 * 1024;

/// SEC-004: Redirect hops followed for one image download.
pub const MAX_REDIRECTS: usize = 3;

/// Errors from a single image download.
///
/// Every variant is recoverable at the item boundary: the transformer turns
/// it into a fallback enclosure.
#[derive(Debug, Error)]
pub enum FetchError {
    /// Connection-level failure (DNS, TLS, reset mid-body, ...)
    #[error("Request failed: {0}")]
    Network(#[from] reqwest::Error),
    /// Redirect to a refused URL, a loop, or too many hops
    #[error("Redirect refused: {0}")]
    Redirect(reqwest::Error),
    /// Response with a non-2xx status code
    #[error("HTTP error: status {0}")]
    HttpStatus(u16),
    /// Configured per-image timeout elapsed
    #[error("Request timed out")]
    Timeout,
    /// Body exceeded the configured size limit
    #[error("Response too large")]
    ResponseTooLarge,
    /// URL refused before any request was made
    #[error("Refusing to fetch URL: {0}")]
    InvalidUrl(#[from] UrlValidationError),
}

impl From<LimitedReadError> for FetchError {
    fn from(e: LimitedReadError) -> Self {
        match e {
            LimitedReadError::Network(e) => FetchError::Network(e),
            LimitedReadError::TooLarge(_) => FetchError::ResponseTooLarge,
        }
    }
}

/// Applies the URL policy to every redirect hop, not just the first URL.
///
/// - Limits redirects to [`MAX_REDIRECTS`] hops
/// - Refuses a URL already seen in the chain
fn redirect_policy(url_policy: UrlPolicy) -> Policy {
    Policy::custom(move |attempt| {
        if attempt.previous().len() >= MAX_REDIRECTS {
            return attempt.error("Too many redirects");
        }

        let url = attempt.url();
        if attempt.previous().iter().any(|prev| prev == url) {
            return attempt.error("Redirect loop detected");
        }

        if let Err(e) = validate_url(url.as_str(), url_policy) {
            tracing::warn!(to = %url, error = %e, "Refusing redirect");
            return attempt.error(e);
        }

        tracing::debug!(
            to = %url,
            hop = attempt.previous().len(),
            "Following redirect"
        );
        attempt.follow()
    })
}

/// Settings for a [`MediaFetcher`]. Strict by default: `https` only, public
/// hosts only, no timeout, [`DEFAULT_MAX_IMAGE_BYTES`].
#[derive(Debug, Clone)]
pub struct MediaFetcherBuilder {
    max_bytes: usize,
    timeout: Option<Duration>,
    url_policy: UrlPolicy,
}

impl Default for MediaFetcherBuilder {
    fn default() -> Self {
        Self {
            max_bytes: DEFAULT_MAX_IMAGE_BYTES,
            timeout: None,
            url_policy: UrlPolicy::default(),
        }
    }
}

impl MediaFetcherBuilder {
    pub fn max_bytes(mut self, max_bytes: usize) -> Self {
        self.max_bytes = max_bytes;
        self
    }

    /// `None` waits for the image host indefinitely.
    pub fn timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    /// Permit localhost and private-range hosts (tests, LAN deployments).
    pub fn allow_private_hosts(mut self, allow: bool) -> Self {
        self.url_policy.allow_private = allow;
        self
    }

    /// Permit plain `http` image URLs and redirects.
    pub fn allow_insecure_http(mut self, allow: bool) -> Self {
        self.url_policy.allow_insecure = allow;
        self
    }

    pub fn build(self) -> Result<MediaFetcher, FetchError> {
        self.build_with(reqwest::Client::builder())
    }

    /// Finishes `client` with this fetcher's redirect policy. Any redirect
    /// policy already set on `client` is replaced.
    pub fn build_with(self, client: reqwest::ClientBuilder) -> Result<MediaFetcher, FetchError> {
        let client = client.redirect(redirect_policy(self.url_policy)).build()?;
        Ok(MediaFetcher {
            client,
            max_bytes: self.max_bytes,
            timeout: self.timeout,
            url_policy: self.url_policy,
        })
    }
}

/// Downloads remote images into memory.
///
/// Cloning is cheap; the underlying `reqwest::Client` is reference counted.
/// The client is private to the fetcher so its redirect policy always matches
/// the fetcher's URL policy.
#[derive(Debug, Clone)]
pub struct MediaFetcher {
    client: reqwest::Client,
    max_bytes: usize,
    timeout: Option<Duration>,
    url_policy: UrlPolicy,
}

impl MediaFetcher {
    pub fn builder() -> MediaFetcherBuilder {
        MediaFetcherBuilder::default()
    }

    /// Fetches `url` with a single GET and returns the whole body.
    ///
    /// # Errors
    ///
    /// - [`FetchError::InvalidUrl`] - not https (unless allowed), or an internal host
    /// - [`FetchError::Redirect`] - a hop failed the same checks, looped, or went over the hop limit
    /// - [`FetchError::HttpStatus`] - non-2xx response
    /// - [`FetchError::Network`] - transport failure before or during the body
    /// - [`FetchError::Timeout`] - only when a timeout is configured
    /// - [`FetchError::ResponseTooLarge`] - body over the size limit
    pub async fn fetch(&self, url: &str) -> Result<Vec<u8>, FetchError> {
        let parsed = validate_url(url, self.url_policy)?;

        match self.timeout {
            Some(limit) => tokio::time::timeout(limit, self.fetch_unbounded(parsed))
                .await
                .map_err(|_| FetchError::Timeout)?,
            None => self.fetch_unbounded(parsed).await,
        }
    }

    async fn fetch_unbounded(&self, url: url::Url) -> Result<Vec<u8>, FetchError> {
        let response = self.client.get(url).send().await.map_err(|e| {
            if e.is_redirect() {
                FetchError::Redirect(e)
            } else {
                FetchError::Network(e)
            }
        })?;

        if !response.status().is_success() {
            return Err(FetchError::HttpStatus(response.status().as_u16()));
        }

        Ok(read_limited_bytes(response, self.max_bytes).await?)
    }
}
