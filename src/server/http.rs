//! Routes:
//! - `GET /images/<filename>` - a harvested image, content type sniffed from its bytes
//! - anything else - the republished feed for `?channel=<id>`

use axum::{
    extract::{rejection::QueryRejection, Path, Query, State},
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    routing::get,
    Router,
};
use serde::Deserialize;
use std::sync::Arc;
use thiserror::Error;

use crate::feed::{self, FeedError, FeedSource, FeedTransformer, UpstreamError};
use crate::media::{self, MediaStore};

/// Body of every failed feed response. Never includes error details.
pub const FEED_ERROR_BODY: &str = "Error generating RSS feed.";
/// Body of a `/images/` miss.
pub const IMAGE_NOT_FOUND_BODY: &str = "Image not found";

const FEED_CONTENT_TYPE: &str = "application/xml";
const IMAGE_CACHE_CONTROL: &str = "public, max-age=31536000, immutable";

/// Shared handler state. Cloned per request; every field is a cheap handle.
#[derive(Clone)]
pub struct AppState {
    pub source: Arc<dyn FeedSource>,
    pub transformer: Arc<FeedTransformer>,
    pub store: MediaStore,
    pub default_channel: Arc<str>,
}

/// Errors that fail a feed request as a whole.
#[derive(Debug, Error)]
enum ProxyError {
    #[error("upstream fetch failed: {0}")]
    Upstream(#[from] UpstreamError),
    #[error(transparent)]
    Feed(#[from] FeedError),
}

#[derive(Debug, Deserialize)]
pub struct FeedQuery {
    pub channel: Option<String>,
}

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/images", get(image_not_found))
        .route("/images/", get(image_not_found))
        .route("/images/*path", get(image_handler))
        .fallback(feed_handler)
        .with_state(state)
}

/// Serves the republished feed.
async fn feed_handler(
    State(state): State<AppState>,
    query: Result<Query<FeedQuery>, QueryRejection>,
) -> Response {
    // A malformed query is a failed feed request like any other
    let Query(query) = match query {
        Ok(query) => query,
        Err(rejection) => {
            tracing::error!(error = %rejection, "Rejected feed query");
            return feed_error();
        }
    };

    let channel = query
        .channel
        .filter(|c| !c.trim().is_empty())
        .unwrap_or_else(|| state.default_channel.to_string());

    match build_feed(&state, &channel).await {
        Ok((xml, item_count)) => {
            tracing::info!(channel = %channel, items = item_count, "Served feed");
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, HeaderValue::from_static(FEED_CONTENT_TYPE)),
                    (header::ACCESS_CONTROL_ALLOW_ORIGIN, HeaderValue::from_static("*")),
                ],
                xml,
            )
                .into_response()
        }
        Err(e) => {
            tracing::error!(channel = %channel, error = %e, "Error processing RSS");
            feed_error()
        }
    }
}

fn feed_error() -> Response {
    (StatusCode::INTERNAL_SERVER_ERROR, FEED_ERROR_BODY).into_response()
}

async fn build_feed(state: &AppState, channel: &str) -> Result<(String, usize), ProxyError> {
    let markup = state.source.fetch(channel).await?;
    let doc = state.transformer.transform(channel, &markup).await?;
    let xml = feed::to_xml(&doc)?;
    Ok((xml, doc.channel.items.len()))
}

/// Serves a stored image with its sniffed content type.
async fn image_handler(State(state): State<AppState>, Path(path): Path<String>) -> Response {
    match state.store.read(&path).await {
        Ok(bytes) => {
            let mime = media::detect(&bytes).mime_type();
            (
                StatusCode::OK,
                [
                    (header::CONTENT_TYPE, HeaderValue::from_static(mime)),
                    (header::CACHE_CONTROL, HeaderValue::from_static(IMAGE_CACHE_CONTROL)),
                ],
                bytes,
            )
                .into_response()
        }
        Err(e) => {
            tracing::debug!(path = %path, error = %e, "Image lookup failed");
            image_not_found().await
        }
    }
}

async fn image_not_found() -> Response {
    (StatusCode::NOT_FOUND, IMAGE_NOT_FOUND_BODY).into_response()
}
