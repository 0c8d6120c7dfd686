use futures::StreamExt;
use thiserror::Error;

/// Failure while buffering a response body.
#[derive(Debug, Error)]
pub enum LimitedReadError {
    #[error("Body read failed: {0}")]
    Network(#[from] reqwest::Error),
    #[error("Response exceeds {0} bytes")]
    TooLarge(usize),
}

/// Buffers a whole response body, refusing anything over `limit` bytes.
///
/// A declared Content-Length over the limit fails before any chunk is read;
/// otherwise the running total is checked per chunk, so a lying or missing
/// header cannot push memory use past `limit`.
pub async fn read_limited_bytes(
    response: reqwest::Response,
    limit: usize,
) -> Result<Vec<u8>, LimitedReadError> {
    if let Some(len) = response.content_length() {
        if len > limit as u64 {
            return Err(LimitedReadError::TooLarge(limit));
        }
    }

    let mut bytes = Vec::new();
    let mut stream = response.bytes_stream();

    while let Some(chunk) = stream.next().await {
        let chunk = chunk?;
        if bytes.len().saturating_add(chunk.len()) > limit {
            return Err(LimitedReadError::TooLarge(limit));
        }
        bytes.extend_from_slice(&chunk);
    }

    Ok(bytes)
}
