//! Image harvesting: download, identify, persist.
//!
//! - [`sniff`] - format detection from magic bytes, no I/O
//! - [`fetcher`] - single-attempt HTTP download into memory
//! - [`store`] - the content directory on disk

mod fetcher;
pub mod sniff;
mod store;

pub use fetcher::{
    FetchError, MediaFetcher, MediaFetcherBuilder, DEFAULT_MAX_IMAGE_BYTES, MAX_REDIRECTS,
};
pub use sniff::{detect, extension_for, ImageFormat};
pub use store::{is_valid_media_name, LookupError, MediaDescriptor, MediaStore, StorageError};

use thiserror::Error;

/// Any failure in the fetch → store pipeline for one item.
#[derive(Debug, Error)]
pub enum MediaError {
    #[error(transparent)]
    Fetch(#[from] FetchError),
    #[error(transparent)]
    Storage(#[from] StorageError),
}

/// Downloads `url` and stores it under `logical_name`.
pub async fn harvest(
    fetcher: &MediaFetcher,
    store: &MediaStore,
    url: &str,
    logical_name: &str,
) -> Result<MediaDescriptor, MediaError> {
    let bytes = fetcher.fetch(url).await?;
    Ok(store.store(&bytes, logical_name).await?)
}
