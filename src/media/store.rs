use super::sniff::{self, ImageFormat};
use std::path::{Path, PathBuf};
use thiserror::Error;

/// Longest filename accepted by [`MediaStore::read`].
const MAX_NAME_LEN: usize = 255;

/// Failure to persist an image.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("Failed to write '{}': {source}", .path.display())]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("Invalid media name: {0}")]
    InvalidName(String),
}

/// Failure to look up a stored image for serving.
#[derive(Debug, Error)]
pub enum LookupError {
    #[error("Image not found")]
    NotFound,
}

/// What was written for one stored image.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaDescriptor {
    /// Final on-disk name, including the sniffed extension
    pub filename: String,
    /// Byte length of the stored buffer
    pub size: u64,
    pub format: ImageFormat,
}

impl MediaDescriptor {
    pub fn mime_type(&self) -> &'static str {
        self.format.mime_type()
    }
}

/// Handle to the content directory holding harvested images.
///
/// The directory is flat and append-only: no index, no eviction. A store is
/// cheap to clone and is shared between the transformer and the `/images/`
/// route.
#[derive(Debug, Clone)]
pub struct MediaStore {
    dir: PathBuf,
}

impl MediaStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Creates the content directory if it does not exist yet.
    pub async fn ensure_dir(&self) -> std::io::Result<()> {
        if tokio::fs::metadata(&self.dir).await.is_err() {
            tokio::fs::create_dir_all(&self.dir).await?;
            tracing::info!(path = %self.dir.display(), "Created content directory");
        }
        Ok(())
    }

    /// Writes `bytes` as `<logical_name minus extension><sniffed extension>`.
    ///
    /// An existing file with the same final name is replaced.
    pub async fn store(
        &self,
        bytes: &[u8],
        logical_name: &str,
    ) -> Result<MediaDescriptor, StorageError> {
        let format = sniff::detect(bytes);
        let filename = format!("{}{}", strip_extension(logical_name), format.extension());
        if !is_valid_media_name(&filename) {
            return Err(StorageError::InvalidName(logical_name.to_string()));
        }

        let path = self.dir.join(&filename);
        tokio::fs::write(&path, bytes)
            .await
            .map_err(|source| StorageError::Io {
                path: path.clone(),
                source,
            })?;

        tracing::debug!(
            file = %filename,
            size = bytes.len(),
            mime = format.mime_type(),
            "Stored image"
        );

        Ok(MediaDescriptor {
            filename,
            size: bytes.len() as u64,
            format,
        })
    }

    /// Reads a previously stored image. Any name that is not a plain file in
    /// the content directory is reported as [`LookupError::NotFound`].
    pub async fn read(&self, filename: &str) -> Result<Vec<u8>, LookupError> {
        if !is_valid_media_name(filename) {
            return Err(LookupError::NotFound);
        }
        tokio::fs::read(self.dir.join(filename))
            .await
            .map_err(|_| LookupError::NotFound)
    }
}

/// Drops a trailing `.ext` from the last path segment, if any.
fn strip_extension(name: &str) -> &str {
    match name.rfind('.') {
        Some(dot) if dot > 0 && dot + 1 < name.len() && !name[dot + 1..].contains('/') => {
            &name[..dot]
        }
        _ => name,
    }
}

/// Single path segment of `[A-Za-z0-9._-]`, not starting with a dot.
pub fn is_valid_media_name(name: &str) -> bool {
    !name.is_empty()
        && name.len() <= MAX_NAME_LEN
        && !name.starts_with('.')
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '.' | '_' | '-'))
}
