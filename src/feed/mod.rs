//! Feed handling from upstream markup to republished document.
//!
//! - [`upstream`] - the [`FeedSource`] seam and its HTTP bridge implementation
//! - [`parser`] - upstream RSS markup into a [`SourceChannel`]
//! - [`transform`] - normalization and per-item image harvesting
//! - [`writer`] - [`FeedDocument`] back to RSS 2.0 markup
//!
//! # Example
//!
//! ```ignore
//! let markup = source.fetch("durov").await?;
//! let doc = transformer.transform("durov", &markup).await?;
//! let xml = feed::to_xml(&doc)?;
//! ```

mod model;
pub mod parser;
pub mod transform;
pub mod upstream;
mod writer;

use thiserror::Error;

pub use model::{Channel, Enclosure, FeedDocument, Item, SourceChannel, SourceItem, ATOM_NAMESPACE};
pub use parser::parse_channel;
pub use transform::FeedTransformer;
pub use upstream::{FeedSource, HttpFeedSource, UpstreamError};
pub use writer::to_xml;

/// Errors reading upstream markup or writing the output document.
#[derive(Debug, Error)]
pub enum FeedError {
    /// Markup is not well-formed XML
    #[error("Parse error: {0}")]
    Parse(String),
    /// Well-formed, but no `<rss><channel>`
    #[error("Feed has no <rss><channel> element")]
    MissingChannel,
    /// SEC-003: Nesting depth exceeds safety limit
    #[error("Feed nesting depth exceeds maximum of {0} levels")]
    TooDeep(usize),
    #[error("Failed to serialize feed: {0}")]
    Serialize(String),
}
