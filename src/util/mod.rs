//! Small shared helpers.
//!
//! - **URL validation**: SSRF guard for URLs lifted out of upstream feeds
//! - **Bounded reads**: response bodies buffered under a size cap
//! - **Channel ids**: the identifier shape accepted on `?channel=`

mod http;
mod url_validator;

pub use http::{read_limited_bytes, LimitedReadError};
pub use url_validator::{validate_url, UrlPolicy, UrlValidationError};

/// Longest channel identifier accepted from a request.
pub const MAX_CHANNEL_ID_LENGTH: usize = 64;

/// Channel identifiers are public usernames: ASCII letters, digits and `_`.
pub fn is_valid_channel_id(id: &str) -> bool {
    !id.is_empty()
        && id.len() <= MAX_CHANNEL_ID_LENGTH
        && id.chars().all(|c| c.is_ascii_alphanumeric() || c == '_')
}
