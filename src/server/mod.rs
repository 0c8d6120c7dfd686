//! HTTP surface of the proxy.

mod http;

pub use http::{create_router, AppState, FEED_ERROR_BODY, IMAGE_NOT_FOUND_BODY};
