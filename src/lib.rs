//! rssok: an RSS proxy that republishes a channel's feed with its images
//! harvested into a local content directory.
//!
//! - [`feed`] - upstream retrieval, parsing, transformation and serialization
//! - [`media`] - image fetching, format sniffing and the content directory
//! - [`server`] - the axum router exposing the feed and `/images/` routes
//! - [`config`] - TOML/env/CLI configuration
//! - [`clock`] - injectable wall clock

pub mod clock;
pub mod config;
pub mod feed;
pub mod media;
pub mod server;
pub mod util;
