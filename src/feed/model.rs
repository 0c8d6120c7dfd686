use chrono::{DateTime, Utc};

/// Namespace bound to the `atom:` prefix on the output `<rss>` root.
pub const ATOM_NAMESPACE: &str = "http://www.w3.org/2005/Atom";

/// Feed document produced for one request. Always holds exactly one channel.
#[derive(Debug, Clone, PartialEq)]
pub struct FeedDocument {
    pub channel: Channel,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Channel {
    pub title: String,
    pub link: String,
    pub description: String,
    pub pub_date: DateTime<Utc>,
    pub last_build_date: DateTime<Utc>,
    /// `<atom:link rel="self" type="application/rss+xml" href="...">`
    pub self_link: String,
    pub items: Vec<Item>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Item {
    pub title: String,
    pub description: String,
    pub pub_date: DateTime<Utc>,
    /// Canonical post link, also emitted as the `<guid>`
    pub link: Option<String>,
    pub enclosure: Option<Enclosure>,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Enclosure {
    pub url: String,
    pub mime_type: String,
    pub length: u64,
}

/// Channel as read from upstream markup, before normalization.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceChannel {
    pub title: Option<String>,
    pub items: Vec<SourceItem>,
}

/// Item as read from upstream markup. Fields are raw text.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceItem {
    pub title: Option<String>,
    pub description: Option<String>,
    pub pub_date: Option<String>,
    pub link: Option<String>,
    pub image_url: Option<String>,
}
