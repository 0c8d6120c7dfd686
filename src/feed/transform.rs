use super::model::{Channel, Enclosure, FeedDocument, Item, SourceItem};
use super::parser::parse_channel;
use super::FeedError;
use crate::clock::{parse_pub_date, Clock};
use crate::media::{self, MediaDescriptor, MediaError, MediaFetcher, MediaStore};
use chrono::{DateTime, Utc};
use futures::future::join_all;
use std::sync::Arc;

/// Channel title used when upstream provides none.
pub const CHANNEL_TITLE_PLACEHOLDER: &str = "Telegram Channel";
/// Every republished item is titled with this label.
pub const ITEM_TITLE: &str = "[Photo]";
/// Public viewing URL of a channel is this prefix plus the channel id.
pub const CHANNEL_LINK_BASE: &str = "https://t.me/";
/// Route under which harvested images are served.
pub const MEDIA_ROUTE_PREFIX: &str = "/images/";
/// Declared type of an enclosure that still points at the remote image.
pub const FALLBACK_MIME_TYPE: &str = "image/jpeg";

/// Result of one item's media pipeline.
#[derive(Debug)]
enum MediaOutcome {
    /// Image stored locally
    Hosted(MediaDescriptor),
    /// Download or write failed; keep the remote reference
    Remote,
}

/// Rebuilds an upstream channel into the proxy's feed.
///
/// Owns handles to the media fetcher, the content directory and a clock;
/// holds no per-request state, so one instance serves all requests.
pub struct FeedTransformer {
    fetcher: MediaFetcher,
    store: MediaStore,
    clock: Arc<dyn Clock>,
    media_base_url: String,
}

impl FeedTransformer {
    /// `media_base_url` is the public origin the server is reachable at, e.g.
    /// `https://rss.example.com`. A trailing slash is ignored.
    pub fn new(
        fetcher: MediaFetcher,
        store: MediaStore,
        clock: Arc<dyn Clock>,
        media_base_url: impl Into<String>,
    ) -> Self {
        let media_base_url = media_base_url.into().trim_end_matches('/').to_string();
        Self {
            fetcher,
            store,
            clock,
            media_base_url,
        }
    }

    /// Public URL of a stored image.
    pub fn media_url(&self, filename: &str) -> String {
        format!("{}{}{}", self.media_base_url, MEDIA_ROUTE_PREFIX, filename)
    }

    /// Parses `markup` and rebuilds it for `channel_id`.
    ///
    /// Channel metadata is normalized and every item's image is harvested
    /// concurrently. Per-item media failures degrade that item's enclosure;
    /// only a parse failure fails the whole transform.
    ///
    /// # Errors
    ///
    /// Returns [`FeedError`] when `markup` is not a well-formed RSS channel.
    pub async fn transform(
        &self,
        channel_id: &str,
        markup: &str,
    ) -> Result<FeedDocument, FeedError> {
        let source = parse_channel(markup)?;
        let now = self.clock.now();

        let title = source
            .title
            .map(|t| t.trim().to_string())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| CHANNEL_TITLE_PLACEHOLDER.to_string());

        // join_all keeps input order regardless of completion order
        let items = join_all(
            source
                .items
                .into_iter()
                .enumerate()
                .map(|(index, item)| self.transform_item(index, item, now)),
        )
        .await;

        Ok(FeedDocument {
            channel: Channel {
                title,
                link: format!("{}{}", CHANNEL_LINK_BASE, channel_id),
                description: String::new(),
                pub_date: now,
                last_build_date: now,
                self_link: String::new(),
                items,
            },
        })
    }

    async fn transform_item(&self, index: usize, source: SourceItem, now: DateTime<Utc>) -> Item {
        let pub_date = source
            .pub_date
            .as_deref()
            .and_then(parse_pub_date)
            .unwrap_or(now);
        let description = source.description.or(source.title).unwrap_or_default();

        let enclosure = match source.image_url {
            Some(url) => {
                let outcome = self.harvest(index, &url).await;
                Some(self.enclosure(outcome, url))
            }
            None => None,
        };

        Item {
            title: ITEM_TITLE.to_string(),
            description,
            pub_date,
            link: source.link,
            enclosure,
        }
    }

    async fn harvest(&self, index: usize, url: &str) -> MediaOutcome {
        // Fetch-time name; the index keeps same-millisecond siblings apart
        let logical_name = format!("{}-{}", self.clock.now().timestamp_millis(), index);

        match media::harvest(&self.fetcher, &self.store, url, &logical_name).await {
            Ok(descriptor) => MediaOutcome::Hosted(descriptor),
            Err(e) => {
                let stage = match &e {
                    MediaError::Fetch(_) => "fetch",
                    MediaError::Storage(_) => "store",
                };
                tracing::warn!(
                    url = %url,
                    stage = stage,
                    error = %e,
                    "Image harvest failed, keeping remote URL"
                );
                MediaOutcome::Remote
            }
        }
    }

    fn enclosure(&self, outcome: MediaOutcome, remote_url: String) -> Enclosure {
        match outcome {
            MediaOutcome::Hosted(descriptor) => Enclosure {
                url: self.media_url(&descriptor.filename),
                mime_type: descriptor.mime_type().to_string(),
                length: descriptor.size,
            },
            MediaOutcome::Remote => Enclosure {
                url: remote_url,
                mime_type: FALLBACK_MIME_TYPE.to_string(),
                length: 0,
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::FixedClock;
    use chrono::TimeZone;
    use pretty_assertions::assert_eq;
    use std::time::Duration;
    use wiremock::matchers::{method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    const JPEG_BYTES: &[u8] = &[0xFF, 0xD8, 0xFF, 0xE0, 0x00, 0x10];
    const PNG_BYTES: &[u8] = &[0x89, 0x50, 0x4E, 0x47, 0x0D, 0x0A, 0x1A, 0x0A];
    const BASE_URL: &str = "https://rss.example.com/";

    fn fixed_now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 10, 17, 12, 0, 0).unwrap()
    }

    fn transformer_with(dir: &std::path::Path, fetcher: MediaFetcher) -> FeedTransformer {
        FeedTransformer::new(
            fetcher,
            MediaStore::new(dir),
            Arc::new(FixedClock(fixed_now())),
            BASE_URL,
        )
    }

    /// wiremock serves plain http on 127.0.0.1
    fn transformer(dir: &std::path::Path) -> FeedTransformer {
        let fetcher = MediaFetcher::builder()
            .allow_private_hosts(true)
            .allow_insecure_http(true)
            .build()
            .unwrap();
        transformer_with(dir, fetcher)
    }

    fn item_xml(link: &str, image: Option<&str>) -> String {
        let image = image
            .map(|url| format!("<image><url>{}</url></image>", url))
            .unwrap_or_default();
        format!(
            "<item><title>post</title><description>caption</description>\
             <link>{}</link>{}</item>",
            link, image
        )
    }

    fn rss(title: &str, items: &[String]) -> String {
        format!(
            r#"<?xml version="1.0"?><rss version="2.0"><channel><title>{}</title>{}</channel></rss>"#,
            title,
            items.concat()
        )
    }

    async fn mount_image(server: &MockServer, route: &str, bytes: &[u8], delay_ms: u64) {
        Mock::given(method("GET"))
            .and(path(route))
            .respond_with(
                ResponseTemplate::new(200)
                    .set_body_bytes(bytes.to_vec())
                    .set_delay(Duration::from_millis(delay_ms)),
            )
            .mount(server)
            .await;
    }

    #[test]
    fn test_media_url_ignores_trailing_slash() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(
            transformer(dir.path()).media_url("1-0.jpg"),
            "https://rss.example.com/images/1-0.jpg"
        );
    }

    #[tokio::test]
    async fn test_channel_metadata_normalized() {
        let dir = tempfile::tempdir().unwrap();
        let doc = transformer(dir.path())
            .transform("durov", &rss("Durov", &[]))
            .await
            .unwrap();

        assert_eq!(doc.channel.title, "Durov");
        assert_eq!(doc.channel.link, "https://t.me/durov");
        assert_eq!(doc.channel.description, "");
        assert_eq!(doc.channel.pub_date, fixed_now());
        assert_eq!(doc.channel.last_build_date, fixed_now());
        assert_eq!(doc.channel.self_link, "");
        assert!(doc.channel.items.is_empty());
    }

    #[tokio::test]
    async fn test_missing_title_uses_placeholder() {
        let dir = tempfile::tempdir().unwrap();
        let markup = r#"<rss><channel><title>  </title></channel></rss>"#;
        let doc = transformer(dir.path()).transform("x", markup).await.unwrap();
        assert_eq!(doc.channel.title, CHANNEL_TITLE_PLACEHOLDER);
    }

    #[tokio::test]
    async fn test_parse_error_aborts() {
        let dir = tempfile::tempdir().unwrap();
        let result = transformer(dir.path()).transform("x", "<rss><channel>").await;
        assert!(matches!(result, Err(FeedError::Parse(_))));
    }

    #[tokio::test]
    async fn test_image_localized() {
        let server = MockServer::start().await;
        mount_image(&server, "/a.png", PNG_BYTES, 0).await;
        let dir = tempfile::tempdir().unwrap();

        let markup = rss(
            "T",
            &[item_xml(
                "https://t.me/c/1",
                Some(&format!("{}/a.png", server.uri())),
            )],
        );
        let doc = transformer(dir.path()).transform("c", &markup).await.unwrap();

        let item = &doc.channel.items[0];
        let expected_name = format!("{}-0.png", fixed_now().timestamp_millis());
        assert_eq!(item.title, ITEM_TITLE);
        assert_eq!(
            item.enclosure,
            Some(Enclosure {
                url: format!("https://rss.example.com/images/{}", expected_name),
                mime_type: "image/png".into(),
                length: PNG_BYTES.len() as u64,
            })
        );
        assert_eq!(std::fs::read(dir.path().join(expected_name)).unwrap(), PNG_BYTES);
    }

    #[tokio::test]
    async fn test_failed_fetch_falls_back_to_remote_url() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(404))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let remote = format!("{}/gone.jpg", server.uri());

        let markup = rss("T", &[item_xml("https://t.me/c/1", Some(&remote))]);
        let doc = transformer(dir.path()).transform("c", &markup).await.unwrap();

        let item = &doc.channel.items[0];
        assert_eq!(item.title, ITEM_TITLE);
        assert_eq!(item.link.as_deref(), Some("https://t.me/c/1"));
        assert_eq!(
            item.enclosure,
            Some(Enclosure {
                url: remote,
                mime_type: FALLBACK_MIME_TYPE.into(),
                length: 0,
            })
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_plain_http_image_falls_back_by_default() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(200).set_body_bytes(PNG_BYTES.to_vec()))
            .expect(0)
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();
        let remote = format!("{}/a.png", server.uri());
        let https_only = MediaFetcher::builder()
            .allow_private_hosts(true)
            .build()
            .unwrap();

        let markup = rss("T", &[item_xml("https://t.me/c/1", Some(&remote))]);
        let doc = transformer_with(dir.path(), https_only)
            .transform("c", &markup)
            .await
            .unwrap();

        assert_eq!(
            doc.channel.items[0].enclosure,
            Some(Enclosure {
                url: remote,
                mime_type: FALLBACK_MIME_TYPE.into(),
                length: 0,
            })
        );
        assert_eq!(std::fs::read_dir(dir.path()).unwrap().count(), 0);
    }

    #[tokio::test]
    async fn test_storage_failure_falls_back() {
        let server = MockServer::start().await;
        mount_image(&server, "/a.jpg", JPEG_BYTES, 0).await;
        let dir = tempfile::tempdir().unwrap();
        let missing_dir = dir.path().join("not-created");
        let remote = format!("{}/a.jpg", server.uri());

        let markup = rss("T", &[item_xml("https://t.me/c/1", Some(&remote))]);
        let doc = transformer(&missing_dir)
            .transform("c", &markup)
            .await
            .unwrap();

        let enclosure = doc.channel.items[0].enclosure.as_ref().unwrap();
        assert_eq!(enclosure.url, remote);
        assert_eq!(enclosure.length, 0);
    }

    #[tokio::test]
    async fn test_item_without_image_has_no_enclosure() {
        let dir = tempfile::tempdir().unwrap();
        let markup = rss("T", &[item_xml("https://t.me/c/1", None)]);
        let doc = transformer(dir.path()).transform("c", &markup).await.unwrap();

        let item = &doc.channel.items[0];
        assert_eq!(item.title, ITEM_TITLE);
        assert_eq!(item.enclosure, None);
    }

    #[tokio::test]
    async fn test_order_preserved_when_first_fetch_is_slowest() {
        let server = MockServer::start().await;
        mount_image(&server, "/0.jpg", JPEG_BYTES, 400).await;
        mount_image(&server, "/1.png", PNG_BYTES, 0).await;
        mount_image(&server, "/2.jpg", JPEG_BYTES, 50).await;
        let dir = tempfile::tempdir().unwrap();

        let items: Vec<String> = ["0.jpg", "1.png", "2.jpg"]
            .iter()
            .enumerate()
            .map(|(i, name)| {
                item_xml(
                    &format!("https://t.me/c/{}", i),
                    Some(&format!("{}/{}", server.uri(), name)),
                )
            })
            .collect();
        let doc = transformer(dir.path())
            .transform("c", &rss("T", &items))
            .await
            .unwrap();

        let links: Vec<_> = doc
            .channel
            .items
            .iter()
            .map(|i| i.link.clone().unwrap())
            .collect();
        assert_eq!(
            links,
            ["https://t.me/c/0", "https://t.me/c/1", "https://t.me/c/2"]
        );
        let types: Vec<_> = doc
            .channel
            .items
            .iter()
            .map(|i| i.enclosure.as_ref().unwrap().mime_type.clone())
            .collect();
        assert_eq!(types, ["image/jpeg", "image/png", "image/jpeg"]);
    }

    #[tokio::test]
    async fn test_one_failure_does_not_affect_siblings() {
        let server = MockServer::start().await;
        mount_image(&server, "/ok.png", PNG_BYTES, 0).await;
        Mock::given(method("GET"))
            .and(path("/bad.jpg"))
            .respond_with(ResponseTemplate::new(500))
            .mount(&server)
            .await;
        let dir = tempfile::tempdir().unwrap();

        let markup = rss(
            "T",
            &[
                item_xml("https://t.me/c/1", Some(&format!("{}/bad.jpg", server.uri()))),
                item_xml("https://t.me/c/2", Some(&format!("{}/ok.png", server.uri()))),
            ],
        );
        let doc = transformer(dir.path()).transform("c", &markup).await.unwrap();

        let first = doc.channel.items[0].enclosure.as_ref().unwrap();
        let second = doc.channel.items[1].enclosure.as_ref().unwrap();
        assert_eq!(first.length, 0);
        assert_eq!(second.mime_type, "image/png");
        assert!(second.url.starts_with("https://rss.example.com/images/"));
    }

    #[tokio::test]
    async fn test_pub_date_preserved_or_defaulted() {
        let dir = tempfile::tempdir().unwrap();
        let markup = r#"<rss><channel>
            <item><pubDate>Tue, 02 Jan 2024 03:04:05 GMT</pubDate></item>
            <item><pubDate>not a date</pubDate></item>
            <item></item>
        </channel></rss>"#;
        let doc = transformer(dir.path()).transform("c", markup).await.unwrap();

        let dates: Vec<_> = doc.channel.items.iter().map(|i| i.pub_date).collect();
        assert_eq!(
            dates,
            [
                Utc.with_ymd_and_hms(2024, 1, 2, 3, 4, 5).unwrap(),
                fixed_now(),
                fixed_now()
            ]
        );
    }

    #[tokio::test]
    async fn test_description_falls_back_to_title() {
        let dir = tempfile::tempdir().unwrap();
        let markup = r#"<rss><channel>
            <item><title>only title</title></item>
            <item><title>t</title><description>d</description></item>
            <item></item>
        </channel></rss>"#;
        let doc = transformer(dir.path()).transform("c", markup).await.unwrap();

        let descriptions: Vec<_> = doc
            .channel
            .items
            .iter()
            .map(|i| i.description.as_str())
            .collect();
        assert_eq!(descriptions, ["only title", "d", ""]);
        assert!(doc.channel.items.iter().all(|i| i.title == ITEM_TITLE));
    }

    #[tokio::test]
    async fn test_empty_description_is_not_replaced_by_title() {
        let dir = tempfile::tempdir().unwrap();
        let markup = r#"<rss><channel>
            <item><title>a</title><description></description></item>
            <item><title>b</title><description/></item>
        </channel></rss>"#;
        let doc = transformer(dir.path()).transform("c", markup).await.unwrap();

        let descriptions: Vec<_> = doc
            .channel
            .items
            .iter()
            .map(|i| i.description.as_str())
            .collect();
        assert_eq!(descriptions, ["", ""]);
    }
}
