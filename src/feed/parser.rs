use super::model::{SourceChannel, SourceItem};
use super::FeedError;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;

/// SEC-003: Maximum element nesting accepted from upstream markup.
pub const MAX_FEED_DEPTH: usize = 64;

const CHANNEL: &[&str] = &["rss", "channel"];
const CHANNEL_TITLE: &[&str] = &["rss", "channel", "title"];
const ITEM: &[&str] = &["rss", "channel", "item"];
const ITEM_DESCRIPTION: &[&str] = &["rss", "channel", "item", "description"];
const ITEM_ENCLOSURE: &[&str] = &["rss", "channel", "item", "enclosure"];
const ITEM_IMAGE_URL: &[&str] = &["rss", "channel", "item", "image", "url"];

/// Item under construction. Keeps the enclosure candidate apart so that an
/// `<image><url>` child wins regardless of element order.
#[derive(Default)]
struct PendingItem {
    item: SourceItem,
    image_closed: bool,
    enclosure_image: Option<String>,
}

impl PendingItem {
    fn finish(self) -> SourceItem {
        let PendingItem {
            mut item,
            enclosure_image,
            ..
        } = self;
        item.title = non_blank(item.title);
        item.pub_date = non_blank(item.pub_date);
        item.link = non_blank(item.link);
        item.description = item.description.map(|d| d.trim().to_string());
        item.image_url = non_blank(item.image_url).or_else(|| non_blank(enclosure_image));
        item
    }
}

fn non_blank(value: Option<String>) -> Option<String> {
    value
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

#[derive(Default)]
struct ParseState {
    path: Vec<String>,
    channel: Option<SourceChannel>,
    item: Option<PendingItem>,
}

impl ParseState {
    fn under(&self, prefix: &[&str]) -> bool {
        self.path.len() >= prefix.len() && self.path.iter().zip(prefix).all(|(a, b)| a == b)
    }

    fn at(&self, expected: &[&str]) -> bool {
        self.path.len() == expected.len() && self.under(expected)
    }

    fn open(&mut self, e: &BytesStart<'_>, reader: &Reader<&[u8]>) -> Result<(), FeedError> {
        if self.path.len() >= MAX_FEED_DEPTH {
            return Err(FeedError::TooDeep(MAX_FEED_DEPTH));
        }
        self.path
            .push(String::from_utf8_lossy(e.name().as_ref()).into_owned());

        if self.at(CHANNEL) {
            self.channel.get_or_insert_with(SourceChannel::default);
        } else if self.at(ITEM) {
            self.item = Some(PendingItem::default());
        } else if self.at(ITEM_DESCRIPTION) {
            // Present but empty is still a description; no Text event follows
            if let Some(pending) = self.item.as_mut() {
                pending.item.description.get_or_insert_with(String::new);
            }
        } else if self.at(ITEM_ENCLOSURE) {
            if let Some(pending) = self.item.as_mut() {
                if pending.enclosure_image.is_none() {
                    pending.enclosure_image = image_enclosure_url(e, reader)?;
                }
            }
        }
        Ok(())
    }

    fn close(&mut self) {
        if self.at(ITEM) {
            if let (Some(pending), Some(channel)) = (self.item.take(), self.channel.as_mut()) {
                channel.items.push(pending.finish());
            }
        } else if self.at(ITEM_IMAGE_URL) {
            if let Some(pending) = self.item.as_mut() {
                pending.image_closed = pending
                    .item
                    .image_url
                    .as_deref()
                    .is_some_and(|url| !url.trim().is_empty());
            }
        }
        self.path.pop();
    }

    fn text(&mut self, text: &str) {
        if self.at(CHANNEL_TITLE) {
            if let Some(channel) = self.channel.as_mut() {
                append(&mut channel.title, text);
            }
            return;
        }

        let at_image_url = self.at(ITEM_IMAGE_URL);
        let item_field = if self.path.len() == ITEM.len() + 1 && self.under(ITEM) {
            Some(self.path[ITEM.len()].clone())
        } else {
            None
        };

        let Some(pending) = self.item.as_mut() else {
            return;
        };
        if at_image_url {
            if !pending.image_closed {
                append(&mut pending.item.image_url, text);
            }
            return;
        }
        let field = match item_field.as_deref() {
            Some("title") => &mut pending.item.title,
            Some("description") => &mut pending.item.description,
            Some("pubDate") => &mut pending.item.pub_date,
            Some("link") => &mut pending.item.link,
            _ => return,
        };
        append(field, text);
    }
}

fn append(field: &mut Option<String>, text: &str) {
    field.get_or_insert_with(String::new).push_str(text);
}

/// URL of an `<enclosure>` that is (or may be) an image.
fn image_enclosure_url(
    e: &BytesStart<'_>,
    reader: &Reader<&[u8]>,
) -> Result<Option<String>, FeedError> {
    let mut url = None;
    let mut mime = None;

    for attr_result in e.attributes() {
        let attr = match attr_result {
            Ok(attr) => attr,
            Err(e) => {
                tracing::warn!(error = %e, "Skipping malformed enclosure attribute");
                continue;
            }
        };
        let value = attr
            .decode_and_unescape_value(reader.decoder())
            .map_err(|e| FeedError::Parse(e.to_string()))?;
        match attr.key.as_ref() {
            b"url" => url = Some(value.to_string()),
            b"type" => mime = Some(value.to_ascii_lowercase()),
            _ => {}
        }
    }

    let is_image = mime.as_deref().map_or(true, |m| m.starts_with("image/"));
    Ok(url.filter(|_| is_image))
}

/// Parses upstream RSS markup into its channel title and raw items.
///
/// Only the first channel's `<title>` and its `<item>` children are read;
/// everything else is skipped. Items keep document order.
///
/// # Errors
///
/// - [`FeedError::Parse`] - markup is not well-formed XML
/// - [`FeedError::MissingChannel`] - no `<rss><channel>` element
/// - [`FeedError::TooDeep`] - nesting exceeds [`MAX_FEED_DEPTH`]
pub fn parse_channel(markup: &str) -> Result<SourceChannel, FeedError> {
    // SEC-002: quick-xml (0.37) never expands <!ENTITY> declarations; unknown
    // entities surface as unescape errors below.
    let mut reader = Reader::from_str(markup);
    reader.config_mut().trim_text(true);

    let mut state = ParseState::default();
    let mut buf = Vec::new();

    loop {
        match reader.read_event_into(&mut buf) {
            Ok(Event::Start(e)) => state.open(&e, &reader)?,
            Ok(Event::Empty(e)) => {
                state.open(&e, &reader)?;
                state.close();
            }
            Ok(Event::End(_)) => state.close(),
            Ok(Event::Text(e)) => {
                let text = e.unescape().map_err(|e| FeedError::Parse(e.to_string()))?;
                state.text(&text);
            }
            Ok(Event::CData(e)) => {
                let raw = e.into_inner();
                state.text(&String::from_utf8_lossy(&raw));
            }
            Ok(Event::Eof) => break,
            Err(e) => {
                return Err(FeedError::Parse(format!(
                    "{} (at byte {})",
                    e,
                    reader.error_position()
                )))
            }
            _ => {}
        }
        buf.clear();
    }

    if !state.path.is_empty() {
        return Err(FeedError::Parse(format!(
            "unexpected end of document inside <{}>",
            state.path.join("><")
        )));
    }

    state.channel.ok_or(FeedError::MissingChannel)
}
