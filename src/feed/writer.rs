use super::model::{Channel, Enclosure, FeedDocument, Item, ATOM_NAMESPACE};
use super::FeedError;
use crate::clock::http_date;
use quick_xml::events::{BytesDecl, BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use std::io::Cursor;

type XmlWriter = Writer<Cursor<Vec<u8>>>;

/// Serializes a document as RSS 2.0 with the `atom:` namespace declared.
///
/// Output always carries an XML declaration, the `<rss>` root and a single
/// `<channel>`, even when the channel has no items.
pub fn to_xml(doc: &FeedDocument) -> Result<String, FeedError> {
    let mut writer = Writer::new_with_indent(Cursor::new(Vec::new()), b' ', 2);

    emit(
        &mut writer,
        Event::Decl(BytesDecl::new("1.0", Some("UTF-8"), None)),
    )?;

    let mut rss = BytesStart::new("rss");
    rss.push_attribute(("xmlns:atom", ATOM_NAMESPACE));
    rss.push_attribute(("version", "2.0"));
    emit(&mut writer, Event::Start(rss))?;

    write_channel(&mut writer, &doc.channel)?;

    emit(&mut writer, Event::End(BytesEnd::new("rss")))?;

    let bytes = writer.into_inner().into_inner();
    String::from_utf8(bytes).map_err(|e| FeedError::Serialize(e.to_string()))
}

fn write_channel(writer: &mut XmlWriter, channel: &Channel) -> Result<(), FeedError> {
    emit(writer, Event::Start(BytesStart::new("channel")))?;

    text_element(writer, "title", &channel.title)?;
    text_element(writer, "link", &channel.link)?;
    text_element(writer, "description", &channel.description)?;
    text_element(writer, "pubDate", &http_date(&channel.pub_date))?;
    text_element(writer, "lastBuildDate", &http_date(&channel.last_build_date))?;

    let mut self_link = BytesStart::new("atom:link");
    self_link.push_attribute(("rel", "self"));
    self_link.push_attribute(("type", "application/rss+xml"));
    self_link.push_attribute(("href", channel.self_link.as_str()));
    emit(writer, Event::Empty(self_link))?;

    for item in &channel.items {
        write_item(writer, item)?;
    }

    emit(writer, Event::End(BytesEnd::new("channel")))
}

fn write_item(writer: &mut XmlWriter, item: &Item) -> Result<(), FeedError> {
    emit(writer, Event::Start(BytesStart::new("item")))?;

    text_element(writer, "title", &item.title)?;
    text_element(writer, "description", &item.description)?;
    text_element(writer, "pubDate", &http_date(&item.pub_date))?;
    if let Some(link) = &item.link {
        text_element(writer, "link", link)?;
        text_element(writer, "guid", link)?;
    }
    if let Some(enclosure) = &item.enclosure {
        write_enclosure(writer, enclosure)?;
    }

    emit(writer, Event::End(BytesEnd::new("item")))
}

fn write_enclosure(writer: &mut XmlWriter, enclosure: &Enclosure) -> Result<(), FeedError> {
    let length = enclosure.length.to_string();
    let mut element = BytesStart::new("enclosure");
    element.push_attribute(("url", enclosure.url.as_str()));
    element.push_attribute(("type", enclosure.mime_type.as_str()));
    element.push_attribute(("length", length.as_str()));
    emit(writer, Event::Empty(element))
}

fn text_element(writer: &mut XmlWriter, name: &str, text: &str) -> Result<(), FeedError> {
    emit(writer, Event::Start(BytesStart::new(name)))?;
    emit(writer, Event::Text(BytesText::new(text)))?;
    emit(writer, Event::End(BytesEnd::new(name)))
}

fn emit(writer: &mut XmlWriter, event: Event<'_>) -> Result<(), FeedError> {
    writer
        .write_event(event)
        .map_err(|e| FeedError::Serialize(e.to_string()))
}
