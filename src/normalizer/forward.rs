//! Forwarded chat history records.
//!
//! A forwarded record carries `<recordinfo><datalist><dataitem>...` where
//! each item is one original message. Items of type 17 are themselves
//! forwarded records whose `recordxml` holds another `recordinfo`, either
//! as child elements or as escaped text. A nested record that cannot be
//! parsed becomes a notice; its siblings are kept.

use tracing::debug;

use super::media::MediaResolver;
use super::row::{format_time, labelled, mark_missing, RowError, SessionContext};
use super::xml::{self, XmlNode};
use super::MessageNormalizer;
use crate::model::{MessageKind, NormalizedMessage};

/// Nesting levels rendered below a forwarded row. Deeper records collapse
/// into a notice.
pub const MAX_FORWARD_DEPTH: usize = 8;

const DATA_TEXT: i64 = 1;
const DATA_IMAGE: i64 = 2;
const DATA_AUDIO: i64 = 3;
const DATA_VIDEO: i64 = 4;
const DATA_LINK: i64 = 5;
const DATA_LOCATION: i64 = 6;
const DATA_MUSIC: i64 = 7;
const DATA_FILE: i64 = 8;
const DATA_RECORD: i64 = 17;
const DATA_MINI_PROGRAM: i64 = 19;

fn classify_item(data_type: i64) -> MessageKind {
    match data_type {
        DATA_TEXT => MessageKind::Text,
        DATA_IMAGE => MessageKind::Image,
        DATA_AUDIO => MessageKind::Audio,
        DATA_VIDEO => MessageKind::Video,
        DATA_LINK | DATA_MUSIC | DATA_MINI_PROGRAM => MessageKind::Link,
        DATA_LOCATION => MessageKind::Location,
        DATA_FILE => MessageKind::File,
        DATA_RECORD => MessageKind::Forwarded,
        _ => MessageKind::Notice,
    }
}

impl<'a> MessageNormalizer<'a> {
    /// Normalize the items of `info`, which sits `depth` levels below the row.
    pub(super) fn forwarded_records(
        &self,
        ctx: &SessionContext<'_>,
        media: &mut MediaResolver<'_>,
        msg_id: i64,
        create_time: i64,
        info: &XmlNode,
        depth: usize,
    ) -> Vec<NormalizedMessage> {
        let Some(list) = info.child("datalist") else {
            return Vec::new();
        };
        list.children_named("dataitem")
            .map(|item| self.forwarded_item(ctx, media, msg_id, create_time, item, depth))
            .collect()
    }

    fn forwarded_item(
        &self,
        ctx: &SessionContext<'_>,
        media: &mut MediaResolver<'_>,
        msg_id: i64,
        create_time: i64,
        item: &XmlNode,
        depth: usize,
    ) -> NormalizedMessage {
        let data_type = item
            .attr("datatype")
            .and_then(|t| t.trim().parse().ok())
            .unwrap_or(DATA_TEXT);
        let kind = classify_item(data_type);
        let time = item
            .text_at("srcMsgCreateTime")
            .and_then(|t| t.parse().ok())
            .unwrap_or(create_time);

        let mut record = NormalizedMessage::new(kind, msg_id, time);
        record.set(
            "time",
            item.text_at("sourcetime")
                .map(str::to_string)
                .unwrap_or_else(|| format_time(time)),
        );
        record.set("sender", self.escape(item.text_at("sourcename").unwrap_or_default()));
        if let Some(url) = item.text_at("sourceheadurl") {
            if let Some(avatar) = self.fetch_avatar(ctx, media, url, "") {
                record.set("avatar", avatar);
            }
        }

        let title = item.text_at("datatitle").unwrap_or_default();
        let desc = item.text_at("datadesc").unwrap_or_default();
        match kind {
            MessageKind::Text => record.set("body", self.escape(desc)),
            MessageKind::Image | MessageKind::Audio | MessageKind::Video | MessageKind::File => {
                let detail = if kind == MessageKind::File { title } else { "" };
                record.set("body", labelled(kind, &self.escape(detail)));
                if self.includes(kind) {
                    if kind == MessageKind::File {
                        record.set("file_name", self.escape(title));
                    }
                    self.resolve_item_media(ctx, media, &mut record, item);
                }
            }
            MessageKind::Link => {
                record.set("body", labelled(kind, &self.escape(title)));
                if self.includes(kind) {
                    record.set("title", self.escape(title));
                    record.set("desc", self.escape(desc));
                    let url = item
                        .text_at("link")
                        .or_else(|| item.text_at("weburlitem/link"))
                        .unwrap_or_default();
                    record.set("url", url);
                }
            }
            MessageKind::Location => {
                let label = item
                    .at("locitem")
                    .and_then(|l| l.text_at("poiname").or_else(|| l.text_at("label")))
                    .unwrap_or(desc);
                record.set("body", labelled(kind, &self.escape(label)));
            }
            MessageKind::Forwarded => {
                record.set("body", labelled(kind, &self.escape(title)));
                record.set("title", self.escape(title));
                if depth >= MAX_FORWARD_DEPTH {
                    record.kind = MessageKind::Notice;
                    record.set("body", "[Chat History nested too deeply]");
                } else {
                    match nested_record_info(item) {
                        Ok(Some(info)) => {
                            record.nested =
                                self.forwarded_records(ctx, media, msg_id, time, &info, depth + 1);
                        }
                        Ok(None) => {}
                        Err(e) => {
                            debug!(msg_id, depth, "Unreadable nested record: {}", e);
                            record.kind = MessageKind::Notice;
                            record.set("body", "[Chat History unreadable]");
                        }
                    }
                }
            }
            _ => {
                let body = if desc.is_empty() { "[Unsupported item]" } else { desc };
                record.set("body", self.escape(body));
            }
        }
        record
    }

    fn resolve_item_media(
        &self,
        ctx: &SessionContext<'_>,
        media: &mut MediaResolver<'_>,
        record: &mut NormalizedMessage,
        item: &XmlNode,
    ) {
        let data_id = item.attr("dataid").unwrap_or_default();
        if data_id.is_empty() {
            mark_missing(record);
            return;
        }
        let fmt = item.text_at("datafmt").unwrap_or("dat");
        let (kind, msg_id) = (record.kind, record.msg_id);
        let base = self.user_path(&format!("OpenData/{}/{}/{}", ctx.session.hash, msg_id, data_id));
        let dest = |suffix: &str| {
            ctx.media_dest(kind, &format!("{}/{}{}.{}", msg_id, data_id, suffix, fmt))
        };

        let main = media.copy_local(&[format!("{}.{}", base, fmt)], &dest(""));
        let thumb = media.copy_local(&[format!("{}_t.{}", base, fmt)], &dest("_t"));
        let field = match kind {
            MessageKind::Image => "image",
            MessageKind::Audio => "audio",
            MessageKind::Video => "video",
            _ => "file",
        };
        if let Some(thumb) = thumb {
            record.set("thumb", thumb);
        }
        match main {
            Some(path) => record.set(field, path),
            None => mark_missing(record),
        }
    }
}

/// The `recordinfo` of a nested record item, if it has one.
fn nested_record_info(item: &XmlNode) -> Result<Option<XmlNode>, RowError> {
    let Some(record_xml) = item.child("recordxml") else {
        return Ok(None);
    };
    if let Some(info) = record_xml.find("recordinfo") {
        return Ok(Some(info.clone()));
    }
    let text = record_xml.text.trim();
    if text.is_empty() {
        return Ok(None);
    }
    let doc = xml::parse(text)?;
    Ok(doc.find("recordinfo").cloned())
}
