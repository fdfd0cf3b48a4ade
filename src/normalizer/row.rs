//! Classification and field extraction for a single message row.

use chrono::{Local, TimeZone};
use humansize::{format_size, BINARY};

use super::media::MediaResolver;
use super::xml::{self, XmlError, XmlNode};
use super::MessageNormalizer;
use crate::model::{md5_hex, MessageKind, NormalizedMessage, Profile, RawMessageRow, Session};

pub const MSG_TEXT: i64 = 1;
pub const MSG_IMAGE: i64 = 3;
pub const MSG_AUDIO: i64 = 34;
pub const MSG_CARD: i64 = 42;
pub const MSG_VIDEO: i64 = 43;
pub const MSG_STICKER: i64 = 47;
pub const MSG_LOCATION: i64 = 48;
pub const MSG_APP: i64 = 49;
pub const MSG_SHORT_VIDEO: i64 = 62;
pub const MSG_NOTICE: i64 = 10000;
pub const MSG_REVOKE: i64 = 10002;

pub const APP_FILE: i64 = 6;
pub const APP_FORWARDED: i64 = 19;
pub const APP_QUOTE: i64 = 57;

pub const TIME_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Field set to `"1"` when referenced media could not be materialized.
pub const MISSING_MEDIA: &str = "media-missing";

/// Fields kept in description-only output.
const DESCRIPTION_FIELDS: [&str; 3] = ["time", "sender", "body"];

/// Reasons a row is skipped.
#[derive(Debug, thiserror::Error)]
pub enum RowError {
    #[error("Malformed payload: {0}")]
    Xml(#[from] XmlError),

    #[error("Payload has no <{0}> element")]
    MissingElement(&'static str),

    #[error("Payload has no {0} attribute")]
    MissingAttribute(&'static str),
}

/// Map a stored type code (and app message subtype) to a kind.
pub fn classify(msg_type: i64, app_type: Option<i64>) -> MessageKind {
    match msg_type {
        MSG_TEXT => MessageKind::Text,
        MSG_IMAGE => MessageKind::Image,
        MSG_AUDIO => MessageKind::Audio,
        MSG_VIDEO | MSG_SHORT_VIDEO => MessageKind::Video,
        MSG_STICKER => MessageKind::Sticker,
        MSG_CARD => MessageKind::Card,
        MSG_LOCATION => MessageKind::Location,
        MSG_APP => match app_type {
            Some(APP_FILE) => MessageKind::File,
            Some(APP_FORWARDED) => MessageKind::Forwarded,
            Some(APP_QUOTE) => MessageKind::Text,
            _ => MessageKind::Link,
        },
        _ => MessageKind::Notice,
    }
}

/// Body used when a kind's content is not rendered.
pub fn placeholder(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Image => "[Image]",
        MessageKind::Audio => "[Audio]",
        MessageKind::Video => "[Video]",
        MessageKind::Sticker => "[Sticker]",
        MessageKind::File => "[File]",
        MessageKind::Card => "[Contact Card]",
        MessageKind::Location => "[Location]",
        MessageKind::Link => "[Link]",
        MessageKind::Forwarded => "[Chat History]",
        MessageKind::Text | MessageKind::Notice => "",
    }
}

/// Local time rendering of a unix timestamp.
pub fn format_time(timestamp: i64) -> String {
    match Local.timestamp_opt(timestamp, 0).single() {
        Some(t) => t.format(TIME_FORMAT).to_string(),
        None => timestamp.to_string(),
    }
}

pub fn escape_html(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

/// Split the `"<sender>:\n"` prefix off incoming chat room payloads.
pub(crate) fn split_sender<'r>(session: &Session, row: &'r RawMessageRow) -> (Option<&'r str>, &'r str) {
    if session.is_chatroom() && !row.is_outgoing() {
        if let Some((id, rest)) = row.message.split_once(":\n") {
            if !id.is_empty() && !id.contains(|c: char| c.is_whitespace() || c == '<') {
                return (Some(id), rest);
            }
        }
    }
    (None, &row.message)
}

/// Output folder name for a session.
pub fn folder_name(session: &Session) -> String {
    session
        .output_name()
        .chars()
        .map(|c| match c {
            '/' | '\\' | ':' | '*' | '?' | '"' | '<' | '>' | '|' => '_',
            c => c,
        })
        .collect()
}

fn kind_dir(kind: MessageKind) -> &'static str {
    match kind {
        MessageKind::Image => "Image",
        MessageKind::Audio => "Audio",
        MessageKind::Video => "Video",
        MessageKind::File => "File",
        _ => "Misc",
    }
}

/// Output locations for one session, relative to the output folder.
pub(crate) struct SessionContext<'s> {
    pub session: &'s Session,
    /// Contact (or chat room) the session is with
    pub peer: Option<&'s Profile>,
    pub files_dir: String,
    pub portrait_dir: String,
    pub emoji_dir: String,
}

impl<'s> SessionContext<'s> {
    pub(crate) fn new(session: &'s Session, peer: Option<&'s Profile>, icons_in_session: bool) -> Self {
        let files_dir = format!("{}_files", folder_name(session));
        let (portrait_dir, emoji_dir) = if icons_in_session {
            (format!("{}/Portrait", files_dir), format!("{}/Emoji", files_dir))
        } else {
            ("Portrait".to_string(), "Emoji".to_string())
        };
        Self {
            session,
            peer,
            files_dir,
            portrait_dir,
            emoji_dir,
        }
    }

    pub(crate) fn media_dest(&self, kind: MessageKind, file: &str) -> String {
        format!("{}/{}/{}", self.files_dir, kind_dir(kind), file)
    }
}

enum Payload {
    Plain,
    OptionalXml,
    Xml,
}

fn payload_format(msg_type: i64) -> Payload {
    match msg_type {
        MSG_STICKER | MSG_CARD | MSG_LOCATION | MSG_APP => Payload::Xml,
        MSG_IMAGE | MSG_AUDIO | MSG_VIDEO | MSG_SHORT_VIDEO | MSG_REVOKE => Payload::OptionalXml,
        _ => Payload::Plain,
    }
}

fn required<'d>(node: Option<&'d XmlNode>, name: &'static str) -> Result<&'d XmlNode, RowError> {
    node.ok_or(RowError::MissingElement(name))
}

pub(crate) fn mark_missing(record: &mut NormalizedMessage) {
    record.set(MISSING_MEDIA, "1");
}

/// Reduce a record to description-only fields.
pub(crate) fn describe(record: &mut NormalizedMessage) {
    record
        .fields
        .retain(|k, _| DESCRIPTION_FIELDS.contains(&k.as_str()));
    record.nested.iter_mut().for_each(describe);
}

/// `"[Kind] detail"`, or the bare placeholder without detail.
pub(crate) fn labelled(kind: MessageKind, detail: &str) -> String {
    if detail.is_empty() {
        placeholder(kind).to_string()
    } else {
        format!("{} {}", placeholder(kind), detail)
    }
}

impl<'a> MessageNormalizer<'a> {
    pub(super) fn build_record(
        &self,
        ctx: &SessionContext<'_>,
        media: &mut MediaResolver<'_>,
        row: &RawMessageRow,
    ) -> Result<NormalizedMessage, RowError> {
        let (sender_id, content) = split_sender(ctx.session, row);
        let doc = match payload_format(row.msg_type) {
            Payload::Plain => None,
            Payload::OptionalXml => xml::parse(content.trim()).ok(),
            Payload::Xml => Some(xml::parse(content.trim())?),
        };
        let app = if row.msg_type == MSG_APP {
            Some(required(doc.as_ref().and_then(|d| d.find("appmsg")), "appmsg")?)
        } else {
            None
        };
        let app_type = app
            .and_then(|a| a.text_at("type"))
            .and_then(|t| t.parse().ok());
        let kind = classify(row.msg_type, app_type);

        let mut record = NormalizedMessage::new(kind, row.msg_id, row.create_time);
        record.set("time", format_time(row.create_time));
        record.set("timestamp", row.create_time.to_string());
        record.set("direction", if row.is_outgoing() { "out" } else { "in" });
        self.apply_sender(ctx, media, &mut record, row, sender_id);

        match kind {
            MessageKind::Text => match app {
                Some(app) => self.fill_quote(&mut record, app),
                None => record.set("body", self.escape(content)),
            },
            MessageKind::Image => self.fill_image(ctx, media, &mut record),
            MessageKind::Audio => self.fill_audio(ctx, media, &mut record, doc.as_ref()),
            MessageKind::Video => self.fill_video(ctx, media, &mut record),
            MessageKind::Sticker => {
                let emoji = required(doc.as_ref().and_then(|d| d.find("emoji")), "emoji")?;
                self.fill_sticker(ctx, media, &mut record, emoji);
            }
            MessageKind::Card => self.fill_card(ctx, media, &mut record, required(doc.as_ref(), "msg")?)?,
            MessageKind::Location => {
                let location = required(doc.as_ref().and_then(|d| d.find("location")), "location")?;
                self.fill_location(&mut record, location);
            }
            MessageKind::File => self.fill_file(ctx, media, &mut record, required(app, "appmsg")?),
            MessageKind::Link => self.fill_link(&mut record, required(app, "appmsg")?),
            MessageKind::Forwarded => {
                self.fill_forwarded(ctx, media, &mut record, required(app, "appmsg")?)?
            }
            MessageKind::Notice => self.fill_notice(&mut record, row.msg_type, content, doc.as_ref()),
        }

        if self.options.text_mode {
            describe(&mut record);
        }
        Ok(record)
    }

    /// Whether a kind's media and detail fields are produced.
    pub(super) fn includes(&self, kind: MessageKind) -> bool {
        let o = &self.options;
        if o.text_mode {
            return false;
        }
        !match kind {
            MessageKind::Image => o.ignore_image,
            MessageKind::Audio => o.ignore_audio,
            MessageKind::Video => o.ignore_video,
            MessageKind::Sticker => o.ignore_sticker,
            MessageKind::File => o.ignore_file,
            MessageKind::Card => o.ignore_card,
            MessageKind::Link | MessageKind::Location => o.ignore_sharing,
            _ => false,
        }
    }

    pub(super) fn escape(&self, s: &str) -> String {
        if self.options.ignore_html_escaping {
            s.to_string()
        } else {
            escape_html(s)
        }
    }

    /// Virtual path below the account folder.
    pub(super) fn user_path(&self, relative: &str) -> String {
        crate::backup::join_virtual(&self.user_root, relative)
    }

    /// Fetch an avatar into the portrait folder, named by `key`.
    pub(super) fn fetch_avatar(
        &self,
        ctx: &SessionContext<'_>,
        media: &mut MediaResolver<'_>,
        url: &str,
        key: &str,
    ) -> Option<String> {
        if !self.options.wants_avatars() || url.is_empty() {
            return None;
        }
        let name = if key.is_empty() { md5_hex(url) } else { key.to_string() };
        media.fetch_remote(url, &format!("{}/{}.jpg", ctx.portrait_dir, name))
    }

    fn apply_sender(
        &self,
        ctx: &SessionContext<'_>,
        media: &mut MediaResolver<'_>,
        record: &mut NormalizedMessage,
        row: &RawMessageRow,
        sender_id: Option<&str>,
    ) {
        let (id, name, profile): (&str, String, Option<&Profile>) = if row.is_outgoing() {
            (
                self.owner.user_id.as_str(),
                self.owner.display_name().to_string(),
                Some(self.owner),
            )
        } else if ctx.session.is_chatroom() {
            match sender_id {
                Some(id) => {
                    let profile = self.contacts.get(id);
                    let name = ctx
                        .peer
                        .and_then(|room| room.member_names.get(id))
                        .map(String::as_str)
                        .or_else(|| profile.map(Profile::display_name))
                        .unwrap_or(id);
                    (id, name.to_string(), profile)
                }
                None => ("", String::new(), None),
            }
        } else {
            let name = if ctx.session.display_name.is_empty() {
                ctx.session.output_name()
            } else {
                ctx.session.display_name.as_str()
            };
            (ctx.session.user_id.as_str(), name.to_string(), ctx.peer)
        };

        record.set("sender", self.escape(&name));
        if !id.is_empty() {
            record.set("sender_id", id);
        }
        if let Some(profile) = profile {
            if let Some(avatar) = self.fetch_avatar(ctx, media, profile.best_avatar(), &profile.hash) {
                record.set("avatar", avatar);
            }
        }
    }

    fn fill_quote(&self, record: &mut NormalizedMessage, app: &XmlNode) {
        record.set("body", self.escape(app.text_at("title").unwrap_or_default()));
        if let Some(quoted) = app.child("refermsg") {
            record.set("quote", self.escape(quoted.text_at("content").unwrap_or_default()));
            record.set(
                "quote_sender",
                self.escape(quoted.text_at("displayname").unwrap_or_default()),
            );
        }
    }

    fn fill_image(&self, ctx: &SessionContext<'_>, media: &mut MediaResolver<'_>, record: &mut NormalizedMessage) {
        record.set("body", placeholder(MessageKind::Image));
        if !self.includes(MessageKind::Image) {
            return;
        }
        let base = self.user_path(&format!("Img/{}/{}", ctx.session.hash, record.msg_id));
        let full = media.copy_local(
            &[format!("{}.pic_hd", base), format!("{}.pic", base)],
            &ctx.media_dest(MessageKind::Image, &format!("{}.jpg", record.msg_id)),
        );
        let thumb = media.copy_local(
            &[format!("{}.pic_thum", base)],
            &ctx.media_dest(MessageKind::Image, &format!("{}_thumb.jpg", record.msg_id)),
        );
        match (full, thumb) {
            (Some(full), thumb) => {
                record.set("image", full);
                if let Some(thumb) = thumb {
                    record.set("thumb", thumb);
                }
            }
            (None, Some(thumb)) => {
                record.set("image", thumb.clone());
                record.set("thumb", thumb);
            }
            (None, None) => mark_missing(record),
        }
    }

    fn fill_audio(
        &self,
        ctx: &SessionContext<'_>,
        media: &mut MediaResolver<'_>,
        record: &mut NormalizedMessage,
        doc: Option<&XmlNode>,
    ) {
        record.set("body", placeholder(MessageKind::Audio));
        if !self.includes(MessageKind::Audio) {
            return;
        }
        if let Some(ms) = doc
            .and_then(|d| d.find("voicemsg"))
            .and_then(|v| v.attr("voicelength"))
            .and_then(|v| v.parse::<u64>().ok())
        {
            record.set("duration", ((ms + 500) / 1000).to_string());
        }
        let src = self.user_path(&format!("Audio/{}/{}.aud", ctx.session.hash, record.msg_id));
        match media.copy_local(
            &[src],
            &ctx.media_dest(MessageKind::Audio, &format!("{}.aud", record.msg_id)),
        ) {
            Some(dest) => record.set("audio", dest),
            None => mark_missing(record),
        }
    }

    fn fill_video(&self, ctx: &SessionContext<'_>, media: &mut MediaResolver<'_>, record: &mut NormalizedMessage) {
        record.set("body", placeholder(MessageKind::Video));
        if !self.includes(MessageKind::Video) {
            return;
        }
        let base = self.user_path(&format!("Video/{}/{}", ctx.session.hash, record.msg_id));
        let video = media.copy_local(
            &[format!("{}.mp4", base)],
            &ctx.media_dest(MessageKind::Video, &format!("{}.mp4", record.msg_id)),
        );
        if let Some(thumb) = media.copy_local(
            &[format!("{}.video_thum", base)],
            &ctx.media_dest(MessageKind::Video, &format!("{}_thumb.jpg", record.msg_id)),
        ) {
            record.set("thumb", thumb);
        }
        match video {
            Some(dest) => record.set("video", dest),
            None => mark_missing(record),
        }
    }

    fn fill_sticker(
        &self,
        ctx: &SessionContext<'_>,
        media: &mut MediaResolver<'_>,
        record: &mut NormalizedMessage,
        emoji: &XmlNode,
    ) {
        record.set("body", placeholder(MessageKind::Sticker));
        if !self.includes(MessageKind::Sticker) {
            return;
        }
        let url = emoji.attr("cdnurl").unwrap_or_default();
        let name = match emoji.attr("md5").filter(|m| !m.is_empty()) {
            Some(md5) => md5.to_string(),
            None => md5_hex(url),
        };
        match media.fetch_remote(url, &format!("{}/{}.gif", ctx.emoji_dir, name)) {
            Some(dest) => record.set("sticker", dest),
            None => mark_missing(record),
        }
    }

    fn fill_card(
        &self,
        ctx: &SessionContext<'_>,
        media: &mut MediaResolver<'_>,
        record: &mut NormalizedMessage,
        msg: &XmlNode,
    ) -> Result<(), RowError> {
        let user = msg
            .attr("username")
            .filter(|u| !u.is_empty())
            .ok_or(RowError::MissingAttribute("username"))?;
        let name = msg.attr("nickname").filter(|n| !n.is_empty()).unwrap_or(user);
        record.set("body", labelled(MessageKind::Card, &self.escape(name)));
        if !self.includes(MessageKind::Card) {
            return Ok(());
        }
        record.set("card_user", user);
        record.set("card_name", self.escape(name));
        let url = msg
            .attr("bigheadimgurl")
            .filter(|u| !u.is_empty())
            .or_else(|| msg.attr("smallheadimgurl"))
            .unwrap_or_default();
        if let Some(avatar) = self.fetch_avatar(ctx, media, url, &md5_hex(user)) {
            record.set("card_avatar", avatar);
        }
        Ok(())
    }

    fn fill_location(&self, record: &mut NormalizedMessage, location: &XmlNode) {
        let label = location
            .attr("poiname")
            .filter(|l| !l.is_empty())
            .or_else(|| location.attr("label"))
            .unwrap_or_default();
        record.set("body", labelled(MessageKind::Location, &self.escape(label)));
        if !self.includes(MessageKind::Location) {
            return;
        }
        record.set("label", self.escape(label));
        record.set("latitude", location.attr("x").unwrap_or_default());
        record.set("longitude", location.attr("y").unwrap_or_default());
    }

    fn fill_file(
        &self,
        ctx: &SessionContext<'_>,
        media: &mut MediaResolver<'_>,
        record: &mut NormalizedMessage,
        app: &XmlNode,
    ) {
        let title = app.text_at("title").unwrap_or_default();
        record.set("body", labelled(MessageKind::File, &self.escape(title)));
        if !self.includes(MessageKind::File) {
            return;
        }
        record.set("file_name", self.escape(title));
        if let Some(size) = app.text_at("appattach/totallen") {
            record.set("file_size", size);
            if let Ok(bytes) = size.parse::<u64>() {
                record.set("file_size_display", format_size(bytes, BINARY));
            }
        }
        let file = match app.text_at("appattach/fileext") {
            Some(ext) => format!("{}.{}", record.msg_id, ext),
            None => record.msg_id.to_string(),
        };
        let src = self.user_path(&format!("OpenData/{}/{}", ctx.session.hash, file));
        match media.copy_local(&[src], &ctx.media_dest(MessageKind::File, &file)) {
            Some(dest) => record.set("file", dest),
            None => mark_missing(record),
        }
    }

    fn fill_link(&self, record: &mut NormalizedMessage, app: &XmlNode) {
        let title = app.text_at("title").unwrap_or_default();
        record.set("body", labelled(MessageKind::Link, &self.escape(title)));
        if !self.includes(MessageKind::Link) {
            return;
        }
        record.set("title", self.escape(title));
        record.set("desc", self.escape(app.text_at("des").unwrap_or_default()));
        record.set("url", app.text_at("url").unwrap_or_default());
    }

    fn fill_forwarded(
        &self,
        ctx: &SessionContext<'_>,
        media: &mut MediaResolver<'_>,
        record: &mut NormalizedMessage,
        app: &XmlNode,
    ) -> Result<(), RowError> {
        let title = app.text_at("title").unwrap_or_default();
        record.set("body", labelled(MessageKind::Forwarded, &self.escape(title)));
        record.set("title", self.escape(title));
        record.set("desc", self.escape(app.text_at("des").unwrap_or_default()));

        // The record list is itself an XML document carried as text
        let Some(items) = app.text_at("recorditem") else {
            return Ok(());
        };
        let doc = xml::parse(items)?;
        if let Some(info) = doc.find("recordinfo") {
            record.nested =
                self.forwarded_records(ctx, media, record.msg_id, record.create_time, info, 1);
        }
        Ok(())
    }

    fn fill_notice(
        &self,
        record: &mut NormalizedMessage,
        msg_type: i64,
        content: &str,
        doc: Option<&XmlNode>,
    ) {
        let body = match msg_type {
            MSG_NOTICE => content.to_string(),
            MSG_REVOKE => doc
                .and_then(|d| d.find("replacemsg").or_else(|| d.find("content")))
                .map(|n| n.text.trim().to_string())
                .unwrap_or_else(|| content.to_string()),
            other => {
                record.set("type_code", other.to_string());
                format!("[Unsupported message type {}]", other)
            }
        };
        record.set("body", self.escape(&body));
    }
}
