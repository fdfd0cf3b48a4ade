//! Entities shared by the extractors and the message normalizer.

use std::collections::btree_map;
use std::collections::BTreeMap;

use serde::Serialize;

/// Suffix of chat room (group) identifiers.
pub const CHATROOM_SUFFIX: &str = "@chatroom";

/// Lowercase hex MD5 of a string.
///
/// The app names per-account folders, message tables and media folders
/// after the MD5 of the owning identifier.
pub fn md5_hex(value: &str) -> String {
    format!("{:x}", md5::compute(value.as_bytes()))
}

/// An account or contact. Unknown fields stay empty.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Profile {
    /// Account identifier (`wxid_...`, or `...@chatroom` for groups)
    pub user_id: String,
    /// MD5 of `user_id`
    pub hash: String,
    pub nickname: String,
    pub alias: String,
    pub remark: String,
    pub avatar: String,
    pub avatar_hd: String,
    /// Chat room member ids (groups only)
    pub members: Vec<String>,
    /// Per-room display names of members (groups only)
    pub member_names: BTreeMap<String, String>,
}

impl Profile {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            hash: md5_hex(user_id),
            ..Default::default()
        }
    }

    /// Profile known only by its hashed id.
    pub fn from_hash(hash: &str) -> Self {
        Self {
            hash: hash.to_string(),
            ..Default::default()
        }
    }

    /// Remark, then nickname, then the raw id (or hash when the id is unknown).
    pub fn display_name(&self) -> &str {
        [&self.remark, &self.nickname, &self.user_id, &self.hash]
            .into_iter()
            .find(|s| !s.is_empty())
            .map(String::as_str)
            .unwrap_or("")
    }

    pub fn is_chatroom(&self) -> bool {
        self.user_id.ends_with(CHATROOM_SUFFIX)
    }

    /// HD avatar when available, otherwise the regular one.
    pub fn best_avatar(&self) -> &str {
        if self.avatar_hd.is_empty() {
            &self.avatar
        } else {
            &self.avatar_hd
        }
    }
}

/// Contacts of one backup owner, keyed by account id.
#[derive(Debug, Clone, Default)]
pub struct ContactBook {
    by_id: BTreeMap<String, Profile>,
    by_hash: BTreeMap<String, String>,
}

impl ContactBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a profile; an existing entry with the same id is replaced.
    pub fn insert(&mut self, profile: Profile) {
        self.by_hash
            .insert(profile.hash.clone(), profile.user_id.clone());
        self.by_id.insert(profile.user_id.clone(), profile);
    }

    pub fn get(&self, user_id: &str) -> Option<&Profile> {
        self.by_id.get(user_id)
    }

    /// Look up a profile by the MD5 of its id.
    pub fn get_by_hash(&self, hash: &str) -> Option<&Profile> {
        self.by_hash.get(hash).and_then(|id| self.by_id.get(id))
    }

    pub fn len(&self) -> usize {
        self.by_id.len()
    }

    pub fn is_empty(&self) -> bool {
        self.by_id.is_empty()
    }

    pub fn iter(&self) -> btree_map::Values<'_, String, Profile> {
        self.by_id.values()
    }
}

/// One conversation of a backup owner. Messages are loaded on demand.
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    /// Peer or group id; empty when only the table hash is known
    pub user_id: String,
    /// MD5 of the peer id, also the message table suffix
    pub hash: String,
    pub display_name: String,
    /// Rows present across all shards
    pub record_count: u64,
    /// Count cached in cell data, which may disagree with `record_count`
    pub cached_count: Option<u64>,
    pub last_message_time: Option<i64>,
    pub created_at: Option<i64>,
    /// Shard files (backup virtual paths) holding this session's table
    pub sources: Vec<String>,
    /// Hash of the owning account, matching its `Profile::hash`
    pub owner_hash: String,
}

impl Session {
    pub fn new(user_id: &str) -> Self {
        Self {
            user_id: user_id.to_string(),
            hash: md5_hex(user_id),
            display_name: String::new(),
            record_count: 0,
            cached_count: None,
            last_message_time: None,
            created_at: None,
            sources: Vec::new(),
            owner_hash: String::new(),
        }
    }

    /// Session known only through a message table name.
    pub fn from_hash(hash: &str) -> Self {
        Self {
            hash: hash.to_string(),
            ..Self::new("")
        }
    }

    pub fn is_chatroom(&self) -> bool {
        self.user_id.ends_with(CHATROOM_SUFFIX)
    }

    pub fn is_empty(&self) -> bool {
        self.record_count == 0
    }

    pub fn is_owned_by(&self, owner: &Profile) -> bool {
        !self.owner_hash.is_empty() && self.owner_hash == owner.hash
    }

    /// Message table name inside a shard.
    pub fn table_name(&self) -> String {
        format!("Chat_{}", self.hash)
    }

    /// Name used for output folders.
    pub fn output_name(&self) -> &str {
        if !self.user_id.is_empty() {
            &self.user_id
        } else {
            &self.hash
        }
    }
}

/// A message row as stored in a shard table.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RawMessageRow {
    pub create_time: i64,
    pub message: String,
    /// 0 = sent by the owner, anything else = received
    pub des: i64,
    pub msg_type: i64,
    pub msg_id: i64,
}

impl RawMessageRow {
    pub fn is_outgoing(&self) -> bool {
        self.des == 0
    }

    /// Total order used for output: creation time, then row id.
    pub fn sort_key(&self) -> (i64, i64) {
        (self.create_time, self.msg_id)
    }
}

/// Classified message kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Text,
    Image,
    Audio,
    Video,
    Sticker,
    File,
    Card,
    Location,
    Link,
    Notice,
    Forwarded,
}

impl MessageKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageKind::Text => "text",
            MessageKind::Image => "image",
            MessageKind::Audio => "audio",
            MessageKind::Video => "video",
            MessageKind::Sticker => "sticker",
            MessageKind::File => "file",
            MessageKind::Card => "card",
            MessageKind::Location => "location",
            MessageKind::Link => "link",
            MessageKind::Notice => "notice",
            MessageKind::Forwarded => "forwarded",
        }
    }
}

/// Render-ready record: named string fields plus nested forwarded records.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NormalizedMessage {
    pub kind: MessageKind,
    pub msg_id: i64,
    pub create_time: i64,
    pub fields: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub nested: Vec<NormalizedMessage>,
}

impl NormalizedMessage {
    pub fn new(kind: MessageKind, msg_id: i64, create_time: i64) -> Self {
        Self {
            kind,
            msg_id,
            create_time,
            fields: BTreeMap::new(),
            nested: Vec::new(),
        }
    }

    pub fn set(&mut self, key: &str, value: impl Into<String>) {
        self.fields.insert(key.to_string(), value.into());
    }

    pub fn get(&self, key: &str) -> Option<&str> {
        self.fields.get(key).map(String::as_str)
    }

    pub fn has(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }
}
