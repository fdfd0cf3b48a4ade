//! Contact book extraction from the account's contact store.
//!
//! Each `Friend` row carries up to three protobuf blobs: remark data
//! (nickname, alias, remark), head image URLs, and for chat rooms the
//! member list. Any blob may be missing or malformed; the affected fields
//! simply stay empty.

use std::path::Path;

use rusqlite::types::ValueRef;
use tracing::{debug, info};

use crate::backup::{join_virtual, BackupIndex};
use crate::db::open_readonly;
use crate::error::ExtractError;
use crate::model::{ContactBook, Profile};
use crate::wire::{decode_fields, string_field, WireError};

/// Contact store below an account folder.
pub const CONTACT_DB: &str = "DB/WCDB_Contact.sqlite";

const REMARK_NICKNAME: u32 = 1;
const REMARK_ALIAS: u32 = 2;
const REMARK_REMARK: u32 = 3;
const HEAD_AVATAR: u32 = 2;
const HEAD_AVATAR_HD: u32 = 3;
const ROOM_MEMBERS: u32 = 1;
const ROOM_MEMBER_NAMES: u32 = 4;
const MEMBER_ID: u32 = 1;
const MEMBER_NAME: u32 = 2;

/// Builds a [`ContactBook`] for one backup owner.
#[derive(Debug, Clone, Copy)]
pub struct ContactExtractor {
    detailed: bool,
}

impl Default for ContactExtractor {
    fn default() -> Self {
        Self::new(true)
    }
}

impl ContactExtractor {
    /// With `detailed` unset only ids and nicknames are decoded.
    pub fn new(detailed: bool) -> Self {
        Self { detailed }
    }

    /// Extract contacts of the account rooted at `user_root`.
    ///
    /// A backup without a contact store yields an empty book.
    ///
    /// # Errors
    ///
    /// Fails only when the store exists but cannot be queried.
    pub fn extract(&self, index: &BackupIndex, user_root: &str) -> Result<ContactBook, ExtractError> {
        let vpath = join_virtual(user_root, CONTACT_DB);
        match index.real_path(&vpath) {
            Some(path) => self.extract_file(&path),
            None => {
                debug!("No contact store at {}", vpath);
                Ok(ContactBook::new())
            }
        }
    }

    /// Extract contacts from a contact store on disk.
    ///
    /// # Errors
    ///
    /// Fails if the database cannot be opened or the `Friend` table queried.
    pub fn extract_file(&self, path: &Path) -> Result<ContactBook, ExtractError> {
        let conn = open_readonly(path)?;
        let sql = if self.detailed {
            "SELECT userName, dbContactRemark, dbContactHeadImage, dbContactChatRoom FROM Friend"
        } else {
            "SELECT userName, dbContactRemark, NULL, NULL FROM Friend"
        };

        let mut stmt = conn.prepare(sql).map_err(ExtractError::query(path))?;
        let mut rows = stmt.query([]).map_err(ExtractError::query(path))?;

        let mut book = ContactBook::new();
        let mut skipped = 0usize;
        while let Some(row) = rows.next().map_err(ExtractError::query(path))? {
            let user_name = match row.get_ref(0) {
                Ok(ValueRef::Text(t)) if !t.is_empty() => String::from_utf8_lossy(t).into_owned(),
                _ => {
                    skipped += 1;
                    continue;
                }
            };
            let remark = blob(row.get_ref(1).ok());
            let head = blob(row.get_ref(2).ok());
            let room = blob(row.get_ref(3).ok());
            book.insert(self.parse_record(&user_name, remark, head, room));
        }

        info!(
            contacts = book.len(),
            skipped,
            detailed = self.detailed,
            "Extracted contacts from {:?}",
            path
        );
        Ok(book)
    }

    /// Decode one contact record from its raw blobs.
    pub fn parse_record(
        &self,
        user_name: &str,
        remark: Option<&[u8]>,
        head: Option<&[u8]>,
        room: Option<&[u8]>,
    ) -> Profile {
        let mut profile = Profile::new(user_name);

        if let Some(data) = remark {
            if let Err(e) = self.parse_remark(data, &mut profile) {
                debug!("Malformed remark for {}: {}", user_name, e);
            }
        }
        if !self.detailed {
            return profile;
        }
        if let Some(data) = head {
            if let Err(e) = parse_avatar(data, &mut profile) {
                debug!("Malformed head image for {}: {}", user_name, e);
            }
        }
        if let Some(data) = room {
            if let Err(e) = parse_chatroom(data, &mut profile) {
                debug!("Malformed chat room data for {}: {}", user_name, e);
            }
        }
        profile
    }

    fn parse_remark(&self, data: &[u8], profile: &mut Profile) -> Result<(), WireError> {
        let fields = decode_fields(data)?;
        profile.nickname = string_field(&fields, REMARK_NICKNAME).unwrap_or_default();
        if self.detailed {
            profile.alias = string_field(&fields, REMARK_ALIAS).unwrap_or_default();
            profile.remark = string_field(&fields, REMARK_REMARK).unwrap_or_default();
        }
        Ok(())
    }
}

fn blob(value: Option<ValueRef<'_>>) -> Option<&[u8]> {
    match value {
        Some(ValueRef::Blob(b)) | Some(ValueRef::Text(b)) if !b.is_empty() => Some(b),
        _ => None,
    }
}

fn parse_avatar(data: &[u8], profile: &mut Profile) -> Result<(), WireError> {
    let fields = decode_fields(data)?;
    profile.avatar = string_field(&fields, HEAD_AVATAR).unwrap_or_default();
    profile.avatar_hd = string_field(&fields, HEAD_AVATAR_HD).unwrap_or_default();
    Ok(())
}

fn parse_chatroom(data: &[u8], profile: &mut Profile) -> Result<(), WireError> {
    let fields = decode_fields(data)?;
    if let Some(members) = string_field(&fields, ROOM_MEMBERS) {
        profile.members = members
            .split(';')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .map(str::to_string)
            .collect();
    }
    for field in fields.iter().filter(|f| f.number == ROOM_MEMBER_NAMES) {
        let Some(bytes) = field.as_bytes() else {
            continue;
        };
        // A bad member entry only loses that member's room nickname
        let Ok(member) = decode_fields(bytes) else {
            continue;
        };
        if let (Some(id), Some(name)) = (
            string_field(&member, MEMBER_ID),
            string_field(&member, MEMBER_NAME),
        ) {
            if !id.is_empty() && !name.is_empty() {
                profile.member_names.insert(id, name);
            }
        }
    }
    Ok(())
}
