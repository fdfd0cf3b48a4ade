//! Decoder for memory-mapped key-value settings archives.
//!
//! # Format
//!
//! ```text
//! data file:  [u32 LE payload_len][payload ...][unused mapped space]
//! payload:    varint item_count, then repeated (varint key_len, key,
//!                                               varint value_len, value)
//! crc file:   [u32 LE CRC-32 of payload][...]
//! ```
//!
//! The archive is an append log, so a later entry for a key replaces an
//! earlier one. String values carry their own varint length prefix inside
//! the value bytes. Decoded values are only trusted after the payload
//! checksum matches the companion `.crc` file.

use std::collections::BTreeMap;

use tracing::warn;

use crate::model::Profile;
use crate::wire::{WireError, WireReader};

/// Account id (`wxid_...`).
pub const KEY_USER_ID: &str = "86";
/// User-chosen alias (the searchable account name).
pub const KEY_ALIAS: &str = "87";
/// Display nickname.
pub const KEY_NICKNAME: &str = "88";
pub const KEY_AVATAR: &str = "headimgurl";
pub const KEY_AVATAR_HD: &str = "headhdimgurl";

const HEADER_LEN: usize = 4;

/// Reasons an archive is rejected.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ArchiveError {
    #[error("Archive is shorter than its header ({len} bytes)")]
    TooShort { len: usize },

    #[error("Archive declares {declared} payload bytes but only {available} are present")]
    PayloadOutOfRange { declared: usize, available: usize },

    #[error("Checksum file is missing or truncated")]
    MissingChecksum,

    #[error("Checksum mismatch (expected {expected:#010x}, computed {actual:#010x})")]
    ChecksumMismatch { expected: u32, actual: u32 },

    #[error("Malformed archive entry: {0}")]
    Malformed(#[from] WireError),
}

fn read_u32_le(data: &[u8]) -> Option<u32> {
    data.get(..4)
        .map(|b| u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
}

/// Return the payload after verifying it against the checksum file.
///
/// # Errors
///
/// Fails on a short header, a declared length past the end of the data, a
/// missing checksum, or a checksum mismatch.
pub fn verified_payload<'a>(archive: &'a [u8], crc: &[u8]) -> Result<&'a [u8], ArchiveError> {
    let declared = read_u32_le(archive).ok_or(ArchiveError::TooShort { len: archive.len() })?
        as usize;
    let available = archive.len() - HEADER_LEN;
    if declared > available {
        return Err(ArchiveError::PayloadOutOfRange {
            declared,
            available,
        });
    }
    let payload = &archive[HEADER_LEN..HEADER_LEN + declared];

    let expected = read_u32_le(crc).ok_or(ArchiveError::MissingChecksum)?;
    let actual = crc32fast::hash(payload);
    if expected != actual {
        return Err(ArchiveError::ChecksumMismatch { expected, actual });
    }
    Ok(payload)
}

/// Decode all entries of a verified payload.
///
/// # Errors
///
/// Fails if any key or value is truncated.
pub fn decode_entries(payload: &[u8]) -> Result<BTreeMap<String, Vec<u8>>, ArchiveError> {
    let mut reader = WireReader::new(payload);
    let mut entries = BTreeMap::new();
    if reader.is_at_end() {
        return Ok(entries);
    }
    // Item count header; not reliable for append logs, entries are read to the end
    reader.read_varint()?;

    while !reader.is_at_end() {
        let key = reader.read_length_delimited()?;
        let value = reader.read_length_delimited()?;
        if key.is_empty() {
            continue;
        }
        entries.insert(String::from_utf8_lossy(key).into_owned(), value.to_vec());
    }
    Ok(entries)
}

/// Decode a string value stored with its inner length prefix.
pub fn decode_string(value: &[u8]) -> String {
    let mut reader = WireReader::new(value);
    match reader.read_length_delimited() {
        Ok(inner) if reader.is_at_end() => String::from_utf8_lossy(inner).into_owned(),
        _ => String::from_utf8_lossy(value).into_owned(),
    }
}

/// Verify and decode an archive into its key/value entries.
///
/// # Errors
///
/// See [`verified_payload`] and [`decode_entries`].
pub fn decode_archive(
    archive: &[u8],
    crc: &[u8],
) -> Result<BTreeMap<String, Vec<u8>>, ArchiveError> {
    let payload = verified_payload(archive, crc)?;
    decode_entries(payload)
}

/// Decode the account profile stored in a settings archive.
///
/// Returns `None` when the archive fails verification or carries none of
/// the known profile keys. A failed checksum never yields partial fields.
pub fn decode_profile(archive: &[u8], crc: &[u8]) -> Option<Profile> {
    let entries = match decode_archive(archive, crc) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Rejected settings archive: {}", e);
            return None;
        }
    };

    let get = |key: &str| entries.get(key).map(|v| decode_string(v));
    let user_id = get(KEY_USER_ID);
    let alias = get(KEY_ALIAS);
    let nickname = get(KEY_NICKNAME);
    let avatar = get(KEY_AVATAR);
    let avatar_hd = get(KEY_AVATAR_HD);

    if user_id.is_none() && alias.is_none() && nickname.is_none() {
        return None;
    }

    let mut profile = Profile::new(&user_id.unwrap_or_default());
    profile.alias = alias.unwrap_or_default();
    profile.nickname = nickname.unwrap_or_default();
    profile.avatar = avatar.unwrap_or_default();
    profile.avatar_hd = avatar_hd.unwrap_or_default();
    Some(profile)
}

/// Archive encoding, used to synthesize settings files for fixtures.
pub mod encode {
    use crate::wire::encode::varint;

    /// Build `(archive, crc)` bytes for string entries.
    pub fn archive(entries: &[(&str, &str)]) -> (Vec<u8>, Vec<u8>) {
        let mut payload = Vec::new();
        varint(entries.len() as u64, &mut payload);
        for (key, value) in entries {
            varint(key.len() as u64, &mut payload);
            payload.extend_from_slice(key.as_bytes());

            let mut inner = Vec::new();
            varint(value.len() as u64, &mut inner);
            inner.extend_from_slice(value.as_bytes());
            varint(inner.len() as u64, &mut payload);
            payload.extend_from_slice(&inner);
        }

        let mut data = (payload.len() as u32).to_le_bytes().to_vec();
        data.extend_from_slice(&payload);
        // Mapped files are page-padded
        data.resize(data.len() + 64, 0);

        let mut crc = crc32fast::hash(&payload).to_le_bytes().to_vec();
        crc.extend_from_slice(&[0u8; 12]);
        (data, crc)
    }
}
