//! Prefix filters over the sorted backup index.
//!
//! Every filter has a fixed virtual-path prefix. Matching is split in two:
//! [`PathFilter::range`] bounds the search to the contiguous block of sorted
//! entries sharing the prefix, then [`PathFilter::matches`] and
//! [`PathFilter::capture`] inspect only the remainder of each candidate.

use std::sync::OnceLock;

use regex::Regex;

use super::index::BackupFileEntry;
use super::{join_virtual, normalize_virtual_path};

const DOCUMENTS: &str = "Documents/";
const MMKV_DIR: &str = "Documents/MMappedKV/";
const MMSETTING_PREFIX: &str = "mmsetting.archive.";
const CRC_SUFFIX: &str = ".crc";
const USER_FOLDER_LEN: usize = 32;

fn message_shard_regex() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"^(message_[0-9]{1,4}\.sqlite)$").expect("shard pattern is valid")
    })
}

/// A virtual-path predicate with an optional captured value.
#[derive(Debug, Clone)]
pub enum PathFilter {
    /// Remainder after `prefix` contains `needle`. Captures the remainder.
    Literal { prefix: String, needle: String },

    /// Remainder after `prefix` matches `pattern`. Captures group 1, or the
    /// whole match when the pattern has no group.
    Pattern { prefix: String, pattern: Regex },

    /// `Documents/` followed by exactly one 32-character path component.
    /// Captures the folder name (the hashed account id).
    UserFolder,

    /// Path starts with `prefix` and does not end with `suffix`. Captures
    /// the path after `strip`.
    ExcludeSuffix {
        prefix: String,
        strip: String,
        suffix: String,
    },
}

impl PathFilter {
    /// Literal filter: entries under `prefix` whose remainder contains `needle`.
    pub fn literal(prefix: &str, needle: &str) -> Self {
        PathFilter::Literal {
            prefix: normalize_virtual_path(prefix),
            needle: needle.to_string(),
        }
    }

    /// Pattern filter: entries under `prefix` whose remainder matches `pattern`.
    ///
    /// # Errors
    ///
    /// Returns an error if `pattern` is not a valid regular expression.
    pub fn pattern(prefix: &str, pattern: &str) -> Result<Self, regex::Error> {
        Ok(PathFilter::Pattern {
            prefix: normalize_virtual_path(prefix),
            pattern: Regex::new(pattern)?,
        })
    }

    /// Message table shards (`DB/message_<n>.sqlite`) of one account folder.
    pub fn message_shards(user_root: &str) -> Self {
        PathFilter::Pattern {
            prefix: join_virtual(user_root, "DB/"),
            pattern: message_shard_regex().clone(),
        }
    }

    /// Per-account folders (`Documents/<32 chars>`).
    pub fn user_folders() -> Self {
        PathFilter::UserFolder
    }

    /// Cell-data files (`celldata<version>`) below a session folder.
    pub fn session_cell_data(session_folder: &str, version: &str) -> Self {
        let mut prefix = normalize_virtual_path(session_folder);
        if !prefix.ends_with('/') {
            prefix.push('/');
        }
        PathFilter::Literal {
            prefix,
            needle: format!("celldata{}", version),
        }
    }

    /// Settings archives in `Documents/MMappedKV`, excluding `.crc` companions.
    ///
    /// With `uid_hash` set only that account's archive matches.
    pub fn mmsetting_archives(uid_hash: Option<&str>) -> Self {
        let prefix = match uid_hash {
            Some(hash) => format!("{}{}{}", MMKV_DIR, MMSETTING_PREFIX, hash),
            None => format!("{}{}", MMKV_DIR, MMSETTING_PREFIX),
        };
        PathFilter::ExcludeSuffix {
            prefix,
            strip: MMKV_DIR.to_string(),
            suffix: CRC_SUFFIX.to_string(),
        }
    }

    /// Prefix every matching path starts with.
    pub fn prefix(&self) -> &str {
        match self {
            PathFilter::Literal { prefix, .. }
            | PathFilter::Pattern { prefix, .. }
            | PathFilter::ExcludeSuffix { prefix, .. } => prefix,
            PathFilter::UserFolder => DOCUMENTS,
        }
    }

    /// Check whether a virtual path satisfies the filter.
    pub fn matches(&self, path: &str) -> bool {
        let Some(rest) = path.strip_prefix(self.prefix()) else {
            return false;
        };
        match self {
            PathFilter::Literal { needle, .. } => rest.contains(needle.as_str()),
            PathFilter::Pattern { pattern, .. } => pattern.is_match(rest),
            PathFilter::UserFolder => rest.len() == USER_FOLDER_LEN && !rest.contains('/'),
            PathFilter::ExcludeSuffix { suffix, .. } => !path.ends_with(suffix.as_str()),
        }
    }

    /// Extract the captured value from a matching path.
    ///
    /// Returns `None` for paths the filter does not match.
    pub fn capture(&self, path: &str) -> Option<String> {
        if !self.matches(path) {
            return None;
        }
        let rest = &path[self.prefix().len()..];
        match self {
            PathFilter::Literal { .. } | PathFilter::UserFolder => Some(rest.to_string()),
            PathFilter::Pattern { pattern, .. } => {
                let caps = pattern.captures(rest)?;
                caps.get(1)
                    .or_else(|| caps.get(0))
                    .map(|m| m.as_str().to_string())
            }
            PathFilter::ExcludeSuffix { strip, .. } => {
                path.strip_prefix(strip.as_str()).map(str::to_string)
            }
        }
    }

    /// Contiguous slice of sorted `entries` that start with the prefix.
    pub(crate) fn range<'a>(&self, entries: &'a [BackupFileEntry]) -> &'a [BackupFileEntry] {
        let prefix = self.prefix();
        let start = entries.partition_point(|e| e.relative_path.as_str() < prefix);
        let len = entries[start..].partition_point(|e| e.relative_path.starts_with(prefix));
        &entries[start..start + len]
    }
}
