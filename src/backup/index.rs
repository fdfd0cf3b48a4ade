//! Sorted catalog of backed-up files.
//!
//! The index is loaded once from `Manifest.db` and is read-only afterwards.
//! Entries are kept sorted by virtual path so that prefix lookups can be
//! bounded with a binary search instead of scanning every opaque filename.

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{Connection, OpenFlags};
use tracing::{debug, info};

use super::error::BackupError;
use super::filter::PathFilter;
use super::normalize_virtual_path;

/// App domain holding the messenger's sandbox.
pub const DEFAULT_DOMAIN: &str = "AppDomain-com.tencent.xin";

/// App-group container the messenger shares with its extensions.
pub const GROUP_DOMAIN: &str = "AppDomainGroup-group.com.tencent.xin";

const MANIFEST_DB: &str = "Manifest.db";

/// Kind of a backed-up item, taken from the manifest `flags` column.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EntryKind {
    File,
    Directory,
    Other,
}

impl EntryKind {
    fn from_flags(flags: i64) -> Self {
        match flags {
            1 => EntryKind::File,
            2 => EntryKind::Directory,
            _ => EntryKind::Other,
        }
    }
}

/// One backed-up item: its original path and its opaque storage id.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BackupFileEntry {
    pub relative_path: String,
    pub file_id: String,
    pub kind: EntryKind,
}

impl BackupFileEntry {
    pub fn new(relative_path: &str, file_id: &str, kind: EntryKind) -> Self {
        Self {
            relative_path: normalize_virtual_path(relative_path),
            file_id: file_id.to_string(),
            kind,
        }
    }
}

/// Read-only, sorted view over one app domain of a backup.
#[derive(Debug, Clone)]
pub struct BackupIndex {
    root: PathBuf,
    entries: Vec<BackupFileEntry>,
}

impl BackupIndex {
    /// Load the index for `domain` from `<root>/Manifest.db`.
    ///
    /// # Errors
    ///
    /// Returns [`BackupError::NotFound`] when `root` does not exist and
    /// [`BackupError::Unsupported`] when the manifest is missing or cannot be
    /// read as SQLite, which is how encrypted backups present themselves.
    pub fn open<P: AsRef<Path>>(root: P, domain: &str) -> Result<Self, BackupError> {
        let root = root.as_ref();
        if !root.is_dir() {
            return Err(BackupError::NotFound {
                path: root.to_path_buf(),
            });
        }

        let manifest = root.join(MANIFEST_DB);
        if !manifest.is_file() {
            return Err(BackupError::Unsupported {
                path: root.to_path_buf(),
                reason: "Manifest.db is missing".to_string(),
            });
        }

        let unsupported = |e: rusqlite::Error| BackupError::Unsupported {
            path: root.to_path_buf(),
            reason: format!("Manifest.db is not readable (encrypted backup?): {}", e),
        };

        let conn = Connection::open_with_flags(
            &manifest,
            OpenFlags::SQLITE_OPEN_READ_ONLY | OpenFlags::SQLITE_OPEN_NO_MUTEX,
        )
        .map_err(unsupported)?;

        let mut stmt = conn
            .prepare("SELECT fileID, relativePath, flags FROM Files WHERE domain = ?1")
            .map_err(unsupported)?;
        let rows = stmt
            .query_map([domain], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, Option<String>>(1)?,
                    row.get::<_, Option<i64>>(2)?,
                ))
            })
            .map_err(unsupported)?;

        let mut entries = Vec::new();
        for row in rows {
            let (file_id, relative_path, flags) = row.map_err(unsupported)?;
            // The domain root itself has an empty path and is never looked up
            let Some(relative_path) = relative_path.filter(|p| !p.is_empty()) else {
                continue;
            };
            entries.push(BackupFileEntry::new(
                &relative_path,
                &file_id,
                EntryKind::from_flags(flags.unwrap_or(1)),
            ));
        }

        let index = Self::from_entries(root, entries);
        info!(
            domain,
            entries = index.len(),
            "Loaded backup index from {:?}",
            manifest
        );
        Ok(index)
    }

    /// Build an index from already-decoded entries.
    ///
    /// Entries are sorted by virtual path; for duplicate paths the first
    /// entry in input order is kept.
    pub fn from_entries<P, I>(root: P, entries: I) -> Self
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = BackupFileEntry>,
    {
        let mut entries: Vec<BackupFileEntry> = entries.into_iter().collect();
        // Stable sort keeps input order among equal paths so dedup keeps the first
        entries.sort_by(|a, b| a.relative_path.cmp(&b.relative_path));
        let before = entries.len();
        entries.dedup_by(|later, earlier| later.relative_path == earlier.relative_path);
        if entries.len() != before {
            debug!(
                dropped = before - entries.len(),
                "Dropped duplicate manifest paths"
            );
        }

        Self {
            root: root.as_ref().to_path_buf(),
            entries,
        }
    }

    /// Backup root directory.
    pub fn root(&self) -> &Path {
        &self.root
    }

    /// All entries in virtual-path order.
    pub fn entries(&self) -> &[BackupFileEntry] {
        &self.entries
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Exact lookup by virtual path.
    pub fn find(&self, virtual_path: &str) -> Option<&BackupFileEntry> {
        let virtual_path = normalize_virtual_path(virtual_path);
        self.entries
            .binary_search_by(|e| e.relative_path.as_str().cmp(virtual_path.as_str()))
            .ok()
            .map(|i| &self.entries[i])
    }

    /// On-disk location of a file entry's bytes.
    ///
    /// Modern backups shard storage by the first two characters of the id;
    /// older flat layouts keep every file in the root.
    pub fn storage_path(&self, entry: &BackupFileEntry) -> PathBuf {
        if let Some(shard) = entry.file_id.get(..2) {
            let sharded = self.root.join(shard).join(&entry.file_id);
            if sharded.exists() {
                return sharded;
            }
        }
        self.root.join(&entry.file_id)
    }

    /// Resolve a virtual path to the on-disk file, if the file is present.
    pub fn real_path(&self, virtual_path: &str) -> Option<PathBuf> {
        let entry = self.find(virtual_path)?;
        if entry.kind == EntryKind::Directory {
            return None;
        }
        let path = self.storage_path(entry);
        path.is_file().then_some(path)
    }

    /// Read the bytes of a backed-up file.
    pub fn read(&self, virtual_path: &str) -> Option<Vec<u8>> {
        let path = self.real_path(virtual_path)?;
        match fs::read(&path) {
            Ok(bytes) => Some(bytes),
            Err(e) => {
                debug!("Failed to read {:?} ({}): {}", path, virtual_path, e);
                None
            }
        }
    }

    /// Entries matching `filter`, in virtual-path order.
    ///
    /// Only the contiguous range sharing the filter's prefix is inspected.
    pub fn filter<'a>(
        &'a self,
        filter: &'a PathFilter,
    ) -> impl Iterator<Item = &'a BackupFileEntry> + 'a {
        filter
            .range(&self.entries)
            .iter()
            .filter(move |e| filter.matches(&e.relative_path))
    }

    /// Matching entries paired with the value the filter captures from each.
    pub fn filter_parsed<'a>(&'a self, filter: &PathFilter) -> Vec<(&'a BackupFileEntry, String)> {
        filter
            .range(&self.entries)
            .iter()
            .filter_map(|e| filter.capture(&e.relative_path).map(|c| (e, c)))
            .collect()
    }
}
