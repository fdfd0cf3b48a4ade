//! Access to an iTunes-style device backup.
//!
//! Backed-up files are stored under opaque content-addressed names, so every
//! lookup goes through a [`BackupIndex`] built from the backup's `Manifest.db`.
//! [`PathFilter`] values locate groups of entries (user folders, message
//! shards, settings archives) by virtual-path prefix.

mod error;
mod filter;
mod index;

pub use error::BackupError;
pub use filter::PathFilter;
pub use index::{BackupFileEntry, BackupIndex, EntryKind, DEFAULT_DOMAIN, GROUP_DOMAIN};

/// Normalize a virtual path: forward slashes, no leading separator.
pub fn normalize_virtual_path(path: &str) -> String {
    let replaced = path.replace('\\', "/");
    replaced.trim_start_matches('/').to_string()
}

/// Join a virtual folder and a child name with exactly one separator.
pub fn join_virtual(base: &str, child: &str) -> String {
    let base = normalize_virtual_path(base);
    let child = child.trim_start_matches('/');
    if base.is_empty() {
        child.to_string()
    } else if base.ends_with('/') {
        format!("{}{}", base, child)
    } else {
        format!("{}/{}", base, child)
    }
}
