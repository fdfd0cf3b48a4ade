//! Backup container errors.

use std::path::PathBuf;

/// Errors raised while opening a backup container.
///
/// Only container-level problems surface here. Missing files inside a
/// readable backup are reported as empty lookups instead.
#[derive(Debug, thiserror::Error)]
pub enum BackupError {
    #[error("Backup directory not found: {path}")]
    NotFound { path: PathBuf },

    #[error("Unsupported backup at {path}: {reason}")]
    Unsupported { path: PathBuf, reason: String },
}

impl BackupError {
    /// Check if the backup exists but cannot be read (e.g. it is encrypted).
    pub fn is_unsupported(&self) -> bool {
        matches!(self, BackupError::Unsupported { .. })
    }
}
