//! Collaborators the normalizer delegates I/O to.
//!
//! Fetching remote media and materializing files are supplied by the
//! caller. The crate ships a downloader that never downloads and a copier
//! backed by the local filesystem.

use std::fs;
use std::io;
use std::path::Path;
use std::time::Duration;

/// Errors reported by a [`Downloader`].
#[derive(Debug, thiserror::Error)]
pub enum DownloadError {
    #[error("Remote downloads are disabled")]
    Unavailable,

    #[error("Timed out after {after:?} fetching {url}")]
    Timeout { url: String, after: Duration },

    #[error("Failed to fetch {url}: {reason}")]
    Failed { url: String, reason: String },

    #[error("Failed to write download: {0}")]
    Io(#[from] io::Error),
}

/// Fetches media that is referenced by URL and absent from the backup.
///
/// Implementations must give up once `timeout` elapses and return
/// [`DownloadError::Timeout`]; the caller then records the media as missing.
pub trait Downloader: Send + Sync {
    fn fetch(&self, url: &str, dest: &Path, timeout: Duration) -> Result<(), DownloadError>;
}

/// Downloader used when network access is not wanted.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoDownloader;

impl Downloader for NoDownloader {
    fn fetch(&self, _url: &str, _dest: &Path, _timeout: Duration) -> Result<(), DownloadError> {
        Err(DownloadError::Unavailable)
    }
}

/// Copies resolved backup files into the output layout.
pub trait FileCopier: Send + Sync {
    fn copy(&self, src: &Path, dest: &Path) -> io::Result<()>;
}

/// Copier backed by `std::fs`. Creates missing parent directories.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsCopier;

impl FileCopier for FsCopier {
    fn copy(&self, src: &Path, dest: &Path) -> io::Result<()> {
        if let Some(parent) = dest.parent() {
            fs::create_dir_all(parent)?;
        }
        fs::copy(src, dest).map(|_| ())
    }
}
