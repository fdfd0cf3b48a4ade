//! Media resolution for one in-flight session.
//!
//! Local media is looked up in the backup and copied into the output
//! folder. Remote-only media goes through the downloader. Every result is
//! a path relative to the output folder, or `None` when the media could not
//! be materialized.
//!
//! Avatars and stickers land in folders shared by every session of an
//! export. A [`MediaLedger`] shared by the concurrent sessions makes sure
//! each destination is produced by exactly one of them.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, OnceLock, PoisonError};
use std::time::{Duration, Instant};

use tracing::{debug, warn};

use crate::backup::BackupIndex;
use crate::services::{DownloadError, Downloader, FileCopier};

/// Outcome per output destination, shared by the sessions of one export.
///
/// The first session to claim a destination produces it; others asking for
/// the same destination wait for that outcome instead of writing the file
/// again.
#[derive(Debug, Clone, Default)]
pub(crate) struct MediaLedger(Arc<Mutex<HashMap<String, Arc<OnceLock<bool>>>>>);

impl MediaLedger {
    pub(crate) fn new() -> Self {
        Self::default()
    }

    fn resolve(&self, dest: &str, produce: impl FnOnce() -> bool) -> bool {
        let slot = {
            let mut slots = self.0.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(slots.entry(dest.to_string()).or_default())
        };
        *slot.get_or_init(produce)
    }

    #[cfg(test)]
    fn len(&self) -> usize {
        self.0.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// Owned by a single normalization run and never shared between sessions.
pub(crate) struct MediaResolver<'a> {
    index: &'a BackupIndex,
    output_dir: &'a Path,
    downloader: &'a dyn Downloader,
    copier: &'a dyn FileCopier,
    timeout: Duration,
    ledger: &'a MediaLedger,
    /// Destination -> whether it was materialized
    done: HashMap<String, bool>,
}

impl<'a> MediaResolver<'a> {
    pub(crate) fn new(
        index: &'a BackupIndex,
        output_dir: &'a Path,
        downloader: &'a dyn Downloader,
        copier: &'a dyn FileCopier,
        timeout: Duration,
        ledger: &'a MediaLedger,
    ) -> Self {
        Self {
            index,
            output_dir,
            downloader,
            copier,
            timeout,
            ledger,
            done: HashMap::new(),
        }
    }

    /// Copy the first candidate present in the backup to `dest`.
    pub(crate) fn copy_local(&mut self, candidates: &[String], dest: &str) -> Option<String> {
        if let Some(&ok) = self.done.get(dest) {
            return ok.then(|| dest.to_string());
        }
        let ok = self.ledger.resolve(dest, || self.try_copy(candidates, dest));
        self.done.insert(dest.to_string(), ok);
        ok.then(|| dest.to_string())
    }

    fn try_copy(&self, candidates: &[String], dest: &str) -> bool {
        let Some(src) = candidates.iter().find_map(|c| self.index.real_path(c)) else {
            debug!("No stored copy of {:?}", candidates);
            return false;
        };
        match self.copier.copy(&src, &self.output_dir.join(dest)) {
            Ok(()) => true,
            Err(e) => {
                warn!("Failed to copy {:?} to {}: {}", src, dest, e);
                false
            }
        }
    }

    /// Fetch `url` into `dest` unless an earlier run already produced it.
    pub(crate) fn fetch_remote(&mut self, url: &str, dest: &str) -> Option<String> {
        if url.is_empty() {
            return None;
        }
        if let Some(&ok) = self.done.get(dest) {
            return ok.then(|| dest.to_string());
        }
        let target = self.output_dir.join(dest);
        let ok = self
            .ledger
            .resolve(dest, || target.exists() || self.try_fetch(url, &target));
        self.done.insert(dest.to_string(), ok);
        ok.then(|| dest.to_string())
    }

    fn try_fetch(&self, url: &str, target: &Path) -> bool {
        let started = Instant::now();
        match self.downloader.fetch(url, target, self.timeout) {
            Ok(()) => true,
            Err(DownloadError::Unavailable) => false,
            Err(e) => {
                warn!(
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "Media download failed: {}", e
                );
                false
            }
        }
    }
}
