//! Export orchestration for one account.
//!
//! Contacts and sessions are extracted first and stay read-only while
//! sessions are normalized. Sessions run in parallel on a dedicated rayon
//! pool, each with its own sink and scratch state. A single [`CancelFlag`]
//! is shared by all of them.

use std::path::Path;

use rayon::prelude::*;
use serde::Serialize;
use tracing::{info, warn};

use crate::accounts::Account;
use crate::backup::BackupIndex;
use crate::contacts::ContactExtractor;
use crate::error::ExtractError;
use crate::model::{ContactBook, Session};
use crate::normalizer::{CancelFlag, MessageNormalizer, MessageSink, NormalizeOutcome, ParseOptions};
use crate::services::{Downloader, FileCopier, FsCopier, NoDownloader};
use crate::sessions::{SessionExtractor, DEFAULT_CELL_DATA_VERSION};

static NO_DOWNLOADER: NoDownloader = NoDownloader;
static FS_COPIER: FsCopier = FsCopier;

/// Contacts and sessions of one account.
#[derive(Debug, Clone)]
pub struct AccountData {
    pub contacts: ContactBook,
    pub sessions: Vec<Session>,
}

/// Outcome of exporting one session.
#[derive(Debug, Clone, Serialize)]
pub struct SessionReport {
    pub user_id: String,
    pub display_name: String,
    pub outcome: NormalizeOutcome,
    /// Output of the session could not be completed
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

pub struct Exporter<'a> {
    index: &'a BackupIndex,
    group: Option<&'a BackupIndex>,
    account: &'a Account,
    options: ParseOptions,
    detailed_contacts: bool,
    cell_data_version: String,
    workers: usize,
    downloader: &'a dyn Downloader,
    copier: &'a dyn FileCopier,
    cancel: CancelFlag,
}

impl<'a> Exporter<'a> {
    pub fn new(index: &'a BackupIndex, account: &'a Account) -> Self {
        Self {
            index,
            group: None,
            account,
            options: ParseOptions::default(),
            detailed_contacts: true,
            cell_data_version: DEFAULT_CELL_DATA_VERSION.to_string(),
            workers: 1,
            downloader: &NO_DOWNLOADER,
            copier: &FS_COPIER,
            cancel: CancelFlag::new(),
        }
    }

    /// Also read the account's chat list from the shared app-group index.
    pub fn with_group_index(mut self, group: &'a BackupIndex) -> Self {
        self.group = Some(group);
        self
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
        self
    }

    pub fn with_detailed_contacts(mut self, detailed: bool) -> Self {
        self.detailed_contacts = detailed;
        self
    }

    pub fn with_cell_data_version(mut self, version: &str) -> Self {
        self.cell_data_version = version.to_string();
        self
    }

    /// Sessions normalized at once (at least one).
    pub fn with_workers(mut self, workers: usize) -> Self {
        self.workers = workers.max(1);
        self
    }

    pub fn with_downloader(mut self, downloader: &'a dyn Downloader) -> Self {
        self.downloader = downloader;
        self
    }

    pub fn with_copier(mut self, copier: &'a dyn FileCopier) -> Self {
        self.copier = copier;
        self
    }

    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = cancel;
        self
    }

    pub fn cancel_flag(&self) -> CancelFlag {
        self.cancel.clone()
    }

    /// Extract the account's contacts, then its sessions.
    ///
    /// # Errors
    ///
    /// Fails if the contact store exists but cannot be read.
    pub fn load(&self) -> Result<AccountData, ExtractError> {
        let user_root = self.account.user_root();
        let contacts = ContactExtractor::new(self.detailed_contacts).extract(self.index, &user_root)?;
        let sessions = SessionExtractor::new(&self.cell_data_version).extract_with_group(
            self.index,
            self.group,
            &user_root,
            &contacts,
        );
        Ok(AccountData { contacts, sessions })
    }

    fn normalizer<'s>(&'s self, contacts: &'s ContactBook, output_dir: &Path) -> MessageNormalizer<'s> {
        MessageNormalizer::new(
            self.index,
            &self.account.profile,
            contacts,
            &self.account.user_root(),
            output_dir,
        )
        .with_options(self.options.clone())
        .with_downloader(self.downloader)
        .with_copier(self.copier)
        .with_cancel_flag(self.cancel.clone())
    }

    /// Normalize `sessions` into sinks made by `make_sink`.
    ///
    /// Reports come back in the order of `sessions`. Once any sink stops or
    /// fails to finish, sessions still running halt and sessions not yet
    /// started report as cancelled without emitting.
    pub fn export_sessions<F, S>(
        &self,
        contacts: &ContactBook,
        sessions: &[Session],
        output_dir: &Path,
        make_sink: F,
    ) -> Vec<SessionReport>
    where
        F: Fn(&Session) -> S + Sync,
        S: MessageSink,
    {
        let normalizer = self.normalizer(contacts, output_dir);
        let run = |session: &Session| {
            let mut sink = make_sink(session);
            let outcome = normalizer.normalize(session, &mut sink);
            let error = match sink.finish() {
                Ok(()) => None,
                Err(e) => {
                    warn!("Failed to finish output of {}: {}", session.output_name(), e);
                    self.cancel.cancel();
                    Some(e.to_string())
                }
            };
            SessionReport {
                user_id: session.user_id.clone(),
                display_name: session.display_name.clone(),
                outcome,
                error,
            }
        };

        let reports: Vec<SessionReport> = if self.workers == 1 || sessions.len() <= 1 {
            sessions.iter().map(run).collect()
        } else {
            match rayon::ThreadPoolBuilder::new()
                .num_threads(self.workers)
                .thread_name(|i| format!("export-{}", i))
                .build()
            {
                Ok(pool) => pool.install(|| sessions.par_iter().map(run).collect()),
                Err(e) => {
                    warn!("Failed to create thread pool, exporting sequentially: {}", e);
                    sessions.iter().map(run).collect()
                }
            }
        };

        let emitted: usize = reports.iter().map(|r| r.outcome.emitted).sum();
        info!(
            sessions = reports.len(),
            emitted,
            cancelled = self.cancel.is_cancelled(),
            "Exported account {}",
            self.account.display_name()
        );
        reports
    }
}
