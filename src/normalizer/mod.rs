//! Turns stored message rows into render-ready records.
//!
//! Rows of a session are streamed from every shard that holds its table,
//! merged in `(CreateTime, MesLocalID)` order and normalized one at a time.
//! Each record is handed to the sink before the next row is decoded, so a
//! sink that stops halts the session immediately.

mod forward;
mod media;
mod options;
mod row;
mod sink;
mod stream;
pub mod xml;

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use crate::backup::BackupIndex;
use crate::model::{ContactBook, NormalizedMessage, Profile, RawMessageRow, Session};
use crate::services::{Downloader, FileCopier, FsCopier, NoDownloader};

use media::{MediaLedger, MediaResolver};
use row::SessionContext;
use stream::RowStream;

pub use forward::MAX_FORWARD_DEPTH;
pub use options::{flags, ParseOptions, SortOrder, DEFAULT_DOWNLOAD_TIMEOUT};
pub use row::{
    classify, escape_html, folder_name, format_time, placeholder, RowError, MISSING_MEDIA,
    TIME_FORMAT,
};
pub use sink::{CancelFlag, JsonLinesSink, MessageSink, SinkControl, VecSink};

/// Raw type codes of stored messages.
pub mod types {
    pub use super::row::{
        APP_FILE, APP_FORWARDED, APP_QUOTE, MSG_APP, MSG_AUDIO, MSG_CARD, MSG_IMAGE, MSG_LOCATION,
        MSG_NOTICE, MSG_REVOKE, MSG_SHORT_VIDEO, MSG_STICKER, MSG_TEXT, MSG_VIDEO,
    };
}

static NO_DOWNLOADER: NoDownloader = NoDownloader;
static FS_COPIER: FsCopier = FsCopier;

/// Result of normalizing one session.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct NormalizeOutcome {
    /// Records accepted by the sink
    pub emitted: usize,
    /// Rows dropped as undecodable
    pub skipped: usize,
    /// The sink or the shared flag stopped the session early
    pub cancelled: bool,
}

/// Normalizes the sessions of one account.
///
/// Holds shared read-only state plus a synchronized ledger of shared media;
/// per-session scratch lives inside [`MessageNormalizer::normalize`], so one
/// normalizer can serve several sessions concurrently.
pub struct MessageNormalizer<'a> {
    index: &'a BackupIndex,
    owner: &'a Profile,
    contacts: &'a ContactBook,
    user_root: String,
    output_dir: PathBuf,
    options: ParseOptions,
    downloader: &'a dyn Downloader,
    copier: &'a dyn FileCopier,
    cancel: Option<CancelFlag>,
    media: MediaLedger,
}

impl<'a> MessageNormalizer<'a> {
    pub fn new(
        index: &'a BackupIndex,
        owner: &'a Profile,
        contacts: &'a ContactBook,
        user_root: &str,
        output_dir: impl Into<PathBuf>,
    ) -> Self {
        Self {
            index,
            owner,
            contacts,
            user_root: user_root.to_string(),
            output_dir: output_dir.into(),
            options: ParseOptions::default(),
            downloader: &NO_DOWNLOADER,
            copier: &FS_COPIER,
            cancel: None,
            media: MediaLedger::new(),
        }
    }

    pub fn with_options(mut self, options: ParseOptions) -> Self {
        self.options = options;
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

    /// Share a cancellation flag; a stopping sink also raises it.
    pub fn with_cancel_flag(mut self, cancel: CancelFlag) -> Self {
        self.cancel = Some(cancel);
        self
    }

    pub fn options(&self) -> &ParseOptions {
        &self.options
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    fn is_cancelled(&self) -> bool {
        self.cancel.as_ref().is_some_and(CancelFlag::is_cancelled)
    }

    /// Normalize every row of `session` into `sink`.
    pub fn normalize<S>(&self, session: &Session, sink: &mut S) -> NormalizeOutcome
    where
        S: MessageSink + ?Sized,
    {
        let shards = stream::open_shards(self.index, session);
        let mut queries = stream::prepare(&shards, &session.table_name(), self.options.order);
        let mut rows = RowStream::new(&mut queries, self.options.order);
        let mut outcome = self.normalize_rows(session, &mut rows, sink);
        outcome.skipped += rows.skipped();
        info!(
            emitted = outcome.emitted,
            skipped = outcome.skipped,
            cancelled = outcome.cancelled,
            "Normalized session {}",
            session.output_name()
        );
        outcome
    }

    /// Normalize `rows` in the order given.
    pub fn normalize_rows<S, I>(&self, session: &Session, rows: I, sink: &mut S) -> NormalizeOutcome
    where
        S: MessageSink + ?Sized,
        I: IntoIterator<Item = RawMessageRow>,
    {
        let ctx = SessionContext::new(
            session,
            self.contacts.get(&session.user_id),
            self.options.icons_in_session,
        );
        let mut media = MediaResolver::new(
            self.index,
            &self.output_dir,
            self.downloader,
            self.copier,
            self.options.download_timeout,
            &self.media,
        );

        let mut outcome = NormalizeOutcome::default();
        let mut rows = rows.into_iter();
        loop {
            if self.is_cancelled() {
                outcome.cancelled = true;
                break;
            }
            let Some(row) = rows.next() else {
                break;
            };
            let record = match self.build_record(&ctx, &mut media, &row) {
                Ok(record) => record,
                Err(e) => {
                    debug!(msg_id = row.msg_id, msg_type = row.msg_type, "Skipping row: {}", e);
                    outcome.skipped += 1;
                    continue;
                }
            };
            outcome.emitted += 1;
            if sink.accept(std::slice::from_ref(&record)) == SinkControl::Stop {
                outcome.cancelled = true;
                if let Some(cancel) = &self.cancel {
                    cancel.cancel();
                }
                break;
            }
        }
        outcome
    }

    /// Normalize a single row with fresh scratch state.
    ///
    /// # Errors
    ///
    /// Fails when the row's payload cannot be decoded.
    pub fn normalize_row(&self, session: &Session, row: &RawMessageRow) -> Result<NormalizedMessage, RowError> {
        let ctx = SessionContext::new(
            session,
            self.contacts.get(&session.user_id),
            self.options.icons_in_session,
        );
        let mut media = MediaResolver::new(
            self.index,
            &self.output_dir,
            self.downloader,
            self.copier,
            self.options.download_timeout,
            &self.media,
        );
        self.build_record(&ctx, &mut media, row)
    }
}
