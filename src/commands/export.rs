//! Export command handler

use anyhow::{bail, Context, Result};
use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::Path;
use tracing::warn;

use wxexport::export::AccountData;
use wxexport::model::{NormalizedMessage, Session};
use wxexport::normalizer::{folder_name, CancelFlag, JsonLinesSink, SortOrder};
use wxexport::{Config, Exporter, MessageSink, SinkControl};

use super::{describe_account, open_account, open_group};
use crate::cli::{BackupArgs, OrderArg};

/// Command line switches that override the configuration.
#[derive(Debug, Default)]
pub struct Overrides {
    pub order: Option<OrderArg>,
    pub desc: bool,
    pub text_only: bool,
    pub no_avatars: bool,
    pub icons_in_session: bool,
    pub workers: Option<usize>,
}

impl Overrides {
    pub fn apply(&self, config: &mut Config) {
        if let Some(order) = self.order {
            config.export.order = order.into();
        }
        if self.desc {
            config.export.order = SortOrder::Descending;
        }
        if self.text_only {
            config.export.text_mode = true;
        }
        if self.no_avatars {
            config.media.avatars = false;
        }
        if self.icons_in_session {
            config.export.icons_in_session = true;
        }
        if let Some(workers) = self.workers {
            config.export.workers = Some(workers.max(1));
        }
    }
}

/// JSON lines file for one conversation.
enum SessionFile {
    Open(JsonLinesSink<BufWriter<File>>),
    Failed(String),
}

impl SessionFile {
    fn create(path: &Path) -> Self {
        match File::create(path) {
            Ok(file) => SessionFile::Open(JsonLinesSink::new(BufWriter::new(file))),
            Err(e) => {
                warn!("Failed to create {:?}: {}", path, e);
                SessionFile::Failed(format!("Failed to create {:?}: {}", path, e))
            }
        }
    }
}

impl MessageSink for SessionFile {
    fn accept(&mut self, batch: &[NormalizedMessage]) -> SinkControl {
        match self {
            SessionFile::Open(sink) => sink.accept(batch),
            SessionFile::Failed(_) => SinkControl::Stop,
        }
    }

    fn finish(&mut self) -> io::Result<()> {
        match self {
            SessionFile::Open(sink) => sink.finish(),
            SessionFile::Failed(reason) => Err(io::Error::new(io::ErrorKind::Other, reason.clone())),
        }
    }
}

fn is_selected(session: &Session, selected: &[String]) -> bool {
    selected.is_empty()
        || selected.iter().any(|s| {
            *s == session.user_id || *s == session.display_name || *s == session.hash
        })
}

/// Export the selected conversations of one account.
#[cfg(not(tarpaulin_include))]
pub fn handle(target: &BackupArgs, output: &Path, selected: &[String], config: &Config) -> Result<()> {
    let (index, account) = open_account(&target.backup, target.user.as_deref(), config)?;
    fs::create_dir_all(output)
        .with_context(|| format!("Failed to create output directory: {:?}", output))?;

    let cancel = CancelFlag::new();
    let flag = cancel.clone();
    ctrlc::set_handler(move || flag.cancel()).ok(); // Ignore if handler already set

    let group = open_group(&target.backup, config);
    let mut exporter = Exporter::new(&index, &account)
        .with_options(config.parse_options())
        .with_detailed_contacts(config.export.detailed_contacts)
        .with_cell_data_version(&config.export.cell_data_version)
        .with_workers(config.worker_count())
        .with_cancel_flag(cancel.clone());
    if let Some(group) = &group {
        exporter = exporter.with_group_index(group);
    }

    let AccountData { contacts, sessions } = exporter.load()?;
    let sessions: Vec<Session> = sessions
        .into_iter()
        .filter(|s| !s.is_empty() && is_selected(s, selected))
        .collect();
    if sessions.is_empty() {
        println!("Nothing to export for {}.", describe_account(&account));
        return Ok(());
    }

    println!(
        "Exporting {} conversations of {} to {}",
        sessions.len(),
        describe_account(&account),
        output.display()
    );
    let reports = exporter.export_sessions(&contacts, &sessions, output, |session| {
        SessionFile::create(&output.join(format!("{}.jsonl", folder_name(session))))
    });

    let summary_path = output.join("export.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&reports)?)
        .with_context(|| format!("Failed to write {:?}", summary_path))?;

    let emitted: usize = reports.iter().map(|r| r.outcome.emitted).sum();
    let skipped: usize = reports.iter().map(|r| r.outcome.skipped).sum();
    println!("Exported {} messages ({} skipped)", emitted, skipped);
    if cancel.is_cancelled() {
        println!("Export stopped before completion.");
    }
    let failed = reports.iter().filter(|r| r.error.is_some()).count();
    if failed > 0 {
        bail!(
            "{} conversations could not be written completely, see {:?}",
            failed,
            summary_path
        );
    }
    Ok(())
}
