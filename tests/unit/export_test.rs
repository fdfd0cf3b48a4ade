//! Unit tests for the export orchestrator

use std::fs::{self, File};
use std::io::{self, BufWriter};
use std::path::{Path, PathBuf};
use std::sync::Mutex;

use tempfile::TempDir;

use wxexport::normalizer::{folder_name, CancelFlag, JsonLinesSink, VecSink};
use wxexport::services::FileCopier;
use wxexport::{Exporter, NormalizedMessage, SinkControl};

use crate::helpers::{load, sample_backup, FRIEND, ROOM};

#[test]
fn load_returns_contacts_and_sessions() {
    let backup = sample_backup();
    let loaded = load(&backup);
    let data = Exporter::new(&loaded.index, &loaded.account).load().unwrap();
    assert_eq!(data.contacts.len(), 2);
    assert_eq!(data.sessions.len(), 3);
}

#[test]
fn parallel_export_writes_one_file_per_session() {
    let backup = sample_backup();
    let loaded = load(&backup);
    let out = TempDir::new().unwrap();

    let exporter = Exporter::new(&loaded.index, &loaded.account).with_workers(4);
    let reports = exporter.export_sessions(&loaded.contacts, &loaded.sessions, out.path(), |session| {
        let file = File::create(out.path().join(format!("{}.jsonl", folder_name(session)))).unwrap();
        JsonLinesSink::new(BufWriter::new(file))
    });

    let counts: Vec<(String, usize)> = reports
        .iter()
        .map(|r| (r.user_id.clone(), r.outcome.emitted))
        .collect();
    assert_eq!(
        counts,
        vec![(FRIEND.to_string(), 5), (ROOM.to_string(), 2), (String::new(), 1)]
    );

    let friend = fs::read_to_string(out.path().join(format!("{}.jsonl", FRIEND))).unwrap();
    let lines: Vec<&str> = friend.lines().collect();
    assert_eq!(lines.len(), 5);
    let first: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
    assert_eq!(first["kind"], "text");
    assert_eq!(first["fields"]["body"], "hello");
    assert!(out.path().join(format!("{}_files/Image/3.jpg", FRIEND)).is_file());
}

#[test]
fn stopping_sink_cancels_remaining_sessions() {
    let backup = sample_backup();
    let loaded = load(&backup);
    let out = TempDir::new().unwrap();

    let cancel = CancelFlag::new();
    let exporter = Exporter::new(&loaded.index, &loaded.account)
        .with_workers(1)
        .with_cancel_flag(cancel.clone());
    let reports = exporter.export_sessions(&loaded.contacts, &loaded.sessions, out.path(), |_| {
        |_: &[NormalizedMessage]| SinkControl::Stop
    });

    assert!(cancel.is_cancelled());
    assert_eq!(reports.len(), 3);
    assert_eq!(reports[0].outcome.emitted, 1);
    assert!(reports.iter().all(|r| r.outcome.cancelled));
    assert!(reports[1..].iter().all(|r| r.outcome.emitted == 0));
}

#[test]
fn parallel_cancellation_reaches_every_session() {
    let backup = sample_backup();
    let loaded = load(&backup);
    let out = TempDir::new().unwrap();

    let exporter = Exporter::new(&loaded.index, &loaded.account).with_workers(3);
    let reports = exporter.export_sessions(&loaded.contacts, &loaded.sessions, out.path(), |_| {
        |_: &[NormalizedMessage]| SinkControl::Stop
    });

    assert!(exporter.cancel_flag().is_cancelled());
    assert!(reports.iter().all(|r| r.outcome.emitted <= 1 && r.outcome.cancelled));
}

#[derive(Default)]
struct RecordingCopier(Mutex<Vec<PathBuf>>);

impl FileCopier for RecordingCopier {
    fn copy(&self, _src: &Path, dest: &Path) -> io::Result<()> {
        self.0.lock().unwrap().push(dest.to_path_buf());
        Ok(())
    }
}

#[test]
fn local_media_goes_through_the_copier() {
    let backup = sample_backup();
    let loaded = load(&backup);
    let out = TempDir::new().unwrap();

    let copier = RecordingCopier::default();
    let exporter = Exporter::new(&loaded.index, &loaded.account).with_copier(&copier);
    let reports = exporter.export_sessions(
        &loaded.contacts,
        std::slice::from_ref(loaded.session(FRIEND)),
        out.path(),
        |_| VecSink::default(),
    );

    assert_eq!(reports[0].outcome.emitted, 5);
    let copied = copier.0.lock().unwrap();
    assert_eq!(
        *copied,
        vec![out.path().join(format!("{}_files/Image/3.jpg", FRIEND))]
    );
}
