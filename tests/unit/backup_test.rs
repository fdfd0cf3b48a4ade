//! Unit tests for the backup index and path filters

use std::fs;

use wxexport::backup::{EntryKind, DEFAULT_DOMAIN};
use wxexport::{BackupError, BackupIndex, PathFilter};

use crate::helpers::{owner_path, sample_backup, user_root, OWNER};

#[test]
fn open_indexes_only_the_app_domain() {
    let backup = sample_backup();
    let index = backup.index();

    assert!(index.find("Documents/x").is_none());
    assert!(index.find(&owner_path("DB/message_1.sqlite")).is_some());
    let paths: Vec<&str> = index.entries().iter().map(|e| e.relative_path.as_str()).collect();
    let mut sorted = paths.clone();
    sorted.sort();
    assert_eq!(paths, sorted);
}

#[test]
fn directories_have_no_real_path() {
    let backup = sample_backup();
    let index = backup.index();
    let entry = index.find(&user_root(OWNER)).unwrap();
    assert_eq!(entry.kind, EntryKind::Directory);
    assert!(index.real_path(&user_root(OWNER)).is_none());
}

#[test]
fn read_returns_stored_bytes() {
    let backup = sample_backup();
    let index = backup.index();
    let path = owner_path(&format!("Img/{}/3.pic", wxexport::model::md5_hex("wxid_friend")));
    assert_eq!(index.read(&path).unwrap(), b"\xff\xd8jpeg");
    assert!(index.read(&owner_path("Img/missing.pic")).is_none());
}

#[test]
fn missing_root_is_not_found() {
    let temp = tempfile::TempDir::new().unwrap();
    let err = BackupIndex::open(temp.path().join("nope"), DEFAULT_DOMAIN).unwrap_err();
    assert!(matches!(err, BackupError::NotFound { .. }));
}

#[test]
fn missing_manifest_is_unsupported() {
    let temp = tempfile::TempDir::new().unwrap();
    let err = BackupIndex::open(temp.path(), DEFAULT_DOMAIN).unwrap_err();
    assert!(err.is_unsupported());
    assert!(err.to_string().contains("Manifest.db"));
}

#[test]
fn encrypted_manifest_is_unsupported() {
    let temp = tempfile::TempDir::new().unwrap();
    fs::write(temp.path().join("Manifest.db"), vec![0x5a; 4096]).unwrap();
    let err = BackupIndex::open(temp.path(), DEFAULT_DOMAIN).unwrap_err();
    assert!(err.is_unsupported());
}

#[test]
fn filters_agree_with_a_full_scan() {
    let backup = sample_backup();
    let index = backup.index();
    let root = user_root(OWNER);
    let filters = vec![
        PathFilter::message_shards(&root),
        PathFilter::user_folders(),
        PathFilter::mmsetting_archives(None),
        PathFilter::session_cell_data(&format!("{}/session/data", root), "V7"),
        PathFilter::literal(&root, "sqlite"),
        PathFilter::pattern(&format!("{}/", root), r"^DB/(.+)\.sqlite$").unwrap(),
    ];

    for filter in &filters {
        let found: Vec<&str> = index.filter(filter).map(|e| e.relative_path.as_str()).collect();
        let scanned: Vec<&str> = index
            .entries()
            .iter()
            .map(|e| e.relative_path.as_str())
            .filter(|p| filter.matches(p))
            .collect();
        assert_eq!(found, scanned, "filter {:?}", filter);
        for path in found {
            assert!(path.starts_with(filter.prefix()));
        }
    }
}

#[test]
fn message_shard_filter_skips_companions() {
    let backup = sample_backup();
    let index = backup.index();
    let shards: Vec<String> = index
        .filter_parsed(&PathFilter::message_shards(&user_root(OWNER)))
        .into_iter()
        .map(|(_, name)| name)
        .collect();
    assert_eq!(shards, vec!["message_1.sqlite", "message_2.sqlite"]);
}

#[test]
fn user_folder_filter_captures_hash() {
    let backup = sample_backup();
    let index = backup.index();
    let folders: Vec<String> = index
        .filter_parsed(&PathFilter::user_folders())
        .into_iter()
        .map(|(_, hash)| hash)
        .collect();
    assert_eq!(folders, vec![wxexport::model::md5_hex(OWNER)]);
}
