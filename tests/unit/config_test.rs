//! Unit tests for configuration

use std::fs;

use wxexport::backup::{DEFAULT_DOMAIN, GROUP_DOMAIN};
use wxexport::normalizer::{SortOrder, DEFAULT_DOWNLOAD_TIMEOUT};
use wxexport::Config;

#[test]
fn defaults_export_everything() {
    let config = Config::default();
    assert_eq!(config.export.order, SortOrder::Ascending);
    assert!(!config.export.text_mode);
    assert!(config.export.detailed_contacts);
    assert!(config.export.escape_html);
    assert_eq!(config.export.domain, DEFAULT_DOMAIN);
    assert_eq!(config.export.group_domain, GROUP_DOMAIN);
    assert_eq!(config.export.cell_data_version, "V7");

    let options = config.parse_options();
    assert_eq!(options.bits(), 0);
    assert_eq!(options.download_timeout, DEFAULT_DOWNLOAD_TIMEOUT);
    assert!(config.worker_count() >= 1);
}

#[test]
fn partial_file_keeps_defaults() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(
        &path,
        r#"
[export]
order = "descending"
workers = 2

[media]
images = false
avatars = false
"#,
    )
    .unwrap();

    let config = Config::load_from(&path).unwrap();
    assert_eq!(config.export.order, SortOrder::Descending);
    assert_eq!(config.worker_count(), 2);
    assert!(config.media.video);

    let options = config.parse_options();
    assert_eq!(options.order, SortOrder::Descending);
    assert!(options.ignore_image);
    assert!(options.ignore_avatar);
    assert!(!options.ignore_video);
    assert!(!options.wants_avatars());
}

#[test]
fn zero_workers_is_rejected() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("config.toml");
    fs::write(&path, "[export]\nworkers = 0\n").unwrap();
    let err = Config::load_from(&path).unwrap_err();
    assert!(err.to_string().contains("workers"));
}

#[test]
fn saved_config_loads_back() {
    let temp = tempfile::TempDir::new().unwrap();
    let path = temp.path().join("nested").join("config.toml");
    let mut config = Config::default();
    config.export.text_mode = true;
    config.media.stickers = false;
    config.save_to(&path).unwrap();

    let loaded = Config::load_from(&path).unwrap();
    assert_eq!(loaded, config);
}
