//! Configuration type definitions and defaults

use serde::{Deserialize, Serialize};

use crate::backup::{DEFAULT_DOMAIN, GROUP_DOMAIN};
use crate::normalizer::{ParseOptions, SortOrder};
use crate::sessions::DEFAULT_CELL_DATA_VERSION;

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub export: ExportConfig,
    #[serde(default)]
    pub media: MediaConfig,
}

/// Export behaviour
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Record order within a session
    #[serde(default)]
    pub order: SortOrder,
    /// Emit only time, sender and a textual body
    #[serde(default)]
    pub text_mode: bool,
    /// Keep avatars and stickers in each session folder
    #[serde(default)]
    pub icons_in_session: bool,
    /// Decode remarks, avatars and chat room members of contacts
    #[serde(default = "default_detailed_contacts")]
    pub detailed_contacts: bool,
    /// HTML-escape message text
    #[serde(default = "default_escape_html")]
    pub escape_html: bool,
    /// Sessions exported in parallel (defaults to the CPU count)
    #[serde(default)]
    pub workers: Option<usize>,
    #[serde(default = "default_download_timeout_secs")]
    pub download_timeout_secs: u64,
    /// Suffix of the chat list cell cache files
    #[serde(default = "default_cell_data_version")]
    pub cell_data_version: String,
    /// App domain indexed from the backup manifest
    #[serde(default = "default_domain")]
    pub domain: String,
    /// Shared app-group domain searched for additional chat lists
    #[serde(default = "default_group_domain")]
    pub group_domain: String,
}

pub fn default_detailed_contacts() -> bool {
    true
}

pub fn default_escape_html() -> bool {
    true
}

pub fn default_download_timeout_secs() -> u64 {
    10
}

pub fn default_cell_data_version() -> String {
    DEFAULT_CELL_DATA_VERSION.to_string()
}

pub fn default_domain() -> String {
    DEFAULT_DOMAIN.to_string()
}

pub fn default_group_domain() -> String {
    GROUP_DOMAIN.to_string()
}

impl Default for ExportConfig {
    fn default() -> Self {
        Self {
            order: SortOrder::default(),
            text_mode: false,
            icons_in_session: false,
            detailed_contacts: default_detailed_contacts(),
            escape_html: default_escape_html(),
            workers: None,
            download_timeout_secs: default_download_timeout_secs(),
            cell_data_version: default_cell_data_version(),
            domain: default_domain(),
            group_domain: default_group_domain(),
        }
    }
}

impl ExportConfig {
    /// Check values serde cannot reject on its own.
    pub fn validate(&self) -> Result<(), String> {
        if self.workers == Some(0) {
            return Err("export.workers must be at least 1".to_string());
        }
        if self.cell_data_version.contains('/') {
            return Err(format!(
                "export.cell_data_version '{}' must not contain '/'",
                self.cell_data_version
            ));
        }
        Ok(())
    }
}

/// Media kinds copied into the output
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct MediaConfig {
    #[serde(default = "default_include")]
    pub avatars: bool,
    #[serde(default = "default_include")]
    pub audio: bool,
    #[serde(default = "default_include")]
    pub images: bool,
    #[serde(default = "default_include")]
    pub video: bool,
    #[serde(default = "default_include")]
    pub stickers: bool,
    #[serde(default = "default_include")]
    pub files: bool,
    #[serde(default = "default_include")]
    pub cards: bool,
    /// Links, locations and other shared content
    #[serde(default = "default_include")]
    pub sharing: bool,
}

pub fn default_include() -> bool {
    true
}

impl Default for MediaConfig {
    fn default() -> Self {
        Self {
            avatars: true,
            audio: true,
            images: true,
            video: true,
            stickers: true,
            files: true,
            cards: true,
            sharing: true,
        }
    }
}

impl Config {
    /// Options handed to the message normalizer.
    pub fn parse_options(&self) -> ParseOptions {
        let (export, media) = (&self.export, &self.media);
        let mut options = ParseOptions::default()
            .with_order(export.order)
            .with_text_mode(export.text_mode);
        options.icons_in_session = export.icons_in_session;
        options.ignore_html_escaping = !export.escape_html;
        options.ignore_avatar = !media.avatars;
        options.ignore_audio = !media.audio;
        options.ignore_image = !media.images;
        options.ignore_video = !media.video;
        options.ignore_sticker = !media.stickers;
        options.ignore_file = !media.files;
        options.ignore_card = !media.cards;
        options.ignore_sharing = !media.sharing;
        options.download_timeout = std::time::Duration::from_secs(export.download_timeout_secs);
        options
    }

    /// Configured worker count, or the available parallelism.
    pub fn worker_count(&self) -> usize {
        self.export
            .workers
            .unwrap_or_else(|| {
                std::thread::available_parallelism()
                    .map(|n| n.get())
                    .unwrap_or(1)
            })
            .max(1)
    }
}
