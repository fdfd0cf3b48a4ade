//! Per-export switches received by the normalizer.

use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Bit positions of the packed option set.
pub mod flags {
    pub const IGNORE_AVATAR: u32 = 1 << 0;
    pub const IGNORE_AUDIO: u32 = 1 << 1;
    pub const IGNORE_IMAGE: u32 = 1 << 2;
    pub const IGNORE_VIDEO: u32 = 1 << 3;
    pub const IGNORE_STICKER: u32 = 1 << 4;
    pub const IGNORE_FILE: u32 = 1 << 5;
    pub const IGNORE_CARD: u32 = 1 << 6;
    pub const IGNORE_SHARING: u32 = 1 << 7;
    pub const IGNORE_HTML_ESCAPING: u32 = 1 << 8;
    /// Every `IGNORE_*` bit; description-only output
    pub const TEXT_MODE: u32 = 0xFFFF;
    pub const DESCENDING: u32 = 1 << 16;
    pub const ICONS_IN_SESSION: u32 = 1 << 17;
}

/// Order in which records reach the sink.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

pub const DEFAULT_DOWNLOAD_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParseOptions {
    pub order: SortOrder,
    pub ignore_avatar: bool,
    pub ignore_audio: bool,
    pub ignore_image: bool,
    pub ignore_video: bool,
    pub ignore_sticker: bool,
    pub ignore_file: bool,
    pub ignore_card: bool,
    pub ignore_sharing: bool,
    pub ignore_html_escaping: bool,
    /// Emit only time, sender and a textual body
    pub text_mode: bool,
    /// Put avatars and stickers in the session folder instead of shared ones
    pub icons_in_session: bool,
    pub download_timeout: Duration,
}

impl Default for ParseOptions {
    fn default() -> Self {
        Self::from_bits(0)
    }
}

impl ParseOptions {
    pub fn from_bits(bits: u32) -> Self {
        let has = |flag: u32| bits & flag == flag;
        Self {
            order: if has(flags::DESCENDING) {
                SortOrder::Descending
            } else {
                SortOrder::Ascending
            },
            ignore_avatar: has(flags::IGNORE_AVATAR),
            ignore_audio: has(flags::IGNORE_AUDIO),
            ignore_image: has(flags::IGNORE_IMAGE),
            ignore_video: has(flags::IGNORE_VIDEO),
            ignore_sticker: has(flags::IGNORE_STICKER),
            ignore_file: has(flags::IGNORE_FILE),
            ignore_card: has(flags::IGNORE_CARD),
            ignore_sharing: has(flags::IGNORE_SHARING),
            ignore_html_escaping: has(flags::IGNORE_HTML_ESCAPING),
            text_mode: has(flags::TEXT_MODE),
            icons_in_session: has(flags::ICONS_IN_SESSION),
            download_timeout: DEFAULT_DOWNLOAD_TIMEOUT,
        }
    }

    pub fn bits(&self) -> u32 {
        let mut bits = 0;
        for (set, flag) in [
            (self.ignore_avatar, flags::IGNORE_AVATAR),
            (self.ignore_audio, flags::IGNORE_AUDIO),
            (self.ignore_image, flags::IGNORE_IMAGE),
            (self.ignore_video, flags::IGNORE_VIDEO),
            (self.ignore_sticker, flags::IGNORE_STICKER),
            (self.ignore_file, flags::IGNORE_FILE),
            (self.ignore_card, flags::IGNORE_CARD),
            (self.ignore_sharing, flags::IGNORE_SHARING),
            (self.ignore_html_escaping, flags::IGNORE_HTML_ESCAPING),
            (self.text_mode, flags::TEXT_MODE),
            (self.order == SortOrder::Descending, flags::DESCENDING),
            (self.icons_in_session, flags::ICONS_IN_SESSION),
        ] {
            if set {
                bits |= flag;
            }
        }
        bits
    }

    pub fn with_order(mut self, order: SortOrder) -> Self {
        self.order = order;
        self
    }

    pub fn with_text_mode(mut self, text_mode: bool) -> Self {
        self.text_mode = text_mode;
        self
    }

    /// Avatars are fetched for senders.
    pub fn wants_avatars(&self) -> bool {
        !self.text_mode && !self.ignore_avatar
    }
}
