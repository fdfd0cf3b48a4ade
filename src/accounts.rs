//! Discovery of the accounts that used the app on the backed-up device.
//!
//! Every account owns a `Documents/<md5(user id)>` folder. Profile details
//! come from the account's settings archive in `Documents/MMappedKV`, whose
//! file name carries the plain user id.

use std::collections::HashMap;

use tracing::{debug, warn};

use crate::backup::{BackupIndex, PathFilter};
use crate::mmkv;
use crate::model::{md5_hex, Profile};

const ARCHIVE_PREFIX: &str = "mmsetting.archive.";
const CRC_SUFFIX: &str = ".crc";

/// An account found in the backup.
#[derive(Debug, Clone)]
pub struct Account {
    pub profile: Profile,
    /// Name of the account's folder below `Documents/`
    pub folder_hash: String,
}

impl Account {
    /// Virtual path of the account folder.
    pub fn user_root(&self) -> String {
        format!("Documents/{}", self.folder_hash)
    }

    pub fn display_name(&self) -> &str {
        self.profile.display_name()
    }
}

/// Decode the settings archive stored at `archive_path` and its `.crc`.
pub fn load_settings_profile(index: &BackupIndex, archive_path: &str) -> Option<Profile> {
    let archive = index.read(archive_path)?;
    let crc = index.read(&format!("{}{}", archive_path, CRC_SUFFIX));
    let Some(crc) = crc else {
        warn!("Settings archive {} has no checksum file", archive_path);
        return None;
    };
    mmkv::decode_profile(&archive, &crc)
}

/// Settings archives keyed by the MD5 of the user id in their file name.
fn settings_archives(index: &BackupIndex) -> HashMap<String, (String, String)> {
    let filter = PathFilter::mmsetting_archives(None);
    index
        .filter_parsed(&filter)
        .into_iter()
        .filter_map(|(entry, name)| {
            let uid = name.strip_prefix(ARCHIVE_PREFIX)?;
            (!uid.is_empty()).then(|| {
                (
                    md5_hex(uid),
                    (uid.to_string(), entry.relative_path.clone()),
                )
            })
        })
        .collect()
}

/// List accounts in folder order.
///
/// Accounts without a readable settings archive are still listed, named by
/// their folder hash.
pub fn discover(index: &BackupIndex) -> Vec<Account> {
    let archives = settings_archives(index);
    let folders = index.filter_parsed(&PathFilter::user_folders());

    folders
        .into_iter()
        .map(|(_, hash)| {
            let profile = match archives.get(&hash) {
                Some((uid, path)) => {
                    let mut profile =
                        load_settings_profile(index, path).unwrap_or_else(|| Profile::new(uid));
                    if profile.user_id.is_empty() {
                        profile.user_id = uid.clone();
                    }
                    profile.hash = hash.clone();
                    profile
                }
                None => {
                    debug!("No settings archive for account folder {}", hash);
                    Profile::from_hash(&hash)
                }
            };
            Account {
                profile,
                folder_hash: hash,
            }
        })
        .collect()
}
