//! Unit tests for account discovery and settings archives

use wxexport::accounts::discover;
use wxexport::mmkv;
use wxexport::model::md5_hex;

use crate::helpers::{sample_backup, user_root, FakeBackup, OWNER};

#[test]
fn discovers_owner_from_settings_archive() {
    let backup = sample_backup();
    let accounts = discover(&backup.index());
    assert_eq!(accounts.len(), 1);

    let account = &accounts[0];
    assert_eq!(account.profile.user_id, OWNER);
    assert_eq!(account.profile.nickname, "Owner");
    assert_eq!(account.profile.alias, "owner_alias");
    assert_eq!(account.folder_hash, md5_hex(OWNER));
    assert_eq!(account.user_root(), user_root(OWNER));
}

#[test]
fn corrupted_archive_yields_no_profile_fields() {
    let mut backup = FakeBackup::new();
    backup.add_dir(&user_root(OWNER));
    let (mut archive, crc) = mmkv::encode::archive(&[(mmkv::KEY_NICKNAME, "Owner")]);
    // Flip a payload byte so the checksum no longer matches
    archive[6] ^= 0xff;
    let path = format!("Documents/MMappedKV/mmsetting.archive.{}", OWNER);
    backup.add_file(&path, &archive);
    backup.add_file(&format!("{}.crc", path), &crc);

    let accounts = discover(&backup.index());
    assert_eq!(accounts.len(), 1);
    assert_eq!(accounts[0].profile.user_id, OWNER);
    assert!(accounts[0].profile.nickname.is_empty());
}

#[test]
fn decode_profile_rejects_bad_checksum() {
    let (archive, mut crc) = mmkv::encode::archive(&[(mmkv::KEY_NICKNAME, "Owner")]);
    assert!(mmkv::decode_profile(&archive, &crc).is_some());
    crc[0] ^= 0x01;
    assert!(mmkv::decode_profile(&archive, &crc).is_none());
}

#[test]
fn folder_without_archive_is_named_by_hash() {
    let mut backup = FakeBackup::new();
    let hash = md5_hex("wxid_nobody");
    backup.add_dir(&format!("Documents/{}", hash));

    let accounts = discover(&backup.index());
    assert_eq!(accounts.len(), 1);
    assert!(accounts[0].profile.user_id.is_empty());
    assert_eq!(accounts[0].display_name(), hash);
}
