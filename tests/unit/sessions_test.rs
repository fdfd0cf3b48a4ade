//! Unit tests for contact and session extraction

use wxexport::backup::GROUP_DOMAIN;
use wxexport::model::md5_hex;
use wxexport::{ContactBook, ContactExtractor, SessionExtractor};

use crate::helpers::{
    chat_table, load, owner_path, sample_backup, sql_quote, user_root, FakeBackup, FRIEND, GHOST,
    OWNER, ROOM,
};

#[test]
fn contacts_carry_remarks_and_room_members() {
    let backup = sample_backup();
    let loaded = load(&backup);

    assert_eq!(loaded.contacts.len(), 2);
    let friend = loaded.contacts.get(FRIEND).unwrap();
    assert_eq!(friend.nickname, "Friend");
    assert_eq!(friend.alias, "friend_alias");
    assert!(loaded.contacts.get_by_hash(&md5_hex(FRIEND)).is_some());

    let room = loaded.contacts.get(ROOM).unwrap();
    assert!(room.is_chatroom());
    assert_eq!(room.members, vec![FRIEND.to_string()]);
    assert_eq!(room.member_names.get(FRIEND).map(String::as_str), Some("Pal in room"));
}

#[test]
fn brief_contacts_skip_details() {
    let backup = sample_backup();
    let index = backup.index();
    let book = ContactExtractor::new(false)
        .extract(&index, &user_root(OWNER))
        .unwrap();
    let room = book.get(ROOM).unwrap();
    assert_eq!(room.nickname, "Room");
    assert!(room.members.is_empty());
    assert!(book.get(FRIEND).unwrap().alias.is_empty());
}

#[test]
fn sessions_follow_chat_list_then_orphan_tables() {
    let backup = sample_backup();
    let loaded = load(&backup);

    let ids: Vec<&str> = loaded.sessions.iter().map(|s| s.hash.as_str()).collect();
    assert_eq!(ids, vec![md5_hex(FRIEND), md5_hex(ROOM), md5_hex(GHOST)]);
}

#[test]
fn counts_come_from_shards_not_cell_data() {
    let backup = sample_backup();
    let loaded = load(&backup);

    let friend = loaded.session(FRIEND);
    assert_eq!(friend.record_count, 5);
    assert_eq!(friend.cached_count, Some(99));
    assert_eq!(friend.last_message_time, Some(400));
    assert_eq!(friend.sources.len(), 2);
    assert_eq!(friend.display_name, "Friend");

    let room = loaded.session(ROOM);
    assert_eq!(room.record_count, 2);
    assert_eq!(room.cached_count, None);
    assert_eq!(room.display_name, "Room");
}

#[test]
fn orphan_table_becomes_a_session() {
    let backup = sample_backup();
    let loaded = load(&backup);

    let ghost = loaded
        .sessions
        .iter()
        .find(|s| s.hash == md5_hex(GHOST))
        .unwrap();
    assert!(ghost.user_id.is_empty());
    assert_eq!(ghost.record_count, 1);
    assert_eq!(ghost.display_name, md5_hex(GHOST));
    assert_eq!(ghost.output_name(), md5_hex(GHOST));
}

#[test]
fn sessions_point_back_to_their_account() {
    let backup = sample_backup();
    let loaded = load(&backup);

    assert!(!loaded.sessions.is_empty());
    for session in &loaded.sessions {
        assert_eq!(session.owner_hash, md5_hex(OWNER));
        assert!(session.is_owned_by(&loaded.account.profile));
    }
}

#[test]
fn account_without_stores_has_no_sessions() {
    let mut backup = FakeBackup::new();
    backup.add_dir(&user_root(OWNER));
    let index = backup.index();
    let contacts = ContactExtractor::default()
        .extract(&index, &user_root(OWNER))
        .unwrap();
    let sessions = SessionExtractor::default()
        .extract(&index, &user_root(OWNER), &contacts);
    assert!(contacts.is_empty());
    assert!(sessions.is_empty());
}

#[test]
fn corrupt_chat_list_and_cell_data_fall_back_to_shards() {
    let mut backup = FakeBackup::new();
    backup.add_dir(&user_root(OWNER));
    backup.add_file(&owner_path("session/session.db"), b"this is not a database at all");
    backup.add_file(
        &owner_path(&format!("session/data/{}/celldataV7", md5_hex(FRIEND))),
        &[0x0a, 0x50, b'x'],
    );
    backup.add_sqlite(
        &owner_path("DB/message_1.sqlite"),
        &chat_table(FRIEND, &[(1, 100, "still here", 1, 1)]),
    );
    let index = backup.index();

    let sessions = SessionExtractor::default().extract(&index, &user_root(OWNER), &ContactBook::new());
    assert_eq!(sessions.len(), 1);
    assert_eq!(sessions[0].hash, md5_hex(FRIEND));
    assert_eq!(sessions[0].record_count, 1);
    assert_eq!(sessions[0].cached_count, None);
}

#[test]
fn shared_container_chat_list_adds_sessions() {
    let mut backup = sample_backup();
    backup.add_sqlite_in(
        GROUP_DOMAIN,
        &format!("share/{}/session/session.db", md5_hex(OWNER)),
        &format!(
            "CREATE TABLE SessionAbstract (UsrName TEXT, CreateTime INTEGER, unreadcount INTEGER);
             INSERT INTO SessionAbstract (UsrName, CreateTime) VALUES ({}, 900);
             INSERT INTO SessionAbstract (UsrName, CreateTime) VALUES ('wxid_newcomer', 600);",
            sql_quote(FRIEND)
        ),
    );
    let index = backup.index();
    let group = backup.group_index();
    let contacts = ContactExtractor::default()
        .extract(&index, &user_root(OWNER))
        .unwrap();

    let sessions =
        SessionExtractor::default().extract_with_group(&index, Some(&group), &user_root(OWNER), &contacts);
    let ids: Vec<String> = sessions.iter().map(|s| s.hash.clone()).collect();
    assert_eq!(
        ids,
        vec![
            md5_hex("wxid_newcomer"),
            md5_hex(FRIEND),
            md5_hex(ROOM),
            md5_hex(GHOST)
        ]
    );
    assert_eq!(sessions[0].record_count, 0);
    assert_eq!(sessions[1].created_at, Some(500));
    assert_eq!(sessions[1].record_count, 5);

    let without = SessionExtractor::default().extract(&index, &user_root(OWNER), &contacts);
    assert_eq!(without.len(), 3);
}
