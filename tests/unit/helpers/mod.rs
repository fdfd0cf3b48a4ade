//! Test helper utilities
//!
//! [`FakeBackup`] lays out a backup folder the way the device writes it:
//! a `Manifest.db` catalog plus opaque, id-named files sharded by the first
//! two characters of their id.

#![allow(dead_code)]

use std::fs;
use std::path::{Path, PathBuf};

use rusqlite::{params, Connection};
use tempfile::TempDir;

use wxexport::backup::{DEFAULT_DOMAIN, GROUP_DOMAIN};
use wxexport::mmkv;
use wxexport::model::md5_hex;
use wxexport::wire::encode;
use wxexport::BackupIndex;

pub const OWNER: &str = "wxid_owner";
pub const FRIEND: &str = "wxid_friend";
pub const ROOM: &str = "12345@chatroom";
pub const GHOST: &str = "wxid_ghost";

/// Backup folder under construction.
pub struct FakeBackup {
    pub dir: TempDir,
    /// `(virtual path, file id, flags, domain)`
    entries: Vec<(String, String, i64, &'static str)>,
}

impl Default for FakeBackup {
    fn default() -> Self {
        Self::new()
    }
}

impl FakeBackup {
    pub fn new() -> Self {
        Self {
            dir: TempDir::new().expect("Failed to create temp dir"),
            entries: Vec::new(),
        }
    }

    pub fn root(&self) -> &Path {
        self.dir.path()
    }

    fn file_id(domain: &str, vpath: &str) -> String {
        format!("{}{}", md5_hex(&format!("{}-{}", domain, vpath)), "00000000")
    }

    /// Store `data` as the backed-up file at `vpath`.
    pub fn add_file(&mut self, vpath: &str, data: &[u8]) -> PathBuf {
        self.add_file_in(DEFAULT_DOMAIN, vpath, data)
    }

    /// Store `data` at `vpath` of another app domain.
    pub fn add_file_in(&mut self, domain: &'static str, vpath: &str, data: &[u8]) -> PathBuf {
        let id = Self::file_id(domain, vpath);
        let shard = self.root().join(&id[..2]);
        fs::create_dir_all(&shard).expect("Failed to create shard dir");
        let path = shard.join(&id);
        fs::write(&path, data).expect("Failed to write backed-up file");
        self.entries.push((vpath.to_string(), id, 1, domain));
        path
    }

    /// Catalog a directory entry (no stored bytes).
    pub fn add_dir(&mut self, vpath: &str) {
        self.entries.push((
            vpath.to_string(),
            Self::file_id(DEFAULT_DOMAIN, vpath),
            2,
            DEFAULT_DOMAIN,
        ));
    }

    /// Store a SQLite database built from `sql` at `vpath`.
    pub fn add_sqlite(&mut self, vpath: &str, sql: &str) -> PathBuf {
        self.add_sqlite_in(DEFAULT_DOMAIN, vpath, sql)
    }

    /// Store a SQLite database at `vpath` of another app domain.
    pub fn add_sqlite_in(&mut self, domain: &'static str, vpath: &str, sql: &str) -> PathBuf {
        let path = self.add_file_in(domain, vpath, b"");
        fs::remove_file(&path).expect("Failed to reset database file");
        let conn = Connection::open(&path).expect("Failed to create database");
        conn.execute_batch(sql).expect("Failed to build database");
        path
    }

    /// Write `Manifest.db` for everything added so far.
    pub fn write_manifest(&self) {
        let manifest = self.root().join("Manifest.db");
        if manifest.exists() {
            fs::remove_file(&manifest).expect("Failed to replace manifest");
        }
        let conn = Connection::open(&manifest).expect("Failed to create manifest");
        conn.execute_batch(
            "CREATE TABLE Files (fileID TEXT PRIMARY KEY, domain TEXT, relativePath TEXT, flags INTEGER, file BLOB)",
        )
        .expect("Failed to create Files table");
        for (path, id, flags, domain) in &self.entries {
            conn.execute(
                "INSERT INTO Files (fileID, domain, relativePath, flags) VALUES (?1, ?2, ?3, ?4)",
                params![id, domain, path, flags],
            )
            .expect("Failed to insert manifest row");
        }
        conn.execute(
            "INSERT INTO Files (fileID, domain, relativePath, flags) VALUES ('other', 'HomeDomain', 'Documents/x', 1)",
            [],
        )
        .expect("Failed to insert foreign row");
    }

    pub fn index(&self) -> BackupIndex {
        self.write_manifest();
        BackupIndex::open(self.root(), DEFAULT_DOMAIN).expect("Failed to open fake backup")
    }

    /// Index of the shared app-group container.
    pub fn group_index(&self) -> BackupIndex {
        self.write_manifest();
        BackupIndex::open(self.root(), GROUP_DOMAIN).expect("Failed to open fake backup")
    }
}

pub fn user_root(uid: &str) -> String {
    format!("Documents/{}", md5_hex(uid))
}

/// Virtual path below the owner's account folder.
pub fn owner_path(relative: &str) -> String {
    format!("{}/{}", user_root(OWNER), relative)
}

pub fn sql_quote(s: &str) -> String {
    format!("'{}'", s.replace('\'', "''"))
}

/// `CREATE TABLE` plus inserts for a message table.
///
/// Rows are `(MesLocalID, CreateTime, Message, Des, Type)`.
pub fn chat_table(peer: &str, rows: &[(i64, i64, &str, i64, i64)]) -> String {
    let table = format!("Chat_{}", md5_hex(peer));
    let mut sql = format!(
        "CREATE TABLE {} (TableVer INTEGER, MesLocalID INTEGER, MesSvrID INTEGER, CreateTime INTEGER, Message TEXT, Status INTEGER, ImgStatus INTEGER, Type INTEGER, Des INTEGER);\n",
        table
    );
    for (id, time, message, des, ty) in rows {
        sql.push_str(&format!(
            "INSERT INTO {} (MesLocalID, CreateTime, Message, Des, Type) VALUES ({}, {}, {}, {}, {});\n",
            table,
            id,
            time,
            sql_quote(message),
            des,
            ty
        ));
    }
    sql
}

fn contact_sql(user_name: &str, remark: &[u8], head: &[u8], room: &[u8]) -> String {
    let hex = |b: &[u8]| b.iter().map(|x| format!("{:02x}", x)).collect::<String>();
    format!(
        "INSERT INTO Friend (userName, dbContactRemark, dbContactHeadImage, dbContactChatRoom) VALUES ({}, X'{}', X'{}', X'{}');\n",
        sql_quote(user_name),
        hex(remark),
        hex(head),
        hex(room)
    )
}

pub fn remark_blob(nickname: &str, alias: &str, remark: &str) -> Vec<u8> {
    let mut buf = Vec::new();
    encode::string_field(1, nickname, &mut buf);
    encode::string_field(2, alias, &mut buf);
    encode::string_field(3, remark, &mut buf);
    buf
}

pub fn room_blob(members: &[(&str, &str)]) -> Vec<u8> {
    let mut buf = Vec::new();
    let ids: Vec<&str> = members.iter().map(|(id, _)| *id).collect();
    encode::string_field(1, &ids.join(";"), &mut buf);
    for (id, name) in members {
        let mut member = Vec::new();
        encode::string_field(1, id, &mut member);
        encode::string_field(2, name, &mut member);
        encode::bytes_field(4, &member, &mut buf);
    }
    buf
}

pub fn cell_data(user_id: &str, name: &str, time: u64, count: u64) -> Vec<u8> {
    let mut buf = Vec::new();
    encode::string_field(1, user_id, &mut buf);
    encode::string_field(2, name, &mut buf);
    encode::varint_field(3, time, &mut buf);
    encode::varint_field(4, count, &mut buf);
    buf
}

/// Forwarded chat history payload with one text item per `(sender, text)`.
pub fn forwarded_payload(items: &[(&str, &str)]) -> String {
    let mut list = String::new();
    for (i, (sender, text)) in items.iter().enumerate() {
        list.push_str(&format!(
            "<dataitem datatype=\"1\" dataid=\"d{}\"><sourcename>{}</sourcename><sourcetime>2022-01-01 10:0{}</sourcetime><datadesc>{}</datadesc></dataitem>",
            i, sender, i, text
        ));
    }
    format!(
        "<msg><appmsg appid=\"\"><title>Chat History</title><des>forwarded</des><type>19</type><recorditem><![CDATA[<recordinfo><datalist count=\"{}\">{}</datalist></recordinfo>]]></recorditem></appmsg></msg>",
        items.len(),
        list
    )
}

/// Forwarded payload whose record items nest `levels` times.
pub fn deeply_forwarded_payload(levels: usize) -> String {
    let mut info = "<recordinfo><datalist><dataitem datatype=\"1\"><datadesc>bottom</datadesc></dataitem></datalist></recordinfo>".to_string();
    for _ in 0..levels {
        info = format!(
            "<recordinfo><datalist><dataitem datatype=\"17\"><datatitle>level</datatitle><recordxml>{}</recordxml></dataitem></datalist></recordinfo>",
            info
        );
    }
    format!(
        "<msg><appmsg><title>Deep</title><type>19</type><recorditem><![CDATA[{}]]></recorditem></appmsg></msg>",
        info
    )
}

/// A backup with one account, two contacts and three message tables spread
/// over two shards.
///
/// - friend: ids 1..=5, split across both shards, cell data claims 99
/// - room: two incoming messages with sender prefixes
/// - ghost: a table in shard 2 with no chat list entry or contact
pub fn sample_backup() -> FakeBackup {
    let mut backup = FakeBackup::new();
    let root = user_root(OWNER);
    backup.add_dir("Documents");
    backup.add_dir(&root);

    let (archive, crc) = mmkv::encode::archive(&[
        (mmkv::KEY_USER_ID, OWNER),
        (mmkv::KEY_ALIAS, "owner_alias"),
        (mmkv::KEY_NICKNAME, "Owner"),
    ]);
    let archive_path = format!("Documents/MMappedKV/mmsetting.archive.{}", OWNER);
    backup.add_file(&archive_path, &archive);
    backup.add_file(&format!("{}.crc", archive_path), &crc);

    let mut contacts = String::from(
        "CREATE TABLE Friend (userName TEXT, type INTEGER, dbContactRemark BLOB, dbContactHeadImage BLOB, dbContactChatRoom BLOB);\n",
    );
    contacts.push_str(&contact_sql(FRIEND, &remark_blob("Friend", "friend_alias", ""), &[], &[]));
    contacts.push_str(&contact_sql(
        ROOM,
        &remark_blob("Room", "", ""),
        &[],
        &room_blob(&[(FRIEND, "Pal in room")]),
    ));
    backup.add_sqlite(&owner_path("DB/WCDB_Contact.sqlite"), &contacts);

    backup.add_sqlite(
        &owner_path("session/session.db"),
        &format!(
            "CREATE TABLE SessionAbstract (UsrName TEXT, CreateTime INTEGER, unreadcount INTEGER);
             INSERT INTO SessionAbstract (UsrName, CreateTime) VALUES ({}, 500);
             INSERT INTO SessionAbstract (UsrName, CreateTime) VALUES ({}, 400);",
            sql_quote(FRIEND),
            sql_quote(ROOM)
        ),
    );
    backup.add_file(
        &owner_path(&format!("session/data/{}/celldataV7", md5_hex(FRIEND))),
        &cell_data(FRIEND, "Friend", 400, 99),
    );

    let shard1 = format!(
        "{}{}",
        chat_table(
            FRIEND,
            &[
                (2, 100, "hi back", 1, 1),
                (1, 100, "hello", 0, 1),
                (3, 200, "<msg><img length=\"3\"/></msg>", 1, 3),
            ],
        ),
        chat_table(
            ROOM,
            &[
                (1, 150, "wxid_friend:\nmorning", 1, 1),
                (2, 160, "wxid_stranger:\nhey", 1, 1),
            ],
        )
    );
    backup.add_sqlite(&owner_path("DB/message_1.sqlite"), &shard1);

    let forwarded = forwarded_payload(&[("Alice", "first"), ("Bob", "second")]);
    let shard2 = format!(
        "{}{}",
        chat_table(
            FRIEND,
            &[
                (4, 300, forwarded.as_str(), 1, 49),
                (5, 400, "bye", 0, 1),
            ],
        ),
        chat_table(GHOST, &[(1, 50, "boo", 1, 1)])
    );
    backup.add_sqlite(&owner_path("DB/message_2.sqlite"), &shard2);
    // Companion files never count as shards
    backup.add_file(&owner_path("DB/message_2.sqlite-wal"), b"");

    backup.add_file(
        &owner_path(&format!("Img/{}/3.pic", md5_hex(FRIEND))),
        b"\xff\xd8jpeg",
    );
    backup
}

/// Extracted state of [`sample_backup`]'s only account.
pub struct Loaded {
    pub index: BackupIndex,
    pub account: wxexport::Account,
    pub contacts: wxexport::ContactBook,
    pub sessions: Vec<wxexport::Session>,
}

impl Loaded {
    pub fn session(&self, user_id: &str) -> &wxexport::Session {
        self.sessions
            .iter()
            .find(|s| s.user_id == user_id)
            .unwrap_or_else(|| panic!("No session for {}", user_id))
    }
}

pub fn load(backup: &FakeBackup) -> Loaded {
    let index = backup.index();
    let account = wxexport::accounts::discover(&index)
        .into_iter()
        .next()
        .expect("Fake backup has an account");
    let data = wxexport::Exporter::new(&index, &account)
        .load()
        .expect("Failed to load account data");
    Loaded {
        index,
        account,
        contacts: data.contacts,
        sessions: data.sessions,
    }
}
