//! Session enumeration for one account.
//!
//! Three sources describe an account's conversations and they routinely
//! disagree:
//!
//! - `session/session.db` lists the conversations shown in the chat list
//! - `session/data/<hash>/celldata<V>` caches the name, last message time
//!   and message count shown in each chat list cell
//! - `DB/message_<n>.sqlite` shards hold one `Chat_<hash>` table per
//!   conversation with the messages that are actually stored
//!
//! Newer app versions keep a second chat list in the shared app-group
//! container under `share/<hash>/session/session.db`. When that container is
//! indexed its entries are merged into the main chat list.
//!
//! Row counts always come from the shards. A table with no chat list entry
//! still becomes a session so that no stored history is lost.

use std::collections::{HashMap, HashSet};

use tracing::{debug, info, warn};

use crate::backup::{join_virtual, BackupIndex, PathFilter};
use crate::db::{open_readonly, quote_ident, table_names};
use crate::error::ExtractError;
use crate::model::{ContactBook, Session};
use crate::wire::{decode_fields, int_field, string_field, WireError};

pub const SESSION_DB: &str = "session/session.db";
pub const SESSION_DATA_DIR: &str = "session/data";
pub const DEFAULT_CELL_DATA_VERSION: &str = "V7";
/// Root of the per-account folders in the shared app-group container.
pub const SHARED_ROOT: &str = "share";

const TABLE_PREFIX: &str = "Chat_";

/// Chat list cell cached by the app.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CellData {
    pub user_id: String,
    pub display_name: String,
    pub last_message_time: Option<i64>,
    pub cached_count: Option<u64>,
    pub summary: String,
}

/// Decode a `celldata` blob.
///
/// # Errors
///
/// Fails if the blob is not valid wire format.
pub fn parse_cell_data(data: &[u8]) -> Result<CellData, WireError> {
    let fields = decode_fields(data)?;
    Ok(CellData {
        user_id: string_field(&fields, 1).unwrap_or_default(),
        display_name: string_field(&fields, 2).unwrap_or_default(),
        last_message_time: int_field(&fields, 3).map(|v| v as i64),
        cached_count: int_field(&fields, 4),
        summary: string_field(&fields, 5).unwrap_or_default(),
    })
}

/// Message tables found in one shard file.
#[derive(Debug, Clone)]
pub struct ShardTables {
    /// Virtual path of the shard
    pub source: String,
    /// `(session hash, row count)` per `Chat_` table
    pub tables: Vec<(String, u64)>,
}

/// Count rows of every `Chat_` table in a shard database.
///
/// # Errors
///
/// Fails if the shard cannot be opened or its tables listed. A table whose
/// count query fails is skipped.
pub fn count_tables(path: &std::path::Path) -> Result<Vec<(String, u64)>, ExtractError> {
    let conn = open_readonly(path)?;
    let mut tables = Vec::new();
    for name in table_names(&conn, path)? {
        let Some(hash) = name.strip_prefix(TABLE_PREFIX) else {
            continue;
        };
        if hash.is_empty() {
            continue;
        }
        let sql = format!("SELECT COUNT(*) FROM {}", quote_ident(&name));
        match conn.query_row(&sql, [], |row| row.get::<_, i64>(0)) {
            Ok(count) => tables.push((hash.to_string(), count.max(0) as u64)),
            Err(e) => warn!("Skipping unreadable table {} in {:?}: {}", name, path, e),
        }
    }
    tables.sort();
    Ok(tables)
}

/// Lists the sessions of one account.
#[derive(Debug, Clone)]
pub struct SessionExtractor {
    cell_data_version: String,
}

impl Default for SessionExtractor {
    fn default() -> Self {
        Self::new(DEFAULT_CELL_DATA_VERSION)
    }
}

impl SessionExtractor {
    pub fn new(cell_data_version: &str) -> Self {
        Self {
            cell_data_version: cell_data_version.to_string(),
        }
    }

    /// Enumerate the sessions of the account rooted at `user_root`.
    ///
    /// Messages are not loaded. Sessions keep chat list order; sessions found
    /// only in message shards follow, ordered by table hash.
    ///
    /// An unreadable chat list, cell data or shard is logged and skipped;
    /// whatever the remaining sources describe is still returned.
    pub fn extract(&self, index: &BackupIndex, user_root: &str, contacts: &ContactBook) -> Vec<Session> {
        self.extract_with_group(index, None, user_root, contacts)
    }

    /// Like [`SessionExtractor::extract`], also merging the chat list kept
    /// for the account in the shared app-group container `group`.
    pub fn extract_with_group(
        &self,
        index: &BackupIndex,
        group: Option<&BackupIndex>,
        user_root: &str,
        contacts: &ContactBook,
    ) -> Vec<Session> {
        let mut sessions = self.chat_list(index, user_root);
        if let Some((group, shared_root)) = group.zip(shared_user_root(user_root)) {
            sessions = merge_chat_lists(sessions, self.chat_list(group, &shared_root));
        }
        let mut by_hash: HashMap<String, usize> = sessions
            .iter()
            .enumerate()
            .map(|(i, s)| (s.hash.clone(), i))
            .collect();

        for (hash, cell) in self.read_cell_data(index, user_root) {
            let i = *by_hash.entry(hash.clone()).or_insert_with(|| {
                let session = if cell.user_id.is_empty() {
                    Session::from_hash(&hash)
                } else {
                    Session::new(&cell.user_id)
                };
                sessions.push(session);
                sessions.len() - 1
            });
            let session = &mut sessions[i];
            if session.user_id.is_empty() {
                session.user_id = cell.user_id;
            }
            if session.display_name.is_empty() {
                session.display_name = cell.display_name;
            }
            session.cached_count = cell.cached_count;
            session.last_message_time = cell.last_message_time;
        }

        let known = sessions.len();
        for shard in self.shard_tables(index, user_root) {
            for (hash, count) in shard.tables {
                let i = match by_hash.get(&hash) {
                    Some(&i) => i,
                    None => {
                        let session = match contacts.get_by_hash(&hash) {
                            Some(contact) => Session::new(&contact.user_id),
                            None => Session::from_hash(&hash),
                        };
                        debug!("Table {}{} has no chat list entry", TABLE_PREFIX, hash);
                        sessions.push(session);
                        by_hash.insert(hash, sessions.len() - 1);
                        sessions.len() - 1
                    }
                };
                sessions[i].record_count += count;
                sessions[i].sources.push(shard.source.clone());
            }
        }
        sessions[known..].sort_by(|a, b| a.hash.cmp(&b.hash));

        let owner_hash = account_hash(user_root);
        for session in &mut sessions {
            session.owner_hash = owner_hash.to_string();
            if session.display_name.is_empty() {
                session.display_name = derive_display_name(session, contacts);
            } else if let Some(contact) = contacts.get(&session.user_id) {
                if !contact.remark.is_empty() {
                    session.display_name = contact.remark.clone();
                }
            }
        }

        info!(
            sessions = sessions.len(),
            from_shards_only = sessions.len() - known,
            "Enumerated sessions under {}",
            user_root
        );
        sessions
    }

    fn chat_list(&self, index: &BackupIndex, user_root: &str) -> Vec<Session> {
        match self.read_chat_list(index, user_root) {
            Ok(sessions) => sessions,
            Err(e) => {
                warn!("Ignoring unreadable chat list under {}: {}", user_root, e);
                Vec::new()
            }
        }
    }

    /// Sessions listed in the chat list database, most recent first.
    fn read_chat_list(&self, index: &BackupIndex, user_root: &str) -> Result<Vec<Session>, ExtractError> {
        let vpath = join_virtual(user_root, SESSION_DB);
        let Some(path) = index.real_path(&vpath) else {
            debug!("No chat list database at {}", vpath);
            return Ok(Vec::new());
        };

        let conn = open_readonly(&path)?;
        let mut stmt = conn
            .prepare("SELECT UsrName, CreateTime FROM SessionAbstract ORDER BY CreateTime DESC")
            .map_err(ExtractError::query(&path))?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, Option<String>>(0)?,
                    row.get::<_, Option<i64>>(1)?,
                ))
            })
            .map_err(ExtractError::query(&path))?;

        let mut sessions = Vec::new();
        for row in rows {
            match row {
                Ok((Some(user_id), created_at)) if !user_id.is_empty() => {
                    let mut session = Session::new(&user_id);
                    session.created_at = created_at;
                    sessions.push(session);
                }
                Ok(_) => {}
                Err(e) => debug!("Skipping chat list row: {}", e),
            }
        }
        Ok(sessions)
    }

    /// Cell data keyed by session hash.
    fn read_cell_data(&self, index: &BackupIndex, user_root: &str) -> Vec<(String, CellData)> {
        let folder = join_virtual(user_root, SESSION_DATA_DIR);
        let filter = PathFilter::session_cell_data(&folder, &self.cell_data_version);

        let mut cells = Vec::new();
        for (entry, rest) in index.filter_parsed(&filter) {
            let Some(hash) = rest.split('/').next().filter(|h| !h.is_empty()) else {
                continue;
            };
            let Some(bytes) = index.read(&entry.relative_path) else {
                continue;
            };
            match parse_cell_data(&bytes) {
                Ok(cell) => cells.push((hash.to_string(), cell)),
                Err(e) => warn!("Malformed cell data {}: {}", entry.relative_path, e),
            }
        }
        cells
    }

    /// Message tables of every shard present in the backup.
    pub fn shard_tables(&self, index: &BackupIndex, user_root: &str) -> Vec<ShardTables> {
        let filter = PathFilter::message_shards(user_root);
        let mut shards = Vec::new();
        for entry in index.filter(&filter) {
            let Some(path) = index.real_path(&entry.relative_path) else {
                debug!("Shard {} has no stored bytes", entry.relative_path);
                continue;
            };
            match count_tables(&path) {
                Ok(tables) => shards.push(ShardTables {
                    source: entry.relative_path.clone(),
                    tables,
                }),
                Err(e) => warn!("Skipping shard {}: {}", entry.relative_path, e),
            }
        }
        shards
    }
}

/// Folder of the account rooted at `user_root` inside the shared container.
pub fn shared_user_root(user_root: &str) -> Option<String> {
    Some(account_hash(user_root))
        .filter(|hash| !hash.is_empty())
        .map(|hash| join_virtual(SHARED_ROOT, hash))
}

/// Last component of an account folder, i.e. the owner's id hash.
fn account_hash(user_root: &str) -> &str {
    user_root.trim_end_matches('/').rsplit('/').next().unwrap_or_default()
}

/// Append shared chat list entries not already listed, keeping the result
/// most recent first.
fn merge_chat_lists(mut main: Vec<Session>, shared: Vec<Session>) -> Vec<Session> {
    if shared.is_empty() {
        return main;
    }
    let mut known: HashSet<String> = main.iter().map(|s| s.hash.clone()).collect();
    let before = main.len();
    for session in shared {
        if known.insert(session.hash.clone()) {
            main.push(session);
        }
    }
    debug!("Shared chat list added {} sessions", main.len() - before);
    main.sort_by(|a, b| b.created_at.cmp(&a.created_at));
    main
}

fn derive_display_name(session: &Session, contacts: &ContactBook) -> String {
    if let Some(contact) = contacts.get(&session.user_id) {
        return contact.display_name().to_string();
    }
    if let Some(contact) = contacts.get_by_hash(&session.hash) {
        return contact.display_name().to_string();
    }
    session.output_name().to_string()
}
