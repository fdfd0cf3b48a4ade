//! Ordered row streams over the message shards of a session.
//!
//! Each shard is queried already ordered by `(CreateTime, MesLocalID)`. The
//! per-shard cursors are merged one row at a time, so nothing past the
//! current head of each shard is decoded.

use rusqlite::types::ValueRef;
use rusqlite::{Connection, Rows, Statement};
use tracing::{debug, warn};

use super::options::SortOrder;
use crate::backup::BackupIndex;
use crate::db::{open_readonly, quote_ident};
use crate::model::{RawMessageRow, Session};

/// Open every shard holding the session's table, in source order.
pub(super) fn open_shards(index: &BackupIndex, session: &Session) -> Vec<(String, Connection)> {
    let mut sources = session.sources.clone();
    sources.sort();
    sources.dedup();

    let mut shards = Vec::new();
    for source in sources {
        let Some(path) = index.real_path(&source) else {
            debug!("Shard {} has no stored bytes", source);
            continue;
        };
        match open_readonly(&path) {
            Ok(conn) => shards.push((source, conn)),
            Err(e) => warn!("Skipping shard {}: {}", source, e),
        }
    }
    shards
}

/// A prepared, ordered query over one shard's table.
pub(super) struct ShardQuery<'c> {
    source: String,
    stmt: Statement<'c>,
}

pub(super) fn prepare<'c>(shards: &'c [(String, Connection)], table: &str, order: SortOrder) -> Vec<ShardQuery<'c>> {
    let dir = match order {
        SortOrder::Ascending => "ASC",
        SortOrder::Descending => "DESC",
    };
    let sql = format!(
        "SELECT CreateTime, Message, Des, Type, MesLocalID FROM {} \
         ORDER BY CAST(CreateTime AS INTEGER) {dir}, CAST(MesLocalID AS INTEGER) {dir}",
        quote_ident(table),
        dir = dir
    );

    let mut queries = Vec::new();
    for (source, conn) in shards {
        match conn.prepare(&sql) {
            Ok(stmt) => queries.push(ShardQuery {
                source: source.clone(),
                stmt,
            }),
            Err(e) => warn!("Skipping {} in {}: {}", table, source, e),
        }
    }
    queries
}

struct ShardCursor<'s> {
    source: String,
    rows: Rows<'s>,
    head: Option<RawMessageRow>,
}

impl ShardCursor<'_> {
    /// Move `head` to the next decodable row, counting the ones dropped.
    fn advance(&mut self, skipped: &mut usize) {
        self.head = None;
        loop {
            match self.rows.next() {
                Ok(Some(row)) => match decode_row(row) {
                    Some(raw) => {
                        self.head = Some(raw);
                        return;
                    }
                    None => *skipped += 1,
                },
                Ok(None) => return,
                Err(e) => {
                    warn!("Stopped reading {}: {}", self.source, e);
                    return;
                }
            }
        }
    }
}

/// Rows of all shards merged into output order.
pub(super) struct RowStream<'s> {
    cursors: Vec<ShardCursor<'s>>,
    order: SortOrder,
    skipped: usize,
}

impl<'s> RowStream<'s> {
    pub(super) fn new(queries: &'s mut [ShardQuery<'_>], order: SortOrder) -> Self {
        let mut stream = Self {
            cursors: Vec::with_capacity(queries.len()),
            order,
            skipped: 0,
        };
        for query in queries.iter_mut() {
            match query.stmt.query([]) {
                Ok(rows) => {
                    let mut cursor = ShardCursor {
                        source: query.source.clone(),
                        rows,
                        head: None,
                    };
                    cursor.advance(&mut stream.skipped);
                    stream.cursors.push(cursor);
                }
                Err(e) => warn!("Skipping shard {}: {}", query.source, e),
            }
        }
        stream
    }

    /// Rows dropped so far because a required column was missing.
    pub(super) fn skipped(&self) -> usize {
        self.skipped
    }
}

impl Iterator for RowStream<'_> {
    type Item = RawMessageRow;

    fn next(&mut self) -> Option<RawMessageRow> {
        let mut best: Option<(usize, (i64, i64))> = None;
        for (i, cursor) in self.cursors.iter().enumerate() {
            let Some(key) = cursor.head.as_ref().map(RawMessageRow::sort_key) else {
                continue;
            };
            let better = match (best, self.order) {
                (None, _) => true,
                (Some((_, b)), SortOrder::Ascending) => key < b,
                (Some((_, b)), SortOrder::Descending) => key >= b,
            };
            if better {
                best = Some((i, key));
            }
        }

        let (i, _) = best?;
        let cursor = &mut self.cursors[i];
        let row = cursor.head.take();
        cursor.advance(&mut self.skipped);
        row
    }
}

/// Decode one stored row; `None` when time, type or id is missing.
fn decode_row(row: &rusqlite::Row<'_>) -> Option<RawMessageRow> {
    let int = |i: usize| match row.get_ref(i) {
        Ok(ValueRef::Integer(v)) => Some(v),
        Ok(ValueRef::Text(t)) => std::str::from_utf8(t).ok()?.trim().parse().ok(),
        _ => None,
    };
    let message = match row.get_ref(1) {
        Ok(ValueRef::Text(b)) | Ok(ValueRef::Blob(b)) => String::from_utf8_lossy(b).into_owned(),
        Ok(ValueRef::Integer(v)) => v.to_string(),
        _ => String::new(),
    };
    Some(RawMessageRow {
        create_time: int(0)?,
        message,
        des: int(2).unwrap_or(1),
        msg_type: int(3)?,
        msg_id: int(4)?,
    })
}
