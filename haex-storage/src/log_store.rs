//! Append-only CRDT change log.
//!
//! Entries are keyed by id; `INSERT OR IGNORE` makes re-insertion a no-op,
//! which is what makes pull application conflict-free under duplicate
//! delivery. The HLC column stores the canonical zero-padded string, so
//! `>` and `ORDER BY` on the text column follow logical order.

use crate::{open_connection, open_in_memory, StorageError, StorageResult};
use haex_types::{CrdtLogEntry, HlcTimestamp, OpType};
use rusqlite::{params, Connection};
use std::path::Path;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Persists the local CRDT change log.
#[derive(Clone)]
pub struct LogStore {
    conn: Arc<Mutex<Connection>>,
}

impl LogStore {
    /// Opens or creates a log store at the given path.
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::from_connection(open_connection(path)?)
    }

    /// Opens an in-memory log store (for testing).
    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(open_in_memory()?)
    }

    /// Wraps an existing connection, initializing the schema.
    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> StorageResult<Self> {
        {
            let guard = conn.lock().unwrap();
            guard.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS crdt_log (
                    id TEXT PRIMARY KEY,
                    haex_timestamp TEXT NOT NULL,
                    table_name TEXT NOT NULL,
                    row_pks TEXT NOT NULL,
                    op_type TEXT NOT NULL,
                    column_name TEXT,
                    new_value TEXT,
                    old_value TEXT
                );
                CREATE INDEX IF NOT EXISTS idx_crdt_log_hlc ON crdt_log(haex_timestamp);
                "#,
            )?;
        }
        Ok(Self { conn })
    }

    /// Inserts an entry unless one with the same id already exists.
    /// Returns `true` if the entry was applied, `false` if it was a no-op.
    pub fn insert_if_absent(&self, entry: &CrdtLogEntry) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let changed = conn.execute(
            r#"
            INSERT OR IGNORE INTO crdt_log (
                id, haex_timestamp, table_name, row_pks,
                op_type, column_name, new_value, old_value
            ) VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            "#,
            params![
                entry.id.to_string(),
                entry.haex_timestamp.to_string(),
                entry.table_name,
                entry.row_pks.to_string(),
                op_type_str(entry.op_type),
                entry.column_name,
                entry.new_value.as_ref().map(|v| v.to_string()),
                entry.old_value.as_ref().map(|v| v.to_string()),
            ],
        )?;
        Ok(changed > 0)
    }

    /// Inserts a batch, skipping duplicates. Returns how many were applied.
    pub fn insert_all_if_absent(&self, entries: &[CrdtLogEntry]) -> StorageResult<usize> {
        let mut applied = 0;
        for entry in entries {
            if self.insert_if_absent(entry)? {
                applied += 1;
            }
        }
        Ok(applied)
    }

    /// Entries with timestamp strictly greater than `after`, ascending.
    /// `None` selects the whole log.
    pub fn entries_after(&self, after: Option<&HlcTimestamp>) -> StorageResult<Vec<CrdtLogEntry>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(
            "SELECT id, haex_timestamp, table_name, row_pks, op_type, column_name, new_value, old_value \
             FROM crdt_log WHERE haex_timestamp > ? ORDER BY haex_timestamp ASC",
        )?;
        let floor = after.map(|ts| ts.to_string()).unwrap_or_default();
        let rows = stmt.query_map(params![floor], row_to_raw)?;

        let mut entries = Vec::new();
        for row in rows {
            entries.push(raw_to_entry(row?)?);
        }
        Ok(entries)
    }

    /// The whole log, ascending by timestamp.
    pub fn all_entries(&self) -> StorageResult<Vec<CrdtLogEntry>> {
        self.entries_after(None)
    }

    pub fn contains(&self, id: &Uuid) -> StorageResult<bool> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row(
            "SELECT COUNT(*) FROM crdt_log WHERE id = ?",
            params![id.to_string()],
            |row| row.get(0),
        )?;
        Ok(count > 0)
    }

    pub fn len(&self) -> StorageResult<usize> {
        let conn = self.conn.lock().unwrap();
        let count: i64 = conn.query_row("SELECT COUNT(*) FROM crdt_log", [], |row| row.get(0))?;
        Ok(count as usize)
    }

    pub fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}

type RawRow = (
    String,
    String,
    String,
    String,
    String,
    Option<String>,
    Option<String>,
    Option<String>,
);

fn row_to_raw(row: &rusqlite::Row<'_>) -> rusqlite::Result<RawRow> {
    Ok((
        row.get(0)?,
        row.get(1)?,
        row.get(2)?,
        row.get(3)?,
        row.get(4)?,
        row.get(5)?,
        row.get(6)?,
        row.get(7)?,
    ))
}

fn raw_to_entry(raw: RawRow) -> StorageResult<CrdtLogEntry> {
    let (id, hlc, table_name, row_pks, op_type, column_name, new_value, old_value) = raw;
    Ok(CrdtLogEntry {
        id: id
            .parse()
            .map_err(|_| StorageError::InvalidValue(format!("bad entry id: {id}")))?,
        haex_timestamp: hlc
            .parse()
            .map_err(|_| StorageError::InvalidValue(format!("bad HLC timestamp: {hlc}")))?,
        table_name,
        row_pks: serde_json::from_str(&row_pks)?,
        op_type: op_type_from_str(&op_type)?,
        column_name,
        new_value: new_value.as_deref().map(serde_json::from_str).transpose()?,
        old_value: old_value.as_deref().map(serde_json::from_str).transpose()?,
    })
}

fn op_type_str(op: OpType) -> &'static str {
    match op {
        OpType::Insert => "INSERT",
        OpType::Update => "UPDATE",
        OpType::Delete => "DELETE",
    }
}

fn op_type_from_str(s: &str) -> StorageResult<OpType> {
    match s {
        "INSERT" => Ok(OpType::Insert),
        "UPDATE" => Ok(OpType::Update),
        "DELETE" => Ok(OpType::Delete),
        other => Err(StorageError::InvalidValue(format!("bad op type: {other}"))),
    }
}
