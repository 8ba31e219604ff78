//! Persisted list of configured sync backends. Plain CRUD — the registry
//! knows nothing about sync state.

use crate::{open_connection, open_in_memory, StorageError, StorageResult};
use haex_types::{BackendId, SyncBackend};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Stores the configured sync backends.
#[derive(Clone)]
pub struct BackendRegistry {
    conn: Arc<Mutex<Connection>>,
}

impl BackendRegistry {
    pub fn open(path: &Path) -> StorageResult<Self> {
        Self::from_connection(open_connection(path)?)
    }

    pub fn open_in_memory() -> StorageResult<Self> {
        Self::from_connection(open_in_memory()?)
    }

    pub fn from_connection(conn: Arc<Mutex<Connection>>) -> StorageResult<Self> {
        {
            let guard = conn.lock().unwrap();
            guard.execute_batch(
                r#"
                CREATE TABLE IF NOT EXISTS sync_backends (
                    id TEXT PRIMARY KEY,
                    name TEXT NOT NULL,
                    server_url TEXT NOT NULL,
                    enabled INTEGER NOT NULL DEFAULT 1,
                    priority INTEGER NOT NULL DEFAULT 0
                );
                "#,
            )?;
        }
        Ok(Self { conn })
    }

    pub fn add(&self, backend: &SyncBackend) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "INSERT INTO sync_backends (id, name, server_url, enabled, priority) VALUES (?, ?, ?, ?, ?)",
            params![
                backend.id.to_string(),
                backend.name,
                backend.server_url,
                backend.enabled,
                backend.priority,
            ],
        )?;
        Ok(())
    }

    pub fn update(&self, backend: &SyncBackend) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sync_backends SET name = ?, server_url = ?, enabled = ?, priority = ? WHERE id = ?",
            params![
                backend.name,
                backend.server_url,
                backend.enabled,
                backend.priority,
                backend.id.to_string(),
            ],
        )?;
        Ok(())
    }

    pub fn remove(&self, id: &BackendId) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute("DELETE FROM sync_backends WHERE id = ?", params![id.to_string()])?;
        Ok(())
    }

    pub fn get(&self, id: &BackendId) -> StorageResult<Option<SyncBackend>> {
        let conn = self.conn.lock().unwrap();
        conn.query_row(
            "SELECT id, name, server_url, enabled, priority FROM sync_backends WHERE id = ?",
            params![id.to_string()],
            row_to_backend,
        )
        .optional()
        .map_err(StorageError::from)
    }

    /// All backends, highest priority first.
    pub fn list(&self) -> StorageResult<Vec<SyncBackend>> {
        self.query("SELECT id, name, server_url, enabled, priority FROM sync_backends \
                    ORDER BY priority DESC, name ASC")
    }

    /// Enabled backends only, highest priority first.
    pub fn list_enabled(&self) -> StorageResult<Vec<SyncBackend>> {
        self.query("SELECT id, name, server_url, enabled, priority FROM sync_backends \
                    WHERE enabled = 1 ORDER BY priority DESC, name ASC")
    }

    pub fn set_enabled(&self, id: &BackendId, enabled: bool) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            "UPDATE sync_backends SET enabled = ? WHERE id = ?",
            params![enabled, id.to_string()],
        )?;
        Ok(())
    }

    fn query(&self, sql: &str) -> StorageResult<Vec<SyncBackend>> {
        let conn = self.conn.lock().unwrap();
        let mut stmt = conn.prepare(sql)?;
        let backends = stmt
            .query_map([], row_to_backend)?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(backends)
    }
}

fn row_to_backend(row: &rusqlite::Row<'_>) -> rusqlite::Result<SyncBackend> {
    let id_str: String = row.get(0)?;
    let id = id_str.parse::<BackendId>().map_err(|e| {
        rusqlite::Error::FromSqlConversionFailure(0, rusqlite::types::Type::Text, Box::new(e))
    })?;
    Ok(SyncBackend {
        id,
        name: row.get(1)?,
        server_url: row.get(2)?,
        enabled: row.get(3)?,
        priority: row.get(4)?,
    })
}
