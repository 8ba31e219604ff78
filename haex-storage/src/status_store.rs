//! Per-(vault, backend) sync bookkeeping.

use crate::{open_connection, open_in_memory, StorageError, StorageResult};
use chrono::{DateTime, Utc};
use haex_types::{BackendId, HlcTimestamp, SyncStatus, VaultId};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::Path;
use std::sync::{Arc, Mutex};

/// Persists sync watermarks, cursors, and the last backend error.
///
/// Rows are created lazily on first upsert and mutated only by the
/// orchestrator's push/pull cycles.
#[derive(Clone)]
pub struct SyncStatusStore {
    conn: Arc<Mutex<Connection>>,
}

impl SyncStatusStore {
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
                CREATE TABLE IF NOT EXISTS sync_status (
                    vault_id TEXT NOT NULL,
                    backend_id TEXT NOT NULL,
                    last_push_hlc_timestamp TEXT,
                    last_pull_sequence INTEGER,
                    last_sync_at TEXT,
                    error TEXT,
                    PRIMARY KEY (vault_id, backend_id)
                );
                "#,
            )?;
        }
        Ok(Self { conn })
    }

    /// Returns the status row for a (vault, backend) pair, if any.
    pub fn get(&self, vault_id: &VaultId, backend_id: &BackendId) -> StorageResult<Option<SyncStatus>> {
        let conn = self.conn.lock().unwrap();
        let row = conn
            .query_row(
                "SELECT last_push_hlc_timestamp, last_pull_sequence, last_sync_at, error \
                 FROM sync_status WHERE vault_id = ? AND backend_id = ?",
                params![vault_id.to_string(), backend_id.to_string()],
                |row| {
                    Ok((
                        row.get::<_, Option<String>>(0)?,
                        row.get::<_, Option<i64>>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, Option<String>>(3)?,
                    ))
                },
            )
            .optional()?;

        let Some((push, pull, synced_at, error)) = row else {
            return Ok(None);
        };

        let last_push_hlc_timestamp = push
            .map(|s| {
                s.parse::<HlcTimestamp>()
                    .map_err(|_| StorageError::InvalidValue(format!("bad HLC watermark: {s}")))
            })
            .transpose()?;
        let last_sync_at = synced_at
            .map(|s| {
                s.parse::<DateTime<Utc>>()
                    .map_err(|_| StorageError::InvalidValue(format!("bad sync time: {s}")))
            })
            .transpose()?;

        Ok(Some(SyncStatus {
            vault_id: *vault_id,
            backend_id: *backend_id,
            last_push_hlc_timestamp,
            last_pull_sequence: pull,
            last_sync_at,
            error,
        }))
    }

    /// Advances the push watermark and clears any recorded error.
    pub fn record_push(
        &self,
        vault_id: &VaultId,
        backend_id: &BackendId,
        watermark: &HlcTimestamp,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO sync_status (vault_id, backend_id, last_push_hlc_timestamp, last_sync_at, error)
            VALUES (?1, ?2, ?3, ?4, NULL)
            ON CONFLICT(vault_id, backend_id) DO UPDATE SET
                last_push_hlc_timestamp = excluded.last_push_hlc_timestamp,
                last_sync_at = excluded.last_sync_at,
                error = NULL
            "#,
            params![
                vault_id.to_string(),
                backend_id.to_string(),
                watermark.to_string(),
                at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Advances the pull cursor and clears any recorded error.
    pub fn record_pull(
        &self,
        vault_id: &VaultId,
        backend_id: &BackendId,
        sequence: i64,
        at: DateTime<Utc>,
    ) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO sync_status (vault_id, backend_id, last_pull_sequence, last_sync_at, error)
            VALUES (?1, ?2, ?3, ?4, NULL)
            ON CONFLICT(vault_id, backend_id) DO UPDATE SET
                last_pull_sequence = excluded.last_pull_sequence,
                last_sync_at = excluded.last_sync_at,
                error = NULL
            "#,
            params![
                vault_id.to_string(),
                backend_id.to_string(),
                sequence,
                at.to_rfc3339(),
            ],
        )?;
        Ok(())
    }

    /// Records a backend error for status visibility; watermarks are kept.
    pub fn record_error(
        &self,
        vault_id: &VaultId,
        backend_id: &BackendId,
        message: &str,
    ) -> StorageResult<()> {
        let conn = self.conn.lock().unwrap();
        conn.execute(
            r#"
            INSERT INTO sync_status (vault_id, backend_id, error)
            VALUES (?1, ?2, ?3)
            ON CONFLICT(vault_id, backend_id) DO UPDATE SET error = excluded.error
            "#,
            params![vault_id.to_string(), backend_id.to_string(), message],
        )?;
        Ok(())
    }
}
