//! SQLite storage layer for the haex sync core.
//!
//! Three small bookkeeping stores share one database file:
//! - [`LogStore`] — the append-only CRDT change log
//! - [`SyncStatusStore`] — per-(vault, backend) watermarks and cursors
//! - [`BackendRegistry`] — the configured sync backends
//!
//! Each store is cheap to clone (`Arc<Mutex<Connection>>`) and can either
//! open its own connection or share one via `from_connection`.

mod backend_registry;
mod log_store;
mod status_store;

pub use backend_registry::BackendRegistry;
pub use log_store::LogStore;
pub use status_store::SyncStatusStore;

use rusqlite::Connection;
use std::path::Path;
use std::sync::{Arc, Mutex};
use thiserror::Error;

/// Result type for storage operations.
pub type StorageResult<T> = Result<T, StorageError>;

/// Errors from the storage layer.
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("invalid stored value: {0}")]
    InvalidValue(String),
}

/// Opens a connection with the pragmas every store expects.
pub fn open_connection(path: &Path) -> StorageResult<Arc<Mutex<Connection>>> {
    let conn = Connection::open(path)?;
    conn.pragma_update(None, "journal_mode", "WAL")?;
    conn.pragma_update(None, "foreign_keys", "ON")?;
    conn.busy_timeout(std::time::Duration::from_millis(5000))?;
    Ok(Arc::new(Mutex::new(conn)))
}

/// Opens an in-memory connection (for testing).
pub fn open_in_memory() -> StorageResult<Arc<Mutex<Connection>>> {
    let conn = Connection::open_in_memory()?;
    Ok(Arc::new(Mutex::new(conn)))
}
