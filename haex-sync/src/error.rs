//! Sync error taxonomy.
//!
//! `Configuration` and authentication failures abort the operation and
//! surface to the caller. `Transport` aborts the current cycle and is
//! recorded into `SyncStatus.error` without halting other backends.
//! Corrupt entries never escape a pull — they are dropped where found.

use haex_crypto::CryptoError;
use haex_storage::StorageError;
use haex_types::VaultId;
use thiserror::Error;

/// Result type for sync operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in sync operations.
#[derive(Debug, Error)]
pub enum SyncError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("authentication required")]
    Unauthenticated,

    #[error("authentication failed: {0}")]
    Authentication(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("vault key unavailable for vault {0}")]
    KeyUnavailable(VaultId),

    #[error("corrupt log entry: {0}")]
    CorruptEntry(String),

    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("background task failed: {0}")]
    TaskJoin(String),
}

impl SyncError {
    /// True for failures the caller should treat as "reauthenticate",
    /// including a GCM tag mismatch on the stored vault key.
    pub fn is_authentication(&self) -> bool {
        matches!(
            self,
            SyncError::Unauthenticated
                | SyncError::Authentication(_)
                | SyncError::Crypto(CryptoError::AuthenticationFailure)
        )
    }

    /// True for network-level failures that are recorded into
    /// `SyncStatus.error` rather than halting other backends.
    pub fn is_transport(&self) -> bool {
        matches!(self, SyncError::Transport(_) | SyncError::Http(_))
    }
}
