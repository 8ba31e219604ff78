//! Wire and status types for sync operations.

use haex_types::{BackendId, EncryptedLogEnvelope, HlcTimestamp, SyncStatus, VaultId};
use serde::{Deserialize, Serialize};

/// Health/discovery response from `GET {serverUrl}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct HealthResponse {
    #[serde(default)]
    pub status: Option<String>,
    /// Where the realtime change feed lives, if the backend offers one.
    #[serde(default)]
    pub realtime: Option<RealtimeDescriptor>,
}

/// Realtime-endpoint descriptor advertised by a backend.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RealtimeDescriptor {
    pub url: String,
    #[serde(default)]
    pub topic_prefix: Option<String>,
}

/// Encrypted vault-key record as stored on a backend, one per vault.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VaultKeyRecord {
    pub vault_id: VaultId,
    /// Base64 AES-256-GCM ciphertext of the vault key.
    pub encrypted_vault_key: String,
    /// Base64 PBKDF2 salt.
    pub salt: String,
    /// Base64 GCM nonce.
    pub nonce: String,
}

/// Body of `POST /sync/push`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PushRequest {
    pub vault_id: VaultId,
    pub logs: Vec<EncryptedLogEnvelope>,
}

/// Body of `POST /sync/pull`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullRequest {
    pub vault_id: VaultId,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub after_sequence: Option<i64>,
    pub limit: u32,
}

/// Response of `POST /sync/pull`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PullResponse {
    pub logs: Vec<EncryptedLogEnvelope>,
    pub has_more: bool,
}

/// Per-backend position in the sync lifecycle.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum BackendState {
    Uninitialized,
    Initializing,
    Idle,
    Syncing,
    Error,
    /// Terminal after `stop_sync`.
    Unsubscribed,
}

/// Result of a push cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum PushOutcome {
    /// Another push or pull for this backend was already in flight.
    SkippedBusy,
    /// Nothing newer than the push watermark.
    NoChanges,
    Pushed {
        count: usize,
        watermark: HlcTimestamp,
    },
}

/// Result of a pull cycle.
#[derive(Clone, Debug, PartialEq)]
pub enum PullOutcome {
    /// Another push or pull for this backend was already in flight.
    SkippedBusy,
    Completed(PullSummary),
}

/// Counters for one completed pull cycle.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct PullSummary {
    /// Envelopes received from the backend.
    pub fetched: usize,
    /// Entries newly inserted into the local log (duplicates excluded).
    pub applied: usize,
    /// Envelopes dropped because they failed to decrypt or deserialize.
    pub dropped: usize,
    /// Highest server sequence seen, i.e. the new pull cursor.
    pub cursor: Option<i64>,
}

/// One backend's outcome inside a local-write fan-out.
#[derive(Debug)]
pub struct BackendPushResult {
    pub backend_id: BackendId,
    pub outcome: Result<PushOutcome, String>,
}

/// Collected outcomes of `on_local_write` across all enabled backends.
#[derive(Debug, Default)]
pub struct LocalWriteReport {
    pub results: Vec<BackendPushResult>,
}

impl LocalWriteReport {
    pub fn failures(&self) -> impl Iterator<Item = &BackendPushResult> {
        self.results.iter().filter(|r| r.outcome.is_err())
    }

    pub fn all_succeeded(&self) -> bool {
        self.results.iter().all(|r| r.outcome.is_ok())
    }
}

/// Aggregate status for one backend, reported to the UI.
#[derive(Clone, Debug)]
pub struct BackendStatusReport {
    pub backend_id: BackendId,
    pub state: BackendState,
    pub status: Option<SyncStatus>,
}
