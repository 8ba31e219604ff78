//! Sync backend descriptors and per-backend sync status.

use crate::hlc::HlcTimestamp;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// Unique identifier for a vault.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct VaultId(pub Uuid);

impl VaultId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for VaultId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for VaultId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for VaultId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// Unique identifier for a configured sync backend.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct BackendId(pub Uuid);

impl BackendId {
    pub fn new() -> Self {
        Self(Uuid::new_v4())
    }
}

impl Default for BackendId {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Display for BackendId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for BackendId {
    type Err = uuid::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Ok(Self(s.parse()?))
    }
}

/// A configured remote sync backend.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncBackend {
    pub id: BackendId,
    pub name: String,
    pub server_url: String,
    pub enabled: bool,
    pub priority: i32,
}

/// Sync bookkeeping for one (vault, backend) pair.
///
/// Mutated only by the orchestrator: the push watermark advances after a
/// successful push, the pull cursor after each applied page.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStatus {
    pub vault_id: VaultId,
    pub backend_id: BackendId,
    pub last_push_hlc_timestamp: Option<HlcTimestamp>,
    pub last_pull_sequence: Option<i64>,
    pub last_sync_at: Option<DateTime<Utc>>,
    pub error: Option<String>,
}

impl SyncStatus {
    /// An empty status row, created lazily on first sync.
    pub fn empty(vault_id: VaultId, backend_id: BackendId) -> Self {
        Self {
            vault_id,
            backend_id,
            last_push_hlc_timestamp: None,
            last_pull_sequence: None,
            last_sync_at: None,
            error: None,
        }
    }
}
