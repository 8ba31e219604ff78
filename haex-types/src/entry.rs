//! CRDT change-log entries and their encrypted wire form.

use crate::hlc::HlcTimestamp;
use crate::VaultId;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Kind of column-level mutation recorded in the log.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum OpType {
    Insert,
    Update,
    Delete,
}

/// One column-level mutation in the append-only CRDT log.
///
/// Entries are produced by local mutation triggers and by pull application;
/// re-inserting an entry with the same `id` is a no-op everywhere.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CrdtLogEntry {
    pub id: Uuid,
    pub haex_timestamp: HlcTimestamp,
    pub table_name: String,
    /// Primary-key values of the mutated row, as a JSON object.
    pub row_pks: serde_json::Value,
    pub op_type: OpType,
    /// `None` for whole-row operations (INSERT/DELETE).
    pub column_name: Option<String>,
    pub new_value: Option<serde_json::Value>,
    pub old_value: Option<serde_json::Value>,
}

/// Encrypted wire form of a log entry.
///
/// `encrypted_data` and `nonce` are base64; `sequence` is assigned by the
/// backend on ingest and serves as the pull cursor, so it is absent on push.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedLogEnvelope {
    pub vault_id: VaultId,
    pub encrypted_data: String,
    pub nonce: String,
    pub haex_timestamp: HlcTimestamp,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sequence: Option<i64>,
}
