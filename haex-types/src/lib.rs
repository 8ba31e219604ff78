//! Shared data model for the haex vault sync core.
//!
//! Holds the types every other crate agrees on: hybrid logical clock
//! timestamps, CRDT log entries with their encrypted wire form, backend
//! descriptors, and per-backend sync status.

mod backend;
mod entry;
mod hlc;

pub use backend::{BackendId, SyncBackend, SyncStatus, VaultId};
pub use entry::{CrdtLogEntry, EncryptedLogEnvelope, OpType};
pub use hlc::{HlcClock, HlcParseError, HlcTimestamp};
