//! Sync engine for haex vaults.
//!
//! Everything leaving the device is encrypted with the vault key before it
//! reaches a backend; backends store opaque envelopes and hand out
//! monotonically increasing sequence numbers. The pieces:
//!
//! - [`BackendClient`]: authenticated HTTP transport for one backend
//! - [`SyncEngine`]: vault-key exchange plus encrypted log push/pull
//! - [`SyncOrchestrator`]: per-vault lifecycle, cycles, and realtime
//! - [`RealtimeChannel`]: pluggable change-notification source

pub mod auth;
pub mod client;
pub mod config;
pub mod engine;
pub mod error;
pub mod orchestrator;
pub mod realtime;
pub mod types;

pub use auth::{SharedTokenProvider, StaticTokenProvider, TokenProvider};
pub use client::BackendClient;
pub use config::SyncConfig;
pub use engine::{PulledPage, SyncEngine};
pub use error::{SyncError, SyncResult};
pub use orchestrator::SyncOrchestrator;
pub use realtime::{ChangeNotification, InMemoryRealtime, RealtimeChannel};
pub use types::{
    BackendPushResult, BackendState, BackendStatusReport, HealthResponse, LocalWriteReport,
    PullOutcome, PullRequest, PullResponse, PullSummary, PushOutcome, PushRequest, VaultKeyRecord,
};
