//! Sync engine configuration.

/// Configuration shared by every backend client and the orchestrator.
#[derive(Clone, Debug)]
pub struct SyncConfig {
    /// reqwest client timeout. This is the only timeout at this layer;
    /// individual push/pull operations set no deadline of their own.
    pub request_timeout_secs: u64,

    /// Page size for pull requests.
    pub pull_limit: u32,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            request_timeout_secs: 30,
            pull_limit: 500,
        }
    }
}
