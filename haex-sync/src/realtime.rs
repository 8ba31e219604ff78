//! Realtime change notifications.
//!
//! A backend fans out an insert notification whenever another device pushes
//! to the vault's log. The payload is opaque to this layer — it is only a
//! trigger to re-pull, never parsed for data content.

use crate::error::{SyncError, SyncResult};
use async_trait::async_trait;
use haex_types::{BackendId, SyncBackend, VaultId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::{mpsc, Mutex};

/// An opaque change notification for a vault.
#[derive(Clone, Debug)]
pub struct ChangeNotification {
    pub vault_id: VaultId,
    /// Whatever the backend sent; carried for logging only.
    pub payload: serde_json::Value,
}

/// Subscription source for a backend's vault-scoped change feed.
#[async_trait]
pub trait RealtimeChannel: Send + Sync {
    /// Opens a subscription; notifications arrive on the returned receiver.
    async fn subscribe(
        &self,
        backend: &SyncBackend,
        vault_id: &VaultId,
    ) -> SyncResult<mpsc::Receiver<ChangeNotification>>;

    /// Tears down the subscription; dropping the receiver alone is not
    /// enough for transports with server-side subscription state.
    async fn unsubscribe(&self, backend_id: &BackendId, vault_id: &VaultId) -> SyncResult<()>;
}

/// In-process pub/sub channel.
///
/// Used by tests and by embedders that bridge their own transport (e.g. a
/// websocket reader) into the orchestrator by publishing here.
#[derive(Clone)]
pub struct InMemoryRealtime {
    senders: Arc<Mutex<HashMap<(BackendId, VaultId), mpsc::Sender<ChangeNotification>>>>,
    capacity: usize,
}

impl Default for InMemoryRealtime {
    fn default() -> Self {
        Self::new(64)
    }
}

impl InMemoryRealtime {
    pub fn new(capacity: usize) -> Self {
        Self {
            senders: Arc::new(Mutex::new(HashMap::new())),
            capacity: capacity.max(1),
        }
    }

    /// Delivers a notification to the matching subscriber, if any.
    /// Returns `true` if someone was listening.
    pub async fn publish(&self, backend_id: &BackendId, notification: ChangeNotification) -> bool {
        let senders = self.senders.lock().await;
        match senders.get(&(*backend_id, notification.vault_id)) {
            Some(tx) => tx.send(notification).await.is_ok(),
            None => false,
        }
    }
}

#[async_trait]
impl RealtimeChannel for InMemoryRealtime {
    async fn subscribe(
        &self,
        backend: &SyncBackend,
        vault_id: &VaultId,
    ) -> SyncResult<mpsc::Receiver<ChangeNotification>> {
        let (tx, rx) = mpsc::channel(self.capacity);
        let mut senders = self.senders.lock().await;
        if senders.contains_key(&(backend.id, *vault_id)) {
            return Err(SyncError::Configuration(format!(
                "already subscribed to backend {} for vault {vault_id}",
                backend.id
            )));
        }
        senders.insert((backend.id, *vault_id), tx);
        Ok(rx)
    }

    async fn unsubscribe(&self, backend_id: &BackendId, vault_id: &VaultId) -> SyncResult<()> {
        self.senders.lock().await.remove(&(*backend_id, *vault_id));
        Ok(())
    }
}
