//! In-memory vault-key cache.
//!
//! Read-through only: the cache never refreshes itself, callers populate it
//! after generating or decrypting a key. `cached_at` is recorded but there
//! is no TTL expiry — eviction is explicit, on vault close or logout.

use crate::vault_key::VaultKey;
use chrono::{DateTime, Utc};
use haex_types::VaultId;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// A cached vault key with the time it entered the cache.
#[derive(Clone)]
pub struct CachedVaultKey {
    pub key: VaultKey,
    pub cached_at: DateTime<Utc>,
}

/// Thread-safe per-vault key cache.
#[derive(Clone, Default)]
pub struct VaultKeyCache {
    keys: Arc<RwLock<HashMap<VaultId, CachedVaultKey>>>,
}

impl VaultKeyCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Caches a key for a vault, replacing any previous entry.
    pub async fn insert(&self, vault_id: VaultId, key: VaultKey) {
        self.keys.write().await.insert(
            vault_id,
            CachedVaultKey {
                key,
                cached_at: Utc::now(),
            },
        );
    }

    /// Returns a clone of the cached key, if present.
    pub async fn get(&self, vault_id: &VaultId) -> Option<VaultKey> {
        self.keys.read().await.get(vault_id).map(|c| c.key.clone())
    }

    pub async fn contains(&self, vault_id: &VaultId) -> bool {
        self.keys.read().await.contains_key(vault_id)
    }

    /// Evicts a single vault's key (on vault close).
    pub async fn evict(&self, vault_id: &VaultId) {
        self.keys.write().await.remove(vault_id);
    }

    /// Clears every cached key.
    pub async fn clear(&self) {
        self.keys.write().await.clear();
    }

    pub async fn len(&self) -> usize {
        self.keys.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.keys.read().await.is_empty()
    }
}
