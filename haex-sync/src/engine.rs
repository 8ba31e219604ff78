//! Per-backend sync transport: vault-key exchange and encrypted log batches.
//!
//! The engine owns one [`BackendClient`] per registered backend plus the
//! vault-key cache. Log entries are encrypted individually — each envelope
//! carries its own fresh nonce — so a single corrupt entry can never block
//! decrypting the rest of a batch.

use crate::auth::TokenProvider;
use crate::client::BackendClient;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::types::{PullRequest, PushRequest, VaultKeyRecord};
use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use haex_crypto::{
    decrypt_from_storage, decrypt_with_key, encrypt_for_storage, encrypt_with_key,
    EncryptedVaultKey, VaultKey, VaultKeyCache, NONCE_SIZE, SALT_SIZE,
};
use haex_types::{BackendId, CrdtLogEntry, EncryptedLogEnvelope, SyncBackend, VaultId};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, warn};

/// One page of decrypted pull results.
#[derive(Debug, Default)]
pub struct PulledPage {
    /// `(server sequence, entry)` pairs that decrypted cleanly.
    pub entries: Vec<(i64, CrdtLogEntry)>,
    /// Envelopes dropped in place (bad nonce, tag mismatch, bad JSON).
    pub dropped: usize,
    /// Highest server sequence seen in this page, dropped envelopes
    /// included, so the cursor still advances past poison entries.
    pub max_sequence: Option<i64>,
    pub has_more: bool,
}

/// Authenticated, encrypting transport across all registered backends.
pub struct SyncEngine {
    clients: RwLock<HashMap<BackendId, Arc<BackendClient>>>,
    key_cache: VaultKeyCache,
    tokens: Arc<dyn TokenProvider>,
    config: SyncConfig,
}

impl SyncEngine {
    pub fn new(tokens: Arc<dyn TokenProvider>, config: SyncConfig) -> Self {
        Self {
            clients: RwLock::new(HashMap::new()),
            key_cache: VaultKeyCache::new(),
            tokens,
            config,
        }
    }

    /// The vault-key cache this engine reads through.
    pub fn key_cache(&self) -> &VaultKeyCache {
        &self.key_cache
    }

    /// Registers (or replaces) the client for a backend.
    pub async fn register_backend(&self, backend: &SyncBackend) {
        let client = Arc::new(BackendClient::new(
            backend.server_url.clone(),
            self.tokens.clone(),
            &self.config,
        ));
        self.clients.write().await.insert(backend.id, client);
    }

    pub async fn remove_backend(&self, backend_id: &BackendId) {
        self.clients.write().await.remove(backend_id);
    }

    async fn client(&self, backend_id: &BackendId) -> SyncResult<Arc<BackendClient>> {
        self.clients
            .read()
            .await
            .get(backend_id)
            .cloned()
            .ok_or_else(|| SyncError::Configuration(format!("backend {backend_id} not registered")))
    }

    /// Generates a fresh vault key, encrypts it under the password, and
    /// uploads it. The plaintext key enters the cache only after the
    /// upload succeeded, so a failed upload never pollutes the cache.
    pub async fn store_vault_key(
        &self,
        backend_id: &BackendId,
        vault_id: &VaultId,
        password: &str,
    ) -> SyncResult<()> {
        let client = self.client(backend_id).await?;

        let key = VaultKey::generate();
        let encrypted = encrypt_for_storage(&key, password)?;
        let record = VaultKeyRecord {
            vault_id: *vault_id,
            encrypted_vault_key: BASE64.encode(&encrypted.encrypted_vault_key),
            salt: BASE64.encode(encrypted.salt),
            nonce: BASE64.encode(encrypted.nonce),
        };

        client.store_vault_key(&record).await?;
        self.key_cache.insert(*vault_id, key).await;
        debug!(vault = %vault_id, backend = %backend_id, "vault key stored and cached");
        Ok(())
    }

    /// Returns the vault key, from cache when possible, otherwise fetched
    /// from the backend and decrypted with the password.
    pub async fn get_vault_key(
        &self,
        backend_id: &BackendId,
        vault_id: &VaultId,
        password: &str,
    ) -> SyncResult<VaultKey> {
        if let Some(key) = self.key_cache.get(vault_id).await {
            return Ok(key);
        }

        let client = self.client(backend_id).await?;
        let record = client.fetch_vault_key(vault_id).await?;
        let encrypted = decode_vault_key_record(&record)?;
        let key = decrypt_from_storage(&encrypted, password)?;

        self.key_cache.insert(*vault_id, key.clone()).await;
        debug!(vault = %vault_id, backend = %backend_id, "vault key fetched and cached");
        Ok(key)
    }

    /// Encrypts and pushes a log batch in ascending timestamp order.
    /// Requires the vault key to already be cached.
    pub async fn push_logs(
        &self,
        backend_id: &BackendId,
        vault_id: &VaultId,
        entries: &[CrdtLogEntry],
    ) -> SyncResult<()> {
        let client = self.client(backend_id).await?;
        let key = self
            .key_cache
            .get(vault_id)
            .await
            .ok_or(SyncError::KeyUnavailable(*vault_id))?;

        let mut ordered: Vec<&CrdtLogEntry> = entries.iter().collect();
        ordered.sort_by(|a, b| a.haex_timestamp.cmp(&b.haex_timestamp));

        let mut logs = Vec::with_capacity(ordered.len());
        for entry in ordered {
            let plaintext = serde_json::to_vec(entry)?;
            let (nonce, ciphertext) = encrypt_with_key(&key, &plaintext)?;
            logs.push(EncryptedLogEnvelope {
                vault_id: *vault_id,
                encrypted_data: BASE64.encode(&ciphertext),
                nonce: BASE64.encode(nonce),
                haex_timestamp: entry.haex_timestamp.clone(),
                sequence: None,
            });
        }

        client.push(&PushRequest {
            vault_id: *vault_id,
            logs,
        })
        .await
    }

    /// Pulls one page of envelopes after `after_sequence` and decrypts them.
    ///
    /// A per-entry failure is logged, counted, and dropped — corrupted or
    /// foreign entries never block forward progress.
    pub async fn pull_logs(
        &self,
        backend_id: &BackendId,
        vault_id: &VaultId,
        after_sequence: Option<i64>,
        limit: u32,
    ) -> SyncResult<PulledPage> {
        let client = self.client(backend_id).await?;
        let key = self
            .key_cache
            .get(vault_id)
            .await
            .ok_or(SyncError::KeyUnavailable(*vault_id))?;

        let response = client
            .pull(&PullRequest {
                vault_id: *vault_id,
                after_sequence,
                limit,
            })
            .await?;

        let mut page = PulledPage {
            has_more: response.has_more,
            ..Default::default()
        };

        for envelope in response.logs {
            if let Some(sequence) = envelope.sequence {
                page.max_sequence = Some(page.max_sequence.map_or(sequence, |s| s.max(sequence)));
            }
            match decrypt_envelope(&key, &envelope) {
                Ok((sequence, entry)) => page.entries.push((sequence, entry)),
                Err(e) => {
                    warn!(
                        vault = %vault_id,
                        backend = %backend_id,
                        sequence = ?envelope.sequence,
                        "dropping undecryptable envelope: {e}"
                    );
                    page.dropped += 1;
                }
            }
        }

        Ok(page)
    }

    /// Best-effort liveness probe; never errors on an unreachable backend.
    pub async fn health_check(&self, backend_id: &BackendId) -> SyncResult<bool> {
        let client = self.client(backend_id).await?;
        Ok(client.health().await.is_ok())
    }
}

fn decode_vault_key_record(record: &VaultKeyRecord) -> SyncResult<EncryptedVaultKey> {
    let encrypted_vault_key = BASE64
        .decode(&record.encrypted_vault_key)
        .map_err(|e| SyncError::CorruptEntry(format!("bad vault key encoding: {e}")))?;
    let salt_bytes = BASE64
        .decode(&record.salt)
        .map_err(|e| SyncError::CorruptEntry(format!("bad salt encoding: {e}")))?;
    let nonce_bytes = BASE64
        .decode(&record.nonce)
        .map_err(|e| SyncError::CorruptEntry(format!("bad nonce encoding: {e}")))?;

    let salt: [u8; SALT_SIZE] = salt_bytes
        .try_into()
        .map_err(|_| SyncError::CorruptEntry("bad salt length".to_string()))?;
    let nonce: [u8; NONCE_SIZE] = nonce_bytes
        .try_into()
        .map_err(|_| SyncError::CorruptEntry("bad nonce length".to_string()))?;

    Ok(EncryptedVaultKey {
        encrypted_vault_key,
        salt,
        nonce,
    })
}

fn decrypt_envelope(
    key: &VaultKey,
    envelope: &EncryptedLogEnvelope,
) -> SyncResult<(i64, CrdtLogEntry)> {
    let sequence = envelope
        .sequence
        .ok_or_else(|| SyncError::CorruptEntry("envelope without server sequence".to_string()))?;
    let ciphertext = BASE64
        .decode(&envelope.encrypted_data)
        .map_err(|e| SyncError::CorruptEntry(format!("bad data encoding: {e}")))?;
    let nonce = BASE64
        .decode(&envelope.nonce)
        .map_err(|e| SyncError::CorruptEntry(format!("bad nonce encoding: {e}")))?;

    let plaintext = decrypt_with_key(key, &nonce, &ciphertext)?;
    let entry: CrdtLogEntry = serde_json::from_slice(&plaintext)?;
    Ok((sequence, entry))
}
