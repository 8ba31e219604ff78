//! SyncEngine integration tests against a stubbed backend.

mod support;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use haex_crypto::{decrypt_with_key, encrypt_for_storage, VaultKey, NONCE_SIZE, SALT_SIZE};
use haex_sync::{SharedTokenProvider, StaticTokenProvider, SyncConfig, SyncEngine, SyncError};
use haex_types::{CrdtLogEntry, VaultId};
use pretty_assertions::assert_eq;
use serde_json::json;
use std::collections::HashSet;
use std::sync::Arc;
use support::{backend_for, entry, envelope, mock_pull, mock_push_ok};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn engine() -> SyncEngine {
    SyncEngine::new(
        Arc::new(StaticTokenProvider::new("test-token")),
        SyncConfig::default(),
    )
}

#[tokio::test]
async fn store_vault_key_uploads_record_and_caches_key() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync/vault-key"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(&server)
        .await;

    let engine = engine();
    let backend = backend_for(&server, "primary");
    let vault_id = VaultId::new();
    engine.register_backend(&backend).await;

    engine
        .store_vault_key(&backend.id, &vault_id, "correct horse")
        .await
        .unwrap();
    assert!(engine.key_cache().contains(&vault_id).await);

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let salt = BASE64.decode(body["salt"].as_str().unwrap()).unwrap();
    let nonce = BASE64.decode(body["nonce"].as_str().unwrap()).unwrap();
    let ciphertext = BASE64
        .decode(body["encryptedVaultKey"].as_str().unwrap())
        .unwrap();
    assert_eq!(salt.len(), SALT_SIZE);
    assert_eq!(nonce.len(), NONCE_SIZE);
    // 32-byte key plus 16-byte GCM tag
    assert_eq!(ciphertext.len(), 48);
}

#[tokio::test]
async fn failed_upload_never_pollutes_the_cache() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/sync/vault-key"))
        .respond_with(ResponseTemplate::new(500))
        .mount(&server)
        .await;

    let engine = engine();
    let backend = backend_for(&server, "primary");
    let vault_id = VaultId::new();
    engine.register_backend(&backend).await;

    let err = engine
        .store_vault_key(&backend.id, &vault_id, "pw")
        .await
        .unwrap_err();
    assert!(err.is_transport());
    assert!(engine.key_cache().is_empty().await);
}

#[tokio::test]
async fn vault_key_round_trips_through_backend() {
    let server = MockServer::start().await;
    let engine = engine();
    let backend = backend_for(&server, "primary");
    let vault_id = VaultId::new();
    engine.register_backend(&backend).await;

    let key = VaultKey::generate();
    let encrypted = encrypt_for_storage(&key, "correct horse").unwrap();
    Mock::given(method("GET"))
        .and(path(format!("/sync/vault-key/{vault_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vaultId": vault_id,
            "encryptedVaultKey": BASE64.encode(&encrypted.encrypted_vault_key),
            "salt": BASE64.encode(encrypted.salt),
            "nonce": BASE64.encode(encrypted.nonce),
        })))
        .mount(&server)
        .await;

    let fetched = engine
        .get_vault_key(&backend.id, &vault_id, "correct horse")
        .await
        .unwrap();
    assert_eq!(fetched.as_bytes(), key.as_bytes());
    assert!(engine.key_cache().contains(&vault_id).await);

    // Second lookup is served from cache: no further GET hits the server.
    let before = server.received_requests().await.unwrap().len();
    engine
        .get_vault_key(&backend.id, &vault_id, "correct horse")
        .await
        .unwrap();
    assert_eq!(server.received_requests().await.unwrap().len(), before);
}

#[tokio::test]
async fn wrong_password_surfaces_as_authentication_failure() {
    let server = MockServer::start().await;
    let engine = engine();
    let backend = backend_for(&server, "primary");
    let vault_id = VaultId::new();
    engine.register_backend(&backend).await;

    let key = VaultKey::generate();
    let encrypted = encrypt_for_storage(&key, "correct horse").unwrap();
    Mock::given(method("GET"))
        .and(path(format!("/sync/vault-key/{vault_id}")))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "vaultId": vault_id,
            "encryptedVaultKey": BASE64.encode(&encrypted.encrypted_vault_key),
            "salt": BASE64.encode(encrypted.salt),
            "nonce": BASE64.encode(encrypted.nonce),
        })))
        .mount(&server)
        .await;

    let err = engine
        .get_vault_key(&backend.id, &vault_id, "battery staple")
        .await
        .unwrap_err();
    assert!(err.is_authentication());
    assert!(!engine.key_cache().contains(&vault_id).await);
}

#[tokio::test]
async fn missing_vault_key_is_not_found() {
    let server = MockServer::start().await;
    let engine = engine();
    let backend = backend_for(&server, "primary");
    engine.register_backend(&backend).await;

    let err = engine
        .get_vault_key(&backend.id, &VaultId::new(), "pw")
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::NotFound(_)));
}

#[tokio::test]
async fn missing_token_is_unauthenticated() {
    let server = MockServer::start().await;
    let engine = SyncEngine::new(
        Arc::new(SharedTokenProvider::new()),
        SyncConfig::default(),
    );
    let backend = backend_for(&server, "primary");
    engine.register_backend(&backend).await;

    let err = engine
        .get_vault_key(&backend.id, &VaultId::new(), "pw")
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Unauthenticated));
    assert!(err.is_authentication());
}

#[tokio::test]
async fn push_encrypts_each_entry_with_its_own_nonce_in_hlc_order() {
    let server = MockServer::start().await;
    mock_push_ok(&server).await;

    let engine = engine();
    let backend = backend_for(&server, "primary");
    let vault_id = VaultId::new();
    engine.register_backend(&backend).await;

    let key = VaultKey::generate();
    engine.key_cache().insert(vault_id, key.clone()).await;

    // Deliberately out of order.
    let entries = vec![
        entry("laptop", 3_000, 0),
        entry("laptop", 1_000, 0),
        entry("phone", 2_000, 5),
    ];
    engine
        .push_logs(&backend.id, &vault_id, &entries)
        .await
        .unwrap();

    let requests = server.received_requests().await.unwrap();
    let body: serde_json::Value = serde_json::from_slice(&requests[0].body).unwrap();
    let logs = body["logs"].as_array().unwrap();
    assert_eq!(logs.len(), 3);

    let timestamps: Vec<&str> = logs
        .iter()
        .map(|l| l["haexTimestamp"].as_str().unwrap())
        .collect();
    let mut sorted = timestamps.clone();
    sorted.sort();
    assert_eq!(timestamps, sorted);

    let nonces: HashSet<&str> = logs.iter().map(|l| l["nonce"].as_str().unwrap()).collect();
    assert_eq!(nonces.len(), 3);

    // Sequence is backend-assigned and must be absent on push.
    assert!(logs.iter().all(|l| l.get("sequence").is_none()));

    // Every envelope decrypts back to one of the pushed entries.
    for log in logs {
        let nonce = BASE64.decode(log["nonce"].as_str().unwrap()).unwrap();
        let ciphertext = BASE64.decode(log["encryptedData"].as_str().unwrap()).unwrap();
        let plaintext = decrypt_with_key(&key, &nonce, &ciphertext).unwrap();
        let decrypted: CrdtLogEntry = serde_json::from_slice(&plaintext).unwrap();
        assert!(entries.contains(&decrypted));
    }
}

#[tokio::test]
async fn push_without_cached_key_fails_closed() {
    let server = MockServer::start().await;
    mock_push_ok(&server).await;

    let engine = engine();
    let backend = backend_for(&server, "primary");
    let vault_id = VaultId::new();
    engine.register_backend(&backend).await;

    let err = engine
        .push_logs(&backend.id, &vault_id, &[entry("laptop", 1, 0)])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::KeyUnavailable(v) if v == vault_id));
    // Nothing left the device.
    assert!(server.received_requests().await.unwrap().is_empty());
}

#[tokio::test]
async fn pull_drops_undecryptable_envelopes_without_blocking_the_page() {
    let server = MockServer::start().await;
    let engine = engine();
    let backend = backend_for(&server, "primary");
    let vault_id = VaultId::new();
    engine.register_backend(&backend).await;

    let key = VaultKey::generate();
    engine.key_cache().insert(vault_id, key.clone()).await;

    let good_a = entry("phone", 1_000, 0);
    let good_b = entry("phone", 3_000, 0);
    let mut corrupt = envelope(&key, vault_id, &entry("phone", 2_000, 0), 2);
    corrupt.encrypted_data = BASE64.encode(b"not ciphertext at all");

    let logs = vec![
        envelope(&key, vault_id, &good_a, 1),
        corrupt,
        envelope(&key, vault_id, &good_b, 3),
    ];
    mock_pull(&server, &logs, false).await;

    let page = engine
        .pull_logs(&backend.id, &vault_id, None, 500)
        .await
        .unwrap();
    assert_eq!(page.entries.len(), 2);
    assert_eq!(page.dropped, 1);
    assert!(!page.has_more);
    // The cursor still moves past the poison envelope.
    assert_eq!(page.max_sequence, Some(3));

    let pulled: Vec<CrdtLogEntry> = page.entries.into_iter().map(|(_, e)| e).collect();
    assert_eq!(pulled, vec![good_a, good_b]);
}

#[tokio::test]
async fn health_check_reports_reachability_without_erroring() {
    let healthy = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "status": "ok" })))
        .mount(&healthy)
        .await;
    let unhealthy = MockServer::start().await;

    let engine = engine();
    let up = backend_for(&healthy, "up");
    let down = backend_for(&unhealthy, "down");
    engine.register_backend(&up).await;
    engine.register_backend(&down).await;

    assert!(engine.health_check(&up.id).await.unwrap());
    assert!(!engine.health_check(&down.id).await.unwrap());
}

#[tokio::test]
async fn unregistered_backend_is_a_configuration_error() {
    let engine = engine();
    let err = engine
        .push_logs(&haex_types::BackendId::new(), &VaultId::new(), &[])
        .await
        .unwrap_err();
    assert!(matches!(err, SyncError::Configuration(_)));
}
