//! Shared fixtures for sync integration tests: log entries, encrypted
//! envelopes, and wiremock backend stubs.
#![allow(dead_code)]

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use haex_crypto::{encrypt_with_key, VaultKey};
use haex_types::{
    BackendId, CrdtLogEntry, EncryptedLogEnvelope, HlcTimestamp, OpType, SyncBackend, VaultId,
};
use serde_json::json;
use uuid::Uuid;
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

pub fn entry(device: &str, wall_ms: u64, counter: u32) -> CrdtLogEntry {
    CrdtLogEntry {
        id: Uuid::new_v4(),
        haex_timestamp: HlcTimestamp::new(wall_ms, counter, device),
        table_name: "passwords".into(),
        row_pks: json!({ "id": Uuid::new_v4().to_string() }),
        op_type: OpType::Update,
        column_name: Some("title".into()),
        new_value: Some(json!("updated")),
        old_value: None,
    }
}

pub fn envelope(
    key: &VaultKey,
    vault_id: VaultId,
    entry: &CrdtLogEntry,
    sequence: i64,
) -> EncryptedLogEnvelope {
    let plaintext = serde_json::to_vec(entry).unwrap();
    let (nonce, ciphertext) = encrypt_with_key(key, &plaintext).unwrap();
    EncryptedLogEnvelope {
        vault_id,
        encrypted_data: BASE64.encode(&ciphertext),
        nonce: BASE64.encode(nonce),
        haex_timestamp: entry.haex_timestamp.clone(),
        sequence: Some(sequence),
    }
}

pub fn backend_for(server: &MockServer, name: &str) -> SyncBackend {
    SyncBackend {
        id: BackendId::new(),
        name: name.into(),
        server_url: server.uri(),
        enabled: true,
        priority: 0,
    }
}

pub async fn mock_push_ok(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/sync/push"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({ "ok": true })))
        .mount(server)
        .await;
}

pub async fn mock_push_failing(server: &MockServer) {
    Mock::given(method("POST"))
        .and(path("/sync/push"))
        .respond_with(ResponseTemplate::new(500).set_body_string("backend exploded"))
        .mount(server)
        .await;
}

/// Mounts a pull page that is served exactly once. Mount pages in the
/// order the client should receive them.
pub async fn mock_pull_once(server: &MockServer, logs: &[EncryptedLogEnvelope], has_more: bool) {
    Mock::given(method("POST"))
        .and(path("/sync/pull"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "logs": logs, "hasMore": has_more })),
        )
        .up_to_n_times(1)
        .mount(server)
        .await;
}

/// Mounts a pull page served on every request.
pub async fn mock_pull(server: &MockServer, logs: &[EncryptedLogEnvelope], has_more: bool) {
    Mock::given(method("POST"))
        .and(path("/sync/pull"))
        .respond_with(
            ResponseTemplate::new(200).set_body_json(json!({ "logs": logs, "hasMore": has_more })),
        )
        .mount(server)
        .await;
}

pub async fn pull_request_count(server: &MockServer) -> usize {
    server
        .received_requests()
        .await
        .map(|requests| {
            requests
                .iter()
                .filter(|r| r.url.path() == "/sync/pull")
                .count()
        })
        .unwrap_or(0)
}
