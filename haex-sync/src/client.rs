//! HTTP client for one sync backend.
//!
//! Thin authenticated transport over reqwest: attaches the opaque bearer
//! credential, maps HTTP status codes into the sync error taxonomy, and
//! speaks the five-endpoint backend surface. No retries at this layer.

use crate::auth::TokenProvider;
use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::types::{HealthResponse, PullRequest, PullResponse, PushRequest, VaultKeyRecord};
use haex_types::VaultId;
use reqwest::{Client, Response, StatusCode};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Authenticated HTTP transport for a single backend.
pub struct BackendClient {
    http: Client,
    server_url: String,
    tokens: Arc<dyn TokenProvider>,
}

impl BackendClient {
    pub fn new(server_url: impl Into<String>, tokens: Arc<dyn TokenProvider>, config: &SyncConfig) -> Self {
        let http = Client::builder()
            .timeout(Duration::from_secs(config.request_timeout_secs))
            .build()
            .expect("failed to build HTTP client");

        let mut server_url = server_url.into();
        while server_url.ends_with('/') {
            server_url.pop();
        }

        Self {
            http,
            server_url,
            tokens,
        }
    }

    pub fn server_url(&self) -> &str {
        &self.server_url
    }

    /// Unauthenticated health/discovery probe.
    pub async fn health(&self) -> SyncResult<HealthResponse> {
        let resp = self.http.get(&self.server_url).send().await?;
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// Stores the encrypted vault-key record.
    pub async fn store_vault_key(&self, record: &VaultKeyRecord) -> SyncResult<()> {
        self.auth_post("/sync/vault-key", record).await?;
        Ok(())
    }

    /// Fetches the encrypted vault-key record; `NotFound` if absent.
    pub async fn fetch_vault_key(&self, vault_id: &VaultId) -> SyncResult<VaultKeyRecord> {
        let token = self.token()?;
        let url = format!("{}/sync/vault-key/{vault_id}", self.server_url);
        let resp = self.http.get(&url).bearer_auth(&token).send().await?;

        if resp.status() == StatusCode::NOT_FOUND {
            return Err(SyncError::NotFound(format!(
                "no vault key stored for vault {vault_id}"
            )));
        }
        let resp = check_status(resp).await?;
        Ok(resp.json().await?)
    }

    /// Submits an encrypted log batch.
    pub async fn push(&self, request: &PushRequest) -> SyncResult<()> {
        debug!(
            vault = %request.vault_id,
            count = request.logs.len(),
            "pushing log batch to {}",
            self.server_url
        );
        self.auth_post("/sync/push", request).await?;
        Ok(())
    }

    /// Fetches one page of encrypted log envelopes.
    pub async fn pull(&self, request: &PullRequest) -> SyncResult<PullResponse> {
        let resp = self.auth_post("/sync/pull", request).await?;
        Ok(resp.json().await?)
    }

    async fn auth_post(&self, path: &str, body: &impl Serialize) -> SyncResult<Response> {
        let token = self.token()?;
        let url = format!("{}{path}", self.server_url);
        let resp = self
            .http
            .post(&url)
            .bearer_auth(&token)
            .json(body)
            .send()
            .await?;
        check_status(resp).await
    }

    fn token(&self) -> SyncResult<String> {
        self.tokens.bearer_token().ok_or(SyncError::Unauthenticated)
    }
}

/// Maps non-success statuses into the error taxonomy, keeping the backend's
/// message for visibility.
async fn check_status(resp: Response) -> SyncResult<Response> {
    let status = resp.status();
    if status.is_success() {
        return Ok(resp);
    }

    let body = resp.text().await.unwrap_or_default();
    let detail = if body.is_empty() {
        status.to_string()
    } else {
        format!("{status}: {body}")
    };

    if status == StatusCode::UNAUTHORIZED || status == StatusCode::FORBIDDEN {
        return Err(SyncError::Authentication(detail));
    }
    Err(SyncError::Transport(detail))
}
