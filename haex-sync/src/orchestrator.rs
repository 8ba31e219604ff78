//! Per-vault sync lifecycle coordination.
//!
//! The orchestrator drives push/pull cycles against every configured
//! backend, owns the per-backend state machine, and reacts to realtime
//! change notifications. At most one cycle runs per backend at a time;
//! a cycle that finds the backend busy reports `SkippedBusy` instead of
//! queueing behind the one in flight.

use crate::config::SyncConfig;
use crate::engine::SyncEngine;
use crate::error::{SyncError, SyncResult};
use crate::realtime::{ChangeNotification, RealtimeChannel};
use crate::types::{
    BackendPushResult, BackendState, BackendStatusReport, LocalWriteReport, PullOutcome,
    PullSummary, PushOutcome,
};
use chrono::Utc;
use futures::future::join_all;
use haex_storage::{BackendRegistry, LogStore, SyncStatusStore};
use haex_types::{BackendId, SyncStatus, VaultId};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex as StdMutex};
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// Coordinates sync for one vault across all of its backends.
///
/// Cheap to clone; clones share all orchestration state.
#[derive(Clone)]
pub struct SyncOrchestrator {
    inner: Arc<Inner>,
}

struct Inner {
    vault_id: VaultId,
    engine: Arc<SyncEngine>,
    registry: BackendRegistry,
    log_store: LogStore,
    status_store: SyncStatusStore,
    realtime: Arc<dyn RealtimeChannel>,
    config: SyncConfig,
    states: RwLock<HashMap<BackendId, BackendState>>,
    /// One busy flag per backend, shared by push and pull cycles.
    cycle_flags: StdMutex<HashMap<BackendId, Arc<AtomicBool>>>,
    /// Set while a local write fans out; realtime notifications arriving
    /// in this window are dropped to avoid pulling our own echo.
    local_write_in_flight: AtomicBool,
    listeners: Mutex<HashMap<BackendId, JoinHandle<()>>>,
}

impl SyncOrchestrator {
    pub fn new(
        vault_id: VaultId,
        engine: Arc<SyncEngine>,
        registry: BackendRegistry,
        log_store: LogStore,
        status_store: SyncStatusStore,
        realtime: Arc<dyn RealtimeChannel>,
        config: SyncConfig,
    ) -> Self {
        Self {
            inner: Arc::new(Inner {
                vault_id,
                engine,
                registry,
                log_store,
                status_store,
                realtime,
                config,
                states: RwLock::new(HashMap::new()),
                cycle_flags: StdMutex::new(HashMap::new()),
                local_write_in_flight: AtomicBool::new(false),
                listeners: Mutex::new(HashMap::new()),
            }),
        }
    }

    pub fn vault_id(&self) -> VaultId {
        self.inner.vault_id
    }

    pub fn engine(&self) -> &Arc<SyncEngine> {
        &self.inner.engine
    }

    /// Brings a configured backend online: registers its client, runs a
    /// full catch-up pull, and subscribes to its realtime feed.
    ///
    /// A failed init leaves the backend in `Error` with no subscription;
    /// calling this again retries from the top.
    pub async fn init_backend(&self, backend_id: &BackendId) -> SyncResult<()> {
        let backend = {
            let registry = self.inner.registry.clone();
            let id = *backend_id;
            spawn_blocking(move || registry.get(&id)).await??
        }
        .ok_or_else(|| SyncError::Configuration(format!("unknown backend {backend_id}")))?;

        if !backend.enabled {
            return Err(SyncError::Configuration(format!(
                "backend {} is disabled",
                backend.name
            )));
        }

        self.inner.engine.register_backend(&backend).await;
        self.set_state(backend_id, BackendState::Initializing).await;
        info!(backend = %backend.name, vault = %self.inner.vault_id, "initializing sync backend");

        if let Err(e) = self.pull_from_backend(backend_id).await {
            self.set_state(backend_id, BackendState::Error).await;
            return Err(e);
        }

        let receiver = match self
            .inner
            .realtime
            .subscribe(&backend, &self.inner.vault_id)
            .await
        {
            Ok(rx) => rx,
            Err(e) => {
                self.set_state(backend_id, BackendState::Error).await;
                self.record_error(backend_id, &e).await;
                return Err(e);
            }
        };

        let listener = self.spawn_listener(*backend_id, receiver);
        if let Some(old) = self.inner.listeners.lock().await.insert(*backend_id, listener) {
            old.abort();
        }

        self.set_state(backend_id, BackendState::Idle).await;
        info!(backend = %backend.name, vault = %self.inner.vault_id, "backend online");
        Ok(())
    }

    /// Pushes all local entries newer than the push watermark.
    ///
    /// The batch is all-or-nothing: the watermark only advances after the
    /// backend accepted the whole batch, so a failed push retries
    /// everything on the next cycle.
    pub async fn push_to_backend(&self, backend_id: &BackendId) -> SyncResult<PushOutcome> {
        self.ensure_initialized(backend_id).await?;

        let Some(_busy) = CycleGuard::try_acquire(self.cycle_flag(backend_id)) else {
            debug!(backend = %backend_id, "push skipped, cycle already in flight");
            return Ok(PushOutcome::SkippedBusy);
        };
        self.set_state(backend_id, BackendState::Syncing).await;

        let status = self.load_status(backend_id).await?;
        let entries = {
            let store = self.inner.log_store.clone();
            let after = status.last_push_hlc_timestamp.clone();
            spawn_blocking(move || store.entries_after(after.as_ref())).await??
        };

        let Some(last) = entries.last() else {
            self.set_state(backend_id, BackendState::Idle).await;
            return Ok(PushOutcome::NoChanges);
        };
        let watermark = last.haex_timestamp.clone();
        let count = entries.len();

        if let Err(e) = self
            .inner
            .engine
            .push_logs(backend_id, &self.inner.vault_id, &entries)
            .await
        {
            self.set_state(backend_id, BackendState::Error).await;
            self.record_error(backend_id, &e).await;
            return Err(e);
        }

        {
            let store = self.inner.status_store.clone();
            let vault = self.inner.vault_id;
            let backend = *backend_id;
            let mark = watermark.clone();
            spawn_blocking(move || store.record_push(&vault, &backend, &mark, Utc::now())).await??;
        }

        self.set_state(backend_id, BackendState::Idle).await;
        debug!(backend = %backend_id, count, watermark = %watermark, "push complete");
        Ok(PushOutcome::Pushed { count, watermark })
    }

    /// Pulls pages from the backend's cursor until the server reports no
    /// more, applying each page idempotently.
    pub async fn pull_from_backend(&self, backend_id: &BackendId) -> SyncResult<PullOutcome> {
        self.ensure_initialized(backend_id).await?;

        let Some(_busy) = CycleGuard::try_acquire(self.cycle_flag(backend_id)) else {
            debug!(backend = %backend_id, "pull skipped, cycle already in flight");
            return Ok(PullOutcome::SkippedBusy);
        };
        self.set_state(backend_id, BackendState::Syncing).await;

        let status = self.load_status(backend_id).await?;
        let mut cursor = status.last_pull_sequence;
        let mut summary = PullSummary {
            cursor,
            ..Default::default()
        };

        loop {
            let previous_cursor = cursor;
            let page = match self
                .inner
                .engine
                .pull_logs(
                    backend_id,
                    &self.inner.vault_id,
                    cursor,
                    self.inner.config.pull_limit,
                )
                .await
            {
                Ok(page) => page,
                Err(e) => {
                    self.set_state(backend_id, BackendState::Error).await;
                    self.record_error(backend_id, &e).await;
                    return Err(e);
                }
            };

            summary.fetched += page.entries.len() + page.dropped;
            summary.dropped += page.dropped;

            if !page.entries.is_empty() {
                let entries: Vec<_> = page.entries.into_iter().map(|(_, entry)| entry).collect();
                let store = self.inner.log_store.clone();
                summary.applied +=
                    spawn_blocking(move || store.insert_all_if_absent(&entries)).await??;
            }

            if let Some(sequence) = page.max_sequence {
                let store = self.inner.status_store.clone();
                let vault = self.inner.vault_id;
                let backend = *backend_id;
                spawn_blocking(move || store.record_pull(&vault, &backend, sequence, Utc::now()))
                    .await??;
                cursor = Some(sequence);
                summary.cursor = cursor;
            }

            if !page.has_more {
                break;
            }
            // A page that claims more data but moved the cursor nowhere
            // would repeat forever; end the cycle instead.
            if cursor == previous_cursor {
                warn!(
                    backend = %backend_id,
                    cursor = ?cursor,
                    "backend reports more data but returned no cursor progress, ending pull"
                );
                break;
            }
        }

        self.set_state(backend_id, BackendState::Idle).await;
        debug!(
            backend = %backend_id,
            fetched = summary.fetched,
            applied = summary.applied,
            dropped = summary.dropped,
            "pull complete"
        );
        Ok(PullOutcome::Completed(summary))
    }

    /// Fans a push out to every enabled backend after a local write.
    ///
    /// Backends fail independently; one unreachable backend never blocks
    /// the others, and failures land in the report rather than bubbling.
    pub async fn on_local_write(&self) -> SyncResult<LocalWriteReport> {
        let _writing = WriteFlagGuard::engage(self.inner.clone());

        let backends = {
            let registry = self.inner.registry.clone();
            spawn_blocking(move || registry.list_enabled()).await??
        };

        let mut handles = Vec::with_capacity(backends.len());
        for backend in backends {
            let orchestrator = self.clone();
            handles.push(tokio::spawn(async move {
                let outcome = orchestrator.push_to_backend(&backend.id).await;
                (backend.id, outcome)
            }));
        }

        let mut report = LocalWriteReport::default();
        for joined in join_all(handles).await {
            match joined {
                Ok((backend_id, Ok(outcome))) => {
                    report.results.push(BackendPushResult {
                        backend_id,
                        outcome: Ok(outcome),
                    });
                }
                Ok((backend_id, Err(e))) => {
                    warn!(backend = %backend_id, "local-write push failed: {e}");
                    report.results.push(BackendPushResult {
                        backend_id,
                        outcome: Err(e.to_string()),
                    });
                }
                Err(e) => warn!("local-write push task failed to join: {e}"),
            }
        }
        Ok(report)
    }

    /// Tears down every subscription and marks all backends terminal.
    ///
    /// Listener tasks are aborted, which may cancel a realtime-triggered
    /// pull mid-cycle; per-page cursor persistence keeps that safe.
    /// Caller-initiated cycles already in flight run to completion; new
    /// cycles against a stopped orchestrator fail with a configuration
    /// error.
    pub async fn stop_sync(&self) {
        let listeners: Vec<_> = self.inner.listeners.lock().await.drain().collect();
        for (backend_id, handle) in listeners {
            handle.abort();
            if let Err(e) = self
                .inner
                .realtime
                .unsubscribe(&backend_id, &self.inner.vault_id)
                .await
            {
                warn!(backend = %backend_id, "unsubscribe failed: {e}");
            }
            self.inner.engine.remove_backend(&backend_id).await;
        }

        let mut states = self.inner.states.write().await;
        for state in states.values_mut() {
            *state = BackendState::Unsubscribed;
        }
        drop(states);

        self.inner.cycle_flags.lock().unwrap().clear();
        info!(vault = %self.inner.vault_id, "sync stopped");
    }

    /// Snapshot of every configured backend: lifecycle state plus the
    /// persisted watermarks and last error.
    pub async fn status(&self) -> SyncResult<Vec<BackendStatusReport>> {
        let backends = {
            let registry = self.inner.registry.clone();
            spawn_blocking(move || registry.list()).await??
        };

        let states = self.inner.states.read().await;
        let mut reports = Vec::with_capacity(backends.len());
        for backend in backends {
            let backend_id = backend.id;
            let state = states
                .get(&backend_id)
                .copied()
                .unwrap_or(BackendState::Uninitialized);
            let status = {
                let store = self.inner.status_store.clone();
                let vault = self.inner.vault_id;
                spawn_blocking(move || store.get(&vault, &backend_id)).await??
            };
            reports.push(BackendStatusReport {
                backend_id,
                state,
                status,
            });
        }
        Ok(reports)
    }

    /// Current lifecycle state for one backend.
    pub async fn backend_state(&self, backend_id: &BackendId) -> BackendState {
        self.inner
            .states
            .read()
            .await
            .get(backend_id)
            .copied()
            .unwrap_or(BackendState::Uninitialized)
    }

    fn spawn_listener(
        &self,
        backend_id: BackendId,
        mut receiver: tokio::sync::mpsc::Receiver<ChangeNotification>,
    ) -> JoinHandle<()> {
        let orchestrator = self.clone();
        tokio::spawn(async move {
            while let Some(notification) = receiver.recv().await {
                orchestrator
                    .handle_notification(&backend_id, notification)
                    .await;
            }
            debug!(backend = %backend_id, "realtime channel closed");
        })
    }

    async fn handle_notification(&self, backend_id: &BackendId, notification: ChangeNotification) {
        if self.inner.local_write_in_flight.load(Ordering::Acquire) {
            debug!(
                backend = %backend_id,
                "dropping realtime notification during local write"
            );
            return;
        }
        if notification.vault_id != self.inner.vault_id {
            debug!(
                backend = %backend_id,
                vault = %notification.vault_id,
                "ignoring notification for foreign vault"
            );
            return;
        }

        match self.pull_from_backend(backend_id).await {
            Ok(PullOutcome::Completed(summary)) => {
                debug!(
                    backend = %backend_id,
                    applied = summary.applied,
                    "realtime-triggered pull complete"
                );
            }
            Ok(PullOutcome::SkippedBusy) => {
                debug!(backend = %backend_id, "realtime-triggered pull skipped, busy");
            }
            Err(e) => {
                warn!(backend = %backend_id, "realtime-triggered pull failed: {e}");
            }
        }
    }

    async fn ensure_initialized(&self, backend_id: &BackendId) -> SyncResult<()> {
        match self.backend_state(backend_id).await {
            BackendState::Uninitialized => Err(SyncError::Configuration(format!(
                "backend {backend_id} not initialized"
            ))),
            BackendState::Unsubscribed => Err(SyncError::Configuration(format!(
                "backend {backend_id} is unsubscribed"
            ))),
            _ => Ok(()),
        }
    }

    async fn set_state(&self, backend_id: &BackendId, state: BackendState) {
        self.inner.states.write().await.insert(*backend_id, state);
    }

    fn cycle_flag(&self, backend_id: &BackendId) -> Arc<AtomicBool> {
        let mut flags = self.inner.cycle_flags.lock().unwrap();
        flags
            .entry(*backend_id)
            .or_insert_with(|| Arc::new(AtomicBool::new(false)))
            .clone()
    }

    async fn load_status(&self, backend_id: &BackendId) -> SyncResult<SyncStatus> {
        let store = self.inner.status_store.clone();
        let vault = self.inner.vault_id;
        let backend = *backend_id;
        let status = spawn_blocking(move || store.get(&vault, &backend)).await??;
        Ok(status.unwrap_or_else(|| SyncStatus::empty(vault, backend)))
    }

    /// Persists the error message for transport failures only; auth and
    /// configuration problems are the caller's to resolve, not backend
    /// health to report.
    async fn record_error(&self, backend_id: &BackendId, error: &SyncError) {
        if !error.is_transport() {
            return;
        }
        let store = self.inner.status_store.clone();
        let vault = self.inner.vault_id;
        let backend = *backend_id;
        let message = error.to_string();
        let result = spawn_blocking(move || store.record_error(&vault, &backend, &message)).await;
        match result {
            Ok(Err(e)) => warn!(backend = %backend_id, "failed to record sync error: {e}"),
            Err(e) => warn!(backend = %backend_id, "failed to record sync error: {e}"),
            Ok(Ok(())) => {}
        }
    }
}

/// Clears the per-backend busy flag when the cycle ends, error paths
/// included.
struct CycleGuard(Arc<AtomicBool>);

impl CycleGuard {
    fn try_acquire(flag: Arc<AtomicBool>) -> Option<Self> {
        flag.compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_ok()
            .then(|| Self(flag))
    }
}

impl Drop for CycleGuard {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Clears the local-write flag when the fan-out ends.
struct WriteFlagGuard(Arc<Inner>);

impl WriteFlagGuard {
    fn engage(inner: Arc<Inner>) -> Self {
        inner.local_write_in_flight.store(true, Ordering::Release);
        Self(inner)
    }
}

impl Drop for WriteFlagGuard {
    fn drop(&mut self) {
        self.0.local_write_in_flight.store(false, Ordering::Release);
    }
}

async fn spawn_blocking<T, F>(f: F) -> SyncResult<T>
where
    T: Send + 'static,
    F: FnOnce() -> T + Send + 'static,
{
    tokio::task::spawn_blocking(f)
        .await
        .map_err(|e| SyncError::TaskJoin(e.to_string()))
}
