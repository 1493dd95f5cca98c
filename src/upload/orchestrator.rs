//! Upload Orchestrator
//!
//! Runs one upload through lock → session → preflight → transfer and hands
//! the caller its result as soon as the provider submits the commitment.
//! The lock stays with the run until the commitment is confirmed or the run
//! fails, so uploads through one orchestrator never overlap.
//!
//! ```text
//! INIT → LOCK_HELD → SESSION_READY → PREFLIGHT_OK → TRANSFERRING
//!      → ACCEPTED → SUBMITTED (caller answered, lock held)
//!      → CONFIRMED | FAILED_EARLY | FAILED_LATE (lock released)
//! ```

use std::sync::Arc;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::sync::oneshot;
use tokio::task::JoinHandle;
use uuid::Uuid;

use super::lock::UploadLock;
use super::preflight::CapacityPreflight;
use super::session::SessionResolver;
use super::tracker::UploadTracker;
use super::transfer::TransferRun;
use super::types::{Confirmation, UploadHandle, UploadPhase, UploadRequest, UploadResult};
use crate::config::UploadConfig;
use crate::error::{Result, UploadError};
use crate::events::{emit, EventSink, UploadEvent};
use crate::network::{Session, StorageNetwork};

/// Pause between checks while a run holds the lock before its transfer
const DRAIN_POLL: Duration = Duration::from_millis(10);

// ============================================================================
// Orchestrator
// ============================================================================

/// Serializing, two-phase upload front end
#[derive(Clone)]
pub struct UploadOrchestrator {
    inner: Arc<OrchestratorInner>,
}

struct OrchestratorInner {
    network: Arc<dyn StorageNetwork>,
    lock: UploadLock,
    resolver: SessionResolver,
    preflight: CapacityPreflight,
    tracker: UploadTracker,
    events: Arc<dyn EventSink>,
    config: UploadConfig,
    /// Supervisors of runs that reached the transfer
    runs: Mutex<Vec<JoinHandle<()>>>,
}

impl UploadOrchestrator {
    /// Create an orchestrator around an explicitly supplied lock
    pub fn new(
        network: Arc<dyn StorageNetwork>,
        lock: UploadLock,
        events: Arc<dyn EventSink>,
        config: UploadConfig,
    ) -> Self {
        Self {
            inner: Arc::new(OrchestratorInner {
                resolver: SessionResolver::new(network.clone(), events.clone(), &config),
                preflight: CapacityPreflight::new(network.clone()),
                tracker: UploadTracker::new(),
                network,
                lock,
                events,
                config,
                runs: Mutex::new(Vec::new()),
            }),
        }
    }

    /// Upload `request`, completing once the commitment is submitted.
    ///
    /// A success here does not mean the commitment is confirmed; failures
    /// after this point only show up in the run's [`UploadRecord`](super::UploadRecord).
    pub async fn upload(&self, request: UploadRequest) -> Result<UploadResult> {
        Ok(self.submit(request).await?.result)
    }

    /// Like [`upload`](Self::upload), also returning the confirmation future
    pub async fn submit(&self, request: UploadRequest) -> Result<UploadHandle> {
        self.validate(&request)?;

        let run = Uuid::new_v4();
        let size = request.size();
        let tracker = &self.inner.tracker;
        tracker.register(run, size).await;
        let mut guard = RunGuard {
            run,
            tracker: tracker.clone(),
            events: self.inner.events.clone(),
            armed: true,
        };

        let lock = match self.inner.lock.acquire(run).await {
            Ok(lock) => lock,
            Err(err) => {
                guard.disarm();
                self.fail_early(run, &err).await;
                return Err(err);
            }
        };
        tracker.set_phase(run, UploadPhase::LockHeld).await;

        let session = match self.prepare(run, &request).await {
            Ok(session) => session,
            Err(err) => {
                lock.release();
                guard.disarm();
                self.fail_early(run, &err).await;
                return Err(err);
            }
        };

        tracing::info!(
            upload_id = %run,
            session_id = %session.id,
            size = size,
            "Starting transfer"
        );
        tracker.set_phase(run, UploadPhase::Transferring).await;

        let (caller_tx, caller_rx) = oneshot::channel();
        let (outcome_tx, outcome_rx) = oneshot::channel();
        let transfer = TransferRun::new(
            session,
            size,
            caller_tx,
            lock,
            tracker.clone(),
            self.inner.events.clone(),
        );
        let network = self.inner.network.clone();
        let payload = request.payload;

        let supervisor = tokio::spawn(async move {
            let outcome = transfer.supervise(network, payload).await;
            tracing::info!(upload_id = %run, outcome = ?outcome, "Upload run finished");
            let _ = outcome_tx.send(outcome);
        });
        self.track(supervisor);
        guard.disarm();

        match caller_rx.await {
            Ok(Ok(result)) => Ok(UploadHandle {
                result,
                confirmation: Confirmation::new(outcome_rx),
            }),
            Ok(Err(err)) => Err(err),
            Err(_) => Err(UploadError::Internal(
                "transfer supervisor ended without a result".to_string(),
            )),
        }
    }

    /// Steps 2 and 3: everything between taking the lock and moving bytes
    async fn prepare(&self, run: Uuid, request: &UploadRequest) -> Result<Session> {
        let size = request.size();

        let session = self
            .inner
            .resolver
            .resolve(run, request.session_id.as_ref(), size)
            .await?;
        self.inner.tracker.set_session(run, session.id.clone()).await;

        self.inner.preflight.ensure(&session, size).await?;
        self.inner.tracker.set_phase(run, UploadPhase::PreflightOk).await;

        Ok(session)
    }

    fn validate(&self, request: &UploadRequest) -> Result<()> {
        let size = request.size();
        let config = &self.inner.config;

        if size == 0 {
            return Err(UploadError::InvalidPayload("payload is empty".to_string()));
        }
        if size < config.min_payload_size {
            return Err(UploadError::InvalidPayload(format!(
                "payload of {} bytes is below the minimum of {}",
                size, config.min_payload_size
            )));
        }
        if size > config.max_payload_size {
            return Err(UploadError::InvalidPayload(format!(
                "payload of {} bytes exceeds the maximum of {}",
                size, config.max_payload_size
            )));
        }
        Ok(())
    }

    async fn fail_early(&self, run: Uuid, err: &UploadError) {
        emit(
            self.inner.events.as_ref(),
            UploadEvent::EarlyFailure {
                run,
                error: err.to_string(),
            },
        );
        self.inner
            .tracker
            .set_failed(run, UploadPhase::FailedEarly, err.to_string())
            .await;
    }

    fn track(&self, supervisor: JoinHandle<()>) {
        let mut runs = self.inner.runs.lock();
        runs.retain(|handle| !handle.is_finished());
        runs.push(supervisor);
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn tracker(&self) -> &UploadTracker {
        &self.inner.tracker
    }

    pub fn lock(&self) -> &UploadLock {
        &self.inner.lock
    }

    pub fn resolver(&self) -> &SessionResolver {
        &self.inner.resolver
    }

    /// Whether an upload currently holds the lock
    pub fn is_busy(&self) -> bool {
        self.inner.lock.is_held()
    }

    /// Stop admitting uploads; runs already holding the lock finish normally
    pub fn shutdown(&self) {
        tracing::info!("Upload orchestrator no longer accepting uploads");
        self.inner.lock.close();
    }

    /// Wait until every run holding or past the lock is terminal.
    ///
    /// Meant to follow [`shutdown`](Self::shutdown). Returns the number of
    /// transferring runs waited for.
    pub async fn drain(&self) -> usize {
        let mut drained = 0;
        loop {
            let pending = std::mem::take(&mut *self.inner.runs.lock());
            if pending.is_empty() {
                // A run still resolving its session holds the lock untracked
                if !self.inner.lock.is_held() {
                    return drained;
                }
                tokio::time::sleep(DRAIN_POLL).await;
                continue;
            }
            for handle in pending {
                if let Err(e) = handle.await {
                    tracing::error!(error = %e, "Upload supervisor did not finish cleanly");
                }
                drained += 1;
            }
        }
    }
}

// ============================================================================
// Run Guard
// ============================================================================

/// Marks a run `FailedEarly` when `submit` is left before the run reaches
/// the transfer without recording a failure itself: the caller dropped the
/// future, or resolution or preflight panicked.
struct RunGuard {
    run: Uuid,
    tracker: UploadTracker,
    events: Arc<dyn EventSink>,
    armed: bool,
}

impl RunGuard {
    fn disarm(&mut self) {
        self.armed = false;
    }
}

impl Drop for RunGuard {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        let reason = if std::thread::panicking() {
            "upload run aborted by a panic"
        } else {
            "upload cancelled before transfer"
        };
        emit(
            self.events.as_ref(),
            UploadEvent::EarlyFailure {
                run: self.run,
                error: reason.to_string(),
            },
        );

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!(upload_id = %self.run, "No runtime to record abandoned upload");
            return;
        };
        let tracker = self.tracker.clone();
        let run = self.run;
        runtime.spawn(async move {
            tracker
                .set_failed(run, UploadPhase::FailedEarly, reason.to_string())
                .await;
        });
    }
}

// ============================================================================
// Tests
// ============================================================================
