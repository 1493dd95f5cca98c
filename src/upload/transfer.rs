//! Transfer supervision
//!
//! One [`TransferRun`] owns everything a run needs after the transfer
//! starts: the held lock token, the single-use channel to the caller and the
//! milestones seen so far. It lives inside a spawned task and reaches a
//! terminal state no matter how the transfer ends.

use std::sync::Arc;

use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinError;
use uuid::Uuid;

use super::lock::LockToken;
use super::tracker::UploadTracker;
use super::types::{FinalOutcome, UploadPhase, UploadResult};
use crate::error::UploadError;
use crate::events::{emit, EventSink, UploadEvent};
use crate::network::{ContentId, MilestoneSink, NetworkError, Session, StorageNetwork};

/// Sender half of the caller's single delivery
pub(crate) type CallerSender = oneshot::Sender<Result<UploadResult, UploadError>>;

#[derive(Debug, Clone, PartialEq, Eq)]
enum Milestone {
    Accepted(ContentId),
    Submitted(String),
    Confirmed,
}

/// Forwards provider callbacks into the supervising task
struct ChannelSink {
    tx: mpsc::UnboundedSender<Milestone>,
}

impl ChannelSink {
    fn send(&self, milestone: Milestone) {
        // Receiver only goes away once the run is terminal
        let _ = self.tx.send(milestone);
    }
}

impl MilestoneSink for ChannelSink {
    fn accepted(&self, content_id: ContentId) {
        self.send(Milestone::Accepted(content_id));
    }

    fn submitted(&self, tx_hash: String) {
        self.send(Milestone::Submitted(tx_hash));
    }

    fn confirmed(&self) {
        self.send(Milestone::Confirmed);
    }
}

/// Run-scoped transfer state
pub(crate) struct TransferRun {
    run: Uuid,
    session: Session,
    size: u64,
    phase: UploadPhase,
    content_id: Option<ContentId>,
    caller: Option<CallerSender>,
    lock: Option<LockToken>,
    tracker: UploadTracker,
    events: Arc<dyn EventSink>,
}

impl TransferRun {
    pub(crate) fn new(
        session: Session,
        size: u64,
        caller: CallerSender,
        lock: LockToken,
        tracker: UploadTracker,
        events: Arc<dyn EventSink>,
    ) -> Self {
        Self {
            run: lock.run(),
            session,
            size,
            phase: UploadPhase::Transferring,
            content_id: None,
            caller: Some(caller),
            lock: Some(lock),
            tracker,
            events,
        }
    }

    /// Drive the transfer to a terminal state.
    ///
    /// The network call runs in its own task so a panic inside it is seen
    /// here as a failed transfer rather than tearing down the run.
    pub(crate) async fn supervise(
        mut self,
        network: Arc<dyn StorageNetwork>,
        payload: Vec<u8>,
    ) -> FinalOutcome {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let sink: Arc<dyn MilestoneSink> = Arc::new(ChannelSink { tx });
        let session = self.session.clone();
        let mut transfer = tokio::spawn(async move { network.transfer(session, payload, sink).await });

        let joined = loop {
            tokio::select! {
                biased;
                Some(milestone) = rx.recv() => self.on_milestone(milestone).await,
                joined = &mut transfer => break joined,
            }
        };

        // Milestones sent right before the transfer returned
        while let Ok(milestone) = rx.try_recv() {
            self.on_milestone(milestone).await;
        }

        self.finish(joined).await
    }

    async fn on_milestone(&mut self, milestone: Milestone) {
        match milestone {
            Milestone::Accepted(content_id) => {
                self.emit(UploadEvent::PayloadAccepted {
                    run: self.run,
                    content_id: content_id.clone(),
                });
                self.tracker.set_accepted(self.run, content_id.clone()).await;
                self.content_id = Some(content_id);
                self.phase = UploadPhase::Accepted;
            }
            Milestone::Submitted(tx_hash) => {
                self.emit(UploadEvent::CommitSubmitted {
                    run: self.run,
                    tx_hash: tx_hash.clone(),
                });
                self.tracker.set_submitted(self.run, tx_hash).await;
                self.phase = UploadPhase::Submitted;

                if self.content_id.is_some() {
                    self.deliver();
                } else {
                    tracing::warn!(run = %self.run, "Commitment submitted before payload was accepted");
                }
            }
            Milestone::Confirmed => {
                self.emit(UploadEvent::CommitConfirmed { run: self.run });
                self.confirm().await;
            }
        }
    }

    async fn finish(mut self, joined: Result<Result<(), NetworkError>, JoinError>) -> FinalOutcome {
        let failure = match joined {
            Ok(Ok(())) => None,
            Ok(Err(e)) => Some(UploadError::transfer(e)),
            Err(e) if e.is_panic() => Some(UploadError::Transfer("transfer task panicked".to_string())),
            Err(e) => Some(UploadError::Transfer(format!("transfer task aborted: {}", e))),
        };

        match failure {
            Some(err) if self.phase == UploadPhase::Confirmed => {
                tracing::warn!(
                    run = %self.run,
                    error = %err,
                    "Transfer reported an error after confirmation"
                );
                FinalOutcome::Confirmed
            }
            Some(err) => self.fail(err).await,
            None if self.caller.is_some() && self.content_id.is_none() => {
                self.fail(UploadError::Transfer(
                    "transfer finished without an accepted payload".to_string(),
                ))
                .await
            }
            None => {
                // A clean return is final even if "submitted" never arrived
                self.deliver();
                if self.phase != UploadPhase::Confirmed {
                    self.confirm().await;
                }
                FinalOutcome::Confirmed
            }
        }
    }

    /// Settle the caller's result; no-op after the first call
    fn deliver(&mut self) {
        let Some(content_id) = self.content_id.clone() else {
            return;
        };
        let Some(caller) = self.caller.take() else {
            return;
        };

        let result = UploadResult {
            content_id,
            size: self.size,
            session_id: self.session.id.clone(),
            upload_id: self.run,
        };
        if caller.send(Ok(result)).is_err() {
            tracing::debug!(run = %self.run, "Caller stopped waiting for upload result");
        }
        self.emit(UploadEvent::ResultDelivered { run: self.run });
    }

    async fn confirm(&mut self) {
        self.phase = UploadPhase::Confirmed;
        self.release_lock();
        self.tracker.set_phase(self.run, UploadPhase::Confirmed).await;
    }

    async fn fail(&mut self, err: UploadError) -> FinalOutcome {
        self.release_lock();
        let message = err.to_string();

        match self.caller.take() {
            Some(caller) => {
                self.phase = UploadPhase::FailedEarly;
                self.emit(UploadEvent::EarlyFailure {
                    run: self.run,
                    error: message.clone(),
                });
                self.tracker
                    .set_failed(self.run, UploadPhase::FailedEarly, message.clone())
                    .await;
                let _ = caller.send(Err(err));
                FinalOutcome::FailedEarly(message)
            }
            None => {
                // The caller's single delivery is spent; this record and
                // the log line are all that remains of the failure.
                self.phase = UploadPhase::FailedLate;
                self.emit(UploadEvent::LateFailure {
                    run: self.run,
                    error: message.clone(),
                });
                self.tracker
                    .set_failed(self.run, UploadPhase::FailedLate, message.clone())
                    .await;
                FinalOutcome::FailedLate(message)
            }
        }
    }

    fn release_lock(&mut self) {
        if let Some(lock) = self.lock.take() {
            lock.release();
        }
    }

    fn emit(&self, event: UploadEvent) {
        emit(self.events.as_ref(), event);
    }
}
