//! Upload telemetry
//!
//! Every observable step of an upload run is reported as an [`UploadEvent`]
//! to an injected [`EventSink`] and mirrored to `tracing`. Events carry no
//! control-flow meaning; they exist for logs, metrics and tests.

use parking_lot::Mutex;
use uuid::Uuid;

use crate::network::{ContentId, SessionId};

/// One observable step of an upload run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum UploadEvent {
    LockRequested { run: Uuid },
    LockAcquired { run: Uuid },
    LockReleased { run: Uuid },

    ProviderSelected { run: Uuid, provider: String },
    /// `session_id` is unknown until a newly created session goes live
    SessionResolved { run: Uuid, session_id: Option<SessionId>, is_new: bool },
    CreationSubmitted { run: Uuid, tx_hash: String },
    CreationProgress { run: Uuid, live: bool },

    PayloadAccepted { run: Uuid, content_id: ContentId },
    CommitSubmitted { run: Uuid, tx_hash: String },
    CommitConfirmed { run: Uuid },

    ResultDelivered { run: Uuid },
    EarlyFailure { run: Uuid, error: String },
    LateFailure { run: Uuid, error: String },
}

impl UploadEvent {
    /// Run this event belongs to
    pub fn run(&self) -> Uuid {
        match self {
            Self::LockRequested { run }
            | Self::LockAcquired { run }
            | Self::LockReleased { run }
            | Self::ProviderSelected { run, .. }
            | Self::SessionResolved { run, .. }
            | Self::CreationSubmitted { run, .. }
            | Self::CreationProgress { run, .. }
            | Self::PayloadAccepted { run, .. }
            | Self::CommitSubmitted { run, .. }
            | Self::CommitConfirmed { run }
            | Self::ResultDelivered { run }
            | Self::EarlyFailure { run, .. }
            | Self::LateFailure { run, .. } => *run,
        }
    }

    fn trace(&self) {
        match self {
            Self::LockRequested { run } => tracing::trace!(run = %run, "Upload lock requested"),
            Self::LockAcquired { run } => tracing::debug!(run = %run, "Upload lock acquired"),
            Self::LockReleased { run } => tracing::debug!(run = %run, "Upload lock released"),
            Self::ProviderSelected { run, provider } => {
                tracing::debug!(run = %run, provider = %provider, "Provider selected")
            }
            Self::SessionResolved { run, session_id, is_new } => tracing::info!(
                run = %run,
                session_id = ?session_id,
                is_new = is_new,
                "Session resolved"
            ),
            Self::CreationSubmitted { run, tx_hash } => {
                tracing::info!(run = %run, tx_hash = %tx_hash, "Session creation submitted")
            }
            Self::CreationProgress { run, live } => {
                tracing::debug!(run = %run, live = live, "Session creation progress")
            }
            Self::PayloadAccepted { run, content_id } => {
                tracing::debug!(run = %run, content_id = %content_id, "Payload accepted by provider")
            }
            Self::CommitSubmitted { run, tx_hash } => {
                tracing::debug!(run = %run, tx_hash = %tx_hash, "Commitment submitted")
            }
            Self::CommitConfirmed { run } => tracing::info!(run = %run, "Commitment confirmed"),
            Self::ResultDelivered { run } => tracing::debug!(run = %run, "Upload result delivered"),
            Self::EarlyFailure { run, error } => {
                tracing::warn!(run = %run, error = %error, "Upload failed before result")
            }
            Self::LateFailure { run, error } => tracing::error!(
                run = %run,
                error = %error,
                "Upload failed after result was delivered"
            ),
        }
    }
}

/// Destination for upload events
pub trait EventSink: Send + Sync {
    fn record(&self, event: UploadEvent);
}

/// Mirror `event` to tracing, then hand it to `sink`
pub(crate) fn emit(sink: &dyn EventSink, event: UploadEvent) {
    event.trace();
    sink.record(event);
}

/// Sink that drops every event (tracing output still happens)
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSink;

impl EventSink for NoopSink {
    fn record(&self, _event: UploadEvent) {}
}

/// Sink that keeps every event in arrival order
#[derive(Debug, Default)]
pub struct EventLog {
    events: Mutex<Vec<UploadEvent>>,
}

impl EventLog {
    pub fn new() -> Self {
        Self::default()
    }

    /// Copy of all events recorded so far
    pub fn snapshot(&self) -> Vec<UploadEvent> {
        self.events.lock().clone()
    }

    /// Events recorded for one run
    pub fn for_run(&self, run: Uuid) -> Vec<UploadEvent> {
        self.events
            .lock()
            .iter()
            .filter(|e| e.run() == run)
            .cloned()
            .collect()
    }

    /// Number of recorded events matching `predicate`
    pub fn count(&self, predicate: impl Fn(&UploadEvent) -> bool) -> usize {
        self.events.lock().iter().filter(|e| predicate(e)).count()
    }
}

impl EventSink for EventLog {
    fn record(&self, event: UploadEvent) {
        self.events.lock().push(event);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_event_log_filters_by_run() {
        let log = EventLog::new();
        let a = Uuid::new_v4();
        let b = Uuid::new_v4();

        emit(&log, UploadEvent::LockRequested { run: a });
        emit(&log, UploadEvent::LockRequested { run: b });
        emit(&log, UploadEvent::LockAcquired { run: a });

        assert_eq!(log.snapshot().len(), 3);
        assert_eq!(
            log.for_run(a),
            vec![UploadEvent::LockRequested { run: a }, UploadEvent::LockAcquired { run: a }]
        );
        assert_eq!(log.count(|e| matches!(e, UploadEvent::LockRequested { .. })), 2);
    }
}
