//! Upload Tracker
//!
//! Keeps a status record per upload run so callers can poll for what
//! happened after their result was delivered:
//! - In-memory record storage behind an async lock
//! - Phase updates at every state transition of a run
//! - Periodic cleanup of old records

use std::collections::HashMap;
use std::sync::Arc;

use chrono::Utc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::types::{UploadPhase, UploadRecord};
use crate::network::{ContentId, SessionId};

// ============================================================================
// Tracker
// ============================================================================

/// Status records of upload runs
#[derive(Clone, Default)]
pub struct UploadTracker {
    inner: Arc<UploadTrackerInner>,
}

#[derive(Default)]
struct UploadTrackerInner {
    records: RwLock<HashMap<Uuid, UploadRecord>>,
}

impl UploadTracker {
    pub fn new() -> Self {
        Self::default()
    }

    // ========================================================================
    // Record Lifecycle
    // ========================================================================

    /// Start tracking a run
    pub async fn register(&self, id: Uuid, size: u64) -> UploadRecord {
        let record = UploadRecord::new(id, size);
        let mut records = self.inner.records.write().await;
        records.insert(id, record.clone());
        record
    }

    /// Move a run to `phase`
    pub async fn set_phase(&self, id: Uuid, phase: UploadPhase) {
        self.update(id, |record| record.phase = phase).await;
    }

    /// Record the session a run writes into
    pub async fn set_session(&self, id: Uuid, session_id: SessionId) {
        self.update(id, |record| {
            record.session_id = Some(session_id);
            record.phase = UploadPhase::SessionReady;
        })
        .await;
    }

    /// Record the accepted content identifier
    pub async fn set_accepted(&self, id: Uuid, content_id: ContentId) {
        self.update(id, |record| {
            record.content_id = Some(content_id);
            record.phase = UploadPhase::Accepted;
        })
        .await;
    }

    /// Record the commitment transaction
    pub async fn set_submitted(&self, id: Uuid, tx_hash: String) {
        self.update(id, |record| {
            record.commit_tx = Some(tx_hash);
            record.phase = UploadPhase::Submitted;
        })
        .await;
    }

    /// Record a terminal failure
    pub async fn set_failed(&self, id: Uuid, phase: UploadPhase, error: String) {
        self.update(id, |record| {
            record.phase = phase;
            record.error = Some(error);
        })
        .await;
    }

    async fn update(&self, id: Uuid, apply: impl FnOnce(&mut UploadRecord)) {
        let mut records = self.inner.records.write().await;
        match records.get_mut(&id) {
            Some(record) => {
                apply(record);
                record.updated_at = Utc::now();
            }
            None => tracing::debug!(upload_id = %id, "Update for untracked upload ignored"),
        }
    }

    // ========================================================================
    // Query Methods
    // ========================================================================

    /// Get a record by run ID
    pub async fn get(&self, id: Uuid) -> Option<UploadRecord> {
        let records = self.inner.records.read().await;
        records.get(&id).cloned()
    }

    /// Get a record by string ID
    pub async fn get_by_str(&self, id: &str) -> Option<UploadRecord> {
        let uuid = Uuid::parse_str(id).ok()?;
        self.get(uuid).await
    }

    /// Number of runs not yet in a terminal phase
    pub async fn in_flight_count(&self) -> usize {
        let records = self.inner.records.read().await;
        records.values().filter(|r| !r.phase.is_terminal()).count()
    }

    /// Runs that failed after their caller got a result
    pub async fn late_failures(&self) -> Vec<UploadRecord> {
        let records = self.inner.records.read().await;
        records
            .values()
            .filter(|r| r.phase == UploadPhase::FailedLate)
            .cloned()
            .collect()
    }

    pub async fn record_count(&self) -> usize {
        let records = self.inner.records.read().await;
        records.len()
    }

    // ========================================================================
    // Cleanup
    // ========================================================================

    /// Drop terminal records older than `hours`.
    ///
    /// Returns the number of records removed
    pub async fn cleanup_older_than(&self, hours: i64) -> usize {
        let cutoff = Utc::now() - chrono::Duration::hours(hours);
        let mut records = self.inner.records.write().await;
        let before = records.len();
        records.retain(|_, r| !(r.phase.is_terminal() && r.updated_at < cutoff));
        let count = before - records.len();

        if count > 0 {
            tracing::info!(count = count, "Cleaned up upload records");
        }

        count
    }

    /// Start background cleanup task
    pub fn start_cleanup_task(self, retention_hours: i64) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(std::time::Duration::from_secs(300)); // 5 minutes

            loop {
                interval.tick().await;
                self.cleanup_older_than(retention_hours).await;
            }
        })
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_register_and_progress() {
        let tracker = UploadTracker::new();
        let id = Uuid::new_v4();

        let record = tracker.register(id, 512).await;
        assert_eq!(record.phase, UploadPhase::Init);

        tracker.set_session(id, SessionId::new("9")).await;
        tracker.set_accepted(id, ContentId::new("bafkcid")).await;
        tracker.set_submitted(id, "0xabc".to_string()).await;

        let record = tracker.get(id).await.unwrap();
        assert_eq!(record.phase, UploadPhase::Submitted);
        assert_eq!(record.session_id, Some(SessionId::new("9")));
        assert_eq!(record.content_id, Some(ContentId::new("bafkcid")));
        assert_eq!(record.commit_tx.as_deref(), Some("0xabc"));
        assert!(record.result_delivered());
        assert_eq!(tracker.in_flight_count().await, 1);
    }

    #[tokio::test]
    async fn test_late_failures_are_queryable() {
        let tracker = UploadTracker::new();
        let id = Uuid::new_v4();
        tracker.register(id, 100).await;
        tracker
            .set_failed(id, UploadPhase::FailedLate, "commit reverted".to_string())
            .await;

        let failures = tracker.late_failures().await;
        assert_eq!(failures.len(), 1);
        assert_eq!(failures[0].error.as_deref(), Some("commit reverted"));
        assert_eq!(tracker.in_flight_count().await, 0);
    }

    #[tokio::test]
    async fn test_get_by_str() {
        let tracker = UploadTracker::new();
        let id = Uuid::new_v4();
        tracker.register(id, 1).await;

        assert!(tracker.get_by_str(&id.to_string()).await.is_some());
        assert!(tracker.get_by_str("not-a-uuid").await.is_none());
    }

    #[tokio::test]
    async fn test_cleanup_keeps_in_flight_records() {
        let tracker = UploadTracker::new();
        let done = Uuid::new_v4();
        let running = Uuid::new_v4();
        tracker.register(done, 1).await;
        tracker.register(running, 1).await;
        tracker.set_phase(done, UploadPhase::Confirmed).await;

        // Negative retention puts the cutoff in the future
        let removed = tracker.cleanup_older_than(-1).await;

        assert_eq!(removed, 1);
        assert!(tracker.get(done).await.is_none());
        assert!(tracker.get(running).await.is_some());
    }
}
