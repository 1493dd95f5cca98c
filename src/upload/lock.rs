//! Upload Lock
//!
//! One-permit FIFO lock that serializes upload runs. Tokio's semaphore
//! queues waiters fairly, so runs are admitted in the order they asked.
//! Holding is represented by a [`LockToken`]; the permit goes back exactly
//! once, either through [`LockToken::release`] or when the token is dropped.

use std::sync::Arc;
use std::time::Instant;

use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use uuid::Uuid;

use crate::error::UploadError;
use crate::events::{emit, EventSink, UploadEvent};

/// Shared lock serializing all uploads of one orchestrator
#[derive(Clone)]
pub struct UploadLock {
    semaphore: Arc<Semaphore>,
    events: Arc<dyn EventSink>,
}

impl UploadLock {
    pub fn new(events: Arc<dyn EventSink>) -> Self {
        Self {
            semaphore: Arc::new(Semaphore::new(1)),
            events,
        }
    }

    /// Wait until `run` is the sole holder.
    ///
    /// Not reentrant: a run holding a token must not call this again.
    pub async fn acquire(&self, run: Uuid) -> Result<LockToken, UploadError> {
        emit(self.events.as_ref(), UploadEvent::LockRequested { run });

        let permit = self
            .semaphore
            .clone()
            .acquire_owned()
            .await
            .map_err(|_| UploadError::ShuttingDown)?;

        emit(self.events.as_ref(), UploadEvent::LockAcquired { run });

        Ok(LockToken {
            run,
            permit: Some(permit),
            events: self.events.clone(),
            acquired_at: Instant::now(),
        })
    }

    /// Whether some run currently holds the lock
    pub fn is_held(&self) -> bool {
        self.semaphore.available_permits() == 0
    }

    /// Refuse all future acquisitions. Waiters are woken with `ShuttingDown`;
    /// the current holder keeps its token until it releases.
    pub fn close(&self) {
        self.semaphore.close();
    }

    pub fn is_closed(&self) -> bool {
        self.semaphore.is_closed()
    }
}

/// Exclusive holding of the [`UploadLock`] by one run
pub struct LockToken {
    run: Uuid,
    permit: Option<OwnedSemaphorePermit>,
    events: Arc<dyn EventSink>,
    acquired_at: Instant,
}

impl LockToken {
    /// Run holding this token
    pub fn run(&self) -> Uuid {
        self.run
    }

    /// Hand the lock to the next waiter
    pub fn release(mut self) {
        self.release_once();
    }

    fn release_once(&mut self) {
        if let Some(permit) = self.permit.take() {
            // Record before the permit is returned so the next holder's
            // acquisition can never appear ahead of this release.
            tracing::trace!(
                run = %self.run,
                held_ms = self.acquired_at.elapsed().as_millis() as u64,
                "Returning upload lock"
            );
            emit(self.events.as_ref(), UploadEvent::LockReleased { run: self.run });
            drop(permit);
        }
    }
}

impl Drop for LockToken {
    fn drop(&mut self) {
        self.release_once();
    }
}

impl std::fmt::Debug for LockToken {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockToken")
            .field("run", &self.run)
            .field("held", &self.permit.is_some())
            .finish()
    }
}
