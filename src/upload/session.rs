//! Session Resolver
//!
//! Turns an optional session identifier into a live storage session:
//! - Reuses sessions already known to be live, without touching the network
//! - Otherwise selects a provider and attaches to or creates its session
//! - Reports lifecycle events along the way
//!
//! The caller holds the upload lock across [`SessionResolver::resolve`].

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::RwLock;
use uuid::Uuid;

use crate::config::UploadConfig;
use crate::error::UploadError;
use crate::events::{emit, EventSink, UploadEvent};
use crate::network::{CreationReceipt, CreationStatus, ProviderInfo, Session, SessionId, StorageNetwork};

// ============================================================================
// Session Resolver
// ============================================================================

/// Resolves and caches storage sessions
#[derive(Clone)]
pub struct SessionResolver {
    inner: Arc<SessionResolverInner>,
}

struct SessionResolverInner {
    network: Arc<dyn StorageNetwork>,
    events: Arc<dyn EventSink>,

    /// Sessions resolved so far, indexed by ID
    sessions: RwLock<HashMap<SessionId, Session>>,

    poll_interval: Duration,
    poll_attempts: u32,
}

impl SessionResolver {
    pub fn new(network: Arc<dyn StorageNetwork>, events: Arc<dyn EventSink>, config: &UploadConfig) -> Self {
        Self {
            inner: Arc::new(SessionResolverInner {
                network,
                events,
                sessions: RwLock::new(HashMap::new()),
                poll_interval: config.creation_poll_interval(),
                poll_attempts: config.creation_poll_attempts,
            }),
        }
    }

    /// Resolve the session run `run` writes into
    pub async fn resolve(
        &self,
        run: Uuid,
        existing: Option<&SessionId>,
        size_hint: u64,
    ) -> Result<Session, UploadError> {
        if let Some(id) = existing {
            if let Some(session) = self.reuse(id).await? {
                tracing::debug!(run = %run, session_id = %id, "Reusing live session");
                return Ok(session);
            }
            tracing::info!(
                run = %run,
                session_id = %id,
                "Requested session is not live, negotiating a new one"
            );
        }

        self.negotiate(run, size_hint).await
    }

    /// Cached copy of a session, if it was resolved before
    pub async fn known_session(&self, id: &SessionId) -> Option<Session> {
        let sessions = self.inner.sessions.read().await;
        sessions.get(id).cloned()
    }

    // ========================================================================
    // Reuse
    // ========================================================================

    async fn reuse(&self, id: &SessionId) -> Result<Option<Session>, UploadError> {
        {
            let sessions = self.inner.sessions.read().await;
            if let Some(session) = sessions.get(id) {
                if session.live {
                    return Ok(Some(session.clone()));
                }
            }
        }

        // Not seen by this process yet; the network may still know it
        let found = self
            .inner
            .network
            .lookup_session(id)
            .await
            .map_err(UploadError::session)?;

        match found {
            Some(session) if session.live => Ok(Some(self.remember(session).await)),
            _ => Ok(None),
        }
    }

    // ========================================================================
    // Negotiation
    // ========================================================================

    async fn negotiate(&self, run: Uuid, size_hint: u64) -> Result<Session, UploadError> {
        let network = &self.inner.network;

        let provider = network
            .select_provider(size_hint)
            .await
            .map_err(UploadError::session)?;
        self.emit(UploadEvent::ProviderSelected {
            run,
            provider: provider.id.clone(),
        });

        if let Some(session) = network
            .find_session(&provider)
            .await
            .map_err(UploadError::session)?
            .filter(|s| s.live)
        {
            self.emit(UploadEvent::SessionResolved {
                run,
                session_id: Some(session.id.clone()),
                is_new: false,
            });
            return Ok(self.remember(session).await);
        }

        self.emit(UploadEvent::SessionResolved {
            run,
            session_id: None,
            is_new: true,
        });
        self.create(run, provider).await
    }

    async fn create(&self, run: Uuid, provider: ProviderInfo) -> Result<Session, UploadError> {
        let receipt = self
            .inner
            .network
            .create_session(&provider)
            .await
            .map_err(UploadError::session)?;
        self.emit(UploadEvent::CreationSubmitted {
            run,
            tx_hash: receipt.tx_hash.clone(),
        });

        let id = self.await_live(run, &receipt).await?;
        let session = Session {
            id,
            provider,
            live: true,
            is_new: true,
        };

        let mut sessions = self.inner.sessions.write().await;
        sessions.insert(session.id.clone(), Session { is_new: false, ..session.clone() });

        Ok(session)
    }

    async fn await_live(&self, run: Uuid, receipt: &CreationReceipt) -> Result<SessionId, UploadError> {
        for attempt in 1..=self.inner.poll_attempts {
            let status = self
                .inner
                .network
                .creation_status(receipt)
                .await
                .map_err(UploadError::session)?;
            self.emit(UploadEvent::CreationProgress {
                run,
                live: status.is_live(),
            });

            match status {
                CreationStatus::Live(id) => return Ok(id),
                CreationStatus::Failed(reason) => {
                    return Err(UploadError::SessionResolution(format!(
                        "session creation {} failed: {}",
                        receipt.tx_hash, reason
                    )));
                }
                CreationStatus::Pending if attempt < self.inner.poll_attempts => {
                    tokio::time::sleep(self.inner.poll_interval).await;
                }
                CreationStatus::Pending => {}
            }
        }

        Err(UploadError::SessionResolution(format!(
            "session creation {} not live after {} polls",
            receipt.tx_hash, self.inner.poll_attempts
        )))
    }

    /// Cache `session` and return it as a reused (not new) session
    async fn remember(&self, session: Session) -> Session {
        let session = Session { is_new: false, ..session };
        let mut sessions = self.inner.sessions.write().await;
        sessions.insert(session.id.clone(), session.clone());
        session
    }

    fn emit(&self, event: UploadEvent) {
        emit(self.inner.events.as_ref(), event);
    }
}

// ============================================================================
// Tests
// ============================================================================
