//! Upload types

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::sync::oneshot;
use uuid::Uuid;

use crate::network::{ContentId, SessionId};

// ============================================================================
// Request / Result
// ============================================================================

/// A payload to commit, optionally into an existing session
#[derive(Debug, Clone)]
pub struct UploadRequest {
    pub payload: Vec<u8>,
    pub session_id: Option<SessionId>,
}

impl UploadRequest {
    pub fn new(payload: impl Into<Vec<u8>>) -> Self {
        Self {
            payload: payload.into(),
            session_id: None,
        }
    }

    /// Target an existing session instead of negotiating one
    pub fn with_session(mut self, session_id: impl Into<SessionId>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    pub fn size(&self) -> u64 {
        self.payload.len() as u64
    }
}

/// What the caller gets back once the commitment is submitted
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadResult {
    pub content_id: ContentId,
    pub size: u64,
    pub session_id: SessionId,

    /// Run identifier, usable to poll the upload record
    pub upload_id: Uuid,
}

// ============================================================================
// Phases and Outcomes
// ============================================================================

/// Where an upload run currently is
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UploadPhase {
    /// Waiting for the upload lock
    Init,
    /// Holding the lock, negotiating a session
    LockHeld,
    /// Session resolved, checking capacity
    SessionReady,
    /// Capacity sufficient, transfer about to start
    PreflightOk,
    /// Bytes moving to the provider
    Transferring,
    /// Provider holds the payload; commitment pending
    Accepted,
    /// Commitment submitted; caller has its result
    Submitted,
    /// Commitment confirmed on chain
    Confirmed,
    /// Failed before the caller got a result
    FailedEarly,
    /// Failed after the caller got a result
    FailedLate,
}

impl UploadPhase {
    pub fn is_terminal(&self) -> bool {
        matches!(self, Self::Confirmed | Self::FailedEarly | Self::FailedLate)
    }
}

/// Terminal state of one upload run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FinalOutcome {
    Confirmed,
    FailedEarly(String),
    FailedLate(String),
}

impl FinalOutcome {
    pub fn phase(&self) -> UploadPhase {
        match self {
            Self::Confirmed => UploadPhase::Confirmed,
            Self::FailedEarly(_) => UploadPhase::FailedEarly,
            Self::FailedLate(_) => UploadPhase::FailedLate,
        }
    }

    pub fn is_confirmed(&self) -> bool {
        matches!(self, Self::Confirmed)
    }
}

// ============================================================================
// Handles
// ============================================================================

/// Caller-facing result plus the opt-in confirmation future
#[derive(Debug)]
pub struct UploadHandle {
    pub result: UploadResult,
    pub confirmation: Confirmation,
}

/// Settles when the run reaches its terminal state.
///
/// Dropping it changes nothing: the run is supervised independently.
#[derive(Debug)]
pub struct Confirmation {
    receiver: oneshot::Receiver<FinalOutcome>,
}

impl Confirmation {
    pub(crate) fn new(receiver: oneshot::Receiver<FinalOutcome>) -> Self {
        Self { receiver }
    }

    /// Wait for the terminal outcome
    pub async fn wait(self) -> FinalOutcome {
        self.receiver
            .await
            .unwrap_or_else(|_| FinalOutcome::FailedLate("confirmation task ended without outcome".to_string()))
    }
}

// ============================================================================
// Records
// ============================================================================

/// Status record of one upload run, kept for polling
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadRecord {
    pub id: Uuid,
    pub size: u64,
    pub phase: UploadPhase,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub session_id: Option<SessionId>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_id: Option<ContentId>,

    /// Commitment transaction, once submitted
    #[serde(skip_serializing_if = "Option::is_none")]
    pub commit_tx: Option<String>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,

    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl UploadRecord {
    pub fn new(id: Uuid, size: u64) -> Self {
        let now = Utc::now();
        Self {
            id,
            size,
            phase: UploadPhase::Init,
            session_id: None,
            content_id: None,
            commit_tx: None,
            error: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Whether the caller of this run already received its result
    pub fn result_delivered(&self) -> bool {
        matches!(
            self.phase,
            UploadPhase::Submitted | UploadPhase::Confirmed | UploadPhase::FailedLate
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_request_builder() {
        let request = UploadRequest::new(vec![1u8; 100]).with_session("42");
        assert_eq!(request.size(), 100);
        assert_eq!(request.session_id, Some(SessionId::new("42")));
    }

    #[test]
    fn test_terminal_phases() {
        assert!(UploadPhase::Confirmed.is_terminal());
        assert!(UploadPhase::FailedLate.is_terminal());
        assert!(!UploadPhase::Submitted.is_terminal());
        assert_eq!(FinalOutcome::FailedEarly("x".into()).phase(), UploadPhase::FailedEarly);
    }

    #[test]
    fn test_result_serializes_camel_case() {
        let result = UploadResult {
            content_id: ContentId::new("bafk"),
            size: 128,
            session_id: SessionId::new("7"),
            upload_id: Uuid::nil(),
        };
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["contentId"], "bafk");
        assert_eq!(json["sessionId"], "7");
        assert_eq!(json["size"], 128);
    }

    #[tokio::test]
    async fn test_confirmation_without_sender_reports_late_failure() {
        let (tx, rx) = oneshot::channel();
        drop(tx);
        let outcome = Confirmation::new(rx).wait().await;
        assert!(matches!(outcome, FinalOutcome::FailedLate(_)));
    }
}
