//! Storage network client seam
//!
//! The upload core never talks to providers directly. Everything it needs
//! from the proof-set network goes through [`StorageNetwork`]:
//! - provider selection and session negotiation
//! - the allowance query used by the capacity preflight
//! - the payload transfer, which reports its milestones to a [`MilestoneSink`]

pub mod sandbox;
mod types;

#[cfg(test)]
pub(crate) mod mock;

use std::sync::Arc;

use async_trait::async_trait;
use thiserror::Error;

pub use sandbox::SandboxNetwork;
pub use types::*;

/// Errors reported by the storage network
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum NetworkError {
    #[error("No storage provider available")]
    NoProvider,

    #[error("Session not found: {0}")]
    SessionNotFound(String),

    #[error("Provider rejected request: {0}")]
    Rejected(String),

    #[error("Network unavailable: {0}")]
    Unavailable(String),

    #[error("Commitment failed: {0}")]
    Commitment(String),
}

/// Receives the milestones of one transfer, in order:
/// accepted → submitted → confirmed.
pub trait MilestoneSink: Send + Sync {
    /// The provider stored the payload and computed its content identifier
    fn accepted(&self, content_id: ContentId);

    /// The provider sent the commitment transaction
    fn submitted(&self, tx_hash: String);

    /// The commitment transaction is confirmed on chain
    fn confirmed(&self);
}

/// Client for the proof-set storage network
#[async_trait]
pub trait StorageNetwork: Send + Sync {
    /// Pick a provider able to take a payload of roughly `size_hint` bytes
    async fn select_provider(&self, size_hint: u64) -> Result<ProviderInfo, NetworkError>;

    /// The caller's live session with `provider`, if one exists
    async fn find_session(&self, provider: &ProviderInfo) -> Result<Option<Session>, NetworkError>;

    /// Look up a session by identifier
    async fn lookup_session(&self, id: &SessionId) -> Result<Option<Session>, NetworkError>;

    /// Submit creation of a new session owned by `provider`
    async fn create_session(&self, provider: &ProviderInfo) -> Result<CreationReceipt, NetworkError>;

    /// Poll a submitted creation
    async fn creation_status(&self, receipt: &CreationReceipt) -> Result<CreationStatus, NetworkError>;

    /// Query whether the standing allowance covers `size` bytes on `session`
    async fn check_capacity(&self, session: &Session, size: u64) -> Result<CapacityCheck, NetworkError>;

    /// Transfer `payload` into `session`.
    ///
    /// Milestones are pushed to `sink` as they happen. Returns `Ok` once the
    /// commitment is confirmed, or the error that ended the transfer.
    async fn transfer(
        &self,
        session: Session,
        payload: Vec<u8>,
        sink: Arc<dyn MilestoneSink>,
    ) -> Result<(), NetworkError>;
}
