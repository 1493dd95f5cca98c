//! Storage network types

use std::fmt;

use serde::{Deserialize, Serialize};

// ============================================================================
// Identifiers
// ============================================================================

/// Identifier of a storage session (proof set) on the network
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<String> for SessionId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl From<&str> for SessionId {
    fn from(id: &str) -> Self {
        Self::new(id)
    }
}

/// Content identifier: the network's digest of an uploaded payload.
///
/// Opaque to this crate; only the network computes it.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ContentId(String);

impl ContentId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for ContentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

// ============================================================================
// Providers and Sessions
// ============================================================================

/// A storage provider that can own sessions
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProviderInfo {
    /// Provider identifier (address on the network)
    pub id: String,

    /// Endpoint the provider accepts payloads on
    pub service_url: String,
}

/// A resolved storage session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Session {
    pub id: SessionId,

    /// Owning provider
    pub provider: ProviderInfo,

    /// Whether the session accepts writes
    pub live: bool,

    /// Whether this resolution created the session
    pub is_new: bool,
}

/// Receipt for a submitted session creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CreationReceipt {
    /// Hash of the creation transaction
    pub tx_hash: String,

    pub provider: ProviderInfo,
}

/// Progress of a submitted session creation
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CreationStatus {
    /// Transaction not yet mined or provider not yet ready
    Pending,
    /// Session exists and accepts writes
    Live(SessionId),
    /// Creation will never complete
    Failed(String),
}

impl CreationStatus {
    pub fn is_live(&self) -> bool {
        matches!(self, Self::Live(_))
    }
}

// ============================================================================
// Capacity
// ============================================================================

/// Answer of the network's allowance query for a payload
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CapacityCheck {
    pub sufficient: bool,
    pub required: u64,
    pub available: u64,
}
