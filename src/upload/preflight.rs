//! Capacity Preflight
//!
//! Checks the uploader's standing allowance against a payload before any
//! byte moves, so an insufficient allowance fails while nothing is in flight.

use std::sync::Arc;

use crate::error::{Result, UploadError};
use crate::network::{Session, StorageNetwork};

/// Outcome of an allowance check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CapacityVerdict {
    Sufficient { required: u64, available: u64 },
    Insufficient { required: u64, available: u64 },
}

impl CapacityVerdict {
    pub fn is_sufficient(&self) -> bool {
        matches!(self, Self::Sufficient { .. })
    }
}

/// Allowance check run between session resolution and transfer
#[derive(Clone)]
pub struct CapacityPreflight {
    network: Arc<dyn StorageNetwork>,
}

impl CapacityPreflight {
    pub fn new(network: Arc<dyn StorageNetwork>) -> Self {
        Self { network }
    }

    /// Ask the network whether `size` bytes on `session` are covered
    pub async fn evaluate(&self, session: &Session, size: u64) -> Result<CapacityVerdict> {
        let check = self
            .network
            .check_capacity(session, size)
            .await
            .map_err(|e| UploadError::Preflight(e.to_string()))?;

        Ok(if check.sufficient {
            CapacityVerdict::Sufficient {
                required: check.required,
                available: check.available,
            }
        } else {
            CapacityVerdict::Insufficient {
                required: check.required,
                available: check.available,
            }
        })
    }

    /// Like [`evaluate`](Self::evaluate), failing with `InsufficientCapacity`
    pub async fn ensure(&self, session: &Session, size: u64) -> Result<CapacityVerdict> {
        match self.evaluate(session, size).await? {
            CapacityVerdict::Insufficient { required, available } => {
                tracing::warn!(
                    session_id = %session.id,
                    required = required,
                    available = available,
                    "Allowance does not cover payload"
                );
                Err(UploadError::InsufficientCapacity { required, available })
            }
            verdict => Ok(verdict),
        }
    }
}
