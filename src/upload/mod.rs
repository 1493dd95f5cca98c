//! Serialized Upload Module
//!
//! Commits payloads to proof-set storage sessions with:
//! - One FIFO lock serializing every upload for its whole lifetime
//! - Session reuse or negotiation with a storage provider
//! - An allowance preflight before any byte moves
//! - Two-phase completion: the caller is answered when the commitment is
//!   submitted, confirmation is tracked in the background
//!
//! Protocol Flow:
//! 1. Acquire the upload lock
//! 2. Resolve or create the session
//! 3. Check capacity
//! 4. Start the transfer
//! 5. Commitment submitted → caller gets its result
//! 6. Commitment confirmed or run failed → lock released

pub mod lock;
pub mod orchestrator;
pub mod preflight;
pub mod session;
pub mod tracker;
mod transfer;
pub mod types;

pub use lock::{LockToken, UploadLock};
pub use orchestrator::UploadOrchestrator;
pub use preflight::{CapacityPreflight, CapacityVerdict};
pub use session::SessionResolver;
pub use tracker::UploadTracker;
pub use types::*;
