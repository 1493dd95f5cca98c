//! Proofset Uploader
//!
//! Client-side upload orchestration for proof-set storage networks: one
//! upload at a time, sessions reused or negotiated with a provider, an
//! allowance check before any byte moves, and a result handed back as soon
//! as the provider submits the on-chain commitment.
//!
//! The network itself sits behind [`network::StorageNetwork`]; the crate
//! ships an in-process [`network::SandboxNetwork`] and an HTTP front end.

pub mod config;
pub mod error;
pub mod events;
pub mod network;
pub mod routes;
pub mod state;
pub mod upload;

pub use config::Config;
pub use error::{Result, UploadError};
pub use events::{EventLog, EventSink, NoopSink, UploadEvent};
pub use network::{SandboxNetwork, StorageNetwork};
pub use upload::{
    Confirmation, FinalOutcome, UploadHandle, UploadLock, UploadOrchestrator, UploadRequest,
    UploadResult,
};
