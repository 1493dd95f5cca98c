//! Sandbox storage network
//!
//! In-process stand-in for the proof-set network, used by the server binary
//! for local development. Providers, sessions and allowance live in memory;
//! content identifiers are SHA-256 digests of the payload.

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};

use super::{
    CapacityCheck, ContentId, CreationReceipt, CreationStatus, MilestoneSink, NetworkError,
    ProviderInfo, Session, SessionId, StorageNetwork,
};
use crate::config::SandboxConfig;

/// Content identifier prefix of sandbox digests
const CONTENT_ID_PREFIX: &str = "bafksandbox";

struct SandboxState {
    sessions: HashMap<SessionId, SandboxSession>,
    /// Creation tx hash -> polls seen so far
    creations: HashMap<String, u32>,
    next_session: u64,
    next_tx: u64,
    allowance: u64,
}

struct SandboxSession {
    session: Session,
    pieces: Vec<ContentId>,
}

/// In-memory [`StorageNetwork`]
pub struct SandboxNetwork {
    config: SandboxConfig,
    providers: Vec<ProviderInfo>,
    next_provider: AtomicUsize,
    state: Mutex<SandboxState>,
}

impl SandboxNetwork {
    pub fn new(config: SandboxConfig) -> Self {
        let providers = config
            .providers
            .iter()
            .map(|id| ProviderInfo {
                id: id.clone(),
                service_url: format!("sandbox://{}", id),
            })
            .collect();

        Self {
            providers,
            next_provider: AtomicUsize::new(0),
            state: Mutex::new(SandboxState {
                sessions: HashMap::new(),
                creations: HashMap::new(),
                next_session: 1,
                next_tx: 1,
                allowance: config.allowance,
            }),
            config,
        }
    }

    /// Allowance not yet consumed by confirmed pieces
    pub fn remaining_allowance(&self) -> u64 {
        self.state.lock().allowance
    }

    /// Pieces confirmed into a session
    pub fn pieces(&self, id: &SessionId) -> Vec<ContentId> {
        self.state
            .lock()
            .sessions
            .get(id)
            .map(|s| s.pieces.clone())
            .unwrap_or_default()
    }

    fn content_id(payload: &[u8]) -> ContentId {
        ContentId::new(format!("{}{}", CONTENT_ID_PREFIX, hex::encode(Sha256::digest(payload))))
    }

    fn tx_hash(&self, kind: &str) -> String {
        let mut state = self.state.lock();
        let n = state.next_tx;
        state.next_tx += 1;
        format!("0x{}", hex::encode(Sha256::digest(format!("{}:{}", kind, n).as_bytes())))
    }

    fn required(&self, size: u64) -> u64 {
        size.saturating_mul(self.config.price_per_byte)
    }

    async fn pause(&self) {
        if self.config.milestone_delay_ms > 0 {
            tokio::time::sleep(Duration::from_millis(self.config.milestone_delay_ms)).await;
        }
    }
}

#[async_trait]
impl StorageNetwork for SandboxNetwork {
    async fn select_provider(&self, _size_hint: u64) -> Result<ProviderInfo, NetworkError> {
        if self.providers.is_empty() {
            return Err(NetworkError::NoProvider);
        }
        let index = self.next_provider.fetch_add(1, Ordering::Relaxed) % self.providers.len();
        Ok(self.providers[index].clone())
    }

    async fn find_session(&self, provider: &ProviderInfo) -> Result<Option<Session>, NetworkError> {
        if !self.config.reuse_sessions {
            return Ok(None);
        }
        let state = self.state.lock();
        Ok(state
            .sessions
            .values()
            .map(|s| &s.session)
            .find(|s| s.live && s.provider == *provider)
            .cloned())
    }

    async fn lookup_session(&self, id: &SessionId) -> Result<Option<Session>, NetworkError> {
        Ok(self.state.lock().sessions.get(id).map(|s| s.session.clone()))
    }

    async fn create_session(&self, provider: &ProviderInfo) -> Result<CreationReceipt, NetworkError> {
        if !self.providers.contains(provider) {
            return Err(NetworkError::Rejected(format!("unknown provider {}", provider.id)));
        }
        let tx_hash = self.tx_hash("create");
        self.state.lock().creations.insert(tx_hash.clone(), 0);
        Ok(CreationReceipt {
            tx_hash,
            provider: provider.clone(),
        })
    }

    async fn creation_status(&self, receipt: &CreationReceipt) -> Result<CreationStatus, NetworkError> {
        let mut state = self.state.lock();
        let Some(polls) = state.creations.get_mut(&receipt.tx_hash) else {
            return Ok(CreationStatus::Failed(format!("unknown creation {}", receipt.tx_hash)));
        };

        // The creation transaction lands one poll after submission
        *polls += 1;
        if *polls < 2 {
            return Ok(CreationStatus::Pending);
        }
        state.creations.remove(&receipt.tx_hash);

        let id = SessionId::new(state.next_session.to_string());
        state.next_session += 1;
        state.sessions.insert(
            id.clone(),
            SandboxSession {
                session: Session {
                    id: id.clone(),
                    provider: receipt.provider.clone(),
                    live: true,
                    is_new: false,
                },
                pieces: Vec::new(),
            },
        );
        Ok(CreationStatus::Live(id))
    }

    async fn check_capacity(&self, _session: &Session, size: u64) -> Result<CapacityCheck, NetworkError> {
        let required = self.required(size);
        let available = self.state.lock().allowance;
        Ok(CapacityCheck {
            sufficient: available >= required,
            required,
            available,
        })
    }

    async fn transfer(
        &self,
        session: Session,
        payload: Vec<u8>,
        sink: Arc<dyn MilestoneSink>,
    ) -> Result<(), NetworkError> {
        let live = self
            .state
            .lock()
            .sessions
            .get(&session.id)
            .is_some_and(|s| s.session.live);
        if !live {
            return Err(NetworkError::SessionNotFound(session.id.to_string()));
        }

        self.pause().await;
        let content_id = Self::content_id(&payload);
        sink.accepted(content_id.clone());

        self.pause().await;
        sink.submitted(self.tx_hash("commit"));

        self.pause().await;
        {
            let required = self.required(payload.len() as u64);
            let mut state = self.state.lock();
            if state.allowance < required {
                return Err(NetworkError::Commitment(format!(
                    "allowance exhausted: required {}, available {}",
                    required, state.allowance
                )));
            }
            state.allowance -= required;
            if let Some(entry) = state.sessions.get_mut(&session.id) {
                entry.pieces.push(content_id);
            }
        }
        sink.confirmed();
        Ok(())
    }
}
