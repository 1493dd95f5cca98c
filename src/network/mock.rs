//! Scripted storage network for tests

use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use parking_lot::Mutex;
use sha2::{Digest, Sha256};
use tokio::sync::Notify;

use super::{
    CapacityCheck, ContentId, CreationReceipt, CreationStatus, MilestoneSink, NetworkError,
    ProviderInfo, Session, SessionId, StorageNetwork,
};

/// Where a scripted transfer stops
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum FailPoint {
    BeforeAccepted,
    BeforeSubmitted,
    BeforeConfirmed,
    /// Report confirmation, then return an error anyway
    AfterConfirmed,
}

/// Behaviour of one `transfer` call
#[derive(Default, Clone)]
pub(crate) struct TransferScript {
    pub fail_at: Option<FailPoint>,
    /// Skip the submitted milestone but still finish successfully
    pub skip_submitted: bool,
    /// Panic instead of reporting anything
    pub panic: bool,
    /// Wait on this before reporting confirmation (or the late failure)
    pub confirm_gate: Option<Arc<Notify>>,
    /// Pause between milestones
    pub step_delay: Duration,
}

impl TransferScript {
    pub fn failing_at(point: FailPoint) -> Self {
        Self {
            fail_at: Some(point),
            ..Default::default()
        }
    }

    pub fn gated(gate: Arc<Notify>) -> Self {
        Self {
            confirm_gate: Some(gate),
            ..Default::default()
        }
    }
}

struct MockState {
    providers: Vec<ProviderInfo>,
    selection_error: Option<NetworkError>,
    panic_on_selection: bool,
    reuse_sessions: bool,
    sessions: HashMap<SessionId, Session>,
    next_session: u64,
    pending_polls: u32,
    polls: HashMap<String, u32>,
    available: u64,
    scripts: VecDeque<TransferScript>,
}

pub(crate) struct MockNetwork {
    state: Mutex<MockState>,
    pub select_calls: AtomicUsize,
    pub create_calls: AtomicUsize,
    pub capacity_calls: AtomicUsize,
    pub transfer_calls: AtomicUsize,
    active_transfers: AtomicUsize,
    pub max_active_transfers: AtomicUsize,
}

impl MockNetwork {
    pub fn new() -> Self {
        Self {
            state: Mutex::new(MockState {
                providers: vec![ProviderInfo {
                    id: "f0mock".to_string(),
                    service_url: "http://mock.provider".to_string(),
                }],
                selection_error: None,
                panic_on_selection: false,
                reuse_sessions: true,
                sessions: HashMap::new(),
                next_session: 1,
                pending_polls: 0,
                polls: HashMap::new(),
                available: u64::MAX,
                scripts: VecDeque::new(),
            }),
            select_calls: AtomicUsize::new(0),
            create_calls: AtomicUsize::new(0),
            capacity_calls: AtomicUsize::new(0),
            transfer_calls: AtomicUsize::new(0),
            active_transfers: AtomicUsize::new(0),
            max_active_transfers: AtomicUsize::new(0),
        }
    }

    pub fn without_providers(self) -> Self {
        self.state.lock().providers.clear();
        self
    }

    pub fn failing_selection(self, error: NetworkError) -> Self {
        self.state.lock().selection_error = Some(error);
        self
    }

    pub fn panicking_selection(self) -> Self {
        self.state.lock().panic_on_selection = true;
        self
    }

    /// Never attach to an existing session; every negotiation creates one
    pub fn creating_fresh_sessions(self) -> Self {
        self.state.lock().reuse_sessions = false;
        self
    }

    /// Creation reports pending this many times before going live
    pub fn with_pending_polls(self, polls: u32) -> Self {
        self.state.lock().pending_polls = polls;
        self
    }

    /// Allowance; one unit per byte is required
    pub fn with_available(self, available: u64) -> Self {
        self.state.lock().available = available;
        self
    }

    /// Queue behaviour for the next `transfer` call
    pub fn script(&self, script: TransferScript) {
        self.state.lock().scripts.push_back(script);
    }

    /// Heal a previously injected selection failure
    pub fn clear_selection_error(&self) {
        let mut state = self.state.lock();
        state.selection_error = None;
        state.panic_on_selection = false;
    }

    pub fn creations(&self) -> usize {
        self.create_calls.load(Ordering::SeqCst)
    }

    pub fn transfers(&self) -> usize {
        self.transfer_calls.load(Ordering::SeqCst)
    }

    fn content_id(payload: &[u8]) -> ContentId {
        let digest = hex::encode(Sha256::digest(payload));
        ContentId::new(format!("mock-{}", &digest[..16]))
    }
}

#[async_trait]
impl StorageNetwork for MockNetwork {
    async fn select_provider(&self, _size_hint: u64) -> Result<ProviderInfo, NetworkError> {
        self.select_calls.fetch_add(1, Ordering::SeqCst);
        let state = self.state.lock();
        if state.panic_on_selection {
            drop(state);
            panic!("provider registry unreachable");
        }
        if let Some(error) = &state.selection_error {
            return Err(error.clone());
        }
        state.providers.first().cloned().ok_or(NetworkError::NoProvider)
    }

    async fn find_session(&self, provider: &ProviderInfo) -> Result<Option<Session>, NetworkError> {
        let state = self.state.lock();
        if !state.reuse_sessions {
            return Ok(None);
        }
        Ok(state
            .sessions
            .values()
            .find(|s| s.provider == *provider && s.live)
            .cloned())
    }

    async fn lookup_session(&self, id: &SessionId) -> Result<Option<Session>, NetworkError> {
        Ok(self.state.lock().sessions.get(id).cloned())
    }

    async fn create_session(&self, provider: &ProviderInfo) -> Result<CreationReceipt, NetworkError> {
        let n = self.create_calls.fetch_add(1, Ordering::SeqCst) + 1;
        Ok(CreationReceipt {
            tx_hash: format!("0xcreate{}", n),
            provider: provider.clone(),
        })
    }

    async fn creation_status(&self, receipt: &CreationReceipt) -> Result<CreationStatus, NetworkError> {
        let mut state = self.state.lock();
        let pending = state.pending_polls;
        let polls = state.polls.entry(receipt.tx_hash.clone()).or_insert(0);
        *polls += 1;
        if *polls <= pending {
            return Ok(CreationStatus::Pending);
        }

        let id = SessionId::new(state.next_session.to_string());
        state.next_session += 1;
        state.sessions.insert(
            id.clone(),
            Session {
                id: id.clone(),
                provider: receipt.provider.clone(),
                live: true,
                is_new: false,
            },
        );
        Ok(CreationStatus::Live(id))
    }

    async fn check_capacity(&self, _session: &Session, size: u64) -> Result<CapacityCheck, NetworkError> {
        self.capacity_calls.fetch_add(1, Ordering::SeqCst);
        let available = self.state.lock().available;
        Ok(CapacityCheck {
            sufficient: available >= size,
            required: size,
            available,
        })
    }

    async fn transfer(
        &self,
        session: Session,
        payload: Vec<u8>,
        sink: Arc<dyn MilestoneSink>,
    ) -> Result<(), NetworkError> {
        self.transfer_calls.fetch_add(1, Ordering::SeqCst);
        let active = self.active_transfers.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_active_transfers.fetch_max(active, Ordering::SeqCst);

        let script = self.state.lock().scripts.pop_front().unwrap_or_default();
        let result = run_script(&script, &session, &payload, sink.as_ref()).await;

        self.active_transfers.fetch_sub(1, Ordering::SeqCst);
        result
    }
}

async fn run_script(
    script: &TransferScript,
    session: &Session,
    payload: &[u8],
    sink: &dyn MilestoneSink,
) -> Result<(), NetworkError> {
    if script.panic {
        panic!("transfer exploded");
    }

    step(script).await;
    if script.fail_at == Some(FailPoint::BeforeAccepted) {
        return Err(NetworkError::Rejected("upload refused".to_string()));
    }
    sink.accepted(MockNetwork::content_id(payload));

    step(script).await;
    if script.fail_at == Some(FailPoint::BeforeSubmitted) {
        return Err(NetworkError::Unavailable("provider dropped connection".to_string()));
    }
    if !script.skip_submitted {
        sink.submitted(format!("0xcommit-{}", session.id));
    }

    step(script).await;
    if let Some(gate) = &script.confirm_gate {
        gate.notified().await;
    }
    if script.fail_at == Some(FailPoint::BeforeConfirmed) {
        return Err(NetworkError::Commitment("transaction reverted".to_string()));
    }
    sink.confirmed();
    if script.fail_at == Some(FailPoint::AfterConfirmed) {
        return Err(NetworkError::Unavailable("connection reset after receipt".to_string()));
    }
    Ok(())
}

async fn step(script: &TransferScript) {
    if script.step_delay.is_zero() {
        tokio::task::yield_now().await;
    } else {
        tokio::time::sleep(script.step_delay).await;
    }
}
