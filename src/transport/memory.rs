//! In-process signer
//!
//! A scripted wallet used by the binary's simulated mode and by tests. It
//! behaves like an EIP-1193 wallet: it answers `eth_chainId`,
//! `eth_accounts`, `wallet_switchEthereumChain` and
//! `wallet_addEthereumChain`, and emits notifications to subscribed
//! handlers. Handlers are invoked after internal locks are released, so a
//! handler may call back into the session or unsubscribe itself.

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use async_trait::async_trait;
use serde_json::{json, Value};
use tracing::debug;
use uuid::Uuid;

use super::{
    EventHandler, EventKind, Session, SessionEvent, SignerTransport, Subscription, TransportError,
    UNRECOGNIZED_CHAIN_CODE,
};
use crate::config::SessionConfig;
use crate::rpc::{
    parse_chain_id, ETH_ACCOUNTS, ETH_CALL, ETH_CHAIN_ID, WALLET_ADD_CHAIN, WALLET_SWITCH_CHAIN,
};

/// How the wallet answers a switch request for a chain it knows
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SwitchBehavior {
    /// Switch and emit chain-changed
    Accept,
    /// Decline with code 4001
    Reject,
    /// Report success but stay on the current chain
    Ignore,
}

struct SignerState {
    chain_id: u64,
    accounts: Vec<String>,
    known_chains: HashSet<u64>,
    switch_behavior: SwitchBehavior,
    stale_echo: bool,
    session_error: Option<TransportError>,
    disconnect_error: Option<TransportError>,
    add_chain_error: Option<TransportError>,
    sessions_created: usize,
    disconnect_calls: usize,
    requests: Vec<(String, Value)>,
    active: Weak<MemorySession>,
}

/// Scripted signer transport
#[derive(Clone)]
pub struct MemorySigner {
    state: Arc<Mutex<SignerState>>,
}

fn lock(state: &Mutex<SignerState>) -> MutexGuard<'_, SignerState> {
    state.lock().unwrap_or_else(PoisonError::into_inner)
}

fn hex(chain_id: u64) -> Value {
    Value::String(format!("{:#x}", chain_id))
}

impl MemorySigner {
    /// Wallet on `chain_id` with one default account.
    ///
    /// Ethereum, Optimism and Base are known chains out of the box.
    pub fn new(chain_id: u64) -> Self {
        let mut known_chains: HashSet<u64> = [1, 10, 8453].into_iter().collect();
        known_chains.insert(chain_id);
        Self {
            state: Arc::new(Mutex::new(SignerState {
                chain_id,
                accounts: vec!["0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed".to_string()],
                known_chains,
                switch_behavior: SwitchBehavior::Accept,
                stale_echo: false,
                session_error: None,
                disconnect_error: None,
                add_chain_error: None,
                sessions_created: 0,
                disconnect_calls: 0,
                requests: Vec::new(),
                active: Weak::new(),
            })),
        }
    }

    fn state(&self) -> MutexGuard<'_, SignerState> {
        lock(&self.state)
    }

    pub fn with_accounts(self, accounts: Vec<String>) -> Self {
        self.state().accounts = accounts;
        self
    }

    /// Emit a chain-changed for the previous chain before the new one
    pub fn with_stale_echo(self) -> Self {
        self.state().stale_echo = true;
        self
    }

    pub fn set_switch_behavior(&self, behavior: SwitchBehavior) {
        self.state().switch_behavior = behavior;
    }

    /// Make the wallet answer 4902 for `chain_id` until it is added
    pub fn forget_chain(&self, chain_id: u64) {
        self.state().known_chains.remove(&chain_id);
    }

    pub fn knows_chain(&self, chain_id: u64) -> bool {
        self.state().known_chains.contains(&chain_id)
    }

    pub fn fail_sessions_with(&self, err: TransportError) {
        self.state().session_error = Some(err);
    }

    pub fn fail_disconnect_with(&self, err: TransportError) {
        self.state().disconnect_error = Some(err);
    }

    pub fn fail_add_chain_with(&self, err: TransportError) {
        self.state().add_chain_error = Some(err);
    }

    pub fn chain_id(&self) -> u64 {
        self.state().chain_id
    }

    pub fn sessions_created(&self) -> usize {
        self.state().sessions_created
    }

    pub fn disconnect_calls(&self) -> usize {
        self.state().disconnect_calls
    }

    /// Number of requests issued for `method`
    pub fn request_count(&self, method: &str) -> usize {
        self.state()
            .requests
            .iter()
            .filter(|(m, _)| m == method)
            .count()
    }

    /// Params of every request issued for `method`, in order
    pub fn requests_for(&self, method: &str) -> Vec<Value> {
        self.state()
            .requests
            .iter()
            .filter(|(m, _)| m == method)
            .map(|(_, p)| p.clone())
            .collect()
    }

    fn active(&self) -> Option<Arc<MemorySession>> {
        self.state().active.upgrade()
    }

    /// Handlers registered on the active session
    pub fn handler_count(&self) -> usize {
        self.active().map(|s| s.handler_count()).unwrap_or(0)
    }

    /// Deliver a raw notification to the active session's handlers
    pub fn emit(&self, event: SessionEvent) {
        if let Some(session) = self.active() {
            session.emit(event);
        }
    }

    /// The user switches network inside the wallet
    pub fn wallet_switch(&self, chain_id: u64) {
        {
            let mut state = self.state();
            state.chain_id = chain_id;
            state.known_chains.insert(chain_id);
        }
        self.emit(SessionEvent::ChainChanged(hex(chain_id)));
    }

    /// The user revokes account access
    pub fn revoke_accounts(&self) {
        self.state().accounts.clear();
        self.emit(SessionEvent::AccountsChanged(Vec::new()));
    }

    /// The user selects a different account
    pub fn change_account(&self, address: &str) {
        let accounts = {
            let mut state = self.state();
            state.accounts.retain(|a| a != address);
            state.accounts.insert(0, address.to_string());
            state.accounts.clone()
        };
        self.emit(SessionEvent::AccountsChanged(accounts));
    }

    /// The relay drops the session
    pub fn terminate(&self, reason: &str) {
        if let Some(session) = self.active() {
            session.connected.store(false, Ordering::SeqCst);
            session.emit(SessionEvent::Disconnected {
                reason: Some(reason.to_string()),
            });
        }
    }
}

#[async_trait]
impl SignerTransport for MemorySigner {
    async fn create_session(
        &self,
        config: &SessionConfig,
    ) -> Result<Arc<dyn Session>, TransportError> {
        // Pairing is never instantaneous
        tokio::task::yield_now().await;

        let mut state = self.state();
        if let Some(err) = state.session_error.clone() {
            return Err(err);
        }

        let session = Arc::new(MemorySession {
            id: Uuid::new_v4(),
            signer: self.state.clone(),
            connected: AtomicBool::new(true),
            handlers: Arc::new(Mutex::new(HashMap::new())),
            next_handler: AtomicU64::new(0),
        });
        state.sessions_created += 1;
        state.active = Arc::downgrade(&session);
        debug!(
            session_id = %session.id,
            required_chains = ?config.required_chains,
            "Memory signer paired"
        );
        Ok(session)
    }
}

type HandlerMap = HashMap<u64, (EventKind, EventHandler)>;

/// Session handed out by [`MemorySigner`]
pub struct MemorySession {
    id: Uuid,
    signer: Arc<Mutex<SignerState>>,
    connected: AtomicBool,
    handlers: Arc<Mutex<HandlerMap>>,
    next_handler: AtomicU64,
}

fn lock_handlers(handlers: &Mutex<HandlerMap>) -> MutexGuard<'_, HandlerMap> {
    handlers.lock().unwrap_or_else(PoisonError::into_inner)
}

impl MemorySession {
    fn handlers(&self) -> MutexGuard<'_, HandlerMap> {
        lock_handlers(&self.handlers)
    }

    fn handler_count(&self) -> usize {
        self.handlers().len()
    }

    fn emit(&self, event: SessionEvent) {
        let kind = event.kind();
        let targets: Vec<EventHandler> = self
            .handlers()
            .values()
            .filter(|(k, _)| *k == kind)
            .map(|(_, h)| h.clone())
            .collect();
        for handler in targets {
            handler(event.clone());
        }
    }

    fn switch_chain(&self, params: &Value) -> Result<Vec<SessionEvent>, TransportError> {
        let target = params
            .get(0)
            .and_then(|p| p.get("chainId"))
            .and_then(parse_chain_id)
            .ok_or_else(|| TransportError::new(-32602, "Invalid chainId"))?;

        let mut state = lock(&self.signer);
        if !state.known_chains.contains(&target) {
            return Err(TransportError::new(
                UNRECOGNIZED_CHAIN_CODE,
                format!("Unrecognized chain ID \"{:#x}\"", target),
            ));
        }

        match state.switch_behavior {
            SwitchBehavior::Reject => Err(TransportError::user_rejected()),
            SwitchBehavior::Ignore => Ok(Vec::new()),
            SwitchBehavior::Accept => {
                let prior = state.chain_id;
                if prior == target {
                    return Ok(Vec::new());
                }
                state.chain_id = target;
                let mut events = Vec::new();
                if state.stale_echo {
                    events.push(SessionEvent::ChainChanged(hex(prior)));
                }
                events.push(SessionEvent::ChainChanged(hex(target)));
                Ok(events)
            }
        }
    }

    fn add_chain(&self, params: &Value) -> Result<(), TransportError> {
        let chain = params
            .get(0)
            .and_then(|p| p.get("chainId"))
            .and_then(parse_chain_id)
            .ok_or_else(|| TransportError::new(-32602, "Invalid chainId"))?;

        let mut state = lock(&self.signer);
        if let Some(err) = state.add_chain_error.clone() {
            return Err(err);
        }
        state.known_chains.insert(chain);
        Ok(())
    }
}

#[async_trait]
impl Session for MemorySession {
    fn id(&self) -> Uuid {
        self.id
    }

    fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    fn accounts(&self) -> Vec<String> {
        lock(&self.signer).accounts.clone()
    }

    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError> {
        if !self.is_connected() {
            return Err(TransportError::new(4900, "Session disconnected"));
        }
        lock(&self.signer)
            .requests
            .push((method.to_string(), params.clone()));

        match method {
            ETH_CHAIN_ID => Ok(hex(lock(&self.signer).chain_id)),
            ETH_ACCOUNTS => Ok(json!(lock(&self.signer).accounts)),
            ETH_CALL => Ok(json!("0x")),
            WALLET_SWITCH_CHAIN => {
                let events = self.switch_chain(&params)?;
                for event in events {
                    self.emit(event);
                }
                Ok(Value::Null)
            }
            WALLET_ADD_CHAIN => {
                self.add_chain(&params)?;
                Ok(Value::Null)
            }
            other => Err(TransportError::new(
                4200,
                format!("Unsupported method: {other}"),
            )),
        }
    }

    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> Subscription {
        let handler_id = self.next_handler.fetch_add(1, Ordering::SeqCst);
        self.handlers().insert(handler_id, (kind, handler));

        let registry = Arc::downgrade(&self.handlers);
        Subscription::new(kind, move || {
            if let Some(handlers) = registry.upgrade() {
                lock_handlers(&handlers).remove(&handler_id);
            }
        })
    }

    async fn disconnect(&self) -> Result<(), TransportError> {
        self.connected.store(false, Ordering::SeqCst);
        let mut state = lock(&self.signer);
        state.disconnect_calls += 1;
        match state.disconnect_error.clone() {
            Some(err) => Err(err),
            None => Ok(()),
        }
    }
}
