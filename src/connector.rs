//! Wallet connector
//!
//! [`WalletConnector`] is the API UI code talks to. It owns the session
//! store, the chain reconciler, the notification bridge and the provider
//! factory, and publishes [`ConnectionState`] through a `watch` channel.
//!
//! Session notifications are handled inline by the handler the transport
//! invokes, so a stale echo emitted while the switch request is in flight is
//! filtered before `connect()` commits anything.

use std::sync::{Arc, Mutex, MutexGuard, PoisonError, Weak};

use serde_json::Value;
use tokio::sync::watch;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::bridge::EventBridge;
use crate::config::ConnectorConfig;
use crate::provider::{Provider, ProviderFactory};
use crate::reconciler::{switch_to, ChainReconciler, SwitchPolicy, Verdict};
use crate::rpc;
use crate::session::{ConnectingGuard, FlagStore, SessionStore};
use crate::transport::{EventHandler, Session, SessionEvent, SignerTransport};
use crate::types::{
    ConnectError, ConnectResult, ConnectionState, DisconnectResult, NetworkStatus, Result,
    SwitchResult,
};

/// Wallet connection and chain reconciliation manager
#[derive(Clone)]
pub struct WalletConnector {
    inner: Arc<Inner>,
}

struct Inner {
    config: ConnectorConfig,
    sessions: SessionStore,
    reconciler: Mutex<ChainReconciler>,
    bridge: Mutex<EventBridge>,
    providers: ProviderFactory,
    state: watch::Sender<ConnectionState>,
}

impl WalletConnector {
    pub fn new(
        config: ConnectorConfig,
        transport: Arc<dyn SignerTransport>,
        flags: Arc<dyn FlagStore>,
    ) -> Self {
        let sessions = SessionStore::new(
            transport,
            flags,
            config.flag_key.clone(),
            config.session_config(),
        );
        let (state, _) = watch::channel(ConnectionState::default());
        Self {
            inner: Arc::new(Inner {
                reconciler: Mutex::new(ChainReconciler::new(config.debounce())),
                bridge: Mutex::new(EventBridge::new()),
                providers: ProviderFactory::new(),
                sessions,
                state,
                config,
            }),
        }
    }

    pub fn config(&self) -> &ConnectorConfig {
        &self.inner.config
    }

    /// Snapshot of the reactive connection state
    pub fn state(&self) -> ConnectionState {
        self.inner.state.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<ConnectionState> {
        self.inner.state.subscribe()
    }

    pub fn network_status(&self) -> NetworkStatus {
        self.state().network_status(self.inner.config.target.chain_id)
    }

    /// Current contract-call provider, `None` while disconnected
    pub fn provider(&self) -> Option<Arc<Provider>> {
        self.inner.providers.current()
    }

    pub fn providers(&self) -> &ProviderFactory {
        &self.inner.providers
    }

    /// Live session, if any
    pub fn session(&self) -> Option<Arc<dyn Session>> {
        self.inner.sessions.current()
    }

    /// Whether the durable "was connected" flag is set
    pub fn was_connected(&self) -> bool {
        self.inner.sessions.was_connected()
    }

    /// Committed chain as seen by the reconciler
    pub fn committed_chain(&self) -> Option<u64> {
        self.inner.reconciler().last_observed()
    }

    /// Connect the wallet and force it onto the target network.
    ///
    /// A failed or rejected switch does not fail the connection; the session
    /// stays connected on whatever chain the wallet reports.
    pub async fn connect(&self) -> ConnectResult {
        let inner = &self.inner;

        if let Some(result) = inner.already_connected() {
            return result;
        }

        let guard = match inner.sessions.begin_connect() {
            Ok(guard) => guard,
            Err(e) => {
                debug!("Connect already in flight");
                return ConnectResult::failed(&e);
            }
        };
        inner.state.send_modify(|s| s.connecting = true);

        let result = inner.establish(&guard).await;
        inner.state.send_modify(|s| s.connecting = false);
        drop(guard);

        match result {
            Ok((address, chain_id)) => ConnectResult::connected(address, Some(chain_id)),
            Err(e) => {
                warn!(error = %e, "Connect failed");
                ConnectResult::failed(&e)
            }
        }
    }

    /// Disconnect at the transport and clear all local state. Never fails.
    pub async fn disconnect(&self) -> DisconnectResult {
        let inner = &self.inner;
        let from = inner.sessions.lifecycle();
        inner.bridge().detach();
        inner.reconciler().reset();
        inner.sessions.release().await;
        inner.providers.clear();
        inner.state.send_replace(ConnectionState::default());
        info!(from = ?from, "Wallet disconnected");

        DisconnectResult {
            success: true,
            message: "Wallet disconnected".to_string(),
        }
    }

    /// Ask the wallet to move onto the target network
    pub async fn switch_to_base(&self) -> SwitchResult {
        let inner = &self.inner;
        let target = &inner.config.target;

        let Some(session) = inner.sessions.current() else {
            return SwitchResult::failed(&ConnectError::NotConnected);
        };
        let prior = inner.state.borrow().chain_id;
        if prior == Some(target.chain_id) && inner.providers.current().is_some() {
            return SwitchResult::switched(format!("Already on {}", target.chain_name));
        }

        inner.reconciler().request_switch(target.chain_id, prior);
        inner.state.send_modify(|s| s.switching_network = true);

        let outcome = switch_to(session.as_ref(), target, &inner.policy()).await;
        if !inner.is_current(&session) {
            warn!(target = target.chain_id, "Session ended during network switch");
            return SwitchResult::failed(&ConnectError::NotConnected);
        }

        match outcome {
            Ok(_) => {
                inner.settle(&session, target.chain_id);
                SwitchResult::switched(format!("Switched to {}", target.chain_name))
            }
            Err(e) => {
                warn!(error = %e, target = target.chain_id, "Switch to target failed");
                inner.reconciler().abandon_switch();
                let active = inner.active_chain(session.as_ref(), prior).await;
                if !inner.is_current(&session) {
                    return SwitchResult::failed(&ConnectError::NotConnected);
                }
                if let Some(chain) = active {
                    inner.settle(&session, chain);
                } else {
                    inner.state.send_modify(|s| s.switching_network = false);
                }
                SwitchResult::failed(&ConnectError::from(e))
            }
        }
    }

    /// Reconnect once if a previous process left the connection flag set.
    ///
    /// Returns `None` when there was nothing to restore.
    pub async fn auto_reconnect(&self) -> Option<ConnectResult> {
        let inner = &self.inner;
        if inner.sessions.is_connecting() {
            debug!("Connect already in flight, skipping auto-reconnect");
            return None;
        }
        if !inner.sessions.was_connected() || inner.state.borrow().is_connected {
            return None;
        }

        info!("Restoring previous wallet connection");
        let result = self.connect().await;
        if !result.success {
            warn!(error = ?result.error, "Auto-reconnect failed, clearing connection flag");
            inner.sessions.clear_flag();
        }
        Some(result)
    }
}

impl Inner {
    fn reconciler(&self) -> MutexGuard<'_, ChainReconciler> {
        self.reconciler.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn bridge(&self) -> MutexGuard<'_, EventBridge> {
        self.bridge.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn policy(&self) -> SwitchPolicy {
        SwitchPolicy::from_config(&self.config)
    }

    fn already_connected(&self) -> Option<ConnectResult> {
        self.sessions.current()?;
        let state = self.state.borrow();
        match (&state.wallet_address, state.is_connected) {
            (Some(address), true) => {
                Some(ConnectResult::connected(address.clone(), state.chain_id))
            }
            _ => None,
        }
    }

    async fn establish(
        self: &Arc<Self>,
        guard: &ConnectingGuard<'_>,
    ) -> Result<(String, u64)> {
        let session = self.sessions.acquire(guard).await?;
        let session_id = session.id();

        let Some(address) = session.accounts().into_iter().next() else {
            self.sessions.release().await;
            return Err(ConnectError::ConnectionFailed(
                "Wallet exposed no accounts".to_string(),
            ));
        };

        let initial = match rpc::chain_id(session.as_ref()).await {
            Ok(chain) => chain,
            Err(e) => {
                self.sessions.release().await;
                return Err(e.into());
            }
        };
        info!(%session_id, chain_id = initial, "Session connected");

        self.bridge().attach(session.as_ref(), self.handler(session_id));

        let target = &self.config.target;
        let active = if initial == target.chain_id {
            initial
        } else {
            self.reconciler().request_switch(target.chain_id, Some(initial));
            self.state.send_modify(|s| s.switching_network = true);

            match switch_to(session.as_ref(), target, &self.policy()).await {
                Ok(outcome) => outcome.chain_id,
                Err(e) => {
                    warn!(
                        %session_id,
                        error = %e,
                        "Could not move wallet onto target network, continuing"
                    );
                    self.reconciler().abandon_switch();
                    self.active_chain(session.as_ref(), Some(initial))
                        .await
                        .unwrap_or(initial)
                }
            }
        };

        // Terminated while the switch was in flight
        if !self.is_current(&session) {
            return Err(ConnectError::ConnectionFailed(
                "Session ended during connect".to_string(),
            ));
        }

        self.reconciler().settle_now(active);
        self.providers.build(session.clone(), active);
        self.state.send_replace(ConnectionState {
            wallet_address: Some(address.clone()),
            is_connected: true,
            connecting: true,
            chain_id: Some(active),
            switching_network: false,
        });
        if let Err(e) = self.sessions.persist_flag() {
            warn!(error = %e, "Could not persist connection flag");
        }

        Ok((address, active))
    }

    /// Whether `session` is still the one the store holds
    fn is_current(&self, session: &Arc<dyn Session>) -> bool {
        self.sessions.session_id() == Some(session.id())
    }

    /// Chain the wallet reports now, falling back to `fallback`
    async fn active_chain(&self, session: &dyn Session, fallback: Option<u64>) -> Option<u64> {
        match rpc::chain_id(session).await {
            Ok(chain) => Some(chain),
            Err(e) => {
                debug!(error = %e, "Chain id query failed, keeping last known chain");
                fallback
            }
        }
    }

    /// Commit `chain` now and rebuild the provider if it moved
    fn settle(&self, session: &Arc<dyn Session>, chain: u64) {
        self.reconciler().settle_now(chain);
        self.publish_chain(session, chain);
    }

    fn publish_chain(&self, session: &Arc<dyn Session>, chain: u64) {
        let stale = self
            .providers
            .current()
            .map_or(true, |p| p.chain_id() != chain || p.session_id() != session.id());
        if stale {
            self.providers.build(session.clone(), chain);
        }
        self.state.send_modify(|s| {
            s.chain_id = Some(chain);
            s.switching_network = false;
        });
    }

    fn handler(self: &Arc<Self>, session_id: Uuid) -> EventHandler {
        let weak = Arc::downgrade(self);
        Arc::new(move |event: SessionEvent| {
            if let Some(inner) = weak.upgrade() {
                inner.on_session_event(session_id, event);
            }
        })
    }

    fn on_session_event(self: &Arc<Self>, session_id: Uuid, event: SessionEvent) {
        let attached = self.bridge().is_attached_to(session_id);
        if !attached || self.sessions.session_id() != Some(session_id) {
            debug!(%session_id, kind = %event.kind(), "Ignoring event from inactive session");
            return;
        }

        match event {
            SessionEvent::AccountsChanged(accounts) => match accounts.into_iter().next() {
                Some(address) => {
                    debug!(%session_id, %address, "Account changed");
                    self.state.send_if_modified(|s| {
                        if !s.is_connected || s.wallet_address.as_deref() == Some(address.as_str()) {
                            return false;
                        }
                        s.wallet_address = Some(address);
                        true
                    });
                }
                None => {
                    info!(%session_id, "Wallet revoked accounts, ending session");
                    if let Some(session) = self.terminate() {
                        request_disconnect(session);
                    }
                }
            },
            SessionEvent::ChainChanged(raw) => self.on_chain_changed(session_id, &raw),
            SessionEvent::Disconnected { reason } => {
                info!(%session_id, reason = ?reason, "Session terminated by transport");
                self.terminate();
            }
        }
    }

    fn on_chain_changed(self: &Arc<Self>, session_id: Uuid, raw: &Value) {
        let Some(chain) = rpc::parse_chain_id(raw) else {
            warn!(%session_id, payload = %raw, "Malformed chain id in notification, dropped");
            return;
        };

        let mut reconciler = self.reconciler();
        match reconciler.observe(chain) {
            Verdict::Settle { chain, ticket } => {
                debug!(%session_id, chain_id = chain, "Chain changed, settling");
                let weak: Weak<Inner> = Arc::downgrade(self);
                reconciler.schedule_commit(move || {
                    if let Some(inner) = weak.upgrade() {
                        inner.commit_settled(session_id, ticket);
                    }
                });
            }
            Verdict::Reverted { chain } => {
                debug!(%session_id, chain_id = chain, "Chain returned to committed value");
            }
            verdict => debug!(%session_id, ?verdict, "Chain notification filtered"),
        }
    }

    fn commit_settled(&self, session_id: Uuid, ticket: u64) {
        let Some(session) = self.sessions.current().filter(|s| s.id() == session_id) else {
            return;
        };
        let Some(chain) = self.reconciler().commit(ticket) else {
            return;
        };
        info!(%session_id, chain_id = chain, "Chain committed");
        self.publish_chain(&session, chain);
    }

    /// Local teardown after the transport ended the session
    fn terminate(&self) -> Option<Arc<dyn Session>> {
        self.bridge().detach();
        self.reconciler().reset();
        let session = self.sessions.forget();
        self.providers.clear();
        self.state.send_replace(ConnectionState::default());
        session
    }
}

/// Best-effort transport disconnect off the notification path
fn request_disconnect(session: Arc<dyn Session>) {
    let Ok(runtime) = tokio::runtime::Handle::try_current() else {
        return;
    };
    runtime.spawn(async move {
        if let Err(e) = session.disconnect().await {
            debug!(session_id = %session.id(), error = %e, "Transport disconnect after revoke failed");
        }
    });
}
