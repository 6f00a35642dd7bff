//! Session store
//!
//! Holds the single live signer session. A second session never coexists
//! with the first: acquiring reuses the live one, and a new one is only
//! requested from the transport while a [`ConnectingGuard`] is held.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tracing::{debug, info, warn};
use uuid::Uuid;

use super::durable::{FlagStore, StoreError};
use crate::config::SessionConfig;
use crate::transport::{Session, SignerTransport};
use crate::types::ConnectError;

/// Value written under the durable flag key
const FLAG_SET: &str = "true";

/// Coarse session lifecycle
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Lifecycle {
    Idle,
    Connecting,
    Connected,
    Disconnecting,
}

struct Slot {
    session: Option<Arc<dyn Session>>,
    lifecycle: Lifecycle,
}

/// Owner of the live signer session
pub struct SessionStore {
    transport: Arc<dyn SignerTransport>,
    flags: Arc<dyn FlagStore>,
    flag_key: String,
    session_config: SessionConfig,
    slot: Mutex<Slot>,
    connecting: AtomicBool,
}

/// Proof that the holder is the only connect attempt in flight.
///
/// Dropping the guard ends the attempt.
pub struct ConnectingGuard<'a> {
    store: &'a SessionStore,
}

impl Drop for ConnectingGuard<'_> {
    fn drop(&mut self) {
        let mut slot = self.store.slot();
        if slot.lifecycle == Lifecycle::Connecting {
            slot.lifecycle = if slot.session.is_some() {
                Lifecycle::Connected
            } else {
                Lifecycle::Idle
            };
        }
        drop(slot);
        self.store.connecting.store(false, Ordering::SeqCst);
    }
}

impl SessionStore {
    pub fn new(
        transport: Arc<dyn SignerTransport>,
        flags: Arc<dyn FlagStore>,
        flag_key: impl Into<String>,
        session_config: SessionConfig,
    ) -> Self {
        Self {
            transport,
            flags,
            flag_key: flag_key.into(),
            session_config,
            slot: Mutex::new(Slot {
                session: None,
                lifecycle: Lifecycle::Idle,
            }),
            connecting: AtomicBool::new(false),
        }
    }

    fn slot(&self) -> MutexGuard<'_, Slot> {
        self.slot.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start a connect attempt, failing fast if one is already running
    pub fn begin_connect(&self) -> Result<ConnectingGuard<'_>, ConnectError> {
        self.connecting
            .compare_exchange(false, true, Ordering::SeqCst, Ordering::SeqCst)
            .map_err(|_| ConnectError::AlreadyConnecting)?;
        Ok(ConnectingGuard { store: self })
    }

    /// Return the live session, or create one through the transport
    pub async fn acquire(
        &self,
        _guard: &ConnectingGuard<'_>,
    ) -> Result<Arc<dyn Session>, ConnectError> {
        {
            let mut locked = self.slot();
            let slot = &mut *locked;
            if let Some(session) = slot.session.as_ref() {
                if session.is_connected() {
                    debug!(session_id = %session.id(), "Reusing live session");
                    slot.lifecycle = Lifecycle::Connected;
                    return Ok(session.clone());
                }
                debug!(session_id = %session.id(), "Dropping dead session before reconnect");
                slot.session = None;
            }
            slot.lifecycle = Lifecycle::Connecting;
        }

        match self.transport.create_session(&self.session_config).await {
            Ok(session) => {
                info!(session_id = %session.id(), "Signer session established");
                let mut slot = self.slot();
                slot.session = Some(session.clone());
                slot.lifecycle = Lifecycle::Connected;
                Ok(session)
            }
            Err(e) => {
                warn!(code = ?e.code, error = %e, "Signer session creation failed");
                self.slot().lifecycle = Lifecycle::Idle;
                Err(ConnectError::from_session_error(e))
            }
        }
    }

    /// Disconnect at the transport level and clear everything.
    ///
    /// Local state is cleared even when the transport call fails. Calling
    /// this with no session is a no-op success.
    pub async fn release(&self) {
        let session = {
            let mut slot = self.slot();
            if slot.session.is_some() {
                slot.lifecycle = Lifecycle::Disconnecting;
            }
            slot.session.clone()
        };

        if let Some(session) = session {
            if let Err(e) = session.disconnect().await {
                warn!(session_id = %session.id(), error = %e, "Transport disconnect failed, clearing anyway");
            } else {
                info!(session_id = %session.id(), "Signer session disconnected");
            }
        }

        self.forget();
    }

    /// Clear the session without calling the transport.
    ///
    /// Used when the transport itself reported termination. Returns the
    /// detached handle, if any.
    pub fn forget(&self) -> Option<Arc<dyn Session>> {
        let session = {
            let mut slot = self.slot();
            slot.lifecycle = Lifecycle::Idle;
            slot.session.take()
        };
        self.clear_flag();
        session
    }

    /// Live session, if connected
    pub fn current(&self) -> Option<Arc<dyn Session>> {
        self.slot()
            .session
            .as_ref()
            .filter(|s| s.is_connected())
            .cloned()
    }

    /// Identity of the stored session, live or not
    pub fn session_id(&self) -> Option<Uuid> {
        self.slot().session.as_ref().map(|s| s.id())
    }

    pub fn lifecycle(&self) -> Lifecycle {
        self.slot().lifecycle
    }

    pub fn is_connecting(&self) -> bool {
        self.connecting.load(Ordering::SeqCst)
    }

    /// Record a successful connection for the next process
    pub fn persist_flag(&self) -> Result<(), StoreError> {
        self.flags.set(&self.flag_key, FLAG_SET)
    }

    /// Whether a previous process left the "was connected" flag behind
    pub fn was_connected(&self) -> bool {
        match self.flags.get(&self.flag_key) {
            Ok(value) => value.as_deref() == Some(FLAG_SET),
            Err(e) => {
                warn!(error = %e, "Could not read connection flag");
                false
            }
        }
    }

    pub fn clear_flag(&self) {
        if let Err(e) = self.flags.remove(&self.flag_key) {
            warn!(error = %e, "Could not clear connection flag");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::session::MemoryFlagStore;
    use crate::transport::{MemorySigner, TransportError};

    fn store_with(signer: &MemorySigner) -> (SessionStore, Arc<MemoryFlagStore>) {
        let flags = Arc::new(MemoryFlagStore::new());
        let store = SessionStore::new(
            Arc::new(signer.clone()),
            flags.clone(),
            "wallet_connected",
            SessionConfig::default(),
        );
        (store, flags)
    }

    #[tokio::test]
    async fn test_acquire_creates_then_reuses() {
        let signer = MemorySigner::new(1);
        let (store, _) = store_with(&signer);

        let guard = store.begin_connect().unwrap();
        let first = store.acquire(&guard).await.unwrap();
        let second = store.acquire(&guard).await.unwrap();
        drop(guard);

        assert_eq!(first.id(), second.id());
        assert_eq!(signer.sessions_created(), 1);
        assert_eq!(store.lifecycle(), Lifecycle::Connected);
    }

    #[tokio::test]
    async fn test_acquire_replaces_dead_session() {
        let signer = MemorySigner::new(1);
        let (store, _) = store_with(&signer);

        let guard = store.begin_connect().unwrap();
        let first = store.acquire(&guard).await.unwrap();
        first.disconnect().await.unwrap();
        assert!(store.current().is_none());

        let second = store.acquire(&guard).await.unwrap();
        drop(guard);

        assert_ne!(first.id(), second.id());
        assert_eq!(store.session_id(), Some(second.id()));
        assert_eq!(signer.sessions_created(), 2);
        assert_eq!(store.lifecycle(), Lifecycle::Connected);
    }

    #[tokio::test]
    async fn test_second_begin_fails_fast() {
        let signer = MemorySigner::new(1);
        let (store, _) = store_with(&signer);

        let guard = store.begin_connect().unwrap();
        assert!(matches!(
            store.begin_connect(),
            Err(ConnectError::AlreadyConnecting)
        ));
        drop(guard);
        assert!(store.begin_connect().is_ok());
    }

    #[tokio::test]
    async fn test_acquire_failure_resets_lifecycle() {
        let signer = MemorySigner::new(1);
        signer.fail_sessions_with(TransportError::user_rejected());
        let (store, _) = store_with(&signer);

        let guard = store.begin_connect().unwrap();
        let err = store.acquire(&guard).await.err().unwrap();
        drop(guard);

        assert!(matches!(err, ConnectError::UserRejected(_)));
        assert_eq!(store.lifecycle(), Lifecycle::Idle);
        assert!(store.current().is_none());
    }

    #[tokio::test]
    async fn test_release_clears_even_when_transport_fails() {
        let signer = MemorySigner::new(1);
        signer.fail_disconnect_with(TransportError::other("relay gone"));
        let (store, flags) = store_with(&signer);

        let guard = store.begin_connect().unwrap();
        store.acquire(&guard).await.unwrap();
        drop(guard);
        store.persist_flag().unwrap();
        assert!(store.was_connected());

        store.release().await;

        assert!(store.current().is_none());
        assert!(store.session_id().is_none());
        assert_eq!(store.lifecycle(), Lifecycle::Idle);
        assert_eq!(flags.get("wallet_connected").unwrap(), None);
    }

    #[tokio::test]
    async fn test_release_without_session_is_noop() {
        let signer = MemorySigner::new(1);
        let (store, _) = store_with(&signer);

        store.release().await;
        store.release().await;

        assert_eq!(store.lifecycle(), Lifecycle::Idle);
        assert_eq!(signer.disconnect_calls(), 0);
    }

    #[tokio::test]
    async fn test_forget_skips_transport() {
        let signer = MemorySigner::new(1);
        let (store, _) = store_with(&signer);

        let guard = store.begin_connect().unwrap();
        let session = store.acquire(&guard).await.unwrap();
        drop(guard);

        let detached = store.forget().unwrap();
        assert_eq!(detached.id(), session.id());
        assert_eq!(signer.disconnect_calls(), 0);
        assert!(store.current().is_none());
    }
}
