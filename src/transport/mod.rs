//! Signer transport seam
//!
//! The remote signer (a wallet-connect style relay, an injected browser
//! wallet, or the in-memory signer) is consumed through two traits:
//! [`SignerTransport`] creates sessions, [`Session`] carries EIP-1193 style
//! requests and notifications.
//!
//! Notifications use a token-based subscription: `subscribe` returns a
//! [`Subscription`] and the handler stays registered until that token is
//! consumed or dropped.

pub mod memory;

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::Value;
use thiserror::Error;
use uuid::Uuid;

use crate::config::SessionConfig;

pub use memory::{MemorySigner, SwitchBehavior};

/// Wallet error code for a user-declined request (EIP-1193)
pub const USER_REJECTED_CODE: i64 = 4001;

/// Wallet error code for a chain the wallet does not know (EIP-3326)
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

/// Error reported by the signer transport
#[derive(Debug, Clone, Error, PartialEq, Eq)]
#[error("{message}")]
pub struct TransportError {
    /// Provider error code, if the wallet supplied one
    pub code: Option<i64>,
    pub message: String,
}

impl TransportError {
    pub fn new(code: i64, message: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            message: message.into(),
        }
    }

    /// Error without a provider code (relay failure, timeout, ...)
    pub fn other(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
        }
    }

    pub fn user_rejected() -> Self {
        Self::new(USER_REJECTED_CODE, "User rejected the request")
    }

    pub fn is_user_rejection(&self) -> bool {
        self.code == Some(USER_REJECTED_CODE)
    }

    /// Some wallets wrap 4902 in a generic internal error, so the message is
    /// checked as well.
    pub fn is_unrecognized_chain(&self) -> bool {
        self.code == Some(UNRECOGNIZED_CHAIN_CODE)
            || self.message.to_ascii_lowercase().contains("unrecognized chain")
    }
}

/// Notification kinds a session can emit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EventKind {
    AccountsChanged,
    ChainChanged,
    Disconnect,
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            EventKind::AccountsChanged => "accountsChanged",
            EventKind::ChainChanged => "chainChanged",
            EventKind::Disconnect => "disconnect",
        };
        f.write_str(name)
    }
}

/// Notification delivered by a session
#[derive(Debug, Clone, PartialEq)]
pub enum SessionEvent {
    /// New account list, empty when the wallet revoked access
    AccountsChanged(Vec<String>),
    /// Raw chain id payload (hex string, decimal string or number)
    ChainChanged(Value),
    /// The transport terminated the session
    Disconnected { reason: Option<String> },
}

impl SessionEvent {
    pub fn kind(&self) -> EventKind {
        match self {
            SessionEvent::AccountsChanged(_) => EventKind::AccountsChanged,
            SessionEvent::ChainChanged(_) => EventKind::ChainChanged,
            SessionEvent::Disconnected { .. } => EventKind::Disconnect,
        }
    }
}

/// Notification handler registered with a session
pub type EventHandler = Arc<dyn Fn(SessionEvent) + Send + Sync>;

/// Registration token returned by [`Session::subscribe`].
///
/// The unsubscribe callback runs exactly once: on [`Subscription::unsubscribe`]
/// or on drop, whichever comes first.
#[must_use = "dropping a Subscription unsubscribes the handler"]
pub struct Subscription {
    kind: EventKind,
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl Subscription {
    pub fn new(kind: EventKind, cancel: impl FnOnce() + Send + 'static) -> Self {
        Self {
            kind,
            cancel: Some(Box::new(cancel)),
        }
    }

    pub fn kind(&self) -> EventKind {
        self.kind
    }

    /// Remove the handler from the session
    pub fn unsubscribe(mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}

impl fmt::Debug for Subscription {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Subscription")
            .field("kind", &self.kind)
            .field("active", &self.cancel.is_some())
            .finish()
    }
}

/// An established connection to a remote signer
#[async_trait]
pub trait Session: Send + Sync {
    /// Identity of this session instance
    fn id(&self) -> Uuid;

    /// Whether the transport still considers the session live
    fn is_connected(&self) -> bool;

    /// Accounts the wallet exposed to this session
    fn accounts(&self) -> Vec<String>;

    /// Send an EIP-1193 request
    async fn request(&self, method: &str, params: Value) -> Result<Value, TransportError>;

    /// Register a notification handler
    fn subscribe(&self, kind: EventKind, handler: EventHandler) -> Subscription;

    /// Terminate the session at the transport level
    async fn disconnect(&self) -> Result<(), TransportError>;
}

/// Factory for signer sessions
#[async_trait]
pub trait SignerTransport: Send + Sync {
    async fn create_session(
        &self,
        config: &SessionConfig,
    ) -> Result<Arc<dyn Session>, TransportError>;
}
