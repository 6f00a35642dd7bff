//! Contract-call providers
//!
//! A [`Provider`] is an immutable snapshot bound to one session and one
//! committed chain. The [`ProviderFactory`] publishes a fresh snapshot every
//! time the committed chain changes and `None` once the session is gone.

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use serde_json::{json, Value};
use thiserror::Error;
use tokio::sync::watch;
use tracing::{debug, info};
use uuid::Uuid;

use crate::rpc;
use crate::transport::{Session, TransportError};

#[derive(Debug, Error)]
pub enum ProviderError {
    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("Wallet exposes no account")]
    NoSigner,

    #[error("Network changed: provider bound to chain {expected}, wallet on {actual}")]
    NetworkChanged { expected: u64, actual: u64 },
}

/// Account able to sign on the provider's chain
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Signer {
    pub address: String,
    pub chain_id: u64,
}

pub struct Provider {
    session: Arc<dyn Session>,
    chain_id: u64,
    generation: u64,
}

impl Provider {
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// Build counter of the factory that produced this snapshot
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn session_id(&self) -> Uuid {
        self.session.id()
    }

    pub async fn signer(&self) -> Result<Signer, ProviderError> {
        let accounts = self.session.request(rpc::ETH_ACCOUNTS, json!([])).await?;
        let address = accounts
            .get(0)
            .and_then(Value::as_str)
            .ok_or(ProviderError::NoSigner)?;
        Ok(Signer {
            address: address.to_string(),
            chain_id: self.chain_id,
        })
    }

    /// Read-only contract call at the latest block
    pub async fn call(&self, tx: Value) -> Result<Value, ProviderError> {
        Ok(self
            .session
            .request(rpc::ETH_CALL, json!([tx, "latest"]))
            .await?)
    }

    pub async fn request(&self, method: &str, params: Value) -> Result<Value, ProviderError> {
        Ok(self.session.request(method, params).await?)
    }

    /// Fail if the wallet moved off the chain this provider was built for
    pub async fn ensure_network(&self) -> Result<(), ProviderError> {
        let actual = rpc::chain_id(self.session.as_ref()).await?;
        if actual != self.chain_id {
            return Err(ProviderError::NetworkChanged {
                expected: self.chain_id,
                actual,
            });
        }
        Ok(())
    }
}

impl fmt::Debug for Provider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Provider")
            .field("session_id", &self.session.id())
            .field("chain_id", &self.chain_id)
            .field("generation", &self.generation)
            .finish()
    }
}

/// Publishes provider snapshots
pub struct ProviderFactory {
    current: watch::Sender<Option<Arc<Provider>>>,
    generation: AtomicU64,
}

impl ProviderFactory {
    pub fn new() -> Self {
        let (current, _) = watch::channel(None);
        Self {
            current,
            generation: AtomicU64::new(0),
        }
    }

    /// Publish a provider for `session` on `chain_id`
    pub fn build(&self, session: Arc<dyn Session>, chain_id: u64) -> Arc<Provider> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let provider = Arc::new(Provider {
            session,
            chain_id,
            generation,
        });
        info!(chain_id, generation, "Provider rebuilt");
        self.current.send_replace(Some(provider.clone()));
        provider
    }

    pub fn clear(&self) {
        if self.current.send_replace(None).is_some() {
            debug!("Provider cleared");
        }
    }

    pub fn current(&self) -> Option<Arc<Provider>> {
        self.current.borrow().clone()
    }

    pub fn subscribe(&self) -> watch::Receiver<Option<Arc<Provider>>> {
        self.current.subscribe()
    }

    /// Number of providers built so far
    pub fn generation(&self) -> u64 {
        self.generation.load(Ordering::SeqCst)
    }
}

impl Default for ProviderFactory {
    fn default() -> Self {
        Self::new()
    }
}
