//! Switch protocol
//!
//! `wallet_switchEthereumChain`, falling back to `wallet_addEthereumChain`
//! when the wallet does not know the chain, then a bounded `eth_chainId`
//! poll until the wallet reports the target.

use std::time::Duration;

use thiserror::Error;
use tracing::{debug, info, warn};

use crate::chain::ChainDescriptor;
use crate::config::ConnectorConfig;
use crate::rpc;
use crate::transport::{Session, TransportError};

/// Confirmation poll bounds
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchPolicy {
    pub attempts: u32,
    pub interval: Duration,
}

impl SwitchPolicy {
    pub fn from_config(config: &ConnectorConfig) -> Self {
        Self {
            attempts: config.switch_poll_attempts.max(1),
            interval: config.switch_poll_interval(),
        }
    }
}

impl Default for SwitchPolicy {
    fn default() -> Self {
        Self::from_config(&ConnectorConfig::default())
    }
}

/// Confirmed switch
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SwitchOutcome {
    pub chain_id: u64,
    /// The chain had to be added to the wallet first
    pub added: bool,
}

#[derive(Debug, Error)]
pub enum SwitchError {
    #[error("User rejected network switch: {0}")]
    UserRejected(String),

    #[error("Failed to add network: {0}")]
    ChainAddFailed(String),

    #[error("Wallet did not confirm chain {target} (last seen {observed:?})")]
    Unconfirmed { target: u64, observed: Option<u64> },

    #[error("Switch request failed: {0}")]
    Transport(TransportError),
}

/// Move `session` onto `target` and wait until the wallet confirms it
pub async fn switch_to(
    session: &dyn Session,
    target: &ChainDescriptor,
    policy: &SwitchPolicy,
) -> Result<SwitchOutcome, SwitchError> {
    let chain_id = target.chain_id;
    let mut added = false;

    match rpc::switch_chain(session, target).await {
        Ok(()) => {}
        Err(e) if e.is_user_rejection() => return Err(SwitchError::UserRejected(e.message)),
        Err(e) if e.is_unrecognized_chain() => {
            info!(chain_id, chain_name = %target.chain_name, "Wallet does not know chain, adding it");
            rpc::add_chain(session, target).await.map_err(|e| {
                if e.is_user_rejection() {
                    SwitchError::UserRejected(e.message)
                } else {
                    SwitchError::ChainAddFailed(e.message)
                }
            })?;
            added = true;

            rpc::switch_chain(session, target).await.map_err(|e| {
                if e.is_user_rejection() {
                    SwitchError::UserRejected(e.message)
                } else {
                    SwitchError::Transport(e)
                }
            })?;
        }
        Err(e) => return Err(SwitchError::Transport(e)),
    }

    confirm(session, chain_id, policy).await?;
    info!(chain_id, added, "Switch confirmed");
    Ok(SwitchOutcome { chain_id, added })
}

async fn confirm(
    session: &dyn Session,
    target: u64,
    policy: &SwitchPolicy,
) -> Result<(), SwitchError> {
    let mut observed = None;
    for attempt in 1..=policy.attempts {
        match rpc::chain_id(session).await {
            Ok(chain) if chain == target => return Ok(()),
            Ok(chain) => {
                debug!(attempt, chain, target, "Wallet not on target yet");
                observed = Some(chain);
            }
            Err(e) => debug!(attempt, error = %e, "Chain id check failed"),
        }
        if attempt < policy.attempts {
            tokio::time::sleep(policy.interval).await;
        }
    }
    warn!(target, observed = ?observed, attempts = policy.attempts, "Switch not confirmed");
    Err(SwitchError::Unconfirmed { target, observed })
}
