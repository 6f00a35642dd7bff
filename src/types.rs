//! Shared types: errors, result objects and the reactive connection state

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::reconciler::SwitchError;
use crate::transport::TransportError;

/// Connector error
#[derive(Debug, Error)]
pub enum ConnectError {
    /// A connect attempt is already in flight
    #[error("Connection already in progress")]
    AlreadyConnecting,

    /// The wallet declined a connection, switch or add-chain request
    #[error("User rejected the request: {0}")]
    UserRejected(String),

    /// The add-chain request itself failed
    #[error("Failed to add network: {0}")]
    ChainAddFailed(String),

    /// The switch could not be confirmed
    #[error("Network not supported: {0}")]
    ChainNotSupported(String),

    /// Session creation failed
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// Operation needs a live session
    #[error("Wallet not connected")]
    NotConnected,

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),
}

impl ConnectError {
    pub fn code(&self) -> ErrorCode {
        match self {
            ConnectError::AlreadyConnecting => ErrorCode::AlreadyConnecting,
            ConnectError::UserRejected(_) => ErrorCode::UserRejected,
            ConnectError::ChainAddFailed(_) => ErrorCode::ChainAddFailed,
            ConnectError::ChainNotSupported(_) => ErrorCode::ChainNotSupported,
            ConnectError::NotConnected => ErrorCode::NotConnected,
            ConnectError::ConnectionFailed(_) | ConnectError::Transport(_) => {
                ErrorCode::ConnectionFailed
            }
        }
    }

    /// Classify a session creation failure
    pub fn from_session_error(err: TransportError) -> Self {
        if err.is_user_rejection() {
            ConnectError::UserRejected(err.message)
        } else {
            ConnectError::ConnectionFailed(err.message)
        }
    }
}

impl From<SwitchError> for ConnectError {
    fn from(err: SwitchError) -> Self {
        match err {
            SwitchError::UserRejected(msg) => ConnectError::UserRejected(msg),
            SwitchError::ChainAddFailed(msg) => ConnectError::ChainAddFailed(msg),
            SwitchError::Unconfirmed { target, observed } => {
                ConnectError::ChainNotSupported(match observed {
                    Some(chain) => format!(
                        "Wallet stayed on chain {chain}, please switch to chain {target} manually"
                    ),
                    None => format!("Could not confirm chain {target}, please switch manually"),
                })
            }
            SwitchError::Transport(e) => ConnectError::ChainNotSupported(e.message),
        }
    }
}

/// Result type for connector operations
pub type Result<T> = std::result::Result<T, ConnectError>;

/// Error codes surfaced in result objects
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    AlreadyConnecting,
    UserRejected,
    ChainAddFailed,
    ChainNotSupported,
    ConnectionFailed,
    NotConnected,
}

/// Outcome of `connect()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub address: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub chain_id: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ConnectResult {
    pub fn connected(address: String, chain_id: Option<u64>) -> Self {
        Self {
            success: true,
            address: Some(address),
            chain_id,
            error: None,
            message: None,
        }
    }

    pub fn failed(err: &ConnectError) -> Self {
        Self {
            success: false,
            address: None,
            chain_id: None,
            error: Some(err.code()),
            message: Some(err.to_string()),
        }
    }
}

/// Outcome of `disconnect()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DisconnectResult {
    pub success: bool,
    pub message: String,
}

/// Outcome of `switch_to_base()`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SwitchResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<ErrorCode>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl SwitchResult {
    pub fn switched(message: impl Into<String>) -> Self {
        Self {
            success: true,
            error: None,
            message: Some(message.into()),
        }
    }

    pub fn failed(err: &ConnectError) -> Self {
        Self {
            success: false,
            error: Some(err.code()),
            message: Some(err.to_string()),
        }
    }
}

/// Reactive connection state read by UI consumers
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ConnectionState {
    pub wallet_address: Option<String>,
    pub is_connected: bool,
    pub connecting: bool,
    pub chain_id: Option<u64>,
    pub switching_network: bool,
}

/// Where the session sits relative to the target network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum NetworkStatus {
    Disconnected,
    OnTarget,
    /// Connected but not confirmed on the target (degraded mode)
    WrongNetwork,
}

impl ConnectionState {
    pub fn network_status(&self, target_chain: u64) -> NetworkStatus {
        if !self.is_connected {
            NetworkStatus::Disconnected
        } else if self.chain_id == Some(target_chain) {
            NetworkStatus::OnTarget
        } else {
            NetworkStatus::WrongNetwork
        }
    }

    /// `0x1234...abcd` form of the wallet address
    pub fn short_address(&self) -> Option<String> {
        let address = self.wallet_address.as_deref()?;
        if address.len() <= 10 || !address.is_ascii() {
            return Some(address.to_string());
        }
        Some(format!("{}...{}", &address[..6], &address[address.len() - 4..]))
    }
}
