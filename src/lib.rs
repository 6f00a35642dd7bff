//! vault-connect - wallet session and chain reconciliation for the vault client
//!
//! Owns the one live remote-signer session, forces it onto the target
//! network (Base), filters the signer's out-of-order chain notifications and
//! keeps a contract-call provider bound to the reconciled chain.
//!
//! ## Components
//!
//! - **Session**: session handle, lifecycle flags and the durable
//!   "was connected" flag
//! - **Reconciler**: target-chain state machine, debounce slot and the
//!   switch/add-chain protocol
//! - **Bridge**: attach-once subscriptions to session notifications
//! - **Provider**: contract-call provider snapshots rebuilt per chain commit
//! - **Connector**: the public API UI code calls

pub mod bridge;
pub mod chain;
pub mod config;
pub mod connector;
pub mod provider;
pub mod reconciler;
pub mod rpc;
pub mod session;
pub mod transport;
pub mod types;

pub use chain::ChainDescriptor;
pub use config::{Args, ConnectorConfig};
pub use connector::WalletConnector;
pub use types::{
    ConnectError, ConnectResult, ConnectionState, DisconnectResult, ErrorCode, NetworkStatus,
    Result, SwitchResult,
};
