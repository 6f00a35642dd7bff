//! Configuration for vault-connect
//!
//! Two layers: [`ConnectorConfig`] is the TOML-backed connector
//! configuration (target network, reconciliation timings, session
//! metadata), and [`Args`] is the clap command line of the binary.

use std::path::{Path, PathBuf};
use std::time::Duration;

use clap::{Parser, Subcommand};
use serde::{Deserialize, Serialize};

use crate::chain::ChainDescriptor;

/// Connector configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ConnectorConfig {
    /// Network the session is forced onto
    #[serde(default)]
    pub target: ChainDescriptor,

    /// Window that coalesces chain-changed notifications
    #[serde(default = "default_debounce_ms")]
    pub debounce_ms: u64,

    /// Chain id checks after a switch request before giving up
    #[serde(default = "default_poll_attempts")]
    pub switch_poll_attempts: u32,

    /// Delay between chain id checks
    #[serde(default = "default_poll_interval_ms")]
    pub switch_poll_interval_ms: u64,

    /// Durable storage key for the "was connected" flag
    #[serde(default = "default_flag_key")]
    pub flag_key: String,

    #[serde(default)]
    pub session: SessionConfig,
}

/// Parameters handed to the signer transport when creating a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Relay project id (wallet-connect style transports)
    #[serde(default)]
    pub project_id: Option<String>,

    /// Chains the wallet must support, target chain always included
    #[serde(default)]
    pub required_chains: Vec<u64>,

    /// Chains the wallet may additionally expose
    #[serde(default)]
    pub optional_chains: Vec<u64>,

    /// Show the pairing QR modal
    #[serde(default = "default_true")]
    pub show_qr_modal: bool,

    #[serde(default)]
    pub metadata: AppMetadata,
}

/// Application metadata shown by the wallet during pairing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppMetadata {
    pub name: String,
    pub description: String,
    pub url: String,
    #[serde(default)]
    pub icons: Vec<String>,
}

impl Default for AppMetadata {
    fn default() -> Self {
        Self {
            name: "Vault".to_string(),
            description: "Stablecoin yield vault on Base".to_string(),
            url: "http://localhost:3000".to_string(),
            icons: Vec::new(),
        }
    }
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            project_id: None,
            required_chains: vec![crate::chain::BASE_CHAIN_ID],
            optional_chains: Vec::new(),
            show_qr_modal: true,
            metadata: AppMetadata::default(),
        }
    }
}

// Defaults
fn default_debounce_ms() -> u64 { 100 }
fn default_poll_attempts() -> u32 { 5 }
fn default_poll_interval_ms() -> u64 { 300 }
fn default_flag_key() -> String { "wallet_connected".to_string() }
fn default_true() -> bool { true }

impl Default for ConnectorConfig {
    fn default() -> Self {
        Self {
            target: ChainDescriptor::base_mainnet(),
            debounce_ms: default_debounce_ms(),
            switch_poll_attempts: default_poll_attempts(),
            switch_poll_interval_ms: default_poll_interval_ms(),
            flag_key: default_flag_key(),
            session: SessionConfig::default(),
        }
    }
}

impl ConnectorConfig {
    /// Load from a TOML file, falling back to defaults when it does not exist
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if !path.exists() {
            tracing::info!("Config file {} not found, using defaults", path.display());
            return Ok(Self::default());
        }
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        config.validate().map_err(anyhow::Error::msg)?;
        Ok(config)
    }

    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }

    pub fn switch_poll_interval(&self) -> Duration {
        Duration::from_millis(self.switch_poll_interval_ms)
    }

    /// Session parameters with the target chain guaranteed in `required_chains`
    pub fn session_config(&self) -> SessionConfig {
        let mut session = self.session.clone();
        if !session.required_chains.contains(&self.target.chain_id) {
            session.required_chains.insert(0, self.target.chain_id);
        }
        session
    }

    /// Validate configuration
    pub fn validate(&self) -> Result<(), String> {
        if self.target.chain_id == 0 {
            return Err("target.chain_id must be non-zero".to_string());
        }
        if self.target.rpc_urls.is_empty() {
            return Err("target.rpc_urls must list at least one endpoint".to_string());
        }
        if self.switch_poll_attempts == 0 {
            return Err("switch_poll_attempts must be at least 1".to_string());
        }
        if self.flag_key.trim().is_empty() {
            return Err("flag_key must not be empty".to_string());
        }
        Ok(())
    }
}

/// vault-connect - wallet session manager for the vault client
#[derive(Parser, Debug, Clone)]
#[command(name = "vault-connect")]
#[command(about = "Connect a wallet session and reconcile it onto Base")]
pub struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "VAULT_CONNECT_CONFIG", default_value = "vault-connect.toml")]
    pub config: PathBuf,

    /// Directory holding the durable connection flag
    #[arg(long, env = "VAULT_CONNECT_DATA_DIR", default_value = ".vault-connect")]
    pub data_dir: PathBuf,

    /// Log level (trace, debug, info, warn, error)
    #[arg(long, env = "LOG_LEVEL", default_value = "info")]
    pub log_level: String,

    /// Simulated wallet configuration
    #[command(flatten)]
    pub wallet: SimulatedWalletArgs,

    #[command(subcommand)]
    pub command: Command,
}

/// Behaviour of the in-memory signer the binary connects to
#[derive(Parser, Debug, Clone)]
pub struct SimulatedWalletArgs {
    /// Chain the simulated wallet starts on
    #[arg(long, env = "WALLET_CHAIN_ID", default_value = "1")]
    pub wallet_chain_id: u64,

    /// Account exposed by the simulated wallet
    #[arg(
        long,
        env = "WALLET_ACCOUNT",
        default_value = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed"
    )]
    pub wallet_account: String,

    /// Wallet declines switch requests
    #[arg(long, default_value = "false")]
    pub reject_switch: bool,

    /// Wallet does not know the target chain until it is added
    #[arg(long, default_value = "false")]
    pub unknown_chain: bool,

    /// Wallet declines the session itself
    #[arg(long, default_value = "false")]
    pub reject_session: bool,
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Connect (or auto-reconnect) and print the result
    Connect,
    /// Connect, then switch to the target network on demand
    Switch,
    /// Disconnect and clear the durable flag
    Disconnect,
    /// Print the durable flag and configured target
    Status,
    /// Run a scripted connect / wallet-switch / disconnect sequence
    Demo,
}
