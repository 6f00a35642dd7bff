//! vault-connect - wallet session manager for the vault client
//!
//! Drives a [`WalletConnector`] against the in-process signer so the
//! connect / switch / reconcile behaviour can be exercised from a shell.

use std::sync::Arc;

use clap::Parser;
use serde::Serialize;
use serde_json::json;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use vault_connect::{
    config::{Command, SimulatedWalletArgs},
    session::FileFlagStore,
    transport::{MemorySigner, SwitchBehavior, TransportError},
    Args, ConnectorConfig, WalletConnector,
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load environment variables from .env file if present
    let _ = dotenvy::dotenv();

    let args = Args::parse();

    // Logs go to stderr, results to stdout
    let log_level = args.log_level.clone();
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| format!("vault_connect={},info", log_level).into()),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();

    let config = match ConnectorConfig::load(&args.config) {
        Ok(config) => config,
        Err(e) => {
            error!("Configuration error: {}", e);
            std::process::exit(1);
        }
    };
    info!(
        "Target network: {} ({})",
        config.target.chain_name, config.target.chain_id
    );

    let flags = Arc::new(FileFlagStore::open(&args.data_dir)?);
    info!("Connection flag: {}", flags.path().display());

    let signer = simulated_wallet(&args.wallet, config.target.chain_id);
    let connector = WalletConnector::new(config, Arc::new(signer.clone()), flags);

    match args.command {
        Command::Connect => {
            let result = match connector.auto_reconnect().await {
                Some(result) => result,
                None => connector.connect().await,
            };
            print_json(&json!({ "result": result, "state": connector.state() }))?;
        }
        Command::Switch => {
            let connected = connector.connect().await;
            let switched = connector.switch_to_base().await;
            print_json(&json!({
                "connect": connected,
                "switch": switched,
                "state": connector.state(),
                "network": connector.network_status(),
            }))?;
        }
        Command::Disconnect => {
            print_json(&connector.disconnect().await)?;
        }
        Command::Status => {
            print_json(&json!({
                "wasConnected": connector.was_connected(),
                "target": connector.config().target,
                "state": connector.state(),
            }))?;
        }
        Command::Demo => run_demo(&connector, &signer).await?,
    }

    Ok(())
}

fn simulated_wallet(wallet: &SimulatedWalletArgs, target_chain: u64) -> MemorySigner {
    let signer = MemorySigner::new(wallet.wallet_chain_id)
        .with_accounts(vec![wallet.wallet_account.clone()])
        .with_stale_echo();
    if wallet.unknown_chain && wallet.wallet_chain_id != target_chain {
        signer.forget_chain(target_chain);
    }
    if wallet.reject_switch {
        signer.set_switch_behavior(SwitchBehavior::Reject);
    }
    if wallet.reject_session {
        signer.fail_sessions_with(TransportError::user_rejected());
    }
    signer
}

/// Connect, let the wallet wander off and back, then disconnect
async fn run_demo(connector: &WalletConnector, signer: &MemorySigner) -> anyhow::Result<()> {
    let settle = connector.config().debounce() * 2;

    let connected = connector.connect().await;
    print_json(&json!({ "step": "connect", "result": connected, "state": connector.state() }))?;
    if !connected.success {
        return Ok(());
    }

    // Rapid hops inside one debounce window commit only the last chain
    signer.wallet_switch(10);
    signer.wallet_switch(1);
    tokio::time::sleep(settle).await;
    print_json(&json!({
        "step": "wallet-switch",
        "state": connector.state(),
        "network": connector.network_status(),
        "providerGeneration": connector.providers().generation(),
    }))?;

    let switched = connector.switch_to_base().await;
    print_json(&json!({ "step": "switch", "result": switched, "state": connector.state() }))?;

    let disconnected = connector.disconnect().await;
    print_json(&json!({
        "step": "disconnect",
        "result": disconnected,
        "state": connector.state(),
    }))?;
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
