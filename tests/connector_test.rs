//! End-to-end connector behaviour against the in-process signer

use std::sync::Arc;
use std::time::Duration;

use vault_connect::rpc::{WALLET_ADD_CHAIN, WALLET_SWITCH_CHAIN};
use vault_connect::session::{FlagStore, MemoryFlagStore};
use vault_connect::transport::{MemorySigner, SessionEvent, SwitchBehavior, TransportError};
use vault_connect::{ConnectionState, ConnectorConfig, ErrorCode, NetworkStatus, WalletConnector};

const BASE: u64 = 8453;
const ACCOUNT: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

fn connector_with(signer: &MemorySigner) -> (WalletConnector, Arc<MemoryFlagStore>) {
    let flags = Arc::new(MemoryFlagStore::new());
    let connector = WalletConnector::new(
        ConnectorConfig::default(),
        Arc::new(signer.clone()),
        flags.clone(),
    );
    (connector, flags)
}

/// Long enough for any armed debounce window to fire
async fn settle(connector: &WalletConnector) {
    tokio::time::sleep(connector.config().debounce() * 3).await;
}

fn flag(flags: &MemoryFlagStore) -> Option<String> {
    flags.get("wallet_connected").unwrap()
}

// ---- Connect ----

#[tokio::test(start_paused = true)]
async fn test_stale_echo_during_connect_is_discarded() {
    let signer = MemorySigner::new(1).with_stale_echo();
    let (connector, flags) = connector_with(&signer);

    let result = connector.connect().await;

    assert!(result.success);
    assert_eq!(result.address.as_deref(), Some(ACCOUNT));
    assert_eq!(result.chain_id, Some(BASE));

    let state = connector.state();
    assert_eq!(state.chain_id, Some(BASE));
    assert!(!state.switching_network);
    assert!(!state.connecting);
    assert!(state.is_connected);

    // Only one provider was ever built, and never for the prior chain
    let provider = connector.provider().unwrap();
    assert_eq!(provider.chain_id(), BASE);
    assert_eq!(connector.providers().generation(), 1);

    settle(&connector).await;
    assert_eq!(connector.providers().generation(), 1);
    assert_eq!(connector.committed_chain(), Some(BASE));
    assert_eq!(flag(&flags).as_deref(), Some("true"));
}

#[tokio::test(start_paused = true)]
async fn test_unknown_chain_is_added_during_connect() {
    let signer = MemorySigner::new(1);
    signer.forget_chain(BASE);
    let (connector, _) = connector_with(&signer);

    let result = connector.connect().await;

    assert!(result.success);
    assert_eq!(result.chain_id, Some(BASE));
    assert_eq!(signer.request_count(WALLET_SWITCH_CHAIN), 2);

    let added = signer.requests_for(WALLET_ADD_CHAIN);
    assert_eq!(added.len(), 1);
    let params = &added[0][0];
    assert_eq!(params["chainId"], "0x2105");
    assert_eq!(params["chainName"], "Base");
    assert_eq!(params["nativeCurrency"]["symbol"], "ETH");
    assert_eq!(params["nativeCurrency"]["decimals"], 18);
    assert_eq!(params["blockExplorerUrls"][0], "https://basescan.org");
    assert_eq!(connector.state().chain_id, Some(BASE));
}

#[tokio::test(start_paused = true)]
async fn test_rejected_switch_leaves_session_degraded() {
    let signer = MemorySigner::new(1);
    signer.set_switch_behavior(SwitchBehavior::Reject);
    let (connector, _) = connector_with(&signer);

    let result = connector.connect().await;

    assert!(result.success);
    assert_eq!(result.chain_id, Some(1));
    let state = connector.state();
    assert!(state.is_connected);
    assert!(!state.switching_network);
    assert_eq!(state.chain_id, Some(1));
    assert_eq!(connector.network_status(), NetworkStatus::WrongNetwork);
    assert_eq!(connector.provider().unwrap().chain_id(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_revoked_accounts_disconnect_fully() {
    let signer = MemorySigner::new(BASE);
    let (connector, flags) = connector_with(&signer);
    assert!(connector.connect().await.success);
    assert!(flag(&flags).is_some());

    signer.revoke_accounts();

    assert_eq!(connector.state(), ConnectionState::default());
    assert!(connector.provider().is_none());
    assert!(connector.session().is_none());
    assert_eq!(flag(&flags), None);
    assert_eq!(signer.handler_count(), 0);

    // Transport disconnect is requested in the background
    tokio::time::sleep(Duration::from_millis(1)).await;
    assert_eq!(signer.disconnect_calls(), 1);
}

// ---- Chain notifications and teardown ----

#[tokio::test(start_paused = true)]
async fn test_pending_target_wins_over_stale_chains() {
    let signer = MemorySigner::new(1);
    signer.set_switch_behavior(SwitchBehavior::Reject);
    let (connector, _) = connector_with(&signer);
    assert!(connector.connect().await.success);
    assert_eq!(connector.committed_chain(), Some(1));

    // Second attempt: wallet accepts and re-reports chain 1 before Base
    let signer = signer.with_stale_echo();
    signer.set_switch_behavior(SwitchBehavior::Accept);
    let result = connector.switch_to_base().await;

    assert!(result.success, "{result:?}");
    settle(&connector).await;
    assert_eq!(connector.committed_chain(), Some(BASE));
    assert_eq!(connector.state().chain_id, Some(BASE));
    assert_eq!(connector.provider().unwrap().chain_id(), BASE);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_without_session_is_idempotent() {
    let signer = MemorySigner::new(BASE);
    let (connector, _) = connector_with(&signer);

    let first = connector.disconnect().await;
    let after_first = connector.state();
    let second = connector.disconnect().await;

    assert!(first.success);
    assert!(second.success);
    assert_eq!(after_first, ConnectionState::default());
    assert_eq!(connector.state(), after_first);
    assert!(connector.provider().is_none());
    assert_eq!(signer.disconnect_calls(), 0);
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_twice_after_connect() {
    let signer = MemorySigner::new(BASE);
    signer.fail_disconnect_with(TransportError::other("relay unreachable"));
    let (connector, flags) = connector_with(&signer);
    assert!(connector.connect().await.success);

    assert!(connector.disconnect().await.success);
    let once = connector.state();
    assert!(connector.disconnect().await.success);

    assert_eq!(once, ConnectionState::default());
    assert_eq!(connector.state(), once);
    assert_eq!(signer.disconnect_calls(), 1);
    assert_eq!(flag(&flags), None);
    assert_eq!(connector.committed_chain(), None);
}

#[tokio::test(start_paused = true)]
async fn test_concurrent_connect_is_rejected() {
    let signer = MemorySigner::new(1);
    let (connector, _) = connector_with(&signer);
    let other = connector.clone();

    let (first, second) = tokio::join!(connector.connect(), other.connect());

    assert!(first.success);
    assert!(!second.success);
    assert_eq!(second.error, Some(ErrorCode::AlreadyConnecting));
    assert_eq!(signer.sessions_created(), 1);
    assert!(!connector.state().connecting);
}

#[tokio::test(start_paused = true)]
async fn test_rapid_chain_changes_commit_once() {
    let signer = MemorySigner::new(BASE);
    let (connector, _) = connector_with(&signer);
    assert!(connector.connect().await.success);
    assert_eq!(connector.providers().generation(), 1);

    signer.wallet_switch(5);
    tokio::time::sleep(Duration::from_millis(40)).await;
    signer.wallet_switch(6);
    tokio::time::sleep(Duration::from_millis(40)).await;
    signer.wallet_switch(7);

    // Nothing committed while the window is open
    assert_eq!(connector.state().chain_id, Some(BASE));

    settle(&connector).await;
    assert_eq!(connector.providers().generation(), 2);
    assert_eq!(connector.provider().unwrap().chain_id(), 7);
    assert_eq!(connector.state().chain_id, Some(7));
    assert_eq!(connector.committed_chain(), Some(7));
}

#[tokio::test(start_paused = true)]
async fn test_duplicate_chain_notification_changes_nothing() {
    let signer = MemorySigner::new(BASE);
    let (connector, _) = connector_with(&signer);
    assert!(connector.connect().await.success);

    let mut rx = connector.subscribe();
    rx.borrow_and_update();
    let mut providers = connector.providers().subscribe();
    providers.borrow_and_update();

    signer.wallet_switch(BASE);
    signer.emit(SessionEvent::ChainChanged(serde_json::json!(BASE)));
    settle(&connector).await;

    assert!(!rx.has_changed().unwrap());
    assert!(!providers.has_changed().unwrap());
    assert_eq!(connector.providers().generation(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_bounce_back_inside_window_is_not_committed() {
    let signer = MemorySigner::new(BASE);
    let (connector, _) = connector_with(&signer);
    assert!(connector.connect().await.success);

    signer.wallet_switch(10);
    signer.wallet_switch(BASE);
    settle(&connector).await;

    assert_eq!(connector.state().chain_id, Some(BASE));
    assert_eq!(connector.providers().generation(), 1);
}

// ---- Facade ----

#[tokio::test(start_paused = true)]
async fn test_rejected_session() {
    let signer = MemorySigner::new(BASE);
    signer.fail_sessions_with(TransportError::user_rejected());
    let (connector, flags) = connector_with(&signer);

    let result = connector.connect().await;

    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorCode::UserRejected));
    assert_eq!(connector.state(), ConnectionState::default());
    assert_eq!(flag(&flags), None);
}

#[tokio::test(start_paused = true)]
async fn test_failed_session() {
    let signer = MemorySigner::new(BASE);
    signer.fail_sessions_with(TransportError::other("relay timeout"));
    let (connector, _) = connector_with(&signer);

    let result = connector.connect().await;
    assert_eq!(result.error, Some(ErrorCode::ConnectionFailed));
}

#[tokio::test(start_paused = true)]
async fn test_wallet_without_accounts() {
    let signer = MemorySigner::new(BASE).with_accounts(Vec::new());
    let (connector, _) = connector_with(&signer);

    let result = connector.connect().await;

    assert_eq!(result.error, Some(ErrorCode::ConnectionFailed));
    assert!(connector.session().is_none());
    assert_eq!(signer.disconnect_calls(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_transport_disconnect_clears_state() {
    let signer = MemorySigner::new(BASE);
    let (connector, flags) = connector_with(&signer);
    assert!(connector.connect().await.success);

    signer.terminate("relay closed");

    assert_eq!(connector.state(), ConnectionState::default());
    assert!(connector.provider().is_none());
    assert_eq!(flag(&flags), None);
    assert_eq!(signer.disconnect_calls(), 0);

    // A fresh connect pairs a new session
    assert!(connector.connect().await.success);
    assert_eq!(signer.sessions_created(), 2);
    assert_eq!(signer.handler_count(), 3);
}

#[tokio::test(start_paused = true)]
async fn test_switch_to_base_outcomes() {
    let signer = MemorySigner::new(1);
    signer.set_switch_behavior(SwitchBehavior::Reject);
    let (connector, _) = connector_with(&signer);
    assert!(connector.connect().await.success);

    let rejected = connector.switch_to_base().await;
    assert_eq!(rejected.error, Some(ErrorCode::UserRejected));
    assert!(!connector.state().switching_network);
    assert_eq!(connector.state().chain_id, Some(1));

    signer.set_switch_behavior(SwitchBehavior::Ignore);
    let ignored = connector.switch_to_base().await;
    assert_eq!(ignored.error, Some(ErrorCode::ChainNotSupported));
    assert_eq!(connector.state().chain_id, Some(1));

    signer.set_switch_behavior(SwitchBehavior::Accept);
    let switched = connector.switch_to_base().await;
    assert!(switched.success);
    assert_eq!(connector.state().chain_id, Some(BASE));
    assert_eq!(connector.network_status(), NetworkStatus::OnTarget);

    let again = connector.switch_to_base().await;
    assert!(again.success);
    assert_eq!(signer.request_count(WALLET_SWITCH_CHAIN), 4);
}

#[tokio::test(start_paused = true)]
async fn test_session_ended_during_switch_stays_torn_down() {
    let signer = MemorySigner::new(1);
    signer.set_switch_behavior(SwitchBehavior::Reject);
    let (connector, flags) = connector_with(&signer);
    assert!(connector.connect().await.success);

    // Wallet swallows the request, relay drops while the poll waits
    signer.set_switch_behavior(SwitchBehavior::Ignore);
    let relay = signer.clone();
    tokio::spawn(async move {
        tokio::time::sleep(Duration::from_millis(100)).await;
        relay.terminate("relay closed");
    });

    let result = connector.switch_to_base().await;

    assert!(!result.success);
    assert_eq!(result.error, Some(ErrorCode::NotConnected));
    assert_eq!(connector.state(), ConnectionState::default());
    assert!(connector.provider().is_none());
    assert_eq!(connector.committed_chain(), None);
    assert_eq!(connector.providers().generation(), 1);
    assert_eq!(flag(&flags), None);
}

#[tokio::test(start_paused = true)]
async fn test_auto_reconnect_skips_while_connecting() {
    let signer = MemorySigner::new(BASE);
    let (connector, flags) = connector_with(&signer);
    flags.set("wallet_connected", "true").unwrap();
    let other = connector.clone();

    let (connected, restored) = tokio::join!(connector.connect(), other.auto_reconnect());

    assert!(connected.success);
    assert!(restored.is_none());
    assert_eq!(flag(&flags).as_deref(), Some("true"));
    assert_eq!(signer.sessions_created(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_switch_to_base_add_chain_failure() {
    let signer = MemorySigner::new(1);
    signer.set_switch_behavior(SwitchBehavior::Reject);
    let (connector, _) = connector_with(&signer);
    assert!(connector.connect().await.success);

    signer.set_switch_behavior(SwitchBehavior::Accept);
    signer.forget_chain(BASE);
    signer.fail_add_chain_with(TransportError::new(-32603, "Invalid RPC URL"));

    let result = connector.switch_to_base().await;
    assert_eq!(result.error, Some(ErrorCode::ChainAddFailed));
    assert_eq!(connector.state().chain_id, Some(1));
}

#[tokio::test(start_paused = true)]
async fn test_auto_reconnect() {
    let signer = MemorySigner::new(BASE);
    let (connector, flags) = connector_with(&signer);
    assert!(connector.auto_reconnect().await.is_none());

    flags.set("wallet_connected", "true").unwrap();
    let result = connector.auto_reconnect().await.unwrap();
    assert!(result.success);

    // Already connected: nothing to restore
    assert!(connector.auto_reconnect().await.is_none());
    assert_eq!(signer.sessions_created(), 1);
}

#[tokio::test(start_paused = true)]
async fn test_failed_auto_reconnect_clears_flag() {
    let signer = MemorySigner::new(BASE);
    signer.fail_sessions_with(TransportError::user_rejected());
    let (connector, flags) = connector_with(&signer);
    flags.set("wallet_connected", "true").unwrap();

    let result = connector.auto_reconnect().await.unwrap();

    assert!(!result.success);
    assert_eq!(flag(&flags), None);
    assert!(connector.auto_reconnect().await.is_none());
}
