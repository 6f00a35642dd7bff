//! EIP-1193 request helpers
//!
//! Thin typed wrappers over [`Session::request`] for the handful of methods
//! the connector issues, plus chain id payload parsing.

use serde_json::{json, Value};

use crate::chain::ChainDescriptor;
use crate::transport::{Session, TransportError};

pub const ETH_CHAIN_ID: &str = "eth_chainId";
pub const ETH_ACCOUNTS: &str = "eth_accounts";
pub const ETH_CALL: &str = "eth_call";
pub const WALLET_SWITCH_CHAIN: &str = "wallet_switchEthereumChain";
pub const WALLET_ADD_CHAIN: &str = "wallet_addEthereumChain";

/// Parse a chain id from a notification or `eth_chainId` result.
///
/// Accepts `"0x2105"`, `"8453"` and `8453`. Anything else is `None`.
pub fn parse_chain_id(value: &Value) -> Option<u64> {
    match value {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => {
            let s = s.trim();
            if let Some(hex) = s.strip_prefix("0x").or_else(|| s.strip_prefix("0X")) {
                u64::from_str_radix(hex, 16).ok()
            } else {
                s.parse().ok()
            }
        }
        _ => None,
    }
}

/// Query the session's active chain
pub async fn chain_id(session: &dyn Session) -> Result<u64, TransportError> {
    let raw = session.request(ETH_CHAIN_ID, json!([])).await?;
    parse_chain_id(&raw)
        .ok_or_else(|| TransportError::other(format!("Malformed eth_chainId result: {raw}")))
}

/// Ask the wallet to switch to `chain`
pub async fn switch_chain(
    session: &dyn Session,
    chain: &ChainDescriptor,
) -> Result<(), TransportError> {
    session
        .request(WALLET_SWITCH_CHAIN, json!([chain.switch_chain_params()]))
        .await?;
    Ok(())
}

/// Ask the wallet to register `chain`
pub async fn add_chain(
    session: &dyn Session,
    chain: &ChainDescriptor,
) -> Result<(), TransportError> {
    session
        .request(WALLET_ADD_CHAIN, json!([chain.add_chain_params()]))
        .await?;
    Ok(())
}
