//! Target network descriptor
//!
//! Static description of the network the client requires. The same record
//! feeds the add-chain request, so it carries everything a wallet needs to
//! register the network from scratch.

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// Base mainnet chain id
pub const BASE_CHAIN_ID: u64 = 8453;

/// Native currency of a network
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NativeCurrency {
    pub name: String,
    pub symbol: String,
    pub decimals: u8,
}

/// Network descriptor used for switch and add-chain requests
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChainDescriptor {
    /// Numeric chain id (8453 for Base)
    pub chain_id: u64,

    /// Display name shown by the wallet
    pub chain_name: String,

    pub native_currency: NativeCurrency,

    /// JSON-RPC endpoints, first one is preferred
    pub rpc_urls: Vec<String>,

    /// Block explorer base URLs
    pub block_explorer_urls: Vec<String>,
}

impl ChainDescriptor {
    /// Base mainnet
    pub fn base_mainnet() -> Self {
        Self {
            chain_id: BASE_CHAIN_ID,
            chain_name: "Base".to_string(),
            native_currency: NativeCurrency {
                name: "Ether".to_string(),
                symbol: "ETH".to_string(),
                decimals: 18,
            },
            rpc_urls: vec!["https://mainnet.base.org".to_string()],
            block_explorer_urls: vec!["https://basescan.org".to_string()],
        }
    }

    /// Chain id in the 0x-prefixed hex form wallets expect
    pub fn hex_chain_id(&self) -> String {
        format!("{:#x}", self.chain_id)
    }

    /// Preferred RPC endpoint
    pub fn primary_rpc_url(&self) -> Option<&str> {
        self.rpc_urls.first().map(String::as_str)
    }

    /// Parameter object for `wallet_addEthereumChain`
    pub fn add_chain_params(&self) -> Value {
        json!({
            "chainId": self.hex_chain_id(),
            "chainName": self.chain_name,
            "nativeCurrency": {
                "name": self.native_currency.name,
                "symbol": self.native_currency.symbol,
                "decimals": self.native_currency.decimals,
            },
            "rpcUrls": self.rpc_urls,
            "blockExplorerUrls": self.block_explorer_urls,
        })
    }

    /// Parameter object for `wallet_switchEthereumChain`
    pub fn switch_chain_params(&self) -> Value {
        json!({ "chainId": self.hex_chain_id() })
    }
}

impl Default for ChainDescriptor {
    fn default() -> Self {
        Self::base_mainnet()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_base_hex_chain_id() {
        assert_eq!(ChainDescriptor::base_mainnet().hex_chain_id(), "0x2105");
    }

    #[test]
    fn test_add_chain_params_shape() {
        let params = ChainDescriptor::base_mainnet().add_chain_params();
        assert_eq!(params["chainId"], "0x2105");
        assert_eq!(params["chainName"], "Base");
        assert_eq!(params["nativeCurrency"]["symbol"], "ETH");
        assert_eq!(params["nativeCurrency"]["decimals"], 18);
        assert_eq!(params["rpcUrls"][0], "https://mainnet.base.org");
        assert_eq!(params["blockExplorerUrls"][0], "https://basescan.org");
    }

    #[test]
    fn test_descriptor_serde_camel_case() {
        let json = serde_json::to_value(ChainDescriptor::base_mainnet()).unwrap();
        assert_eq!(json["chainId"], 8453);
        assert!(json.get("blockExplorerUrls").is_some());
    }
}
