//! Chain client for the EVM side of the bridge
//!
//! Wraps an Anvil-style RPC endpoint together with the faucet credential used
//! to seed test accounts. Value transfers go through the external `cast`
//! tool so the harness exercises the same signing path the deploy scripts use.

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Native balance seeded into every freshly generated test account (10 ETH).
pub const STARTING_BALANCE_WEI: u128 = 10_000_000_000_000_000_000;

/// Client for one EVM chain endpoint.
///
/// Created once per suite; the endpoint, chain identifier and faucet
/// credential are immutable afterwards.
pub struct EthChain {
    chain_id: u64,
    rpc: String,
    faucet: PrivateKeySigner,
}

impl EthChain {
    /// Connect to the chain and query its identifier over RPC.
    pub async fn connect(rpc: &str, faucet: PrivateKeySigner) -> Result<Self> {
        let chain_id = query_chain_id(rpc).await?;
        info!(rpc, chain_id, "connected to EVM chain");

        Ok(Self {
            chain_id,
            rpc: rpc.to_string(),
            faucet,
        })
    }

    /// The chain identifier reported by the endpoint at connect time.
    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    /// The RPC endpoint this client talks to.
    pub fn rpc(&self) -> &str {
        &self.rpc
    }

    /// Address of the faucet account.
    pub fn faucet_address(&self) -> Address {
        self.faucet.address()
    }

    /// Generate a fresh key pair and seed it with the starting balance from
    /// the faucet.
    pub async fn create_and_fund_account(&self) -> Result<PrivateKeySigner> {
        let key = PrivateKeySigner::random();
        let address = key.address();

        self.send_eth(&self.faucet, address, U256::from(STARTING_BALANCE_WEI))
            .await
            .map_err(|source| Error::Funding {
                address: address.to_string(),
                source: Box::new(source),
            })?;

        info!(%address, "created and funded test account");
        Ok(key)
    }

    /// Top up an existing address from the faucet.
    pub async fn fund_account(&self, address: Address, amount: U256) -> Result<()> {
        self.send_eth(&self.faucet, address, amount)
            .await
            .map_err(|source| Error::Funding {
                address: address.to_string(),
                source: Box::new(source),
            })
    }

    /// Transfer native value with `cast send`.
    ///
    /// The invocation is a blocking child-process call with output buffered
    /// in memory; callers issuing overlapping transfers from the same key
    /// must serialize themselves.
    pub async fn send_eth(
        &self,
        from: &PrivateKeySigner,
        to: Address,
        amount_wei: U256,
    ) -> Result<()> {
        let key_hex = format!("0x{}", alloy::hex::encode(from.to_bytes()));
        let args = vec![
            "send".to_string(),
            to.to_string(),
            "--value".to_string(),
            amount_wei.to_string(),
            "--private-key".to_string(),
            key_hex,
            "--rpc-url".to_string(),
            self.rpc.clone(),
        ];

        debug!(%to, %amount_wei, "sending eth via cast");
        let output = Command::new("cast").args(&args).output().await?;

        if !output.status.success() {
            return Err(Error::Transfer {
                argv: format!("cast {}", args.join(" ")),
                stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            });
        }

        Ok(())
    }
}

/// Query `eth_chainId` over plain JSON-RPC.
pub async fn query_chain_id(rpc: &str) -> Result<u64> {
    let client = reqwest::Client::new();
    let response = client
        .post(rpc)
        .json(&serde_json::json!({
            "jsonrpc": "2.0",
            "method": "eth_chainId",
            "params": [],
            "id": 1
        }))
        .send()
        .await
        .map_err(|e| Error::Connection {
            rpc: rpc.to_string(),
            reason: e.to_string(),
        })?;

    if !response.status().is_success() {
        return Err(Error::Connection {
            rpc: rpc.to_string(),
            reason: format!("chain id query returned HTTP {}", response.status()),
        });
    }

    let body: serde_json::Value = response.json().await.map_err(|e| Error::Connection {
        rpc: rpc.to_string(),
        reason: e.to_string(),
    })?;

    parse_chain_id(&body).ok_or_else(|| Error::Connection {
        rpc: rpc.to_string(),
        reason: format!("malformed eth_chainId response: {body}"),
    })
}

fn parse_chain_id(body: &serde_json::Value) -> Option<u64> {
    let hex = body.get("result")?.as_str()?;
    u64::from_str_radix(hex.trim_start_matches("0x"), 16).ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_anvil_chain_id() {
        let body = serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": "0x7a69"});
        assert_eq!(parse_chain_id(&body), Some(31337));
    }

    #[test]
    fn chain_id_parse_is_deterministic() {
        // Two probes of the same endpoint must report the same identifier.
        let body = serde_json::json!({"jsonrpc": "2.0", "id": 1, "result": "0x1"});
        assert_eq!(parse_chain_id(&body), parse_chain_id(&body));
    }

    #[test]
    fn rejects_malformed_chain_id() {
        assert_eq!(parse_chain_id(&serde_json::json!({"result": "xyz"})), None);
        assert_eq!(parse_chain_id(&serde_json::json!({"error": "boom"})), None);
        assert_eq!(parse_chain_id(&serde_json::json!({"result": 42})), None);
    }
}
