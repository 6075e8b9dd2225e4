//! Relay configuration synchronization
//!
//! The relay sidecar reads a YAML document describing per-network RPC/WS
//! endpoints and contract bindings. The harness rewrites that document after
//! every deployment so the relay observes the fresh endpoint and address.
//! Unknown fields round-trip through load/save untouched.
//!
//! Mutation holds no lock: the model assumes exactly one writer active on a
//! given configuration path at any time.

use std::collections::BTreeMap;
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::error::{Error, Result};

/// One EVM network entry, keyed by its unique `name`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct NetworkEntry {
    /// Network name the relay uses to identify this entry
    pub name: String,
    /// HTTP RPC endpoint
    pub rpc: String,
    /// WebSocket endpoint
    pub ws: String,
    /// Bridge contract address the relay subscribes to
    pub contract: String,
    /// Chain identifier
    pub chain_id: u64,
    /// Fields this harness does not manage, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// Configuration for the counterpart (non-EVM) chain.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CounterpartConfig {
    /// RPC endpoint
    pub rpc: String,
    /// Secondary protocol endpoint (gRPC)
    pub grpc: String,
    /// Bindings contract address
    pub contract: String,
    /// Fields this harness does not manage, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

/// The relay's full configuration document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RelayConfig {
    /// Per-network entries, names unique
    #[serde(default)]
    pub networks: Vec<NetworkEntry>,
    /// Counterpart-chain section
    pub counterpart: CounterpartConfig,
    /// Top-level fields this harness does not manage, preserved verbatim
    #[serde(flatten)]
    pub extra: BTreeMap<String, serde_yaml::Value>,
}

impl RelayConfig {
    /// Decode the configuration document at `path`.
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        serde_yaml::from_str(&raw).map_err(|e| Error::ConfigParse {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    /// Truncate and rewrite the document at `path`.
    pub fn save(&self, path: &Path) -> Result<()> {
        let encoded = serde_yaml::to_string(self).map_err(|e| Error::ConfigWrite {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        std::fs::write(path, encoded).map_err(|e| Error::ConfigWrite {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })
    }

    fn network_mut(&mut self, name: &str) -> Option<&mut NetworkEntry> {
        self.networks.iter_mut().find(|n| n.name == name)
    }
}

/// Point the named network at new RPC/WS endpoints.
///
/// A non-matching network name completes successfully with no mutation; a
/// warning is logged so callers can spot the miss.
pub fn update_network_endpoint(path: &Path, network: &str, rpc: &str, ws: &str) -> Result<()> {
    let mut config = RelayConfig::load(path)?;
    match config.network_mut(network) {
        Some(entry) => {
            entry.rpc = rpc.to_string();
            entry.ws = ws.to_string();
            debug!(network, rpc, ws, "updated network endpoints");
        }
        None => warn!(network, "no such network in relay config, endpoints unchanged"),
    }
    config.save(path)
}

/// Bind the named network to a freshly deployed contract.
pub fn update_network_contract(
    path: &Path,
    network: &str,
    contract: &str,
    chain_id: u64,
) -> Result<()> {
    let mut config = RelayConfig::load(path)?;
    match config.network_mut(network) {
        Some(entry) => {
            entry.contract = contract.to_string();
            entry.chain_id = chain_id;
            debug!(network, contract, chain_id, "updated network contract binding");
        }
        None => warn!(network, "no such network in relay config, binding unchanged"),
    }
    config.save(path)
}

/// Point the counterpart chain section at new RPC/gRPC endpoints.
pub fn update_counterpart_endpoint(path: &Path, rpc: &str, grpc: &str) -> Result<()> {
    let mut config = RelayConfig::load(path)?;
    config.counterpart.rpc = rpc.to_string();
    config.counterpart.grpc = grpc.to_string();
    debug!(rpc, grpc, "updated counterpart endpoints");
    config.save(path)
}

/// Bind the counterpart chain section to a contract and RPC endpoint.
pub fn update_counterpart_contract(path: &Path, rpc: &str, contract: &str) -> Result<()> {
    let mut config = RelayConfig::load(path)?;
    config.counterpart.rpc = rpc.to_string();
    config.counterpart.contract = contract.to_string();
    debug!(rpc, contract, "updated counterpart contract binding");
    config.save(path)
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
networks:
- name: evm
  rpc: http://old
  ws: ws://old
  contract: ''
  chain_id: 0
counterpart:
  rpc: http://counterpart:26657
  grpc: http://counterpart:9090
  contract: ''
";

    #[test]
    fn parses_sample_document() {
        let config: RelayConfig = serde_yaml::from_str(SAMPLE).unwrap();
        assert_eq!(config.networks.len(), 1);
        assert_eq!(config.networks[0].name, "evm");
        assert_eq!(config.counterpart.grpc, "http://counterpart:9090");
    }

    #[test]
    fn malformed_document_is_a_parse_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.yaml");
        std::fs::write(&path, "networks: [not, a, mapping]").unwrap();
        assert!(matches!(
            RelayConfig::load(&path),
            Err(Error::ConfigParse { .. })
        ));
    }

    #[test]
    fn unknown_fields_survive_round_trip() {
        let raw = "\
networks:
- name: evm
  rpc: http://old
  ws: ws://old
  contract: ''
  chain_id: 0
  gas_multiplier: 1.5
counterpart:
  rpc: http://counterpart:26657
  grpc: http://counterpart:9090
  contract: ''
  key_name: relayer
log_level: debug
";
        let config: RelayConfig = serde_yaml::from_str(raw).unwrap();
        let reencoded = serde_yaml::to_string(&config).unwrap();
        let reparsed: RelayConfig = serde_yaml::from_str(&reencoded).unwrap();
        assert_eq!(config, reparsed);
        assert!(reencoded.contains("gas_multiplier"));
        assert!(reencoded.contains("key_name: relayer"));
        assert!(reencoded.contains("log_level: debug"));
    }
}
