//! Integration tests for relay configuration synchronization

use std::path::Path;

use bridge_e2e_harness::relay_config::{
    update_counterpart_contract, update_counterpart_endpoint, update_network_contract,
    update_network_endpoint, RelayConfig,
};

const FIXTURE: &str = "\
networks:
- name: evm
  rpc: http://old
  ws: ws://old
  contract: ''
  chain_id: 0
- name: testnet
  rpc: http://testnet:8545
  ws: ws://testnet:8546
  contract: '0x0000000000000000000000000000000000000001'
  chain_id: 5
counterpart:
  rpc: http://counterpart:26657
  grpc: http://counterpart:9090
  contract: ''
  key_name: relayer
log_level: debug
";

fn write_fixture(path: &Path) {
    std::fs::write(path, FIXTURE).unwrap();
}

#[test]
fn save_load_round_trip_is_byte_identical() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    write_fixture(&path);

    // Normalize once through save, then a load/save cycle must not change a
    // byte.
    let config = RelayConfig::load(&path).unwrap();
    config.save(&path).unwrap();
    let normalized = std::fs::read(&path).unwrap();

    let reloaded = RelayConfig::load(&path).unwrap();
    reloaded.save(&path).unwrap();
    let rewritten = std::fs::read(&path).unwrap();

    assert_eq!(normalized, rewritten);
}

#[test]
fn unrelated_fields_survive_updates() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    write_fixture(&path);

    update_network_endpoint(&path, "evm", "http://new:8545", "ws://new:8546").unwrap();

    let config = RelayConfig::load(&path).unwrap();
    assert_eq!(config.counterpart.extra["key_name"], "relayer");
    assert_eq!(config.extra["log_level"], "debug");
}

#[test]
fn update_network_endpoint_rewrites_matching_entry() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    write_fixture(&path);

    update_network_endpoint(&path, "evm", "http://127.0.0.1:52078", "ws://127.0.0.1:52078")
        .unwrap();

    let config = RelayConfig::load(&path).unwrap();
    let evm = config.networks.iter().find(|n| n.name == "evm").unwrap();
    assert_eq!(evm.rpc, "http://127.0.0.1:52078");
    assert_eq!(evm.ws, "ws://127.0.0.1:52078");

    // The other entry is untouched.
    let testnet = config.networks.iter().find(|n| n.name == "testnet").unwrap();
    assert_eq!(testnet.rpc, "http://testnet:8545");
}

#[test]
fn update_with_unknown_network_is_a_silent_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    write_fixture(&path);

    let config = RelayConfig::load(&path).unwrap();
    config.save(&path).unwrap();
    let before = std::fs::read(&path).unwrap();

    update_network_endpoint(&path, "no-such-network", "http://new", "ws://new").unwrap();

    let after = std::fs::read(&path).unwrap();
    assert_eq!(before, after);
}

#[test]
fn update_network_contract_binds_address_and_chain_id() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    write_fixture(&path);

    let address = "0x5FbDB2315678afecb367f032d93F642f64180aa3";
    update_network_contract(&path, "evm", address, 31337).unwrap();

    let config = RelayConfig::load(&path).unwrap();
    let evm = config.networks.iter().find(|n| n.name == "evm").unwrap();
    assert_eq!(evm.contract, address);
    assert_eq!(evm.chain_id, 31337);

    // Endpoints of the mutated entry stay as they were.
    assert_eq!(evm.rpc, "http://old");
    assert_eq!(evm.ws, "ws://old");

    // And the sibling entry is fully unchanged.
    let testnet = config.networks.iter().find(|n| n.name == "testnet").unwrap();
    assert_eq!(testnet.chain_id, 5);
    assert_eq!(
        testnet.contract,
        "0x0000000000000000000000000000000000000001"
    );
}

#[test]
fn counterpart_updates_touch_only_their_section() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.yaml");
    write_fixture(&path);

    update_counterpart_endpoint(&path, "http://127.0.0.1:26657", "http://127.0.0.1:9090").unwrap();
    update_counterpart_contract(&path, "http://127.0.0.1:26657", "counterpart1bindingsfactory").unwrap();

    let config = RelayConfig::load(&path).unwrap();
    assert_eq!(config.counterpart.rpc, "http://127.0.0.1:26657");
    assert_eq!(config.counterpart.grpc, "http://127.0.0.1:9090");
    assert_eq!(config.counterpart.contract, "counterpart1bindingsfactory");
    assert_eq!(config.networks.len(), 2);
    assert_eq!(config.networks[0].rpc, "http://old");
}
