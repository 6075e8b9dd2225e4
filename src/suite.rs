//! Suite orchestration for the bridge end-to-end pipeline
//!
//! Drives the single sequential control flow: pull the relay image, start
//! the sidecar, fund accounts, deploy the bridge contract, synchronize the
//! relay configuration, start the relay, then trigger and observe a bridge
//! event. Transitions are strictly sequential preconditions; any failure
//! aborts the suite at that step.

use std::path::PathBuf;
use std::time::Duration;

use alloy::primitives::U256;
use alloy::signers::local::PrivateKeySigner;
use anyhow::{Context, Result};
use tracing::{info, warn};

use crate::chain::EthChain;
use crate::container::{
    LogStreamHandle, RelayContainerConfig, RelayContainerHandle, RelayOrchestrator,
};
use crate::events::EventListener;
use crate::forge::{DeployedContract, Forge};
use crate::relay_config;

/// States of a suite run, in execution order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SuiteState {
    /// Nothing has happened yet
    Idle,
    /// Relay image pulled
    ImagePulled,
    /// Relay sidecar created and started
    ContainerRunning,
    /// Test accounts generated and funded
    AccountsFunded,
    /// Bridge contract deployed
    ContractsDeployed,
    /// Relay configuration points at the fresh deployment
    ConfigSynced,
    /// Relay process started inside the sidecar
    RelayStarted,
    /// Bridge-triggering call observed on-chain
    EventsObserved,
    /// Cleanup finished
    TornDown,
}

impl SuiteState {
    /// The only state reachable from this one, if any.
    pub fn successor(self) -> Option<SuiteState> {
        use SuiteState::*;
        match self {
            Idle => Some(ImagePulled),
            ImagePulled => Some(ContainerRunning),
            ContainerRunning => Some(AccountsFunded),
            AccountsFunded => Some(ContractsDeployed),
            ContractsDeployed => Some(ConfigSynced),
            ConfigSynced => Some(RelayStarted),
            RelayStarted => Some(EventsObserved),
            EventsObserved => Some(TornDown),
            TornDown => None,
        }
    }
}

/// Configuration for one suite run
#[derive(Debug, Clone)]
pub struct SuiteConfig {
    /// EVM chain HTTP RPC endpoint
    pub rpc_url: String,
    /// EVM chain WebSocket endpoint
    pub ws_url: String,
    /// Relay sidecar image
    pub relay_image: String,
    /// Counterpart chain node image, force-stopped at teardown
    pub counterpart_image: String,
    /// Name for the relay container
    pub container_name: String,
    /// Host path of the relay configuration document
    pub relay_config_path: PathBuf,
    /// Network entry name the relay uses for the EVM chain
    pub network_name: String,
    /// Bridge contract name (case sensitive, as in the source file)
    pub bridge_contract: String,
    /// Path to the bridge contract source
    pub bridge_source: PathBuf,
    /// Optional Foundry script target (`path/Script.s.sol:Name`) broadcast
    /// before the bridge contract deployment, for auxiliary contracts
    pub setup_script: Option<String>,
    /// Constructor arguments for the bridge contract
    pub constructor_args: Vec<String>,
    /// Relay binary name inside the container
    pub relay_bin: String,
    /// Faucet private key, 0x-prefixed hex
    pub faucet_key: String,
    /// Counterpart chain RPC endpoint
    pub counterpart_rpc: String,
    /// Counterpart chain gRPC endpoint
    pub counterpart_grpc: String,
    /// Function signature of the bridge-triggering call
    pub trigger_signature: String,
    /// Ordered arguments for the bridge-triggering call
    pub trigger_args: Vec<String>,
    /// Native value attached to the bridge-triggering call, in wei
    pub trigger_value: u128,
    /// How long to wait for the bridge event
    pub event_timeout: Duration,
    /// Fixed delay after stopping containers at teardown
    pub teardown_delay: Duration,
    /// File the relay container logs are streamed into
    pub log_path: PathBuf,
}

impl Default for SuiteConfig {
    fn default() -> Self {
        Self {
            rpc_url: "http://127.0.0.1:8545".to_string(),
            ws_url: "ws://127.0.0.1:8545".to_string(),
            relay_image: "bridge-relay:latest".to_string(),
            counterpart_image: "counterpart-node:latest".to_string(),
            container_name: "bridge-relay-test".to_string(),
            relay_config_path: PathBuf::from("relay_config.yaml"),
            network_name: "evm".to_string(),
            bridge_contract: "Bridge".to_string(),
            bridge_source: PathBuf::from("contracts/src/Bridge.sol"),
            setup_script: None,
            constructor_args: Vec::new(),
            relay_bin: "relay".to_string(),
            // Anvil's account (9), used as the faucet.
            faucet_key: "0x2a871d0798f97d79848a013d4936a73bf4cc922c825d33c1cf7073dff6d409c6"
                .to_string(),
            counterpart_rpc: "http://127.0.0.1:26657".to_string(),
            counterpart_grpc: "http://127.0.0.1:9090".to_string(),
            trigger_signature: "deposit(string,uint64)".to_string(),
            trigger_args: vec!["test-payload".to_string(), "1048576".to_string()],
            trigger_value: 5_000_000_000_000,
            event_timeout: Duration::from_secs(60),
            teardown_delay: Duration::from_secs(10),
            log_path: PathBuf::from("logs/relay.log"),
        }
    }
}

/// Owns every resource of one suite run and drives the pipeline.
///
/// All runtime handles (container, log stream, event listener) live here and
/// are threaded into [`BridgeSuite::teardown`]; there is no process-wide
/// mutable state for the interrupt path to reach into.
pub struct BridgeSuite {
    config: SuiteConfig,
    orchestrator: RelayOrchestrator,
    state: SuiteState,
    container: Option<RelayContainerHandle>,
    log_stream: Option<LogStreamHandle>,
    listener: Option<EventListener>,
    chain: Option<EthChain>,
    deployer: Option<PrivateKeySigner>,
    user: Option<PrivateKeySigner>,
    contract: Option<DeployedContract>,
}

impl BridgeSuite {
    /// Create a suite against the local container runtime.
    pub fn new(config: SuiteConfig) -> Result<Self> {
        let orchestrator = RelayOrchestrator::new().context("failed to connect to Docker")?;
        Ok(Self {
            config,
            orchestrator,
            state: SuiteState::Idle,
            container: None,
            log_stream: None,
            listener: None,
            chain: None,
            deployer: None,
            user: None,
            contract: None,
        })
    }

    /// Current suite state.
    pub fn state(&self) -> SuiteState {
        self.state
    }

    /// Address of the deployed bridge contract, once available.
    pub fn bridge_contract(&self) -> Option<&DeployedContract> {
        self.contract.as_ref()
    }

    fn expect_state(&self, expected: SuiteState) -> Result<()> {
        anyhow::ensure!(
            self.state == expected,
            "step requires suite state {:?}, but suite is {:?}",
            expected,
            self.state
        );
        Ok(())
    }

    /// Run the whole pipeline, tearing down on success.
    ///
    /// No step retries on failure; errors abort the run and leave teardown
    /// to the caller.
    pub async fn run(&mut self) -> Result<()> {
        self.pull_relay_image().await?;
        self.start_relay_container().await?;
        self.init_accounts().await?;
        self.deploy_bridge_contract().await?;
        self.sync_relay_config().await?;
        self.start_relay().await?;
        self.trigger_and_observe().await?;
        self.teardown().await;
        Ok(())
    }

    /// Pull the relay sidecar image.
    pub async fn pull_relay_image(&mut self) -> Result<()> {
        self.expect_state(SuiteState::Idle)?;
        self.orchestrator
            .pull_image(&self.config.relay_image)
            .await?;
        self.state = SuiteState::ImagePulled;
        Ok(())
    }

    /// Start the relay sidecar and begin streaming its logs to disk.
    pub async fn start_relay_container(&mut self) -> Result<()> {
        self.expect_state(SuiteState::ImagePulled)?;

        let container_config = RelayContainerConfig::new(
            self.config.relay_image.clone(),
            self.config.relay_config_path.clone(),
        )
        .with_container_name(self.config.container_name.clone());

        let handle = self.orchestrator.run_with_config(&container_config).await?;

        if let Some(parent) = self.config.log_path.parent() {
            tokio::fs::create_dir_all(parent)
                .await
                .context("failed to create log directory")?;
        }
        let sink = tokio::fs::File::create(&self.config.log_path)
            .await
            .context("failed to create relay log file")?;
        self.log_stream = Some(self.orchestrator.stream_logs_to_sink(&handle, sink));

        info!(container_id = %handle.id, log = %self.config.log_path.display(), "relay sidecar running");
        self.container = Some(handle);
        self.state = SuiteState::ContainerRunning;
        Ok(())
    }

    /// Connect to the chain and create funded deployer and user accounts.
    pub async fn init_accounts(&mut self) -> Result<()> {
        self.expect_state(SuiteState::ContainerRunning)?;

        let faucet: PrivateKeySigner = self
            .config
            .faucet_key
            .parse()
            .context("invalid faucet private key")?;
        let chain = EthChain::connect(&self.config.rpc_url, faucet).await?;

        self.deployer = Some(chain.create_and_fund_account().await?);
        self.user = Some(chain.create_and_fund_account().await?);
        self.chain = Some(chain);

        self.state = SuiteState::AccountsFunded;
        Ok(())
    }

    /// Deploy the bridge contract with `forge create`.
    pub async fn deploy_bridge_contract(&mut self) -> Result<()> {
        self.expect_state(SuiteState::AccountsFunded)?;

        let deployer = self.deployer.as_ref().context("no deployer account")?;
        let chain = self.chain.as_ref().context("no chain client")?;
        let forge = Forge::new(&self.config.rpc_url);

        if let Some(script) = &self.config.setup_script {
            forge
                .deploy_via_script(deployer, script, chain.faucet_address(), &[])
                .await?;
            info!(%script, "setup script broadcast");
        }

        let contract = forge
            .deploy_via_create(
                deployer,
                &self.config.bridge_contract,
                &self.config.bridge_source,
                &self.config.constructor_args,
            )
            .await?;

        info!(address = %contract.address, "bridge contract deployed");
        self.contract = Some(contract);
        self.state = SuiteState::ContractsDeployed;
        Ok(())
    }

    /// Rewrite the relay configuration to point at the fresh deployment.
    pub async fn sync_relay_config(&mut self) -> Result<()> {
        self.expect_state(SuiteState::ContractsDeployed)?;

        let chain = self.chain.as_ref().context("no chain client")?;
        let contract = self.contract.as_ref().context("no deployed contract")?;
        let path = &self.config.relay_config_path;

        relay_config::update_network_endpoint(
            path,
            &self.config.network_name,
            &self.config.rpc_url,
            &self.config.ws_url,
        )?;
        relay_config::update_network_contract(
            path,
            &self.config.network_name,
            &contract.address.to_string(),
            chain.chain_id(),
        )?;
        relay_config::update_counterpart_endpoint(
            path,
            &self.config.counterpart_rpc,
            &self.config.counterpart_grpc,
        )?;

        info!(config = %path.display(), "relay configuration synchronized");
        self.state = SuiteState::ConfigSynced;
        Ok(())
    }

    /// Prime the relay wallet and start the relay inside the sidecar.
    pub async fn start_relay(&mut self) -> Result<()> {
        self.expect_state(SuiteState::ConfigSynced)?;

        let container = self.container.as_ref().context("no relay container")?;
        let relay = &self.config.relay_bin;

        // Output is redirected to PID 1 so it lands in the container logs.
        let wallet_cmd = format!("{relay} wallet address >> /proc/1/fd/1 2>> /proc/1/fd/2");
        self.orchestrator
            .exec(container, vec!["sh", "-c", &wallet_cmd])
            .await?;

        let start_cmd = format!("{relay} start >> /proc/1/fd/1 2>> /proc/1/fd/2");
        self.orchestrator
            .exec(container, vec!["sh", "-c", &start_cmd])
            .await?;

        self.state = SuiteState::RelayStarted;
        Ok(())
    }

    /// Send the bridge-triggering call and wait for the contract event.
    pub async fn trigger_and_observe(&mut self) -> Result<()> {
        self.expect_state(SuiteState::RelayStarted)?;

        let contract = self.contract.as_ref().context("no deployed contract")?;
        let user = self.user.as_ref().context("no user account")?;

        let mut listener = EventListener::subscribe(&self.config.ws_url, contract.address).await?;

        let forge = Forge::new(&self.config.rpc_url);
        let tx_hash = forge
            .cast_send(
                contract.address,
                &self.config.trigger_signature,
                &self.config.trigger_args,
                user,
                Some(U256::from(self.config.trigger_value)),
            )
            .await?;
        info!(%tx_hash, "bridge trigger transaction sent");

        let event = listener.next_event(self.config.event_timeout).await;
        self.listener = Some(listener);

        anyhow::ensure!(
            event.is_some(),
            "no bridge event observed within {:?}",
            self.config.event_timeout
        );

        info!("bridge event observed");
        self.state = SuiteState::EventsObserved;
        Ok(())
    }

    /// Best-effort cleanup: cancel background tasks, stop the relay
    /// container, stop anything running the counterpart image, then wait a
    /// fixed delay. Safe to call from any state; not reentrant.
    pub async fn teardown(&mut self) {
        info!("tearing down suite");

        if let Some(listener) = self.listener.take() {
            listener.shutdown().await;
        }
        if let Some(log_stream) = self.log_stream.take() {
            log_stream.shutdown().await;
        }

        if let Some(container) = self.container.take() {
            if let Err(e) = self.orchestrator.stop(&container).await {
                warn!(container_id = %container.id, "failed to stop relay container: {e}");
            }
        }

        match self
            .orchestrator
            .stop_all_by_image(&self.config.counterpart_image)
            .await
        {
            Ok(outcomes) => {
                for failed in outcomes.iter().filter(|o| o.outcome.is_err()) {
                    warn!(
                        container_id = %failed.container_id,
                        "counterpart container survived teardown: {:?}",
                        failed.outcome
                    );
                }
            }
            Err(e) => warn!("failed to stop counterpart containers: {e}"),
        }

        tokio::time::sleep(self.config.teardown_delay).await;
        self.state = SuiteState::TornDown;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn states_form_a_single_chain() {
        let mut state = SuiteState::Idle;
        let mut seen = vec![state];
        while let Some(next) = state.successor() {
            seen.push(next);
            state = next;
        }
        assert_eq!(state, SuiteState::TornDown);
        assert_eq!(seen.len(), 9);
    }

    #[test]
    fn torn_down_is_terminal() {
        assert_eq!(SuiteState::TornDown.successor(), None);
    }

    #[test]
    fn default_config_targets_local_anvil() {
        let config = SuiteConfig::default();
        assert_eq!(config.rpc_url, "http://127.0.0.1:8545");
        assert_eq!(config.ws_url, "ws://127.0.0.1:8545");
        assert_eq!(config.network_name, "evm");
        assert!(config.faucet_key.starts_with("0x"));
        assert_eq!(config.event_timeout, Duration::from_secs(60));
    }
}
