//! End-to-end test runner for the bridge relay
//!
//! This binary provides a CLI interface for running the bridge suite
//! against a local Anvil chain with the relay in a Docker sidecar.

use std::path::PathBuf;

use anyhow::{Context, Result};
use bridge_e2e_harness::container::RelayOrchestrator;
use bridge_e2e_harness::relay_config::RelayConfig;
use bridge_e2e_harness::suite::{BridgeSuite, SuiteConfig};
use clap::{Parser, Subcommand};
use tracing::{error, info, warn, Level};

#[derive(Parser)]
#[command(name = "bridge-e2e")]
#[command(about = "End-to-end test runner for the cross-chain bridge relay")]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full bridge suite
    Run {
        /// EVM chain RPC endpoint
        #[arg(long, default_value = "http://127.0.0.1:8545")]
        rpc_url: String,
        /// EVM chain WebSocket endpoint
        #[arg(long, default_value = "ws://127.0.0.1:8545")]
        ws_url: String,
        /// Relay sidecar image
        #[arg(long)]
        relay_image: Option<String>,
        /// Counterpart chain image stopped at teardown
        #[arg(long)]
        counterpart_image: Option<String>,
        /// Path to the relay configuration document
        #[arg(long, value_name = "PATH")]
        relay_config: PathBuf,
        /// Network entry name for the EVM chain
        #[arg(long, default_value = "evm")]
        network: String,
        /// Path to the bridge contract source
        #[arg(long, value_name = "PATH")]
        bridge_source: Option<PathBuf>,
        /// Bridge contract name (case sensitive)
        #[arg(long)]
        bridge_contract: Option<String>,
        /// Constructor arguments for the bridge contract
        #[arg(long)]
        constructor_arg: Vec<String>,
        /// Foundry script target broadcast before the bridge deployment
        #[arg(long)]
        setup_script: Option<String>,
    },

    /// Force-stop every container running a given image
    Teardown {
        /// Image references to stop
        #[arg(required = true)]
        images: Vec<String>,
    },

    /// Validate a relay configuration document offline
    CheckConfig {
        /// Path to the relay configuration document
        path: PathBuf,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let level = if cli.verbose {
        Level::DEBUG
    } else {
        Level::INFO
    };
    tracing_subscriber::fmt()
        .with_max_level(level)
        .with_target(false)
        .init();

    match cli.command {
        Commands::Run {
            rpc_url,
            ws_url,
            relay_image,
            counterpart_image,
            relay_config,
            network,
            bridge_source,
            bridge_contract,
            constructor_arg,
            setup_script,
        } => {
            let base = SuiteConfig::default();
            let config = SuiteConfig {
                rpc_url,
                ws_url,
                relay_config_path: relay_config,
                network_name: network,
                constructor_args: constructor_arg,
                setup_script,
                relay_image: relay_image.unwrap_or(base.relay_image),
                counterpart_image: counterpart_image.unwrap_or(base.counterpart_image),
                bridge_source: bridge_source.unwrap_or(base.bridge_source),
                bridge_contract: bridge_contract.unwrap_or(base.bridge_contract),
                ..base
            };

            run_suite(config).await?;
        }
        Commands::Teardown { images } => {
            teardown_images(images).await?;
        }
        Commands::CheckConfig { path } => {
            let config = RelayConfig::load(&path)?;
            info!(
                networks = config.networks.len(),
                counterpart_rpc = %config.counterpart.rpc,
                "relay config OK"
            );
            for network in &config.networks {
                info!(
                    name = %network.name,
                    rpc = %network.rpc,
                    contract = %network.contract,
                    chain_id = network.chain_id,
                    "network entry"
                );
            }
        }
    }

    Ok(())
}

async fn run_suite(config: SuiteConfig) -> Result<()> {
    let mut suite = BridgeSuite::new(config).context("failed to create suite")?;

    // Race the pipeline against an interrupt; either way the suite's own
    // handles drive the cleanup.
    let outcome = {
        let run = suite.run();
        tokio::pin!(run);
        tokio::select! {
            res = &mut run => Some(res),
            _ = tokio::signal::ctrl_c() => None,
        }
    };

    match outcome {
        Some(Ok(())) => {
            info!("bridge suite completed successfully");
            Ok(())
        }
        Some(Err(e)) => {
            error!("bridge suite failed: {e:#}");
            suite.teardown().await;
            Err(e)
        }
        None => {
            warn!("interrupt received, tearing down");
            suite.teardown().await;
            std::process::exit(130);
        }
    }
}

async fn teardown_images(images: Vec<String>) -> Result<()> {
    let orchestrator = RelayOrchestrator::new().context("failed to connect to Docker")?;

    let mut failures = 0usize;
    for image in &images {
        let outcomes = orchestrator.stop_all_by_image(image).await?;
        info!(%image, stopped = outcomes.len(), "stop by image finished");
        failures += outcomes.iter().filter(|o| o.outcome.is_err()).count();
    }

    anyhow::ensure!(failures == 0, "{failures} container(s) failed to stop");
    Ok(())
}
