//! End-to-end test harness for an EVM to counterpart-chain bridge
//!
//! The harness deploys bridge contracts against a local Anvil-style chain
//! through the Foundry toolchain, runs the bridge relay as a Docker sidecar,
//! keeps the relay's YAML configuration synchronized with freshly deployed
//! addresses, and observes the contract events that drive the cross-chain
//! action.
//!
//! The suite is a single sequential control flow; see [`suite::BridgeSuite`]
//! for the pipeline and [`suite::SuiteState`] for its state machine.

pub mod chain;
pub mod container;
pub mod error;
pub mod events;
pub mod forge;
pub mod relay_config;
pub mod suite;

pub use error::{Error, Result};
