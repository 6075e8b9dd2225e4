//! Relay sidecar container management

mod config;
mod manager;

pub use config::RelayContainerConfig;
pub use manager::{LogStreamHandle, RelayContainerHandle, RelayOrchestrator, StopOutcome};
