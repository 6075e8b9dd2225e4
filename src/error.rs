//! Error types for the bridge test harness

use std::path::PathBuf;

use thiserror::Error;

/// Harness error type
///
/// Every external-tool or runtime failure surfaces immediately and aborts the
/// current suite step. There is no automatic retry and no distinction between
/// transient and permanent failure.
#[derive(Error, Debug)]
pub enum Error {
    /// Chain RPC unreachable or the chain identifier could not be retrieved
    #[error("failed to connect to chain RPC {rpc}: {reason}")]
    Connection {
        /// RPC endpoint that was probed
        rpc: String,
        /// What went wrong
        reason: String,
    },

    /// Funding a freshly generated account failed
    #[error("failed to fund account {address}: {source}")]
    Funding {
        /// Recipient address
        address: String,
        /// Underlying transfer failure
        #[source]
        source: Box<Error>,
    },

    /// The external signed-transfer tool exited nonzero
    #[error("transfer failed: `{argv}`: {stderr}")]
    Transfer {
        /// Full invocation arguments
        argv: String,
        /// Captured stderr of the tool
        stderr: String,
    },

    /// A `cast send`/`cast call` invocation exited nonzero
    #[error("contract call failed: `{argv}`\nstdout: {stdout}\nstderr: {stderr}")]
    Call {
        /// Full invocation arguments
        argv: String,
        /// Captured stdout of the tool
        stdout: String,
        /// Captured stderr of the tool
        stderr: String,
    },

    /// A `forge script`/`forge create` invocation exited nonzero
    #[error("deployment failed: `{argv}`: {stderr}")]
    Deployment {
        /// Full invocation arguments
        argv: String,
        /// Captured stderr of the tool
        stderr: String,
    },

    /// Tool output did not contain a well-formed deployed contract address
    #[error("no deployed contract address found in tool output")]
    AddressNotFound,

    /// Pulling the relay container image failed
    #[error("failed to pull image {image}: {source}")]
    ImagePull {
        /// Image reference
        image: String,
        /// Container runtime error
        #[source]
        source: bollard::errors::Error,
    },

    /// Creating or starting the relay container failed
    #[error("failed to start container {name}: {source}")]
    ContainerStart {
        /// Container name
        name: String,
        /// Container runtime error
        #[source]
        source: bollard::errors::Error,
    },

    /// Executing a command inside the relay container failed
    #[error("failed to exec `{argv}` in container {container_id}: {source}")]
    Exec {
        /// Container identifier
        container_id: String,
        /// Command that was attempted
        argv: String,
        /// Container runtime error
        #[source]
        source: bollard::errors::Error,
    },

    /// The relay configuration document is malformed or unreadable
    #[error("failed to parse relay config {path}: {reason}")]
    ConfigParse {
        /// Path of the configuration document
        path: PathBuf,
        /// Decode or read failure
        reason: String,
    },

    /// The relay configuration document could not be written
    #[error("failed to write relay config {path}: {reason}")]
    ConfigWrite {
        /// Path of the configuration document
        path: PathBuf,
        /// Encode or write failure
        reason: String,
    },

    /// Container runtime error outside a specific lifecycle step
    #[error("container runtime error: {0}")]
    Docker(#[from] bollard::errors::Error),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type alias
pub type Result<T> = std::result::Result<T, Error>;
