//! Contract deployment and calls through the Foundry toolchain
//!
//! Everything here shells out to `forge`/`cast` as blocking child processes
//! with output captured in memory. Deployed addresses are recovered from
//! `forge create` output by matching a well-formed address token, not a
//! fixed column offset.

use std::path::Path;
use std::process::Output;
use std::str::FromStr;
use std::sync::OnceLock;

use alloy::primitives::{Address, U256};
use alloy::signers::local::PrivateKeySigner;
use regex::Regex;
use tokio::process::Command;
use tracing::{debug, info};

use crate::error::{Error, Result};

/// Environment variable through which deploy scripts receive the faucet
/// address so they can self-fund.
pub const ENV_FAUCET_ADDRESS: &str = "E2E_FAUCET_ADDRESS";

/// Gas price passed to `forge create`, in wei.
const CREATE_GAS_PRICE: &str = "20000000000";

/// A successfully deployed bridge contract.
///
/// The address is validated at extraction time and never recomputed.
#[derive(Debug, Clone)]
pub struct DeployedContract {
    /// Contract name as given to the create tool
    pub name: String,
    /// On-chain address
    pub address: Address,
    /// Address of the deploying account
    pub deployer: Address,
}

/// Invoker for `forge` deployments and `cast` calls against one RPC endpoint.
pub struct Forge {
    rpc: String,
}

impl Forge {
    /// Create an invoker targeting the given RPC endpoint.
    pub fn new(rpc: &str) -> Self {
        Self {
            rpc: rpc.to_string(),
        }
    }

    /// Deploy through a Foundry script target
    /// (`path/To/Script.s.sol:ScriptName`), non-interactively.
    ///
    /// The faucet address and the raw deployer key are injected into the
    /// script's environment. Returns the captured combined output.
    pub async fn deploy_via_script(
        &self,
        deployer: &PrivateKeySigner,
        script_target: &str,
        faucet_address: Address,
        extra_env: &[(String, String)],
    ) -> Result<String> {
        let args = vec![
            "script".to_string(),
            "--rpc-url".to_string(),
            self.rpc.clone(),
            "--broadcast".to_string(),
            "--non-interactive".to_string(),
            "-vvvv".to_string(),
            script_target.to_string(),
        ];

        info!(script_target, "deploying via forge script");
        let mut cmd = Command::new("forge");
        cmd.args(&args)
            .env(ENV_FAUCET_ADDRESS, faucet_address.to_string())
            .env("PRIVATE_KEY", private_key_hex(deployer));
        for (key, value) in extra_env {
            cmd.env(key, value);
        }

        let output = cmd.output().await?;
        check_deploy_status("forge", &args, &output)?;

        let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
        combined.push_str(&String::from_utf8_lossy(&output.stderr));
        Ok(combined)
    }

    /// Deploy a single contract with `forge create`, returning its address.
    pub async fn deploy_via_create(
        &self,
        deployer: &PrivateKeySigner,
        contract_name: &str,
        source_path: &Path,
        constructor_args: &[String],
    ) -> Result<DeployedContract> {
        let mut args = vec![
            "create".to_string(),
            format!("{}:{}", source_path.display(), contract_name),
            "--rpc-url".to_string(),
            self.rpc.clone(),
            "--private-key".to_string(),
            private_key_hex(deployer),
            "--broadcast".to_string(),
            "--gas-price".to_string(),
            CREATE_GAS_PRICE.to_string(),
            "-vvvv".to_string(),
        ];
        if !constructor_args.is_empty() {
            args.push("--constructor-args".to_string());
            args.extend(constructor_args.iter().cloned());
        }

        info!(contract_name, source = %source_path.display(), "deploying via forge create");
        let output = Command::new("forge").args(&args).output().await?;
        check_deploy_status("forge", &args, &output)?;

        let stdout = String::from_utf8_lossy(&output.stdout);
        let address = extract_deployed_address(&stdout)?;
        info!(contract_name, %address, "contract deployed");

        Ok(DeployedContract {
            name: contract_name.to_string(),
            address,
            deployer: deployer.address(),
        })
    }

    /// Send a state-changing call with `cast send`.
    ///
    /// Returns the transaction hash reported by the tool.
    pub async fn cast_send(
        &self,
        contract: Address,
        function_sig: &str,
        call_args: &[String],
        key: &PrivateKeySigner,
        value: Option<U256>,
    ) -> Result<String> {
        let mut args = vec![
            "send".to_string(),
            contract.to_string(),
            function_sig.to_string(),
        ];
        args.extend(call_args.iter().cloned());
        if let Some(value) = value {
            args.push("--value".to_string());
            args.push(value.to_string());
        }
        args.push("--rpc-url".to_string());
        args.push(self.rpc.clone());
        args.push("--private-key".to_string());
        args.push(private_key_hex(key));

        debug!(%contract, function_sig, "cast send");
        let output = Command::new("cast").args(&args).output().await?;
        let stdout = check_call_status(&args, &output)?;

        let tx_hash = extract_tx_hash(&stdout).unwrap_or_else(|| stdout.trim().to_string());
        info!(%contract, function_sig, %tx_hash, "cast send succeeded");
        Ok(tx_hash)
    }

    /// Perform a read-only call with `cast call`, returning trimmed output.
    pub async fn cast_call(
        &self,
        contract: Address,
        function_sig: &str,
        call_args: &[String],
    ) -> Result<String> {
        let mut args = vec![
            "call".to_string(),
            contract.to_string(),
            function_sig.to_string(),
        ];
        args.extend(call_args.iter().cloned());
        args.push("--rpc-url".to_string());
        args.push(self.rpc.clone());

        debug!(%contract, function_sig, "cast call");
        let output = Command::new("cast").args(&args).output().await?;
        let stdout = check_call_status(&args, &output)?;
        Ok(stdout.trim().to_string())
    }
}

fn private_key_hex(key: &PrivateKeySigner) -> String {
    format!("0x{}", alloy::hex::encode(key.to_bytes()))
}

fn check_deploy_status(tool: &str, args: &[String], output: &Output) -> Result<()> {
    if output.status.success() {
        return Ok(());
    }
    Err(Error::Deployment {
        argv: format!("{tool} {}", args.join(" ")),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

fn check_call_status(args: &[String], output: &Output) -> Result<String> {
    let stdout = String::from_utf8_lossy(&output.stdout).into_owned();
    if output.status.success() {
        return Ok(stdout);
    }
    Err(Error::Call {
        argv: format!("cast {}", args.join(" ")),
        stdout,
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    })
}

/// Extract the deployed contract address from `forge create` output.
///
/// Anchors on the `Deployed to:` line and requires a well-formed 20-byte hex
/// address token, so format drift in surrounding output does not break the
/// extraction.
pub fn extract_deployed_address(output: &str) -> Result<Address> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE.get_or_init(|| {
        Regex::new(r"(?m)^Deployed to:\s*(0x[0-9a-fA-F]{40})\b").expect("valid regex")
    });

    let captured = re
        .captures(output)
        .and_then(|c| c.get(1))
        .ok_or(Error::AddressNotFound)?;

    Address::from_str(captured.as_str()).map_err(|_| Error::AddressNotFound)
}

fn extract_tx_hash(stdout: &str) -> Option<String> {
    static RE: OnceLock<Regex> = OnceLock::new();
    let re = RE
        .get_or_init(|| Regex::new(r"transactionHash\s+(0x[0-9a-fA-F]{64})").expect("valid regex"));
    re.captures(stdout)
        .and_then(|c| c.get(1))
        .map(|m| m.as_str().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    const CREATE_OUTPUT: &str = "\
Compiling 1 files with Solc 0.8.25
Deployer: 0xf39Fd6e51aad88F6F4ce6aB8827279cffFb92266
Deployed to: 0x5FbDB2315678afecb367f032d93F642f64180aa3
Transaction hash: 0x88fcd9trimmed
";

    #[test]
    fn extracts_address_from_create_output() {
        let address = extract_deployed_address(CREATE_OUTPUT).unwrap();
        assert_eq!(
            address,
            Address::from_str("0x5FbDB2315678afecb367f032d93F642f64180aa3").unwrap()
        );
    }

    #[test]
    fn extraction_survives_extra_whitespace() {
        let output = "Deployed to:    0x5FbDB2315678afecb367f032d93F642f64180aa3  \n";
        assert!(extract_deployed_address(output).is_ok());
    }

    #[test]
    fn missing_address_line_is_an_error() {
        let output = "Compiling 1 files\nTransaction hash: 0xabc\n";
        assert!(matches!(
            extract_deployed_address(output),
            Err(Error::AddressNotFound)
        ));
    }

    #[test]
    fn malformed_address_token_is_an_error() {
        // Too short to be a 20-byte address; must not be extracted.
        let output = "Deployed to: 0xDEADBEEF\n";
        assert!(matches!(
            extract_deployed_address(output),
            Err(Error::AddressNotFound)
        ));
    }

    #[test]
    fn address_must_be_anchored_at_line_start() {
        let output = "note: Deployed to: 0x5FbDB2315678afecb367f032d93F642f64180aa3\n";
        assert!(extract_deployed_address(output).is_err());
    }

    #[test]
    fn extracts_tx_hash_from_cast_receipt() {
        let stdout = format!(
            "blockNumber         3\ntransactionHash     0x{}\nstatus              1\n",
            "ab".repeat(32)
        );
        assert_eq!(
            extract_tx_hash(&stdout),
            Some(format!("0x{}", "ab".repeat(32)))
        );
    }

    #[test]
    fn tx_hash_absent_yields_none() {
        assert_eq!(extract_tx_hash("status 1\n"), None);
    }
}
