//! Relayer configuration.

use anyhow::{Context, Result};
use std::env;

/// Relayer configuration.
#[derive(Clone, Debug)]
pub struct RelayerConfig {
    /// Ethereum RPC URL.
    pub rpc_url: String,
    /// Escrow contract address.
    pub escrow_address: String,
    /// Chain id the signing wallet is bound to.
    pub chain_id: u64,
    /// Address whose orders and claims this relayer acts for.
    pub wallet_address: String,
    /// Private key for signing escrow transactions. A throwaway key is
    /// generated when unset, which only supports read paths.
    pub private_key: Option<String>,
    /// Ledger polling interval in seconds.
    pub poll_interval_secs: u64,
    /// Path of the on-disk session cache.
    pub cache_path: String,
    /// Base URL the proving artifacts are hosted under.
    pub artifact_base_url: String,
    /// Local directory artifacts are downloaded into.
    pub artifact_dir: String,
    /// Name of the circuit to prove against.
    pub circuit_name: String,
    /// External prover command, invoked as
    /// `<cmd> <circuit> <input.json> <proof.json> <public.json>`.
    pub prover_cmd: String,
    /// Directory watched for incoming payment emails.
    pub inbox_dir: String,
}

impl RelayerConfig {
    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self> {
        let rpc_url = env::var("ZKRAMP_RPC_URL").context("ZKRAMP_RPC_URL must be set")?;

        let escrow_address =
            env::var("ZKRAMP_ESCROW_ADDRESS").context("ZKRAMP_ESCROW_ADDRESS must be set")?;

        let chain_id: u64 = env::var("ZKRAMP_CHAIN_ID")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(1);

        let wallet_address =
            env::var("ZKRAMP_WALLET_ADDRESS").context("ZKRAMP_WALLET_ADDRESS must be set")?;

        let private_key = env::var("ZKRAMP_PRIVATE_KEY").ok();

        let poll_interval_secs: u64 = env::var("ZKRAMP_POLL_INTERVAL_SECS")
            .ok()
            .and_then(|s| s.parse().ok())
            .unwrap_or(15);

        let cache_path = env::var("ZKRAMP_CACHE_PATH")
            .unwrap_or_else(|_| "zkramp-session.db".to_string());

        let artifact_base_url = env::var("ZKRAMP_ARTIFACT_BASE_URL")
            .context("ZKRAMP_ARTIFACT_BASE_URL must be set")?;

        let artifact_dir =
            env::var("ZKRAMP_ARTIFACT_DIR").unwrap_or_else(|_| "artifacts".to_string());

        let circuit_name =
            env::var("ZKRAMP_CIRCUIT_NAME").unwrap_or_else(|_| "circuit".to_string());

        let prover_cmd =
            env::var("ZKRAMP_PROVER_CMD").context("ZKRAMP_PROVER_CMD must be set")?;

        let inbox_dir = env::var("ZKRAMP_INBOX_DIR").unwrap_or_else(|_| "inbox".to_string());

        Ok(Self {
            rpc_url,
            escrow_address,
            chain_id,
            wallet_address,
            private_key,
            poll_interval_secs,
            cache_path,
            artifact_base_url,
            artifact_dir,
            circuit_name,
            prover_cmd,
            inbox_dir,
        })
    }
}
