//! External prover process integration.
//!
//! The proving stack itself lives outside this service. The engine here
//! hands a configured command the circuit input and parses the
//! snarkjs-shaped `proof.json` / `public.json` it leaves behind. The command
//! contract is `<cmd> <circuit> <input.json> <proof.json> <public.json>`.

use std::path::PathBuf;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::info;

use zkramp_common::ProofArtifact;
use zkramp_prover::{CircuitInputBuilder, ProofEngine};

/// Packages the normalized email for the external prover. Circuit-specific
/// witness preparation happens inside the prover command.
pub struct EmailInputBuilder;

impl CircuitInputBuilder for EmailInputBuilder {
    fn build(&self, email: &[u8], correlation: &str) -> Result<serde_json::Value> {
        Ok(serde_json::json!({
            "email": email.iter().map(|byte| byte.to_string()).collect::<Vec<_>>(),
            "order_id": correlation,
        }))
    }
}

/// Runs proof computation in a separate process so the scheduler never
/// carries the multi-minute proving workload.
pub struct SubprocessProofEngine {
    command: String,
    work_dir: PathBuf,
}

impl SubprocessProofEngine {
    pub fn new(command: impl Into<String>, work_dir: impl Into<PathBuf>) -> Self {
        Self {
            command: command.into(),
            work_dir: work_dir.into(),
        }
    }
}

#[async_trait]
impl ProofEngine for SubprocessProofEngine {
    async fn prove(&self, input: serde_json::Value, circuit: &str) -> Result<ProofArtifact> {
        let dir = self.work_dir.join(circuit);
        tokio::fs::create_dir_all(&dir)
            .await
            .with_context(|| format!("failed to create {}", dir.display()))?;

        let input_path = dir.join("input.json");
        let proof_path = dir.join("proof.json");
        let public_path = dir.join("public.json");
        tokio::fs::write(&input_path, serde_json::to_vec(&input)?)
            .await
            .with_context(|| format!("failed to write {}", input_path.display()))?;

        info!(command = %self.command, circuit, "launching external prover");
        let status = Command::new(&self.command)
            .arg(circuit)
            .arg(&input_path)
            .arg(&proof_path)
            .arg(&public_path)
            .kill_on_drop(true)
            .status()
            .await
            .with_context(|| format!("failed to launch prover command '{}'", self.command))?;
        if !status.success() {
            bail!("prover command exited with {status}");
        }

        let proof = serde_json::from_slice(
            &tokio::fs::read(&proof_path)
                .await
                .with_context(|| format!("prover left no {}", proof_path.display()))?,
        )
        .context("failed to parse proof.json")?;
        let public_signals = serde_json::from_slice(
            &tokio::fs::read(&public_path)
                .await
                .with_context(|| format!("prover left no {}", public_path.display()))?,
        )
        .context("failed to parse public.json")?;
        Ok(ProofArtifact {
            proof,
            public_signals,
        })
    }
}
