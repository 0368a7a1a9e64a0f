//! Proof-generation pipeline for the zkramp on-ramp.
//!
//! The heavy machinery — circuit-input construction, artifact hosting, the
//! proving engine itself — lives behind the traits below; this crate owns
//! the staged orchestration around them.

pub mod artifacts;
pub mod error;
pub mod pipeline;

use async_trait::async_trait;

use zkramp_common::ProofArtifact;

pub use artifacts::{ArtifactFile, ArtifactManifest, HttpArtifactSource};
pub use error::{PipelineError, Result};
pub use pipeline::{PipelineRun, ProofPipeline, RunStatus, Stopwatch};

/// Builds the structured circuit input from a normalized email.
///
/// Implementations are CPU-heavy; the pipeline runs them on a blocking
/// worker so the scheduler is never starved.
pub trait CircuitInputBuilder: Send + Sync {
    fn build(&self, email: &[u8], correlation: &str) -> anyhow::Result<serde_json::Value>;
}

/// Delivers the proving artifacts for a named circuit.
///
/// `on_progress` is invoked once per completed artifact unit with the number
/// of units completed so far.
#[async_trait]
pub trait ArtifactSource: Send + Sync {
    async fn fetch(
        &self,
        circuit: &str,
        on_progress: &(dyn Fn(u32) + Send + Sync),
    ) -> anyhow::Result<()>;
}

/// Computes a proof from a built circuit input.
///
/// A real proof takes minutes; implementations must run the computation off
/// the async scheduler (a worker thread or separate process).
#[async_trait]
pub trait ProofEngine: Send + Sync {
    async fn prove(
        &self,
        input: serde_json::Value,
        circuit: &str,
    ) -> anyhow::Result<ProofArtifact>;
}
