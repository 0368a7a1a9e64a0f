//! Pipeline error taxonomy.
//!
//! Each variant maps to exactly one terminal run status, so callers and test
//! harnesses can assert on stable labels.

use thiserror::Error;

/// Result type alias for pipeline operations.
pub type Result<T> = std::result::Result<T, PipelineError>;

/// Errors that terminate a proof-generation run.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The raw email was rejected before input construction.
    #[error("malformed email: {0}")]
    MalformedEmail(String),

    /// The circuit-input builder rejected the normalized email.
    #[error("failed to build circuit input: {0}")]
    InputBuild(String),

    /// Proving-artifact download failed.
    #[error("failed to download proving artifacts: {0}")]
    Download(String),

    /// Proof computation failed.
    #[error("failed to compute proof: {0}")]
    Prove(String),

    /// A newer run was started; this run's result was discarded.
    #[error("run superseded by a newer one")]
    Superseded,
}
