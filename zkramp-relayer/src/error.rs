//! Relayer error taxonomy.

use thiserror::Error;

/// Result type alias for relayer operations.
pub type Result<T> = std::result::Result<T, RelayerError>;

/// Errors surfaced by ledger mirroring, caching and escrow actions.
#[derive(Debug, Error)]
pub enum RelayerError {
    /// A ledger read failed; the previous mirror snapshot stays in place.
    #[error("failed to read escrow state: {0}")]
    LedgerRead(String),

    /// An escrow transaction could not be submitted or confirmed.
    #[error("failed to submit escrow transaction: {0}")]
    LedgerWrite(String),

    /// The session cache backend failed.
    #[error("session cache error: {0}")]
    Cache(#[from] sled::Error),

    /// Filesystem error while opening the session cache.
    #[error("session cache io error: {0}")]
    CacheIo(#[from] std::io::Error),

    /// Cache value serialization failed.
    #[error("serialization error: {0}")]
    Serialize(#[from] serde_json::Error),

    /// An action was attempted against a selection state that cannot
    /// support it.
    #[error("invalid selection: {0}")]
    InvalidSelection(&'static str),

    /// A proof artifact does not have the shape the escrow contract takes.
    #[error("malformed proof artifact: {0}")]
    MalformedProof(String),

    #[error(transparent)]
    Invalid(#[from] zkramp_common::Error),

    #[error(transparent)]
    Pipeline(#[from] zkramp_prover::PipelineError),
}
