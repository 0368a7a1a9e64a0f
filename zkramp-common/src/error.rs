//! Error types for the shared transforms.

use thiserror::Error;

/// Result type alias for the shared transforms.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors produced by the pure transforms in this crate.
#[derive(Debug, Error)]
pub enum Error {
    /// The raw email input is unusable before any parsing is attempted.
    #[error("malformed email: {0}")]
    MalformedEmail(&'static str),

    /// A public signal could not be decoded into text.
    #[error("signal decode error: {0}")]
    SignalDecode(String),

    /// A raw ledger row failed validation into a typed record.
    #[error("invalid ledger row: {0}")]
    InvalidLedgerRow(String),

    /// A display-scale amount string could not be parsed.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),
}
