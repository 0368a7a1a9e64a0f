//! Shared leaf types and pure transforms for the zkramp orchestration layer.
//!
//! Everything here is synchronous and I/O-free: fixed-point amounts, the
//! typed ledger records, the proof artifact shape, email canonicalization and
//! public-signal decoding. The async machinery lives in `zkramp-prover` and
//! `zkramp-relayer`.

pub mod amount;
pub mod email;
pub mod error;
pub mod order;
pub mod proof;
pub mod signals;

pub use error::{Error, Result};
pub use order::{ClaimStatus, Order, OrderClaim, OrderStatus, RawClaim, RawOrder};
pub use proof::{Groth16Proof, ProofArtifact};
pub use signals::{DecodedSignals, SignalLayout};
