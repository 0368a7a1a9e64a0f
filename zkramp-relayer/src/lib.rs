//! Orchestration layer for the proof-backed fiat on-ramp.
//!
//! The relayer mirrors the escrow ledger, drives proof generation for
//! payment emails through `zkramp-prover`, and submits the escrow
//! transactions that post, claim and settle orders.

pub mod cache;
pub mod config;
pub mod coordinator;
pub mod engine;
pub mod error;
pub mod ledger;
pub mod mirror;

pub use cache::{SessionCache, KEY_EMAIL_FULL, KEY_PROOF, KEY_PUBLIC_SIGNALS};
pub use config::RelayerConfig;
pub use coordinator::{encode_proof_for_chain, ActionCoordinator};
pub use engine::{EmailInputBuilder, SubprocessProofEngine};
pub use error::{RelayerError, Result};
pub use ledger::{EscrowReader, EscrowWriter, EvmEscrowClient, OnRampCall};
pub use mirror::{FormState, LedgerMirror, LedgerSnapshot, MirrorHandle, SelectionView};
