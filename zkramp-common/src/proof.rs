//! Proof artifacts in the shape the external proving engine emits.

use serde::{Deserialize, Serialize};

/// A Groth16 proof as serialized by the proving engine: group-element
/// coordinates as decimal strings, `pi_b` a pair of coordinate pairs plus the
/// projective tail the verifier ignores.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Groth16Proof {
    pub pi_a: Vec<String>,
    pub pi_b: Vec<Vec<String>>,
    pub pi_c: Vec<String>,
    #[serde(default)]
    pub protocol: String,
    #[serde(default)]
    pub curve: String,
}

/// A proof plus its public signals, immutable once produced.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProofArtifact {
    pub proof: Groth16Proof,
    pub public_signals: Vec<String>,
}
