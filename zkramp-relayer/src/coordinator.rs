//! Escrow action coordination.
//!
//! Every escrow write is validated against the current selection before it
//! leaves the process, and the proof artifact handed to settlement is the
//! exact one the pipeline produced. Amounts cross this boundary as decimal
//! strings and are converted to 10^6 fixed point exactly once, here.

use std::sync::{Arc, Mutex};

use tracing::info;

use zkramp_common::amount::parse_amount;
use zkramp_common::{OrderStatus, ProofArtifact};
use zkramp_prover::{ArtifactSource, CircuitInputBuilder, ProofEngine, ProofPipeline};

use crate::cache::SessionCache;
use crate::error::{RelayerError, Result};
use crate::ledger::{EscrowReader, EscrowWriter, OnRampCall};
use crate::mirror::{FormState, LedgerMirror};

pub struct ActionCoordinator<R, W> {
    mirror: Arc<LedgerMirror<R>>,
    writer: Arc<W>,
    cache: SessionCache,
    artifact: Mutex<Option<ProofArtifact>>,
}

impl<R, W> ActionCoordinator<R, W>
where
    R: EscrowReader + 'static,
    W: EscrowWriter,
{
    pub fn new(mirror: Arc<LedgerMirror<R>>, writer: W, cache: SessionCache) -> Self {
        Self {
            mirror,
            writer: Arc::new(writer),
            cache,
            artifact: Mutex::new(None),
        }
    }

    /// Reload the artifact a previous session left in the cache. Returns
    /// whether one was found.
    pub fn restore_cached_artifact(&self) -> Result<bool> {
        match self.cache.load_artifact()? {
            Some(artifact) => {
                *self.lock_artifact() = Some(artifact);
                Ok(true)
            }
            None => Ok(false),
        }
    }

    pub fn artifact(&self) -> Option<ProofArtifact> {
        self.lock_artifact().clone()
    }

    /// Run the proof pipeline for one payment email and hold on to the
    /// artifact for settlement. The cache is written before the in-memory
    /// slot so a crash between the two never loses a finished proof.
    pub async fn generate_proof<B, S, E>(
        &self,
        pipeline: &ProofPipeline<B, S, E>,
        raw_email: &str,
    ) -> Result<ProofArtifact>
    where
        B: CircuitInputBuilder + 'static,
        S: ArtifactSource,
        E: ProofEngine,
    {
        let correlation = match self.mirror.current_selection().order {
            Some(order) => order.order_id.to_string(),
            None => self.mirror.wallet_address().to_string(),
        };
        let artifact = pipeline.run(raw_email, &correlation).await?;
        self.cache.store_completed_run(raw_email, &artifact)?;
        *self.lock_artifact() = Some(artifact.clone());
        Ok(artifact)
    }

    /// Post a new order. Requires the new-order form to be open.
    pub async fn post_order(
        &self,
        amount_to_receive: &str,
        max_amount_to_pay: &str,
        encrypt_public_key: &str,
    ) -> Result<String> {
        if self.mirror.current_selection().form != FormState::New {
            return Err(RelayerError::InvalidSelection("new-order form is not open"));
        }
        let amount_to_receive = parse_amount(amount_to_receive)?;
        let max_amount_to_pay = parse_amount(max_amount_to_pay)?;
        let tx_hash = self
            .writer
            .post_order(amount_to_receive, max_amount_to_pay, encrypt_public_key)
            .await
            .map_err(|err| RelayerError::LedgerWrite(err.to_string()))?;
        info!(%tx_hash, "posted order");
        Ok(tx_hash)
    }

    /// Claim the selected foreign order as the off-ramper.
    pub async fn claim_order(
        &self,
        hashed_venmo_id: &str,
        encrypted_venmo_id: &[u8],
        min_amount_to_pay: &str,
    ) -> Result<String> {
        let view = self.mirror.current_selection();
        if view.form != FormState::Claim {
            return Err(RelayerError::InvalidSelection("no foreign order selected"));
        }
        let order = view
            .order
            .ok_or(RelayerError::InvalidSelection("selected order left the ledger"))?;
        if order.status != OrderStatus::Open {
            return Err(RelayerError::InvalidSelection("selected order is not open"));
        }
        let min_amount_to_pay = parse_amount(min_amount_to_pay)?;
        let tx_hash = self
            .writer
            .claim_order(
                order.order_id,
                hashed_venmo_id,
                encrypted_venmo_id,
                min_amount_to_pay,
            )
            .await
            .map_err(|err| RelayerError::LedgerWrite(err.to_string()))?;
        info!(order = order.order_id, %tx_hash, "claimed order");
        Ok(tx_hash)
    }

    /// Settle our selected order against the selected claim with the held
    /// proof artifact.
    pub async fn on_ramp(&self) -> Result<String> {
        let view = self.mirror.current_selection();
        if view.form != FormState::Update {
            return Err(RelayerError::InvalidSelection("no owned order selected"));
        }
        let order = view
            .order
            .ok_or(RelayerError::InvalidSelection("selected order left the ledger"))?;
        let claim = view
            .claim
            .ok_or(RelayerError::InvalidSelection("no claim selected"))?;
        let artifact = self
            .artifact()
            .ok_or(RelayerError::InvalidSelection("no proof artifact held"))?;
        let call = encode_proof_for_chain(&artifact)?;
        let tx_hash = self
            .writer
            .on_ramp(order.order_id, claim.claim_id, &call)
            .await
            .map_err(|err| RelayerError::LedgerWrite(err.to_string()))?;
        info!(
            order = order.order_id,
            claim = claim.claim_id,
            %tx_hash,
            "settled order"
        );
        Ok(tx_hash)
    }

    fn lock_artifact(&self) -> std::sync::MutexGuard<'_, Option<ProofArtifact>> {
        self.artifact
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Rearrange a snarkjs artifact into the escrow entrypoint's argument shape.
/// The first two coordinates of each G1 point pass through unchanged; the G2
/// point's coordinate pairs are each reversed; public signals are appended
/// as-is.
pub fn encode_proof_for_chain(artifact: &ProofArtifact) -> Result<OnRampCall> {
    let pi_a = first_two(&artifact.proof.pi_a, "pi_a")?;
    if artifact.proof.pi_b.len() < 2 {
        return Err(RelayerError::MalformedProof(format!(
            "pi_b has {} rows, expected at least 2",
            artifact.proof.pi_b.len()
        )));
    }
    let pi_b = [
        swap_pair(&artifact.proof.pi_b[0], "pi_b[0]")?,
        swap_pair(&artifact.proof.pi_b[1], "pi_b[1]")?,
    ];
    let pi_c = first_two(&artifact.proof.pi_c, "pi_c")?;
    Ok(OnRampCall {
        pi_a,
        pi_b,
        pi_c,
        public_signals: artifact.public_signals.clone(),
    })
}

fn first_two(coords: &[String], what: &str) -> Result<[String; 2]> {
    match coords {
        [x, y, ..] => Ok([x.clone(), y.clone()]),
        _ => Err(RelayerError::MalformedProof(format!(
            "{what} has {} coordinates, expected at least 2",
            coords.len()
        ))),
    }
}

fn swap_pair(pair: &[String], what: &str) -> Result<[String; 2]> {
    match pair {
        [a, b] => Ok([b.clone(), a.clone()]),
        _ => Err(RelayerError::MalformedProof(format!(
            "{what} has {} coordinates, expected exactly 2",
            pair.len()
        ))),
    }
}
