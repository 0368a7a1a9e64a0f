//! Escrow ledger access.
//!
//! Reads and writes go through the two traits below so the mirror and
//! coordinator can be exercised against in-process fakes. The EVM client in
//! [`evm`] is the production implementation of both.

use async_trait::async_trait;

use zkramp_common::{Order, OrderClaim, RawClaim, RawOrder};

use crate::error::{RelayerError, Result};

pub mod evm;

pub use evm::EvmEscrowClient;

/// Read access to the escrow contract's order book.
#[async_trait]
pub trait EscrowReader: Send + Sync {
    async fn fetch_orders(&self) -> anyhow::Result<Vec<RawOrder>>;

    async fn fetch_claims(&self, order_id: u64) -> anyhow::Result<Vec<RawClaim>>;
}

/// Proof arguments in the shape the escrow contract's settlement entrypoint
/// takes: two G1 points, one G2 point with each coordinate pair swapped, and
/// the public signal array.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct OnRampCall {
    pub pi_a: [String; 2],
    pub pi_b: [[String; 2]; 2],
    pub pi_c: [String; 2],
    pub public_signals: Vec<String>,
}

/// Write access to the escrow contract.
#[async_trait]
pub trait EscrowWriter: Send + Sync {
    /// Post a new order. Returns the transaction hash.
    async fn post_order(
        &self,
        amount_to_receive: u64,
        max_amount_to_pay: u64,
        encrypt_public_key: &str,
    ) -> anyhow::Result<String>;

    /// Claim an open order as the off-ramper.
    async fn claim_order(
        &self,
        order_id: u64,
        hashed_venmo_id: &str,
        encrypted_venmo_id: &[u8],
        min_amount_to_pay: u64,
    ) -> anyhow::Result<String>;

    /// Settle a claimed order with a payment proof.
    async fn on_ramp(&self, order_id: u64, claim_id: u64, call: &OnRampCall)
        -> anyhow::Result<String>;
}

/// Convert raw order rows, preserving ledger-return order. One undecodable
/// row fails the whole read so a partial order book is never published.
pub fn decode_orders(rows: Vec<RawOrder>) -> Result<Vec<Order>> {
    rows.into_iter()
        .map(|row| Order::try_from(row).map_err(|err| RelayerError::LedgerRead(err.to_string())))
        .collect()
}

/// Convert raw claim rows. Fails closed the same way as [`decode_orders`].
pub fn decode_claims(rows: Vec<RawClaim>) -> Result<Vec<OrderClaim>> {
    rows.into_iter()
        .map(|row| {
            OrderClaim::try_from(row).map_err(|err| RelayerError::LedgerRead(err.to_string()))
        })
        .collect()
}
