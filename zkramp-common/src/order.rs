//! Escrow ledger order and claim records.
//!
//! Raw rows come off the ledger loosely typed; conversion into the typed
//! records here fails closed so malformed data never reaches the mirror.

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Lifecycle of an on-ramp order. Labels are the ledger's own.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OrderStatus {
    Unopened,
    Open,
    Filled,
    Cancelled,
}

impl OrderStatus {
    pub fn from_raw(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::Unopened),
            1 => Ok(Self::Open),
            2 => Ok(Self::Filled),
            3 => Ok(Self::Cancelled),
            other => Err(Error::InvalidLedgerRow(format!(
                "unknown order status {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unopened => "unopened",
            Self::Open => "open",
            Self::Filled => "filled",
            Self::Cancelled => "cancelled",
        }
    }
}

/// Lifecycle of a claim against an order.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ClaimStatus {
    Unsubmitted,
    Submitted,
    Used,
    Clawback,
}

impl ClaimStatus {
    pub fn from_raw(raw: u8) -> Result<Self> {
        match raw {
            0 => Ok(Self::Unsubmitted),
            1 => Ok(Self::Submitted),
            2 => Ok(Self::Used),
            3 => Ok(Self::Clawback),
            other => Err(Error::InvalidLedgerRow(format!(
                "unknown claim status {other}"
            ))),
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Unsubmitted => "unsubmitted",
            Self::Submitted => "submitted",
            Self::Used => "used",
            Self::Clawback => "clawback",
        }
    }
}

/// An on-ramp order as mirrored from the ledger. Status only changes through
/// a confirmed ledger read, never locally.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Order {
    pub order_id: u64,
    /// Address of the token holder who posted the order.
    pub on_ramper: String,
    /// Public key claimants encrypt their payment handle against.
    pub on_ramper_encrypt_public_key: String,
    /// Token amount escrowed, 10^6 fixed point.
    pub amount_to_receive: u64,
    /// Ceiling on the fiat the on-ramper will pay, same scale.
    pub max_amount_to_pay: u64,
    pub status: OrderStatus,
}

/// A counterparty's claim against one order.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct OrderClaim {
    pub claim_id: u64,
    pub off_ramper: String,
    /// Opaque commitment to the off-ramper's payment handle, decimal string.
    pub hashed_venmo_id: String,
    pub status: ClaimStatus,
    pub encrypted_off_ramper_venmo_id: Vec<u8>,
    /// Unix seconds after which the claim can be clawed back.
    pub claim_expiration_time: u64,
    /// Floor on the fiat the off-ramper will accept, 10^6 fixed point.
    pub min_amount_to_pay: u64,
}

/// An order row as returned by the ledger read client, prior to validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawOrder {
    pub order_id: u64,
    pub on_ramper: String,
    pub on_ramper_encrypt_public_key: String,
    pub amount_to_receive: u64,
    pub max_amount_to_pay: u64,
    pub status: u8,
}

/// A claim row as returned by the ledger read client, prior to validation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RawClaim {
    pub claim_id: u64,
    pub off_ramper: String,
    pub hashed_venmo_id: String,
    pub status: u8,
    pub encrypted_off_ramper_venmo_id: Vec<u8>,
    pub claim_expiration_time: u64,
    pub min_amount_to_pay: u64,
}

impl TryFrom<RawOrder> for Order {
    type Error = Error;

    fn try_from(raw: RawOrder) -> Result<Self> {
        if raw.on_ramper.is_empty() {
            return Err(Error::InvalidLedgerRow(format!(
                "order {} has an empty on-ramper address",
                raw.order_id
            )));
        }
        Ok(Self {
            order_id: raw.order_id,
            on_ramper: raw.on_ramper,
            on_ramper_encrypt_public_key: raw.on_ramper_encrypt_public_key,
            amount_to_receive: raw.amount_to_receive,
            max_amount_to_pay: raw.max_amount_to_pay,
            status: OrderStatus::from_raw(raw.status)?,
        })
    }
}

impl TryFrom<RawClaim> for OrderClaim {
    type Error = Error;

    fn try_from(raw: RawClaim) -> Result<Self> {
        if raw.off_ramper.is_empty() {
            return Err(Error::InvalidLedgerRow(format!(
                "claim {} has an empty off-ramper address",
                raw.claim_id
            )));
        }
        if raw.hashed_venmo_id.is_empty()
            || !raw.hashed_venmo_id.bytes().all(|b| b.is_ascii_digit())
        {
            return Err(Error::InvalidLedgerRow(format!(
                "claim {} has a non-decimal venmo commitment",
                raw.claim_id
            )));
        }
        Ok(Self {
            claim_id: raw.claim_id,
            off_ramper: raw.off_ramper,
            hashed_venmo_id: raw.hashed_venmo_id,
            status: ClaimStatus::from_raw(raw.status)?,
            encrypted_off_ramper_venmo_id: raw.encrypted_off_ramper_venmo_id,
            claim_expiration_time: raw.claim_expiration_time,
            min_amount_to_pay: raw.min_amount_to_pay,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_raw_order() -> RawOrder {
        RawOrder {
            order_id: 7,
            on_ramper: "0x24506dc1918183960ac04db859eb293b115952af".into(),
            on_ramper_encrypt_public_key: "0x04aabb".into(),
            amount_to_receive: 100_000_000,
            max_amount_to_pay: 101_000_000,
            status: 1,
        }
    }

    #[test]
    fn raw_order_converts() {
        let order = Order::try_from(sample_raw_order()).unwrap();
        assert_eq!(order.order_id, 7);
        assert_eq!(order.status, OrderStatus::Open);
    }

    #[test]
    fn unknown_status_fails_closed() {
        let mut raw = sample_raw_order();
        raw.status = 9;
        assert!(Order::try_from(raw).is_err());
    }

    #[test]
    fn empty_address_fails_closed() {
        let mut raw = sample_raw_order();
        raw.on_ramper.clear();
        assert!(Order::try_from(raw).is_err());
    }

    #[test]
    fn claim_requires_decimal_commitment() {
        let raw = RawClaim {
            claim_id: 1,
            off_ramper: "0xabc".into(),
            hashed_venmo_id: "0xdeadbeef".into(),
            status: 0,
            encrypted_off_ramper_venmo_id: vec![1, 2, 3],
            claim_expiration_time: 1_700_000_000,
            min_amount_to_pay: 99_000_000,
        };
        assert!(OrderClaim::try_from(raw).is_err());
    }

    #[test]
    fn status_labels_are_stable() {
        assert_eq!(OrderStatus::Open.as_str(), "open");
        assert_eq!(ClaimStatus::Clawback.as_str(), "clawback");
        assert_eq!(
            serde_json::to_string(&OrderStatus::Cancelled).unwrap(),
            "\"cancelled\""
        );
        assert_eq!(
            serde_json::from_str::<ClaimStatus>("\"used\"").unwrap(),
            ClaimStatus::Used
        );
    }
}
