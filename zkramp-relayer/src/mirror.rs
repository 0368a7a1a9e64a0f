//! Read-side mirror of the escrow ledger.
//!
//! The mirror polls the escrow contract on a fixed interval and republishes
//! what it reads as immutable snapshots. Order and claim statuses only ever
//! change through a confirmed ledger read; nothing in this process mutates
//! them locally. Selection state lives here too, since which rows are
//! selected decides both the claims to fetch and the form the next escrow
//! action maps to.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::{self, MissedTickBehavior};
use tracing::{debug, warn};

use zkramp_common::{Order, OrderClaim};

use crate::error::{RelayerError, Result};
use crate::ledger::{decode_claims, decode_orders, EscrowReader};

/// Which escrow form the next action maps to.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum FormState {
    /// Nothing selected.
    #[default]
    Default,
    /// Drafting a brand new order.
    New,
    /// A foreign order is selected and can be claimed.
    Claim,
    /// One of our own orders is selected and can be settled.
    Update,
}

/// Orders plus the claims fetched for the selected order, as of one
/// reconcile pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LedgerSnapshot {
    pub orders: Vec<Order>,
    /// Claims against the selected order. Empty when no order is selected.
    pub claims: Vec<OrderClaim>,
}

/// The selected rows resolved against the latest snapshot.
#[derive(Clone, Debug)]
pub struct SelectionView {
    pub form: FormState,
    pub order: Option<Order>,
    pub claim: Option<OrderClaim>,
}

#[derive(Clone, Copy, Debug, Default)]
struct Selection {
    form: FormState,
    order_id: Option<u64>,
    claim_id: Option<u64>,
}

pub struct LedgerMirror<R> {
    reader: Arc<R>,
    wallet_address: String,
    snapshot_tx: watch::Sender<LedgerSnapshot>,
    selection: Mutex<Selection>,
    poll_in_flight: AtomicBool,
}

impl<R: EscrowReader + 'static> LedgerMirror<R> {
    pub fn new(reader: R, wallet_address: impl Into<String>) -> Self {
        let (snapshot_tx, _rx) = watch::channel(LedgerSnapshot::default());
        Self {
            reader: Arc::new(reader),
            wallet_address: wallet_address.into(),
            snapshot_tx,
            selection: Mutex::new(Selection::default()),
            poll_in_flight: AtomicBool::new(false),
        }
    }

    pub fn wallet_address(&self) -> &str {
        &self.wallet_address
    }

    /// Observe ledger snapshots as reconcile passes publish them.
    pub fn subscribe(&self) -> watch::Receiver<LedgerSnapshot> {
        self.snapshot_tx.subscribe()
    }

    /// The most recently published snapshot.
    pub fn snapshot(&self) -> LedgerSnapshot {
        self.snapshot_tx.borrow().clone()
    }

    /// The selection resolved against the latest snapshot. Rows that have
    /// vanished from the ledger resolve to `None`.
    pub fn current_selection(&self) -> SelectionView {
        let selection = *self.lock_selection();
        let snapshot = self.snapshot();
        let order = selection.order_id.and_then(|id| {
            snapshot
                .orders
                .iter()
                .find(|order| order.order_id == id)
                .cloned()
        });
        let claim = selection.claim_id.and_then(|id| {
            snapshot
                .claims
                .iter()
                .find(|claim| claim.claim_id == id)
                .cloned()
        });
        SelectionView {
            form: selection.form,
            order,
            claim,
        }
    }

    /// Select an order row. Our own orders open the settlement form,
    /// everyone else's open the claim form. Any claim selection is cleared.
    pub fn select_order_row(&self, order_id: u64) -> Result<FormState> {
        let snapshot = self.snapshot();
        let order = snapshot
            .orders
            .iter()
            .find(|order| order.order_id == order_id)
            .ok_or(RelayerError::InvalidSelection("order not in snapshot"))?;
        let form = if order.on_ramper.eq_ignore_ascii_case(&self.wallet_address) {
            FormState::Update
        } else {
            FormState::Claim
        };
        let mut selection = self.lock_selection();
        selection.form = form;
        selection.order_id = Some(order_id);
        selection.claim_id = None;
        Ok(form)
    }

    /// Select a claim row against the selected order.
    pub fn select_claim_row(&self, claim_id: u64) -> Result<()> {
        let snapshot = self.snapshot();
        let mut selection = self.lock_selection();
        if selection.order_id.is_none() {
            return Err(RelayerError::InvalidSelection("no order selected"));
        }
        if !snapshot.claims.iter().any(|claim| claim.claim_id == claim_id) {
            return Err(RelayerError::InvalidSelection("claim not in snapshot"));
        }
        selection.claim_id = Some(claim_id);
        Ok(())
    }

    /// Open a blank new-order form.
    pub fn begin_new_order(&self) {
        let mut selection = self.lock_selection();
        selection.form = FormState::New;
        selection.order_id = None;
        selection.claim_id = None;
    }

    pub fn clear_selection(&self) {
        *self.lock_selection() = Selection::default();
    }

    /// Run one reconcile pass. Returns false when a previous pass is still
    /// in flight and this one was skipped.
    pub async fn poll_once(&self) -> Result<bool> {
        if self.poll_in_flight.swap(true, Ordering::SeqCst) {
            debug!("previous reconcile still running, skipping tick");
            return Ok(false);
        }
        let result = self.poll_inner().await;
        self.poll_in_flight.store(false, Ordering::SeqCst);
        result.map(|_| true)
    }

    async fn poll_inner(&self) -> Result<()> {
        let raw_orders = self
            .reader
            .fetch_orders()
            .await
            .map_err(|err| RelayerError::LedgerRead(err.to_string()))?;
        let orders = decode_orders(raw_orders)?;

        let selected_order = self.lock_selection().order_id;
        let claims = match selected_order {
            Some(order_id) => {
                let raw = self
                    .reader
                    .fetch_claims(order_id)
                    .await
                    .map_err(|err| RelayerError::LedgerRead(err.to_string()))?;
                decode_claims(raw)?
            }
            None => Vec::new(),
        };

        self.snapshot_tx.send_replace(LedgerSnapshot { orders, claims });
        Ok(())
    }

    /// Spawn the background polling loop. The loop stops when the returned
    /// handle is dropped.
    pub fn start(self: &Arc<Self>, poll_interval: Duration) -> MirrorHandle {
        let mirror = Arc::clone(self);
        let handle = tokio::spawn(async move {
            let mut ticker = time::interval(poll_interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
            loop {
                ticker.tick().await;
                if let Err(err) = mirror.poll_once().await {
                    warn!(%err, "ledger reconcile failed, keeping previous snapshot");
                }
            }
        });
        MirrorHandle { handle }
    }

    fn lock_selection(&self) -> std::sync::MutexGuard<'_, Selection> {
        self.selection
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Aborts the polling loop on drop.
pub struct MirrorHandle {
    handle: JoinHandle<()>,
}

impl Drop for MirrorHandle {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
