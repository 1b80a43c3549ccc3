//! Cooperative ledger: settlement of payment events, admin-approved payouts
//! and the request side that creates pending transactions.

use std::sync::Arc;

use serde::Serialize;
use tracing::instrument;

use crate::error::{LedgerError, Result};
use crate::ledger::model::{AuditActivity, Transaction, Wallet};
use crate::ledger::store::LedgerStore;

pub mod audit;
pub mod holdings;
pub mod idempotency;
pub mod initiation;
pub mod model;
pub mod mutation;
pub mod redemption;
pub mod resolution;
pub mod settlement;
pub mod store;
pub mod withdrawal;

/// Entry point to every ledger operation. Cheap to clone.
#[derive(Clone)]
pub struct Ledger {
    store: Arc<dyn LedgerStore>,
}

/// A transaction together with the audit trail that references it.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransactionRecord {
    pub transaction: Transaction,
    pub activities: Vec<AuditActivity>,
}

impl Ledger {
    pub fn new(store: Arc<dyn LedgerStore>) -> Self {
        Ledger { store }
    }

    pub fn store(&self) -> &dyn LedgerStore {
        self.store.as_ref()
    }

    #[instrument(skip(self))]
    pub fn transaction(&self, reference: &str) -> Result<TransactionRecord> {
        self.store().with_atomic_unit(|tx| {
            let transaction = tx
                .find_transaction_by_reference(reference)?
                .ok_or_else(|| LedgerError::TransactionNotFound(reference.to_string()))?;
            let activities = tx.activities_for_transaction(transaction.id)?;
            Ok(TransactionRecord {
                transaction,
                activities,
            })
        })
    }

    #[instrument(skip(self))]
    pub fn wallet(&self, id: i64) -> Result<Wallet> {
        self.store().with_atomic_unit(|tx| {
            tx.find_wallet(id)?
                .ok_or(LedgerError::RecordNotFound { entity: "wallet", id })
        })
    }
}
