use tracing::warn;

use crate::error::{LedgerError, Result};
use crate::ledger::model::{Transaction, TransactionStatus};
use crate::ledger::store::LedgerTx;

/// What the guard decided for one payment event.
#[derive(Debug, Clone, PartialEq)]
pub enum Admission {
    /// The transaction is pending and now holds the status it was moved to.
    Admitted(Transaction),
    /// The transaction had already reached a terminal status; it is returned
    /// as stored.
    AlreadySettled(Transaction),
}

/// Decides whether the event for `reference` may be applied and, if so,
/// moves the transaction from `pending` to `status`.
///
/// `check` runs after the row lock is taken and before the status moves, so
/// a malformed transaction can be rejected with nothing written.
pub fn admit(
    tx: &mut dyn LedgerTx,
    reference: &str,
    status: TransactionStatus,
    check: impl FnOnce(&Transaction) -> Result<()>,
) -> Result<Admission> {
    let stored = tx
        .lock_transaction_by_reference(reference)?
        .ok_or_else(|| LedgerError::TransactionNotFound(reference.to_string()))?;

    if stored.status.is_terminal() {
        warn!(
            reference,
            status = stored.status.as_str(),
            "transaction already settled, skipping"
        );
        return Ok(Admission::AlreadySettled(stored));
    }

    check(&stored)?;

    match tx.transition_transaction(stored.id, status)? {
        Some(moved) => Ok(Admission::Admitted(moved)),
        None => {
            // another unit settled it between the read and the update
            let current = tx.find_transaction(stored.id)?.unwrap_or(stored);
            warn!(reference, status = current.status.as_str(), "lost settlement race, skipping");
            Ok(Admission::AlreadySettled(current))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use bigdecimal::BigDecimal;

    use crate::currency::Currency;
    use crate::database::memory::MemoryLedgerStore;
    use crate::ledger::model::{NewTransaction, TransactionMetadata, TransactionType};
    use crate::ledger::store::LedgerStore;

    fn seed(store: &dyn LedgerStore, reference: &str) {
        store
            .with_atomic_unit(|tx| {
                tx.insert_transaction(NewTransaction {
                    member_id: "m1".into(),
                    cooperative_id: "c1".into(),
                    amount: BigDecimal::from(10),
                    currency: Currency::Ngn,
                    kind: TransactionType::Credit,
                    status: TransactionStatus::Pending,
                    reference: reference.into(),
                    asset_id: None,
                    description: None,
                    metadata: TransactionMetadata::default(),
                })
            })
            .unwrap();
    }

    #[test]
    fn test_unknown_reference() {
        let store: Box<dyn LedgerStore> = Box::new(MemoryLedgerStore::new());
        let err = store
            .with_atomic_unit(|tx| admit(tx, "NOPE", TransactionStatus::Success, |_| Ok(())))
            .unwrap_err();
        assert!(matches!(err, LedgerError::TransactionNotFound(r) if r == "NOPE"));
    }

    #[test]
    fn test_admits_once() {
        let store: Box<dyn LedgerStore> = Box::new(MemoryLedgerStore::new());
        seed(store.as_ref(), "REF");

        let first = store
            .with_atomic_unit(|tx| admit(tx, "REF", TransactionStatus::Success, |_| Ok(())))
            .unwrap();
        assert!(matches!(first, Admission::Admitted(ref t) if t.status == TransactionStatus::Success));

        let second = store
            .with_atomic_unit(|tx| admit(tx, "REF", TransactionStatus::Failed, |_| Ok(())))
            .unwrap();
        assert!(matches!(second, Admission::AlreadySettled(ref t) if t.status == TransactionStatus::Success));
    }

    #[test]
    fn test_rejected_check_leaves_transaction_pending() {
        let store: Box<dyn LedgerStore> = Box::new(MemoryLedgerStore::new());
        seed(store.as_ref(), "REF");

        let err = store
            .with_atomic_unit(|tx| {
                admit(tx, "REF", TransactionStatus::Success, |_| {
                    Err(LedgerError::InvalidAmount("zero".into()))
                })
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));

        let stored = store
            .with_atomic_unit(|tx| tx.lock_transaction_by_reference("REF"))
            .unwrap()
            .unwrap();
        assert_eq!(stored.status, TransactionStatus::Pending);
    }
}
