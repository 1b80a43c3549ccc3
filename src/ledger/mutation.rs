use bigdecimal::{BigDecimal, Signed};
use tracing::debug;

use crate::error::{LedgerError, Result};
use crate::ledger::audit;
use crate::ledger::model::{Transaction, TransactionType, Wallet};
use crate::ledger::resolution::ResolvedWallet;
use crate::ledger::store::LedgerTx;

/// Applies `amount` to one wallet in the direction given and records the
/// matching `wallet_balance_updated` activity.
pub fn apply(
    tx: &mut dyn LedgerTx,
    target: &ResolvedWallet,
    amount: &BigDecimal,
    direction: TransactionType,
    transaction: &Transaction,
) -> Result<Wallet> {
    if !amount.is_positive() {
        return Err(LedgerError::InvalidAmount(format!(
            "amount must be positive, got {amount} for wallet {}",
            target.wallet.id
        )));
    }
    let delta = direction.signed(amount);
    let updated = tx.apply_wallet_delta(target.wallet.id, &delta, transaction.id)?;
    debug!(
        wallet_id = updated.id,
        direction = direction.as_str(),
        %amount,
        new_balance = %updated.ledger_balance,
        "wallet balance updated"
    );
    audit::wallet_balance_updated(tx, &updated, amount, direction, transaction, target.strategy);
    Ok(updated)
}

pub fn credit(tx: &mut dyn LedgerTx, target: &ResolvedWallet, transaction: &Transaction) -> Result<Wallet> {
    apply(tx, target, &transaction.amount, TransactionType::Credit, transaction)
}

pub fn debit(tx: &mut dyn LedgerTx, target: &ResolvedWallet, transaction: &Transaction) -> Result<Wallet> {
    apply(tx, target, &transaction.amount, TransactionType::Debit, transaction)
}

/// Fails unless `wallet` can be debited by `amount` without going negative.
pub fn ensure_sufficient(wallet: &Wallet, amount: &BigDecimal) -> Result<()> {
    if &wallet.ledger_balance < amount {
        return Err(LedgerError::InsufficientBalance {
            wallet_id: wallet.id,
            available: wallet.ledger_balance.clone(),
            required: amount.clone(),
        });
    }
    Ok(())
}

/// Locks every wallet about to be debited by `amount` and checks its funds on
/// the locked row. Locks are taken in wallet id order; `targets` keep their
/// order and are refreshed with the locked rows.
pub fn lock_for_debit(tx: &mut dyn LedgerTx, targets: &mut [ResolvedWallet], amount: &BigDecimal) -> Result<()> {
    let mut order: Vec<usize> = (0..targets.len()).collect();
    order.sort_by_key(|&i| targets[i].wallet.id);
    for i in order {
        let id = targets[i].wallet.id;
        let locked = tx
            .lock_wallet(id)?
            .ok_or(LedgerError::RecordNotFound { entity: "wallet", id })?;
        ensure_sufficient(&locked, amount)?;
        targets[i].wallet = locked;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Currency;
    use crate::database::memory::MemoryLedgerStore;
    use crate::ledger::model::{
        ActivityType, NewTransaction, NewWallet, TransactionMetadata, TransactionStatus,
    };
    use crate::ledger::resolution::ResolutionStrategy;
    use crate::ledger::store::LedgerStore;

    fn transaction(tx: &mut dyn LedgerTx, amount: i64) -> Result<Transaction> {
        tx.insert_transaction(NewTransaction {
            member_id: "m1".into(),
            cooperative_id: "c1".into(),
            amount: BigDecimal::from(amount),
            currency: Currency::Ngn,
            kind: TransactionType::Debit,
            status: TransactionStatus::Pending,
            reference: crate::database::idgen::next_reference("TEST"),
            asset_id: None,
            description: None,
            metadata: TransactionMetadata::default(),
        })
    }

    #[test]
    fn test_debit_records_one_activity() {
        let store: Box<dyn LedgerStore> = Box::new(MemoryLedgerStore::new());
        store
            .with_atomic_unit(|tx| {
                let wallet = tx.insert_wallet_if_absent(NewWallet::member("m1", "c1", Currency::Ngn, None))?;
                let seed = transaction(tx, 1000)?;
                tx.apply_wallet_delta(wallet.id, &BigDecimal::from(1000), seed.id)?;

                let t = transaction(tx, 200)?;
                let target = ResolvedWallet {
                    wallet,
                    strategy: ResolutionStrategy::Exact,
                };
                let updated = debit(tx, &target, &t)?;
                assert_eq!(updated.ledger_balance, BigDecimal::from(800));
                assert_eq!(updated.transaction_ids.last(), Some(&t.id));

                let activities = tx.activities_for_transaction(t.id)?;
                assert_eq!(activities.len(), 1);
                assert_eq!(activities[0].activity_type, ActivityType::WalletBalanceUpdated);
                assert_eq!(activities[0].wallet_id, Some(updated.id));
                assert_eq!(activities[0].metadata["previousBalance"], serde_json::json!("1000"));
                assert_eq!(activities[0].metadata["newBalance"], serde_json::json!("800"));
                assert_eq!(activities[0].metadata["fallbackWallet"], serde_json::json!(false));
                Ok(())
            })
            .unwrap();
    }

    #[test]
    fn test_rejects_non_positive_amount() {
        let store: Box<dyn LedgerStore> = Box::new(MemoryLedgerStore::new());
        let err = store
            .with_atomic_unit(|tx| {
                let wallet = tx.insert_wallet_if_absent(NewWallet::member("m1", "c1", Currency::Ngn, None))?;
                let t = transaction(tx, 10)?;
                let target = ResolvedWallet {
                    wallet,
                    strategy: ResolutionStrategy::Exact,
                };
                apply(tx, &target, &BigDecimal::from(0), TransactionType::Credit, &t)
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));
    }

    #[test]
    fn test_ensure_sufficient() {
        let now = chrono::Utc::now().naive_utc();
        let wallet = Wallet {
            id: 1,
            cooperative_id: "c1".into(),
            member_id: Some("m1".into()),
            asset_id: None,
            currency: Currency::Ngn,
            wallet_type: crate::ledger::model::WalletType::Member,
            ledger_balance: BigDecimal::from(100),
            transaction_ids: vec![],
            created_at: now,
            updated_at: now,
        };
        assert!(ensure_sufficient(&wallet, &BigDecimal::from(100)).is_ok());
        assert!(matches!(
            ensure_sufficient(&wallet, &BigDecimal::from(101)),
            Err(LedgerError::InsufficientBalance { wallet_id: 1, .. })
        ));
    }

    #[test]
    fn test_lock_for_debit_checks_current_row() {
        let store: Box<dyn LedgerStore> = Box::new(MemoryLedgerStore::new());
        let err = store
            .with_atomic_unit(|tx| {
                let wallet = tx.insert_wallet_if_absent(NewWallet::member("m1", "c1", Currency::Ngn, None))?;
                let seed = transaction(tx, 1000)?;
                tx.apply_wallet_delta(wallet.id, &BigDecimal::from(1000), seed.id)?;
                let mut targets = vec![ResolvedWallet {
                    wallet: tx.find_wallet(wallet.id)?.unwrap(),
                    strategy: ResolutionStrategy::Exact,
                }];

                // the snapshot above still shows 1000
                let other = transaction(tx, 700)?;
                tx.apply_wallet_delta(wallet.id, &BigDecimal::from(-700), other.id)?;
                assert_eq!(targets[0].wallet.ledger_balance, BigDecimal::from(1000));

                lock_for_debit(tx, &mut targets, &BigDecimal::from(200))?;
                assert_eq!(targets[0].wallet.ledger_balance, BigDecimal::from(300));
                lock_for_debit(tx, &mut targets, &BigDecimal::from(600))
            })
            .unwrap_err();
        assert!(matches!(
            err,
            LedgerError::InsufficientBalance { ref available, .. } if *available == BigDecimal::from(300)
        ));
    }
}
