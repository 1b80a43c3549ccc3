use std::collections::{BTreeMap, HashSet};
use std::sync::Mutex;

use bigdecimal::BigDecimal;

use crate::currency::Currency;
use crate::database::idgen;
use crate::error::{LedgerError, Result};
use crate::ledger::model::{
    AssetHolding, AssetRedemption, AuditActivity, NewTransaction, NewWallet, Transaction, TransactionStatus,
    Wallet, WalletType, Withdrawal,
};
use crate::ledger::store::{LedgerStore, LedgerTx};

#[derive(Debug, Clone, Default)]
struct MemoryState {
    wallets: BTreeMap<i64, Wallet>,
    transactions: BTreeMap<i64, Transaction>,
    holdings: BTreeMap<i64, AssetHolding>,
    withdrawals: BTreeMap<i64, Withdrawal>,
    redemptions: BTreeMap<i64, AssetRedemption>,
    activities: Vec<AuditActivity>,
}

#[derive(Debug, Clone, Default)]
struct FaultPlan {
    wallet_writes: HashSet<i64>,
    activity_writes: bool,
}

/// In-process ledger store.
///
/// Units run one at a time against a working copy of the state, which
/// replaces the committed state only when the unit succeeds.
#[derive(Debug, Default)]
pub struct MemoryLedgerStore {
    state: Mutex<MemoryState>,
    faults: Mutex<FaultPlan>,
}

impl MemoryLedgerStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes every later balance write to `wallet_id` fail.
    #[cfg(test)]
    pub fn fail_wallet_writes(&self, wallet_id: i64) {
        self.faults.lock().unwrap().wallet_writes.insert(wallet_id);
    }

    /// Makes every later audit write fail.
    #[cfg(test)]
    pub fn fail_activity_writes(&self) {
        self.faults.lock().unwrap().activity_writes = true;
    }
}

fn poisoned<T>(_: T) -> LedgerError {
    LedgerError::StoreUnavailable("memory store lock poisoned".into())
}

impl LedgerStore for MemoryLedgerStore {
    fn run_atomic(&self, unit: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<()>) -> Result<()> {
        let faults = self.faults.lock().map_err(poisoned)?.clone();
        let mut committed = self.state.lock().map_err(poisoned)?;
        let mut working = committed.clone();
        unit(&mut MemoryLedgerTx {
            state: &mut working,
            faults: &faults,
        })?;
        *committed = working;
        Ok(())
    }
}

struct MemoryLedgerTx<'a> {
    state: &'a mut MemoryState,
    faults: &'a FaultPlan,
}

fn now() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

impl LedgerTx for MemoryLedgerTx<'_> {
    fn lock_transaction_by_reference(&mut self, reference: &str) -> Result<Option<Transaction>> {
        self.find_transaction_by_reference(reference)
    }

    fn find_transaction_by_reference(&mut self, reference: &str) -> Result<Option<Transaction>> {
        Ok(self
            .state
            .transactions
            .values()
            .find(|t| t.reference == reference)
            .cloned())
    }

    fn find_transaction(&mut self, id: i64) -> Result<Option<Transaction>> {
        Ok(self.state.transactions.get(&id).cloned())
    }

    fn insert_transaction(&mut self, new: NewTransaction) -> Result<Transaction> {
        if self.state.transactions.values().any(|t| t.reference == new.reference) {
            return Err(LedgerError::DuplicateReference(new.reference));
        }
        let created_at = now();
        let transaction = Transaction {
            id: idgen::next(),
            member_id: new.member_id,
            cooperative_id: new.cooperative_id,
            amount: new.amount,
            currency: new.currency,
            kind: new.kind,
            status: new.status,
            reference: new.reference,
            asset_id: new.asset_id,
            description: new.description,
            metadata: new.metadata,
            created_at,
            updated_at: created_at,
        };
        self.state.transactions.insert(transaction.id, transaction.clone());
        Ok(transaction)
    }

    fn transition_transaction(&mut self, id: i64, status: TransactionStatus) -> Result<Option<Transaction>> {
        match self.state.transactions.get_mut(&id) {
            Some(transaction) if transaction.status == TransactionStatus::Pending => {
                transaction.status = status;
                transaction.updated_at = now();
                Ok(Some(transaction.clone()))
            }
            _ => Ok(None),
        }
    }

    fn find_wallet(&mut self, id: i64) -> Result<Option<Wallet>> {
        Ok(self.state.wallets.get(&id).cloned())
    }

    fn lock_wallet(&mut self, id: i64) -> Result<Option<Wallet>> {
        self.find_wallet(id)
    }

    fn find_member_wallet(
        &mut self,
        member_id: &str,
        currency: Option<Currency>,
        asset_id: Option<&str>,
    ) -> Result<Option<Wallet>> {
        Ok(self
            .state
            .wallets
            .values()
            .find(|w| {
                w.member_id.as_deref() == Some(member_id)
                    && w.asset_id.as_deref() == asset_id
                    && currency.map_or(true, |c| w.currency == c)
            })
            .cloned())
    }

    fn find_cooperative_wallet(
        &mut self,
        cooperative_id: &str,
        wallet_type: WalletType,
        asset_id: Option<&str>,
    ) -> Result<Option<Wallet>> {
        Ok(self
            .state
            .wallets
            .values()
            .find(|w| {
                w.member_id.is_none()
                    && w.cooperative_id == cooperative_id
                    && w.wallet_type == wallet_type
                    && w.asset_id.as_deref() == asset_id
            })
            .cloned())
    }

    fn insert_wallet_if_absent(&mut self, new: NewWallet) -> Result<Wallet> {
        let existing = match new.member_id.as_deref() {
            Some(member_id) => self.find_member_wallet(member_id, None, new.asset_id.as_deref())?,
            None => self.find_cooperative_wallet(&new.cooperative_id, new.wallet_type, new.asset_id.as_deref())?,
        };
        if let Some(wallet) = existing {
            return Ok(wallet);
        }
        let created_at = now();
        let wallet = Wallet {
            id: idgen::next(),
            cooperative_id: new.cooperative_id,
            member_id: new.member_id,
            asset_id: new.asset_id,
            currency: new.currency,
            wallet_type: new.wallet_type,
            ledger_balance: BigDecimal::from(0),
            transaction_ids: Vec::new(),
            created_at,
            updated_at: created_at,
        };
        self.state.wallets.insert(wallet.id, wallet.clone());
        Ok(wallet)
    }

    fn apply_wallet_delta(&mut self, wallet_id: i64, delta: &BigDecimal, transaction_id: i64) -> Result<Wallet> {
        if self.faults.wallet_writes.contains(&wallet_id) {
            return Err(LedgerError::StoreUnavailable(format!("write to wallet {wallet_id} rejected")));
        }
        let wallet = self
            .state
            .wallets
            .get_mut(&wallet_id)
            .ok_or(LedgerError::RecordNotFound {
                entity: "wallet",
                id: wallet_id,
            })?;
        wallet.ledger_balance += delta;
        wallet.transaction_ids.push(transaction_id);
        wallet.updated_at = now();
        Ok(wallet.clone())
    }

    fn lock_holding(&mut self, member_id: &str, asset_id: &str) -> Result<Option<AssetHolding>> {
        Ok(self
            .state
            .holdings
            .values()
            .find(|h| h.member_id == member_id && h.asset_id == asset_id)
            .cloned())
    }

    fn open_holding(&mut self, holding: &AssetHolding) -> Result<AssetHolding> {
        if let Some(existing) = self.lock_holding(&holding.member_id, &holding.asset_id)? {
            return Ok(existing);
        }
        self.state.holdings.insert(holding.id, holding.clone());
        Ok(holding.clone())
    }

    fn save_holding(&mut self, holding: &AssetHolding) -> Result<AssetHolding> {
        match self.state.holdings.get_mut(&holding.id) {
            Some(stored) => {
                *stored = holding.clone();
                Ok(holding.clone())
            }
            None => Err(LedgerError::RecordNotFound {
                entity: "holding",
                id: holding.id,
            }),
        }
    }

    fn find_withdrawal(&mut self, id: i64) -> Result<Option<Withdrawal>> {
        Ok(self.state.withdrawals.get(&id).cloned())
    }

    fn save_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<Withdrawal> {
        self.state.withdrawals.insert(withdrawal.id, withdrawal.clone());
        Ok(withdrawal.clone())
    }

    fn find_redemption(&mut self, id: i64) -> Result<Option<AssetRedemption>> {
        Ok(self.state.redemptions.get(&id).cloned())
    }

    fn save_redemption(&mut self, redemption: &AssetRedemption) -> Result<AssetRedemption> {
        self.state.redemptions.insert(redemption.id, redemption.clone());
        Ok(redemption.clone())
    }

    fn record_activity(&mut self, activity: &AuditActivity) -> Result<()> {
        if self.faults.activity_writes {
            return Err(LedgerError::StoreUnavailable("activity write rejected".into()));
        }
        self.state.activities.push(activity.clone());
        Ok(())
    }

    fn activities_for_transaction(&mut self, transaction_id: i64) -> Result<Vec<AuditActivity>> {
        Ok(self
            .state
            .activities
            .iter()
            .filter(|a| a.transaction_id == Some(transaction_id))
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::model::{TransactionMetadata, TransactionType};

    fn store() -> Box<dyn LedgerStore> {
        Box::new(MemoryLedgerStore::new())
    }

    fn pending(reference: &str) -> NewTransaction {
        NewTransaction {
            member_id: "m1".into(),
            cooperative_id: "c1".into(),
            amount: BigDecimal::from(100),
            currency: Currency::Ngn,
            kind: TransactionType::Credit,
            status: TransactionStatus::Pending,
            reference: reference.into(),
            asset_id: None,
            description: None,
            metadata: TransactionMetadata::default(),
        }
    }

    #[test]
    fn test_failed_unit_discards_writes() {
        let store = store();
        let result: Result<()> = store.with_atomic_unit(|tx| {
            tx.insert_transaction(pending("REF-1"))?;
            Err(LedgerError::InvalidAmount("boom".into()))
        });
        assert!(result.is_err());

        let found = store
            .with_atomic_unit(|tx| tx.lock_transaction_by_reference("REF-1"))
            .unwrap();
        assert!(found.is_none());
    }

    #[test]
    fn test_duplicate_reference() {
        let store = store();
        store.with_atomic_unit(|tx| tx.insert_transaction(pending("REF-2"))).unwrap();
        let err = store
            .with_atomic_unit(|tx| tx.insert_transaction(pending("REF-2")))
            .unwrap_err();
        assert!(matches!(err, LedgerError::DuplicateReference(r) if r == "REF-2"));
    }

    #[test]
    fn test_transition_only_from_pending() {
        let store = store();
        let id = store
            .with_atomic_unit(|tx| tx.insert_transaction(pending("REF-3")))
            .unwrap()
            .id;
        let first = store
            .with_atomic_unit(|tx| tx.transition_transaction(id, TransactionStatus::Success))
            .unwrap();
        assert_eq!(first.unwrap().status, TransactionStatus::Success);
        let second = store
            .with_atomic_unit(|tx| tx.transition_transaction(id, TransactionStatus::Failed))
            .unwrap();
        assert!(second.is_none());
    }

    #[test]
    fn test_wallet_key_is_unique() {
        let store = store();
        let (a, b) = store
            .with_atomic_unit(|tx| {
                let a = tx.insert_wallet_if_absent(NewWallet::member("m1", "c1", Currency::Ngn, None))?;
                let b = tx.insert_wallet_if_absent(NewWallet::member("m1", "c1", Currency::Usd, None))?;
                Ok((a, b))
            })
            .unwrap();
        assert_eq!(a.id, b.id);
        assert_eq!(b.currency, Currency::Ngn);
    }

    #[test]
    fn test_delta_appends_reference() {
        let store = store();
        let wallet = store
            .with_atomic_unit(|tx| {
                let wallet = tx.insert_wallet_if_absent(NewWallet::member("m1", "c1", Currency::Ngn, None))?;
                tx.apply_wallet_delta(wallet.id, &BigDecimal::from(40), 7)?;
                tx.apply_wallet_delta(wallet.id, &BigDecimal::from(-15), 8)
            })
            .unwrap();
        assert_eq!(wallet.ledger_balance, BigDecimal::from(25));
        assert_eq!(wallet.transaction_ids, vec![7, 8]);
    }
}
