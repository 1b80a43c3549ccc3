use bigdecimal::BigDecimal;

use crate::currency::Currency;
use crate::error::{LedgerError, Result};
use crate::ledger::model::{
    AssetHolding, AssetRedemption, AuditActivity, NewTransaction, NewWallet, Transaction, TransactionStatus,
    Wallet, WalletType, Withdrawal,
};

/// Reads and writes available inside one atomic unit.
///
/// Every method observes the writes made earlier in the same unit. Nothing is
/// visible to other units until the unit commits.
pub trait LedgerTx {
    /// Loads a transaction by reference and holds it against concurrent
    /// settlement of the same reference until the unit ends.
    fn lock_transaction_by_reference(&mut self, reference: &str) -> Result<Option<Transaction>>;

    fn find_transaction(&mut self, id: i64) -> Result<Option<Transaction>>;

    fn find_transaction_by_reference(&mut self, reference: &str) -> Result<Option<Transaction>>;

    /// Fails with `DuplicateReference` when the reference is taken.
    fn insert_transaction(&mut self, new: NewTransaction) -> Result<Transaction>;

    /// Moves a `pending` transaction to `status`. Returns `None` when the
    /// transaction is no longer pending.
    fn transition_transaction(&mut self, id: i64, status: TransactionStatus) -> Result<Option<Transaction>>;

    fn find_wallet(&mut self, id: i64) -> Result<Option<Wallet>>;

    /// Loads a wallet and holds it against concurrent writes until the unit
    /// ends. Balance checks that guard a debit must read through this.
    fn lock_wallet(&mut self, id: i64) -> Result<Option<Wallet>>;

    /// Member wallet for `(member, asset)`; `currency: None` matches any currency.
    fn find_member_wallet(
        &mut self,
        member_id: &str,
        currency: Option<Currency>,
        asset_id: Option<&str>,
    ) -> Result<Option<Wallet>>;

    fn find_cooperative_wallet(
        &mut self,
        cooperative_id: &str,
        wallet_type: WalletType,
        asset_id: Option<&str>,
    ) -> Result<Option<Wallet>>;

    /// Creates the wallet unless one already occupies its unique key, and
    /// returns whichever wallet holds the key afterwards.
    fn insert_wallet_if_absent(&mut self, new: NewWallet) -> Result<Wallet>;

    /// Adds `delta` to the stored balance and appends `transaction_id` to the
    /// wallet's transaction list in a single write.
    fn apply_wallet_delta(&mut self, wallet_id: i64, delta: &BigDecimal, transaction_id: i64) -> Result<Wallet>;

    /// Loads the member's holding of `asset_id` and holds it until the unit ends.
    fn lock_holding(&mut self, member_id: &str, asset_id: &str) -> Result<Option<AssetHolding>>;

    /// Inserts `holding` unless the member already holds its asset, then
    /// returns the stored holding locked as by `lock_holding`.
    fn open_holding(&mut self, holding: &AssetHolding) -> Result<AssetHolding>;

    /// Overwrites a holding previously returned by `lock_holding` or `open_holding`.
    fn save_holding(&mut self, holding: &AssetHolding) -> Result<AssetHolding>;

    fn find_withdrawal(&mut self, id: i64) -> Result<Option<Withdrawal>>;

    fn save_withdrawal(&mut self, withdrawal: &Withdrawal) -> Result<Withdrawal>;

    fn find_redemption(&mut self, id: i64) -> Result<Option<AssetRedemption>>;

    fn save_redemption(&mut self, redemption: &AssetRedemption) -> Result<AssetRedemption>;

    /// Appends an audit record. A failure here must leave the unit usable.
    fn record_activity(&mut self, activity: &AuditActivity) -> Result<()>;

    fn activities_for_transaction(&mut self, transaction_id: i64) -> Result<Vec<AuditActivity>>;
}

/// A datastore that can run a closure as one atomic unit.
pub trait LedgerStore: Send + Sync {
    /// Runs `unit` inside a transaction. Every write made through the
    /// `LedgerTx` commits if `unit` returns `Ok` and is discarded otherwise.
    fn run_atomic(&self, unit: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<()>) -> Result<()>;
}

impl<'s> dyn LedgerStore + 's {
    pub fn with_atomic_unit<T>(&self, mut unit: impl FnMut(&mut dyn LedgerTx) -> Result<T>) -> Result<T> {
        let mut output = None;
        self.run_atomic(&mut |tx| {
            output = Some(unit(tx)?);
            Ok(())
        })?;
        output.ok_or_else(|| LedgerError::StoreUnavailable("atomic unit finished without a result".into()))
    }
}
