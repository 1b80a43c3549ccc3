//! PostgreSQL ledger store on diesel + r2d2.
//!
//! Balance updates are relative increments computed by the database, and the
//! transaction row taken by a settlement is held with `FOR UPDATE` until the
//! unit commits.

use std::ops::DerefMut;

use bigdecimal::BigDecimal;
use diesel::prelude::*;
use diesel::result::{DatabaseErrorKind, Error as DieselError};
use diesel::sql_types::{Array, BigInt};
use diesel::PgConnection;

use crate::currency::Currency;
use crate::database::connect::DbPool;
use crate::database::idgen;
use crate::database::models::{ActivityRow, HoldingRow, RedemptionRow, TransactionRow, WalletRow, WithdrawalRow};
use crate::error::{LedgerError, Result};
use crate::ledger::model::{
    AssetHolding, AssetRedemption, AuditActivity, NewTransaction, NewWallet, Transaction, TransactionStatus, Wallet,
    WalletType, Withdrawal,
};
use crate::ledger::store::{LedgerStore, LedgerTx};

diesel::define_sql_function! {
    fn array_append(array: Array<BigInt>, element: BigInt) -> Array<BigInt>;
}

fn timestamp() -> chrono::NaiveDateTime {
    chrono::Utc::now().naive_utc()
}

#[derive(Clone)]
pub struct PgLedgerStore {
    pool: DbPool,
}

impl PgLedgerStore {
    pub fn new(pool: DbPool) -> Self {
        PgLedgerStore { pool }
    }
}

impl LedgerStore for PgLedgerStore {
    fn run_atomic(&self, unit: &mut dyn FnMut(&mut dyn LedgerTx) -> Result<()>) -> Result<()> {
        let mut conn = self.pool.get()?;
        conn.deref_mut()
            .transaction::<_, LedgerError, _>(|conn| unit(&mut PgLedgerTx::new(conn)))
    }
}

pub struct PgLedgerTx<'a> {
    conn: &'a mut PgConnection,
}

impl<'a> PgLedgerTx<'a> {
    pub fn new(conn: &'a mut PgConnection) -> Self {
        PgLedgerTx { conn }
    }
}

impl LedgerTx for PgLedgerTx<'_> {
    fn lock_transaction_by_reference(&mut self, req_reference: &str) -> Result<Option<Transaction>> {
        use crate::schema::transaction::dsl::*;
        transaction
            .filter(reference.eq(req_reference))
            .select(TransactionRow::as_select())
            .for_update()
            .first(self.conn)
            .optional()?
            .map(Transaction::try_from)
            .transpose()
    }

    fn find_transaction(&mut self, req_id: i64) -> Result<Option<Transaction>> {
        use crate::schema::transaction::dsl::*;
        transaction
            .find(req_id)
            .select(TransactionRow::as_select())
            .first(self.conn)
            .optional()?
            .map(Transaction::try_from)
            .transpose()
    }

    fn find_transaction_by_reference(&mut self, req_reference: &str) -> Result<Option<Transaction>> {
        use crate::schema::transaction::dsl::*;
        transaction
            .filter(reference.eq(req_reference))
            .select(TransactionRow::as_select())
            .first(self.conn)
            .optional()?
            .map(Transaction::try_from)
            .transpose()
    }

    fn insert_transaction(&mut self, new: NewTransaction) -> Result<Transaction> {
        use crate::schema::transaction::dsl::*;
        let row = TransactionRow::from_new(new, idgen::next(), timestamp())?;
        let inserted = diesel::insert_into(transaction)
            .values(&row)
            .returning(TransactionRow::as_returning())
            .get_result(self.conn);
        match inserted {
            Ok(inserted) => inserted.try_into(),
            Err(DieselError::DatabaseError(DatabaseErrorKind::UniqueViolation, _)) => {
                Err(LedgerError::DuplicateReference(row.reference))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn transition_transaction(&mut self, req_id: i64, new_status: TransactionStatus) -> Result<Option<Transaction>> {
        use crate::schema::transaction::dsl::*;
        // the status guard makes a lost race observable as zero rows
        diesel::update(
            transaction
                .filter(id.eq(req_id))
                .filter(status.eq(TransactionStatus::Pending.as_str())),
        )
        .set((status.eq(new_status.as_str()), updated_at.eq(timestamp())))
        .returning(TransactionRow::as_returning())
        .get_result(self.conn)
        .optional()?
        .map(Transaction::try_from)
        .transpose()
    }

    fn find_wallet(&mut self, req_id: i64) -> Result<Option<Wallet>> {
        use crate::schema::wallet::dsl::*;
        wallet
            .find(req_id)
            .select(WalletRow::as_select())
            .first(self.conn)
            .optional()?
            .map(Wallet::try_from)
            .transpose()
    }

    fn lock_wallet(&mut self, req_id: i64) -> Result<Option<Wallet>> {
        use crate::schema::wallet::dsl::*;
        wallet
            .find(req_id)
            .select(WalletRow::as_select())
            .for_update()
            .first(self.conn)
            .optional()?
            .map(Wallet::try_from)
            .transpose()
    }

    fn find_member_wallet(
        &mut self,
        req_member_id: &str,
        req_currency: Option<Currency>,
        req_asset_id: Option<&str>,
    ) -> Result<Option<Wallet>> {
        use crate::schema::wallet::dsl::*;
        let mut query = wallet
            .select(WalletRow::as_select())
            .filter(member_id.eq(req_member_id))
            .filter(wallet_type.eq(WalletType::Member.as_str()))
            .into_boxed();
        query = match req_asset_id {
            Some(req_asset_id) => query.filter(asset_id.eq(req_asset_id)),
            None => query.filter(asset_id.is_null()),
        };
        if let Some(req_currency) = req_currency {
            query = query.filter(currency.eq(req_currency.as_str()));
        }
        query
            .order(created_at.asc())
            .first(self.conn)
            .optional()?
            .map(Wallet::try_from)
            .transpose()
    }

    fn find_cooperative_wallet(
        &mut self,
        req_cooperative_id: &str,
        req_wallet_type: WalletType,
        req_asset_id: Option<&str>,
    ) -> Result<Option<Wallet>> {
        use crate::schema::wallet::dsl::*;
        let mut query = wallet
            .select(WalletRow::as_select())
            .filter(cooperative_id.eq(req_cooperative_id))
            .filter(wallet_type.eq(req_wallet_type.as_str()))
            .into_boxed();
        query = match req_asset_id {
            Some(req_asset_id) => query.filter(asset_id.eq(req_asset_id)),
            None => query.filter(asset_id.is_null()),
        };
        query
            .first(self.conn)
            .optional()?
            .map(Wallet::try_from)
            .transpose()
    }

    fn insert_wallet_if_absent(&mut self, new: NewWallet) -> Result<Wallet> {
        {
            use crate::schema::wallet::dsl::*;
            let row = WalletRow::from_new(new.clone(), idgen::next(), timestamp());
            diesel::insert_into(wallet)
                .values(&row)
                .on_conflict_do_nothing()
                .execute(self.conn)?;
        }
        let found = match new.member_id.as_deref() {
            Some(member) if new.wallet_type == WalletType::Member => {
                self.find_member_wallet(member, None, new.asset_id.as_deref())?
            }
            _ => self.find_cooperative_wallet(&new.cooperative_id, new.wallet_type, new.asset_id.as_deref())?,
        };
        found.ok_or_else(|| {
            LedgerError::StoreUnavailable(format!(
                "{} wallet of cooperative {} vanished after insert",
                new.wallet_type, new.cooperative_id
            ))
        })
    }

    fn apply_wallet_delta(&mut self, req_wallet_id: i64, delta: &BigDecimal, req_transaction_id: i64) -> Result<Wallet> {
        use crate::schema::wallet::dsl::*;
        diesel::update(wallet.find(req_wallet_id))
            .set((
                ledger_balance.eq(ledger_balance + delta.clone()),
                transaction_ids.eq(array_append(transaction_ids, req_transaction_id)),
                updated_at.eq(timestamp()),
            ))
            .returning(WalletRow::as_returning())
            .get_result(self.conn)
            .optional()?
            .ok_or(LedgerError::RecordNotFound {
                entity: "wallet",
                id: req_wallet_id,
            })?
            .try_into()
    }

    fn lock_holding(&mut self, req_member_id: &str, req_asset_id: &str) -> Result<Option<AssetHolding>> {
        use crate::schema::asset_holding::dsl::*;
        asset_holding
            .filter(member_id.eq(req_member_id))
            .filter(asset_id.eq(req_asset_id))
            .select(HoldingRow::as_select())
            .for_update()
            .first(self.conn)
            .optional()?
            .map(AssetHolding::try_from)
            .transpose()
    }

    fn open_holding(&mut self, holding: &AssetHolding) -> Result<AssetHolding> {
        {
            use crate::schema::asset_holding::dsl::*;
            // a concurrent first purchase waits here until the other unit ends
            diesel::insert_into(asset_holding)
                .values(&HoldingRow::from(holding))
                .on_conflict((member_id, asset_id))
                .do_nothing()
                .execute(self.conn)?;
        }
        self.lock_holding(&holding.member_id, &holding.asset_id)?
            .ok_or_else(|| {
                LedgerError::StoreUnavailable(format!(
                    "holding of {} in {} vanished after insert",
                    holding.member_id, holding.asset_id
                ))
            })
    }

    fn save_holding(&mut self, holding: &AssetHolding) -> Result<AssetHolding> {
        use crate::schema::asset_holding::dsl::*;
        diesel::update(asset_holding.find(holding.id))
            .set(&HoldingRow::from(holding))
            .returning(HoldingRow::as_returning())
            .get_result(self.conn)
            .optional()?
            .ok_or(LedgerError::RecordNotFound {
                entity: "holding",
                id: holding.id,
            })?
            .try_into()
    }

    fn find_withdrawal(&mut self, req_id: i64) -> Result<Option<Withdrawal>> {
        use crate::schema::withdrawal::dsl::*;
        withdrawal
            .find(req_id)
            .select(WithdrawalRow::as_select())
            .for_update()
            .first(self.conn)
            .optional()?
            .map(Withdrawal::try_from)
            .transpose()
    }

    fn save_withdrawal(&mut self, record: &Withdrawal) -> Result<Withdrawal> {
        use crate::schema::withdrawal::dsl::*;
        let row = WithdrawalRow::from(record);
        diesel::insert_into(withdrawal)
            .values(&row)
            .on_conflict(id)
            .do_update()
            .set(&row)
            .returning(WithdrawalRow::as_returning())
            .get_result(self.conn)?
            .try_into()
    }

    fn find_redemption(&mut self, req_id: i64) -> Result<Option<AssetRedemption>> {
        use crate::schema::asset_redemption::dsl::*;
        asset_redemption
            .find(req_id)
            .select(RedemptionRow::as_select())
            .for_update()
            .first(self.conn)
            .optional()?
            .map(AssetRedemption::try_from)
            .transpose()
    }

    fn save_redemption(&mut self, record: &AssetRedemption) -> Result<AssetRedemption> {
        use crate::schema::asset_redemption::dsl::*;
        let row = RedemptionRow::from(record);
        diesel::insert_into(asset_redemption)
            .values(&row)
            .on_conflict(id)
            .do_update()
            .set(&row)
            .returning(RedemptionRow::as_returning())
            .get_result(self.conn)?
            .try_into()
    }

    fn record_activity(&mut self, activity: &AuditActivity) -> Result<()> {
        use crate::schema::audit_activity::dsl::*;
        let row = ActivityRow::from(activity);
        // nested transaction = savepoint; a failed insert leaves the unit usable
        self.conn.transaction::<_, DieselError, _>(|conn| {
            diesel::insert_into(audit_activity).values(&row).execute(conn)
        })?;
        Ok(())
    }

    fn activities_for_transaction(&mut self, req_transaction_id: i64) -> Result<Vec<AuditActivity>> {
        use crate::schema::audit_activity::dsl::*;
        audit_activity
            .filter(transaction_id.eq(req_transaction_id))
            .order((created_at.asc(), id.asc()))
            .select(ActivityRow::as_select())
            .load(self.conn)?
            .into_iter()
            .map(AuditActivity::try_from)
            .collect()
    }
}
