//! Row types for the diesel schema and their conversions to ledger models.
//! Enum columns are stored as text and parsed on the way out.

use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use diesel::prelude::*;

use crate::error::{LedgerError, Result};
use crate::ledger::model::{
    AssetHolding, AssetRedemption, AuditActivity, NewTransaction, NewWallet, Transaction, TransactionStatus, TransactionType,
    Wallet, Withdrawal,
};

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::wallet)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct WalletRow {
    pub id: i64,
    pub cooperative_id: String,
    pub member_id: Option<String>,
    pub asset_id: Option<String>,
    pub currency: String,
    pub wallet_type: String,
    pub ledger_balance: BigDecimal,
    pub transaction_ids: Vec<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl WalletRow {
    pub fn from_new(new: NewWallet, id: i64, at: NaiveDateTime) -> Self {
        WalletRow {
            id,
            cooperative_id: new.cooperative_id,
            member_id: new.member_id,
            asset_id: new.asset_id,
            currency: new.currency.as_str().to_string(),
            wallet_type: new.wallet_type.as_str().to_string(),
            ledger_balance: BigDecimal::from(0),
            transaction_ids: Vec::new(),
            created_at: at,
            updated_at: at,
        }
    }
}

impl TryFrom<WalletRow> for Wallet {
    type Error = LedgerError;

    fn try_from(row: WalletRow) -> Result<Self> {
        Ok(Wallet {
            id: row.id,
            cooperative_id: row.cooperative_id,
            member_id: row.member_id,
            asset_id: row.asset_id,
            currency: row.currency.parse()?,
            wallet_type: row.wallet_type.parse()?,
            ledger_balance: row.ledger_balance,
            transaction_ids: row.transaction_ids,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::transaction)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct TransactionRow {
    pub id: i64,
    pub member_id: String,
    pub cooperative_id: String,
    pub amount: BigDecimal,
    pub currency: String,
    pub transaction_type: String,
    pub status: String,
    pub reference: String,
    pub asset_id: Option<String>,
    pub description: Option<String>,
    pub metadata: serde_json::Value,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl TransactionRow {
    pub fn from_new(new: NewTransaction, id: i64, at: NaiveDateTime) -> Result<Self> {
        Ok(TransactionRow {
            id,
            member_id: new.member_id,
            cooperative_id: new.cooperative_id,
            amount: new.amount,
            currency: new.currency.as_str().to_string(),
            transaction_type: new.kind.as_str().to_string(),
            status: new.status.as_str().to_string(),
            reference: new.reference,
            asset_id: new.asset_id,
            description: new.description,
            metadata: serde_json::to_value(&new.metadata)?,
            created_at: at,
            updated_at: at,
        })
    }
}

impl TryFrom<TransactionRow> for Transaction {
    type Error = LedgerError;

    fn try_from(row: TransactionRow) -> Result<Self> {
        let kind = row.transaction_type.parse::<TransactionType>().map_err(|_| {
            LedgerError::InvalidType(format!(
                "transaction {} has type {:?}",
                row.reference, row.transaction_type
            ))
        })?;
        let status = row.status.parse::<TransactionStatus>().map_err(|_| {
            LedgerError::InvalidStatus(format!("transaction {} has status {:?}", row.reference, row.status))
        })?;
        Ok(Transaction {
            id: row.id,
            member_id: row.member_id,
            cooperative_id: row.cooperative_id,
            amount: row.amount,
            currency: row.currency.parse()?,
            kind,
            status,
            asset_id: row.asset_id,
            description: row.description,
            metadata: serde_json::from_value(row.metadata)?,
            reference: row.reference,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::asset_holding)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct HoldingRow {
    pub id: i64,
    pub member_id: String,
    pub asset_id: String,
    pub cooperative_id: String,
    pub quantity: BigDecimal,
    pub total_invested: BigDecimal,
    pub status: String,
    pub last_transaction_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

impl From<&AssetHolding> for HoldingRow {
    fn from(holding: &AssetHolding) -> Self {
        HoldingRow {
            id: holding.id,
            member_id: holding.member_id.clone(),
            asset_id: holding.asset_id.clone(),
            cooperative_id: holding.cooperative_id.clone(),
            quantity: holding.quantity.clone(),
            total_invested: holding.total_invested.clone(),
            status: holding.status.as_str().to_string(),
            last_transaction_at: holding.last_transaction_at,
            created_at: holding.created_at,
            updated_at: holding.updated_at,
        }
    }
}

impl TryFrom<HoldingRow> for AssetHolding {
    type Error = LedgerError;

    fn try_from(row: HoldingRow) -> Result<Self> {
        Ok(AssetHolding {
            id: row.id,
            member_id: row.member_id,
            asset_id: row.asset_id,
            cooperative_id: row.cooperative_id,
            quantity: row.quantity,
            total_invested: row.total_invested,
            status: row.status.parse()?,
            last_transaction_at: row.last_transaction_at,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable)]
#[diesel(table_name = crate::schema::audit_activity)]
#[diesel(check_for_backend(diesel::pg::Pg))]
pub struct ActivityRow {
    pub id: i64,
    pub activity_type: String,
    pub member_id: Option<String>,
    pub cooperative_id: String,
    pub status: String,
    pub title: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub wallet_id: Option<i64>,
    pub transaction_id: Option<i64>,
    pub created_at: NaiveDateTime,
}

impl From<&AuditActivity> for ActivityRow {
    fn from(activity: &AuditActivity) -> Self {
        ActivityRow {
            id: activity.id,
            activity_type: activity.activity_type.as_str().to_string(),
            member_id: activity.member_id.clone(),
            cooperative_id: activity.cooperative_id.clone(),
            status: activity.status.as_str().to_string(),
            title: activity.title.clone(),
            description: activity.description.clone(),
            metadata: activity.metadata.clone(),
            wallet_id: activity.wallet_id,
            transaction_id: activity.transaction_id,
            created_at: activity.created_at,
        }
    }
}

impl TryFrom<ActivityRow> for AuditActivity {
    type Error = LedgerError;

    fn try_from(row: ActivityRow) -> Result<Self> {
        Ok(AuditActivity {
            id: row.id,
            activity_type: row.activity_type.parse()?,
            member_id: row.member_id,
            cooperative_id: row.cooperative_id,
            status: row.status.parse()?,
            title: row.title,
            description: row.description,
            metadata: row.metadata,
            wallet_id: row.wallet_id,
            transaction_id: row.transaction_id,
            created_at: row.created_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::withdrawal)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct WithdrawalRow {
    pub id: i64,
    pub member_id: String,
    pub cooperative_id: String,
    pub amount: BigDecimal,
    pub withdrawal_type: String,
    pub asset_id: Option<String>,
    pub currency: String,
    pub reason: String,
    pub status: String,
    pub decided_by: Option<String>,
    pub decided_at: Option<NaiveDateTime>,
    pub rejection_reason: Option<String>,
    pub completed_at: Option<NaiveDateTime>,
    pub transaction_id: Option<i64>,
    pub requested_at: NaiveDateTime,
}

impl From<&Withdrawal> for WithdrawalRow {
    fn from(w: &Withdrawal) -> Self {
        WithdrawalRow {
            id: w.id,
            member_id: w.member_id.clone(),
            cooperative_id: w.cooperative_id.clone(),
            amount: w.amount.clone(),
            withdrawal_type: w.withdrawal_type.as_str().to_string(),
            asset_id: w.asset_id.clone(),
            currency: w.currency.as_str().to_string(),
            reason: w.reason.clone(),
            status: w.status.as_str().to_string(),
            decided_by: w.decided_by.clone(),
            decided_at: w.decided_at,
            rejection_reason: w.rejection_reason.clone(),
            completed_at: w.completed_at,
            transaction_id: w.transaction_id,
            requested_at: w.requested_at,
        }
    }
}

impl TryFrom<WithdrawalRow> for Withdrawal {
    type Error = LedgerError;

    fn try_from(row: WithdrawalRow) -> Result<Self> {
        Ok(Withdrawal {
            id: row.id,
            member_id: row.member_id,
            cooperative_id: row.cooperative_id,
            amount: row.amount,
            withdrawal_type: row.withdrawal_type.parse()?,
            asset_id: row.asset_id,
            currency: row.currency.parse()?,
            reason: row.reason,
            status: row.status.parse()?,
            decided_by: row.decided_by,
            decided_at: row.decided_at,
            rejection_reason: row.rejection_reason,
            completed_at: row.completed_at,
            transaction_id: row.transaction_id,
            requested_at: row.requested_at,
        })
    }
}

#[derive(Debug, Clone, Queryable, Selectable, Insertable, AsChangeset)]
#[diesel(table_name = crate::schema::asset_redemption)]
#[diesel(check_for_backend(diesel::pg::Pg))]
#[diesel(treat_none_as_null = true)]
pub struct RedemptionRow {
    pub id: i64,
    pub member_id: String,
    pub asset_id: String,
    pub cooperative_id: String,
    pub quantity: BigDecimal,
    pub redemption_amount: BigDecimal,
    pub price_per_unit: BigDecimal,
    pub original_investment: BigDecimal,
    pub profit_loss: BigDecimal,
    pub average_price: BigDecimal,
    pub currency: String,
    pub reason: String,
    pub status: String,
    pub decided_by: Option<String>,
    pub decided_at: Option<NaiveDateTime>,
    pub rejection_reason: Option<String>,
    pub completed_at: Option<NaiveDateTime>,
    pub transaction_id: Option<i64>,
    pub requested_at: NaiveDateTime,
}

impl From<&AssetRedemption> for RedemptionRow {
    fn from(r: &AssetRedemption) -> Self {
        RedemptionRow {
            id: r.id,
            member_id: r.member_id.clone(),
            asset_id: r.asset_id.clone(),
            cooperative_id: r.cooperative_id.clone(),
            quantity: r.quantity.clone(),
            redemption_amount: r.redemption_amount.clone(),
            price_per_unit: r.price_per_unit.clone(),
            original_investment: r.original_investment.clone(),
            profit_loss: r.profit_loss.clone(),
            average_price: r.average_price.clone(),
            currency: r.currency.as_str().to_string(),
            reason: r.reason.clone(),
            status: r.status.as_str().to_string(),
            decided_by: r.decided_by.clone(),
            decided_at: r.decided_at,
            rejection_reason: r.rejection_reason.clone(),
            completed_at: r.completed_at,
            transaction_id: r.transaction_id,
            requested_at: r.requested_at,
        }
    }
}

impl TryFrom<RedemptionRow> for AssetRedemption {
    type Error = LedgerError;

    fn try_from(row: RedemptionRow) -> Result<Self> {
        Ok(AssetRedemption {
            id: row.id,
            member_id: row.member_id,
            asset_id: row.asset_id,
            cooperative_id: row.cooperative_id,
            quantity: row.quantity,
            redemption_amount: row.redemption_amount,
            price_per_unit: row.price_per_unit,
            original_investment: row.original_investment,
            profit_loss: row.profit_loss,
            average_price: row.average_price,
            currency: row.currency.parse()?,
            reason: row.reason,
            status: row.status.parse()?,
            decided_by: row.decided_by,
            decided_at: row.decided_at,
            rejection_reason: row.rejection_reason,
            completed_at: row.completed_at,
            transaction_id: row.transaction_id,
            requested_at: row.requested_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::currency::Currency;
    use crate::ledger::model::{Category, TransactionMetadata, WalletType};

    fn now() -> NaiveDateTime {
        chrono::Utc::now().naive_utc()
    }

    fn transaction_row(transaction_type: &str) -> TransactionRow {
        TransactionRow::from_new(
            NewTransaction {
                member_id: "m1".into(),
                cooperative_id: "c1".into(),
                amount: BigDecimal::from(10),
                currency: Currency::Ngn,
                kind: TransactionType::Credit,
                status: TransactionStatus::Pending,
                reference: "REF".into(),
                asset_id: None,
                description: None,
                metadata: TransactionMetadata::with_category(Category::Contribution),
            },
            1,
            now(),
        )
        .map(|row| TransactionRow {
            transaction_type: transaction_type.into(),
            ..row
        })
        .unwrap()
    }

    #[test]
    fn test_transaction_row_round_trip() {
        let row = transaction_row("CR");
        assert_eq!(row.metadata, serde_json::json!({ "category": "contribution" }));
        let transaction = Transaction::try_from(row).unwrap();
        assert_eq!(transaction.kind, TransactionType::Credit);
        assert_eq!(transaction.metadata.category, Some(Category::Contribution));
    }

    #[test]
    fn test_unknown_transaction_type() {
        let err = Transaction::try_from(transaction_row("XFER")).unwrap_err();
        assert!(matches!(err, LedgerError::InvalidType(_)));
    }

    #[test]
    fn test_unknown_transaction_status() {
        let row = TransactionRow {
            status: "reversed".into(),
            ..transaction_row("DR")
        };
        assert!(matches!(Transaction::try_from(row), Err(LedgerError::InvalidStatus(_))));
    }

    #[test]
    fn test_unknown_wallet_type() {
        let mut row = WalletRow::from_new(
            NewWallet::cooperative("c1", WalletType::External, Currency::Usd, None),
            2,
            now(),
        );
        assert_eq!(Wallet::try_from(row.clone()).unwrap().wallet_type, WalletType::External);
        row.wallet_type = "vault".into();
        assert!(matches!(Wallet::try_from(row), Err(LedgerError::UnknownValue(_))));
    }
}
