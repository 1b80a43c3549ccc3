use bigdecimal::BigDecimal;
use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};

use crate::currency::Currency;
use crate::text_enum::text_enum;

text_enum! {
    pub enum WalletType {
        External => "external",
        Contribution => "contribution",
        Asset => "asset",
        Member => "member",
    }
}

text_enum! {
    /// Direction of a movement from the member's side of the books.
    pub enum TransactionType {
        Credit => "CR",
        Debit => "DR",
    }
}

text_enum! {
    pub enum TransactionStatus {
        Pending => "pending",
        Success => "success",
        Failed => "failed",
        Abandoned => "abandoned",
    }
}

text_enum! {
    /// Terminal status carried by a payment-status event.
    pub enum SettlementStatus {
        Success => "success",
        Failed => "failed",
    }
}

text_enum! {
    pub enum Category {
        Contribution => "contribution",
        AssetPurchase => "asset_purchase",
        Withdrawal => "withdrawal",
        #[serde(alias = "asset_redemption")]
        Redemption => "redemption",
    }
}

text_enum! {
    pub enum HoldingStatus {
        Active => "active",
        Sold => "sold",
        Pending => "pending",
    }
}

text_enum! {
    pub enum WithdrawalType {
        Contribution => "contribution",
        Asset => "asset",
    }
}

text_enum! {
    /// Lifecycle of an admin-approved request (withdrawal or redemption).
    pub enum RequestStatus {
        Pending => "pending",
        Approved => "approved",
        Rejected => "rejected",
        Completed => "completed",
    }
}

text_enum! {
    pub enum ActivityType {
        TransactionSuccessful => "transaction_successful",
        TransactionFailed => "transaction_failed",
        WalletBalanceUpdated => "wallet_balance_updated",
        WalletCreated => "wallet_created",
        TransactionInitiated => "transaction_initiated",
        AssetPurchaseCompleted => "asset_purchase_completed",
        WithdrawalRequested => "withdrawal_requested",
        WithdrawalProcessed => "withdrawal_processed",
        WithdrawalRejected => "withdrawal_rejected",
        AssetRedemptionRequested => "asset_redemption_requested",
        AssetRedemptionApproved => "asset_redemption_approved",
        AssetRedemptionRejected => "asset_redemption_rejected",
    }
}

text_enum! {
    pub enum ActivityStatus {
        Success => "success",
        Failed => "failed",
        Pending => "pending",
    }
}

impl TransactionType {
    /// Signed form of `amount` as applied to a wallet balance.
    pub fn signed(&self, amount: &BigDecimal) -> BigDecimal {
        match self {
            TransactionType::Credit => amount.clone(),
            TransactionType::Debit => -amount.clone(),
        }
    }
}

impl TransactionStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, TransactionStatus::Pending)
    }
}

impl From<SettlementStatus> for TransactionStatus {
    fn from(status: SettlementStatus) -> Self {
        match status {
            SettlementStatus::Success => TransactionStatus::Success,
            SettlementStatus::Failed => TransactionStatus::Failed,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Wallet {
    pub id: i64,
    pub cooperative_id: String,
    pub member_id: Option<String>,
    pub asset_id: Option<String>,
    pub currency: Currency,
    pub wallet_type: WalletType,
    pub ledger_balance: BigDecimal,
    pub transaction_ids: Vec<i64>,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewWallet {
    pub cooperative_id: String,
    pub member_id: Option<String>,
    pub asset_id: Option<String>,
    pub currency: Currency,
    pub wallet_type: WalletType,
}

impl NewWallet {
    pub fn member(member_id: &str, cooperative_id: &str, currency: Currency, asset_id: Option<&str>) -> Self {
        NewWallet {
            cooperative_id: cooperative_id.to_string(),
            member_id: Some(member_id.to_string()),
            asset_id: asset_id.map(str::to_string),
            currency,
            wallet_type: WalletType::Member,
        }
    }

    pub fn cooperative(cooperative_id: &str, wallet_type: WalletType, currency: Currency, asset_id: Option<&str>) -> Self {
        NewWallet {
            cooperative_id: cooperative_id.to_string(),
            member_id: None,
            asset_id: asset_id.map(str::to_string),
            currency,
            wallet_type,
        }
    }
}

/// Category hints and identifiers attached to a transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransactionMetadata {
    #[serde(default, alias = "type", skip_serializing_if = "Option::is_none")]
    pub category: Option<Category>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub quantity: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub price_per_unit: Option<BigDecimal>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawal_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub redemption_id: Option<i64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub profit_loss: Option<BigDecimal>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl TransactionMetadata {
    pub fn with_category(category: Category) -> Self {
        TransactionMetadata {
            category: Some(category),
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub id: i64,
    pub member_id: String,
    pub cooperative_id: String,
    pub amount: BigDecimal,
    pub currency: Currency,
    #[serde(rename = "type")]
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub reference: String,
    pub asset_id: Option<String>,
    pub description: Option<String>,
    pub metadata: TransactionMetadata,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone)]
pub struct NewTransaction {
    pub member_id: String,
    pub cooperative_id: String,
    pub amount: BigDecimal,
    pub currency: Currency,
    pub kind: TransactionType,
    pub status: TransactionStatus,
    pub reference: String,
    pub asset_id: Option<String>,
    pub description: Option<String>,
    pub metadata: TransactionMetadata,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetHolding {
    pub id: i64,
    pub member_id: String,
    pub asset_id: String,
    pub cooperative_id: String,
    pub quantity: BigDecimal,
    pub total_invested: BigDecimal,
    pub status: HoldingStatus,
    pub last_transaction_at: NaiveDateTime,
    pub created_at: NaiveDateTime,
    pub updated_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditActivity {
    pub id: i64,
    pub activity_type: ActivityType,
    pub member_id: Option<String>,
    pub cooperative_id: String,
    pub status: ActivityStatus,
    pub title: String,
    pub description: String,
    pub metadata: serde_json::Value,
    pub wallet_id: Option<i64>,
    pub transaction_id: Option<i64>,
    pub created_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Withdrawal {
    pub id: i64,
    pub member_id: String,
    pub cooperative_id: String,
    pub amount: BigDecimal,
    pub withdrawal_type: WithdrawalType,
    pub asset_id: Option<String>,
    pub currency: Currency,
    pub reason: String,
    pub status: RequestStatus,
    pub decided_by: Option<String>,
    pub decided_at: Option<NaiveDateTime>,
    pub rejection_reason: Option<String>,
    pub completed_at: Option<NaiveDateTime>,
    pub transaction_id: Option<i64>,
    pub requested_at: NaiveDateTime,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetRedemption {
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
    pub currency: Currency,
    pub reason: String,
    pub status: RequestStatus,
    pub decided_by: Option<String>,
    pub decided_at: Option<NaiveDateTime>,
    pub rejection_reason: Option<String>,
    pub completed_at: Option<NaiveDateTime>,
    pub transaction_id: Option<i64>,
    pub requested_at: NaiveDateTime,
}

/// An administrator's ruling on a pending withdrawal or redemption.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Decision {
    pub cooperative_id: String,
    pub decided_by: String,
    #[serde(default)]
    pub reason: Option<String>,
}
