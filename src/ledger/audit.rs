use bigdecimal::BigDecimal;
use serde_json::json;
use tracing::warn;

use crate::database::idgen;
use crate::ledger::model::{
    ActivityStatus, ActivityType, AuditActivity, Transaction, TransactionType, Wallet,
};
use crate::ledger::resolution::ResolutionStrategy;
use crate::ledger::store::LedgerTx;

/// Builder for one audit record.
pub struct Activity {
    inner: AuditActivity,
}

impl Activity {
    pub fn new(activity_type: ActivityType, cooperative_id: &str, title: &str, description: String) -> Self {
        Activity {
            inner: AuditActivity {
                id: idgen::next(),
                activity_type,
                member_id: None,
                cooperative_id: cooperative_id.to_string(),
                status: ActivityStatus::Success,
                title: title.to_string(),
                description,
                metadata: json!({}),
                wallet_id: None,
                transaction_id: None,
                created_at: chrono::Utc::now().naive_utc(),
            },
        }
    }

    pub fn member(mut self, member_id: &str) -> Self {
        self.inner.member_id = Some(member_id.to_string());
        self
    }

    pub fn status(mut self, status: ActivityStatus) -> Self {
        self.inner.status = status;
        self
    }

    pub fn metadata(mut self, metadata: serde_json::Value) -> Self {
        self.inner.metadata = metadata;
        self
    }

    pub fn wallet(mut self, wallet_id: i64) -> Self {
        self.inner.wallet_id = Some(wallet_id);
        self
    }

    pub fn transaction(mut self, transaction_id: i64) -> Self {
        self.inner.transaction_id = Some(transaction_id);
        self
    }

    /// Writes the record inside the current unit. A failed write is logged
    /// and does not fail the caller.
    pub fn record(self, tx: &mut dyn LedgerTx) {
        if let Err(e) = tx.record_activity(&self.inner) {
            warn!(
                activity_type = self.inner.activity_type.as_str(),
                transaction_id = ?self.inner.transaction_id,
                wallet_id = ?self.inner.wallet_id,
                "failed to record audit activity: {e}"
            );
        }
    }
}

pub fn wallet_balance_updated(
    tx: &mut dyn LedgerTx,
    updated: &Wallet,
    amount: &BigDecimal,
    direction: TransactionType,
    transaction: &Transaction,
    strategy: ResolutionStrategy,
) {
    let delta = direction.signed(amount);
    let previous_balance = &updated.ledger_balance - &delta;
    let verb = match direction {
        TransactionType::Credit => "increased",
        TransactionType::Debit => "decreased",
    };
    let mut activity = Activity::new(
        ActivityType::WalletBalanceUpdated,
        &updated.cooperative_id,
        "Wallet Balance Updated",
        format!("Wallet balance {verb} by {amount} {}", updated.currency),
    )
    .metadata(json!({
        "amount": amount,
        "type": direction,
        "currency": updated.currency,
        "walletType": updated.wallet_type,
        "transactionId": transaction.id,
        "reference": transaction.reference,
        "balanceChange": delta,
        "previousBalance": previous_balance,
        "newBalance": updated.ledger_balance,
        "resolution": strategy,
        "fallbackWallet": strategy == ResolutionStrategy::CurrencyFallback,
    }))
    .wallet(updated.id)
    .transaction(transaction.id);
    if let Some(member_id) = updated.member_id.as_deref() {
        activity = activity.member(member_id);
    }
    activity.record(tx);
}

pub fn transaction_successful(tx: &mut dyn LedgerTx, transaction: &Transaction, wallets: &[Wallet]) {
    let balances: Vec<_> = wallets
        .iter()
        .map(|w| json!({ "walletId": w.id, "walletType": w.wallet_type, "newBalance": w.ledger_balance }))
        .collect();
    Activity::new(
        ActivityType::TransactionSuccessful,
        &transaction.cooperative_id,
        "Transaction Successful",
        format!(
            "Payment of {} {} ({}) completed",
            transaction.amount, transaction.currency, transaction.reference
        ),
    )
    .member(&transaction.member_id)
    .metadata(json!({
        "amount": transaction.amount,
        "currency": transaction.currency,
        "type": transaction.kind,
        "reference": transaction.reference,
        "category": transaction.metadata.category,
        "wallets": balances,
    }))
    .transaction(transaction.id)
    .record(tx);
}

pub fn transaction_failed(tx: &mut dyn LedgerTx, transaction: &Transaction) {
    Activity::new(
        ActivityType::TransactionFailed,
        &transaction.cooperative_id,
        "Transaction Failed",
        format!(
            "Payment of {} {} ({}) failed",
            transaction.amount, transaction.currency, transaction.reference
        ),
    )
    .member(&transaction.member_id)
    .status(ActivityStatus::Failed)
    .metadata(json!({
        "amount": transaction.amount,
        "currency": transaction.currency,
        "type": transaction.kind,
        "reference": transaction.reference,
    }))
    .transaction(transaction.id)
    .record(tx);
}
