//! Selling units of an asset holding back to the cooperative.

use bigdecimal::{BigDecimal, Zero};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use crate::currency::Currency;
use crate::database::idgen;
use crate::error::{LedgerError, Result};
use crate::ledger::audit::Activity;
use crate::ledger::model::{
    ActivityStatus, ActivityType, AssetHolding, AssetRedemption, Category, Decision, NewTransaction, RequestStatus,
    Transaction, TransactionMetadata, TransactionStatus, TransactionType, Wallet, WalletType,
};
use crate::ledger::mutation;
use crate::ledger::resolution;
use crate::ledger::store::LedgerTx;
use crate::ledger::withdrawal::ensure_decidable;
use crate::ledger::Ledger;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RedemptionRequest {
    pub member_id: String,
    pub cooperative_id: String,
    pub asset_id: String,
    pub quantity: BigDecimal,
    pub price_per_unit: BigDecimal,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RedemptionOutcome {
    pub redemption: AssetRedemption,
    pub transaction: Transaction,
    pub wallets: Vec<Wallet>,
    pub holding: AssetHolding,
}

fn holding_of(tx: &mut dyn LedgerTx, member_id: &str, asset_id: &str, units: &BigDecimal) -> Result<AssetHolding> {
    tx.lock_holding(member_id, asset_id)?
        .ok_or_else(|| LedgerError::InsufficientUnits {
            asset_id: asset_id.to_string(),
            held: BigDecimal::zero(),
            requested: units.clone(),
        })
}

fn pending_redemption(tx: &mut dyn LedgerTx, id: i64, cooperative_id: &str) -> Result<AssetRedemption> {
    let redemption = tx
        .find_redemption(id)?
        .ok_or(LedgerError::RecordNotFound { entity: "redemption", id })?;
    ensure_decidable("redemption", id, &redemption.cooperative_id, redemption.status, cooperative_id)?;
    Ok(redemption)
}

fn record(tx: &mut dyn LedgerTx, redemption: &AssetRedemption, activity_type: ActivityType, title: &str, description: String) {
    let status = match redemption.status {
        RequestStatus::Pending | RequestStatus::Approved => ActivityStatus::Pending,
        RequestStatus::Completed => ActivityStatus::Success,
        RequestStatus::Rejected => ActivityStatus::Failed,
    };
    let mut activity = Activity::new(activity_type, &redemption.cooperative_id, title, description)
        .member(&redemption.member_id)
        .status(status)
        .metadata(json!({
            "redemptionId": redemption.id,
            "assetId": redemption.asset_id,
            "quantity": redemption.quantity,
            "pricePerUnit": redemption.price_per_unit,
            "redemptionAmount": redemption.redemption_amount,
            "originalInvestment": redemption.original_investment,
            "profitLoss": redemption.profit_loss,
            "averagePrice": redemption.average_price,
            "decidedBy": redemption.decided_by,
            "rejectionReason": redemption.rejection_reason,
        }));
    if let Some(transaction_id) = redemption.transaction_id {
        activity = activity.transaction(transaction_id);
    }
    activity.record(tx);
}

impl Ledger {
    #[instrument(
        skip(self, request),
        fields(member_id = %request.member_id, asset_id = %request.asset_id, quantity = %request.quantity)
    )]
    pub fn request_redemption(&self, request: &RedemptionRequest) -> Result<AssetRedemption> {
        let redemption = self.store().with_atomic_unit(|tx| {
            let holding = holding_of(tx, &request.member_id, &request.asset_id, &request.quantity)?;
            holding.ensure_cooperative(&request.cooperative_id)?;
            let quote = holding.quote_redemption(&request.quantity, &request.price_per_unit)?;
            let redemption = AssetRedemption {
                id: idgen::next(),
                member_id: request.member_id.clone(),
                asset_id: request.asset_id.clone(),
                cooperative_id: request.cooperative_id.clone(),
                quantity: request.quantity.clone(),
                redemption_amount: quote.redemption_amount,
                price_per_unit: request.price_per_unit.clone(),
                original_investment: quote.original_investment,
                profit_loss: quote.profit_loss,
                average_price: quote.average_price,
                currency: request.currency,
                reason: request.reason.clone(),
                status: RequestStatus::Pending,
                decided_by: None,
                decided_at: None,
                rejection_reason: None,
                completed_at: None,
                transaction_id: None,
                requested_at: chrono::Utc::now().naive_utc(),
            };
            let redemption = tx.save_redemption(&redemption)?;
            record(
                tx,
                &redemption,
                ActivityType::AssetRedemptionRequested,
                "Asset Redemption Requested",
                format!(
                    "Redemption of {} units of {} requested for {} {}",
                    redemption.quantity, redemption.asset_id, redemption.redemption_amount, redemption.currency
                ),
            );
            Ok(redemption)
        })?;
        info!(redemption_id = redemption.id, "redemption requested");
        Ok(redemption)
    }

    /// Completes a pending redemption: the holding loses the redeemed units
    /// with their share of cost, and the redemption amount moves from the
    /// asset wallet to the external wallet.
    #[instrument(skip(self, decision), fields(cooperative_id = %decision.cooperative_id, decided_by = %decision.decided_by))]
    pub fn approve_redemption(&self, id: i64, decision: &Decision) -> Result<RedemptionOutcome> {
        let outcome = self.store().with_atomic_unit(|tx| {
            let mut redemption = pending_redemption(tx, id, &decision.cooperative_id)?;
            let now = chrono::Utc::now().naive_utc();

            let mut holding = holding_of(tx, &redemption.member_id, &redemption.asset_id, &redemption.quantity)?;
            let mut debited = [resolution::cooperative_wallet(
                tx,
                &redemption.cooperative_id,
                WalletType::Asset,
                Some(redemption.asset_id.as_str()),
            )?];
            let external = resolution::cooperative_wallet(tx, &redemption.cooperative_id, WalletType::External, None)?;
            mutation::lock_for_debit(tx, &mut debited, &redemption.redemption_amount)?;
            let [asset] = debited;
            let removed_cost = holding.dispose_units(&redemption.quantity, now)?;
            let profit_loss = &redemption.redemption_amount - &removed_cost;

            let transaction = tx.insert_transaction(NewTransaction {
                member_id: redemption.member_id.clone(),
                cooperative_id: redemption.cooperative_id.clone(),
                amount: redemption.redemption_amount.clone(),
                currency: redemption.currency,
                kind: TransactionType::Credit,
                status: TransactionStatus::Success,
                reference: format!("RDM-{}", redemption.id),
                asset_id: Some(redemption.asset_id.clone()),
                description: Some(redemption.reason.clone()),
                metadata: TransactionMetadata {
                    quantity: Some(redemption.quantity.clone()),
                    price_per_unit: Some(redemption.price_per_unit.clone()),
                    redemption_id: Some(redemption.id),
                    profit_loss: Some(profit_loss.clone()),
                    ..TransactionMetadata::with_category(Category::Redemption)
                },
            })?;

            let wallets = vec![
                mutation::debit(tx, &asset, &transaction)?,
                mutation::credit(tx, &external, &transaction)?,
            ];
            let holding = tx.save_holding(&holding)?;

            redemption.status = RequestStatus::Completed;
            redemption.original_investment = removed_cost;
            redemption.profit_loss = profit_loss;
            redemption.decided_by = Some(decision.decided_by.clone());
            redemption.decided_at = Some(now);
            redemption.completed_at = Some(now);
            redemption.transaction_id = Some(transaction.id);
            let redemption = tx.save_redemption(&redemption)?;
            record(
                tx,
                &redemption,
                ActivityType::AssetRedemptionApproved,
                "Asset Redemption Approved",
                format!(
                    "Redeemed {} units of {} for {} {}",
                    redemption.quantity, redemption.asset_id, redemption.redemption_amount, redemption.currency
                ),
            );

            Ok(RedemptionOutcome {
                redemption,
                transaction,
                wallets,
                holding,
            })
        })?;
        info!(
            redemption_id = id,
            reference = %outcome.transaction.reference,
            profit_loss = %outcome.redemption.profit_loss,
            "redemption approved"
        );
        Ok(outcome)
    }

    #[instrument(skip(self, decision), fields(cooperative_id = %decision.cooperative_id, decided_by = %decision.decided_by))]
    pub fn reject_redemption(&self, id: i64, decision: &Decision) -> Result<AssetRedemption> {
        let redemption = self.store().with_atomic_unit(|tx| {
            let mut redemption = pending_redemption(tx, id, &decision.cooperative_id)?;
            redemption.status = RequestStatus::Rejected;
            redemption.decided_by = Some(decision.decided_by.clone());
            redemption.decided_at = Some(chrono::Utc::now().naive_utc());
            redemption.rejection_reason = decision.reason.clone();
            let redemption = tx.save_redemption(&redemption)?;
            record(
                tx,
                &redemption,
                ActivityType::AssetRedemptionRejected,
                "Asset Redemption Rejected",
                format!(
                    "Redemption of {} units of {} rejected",
                    redemption.quantity, redemption.asset_id
                ),
            );
            Ok(redemption)
        })?;
        info!(redemption_id = id, "redemption rejected");
        Ok(redemption)
    }
}
