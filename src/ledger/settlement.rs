//! Settlement of payment-status events.
//!
//! One event moves a pending transaction to `success` or `failed` and, on
//! success, applies its effect to every wallet involved. The whole event runs
//! in one atomic unit: either the status flip, every balance change and every
//! holding change commit together, or none of them do.

use bigdecimal::{BigDecimal, Signed};
use serde::Serialize;
use serde_json::json;
use tracing::{info, instrument, warn};

use crate::error::{LedgerError, Result};
use crate::ledger::audit::{self, Activity};
use crate::ledger::idempotency::{self, Admission};
use crate::ledger::model::{
    ActivityType, AssetHolding, Category, SettlementStatus, Transaction, TransactionType, Wallet, WalletType,
};
use crate::ledger::mutation;
use crate::ledger::resolution::{self, MemberWalletKey};
use crate::ledger::store::LedgerTx;
use crate::ledger::Ledger;
use crate::payment::{PaymentProvider, VerifiedSettlement};

/// Result of applying one payment-status event.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Settlement {
    pub transaction: Transaction,
    /// The event was a redelivery for a transaction already in a terminal
    /// status; nothing was changed.
    pub already_processed: bool,
    pub wallets: Vec<Wallet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holding: Option<AssetHolding>,
}

impl Settlement {
    fn unchanged(transaction: Transaction) -> Self {
        Settlement {
            transaction,
            already_processed: true,
            wallets: Vec::new(),
            holding: None,
        }
    }
}

/// How a successful transaction moves money.
enum Plan<'t> {
    General,
    Contribution,
    AssetPurchase { asset_id: &'t str, quantity: &'t BigDecimal },
}

fn plan(transaction: &Transaction) -> Result<Plan<'_>> {
    match (transaction.metadata.category, transaction.asset_id.as_deref()) {
        (None, _) => Ok(Plan::General),
        (Some(Category::Contribution), None) => {
            if transaction.kind != TransactionType::Credit {
                return Err(LedgerError::InvalidType(format!(
                    "contribution {} must be CR, got {}",
                    transaction.reference, transaction.kind
                )));
            }
            Ok(Plan::Contribution)
        }
        (Some(Category::Contribution), Some(asset_id)) => Err(LedgerError::InvalidMetadata(format!(
            "contribution {} carries asset {asset_id}",
            transaction.reference
        ))),
        (Some(Category::AssetPurchase), Some(asset_id)) => match transaction.metadata.quantity.as_ref() {
            Some(quantity) if quantity.is_positive() => Ok(Plan::AssetPurchase { asset_id, quantity }),
            _ => Err(LedgerError::InvalidMetadata(format!(
                "asset purchase {} needs a positive quantity",
                transaction.reference
            ))),
        },
        (Some(Category::AssetPurchase), None) => Err(LedgerError::InvalidMetadata(format!(
            "asset purchase {} has no asset",
            transaction.reference
        ))),
        (Some(category @ (Category::Withdrawal | Category::Redemption)), _) => Err(LedgerError::InvalidMetadata(
            format!("{category} {} is settled by approval, not by a payment event", transaction.reference),
        )),
    }
}

fn validate(transaction: &Transaction) -> Result<()> {
    if !transaction.amount.is_positive() {
        return Err(LedgerError::InvalidAmount(format!(
            "transaction {} has amount {}",
            transaction.reference, transaction.amount
        )));
    }
    plan(transaction).map(|_| ())
}

/// Applies one event inside the caller's unit.
pub fn apply_event(tx: &mut dyn LedgerTx, reference: &str, status: SettlementStatus) -> Result<Settlement> {
    let admission = idempotency::admit(tx, reference, status.into(), |stored| match status {
        SettlementStatus::Success => validate(stored),
        SettlementStatus::Failed => Ok(()),
    })?;
    let transaction = match admission {
        Admission::AlreadySettled(stored) => return Ok(Settlement::unchanged(stored)),
        Admission::Admitted(moved) => moved,
    };

    if status == SettlementStatus::Failed {
        audit::transaction_failed(tx, &transaction);
        return Ok(Settlement {
            transaction,
            already_processed: false,
            wallets: Vec::new(),
            holding: None,
        });
    }

    let (wallets, holding) = match plan(&transaction)? {
        Plan::General => (settle_general(tx, &transaction)?, None),
        Plan::Contribution => (settle_contribution(tx, &transaction)?, None),
        Plan::AssetPurchase { asset_id, quantity } => {
            let (wallets, holding) = settle_asset_purchase(tx, &transaction, asset_id, quantity)?;
            (wallets, Some(holding))
        }
    };
    audit::transaction_successful(tx, &transaction, &wallets);

    Ok(Settlement {
        transaction,
        already_processed: false,
        wallets,
        holding,
    })
}

fn member_key(transaction: &Transaction) -> MemberWalletKey<'_> {
    MemberWalletKey {
        member_id: &transaction.member_id,
        cooperative_id: &transaction.cooperative_id,
        currency: transaction.currency,
        asset_id: transaction.asset_id.as_deref(),
    }
}

fn settle_general(tx: &mut dyn LedgerTx, transaction: &Transaction) -> Result<Vec<Wallet>> {
    let member = resolution::member_wallet(tx, member_key(transaction))?;
    let updated = mutation::apply(tx, &member, &transaction.amount, transaction.kind, transaction)?;
    Ok(vec![updated])
}

fn settle_contribution(tx: &mut dyn LedgerTx, transaction: &Transaction) -> Result<Vec<Wallet>> {
    let pool = resolution::cooperative_wallet(tx, &transaction.cooperative_id, WalletType::Contribution, None)?;
    let member = resolution::member_wallet(tx, member_key(transaction))?;

    let pool = mutation::credit(tx, &pool, transaction)?;
    let member = mutation::credit(tx, &member, transaction)?;
    Ok(vec![pool, member])
}

fn settle_asset_purchase(
    tx: &mut dyn LedgerTx,
    transaction: &Transaction,
    asset_id: &str,
    quantity: &BigDecimal,
) -> Result<(Vec<Wallet>, AssetHolding)> {
    let external = resolution::cooperative_wallet(tx, &transaction.cooperative_id, WalletType::External, None)?;
    let asset = resolution::cooperative_wallet(tx, &transaction.cooperative_id, WalletType::Asset, Some(asset_id))?;

    // lock order: holding, then wallets
    let mut holding = tx.open_holding(&AssetHolding::open(
        &transaction.member_id,
        asset_id,
        &transaction.cooperative_id,
        transaction.updated_at,
    ))?;

    let external = mutation::debit(tx, &external, transaction)?;
    let asset = mutation::credit(tx, &asset, transaction)?;

    holding.add_investment(quantity, &transaction.amount, transaction.updated_at)?;
    let holding = tx.save_holding(&holding)?;

    Activity::new(
        ActivityType::AssetPurchaseCompleted,
        &transaction.cooperative_id,
        "Asset Purchase Completed",
        format!("Purchased {quantity} units of {asset_id} for {} {}", transaction.amount, transaction.currency),
    )
    .member(&transaction.member_id)
    .metadata(json!({
        "assetId": asset_id,
        "quantity": quantity,
        "amount": transaction.amount,
        "reference": transaction.reference,
        "holdingQuantity": holding.quantity,
        "totalInvested": holding.total_invested,
        "averagePrice": holding.average_price(),
    }))
    .transaction(transaction.id)
    .record(tx);

    Ok((vec![external, asset], holding))
}

impl Ledger {
    /// Settles the transaction behind `reference` with a provider-reported
    /// status. Redeliveries of an already settled reference are reported
    /// through `Settlement::already_processed`.
    #[instrument(skip(self))]
    pub fn settle(&self, reference: &str, status: SettlementStatus) -> Result<Settlement> {
        let settlement = self
            .store()
            .with_atomic_unit(|tx| apply_event(tx, reference, status))?;
        log_outcome(&settlement);
        Ok(settlement)
    }

    /// Asks the payment provider for the authoritative status of `reference`
    /// and settles with it. The provider's amount must match the recorded one.
    #[instrument(skip(self, provider))]
    pub fn settle_verified(&self, reference: &str, provider: &dyn PaymentProvider) -> Result<VerifiedSettlement> {
        let verified = provider.verify(reference)?;
        let status = match verified.status.parse::<SettlementStatus>() {
            Ok(status) => status,
            Err(_) => {
                info!(provider_status = %verified.status, "payment not settled by provider yet");
                return Ok(VerifiedSettlement::Unsettled {
                    reference: reference.to_string(),
                    provider_status: verified.status,
                });
            }
        };

        let settlement = self.store().with_atomic_unit(|tx| {
            if status == SettlementStatus::Success {
                if let Some(stored) = tx.lock_transaction_by_reference(reference)? {
                    if !stored.status.is_terminal() && stored.amount != verified.amount {
                        return Err(LedgerError::AmountMismatch {
                            reference: reference.to_string(),
                            recorded: stored.amount,
                            verified: verified.amount.clone(),
                        });
                    }
                }
            }
            apply_event(tx, reference, status)
        })?;
        log_outcome(&settlement);
        Ok(VerifiedSettlement::Settled(settlement))
    }
}

fn log_outcome(settlement: &Settlement) {
    let transaction = &settlement.transaction;
    if settlement.already_processed {
        warn!(
            reference = %transaction.reference,
            status = transaction.status.as_str(),
            "payment event redelivered for settled transaction"
        );
        return;
    }
    info!(
        reference = %transaction.reference,
        status = transaction.status.as_str(),
        amount = %transaction.amount,
        wallets = settlement.wallets.len(),
        "transaction settled"
    );
}
