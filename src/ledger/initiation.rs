//! Request side: wallets and pending transactions created before a member is
//! sent to the payment provider.

use bigdecimal::{BigDecimal, Signed};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use crate::currency::Currency;
use crate::database::idgen;
use crate::error::{LedgerError, Result};
use crate::ledger::audit::Activity;
use crate::ledger::model::{
    ActivityStatus, ActivityType, Category, NewTransaction, NewWallet, Transaction, TransactionMetadata,
    TransactionStatus, TransactionType, Wallet, WalletType,
};
use crate::ledger::resolution::{self, MemberWalletKey, ResolutionStrategy};
use crate::ledger::store::LedgerTx;
use crate::ledger::Ledger;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ContributionRequest {
    pub member_id: String,
    pub cooperative_id: String,
    pub amount: BigDecimal,
    #[serde(default)]
    pub currency: Currency,
    pub description: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AssetPurchaseRequest {
    pub member_id: String,
    pub cooperative_id: String,
    pub asset_id: String,
    pub quantity: BigDecimal,
    pub amount: BigDecimal,
    #[serde(default)]
    pub currency: Currency,
    pub description: Option<String>,
}

/// A pending transaction ready to be paid, and the wallet it will land in.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InitiatedPayment {
    pub transaction: Transaction,
    pub wallet: Wallet,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct CooperativeWallets {
    pub external: Wallet,
    pub contribution: Wallet,
}

fn require_positive(what: &str, value: &BigDecimal) -> Result<()> {
    if !value.is_positive() {
        return Err(LedgerError::InvalidAmount(format!("{what} must be positive, got {value}")));
    }
    Ok(())
}

/// Member wallet for `key`, created and audited on first use.
fn open_member_wallet(tx: &mut dyn LedgerTx, key: MemberWalletKey<'_>) -> Result<Wallet> {
    let resolved = resolution::find_or_create_member_wallet(tx, key)?;
    if resolved.strategy == ResolutionStrategy::Created {
        wallet_created(tx, &resolved.wallet);
    }
    Ok(resolved.wallet)
}

fn open_cooperative_wallet(
    tx: &mut dyn LedgerTx,
    cooperative_id: &str,
    wallet_type: WalletType,
    currency: Currency,
    asset_id: Option<&str>,
) -> Result<Wallet> {
    if let Some(existing) = tx.find_cooperative_wallet(cooperative_id, wallet_type, asset_id)? {
        return Ok(existing);
    }
    let wallet = tx.insert_wallet_if_absent(NewWallet::cooperative(cooperative_id, wallet_type, currency, asset_id))?;
    wallet_created(tx, &wallet);
    Ok(wallet)
}

fn wallet_created(tx: &mut dyn LedgerTx, wallet: &Wallet) {
    let mut activity = Activity::new(
        ActivityType::WalletCreated,
        &wallet.cooperative_id,
        "Wallet Created",
        format!("Created {} wallet in {}", wallet.wallet_type, wallet.currency),
    )
    .metadata(json!({
        "walletType": wallet.wallet_type,
        "currency": wallet.currency,
        "assetId": wallet.asset_id,
    }))
    .wallet(wallet.id);
    if let Some(member_id) = wallet.member_id.as_deref() {
        activity = activity.member(member_id);
    }
    activity.record(tx);
}

fn transaction_initiated(tx: &mut dyn LedgerTx, transaction: &Transaction) {
    Activity::new(
        ActivityType::TransactionInitiated,
        &transaction.cooperative_id,
        "Transaction Initiated",
        format!(
            "Payment of {} {} ({}) initiated",
            transaction.amount, transaction.currency, transaction.reference
        ),
    )
    .member(&transaction.member_id)
    .status(ActivityStatus::Pending)
    .metadata(json!({
        "amount": transaction.amount,
        "currency": transaction.currency,
        "type": transaction.kind,
        "reference": transaction.reference,
        "category": transaction.metadata.category,
        "assetId": transaction.asset_id,
    }))
    .transaction(transaction.id)
    .record(tx);
}

impl Ledger {
    /// Finds the member's wallet by exact key, then by currency fallback, and
    /// creates it when neither exists.
    #[instrument(skip(self))]
    pub fn resolve_wallet(
        &self,
        member_id: &str,
        cooperative_id: &str,
        currency: Currency,
        asset_id: Option<&str>,
    ) -> Result<Wallet> {
        let key = MemberWalletKey {
            member_id,
            cooperative_id,
            currency,
            asset_id,
        };
        self.store().with_atomic_unit(|tx| open_member_wallet(tx, key))
    }

    #[instrument(skip(self))]
    pub fn provision_cooperative_wallets(&self, cooperative_id: &str, currency: Currency) -> Result<CooperativeWallets> {
        self.store().with_atomic_unit(|tx| {
            Ok(CooperativeWallets {
                external: open_cooperative_wallet(tx, cooperative_id, WalletType::External, currency, None)?,
                contribution: open_cooperative_wallet(tx, cooperative_id, WalletType::Contribution, currency, None)?,
            })
        })
    }

    #[instrument(skip(self))]
    pub fn provision_asset_wallet(&self, cooperative_id: &str, asset_id: &str, currency: Currency) -> Result<Wallet> {
        self.store()
            .with_atomic_unit(|tx| open_cooperative_wallet(tx, cooperative_id, WalletType::Asset, currency, Some(asset_id)))
    }

    #[instrument(skip(self, request), fields(member_id = %request.member_id, amount = %request.amount))]
    pub fn initiate_contribution(&self, request: &ContributionRequest) -> Result<InitiatedPayment> {
        require_positive("amount", &request.amount)?;
        let initiated = self.store().with_atomic_unit(|tx| {
            let wallet = open_member_wallet(
                tx,
                MemberWalletKey {
                    member_id: &request.member_id,
                    cooperative_id: &request.cooperative_id,
                    currency: request.currency,
                    asset_id: None,
                },
            )?;
            let transaction = tx.insert_transaction(NewTransaction {
                member_id: request.member_id.clone(),
                cooperative_id: request.cooperative_id.clone(),
                amount: request.amount.clone(),
                currency: request.currency,
                kind: TransactionType::Credit,
                status: TransactionStatus::Pending,
                reference: idgen::next_reference("CONT"),
                asset_id: None,
                description: request.description.clone(),
                metadata: TransactionMetadata::with_category(Category::Contribution),
            })?;
            transaction_initiated(tx, &transaction);
            Ok(InitiatedPayment { transaction, wallet })
        })?;
        info!(reference = %initiated.transaction.reference, "contribution initiated");
        Ok(initiated)
    }

    #[instrument(
        skip(self, request),
        fields(member_id = %request.member_id, asset_id = %request.asset_id, amount = %request.amount)
    )]
    pub fn initiate_asset_purchase(&self, request: &AssetPurchaseRequest) -> Result<InitiatedPayment> {
        require_positive("amount", &request.amount)?;
        require_positive("quantity", &request.quantity)?;
        let price_per_unit = &request.amount / &request.quantity;
        let initiated = self.store().with_atomic_unit(|tx| {
            let asset_wallet = resolution::cooperative_wallet(
                tx,
                &request.cooperative_id,
                WalletType::Asset,
                Some(request.asset_id.as_str()),
            )?;
            let transaction = tx.insert_transaction(NewTransaction {
                member_id: request.member_id.clone(),
                cooperative_id: request.cooperative_id.clone(),
                amount: request.amount.clone(),
                currency: request.currency,
                kind: TransactionType::Debit,
                status: TransactionStatus::Pending,
                reference: idgen::next_reference("ASSET"),
                asset_id: Some(request.asset_id.clone()),
                description: request.description.clone(),
                metadata: TransactionMetadata {
                    quantity: Some(request.quantity.clone()),
                    price_per_unit: Some(price_per_unit.clone()),
                    ..TransactionMetadata::with_category(Category::AssetPurchase)
                },
            })?;
            transaction_initiated(tx, &transaction);
            Ok(InitiatedPayment {
                transaction,
                wallet: asset_wallet.wallet,
            })
        })?;
        info!(reference = %initiated.transaction.reference, "asset purchase initiated");
        Ok(initiated)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::fixtures::*;
    use crate::ledger::model::SettlementStatus;

    #[test]
    fn test_provisioning_is_idempotent() {
        let f = fixture();
        let again = f.ledger.provision_cooperative_wallets(COOP, Currency::Ngn).unwrap();
        assert_eq!(again.external.id, f.external.id);
        assert_eq!(again.contribution.id, f.contribution.id);
        assert_eq!(again.external.wallet_type, WalletType::External);

        let asset = f.ledger.provision_asset_wallet(COOP, ASSET, Currency::Ngn).unwrap();
        assert_eq!(asset.id, f.asset.id);
        assert_eq!(asset.asset_id.as_deref(), Some(ASSET));
    }

    #[test]
    fn test_resolve_wallet_creates_once() {
        let f = fixture();
        let first = f.ledger.resolve_wallet(MEMBER, COOP, Currency::Ngn, None).unwrap();
        let second = f.ledger.resolve_wallet(MEMBER, COOP, Currency::Ngn, None).unwrap();
        let fallback = f.ledger.resolve_wallet(MEMBER, COOP, Currency::Usd, None).unwrap();
        assert_eq!(first.id, second.id);
        assert_eq!(first.id, fallback.id);
        assert_eq!(first.wallet_type, WalletType::Member);
        assert_eq!(first.member_id.as_deref(), Some(MEMBER));

        let scoped = f.ledger.resolve_wallet(MEMBER, COOP, Currency::Ngn, Some(ASSET)).unwrap();
        assert_ne!(scoped.id, first.id);
    }

    #[test]
    fn test_contribution_round_trip() {
        let f = fixture();
        let initiated = f
            .ledger
            .initiate_contribution(&ContributionRequest {
                member_id: MEMBER.into(),
                cooperative_id: COOP.into(),
                amount: BigDecimal::from(5000),
                currency: Currency::Ngn,
                description: Some("monthly dues".into()),
            })
            .unwrap();
        let transaction = &initiated.transaction;
        assert!(transaction.reference.starts_with("CONT-"));
        assert_eq!(transaction.status, TransactionStatus::Pending);
        assert_eq!(transaction.kind, TransactionType::Credit);
        assert_eq!(transaction.metadata.category, Some(Category::Contribution));

        let record = f.record(&transaction.reference);
        assert_eq!(record.activities.len(), 1);
        assert_eq!(record.activities[0].activity_type, ActivityType::TransactionInitiated);

        f.ledger.settle(&transaction.reference, SettlementStatus::Success).unwrap();
        assert_eq!(f.balance(initiated.wallet.id), BigDecimal::from(5000));
        assert_eq!(f.balance(f.contribution.id), BigDecimal::from(5000));
    }

    #[test]
    fn test_asset_purchase_records_price() {
        let f = fixture();
        let initiated = f
            .ledger
            .initiate_asset_purchase(&AssetPurchaseRequest {
                member_id: MEMBER.into(),
                cooperative_id: COOP.into(),
                asset_id: ASSET.into(),
                quantity: BigDecimal::from(4),
                amount: BigDecimal::from(1000),
                currency: Currency::Ngn,
                description: None,
            })
            .unwrap();
        let transaction = &initiated.transaction;
        assert!(transaction.reference.starts_with("ASSET-"));
        assert_eq!(transaction.kind, TransactionType::Debit);
        assert_eq!(transaction.asset_id.as_deref(), Some(ASSET));
        assert_eq!(transaction.metadata.price_per_unit, Some(BigDecimal::from(250)));
        assert_eq!(initiated.wallet.id, f.asset.id);
    }

    #[test]
    fn test_initiation_validates_amounts() {
        let f = fixture();
        let err = f
            .ledger
            .initiate_contribution(&ContributionRequest {
                member_id: MEMBER.into(),
                cooperative_id: COOP.into(),
                amount: BigDecimal::from(-1),
                currency: Currency::Ngn,
                description: None,
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::InvalidAmount(_)));

        let err = f
            .ledger
            .initiate_asset_purchase(&AssetPurchaseRequest {
                member_id: MEMBER.into(),
                cooperative_id: COOP.into(),
                asset_id: "unknown".into(),
                quantity: BigDecimal::from(1),
                amount: BigDecimal::from(10),
                currency: Currency::Ngn,
                description: None,
            })
            .unwrap_err();
        assert!(matches!(err, LedgerError::WalletNotFound(_)));
    }
}
