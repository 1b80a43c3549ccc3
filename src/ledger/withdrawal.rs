//! Member withdrawals. A request only records intent; money moves when an
//! administrator of the owning cooperative approves it.

use bigdecimal::{BigDecimal, Signed, Zero};
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{info, instrument};

use crate::currency::Currency;
use crate::database::idgen;
use crate::error::{LedgerError, Result};
use crate::ledger::audit::Activity;
use crate::ledger::model::{
    ActivityStatus, ActivityType, AssetHolding, Category, Decision, NewTransaction, RequestStatus, Transaction,
    TransactionMetadata, TransactionStatus, TransactionType, Wallet, WalletType, Withdrawal, WithdrawalType,
};
use crate::ledger::mutation;
use crate::ledger::resolution::{self, MemberWalletKey};
use crate::ledger::store::LedgerTx;
use crate::ledger::Ledger;

#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WithdrawalRequest {
    pub member_id: String,
    pub cooperative_id: String,
    pub amount: BigDecimal,
    pub withdrawal_type: WithdrawalType,
    pub asset_id: Option<String>,
    #[serde(default)]
    pub currency: Currency,
    #[serde(default)]
    pub reason: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct WithdrawalOutcome {
    pub withdrawal: Withdrawal,
    pub transaction: Transaction,
    pub wallets: Vec<Wallet>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub holding: Option<AssetHolding>,
}

/// Fails unless a request of `owner` in `status` may still be decided by
/// `cooperative_id`.
pub(crate) fn ensure_decidable(
    entity: &'static str,
    id: i64,
    owner: &str,
    status: RequestStatus,
    cooperative_id: &str,
) -> Result<()> {
    if owner != cooperative_id {
        return Err(LedgerError::CooperativeMismatch {
            entity,
            id,
            cooperative_id: cooperative_id.to_string(),
        });
    }
    if status != RequestStatus::Pending {
        return Err(LedgerError::NotPending { entity, id });
    }
    Ok(())
}

fn pending_withdrawal(tx: &mut dyn LedgerTx, id: i64, cooperative_id: &str) -> Result<Withdrawal> {
    let withdrawal = tx
        .find_withdrawal(id)?
        .ok_or(LedgerError::RecordNotFound { entity: "withdrawal", id })?;
    ensure_decidable("withdrawal", id, &withdrawal.cooperative_id, withdrawal.status, cooperative_id)?;
    Ok(withdrawal)
}

fn held_asset<'w>(withdrawal: &'w Withdrawal) -> Result<&'w str> {
    withdrawal
        .asset_id
        .as_deref()
        .ok_or_else(|| LedgerError::InvalidMetadata(format!("asset withdrawal {} has no asset", withdrawal.id)))
}

fn holding_covering(tx: &mut dyn LedgerTx, withdrawal: &Withdrawal, asset_id: &str) -> Result<AssetHolding> {
    let amount = &withdrawal.amount;
    let holding = tx.lock_holding(&withdrawal.member_id, asset_id)?;
    match holding {
        Some(holding) if &holding.total_invested >= amount => {
            holding.ensure_cooperative(&withdrawal.cooperative_id)?;
            Ok(holding)
        }
        other => Err(LedgerError::InsufficientUnits {
            asset_id: asset_id.to_string(),
            held: other.map(|h| h.total_invested).unwrap_or_else(BigDecimal::zero),
            requested: amount.clone(),
        }),
    }
}

fn member_key(withdrawal: &Withdrawal) -> MemberWalletKey<'_> {
    MemberWalletKey {
        member_id: &withdrawal.member_id,
        cooperative_id: &withdrawal.cooperative_id,
        currency: withdrawal.currency,
        asset_id: None,
    }
}

fn record(tx: &mut dyn LedgerTx, withdrawal: &Withdrawal, activity_type: ActivityType, title: &str, description: String) {
    let status = match withdrawal.status {
        RequestStatus::Pending | RequestStatus::Approved => ActivityStatus::Pending,
        RequestStatus::Completed => ActivityStatus::Success,
        RequestStatus::Rejected => ActivityStatus::Failed,
    };
    let mut activity = Activity::new(activity_type, &withdrawal.cooperative_id, title, description)
        .member(&withdrawal.member_id)
        .status(status)
        .metadata(json!({
            "withdrawalId": withdrawal.id,
            "withdrawalType": withdrawal.withdrawal_type,
            "amount": withdrawal.amount,
            "currency": withdrawal.currency,
            "assetId": withdrawal.asset_id,
            "decidedBy": withdrawal.decided_by,
            "rejectionReason": withdrawal.rejection_reason,
        }));
    if let Some(transaction_id) = withdrawal.transaction_id {
        activity = activity.transaction(transaction_id);
    }
    activity.record(tx);
}

impl Ledger {
    #[instrument(skip(self, request), fields(member_id = %request.member_id, amount = %request.amount))]
    pub fn request_withdrawal(&self, request: &WithdrawalRequest) -> Result<Withdrawal> {
        if !request.amount.is_positive() {
            return Err(LedgerError::InvalidAmount(format!(
                "withdrawal amount must be positive, got {}",
                request.amount
            )));
        }
        let withdrawal = self.store().with_atomic_unit(|tx| {
            let mut withdrawal = Withdrawal {
                id: idgen::next(),
                member_id: request.member_id.clone(),
                cooperative_id: request.cooperative_id.clone(),
                amount: request.amount.clone(),
                withdrawal_type: request.withdrawal_type,
                asset_id: None,
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
            match request.withdrawal_type {
                WithdrawalType::Contribution => {
                    let member = resolution::member_wallet(tx, member_key(&withdrawal))?;
                    mutation::ensure_sufficient(&member.wallet, &request.amount)?;
                }
                WithdrawalType::Asset => {
                    withdrawal.asset_id = request.asset_id.clone();
                    let asset_id = held_asset(&withdrawal)?;
                    holding_covering(tx, &withdrawal, asset_id)?;
                }
            }
            let withdrawal = tx.save_withdrawal(&withdrawal)?;
            record(
                tx,
                &withdrawal,
                ActivityType::WithdrawalRequested,
                "Withdrawal Requested",
                format!("Withdrawal of {} {} requested", withdrawal.amount, withdrawal.currency),
            );
            Ok(withdrawal)
        })?;
        info!(withdrawal_id = withdrawal.id, "withdrawal requested");
        Ok(withdrawal)
    }

    /// Pays out a pending withdrawal. Every debited wallet is checked for
    /// funds before the first balance moves.
    #[instrument(skip(self, decision), fields(cooperative_id = %decision.cooperative_id, decided_by = %decision.decided_by))]
    pub fn approve_withdrawal(&self, id: i64, decision: &Decision) -> Result<WithdrawalOutcome> {
        let outcome = self.store().with_atomic_unit(|tx| {
            let mut withdrawal = pending_withdrawal(tx, id, &decision.cooperative_id)?;
            let now = chrono::Utc::now().naive_utc();

            let external = resolution::cooperative_wallet(tx, &withdrawal.cooperative_id, WalletType::External, None)?;
            let (mut debited, mut holding) = match withdrawal.withdrawal_type {
                WithdrawalType::Contribution => {
                    let member = resolution::member_wallet(tx, member_key(&withdrawal))?;
                    let pool = resolution::cooperative_wallet(
                        tx,
                        &withdrawal.cooperative_id,
                        WalletType::Contribution,
                        None,
                    )?;
                    (vec![member, pool], None)
                }
                WithdrawalType::Asset => {
                    let asset_id = held_asset(&withdrawal)?;
                    let asset = resolution::cooperative_wallet(
                        tx,
                        &withdrawal.cooperative_id,
                        WalletType::Asset,
                        Some(asset_id),
                    )?;
                    let holding = holding_covering(tx, &withdrawal, asset_id)?;
                    (vec![asset], Some(holding))
                }
            };
            mutation::lock_for_debit(tx, &mut debited, &withdrawal.amount)?;
            if let Some(holding) = holding.as_mut() {
                holding.withdraw_value(&withdrawal.amount, now)?;
            }

            let transaction = tx.insert_transaction(NewTransaction {
                member_id: withdrawal.member_id.clone(),
                cooperative_id: withdrawal.cooperative_id.clone(),
                amount: withdrawal.amount.clone(),
                currency: withdrawal.currency,
                kind: TransactionType::Debit,
                status: TransactionStatus::Success,
                reference: format!("WDR-{}", withdrawal.id),
                asset_id: withdrawal.asset_id.clone(),
                description: Some(withdrawal.reason.clone()),
                metadata: TransactionMetadata {
                    withdrawal_id: Some(withdrawal.id),
                    ..TransactionMetadata::with_category(Category::Withdrawal)
                },
            })?;

            let mut wallets = Vec::with_capacity(debited.len() + 1);
            for target in &debited {
                wallets.push(mutation::debit(tx, target, &transaction)?);
            }
            wallets.push(mutation::credit(tx, &external, &transaction)?);
            let holding = match holding {
                Some(holding) => Some(tx.save_holding(&holding)?),
                None => None,
            };

            withdrawal.status = RequestStatus::Completed;
            withdrawal.decided_by = Some(decision.decided_by.clone());
            withdrawal.decided_at = Some(now);
            withdrawal.completed_at = Some(now);
            withdrawal.transaction_id = Some(transaction.id);
            let withdrawal = tx.save_withdrawal(&withdrawal)?;
            record(
                tx,
                &withdrawal,
                ActivityType::WithdrawalProcessed,
                "Withdrawal Processed",
                format!("Withdrawal of {} {} paid out", withdrawal.amount, withdrawal.currency),
            );

            Ok(WithdrawalOutcome {
                withdrawal,
                transaction,
                wallets,
                holding,
            })
        })?;
        info!(withdrawal_id = id, reference = %outcome.transaction.reference, "withdrawal approved");
        Ok(outcome)
    }

    #[instrument(skip(self, decision), fields(cooperative_id = %decision.cooperative_id, decided_by = %decision.decided_by))]
    pub fn reject_withdrawal(&self, id: i64, decision: &Decision) -> Result<Withdrawal> {
        let withdrawal = self.store().with_atomic_unit(|tx| {
            let mut withdrawal = pending_withdrawal(tx, id, &decision.cooperative_id)?;
            withdrawal.status = RequestStatus::Rejected;
            withdrawal.decided_by = Some(decision.decided_by.clone());
            withdrawal.decided_at = Some(chrono::Utc::now().naive_utc());
            withdrawal.rejection_reason = decision.reason.clone();
            let withdrawal = tx.save_withdrawal(&withdrawal)?;
            record(
                tx,
                &withdrawal,
                ActivityType::WithdrawalRejected,
                "Withdrawal Rejected",
                format!(
                    "Withdrawal of {} {} rejected: {}",
                    withdrawal.amount,
                    withdrawal.currency,
                    withdrawal.rejection_reason.as_deref().unwrap_or("no reason given")
                ),
            );
            Ok(withdrawal)
        })?;
        info!(withdrawal_id = id, "withdrawal rejected");
        Ok(withdrawal)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ledger::fixtures::*;
    use crate::ledger::model::{HoldingStatus, SettlementStatus};

    fn dec(value: i64) -> BigDecimal {
        BigDecimal::from(value)
    }

    fn decision(cooperative_id: &str) -> Decision {
        Decision {
            cooperative_id: cooperative_id.into(),
            decided_by: "admin-1".into(),
            reason: None,
        }
    }

    fn request(withdrawal_type: WithdrawalType, amount: i64, asset_id: Option<&str>) -> WithdrawalRequest {
        WithdrawalRequest {
            member_id: MEMBER.into(),
            cooperative_id: COOP.into(),
            amount: dec(amount),
            withdrawal_type,
            asset_id: asset_id.map(str::to_string),
            currency: Currency::Ngn,
            reason: "school fees".into(),
        }
    }

    fn buy_asset(f: &Fixture, quantity: i64, amount: i64) {
        f.fund(f.external.id, amount);
        let reference = idgen::next_reference("ASSET");
        f.pending(
            &reference,
            amount,
            TransactionType::Debit,
            Some(ASSET),
            TransactionMetadata {
                quantity: Some(dec(quantity)),
                ..TransactionMetadata::with_category(Category::AssetPurchase)
            },
        );
        f.ledger.settle(&reference, SettlementStatus::Success).unwrap();
    }

    #[test]
    fn test_contribution_withdrawal() {
        let f = fixture();
        let member = f.member_wallet(Currency::Ngn, None);
        f.fund(member.id, 1000);
        f.fund(f.contribution.id, 1000);

        let requested = f
            .ledger
            .request_withdrawal(&request(WithdrawalType::Contribution, 300, None))
            .unwrap();
        assert_eq!(requested.status, RequestStatus::Pending);
        assert_eq!(f.balance(member.id), dec(1000));

        let outcome = f.ledger.approve_withdrawal(requested.id, &decision(COOP)).unwrap();
        assert_eq!(outcome.withdrawal.status, RequestStatus::Completed);
        assert_eq!(outcome.withdrawal.transaction_id, Some(outcome.transaction.id));
        assert_eq!(outcome.transaction.reference, format!("WDR-{}", requested.id));
        assert_eq!(outcome.transaction.kind, TransactionType::Debit);
        assert_eq!(outcome.transaction.status, TransactionStatus::Success);
        assert_eq!(f.balance(member.id), dec(700));
        assert_eq!(f.balance(f.contribution.id), dec(700));
        assert_eq!(f.balance(f.external.id), dec(300));

        let activities = f.record(&outcome.transaction.reference).activities;
        assert_eq!(
            activities
                .iter()
                .filter(|a| a.activity_type == ActivityType::WalletBalanceUpdated)
                .count(),
            3
        );
        assert!(activities
            .iter()
            .any(|a| a.activity_type == ActivityType::WithdrawalProcessed));
    }

    #[test]
    fn test_request_needs_funds() {
        let f = fixture();
        let member = f.member_wallet(Currency::Ngn, None);
        f.fund(member.id, 100);
        assert!(matches!(
            f.ledger.request_withdrawal(&request(WithdrawalType::Contribution, 101, None)),
            Err(LedgerError::InsufficientBalance { .. })
        ));
        assert!(matches!(
            f.ledger.request_withdrawal(&request(WithdrawalType::Contribution, 0, None)),
            Err(LedgerError::InvalidAmount(_))
        ));
        assert!(matches!(
            f.ledger.request_withdrawal(&request(WithdrawalType::Asset, 10, None)),
            Err(LedgerError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_approval_checks_every_wallet_first() {
        let f = fixture();
        let member = f.member_wallet(Currency::Ngn, None);
        f.fund(member.id, 500);
        f.fund(f.contribution.id, 100);
        let requested = f
            .ledger
            .request_withdrawal(&request(WithdrawalType::Contribution, 300, None))
            .unwrap();

        let err = f.ledger.approve_withdrawal(requested.id, &decision(COOP)).unwrap_err();
        assert!(matches!(err, LedgerError::InsufficientBalance { wallet_id, .. } if wallet_id == f.contribution.id));
        assert_eq!(f.balance(member.id), dec(500));
        assert_eq!(f.balance(f.external.id), dec(0));
    }

    #[test]
    fn test_asset_withdrawal_reduces_holding_by_value() {
        let f = fixture();
        buy_asset(&f, 100, 10_000);

        let requested = f
            .ledger
            .request_withdrawal(&request(WithdrawalType::Asset, 2500, Some(ASSET)))
            .unwrap();
        let outcome = f.ledger.approve_withdrawal(requested.id, &decision(COOP)).unwrap();
        let holding = outcome.holding.unwrap();
        assert_eq!(holding.quantity, dec(75));
        assert_eq!(holding.total_invested, dec(7500));
        assert_eq!(holding.status, HoldingStatus::Active);
        assert_eq!(f.balance(f.asset.id), dec(7500));
        assert_eq!(f.balance(f.external.id), dec(2500));
    }

    #[test]
    fn test_asset_withdrawal_beyond_holding() {
        let f = fixture();
        buy_asset(&f, 10, 1000);
        assert!(matches!(
            f.ledger.request_withdrawal(&request(WithdrawalType::Asset, 1001, Some(ASSET))),
            Err(LedgerError::InsufficientUnits { .. })
        ));

        let other_cooperative = WithdrawalRequest {
            cooperative_id: "coop-2".into(),
            ..request(WithdrawalType::Asset, 500, Some(ASSET))
        };
        assert!(matches!(
            f.ledger.request_withdrawal(&other_cooperative),
            Err(LedgerError::InvalidMetadata(_))
        ));
    }

    #[test]
    fn test_decisions_are_scoped_and_final() {
        let f = fixture();
        let member = f.member_wallet(Currency::Ngn, None);
        f.fund(member.id, 1000);
        let requested = f
            .ledger
            .request_withdrawal(&request(WithdrawalType::Contribution, 300, None))
            .unwrap();

        assert!(matches!(
            f.ledger.approve_withdrawal(requested.id, &decision("coop-2")),
            Err(LedgerError::CooperativeMismatch { entity: "withdrawal", .. })
        ));

        let rejected = f
            .ledger
            .reject_withdrawal(
                requested.id,
                &Decision {
                    reason: Some("incomplete paperwork".into()),
                    ..decision(COOP)
                },
            )
            .unwrap();
        assert_eq!(rejected.status, RequestStatus::Rejected);
        assert_eq!(rejected.rejection_reason.as_deref(), Some("incomplete paperwork"));

        assert!(matches!(
            f.ledger.approve_withdrawal(requested.id, &decision(COOP)),
            Err(LedgerError::NotPending { entity: "withdrawal", .. })
        ));
        assert!(matches!(
            f.ledger.reject_withdrawal(-7, &decision(COOP)),
            Err(LedgerError::RecordNotFound { entity: "withdrawal", id: -7 })
        ));
        assert_eq!(f.balance(member.id), dec(1000));
    }
}
