//! Locating the wallets a transaction moves.
//!
//! Member wallets are looked up by exact `(member, currency, asset)` first. If
//! that misses, a second lookup ignores the currency, because older wallets
//! were created with inconsistent currency tags. The second lookup is a named
//! strategy so it shows up in logs and in the audit record of the mutation.
//! Cooperative-level wallets never fall back: they are provisioned up front
//! and a missing one is a setup error.

use serde::Serialize;
use tracing::{debug, warn};

use crate::currency::Currency;
use crate::error::{LedgerError, Result};
use crate::ledger::model::{NewWallet, Wallet, WalletType};
use crate::ledger::store::LedgerTx;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ResolutionStrategy {
    Exact,
    CurrencyFallback,
    Created,
    Cooperative,
}

#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedWallet {
    pub wallet: Wallet,
    pub strategy: ResolutionStrategy,
}

/// Key of a member-scoped wallet.
#[derive(Debug, Clone, Copy)]
pub struct MemberWalletKey<'a> {
    pub member_id: &'a str,
    pub cooperative_id: &'a str,
    pub currency: Currency,
    pub asset_id: Option<&'a str>,
}

impl std::fmt::Display for MemberWalletKey<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "member {}, currency {}, asset {}",
            self.member_id,
            self.currency,
            self.asset_id.unwrap_or("none")
        )
    }
}

fn lookup_member_wallet(tx: &mut dyn LedgerTx, key: MemberWalletKey<'_>) -> Result<Option<ResolvedWallet>> {
    if let Some(wallet) = tx.find_member_wallet(key.member_id, Some(key.currency), key.asset_id)? {
        debug!(wallet_id = wallet.id, "resolved member wallet by exact key");
        return Ok(Some(ResolvedWallet {
            wallet,
            strategy: ResolutionStrategy::Exact,
        }));
    }
    if let Some(wallet) = tx.find_member_wallet(key.member_id, None, key.asset_id)? {
        warn!(
            wallet_id = wallet.id,
            wallet_currency = wallet.currency.as_str(),
            requested_currency = key.currency.as_str(),
            "resolved member wallet by currency fallback"
        );
        return Ok(Some(ResolvedWallet {
            wallet,
            strategy: ResolutionStrategy::CurrencyFallback,
        }));
    }
    Ok(None)
}

/// Wallet a settlement moves for a member. Never creates one.
pub fn member_wallet(tx: &mut dyn LedgerTx, key: MemberWalletKey<'_>) -> Result<ResolvedWallet> {
    lookup_member_wallet(tx, key)?.ok_or_else(|| LedgerError::WalletNotFound(key.to_string()))
}

/// Wallet that will receive a member's payment, created on first use.
pub fn find_or_create_member_wallet(tx: &mut dyn LedgerTx, key: MemberWalletKey<'_>) -> Result<ResolvedWallet> {
    if let Some(resolved) = lookup_member_wallet(tx, key)? {
        return Ok(resolved);
    }
    let wallet = tx.insert_wallet_if_absent(NewWallet::member(
        key.member_id,
        key.cooperative_id,
        key.currency,
        key.asset_id,
    ))?;
    debug!(wallet_id = wallet.id, "created member wallet");
    Ok(ResolvedWallet {
        wallet,
        strategy: ResolutionStrategy::Created,
    })
}

pub fn cooperative_wallet(
    tx: &mut dyn LedgerTx,
    cooperative_id: &str,
    wallet_type: WalletType,
    asset_id: Option<&str>,
) -> Result<ResolvedWallet> {
    let wallet = tx
        .find_cooperative_wallet(cooperative_id, wallet_type, asset_id)?
        .ok_or_else(|| {
            LedgerError::WalletNotFound(format!(
                "{} wallet of cooperative {}{}",
                wallet_type,
                cooperative_id,
                asset_id.map(|a| format!(" for asset {a}")).unwrap_or_default()
            ))
        })?;
    Ok(ResolvedWallet {
        wallet,
        strategy: ResolutionStrategy::Cooperative,
    })
}
