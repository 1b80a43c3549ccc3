//! Average-cost accounting for a member's position in one asset.
//!
//! Removing part of a position removes the same fraction of its cost basis,
//! whether the removal is expressed in units (redemption) or in value
//! (withdrawal).

use bigdecimal::{BigDecimal, Signed, Zero};
use chrono::NaiveDateTime;

use crate::database::idgen;
use crate::error::{LedgerError, Result};
use crate::ledger::model::{AssetHolding, HoldingStatus};

/// Figures quoted to a member for redeeming part of a holding.
#[derive(Debug, Clone, PartialEq)]
pub struct RedemptionQuote {
    pub redemption_amount: BigDecimal,
    pub original_investment: BigDecimal,
    pub profit_loss: BigDecimal,
    pub average_price: BigDecimal,
}

impl AssetHolding {
    pub fn open(member_id: &str, asset_id: &str, cooperative_id: &str, at: NaiveDateTime) -> Self {
        AssetHolding {
            id: idgen::next(),
            member_id: member_id.to_string(),
            asset_id: asset_id.to_string(),
            cooperative_id: cooperative_id.to_string(),
            quantity: BigDecimal::zero(),
            total_invested: BigDecimal::zero(),
            status: HoldingStatus::Active,
            last_transaction_at: at,
            created_at: at,
            updated_at: at,
        }
    }

    /// Fails unless the holding was bought through `cooperative_id`.
    pub fn ensure_cooperative(&self, cooperative_id: &str) -> Result<()> {
        if self.cooperative_id != cooperative_id {
            return Err(LedgerError::InvalidMetadata(format!(
                "holding of {} in {} belongs to cooperative {}, not {cooperative_id}",
                self.member_id, self.asset_id, self.cooperative_id
            )));
        }
        Ok(())
    }

    pub fn average_price(&self) -> BigDecimal {
        if self.quantity.is_zero() {
            return BigDecimal::zero();
        }
        &self.total_invested / &self.quantity
    }

    pub fn add_investment(&mut self, quantity: &BigDecimal, amount: &BigDecimal, at: NaiveDateTime) -> Result<()> {
        if !quantity.is_positive() {
            return Err(LedgerError::InvalidAmount(format!("quantity must be positive, got {quantity}")));
        }
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(format!("amount must be positive, got {amount}")));
        }
        self.quantity += quantity;
        self.total_invested += amount;
        self.touch(at);
        Ok(())
    }

    /// Removes `units` and returns the cost basis that went with them.
    pub fn dispose_units(&mut self, units: &BigDecimal, at: NaiveDateTime) -> Result<BigDecimal> {
        if !units.is_positive() {
            return Err(LedgerError::InvalidAmount(format!("quantity must be positive, got {units}")));
        }
        if units > &self.quantity {
            return Err(LedgerError::InsufficientUnits {
                asset_id: self.asset_id.clone(),
                held: self.quantity.clone(),
                requested: units.clone(),
            });
        }
        let remaining_quantity = &self.quantity - units;
        // multiply before dividing so whole-unit positions stay exact
        let remaining_cost = &self.total_invested * &remaining_quantity / &self.quantity;
        let removed_cost = &self.total_invested - &remaining_cost;
        self.quantity = remaining_quantity;
        self.total_invested = remaining_cost;
        self.touch(at);
        Ok(removed_cost)
    }

    /// Removes `amount` of cost basis and returns the units that went with it.
    pub fn withdraw_value(&mut self, amount: &BigDecimal, at: NaiveDateTime) -> Result<BigDecimal> {
        if !amount.is_positive() {
            return Err(LedgerError::InvalidAmount(format!("amount must be positive, got {amount}")));
        }
        if amount > &self.total_invested {
            return Err(LedgerError::InsufficientUnits {
                asset_id: self.asset_id.clone(),
                held: self.total_invested.clone(),
                requested: amount.clone(),
            });
        }
        let remaining_cost = &self.total_invested - amount;
        let remaining_quantity = &self.quantity * &remaining_cost / &self.total_invested;
        let removed_units = &self.quantity - &remaining_quantity;
        self.quantity = remaining_quantity;
        self.total_invested = remaining_cost;
        self.touch(at);
        Ok(removed_units)
    }

    pub fn quote_redemption(&self, units: &BigDecimal, price_per_unit: &BigDecimal) -> Result<RedemptionQuote> {
        if !units.is_positive() {
            return Err(LedgerError::InvalidAmount(format!("quantity must be positive, got {units}")));
        }
        if !price_per_unit.is_positive() {
            return Err(LedgerError::InvalidAmount(format!("price must be positive, got {price_per_unit}")));
        }
        if units > &self.quantity {
            return Err(LedgerError::InsufficientUnits {
                asset_id: self.asset_id.clone(),
                held: self.quantity.clone(),
                requested: units.clone(),
            });
        }
        let average_price = self.average_price();
        let redemption_amount = units * price_per_unit;
        let original_investment = &self.total_invested * units / &self.quantity;
        let profit_loss = &redemption_amount - &original_investment;
        Ok(RedemptionQuote {
            redemption_amount,
            original_investment,
            profit_loss,
            average_price,
        })
    }

    fn touch(&mut self, at: NaiveDateTime) {
        self.status = if self.quantity.is_zero() {
            HoldingStatus::Sold
        } else {
            HoldingStatus::Active
        };
        self.last_transaction_at = at;
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::str::FromStr;

    fn now() -> NaiveDateTime {
        chrono::Utc::now().naive_utc()
    }

    fn holding(quantity: i64, invested: i64) -> AssetHolding {
        let mut holding = AssetHolding::open("m1", "a1", "c1", now());
        holding
            .add_investment(&BigDecimal::from(quantity), &BigDecimal::from(invested), now())
            .unwrap();
        holding
    }

    #[test]
    fn test_partial_redemption_keeps_average_cost() {
        let mut h = holding(100, 10000);
        let quote = h.quote_redemption(&BigDecimal::from(40), &BigDecimal::from(150)).unwrap();
        assert_eq!(quote.redemption_amount, BigDecimal::from(6000));
        assert_eq!(quote.original_investment, BigDecimal::from(4000));
        assert_eq!(quote.profit_loss, BigDecimal::from(2000));
        assert_eq!(quote.average_price, BigDecimal::from(100));

        let removed = h.dispose_units(&BigDecimal::from(40), now()).unwrap();
        assert_eq!(removed, BigDecimal::from(4000));
        assert_eq!(h.quantity, BigDecimal::from(60));
        assert_eq!(h.total_invested, BigDecimal::from(6000));
        assert_eq!(h.average_price(), BigDecimal::from(100));
        assert_eq!(h.status, HoldingStatus::Active);
    }

    #[test]
    fn test_full_disposal_marks_sold() {
        let mut h = holding(3, 1000);
        let removed = h.dispose_units(&BigDecimal::from(3), now()).unwrap();
        assert_eq!(removed, BigDecimal::from(1000));
        assert!(h.quantity.is_zero());
        assert!(h.total_invested.is_zero());
        assert_eq!(h.status, HoldingStatus::Sold);
        assert!(h.average_price().is_zero());

        h.add_investment(&BigDecimal::from(1), &BigDecimal::from(500), now()).unwrap();
        assert_eq!(h.status, HoldingStatus::Active);
    }

    #[test]
    fn test_withdraw_value_is_proportional() {
        let mut h = holding(100, 10000);
        let units = h.withdraw_value(&BigDecimal::from(2500), now()).unwrap();
        assert_eq!(units, BigDecimal::from(25));
        assert_eq!(h.quantity, BigDecimal::from(75));
        assert_eq!(h.total_invested, BigDecimal::from(7500));
    }

    #[test]
    fn test_over_disposal_is_rejected() {
        let mut h = holding(10, 1000);
        assert!(matches!(
            h.dispose_units(&BigDecimal::from(11), now()),
            Err(LedgerError::InsufficientUnits { .. })
        ));
        assert!(matches!(
            h.withdraw_value(&BigDecimal::from_str("1000.01").unwrap(), now()),
            Err(LedgerError::InsufficientUnits { .. })
        ));
        assert_eq!(h.quantity, BigDecimal::from(10));
        assert_eq!(h.total_invested, BigDecimal::from(1000));
    }

    #[test]
    fn test_investment_requires_positive_values() {
        let mut h = AssetHolding::open("m1", "a1", "c1", now());
        assert!(h.add_investment(&BigDecimal::zero(), &BigDecimal::from(10), now()).is_err());
        assert!(h.add_investment(&BigDecimal::from(1), &BigDecimal::from(-10), now()).is_err());
    }
}
