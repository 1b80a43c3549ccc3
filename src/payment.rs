//! The payment provider as seen by the ledger: status events pushed to the
//! webhook, and verify-by-reference for confirming a payment from a trusted
//! origin.

use bigdecimal::BigDecimal;
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::ledger::model::SettlementStatus;
use crate::ledger::settlement::Settlement;

/// Body of a payment-status webhook. Providers redeliver these freely.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct PaymentEvent {
    pub reference: String,
    pub status: SettlementStatus,
}

/// Payment details as reported by the provider.
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct VerifiedPayment {
    pub reference: String,
    /// Provider status, e.g. `success`, `failed`, `abandoned`.
    pub status: String,
    pub amount: BigDecimal,
    #[serde(default)]
    pub metadata: serde_json::Value,
}

pub trait PaymentProvider: Send + Sync {
    fn verify(&self, reference: &str) -> Result<VerifiedPayment>;
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum VerifiedSettlement {
    Settled(Settlement),
    /// The provider has not reached a terminal status; the ledger is untouched.
    #[serde(rename_all = "camelCase")]
    Unsettled { reference: String, provider_status: String },
}

#[cfg(test)]
pub(crate) mod tests {
    use std::collections::HashMap;
    use std::str::FromStr;

    use super::*;
    use crate::error::LedgerError;

    /// Provider answering from a fixed table.
    #[derive(Default)]
    pub struct StubProvider {
        payments: HashMap<String, VerifiedPayment>,
    }

    impl StubProvider {
        pub fn new() -> Self {
            Self::default()
        }

        pub fn with(mut self, reference: &str, status: &str, amount: &str) -> Self {
            self.payments.insert(
                reference.to_string(),
                VerifiedPayment {
                    reference: reference.to_string(),
                    status: status.to_string(),
                    amount: BigDecimal::from_str(amount).unwrap(),
                    metadata: serde_json::Value::Null,
                },
            );
            self
        }
    }

    impl PaymentProvider for StubProvider {
        fn verify(&self, reference: &str) -> Result<VerifiedPayment> {
            self.payments
                .get(reference)
                .cloned()
                .ok_or_else(|| LedgerError::Verification(format!("provider does not know {reference}")))
        }
    }

    #[test]
    fn test_event_body() {
        let event: PaymentEvent =
            serde_json::from_str(r#"{"reference":"CNT-1","status":"success"}"#).unwrap();
        assert_eq!(event.status, SettlementStatus::Success);
        assert!(serde_json::from_str::<PaymentEvent>(r#"{"reference":"CNT-1","status":"pending"}"#).is_err());
    }

    #[test]
    fn test_unsettled_body() {
        let body = serde_json::to_value(VerifiedSettlement::Unsettled {
            reference: "R".into(),
            provider_status: "abandoned".into(),
        })
        .unwrap();
        assert_eq!(
            body,
            serde_json::json!({ "outcome": "unsettled", "reference": "R", "providerStatus": "abandoned" })
        );
    }

    #[test]
    fn test_stub_unknown_reference() {
        assert!(matches!(
            StubProvider::new().verify("nope"),
            Err(LedgerError::Verification(_))
        ));
    }
}
