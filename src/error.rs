use bigdecimal::BigDecimal;
use thiserror::Error;

use crate::text_enum::UnknownVariant;

pub type Result<T> = std::result::Result<T, LedgerError>;

/// Everything that can stop a ledger operation.
///
/// An event that was already settled is not an error; it is reported through
/// the `already_processed` flag of the settlement result.
#[derive(Debug, Error)]
pub enum LedgerError {
    #[error("transaction with reference {0} not found")]
    TransactionNotFound(String),

    #[error("{entity} {id} not found")]
    RecordNotFound { entity: &'static str, id: i64 },

    #[error("wallet not found: {0}")]
    WalletNotFound(String),

    #[error("insufficient balance in wallet {wallet_id}: available {available}, required {required}")]
    InsufficientBalance {
        wallet_id: i64,
        available: BigDecimal,
        required: BigDecimal,
    },

    #[error("insufficient units of asset {asset_id}: held {held}, requested {requested}")]
    InsufficientUnits {
        asset_id: String,
        held: BigDecimal,
        requested: BigDecimal,
    },

    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    #[error("invalid transaction type: {0}")]
    InvalidType(String),

    #[error("invalid status: {0}")]
    InvalidStatus(String),

    #[error("invalid transaction metadata: {0}")]
    InvalidMetadata(String),

    #[error("{entity} {id} is not pending")]
    NotPending { entity: &'static str, id: i64 },

    #[error("{entity} {id} does not belong to cooperative {cooperative_id}")]
    CooperativeMismatch {
        entity: &'static str,
        id: i64,
        cooperative_id: String,
    },

    #[error("a transaction with reference {0} already exists")]
    DuplicateReference(String),

    #[error("verified amount {verified} for {reference} does not match recorded amount {recorded}")]
    AmountMismatch {
        reference: String,
        recorded: BigDecimal,
        verified: BigDecimal,
    },

    #[error("payment verification failed: {0}")]
    Verification(String),

    #[error(transparent)]
    UnknownValue(#[from] UnknownVariant),

    #[error(transparent)]
    Database(#[from] diesel::result::Error),

    #[error(transparent)]
    Pool(#[from] diesel::r2d2::PoolError),

    #[error(transparent)]
    Serialization(#[from] serde_json::Error),

    #[error("ledger store unavailable: {0}")]
    StoreUnavailable(String),
}

impl LedgerError {
    pub fn code(&self) -> &'static str {
        match self {
            LedgerError::TransactionNotFound(_) => "transaction_not_found",
            LedgerError::RecordNotFound { .. } => "record_not_found",
            LedgerError::WalletNotFound(_) => "wallet_not_found",
            LedgerError::InsufficientBalance { .. } => "insufficient_balance",
            LedgerError::InsufficientUnits { .. } => "insufficient_units",
            LedgerError::InvalidAmount(_) => "invalid_amount",
            LedgerError::InvalidType(_) => "invalid_type",
            LedgerError::InvalidStatus(_) => "invalid_status",
            LedgerError::InvalidMetadata(_) => "invalid_metadata",
            LedgerError::NotPending { .. } => "not_pending",
            LedgerError::CooperativeMismatch { .. } => "cooperative_mismatch",
            LedgerError::DuplicateReference(_) => "duplicate_reference",
            LedgerError::AmountMismatch { .. } => "amount_mismatch",
            LedgerError::Verification(_) => "verification_failed",
            LedgerError::UnknownValue(_) => "unknown_value",
            LedgerError::Database(_) => "database_error",
            LedgerError::Pool(_) => "database_unavailable",
            LedgerError::Serialization(_) => "serialization_error",
            LedgerError::StoreUnavailable(_) => "store_unavailable",
        }
    }
}
