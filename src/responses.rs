use actix_web::error::BlockingError;
use actix_web::http::StatusCode;
use actix_web::{HttpResponse, ResponseError};
use serde::Serialize;
use serde_json::json;
use tracing::{error, warn};

use crate::error::LedgerError;

impl ResponseError for LedgerError {
    fn status_code(&self) -> StatusCode {
        match self {
            LedgerError::TransactionNotFound(_) | LedgerError::RecordNotFound { .. } | LedgerError::WalletNotFound(_) => {
                StatusCode::NOT_FOUND
            }
            LedgerError::InvalidAmount(_)
            | LedgerError::InvalidType(_)
            | LedgerError::InvalidStatus(_)
            | LedgerError::InvalidMetadata(_)
            | LedgerError::UnknownValue(_)
            | LedgerError::AmountMismatch { .. } => StatusCode::BAD_REQUEST,
            LedgerError::NotPending { .. }
            | LedgerError::CooperativeMismatch { .. }
            | LedgerError::DuplicateReference(_) => StatusCode::CONFLICT,
            LedgerError::InsufficientBalance { .. } | LedgerError::InsufficientUnits { .. } => {
                StatusCode::UNPROCESSABLE_ENTITY
            }
            LedgerError::Verification(_) => StatusCode::BAD_GATEWAY,
            LedgerError::Database(_)
            | LedgerError::Pool(_)
            | LedgerError::Serialization(_)
            | LedgerError::StoreUnavailable(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn error_response(&self) -> HttpResponse {
        let status = self.status_code();
        let message = match self {
            LedgerError::Database(_) | LedgerError::Pool(_) | LedgerError::Serialization(_) => {
                error!(code = self.code(), "{self}");
                "internal error".to_string()
            }
            _ if status.is_server_error() => {
                error!(code = self.code(), "{self}");
                self.to_string()
            }
            _ => {
                warn!(code = self.code(), "{self}");
                self.to_string()
            }
        };
        HttpResponse::build(status).json(json!({
            "error": {
                "code": self.code(),
                "message": message,
            }
        }))
    }
}

impl From<BlockingError> for LedgerError {
    fn from(e: BlockingError) -> Self {
        LedgerError::StoreUnavailable(e.to_string())
    }
}

pub fn ok_json<T: Serialize>(body: &T) -> HttpResponse {
    HttpResponse::Ok().json(body)
}

pub fn created_json<T: Serialize>(body: &T) -> HttpResponse {
    HttpResponse::Created().json(body)
}

#[cfg(test)]
mod tests {
    use super::*;
    use actix_web::body::to_bytes;
    use bigdecimal::BigDecimal;

    async fn body(e: LedgerError) -> (StatusCode, serde_json::Value) {
        let response = e.error_response();
        let status = response.status();
        let bytes = to_bytes(response.into_body()).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[actix_web::test]
    async fn test_error_body() {
        let (status, json) = body(LedgerError::TransactionNotFound("CNT-9".into())).await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(json["error"]["code"], "transaction_not_found");
        assert_eq!(json["error"]["message"], "transaction with reference CNT-9 not found");
    }

    #[actix_web::test]
    async fn test_status_families() {
        let insufficient = LedgerError::InsufficientBalance {
            wallet_id: 1,
            available: BigDecimal::from(1),
            required: BigDecimal::from(2),
        };
        assert_eq!(insufficient.status_code(), StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(
            LedgerError::NotPending { entity: "withdrawal", id: 1 }.status_code(),
            StatusCode::CONFLICT
        );
        assert_eq!(LedgerError::InvalidAmount("0".into()).status_code(), StatusCode::BAD_REQUEST);

        let (status, json) = body(LedgerError::StoreUnavailable("pool closed".into())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(json["error"]["code"], "store_unavailable");
    }
}
