use actix_request_identifier::RequestId;
use actix_web::{get, post, web, HttpResponse};
use serde::Deserialize;
use tracing::{error, instrument};

use crate::currency::Currency;
use crate::error::LedgerError;
use crate::ledger::initiation::{AssetPurchaseRequest, ContributionRequest};
use crate::ledger::model::Decision;
use crate::ledger::redemption::RedemptionRequest;
use crate::ledger::withdrawal::WithdrawalRequest;
use crate::ledger::Ledger;
use crate::payment::PaymentEvent;
use crate::responses::{created_json, ok_json};

type HandlerResult = Result<HttpResponse, LedgerError>;

// ledger units block on the connection pool
async fn blocking<T, F>(f: F) -> Result<T, LedgerError>
where
    F: FnOnce() -> Result<T, LedgerError> + Send + 'static,
    T: Send + 'static,
{
    web::block(f).await.unwrap_or_else(|e| {
        error!("{e}");
        Err(e.into())
    })
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResolveWalletInput {
    pub member_id: String,
    pub cooperative_id: String,
    #[serde(default)]
    pub currency: Currency,
    pub asset_id: Option<String>,
}

#[post("/webhooks/payment")]
#[instrument(skip(ledger, event), fields(request_id = request_id.as_str(), reference = %event.reference))]
pub async fn payment_webhook_handler(
    ledger: web::Data<Ledger>,
    request_id: RequestId,
    event: web::Json<PaymentEvent>,
) -> HandlerResult {
    let event = event.into_inner();
    blocking(move || ledger.settle(&event.reference, event.status))
        .await
        .map(|settlement| ok_json(&settlement))
}

#[post("/contributions")]
#[instrument(skip(ledger, input), fields(request_id = request_id.as_str()))]
pub async fn contribution_handler(
    ledger: web::Data<Ledger>,
    request_id: RequestId,
    input: web::Json<ContributionRequest>,
) -> HandlerResult {
    blocking(move || ledger.initiate_contribution(&input))
        .await
        .map(|initiated| created_json(&initiated))
}

#[post("/asset-purchases")]
#[instrument(skip(ledger, input), fields(request_id = request_id.as_str()))]
pub async fn asset_purchase_handler(
    ledger: web::Data<Ledger>,
    request_id: RequestId,
    input: web::Json<AssetPurchaseRequest>,
) -> HandlerResult {
    blocking(move || ledger.initiate_asset_purchase(&input))
        .await
        .map(|initiated| created_json(&initiated))
}

#[post("/wallets/resolve")]
#[instrument(skip(ledger, input), fields(request_id = request_id.as_str()))]
pub async fn resolve_wallet_handler(
    ledger: web::Data<Ledger>,
    request_id: RequestId,
    input: web::Json<ResolveWalletInput>,
) -> HandlerResult {
    blocking(move || {
        ledger.resolve_wallet(
            &input.member_id,
            &input.cooperative_id,
            input.currency,
            input.asset_id.as_deref(),
        )
    })
    .await
    .map(|wallet| ok_json(&wallet))
}

#[post("/withdrawals")]
#[instrument(skip(ledger, input), fields(request_id = request_id.as_str()))]
pub async fn withdrawal_handler(
    ledger: web::Data<Ledger>,
    request_id: RequestId,
    input: web::Json<WithdrawalRequest>,
) -> HandlerResult {
    blocking(move || ledger.request_withdrawal(&input))
        .await
        .map(|withdrawal| created_json(&withdrawal))
}

#[post("/withdrawals/{id}/approve")]
#[instrument(skip(ledger, decision), fields(request_id = request_id.as_str()))]
pub async fn approve_withdrawal_handler(
    ledger: web::Data<Ledger>,
    request_id: RequestId,
    id: web::Path<i64>,
    decision: web::Json<Decision>,
) -> HandlerResult {
    let id = id.into_inner();
    blocking(move || ledger.approve_withdrawal(id, &decision))
        .await
        .map(|outcome| ok_json(&outcome))
}

#[post("/withdrawals/{id}/reject")]
#[instrument(skip(ledger, decision), fields(request_id = request_id.as_str()))]
pub async fn reject_withdrawal_handler(
    ledger: web::Data<Ledger>,
    request_id: RequestId,
    id: web::Path<i64>,
    decision: web::Json<Decision>,
) -> HandlerResult {
    let id = id.into_inner();
    blocking(move || ledger.reject_withdrawal(id, &decision))
        .await
        .map(|withdrawal| ok_json(&withdrawal))
}

#[post("/redemptions")]
#[instrument(skip(ledger, input), fields(request_id = request_id.as_str()))]
pub async fn redemption_handler(
    ledger: web::Data<Ledger>,
    request_id: RequestId,
    input: web::Json<RedemptionRequest>,
) -> HandlerResult {
    blocking(move || ledger.request_redemption(&input))
        .await
        .map(|redemption| created_json(&redemption))
}

#[post("/redemptions/{id}/approve")]
#[instrument(skip(ledger, decision), fields(request_id = request_id.as_str()))]
pub async fn approve_redemption_handler(
    ledger: web::Data<Ledger>,
    request_id: RequestId,
    id: web::Path<i64>,
    decision: web::Json<Decision>,
) -> HandlerResult {
    let id = id.into_inner();
    blocking(move || ledger.approve_redemption(id, &decision))
        .await
        .map(|outcome| ok_json(&outcome))
}

#[post("/redemptions/{id}/reject")]
#[instrument(skip(ledger, decision), fields(request_id = request_id.as_str()))]
pub async fn reject_redemption_handler(
    ledger: web::Data<Ledger>,
    request_id: RequestId,
    id: web::Path<i64>,
    decision: web::Json<Decision>,
) -> HandlerResult {
    let id = id.into_inner();
    blocking(move || ledger.reject_redemption(id, &decision))
        .await
        .map(|redemption| ok_json(&redemption))
}

#[get("/transactions/{reference}")]
#[instrument(skip(ledger), fields(request_id = request_id.as_str()))]
pub async fn transaction_handler(
    ledger: web::Data<Ledger>,
    request_id: RequestId,
    reference: web::Path<String>,
) -> HandlerResult {
    let reference = reference.into_inner();
    blocking(move || ledger.transaction(&reference))
        .await
        .map(|record| ok_json(&record))
}

#[get("/wallets/{id}")]
#[instrument(skip(ledger), fields(request_id = request_id.as_str()))]
pub async fn wallet_handler(ledger: web::Data<Ledger>, request_id: RequestId, id: web::Path<i64>) -> HandlerResult {
    let id = id.into_inner();
    blocking(move || ledger.wallet(id)).await.map(|wallet| ok_json(&wallet))
}

pub fn configure(cfg: &mut web::ServiceConfig) {
    cfg.service(payment_webhook_handler)
        .service(contribution_handler)
        .service(asset_purchase_handler)
        .service(resolve_wallet_handler)
        .service(withdrawal_handler)
        .service(approve_withdrawal_handler)
        .service(reject_withdrawal_handler)
        .service(redemption_handler)
        .service(approve_redemption_handler)
        .service(reject_redemption_handler)
        .service(transaction_handler)
        .service(wallet_handler);
}
