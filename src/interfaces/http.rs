//! HTTP surface of the ledger.
//!
//! Authentication is done upstream; the caller's identity arrives in the
//! `x-user-id` header. The webhook route is authenticated by its signature only.

use crate::application::engine::PaymentEngine;
use crate::application::webhooks::WebhookOutcome;
use crate::domain::ids::{PaymentId, PayoutId};
use crate::domain::payment::Payment;
use crate::domain::ports::Page;
use crate::error::LedgerError;
use crate::infrastructure::gateway::SIGNATURE_HEADER;
use axum::body::Bytes;
use axum::extract::{FromRequestParts, Path, Query, State};
use axum::http::request::Parts;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;

pub const USER_HEADER: &str = "x-user-id";

#[derive(Debug)]
pub enum ApiError {
    Unauthenticated,
    Ledger(LedgerError),
}

impl From<LedgerError> for ApiError {
    fn from(err: LedgerError) -> Self {
        Self::Ledger(err)
    }
}

impl ApiError {
    fn status(&self) -> StatusCode {
        let Self::Ledger(err) = self else {
            return StatusCode::UNAUTHORIZED;
        };
        match err {
            LedgerError::InvalidWebhookSignature => StatusCode::UNAUTHORIZED,
            LedgerError::InvalidWebhookPayload(_)
            | LedgerError::InvalidPayoutAmount(_)
            | LedgerError::ValidationError(_) => StatusCode::BAD_REQUEST,
            LedgerError::PaymentNotFound(_)
            | LedgerError::PayoutNotFound(_)
            | LedgerError::PackNotFound(_)
            | LedgerError::CreatorNotFound(_) => StatusCode::NOT_FOUND,
            LedgerError::InsufficientBalance { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            LedgerError::InsufficientFundsForRefund { .. }
            | LedgerError::InvalidTransition { .. }
            | LedgerError::DuplicatePosting(_) => StatusCode::CONFLICT,
            LedgerError::GatewayUnavailable(_) => StatusCode::SERVICE_UNAVAILABLE,
            LedgerError::GatewayRejected(_) => StatusCode::BAD_GATEWAY,
            LedgerError::InvariantViolation(_)
            | LedgerError::Config(_)
            | LedgerError::InternalError(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            Self::Unauthenticated => format!("missing {USER_HEADER} header"),
            Self::Ledger(err) if status == StatusCode::INTERNAL_SERVER_ERROR => {
                tracing::error!(error = %err, "Request failed");
                "internal error".to_string()
            }
            Self::Ledger(err) => err.to_string(),
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// The signed-in user, taken from the `x-user-id` header.
pub struct UserId(pub String);

impl<S: Send + Sync> FromRequestParts<S> for UserId {
    type Rejection = ApiError;

    async fn from_request_parts(parts: &mut Parts, _state: &S) -> Result<Self, Self::Rejection> {
        parts
            .headers
            .get(USER_HEADER)
            .and_then(|v| v.to_str().ok())
            .map(str::trim)
            .filter(|v| !v.is_empty())
            .map(|v| UserId(v.to_string()))
            .ok_or(ApiError::Unauthenticated)
    }
}

type ApiResult<T> = Result<T, ApiError>;

#[derive(Deserialize)]
pub struct CheckoutRequest {
    pub pack_id: String,
}

#[derive(Deserialize)]
pub struct PayoutRequestBody {
    pub amount: i64,
}

#[derive(Deserialize)]
pub struct HistoryQuery {
    #[serde(default)]
    pub offset: usize,
    pub limit: Option<usize>,
}

pub fn router(engine: PaymentEngine) -> Router {
    Router::new()
        .route("/health", get(health))
        .route("/webhooks/gateway", post(gateway_webhook))
        .route("/checkout", post(checkout))
        .route("/payments/{id}", get(payment_status))
        .route("/payments/{id}/cancel", post(cancel_payment))
        .route("/payments/{id}/refund", post(refund_payment))
        .route("/payouts", post(request_payout))
        .route("/payouts/{id}", get(payout))
        .route("/wallet", get(wallet_summary))
        .route("/wallet/transactions", get(wallet_transactions))
        .with_state(engine)
}

pub async fn serve(engine: PaymentEngine, addr: SocketAddr) -> crate::error::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "Ledger API listening");
    axum::serve(listener, router(engine)).await?;
    Ok(())
}

async fn health() -> &'static str {
    "ok"
}

/// 200 for applied or already applied events, 401 for a bad signature, 400 for
/// a malformed body.
async fn gateway_webhook(
    State(engine): State<PaymentEngine>,
    headers: HeaderMap,
    body: Bytes,
) -> ApiResult<Json<serde_json::Value>> {
    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default();
    let outcome = engine.webhooks().handle(&body, signature).await?;
    let status = match outcome {
        WebhookOutcome::Applied => "applied",
        WebhookOutcome::AlreadyProcessed => "already_processed",
        WebhookOutcome::Ignored => "ignored",
    };
    Ok(Json(json!({ "status": status })))
}

async fn checkout(
    State(engine): State<PaymentEngine>,
    UserId(user): UserId,
    Json(body): Json<CheckoutRequest>,
) -> ApiResult<impl IntoResponse> {
    let checkout = engine
        .payments()
        .create_checkout(&user, &body.pack_id)
        .await?;
    Ok((StatusCode::CREATED, Json(checkout)))
}

/// The payment, if `user` is its buyer or its creator.
async fn visible_payment(engine: &PaymentEngine, user: &str, id: PaymentId) -> ApiResult<Payment> {
    let payment = engine.payments().payment(id).await?;
    if payment.buyer_id == user || payment.creator_id.as_str() == user {
        return Ok(payment);
    }
    if let Ok(wallet) = engine.wallets().wallet_for_user(user).await
        && wallet == payment.creator_id
    {
        return Ok(payment);
    }
    Err(LedgerError::PaymentNotFound(id.to_string()).into())
}

async fn payment_status(
    State(engine): State<PaymentEngine>,
    UserId(user): UserId,
    Path(id): Path<PaymentId>,
) -> ApiResult<impl IntoResponse> {
    visible_payment(&engine, &user, id).await?;
    Ok(Json(engine.payments().payment_status(id).await?))
}

async fn cancel_payment(
    State(engine): State<PaymentEngine>,
    UserId(user): UserId,
    Path(id): Path<PaymentId>,
) -> ApiResult<impl IntoResponse> {
    let payment = visible_payment(&engine, &user, id).await?;
    let requester = if payment.buyer_id == user {
        user
    } else {
        payment.creator_id.to_string()
    };
    Ok(Json(engine.payments().cancel(id, &requester).await?))
}

async fn refund_payment(
    State(engine): State<PaymentEngine>,
    UserId(user): UserId,
    Path(id): Path<PaymentId>,
) -> ApiResult<impl IntoResponse> {
    let payment = engine.payments().payment(id).await?;
    let wallet = engine.wallets().wallet_for_user(&user).await?;
    if wallet != payment.creator_id {
        return Err(LedgerError::PaymentNotFound(id.to_string()).into());
    }
    Ok(Json(engine.payments().refund(id).await?))
}

async fn request_payout(
    State(engine): State<PaymentEngine>,
    UserId(user): UserId,
    Json(body): Json<PayoutRequestBody>,
) -> ApiResult<impl IntoResponse> {
    let receipt = engine.payouts().request_payout(&user, body.amount).await?;
    Ok((StatusCode::CREATED, Json(receipt)))
}

async fn payout(
    State(engine): State<PaymentEngine>,
    UserId(user): UserId,
    Path(id): Path<PayoutId>,
) -> ApiResult<impl IntoResponse> {
    Ok(Json(engine.payouts().payout_for_user(&user, id).await?))
}

async fn wallet_summary(
    State(engine): State<PaymentEngine>,
    UserId(user): UserId,
) -> ApiResult<impl IntoResponse> {
    let wallet = engine.wallets().wallet_for_user(&user).await?;
    Ok(Json(engine.wallets().summary(&wallet).await?))
}

async fn wallet_transactions(
    State(engine): State<PaymentEngine>,
    UserId(user): UserId,
    Query(query): Query<HistoryQuery>,
) -> ApiResult<impl IntoResponse> {
    let wallet = engine.wallets().wallet_for_user(&user).await?;
    let page = Page::new(query.offset, query.limit.unwrap_or(Page::default().limit));
    Ok(Json(engine.wallets().history(&wallet, page).await?))
}
