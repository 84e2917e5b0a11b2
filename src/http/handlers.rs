//! Request handlers for the HTTP surface
//!
//! Error mapping: business-rule rejections come back as 400 with a reason
//! code the UI can branch on, missing documents as 404, gateway trouble as
//! 502, and store trouble as 500. Reason strings are never collapsed — "not
//! enough credits" and "already acted on this" stay distinguishable.

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::json;
use uuid::Uuid;

use crate::http::AppState;
use crate::types::LedgerError;

/// LedgerError adapter carrying the HTTP mapping
pub struct ApiError(LedgerError);

impl From<LedgerError> for ApiError {
    fn from(error: LedgerError) -> Self {
        ApiError(error)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            LedgerError::NotFound { .. } => StatusCode::NOT_FOUND,
            e if e.is_business_rule() => StatusCode::BAD_REQUEST,
            LedgerError::Gateway(_) => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        let body = json!({
            "error": self.0.reason(),
            "message": self.0.to_string(),
        });
        (status, Json(body)).into_response()
    }
}

/// `GET /health`
pub async fn get_health() -> Json<serde_json::Value> {
    Json(json!({ "status": "ok" }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AcceptBody {
    pub request_id: Uuid,
    pub provider_id: String,
    /// Optional explicit bundle to spend from
    #[serde(default)]
    pub bundle_id: Option<Uuid>,
}

/// `POST /accept` — provider accepts a request, spending keys
pub async fn post_accept(
    State(state): State<AppState>,
    Json(body): Json<AcceptBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state
        .machine
        .accept(body.request_id, &body.provider_id, body.bundle_id)?;
    Ok(Json(json!({ "ok": true })))
}

#[derive(Debug, Deserialize)]
pub struct BalanceQuery {
    pub owner: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BalanceResponse {
    pub keys_remaining: u64,
}

/// `GET /balance?owner=` — total remaining keys for a provider
pub async fn get_balance(
    State(state): State<AppState>,
    Query(query): Query<BalanceQuery>,
) -> Result<Json<BalanceResponse>, ApiError> {
    let keys_remaining = state.ledger.balance(&query.owner)?;
    Ok(Json(BalanceResponse { keys_remaining }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ReconcileBody {
    pub owner_id: String,
    /// Customer identity the gateway keys history by; defaults to the owner
    #[serde(default)]
    pub customer: Option<String>,
}

/// `POST /reconcile` — pull gateway history into grants; safe to repeat
pub async fn post_reconcile(
    State(state): State<AppState>,
    Json(body): Json<ReconcileBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let customer = body.customer.as_deref().unwrap_or(&body.owner_id);
    let grants = state.reconciler.reconcile(&body.owner_id, customer).await?;
    Ok(Json(json!({ "ok": true, "grants": grants })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockInitiateBody {
    pub request_id: Uuid,
    pub payer_id: String,
}

/// `POST /unlock/initiate` — start a one-shot unlock payment
pub async fn post_unlock_initiate(
    State(state): State<AppState>,
    Json(body): Json<UnlockInitiateBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let init = state.unlock.initiate(body.request_id, &body.payer_id).await?;
    Ok(Json(json!({
        "paymentRedirectUrl": init.payment_redirect_url,
        "reference": init.reference,
    })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UnlockConfirmBody {
    pub request_id: Uuid,
    pub reference: String,
}

/// `POST /unlock/confirm` — gateway callback; idempotent
pub async fn post_unlock_confirm(
    State(state): State<AppState>,
    Json(body): Json<UnlockConfirmBody>,
) -> Result<Json<serde_json::Value>, ApiError> {
    state.unlock.confirm(body.request_id, &body.reference)?;
    Ok(Json(json!({ "ok": true })))
}

/// `GET /requests/{id}` — projected request view
///
/// Private payload fields are withheld until the unlock payment is
/// confirmed; the projection happens here at the read boundary.
pub async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> Result<Json<crate::types::RequestView>, ApiError> {
    let request = state.machine.get(id)?;
    Ok(Json(request.projected()))
}

#[derive(Debug, Deserialize)]
pub struct UsageQuery {
    pub owner: String,
}

/// `GET /usage?owner=` — key-usage audit entries for a provider
pub async fn get_usage(
    State(state): State<AppState>,
    Query(query): Query<UsageQuery>,
) -> Result<Json<Vec<crate::types::KeyUsageRecord>>, ApiError> {
    let usage = state.ledger.usage_for_owner(&query.owner)?;
    Ok(Json(usage))
}
