//! HTTP service surface
//!
//! Exposes the caller-facing operations over axum: accepting requests,
//! balance queries, reconciliation, the unlock gate, and the projected
//! request read path. The surrounding product's UI consumes these routes;
//! everything here is a thin JSON shim over the core components.

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, post};
use axum::Router;
use tracing::info;

use crate::core::{KeyLedger, RequestMachine, UnlockGate};
use crate::reconcile::Reconciler;
use crate::types::LedgerError;

pub mod handlers;

/// Shared state for the request handlers
#[derive(Clone)]
pub struct AppState {
    /// Request acceptance state machine
    pub machine: RequestMachine,
    /// Key ledger
    pub ledger: KeyLedger,
    /// Transaction reconciler
    pub reconciler: Arc<Reconciler>,
    /// Unlock gate
    pub unlock: Arc<UnlockGate>,
}

/// Build the service router
pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::get_health))
        .route("/accept", post(handlers::post_accept))
        .route("/balance", get(handlers::get_balance))
        .route("/reconcile", post(handlers::post_reconcile))
        .route("/unlock/initiate", post(handlers::post_unlock_initiate))
        .route("/unlock/confirm", post(handlers::post_unlock_confirm))
        .route("/requests/{id}", get(handlers::get_request))
        .route("/usage", get(handlers::get_usage))
        .with_state(state)
}

/// Bind and serve the API
pub async fn serve(addr: SocketAddr, state: AppState) -> Result<(), LedgerError> {
    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| LedgerError::config(format!("failed to bind {addr}: {e}")))?;

    info!("key-ledger service listening on {addr}");

    axum::serve(listener, router(state))
        .await
        .map_err(|e| LedgerError::store(format!("server error: {e}")))
}
