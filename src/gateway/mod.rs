//! Payment-gateway collaborator
//!
//! The engine never talks to the gateway's hosted checkout or webhook
//! transport directly; it consumes the collaborator through the
//! [`PaymentGateway`] trait. The production implementation is the
//! reqwest-backed [`HttpGateway`]; tests substitute a mock server.
//!
//! Amounts on this boundary are always minor currency units (cents).

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod http;

pub use http::HttpGateway;

/// Errors produced by the gateway boundary
///
/// Only timeouts and network failures are retryable; an HTTP-status
/// rejection (auth failure, validation failure) propagates immediately.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum GatewayError {
    /// The request exceeded the configured deadline
    #[error("gateway request timed out: {message}")]
    Timeout {
        /// Description of the timeout
        message: String,
    },

    /// The request never reached the gateway (DNS, connect, TLS)
    #[error("gateway network error: {message}")]
    Network {
        /// Description of the network failure
        message: String,
    },

    /// The gateway answered with a non-success HTTP status
    #[error("gateway returned HTTP {status}: {message}")]
    Http {
        /// HTTP status code
        status: u16,
        /// Response body excerpt
        message: String,
    },

    /// The gateway answered 2xx but the body did not match the contract
    #[error("unexpected gateway response: {message}")]
    InvalidResponse {
        /// Description of the mismatch
        message: String,
    },
}

impl GatewayError {
    /// Whether the Reconciler may retry the call
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            GatewayError::Timeout { .. } | GatewayError::Network { .. }
        )
    }
}

/// Lifecycle status of a gateway transaction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionStatus {
    /// Payment completed
    Success,
    /// Payment failed
    Failed,
    /// Checkout started but never completed
    Abandoned,
    /// Payment still settling
    Pending,
}

impl TransactionStatus {
    /// Query-parameter value understood by the gateway
    pub fn as_query(&self) -> &'static str {
        match self {
            TransactionStatus::Success => "success",
            TransactionStatus::Failed => "failed",
            TransactionStatus::Abandoned => "abandoned",
            TransactionStatus::Pending => "pending",
        }
    }
}

/// One transaction from the gateway's history endpoint
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GatewayTransaction {
    /// Gateway-side numeric or opaque id
    pub id: String,

    /// Amount in minor currency units
    pub amount: i64,

    /// Settlement status
    pub status: TransactionStatus,

    /// Merchant-visible payment reference (unique per payment)
    pub reference: String,

    /// When the payment settled
    pub paid_at: DateTime<Utc>,
}

/// Pagination envelope metadata
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PageMeta {
    /// Total matching transactions
    pub total: u32,
    /// Current page, 1-based
    pub page: u32,
    /// Total number of pages
    pub page_count: u32,
}

/// One page of transaction history
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionPage {
    /// Transactions on this page
    pub data: Vec<GatewayTransaction>,
    /// Pagination metadata
    pub meta: PageMeta,
}

/// Result of initializing a one-shot payment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PaymentInit {
    /// Hosted-checkout URL the payer is redirected to
    pub authorization_url: String,
    /// Gateway reference identifying the pending payment
    pub reference: String,
}

/// Interface to the external payment gateway
///
/// Implementations must not retry internally; retry policy belongs to the
/// Reconciler so it can distinguish retryable from terminal failures.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Fetch one page of a customer's transaction history
    ///
    /// # Arguments
    ///
    /// * `customer` - Customer email or id the gateway keys history by
    /// * `page` - 1-based page number
    /// * `per_page` - Page size
    /// * `status` - Optional server-side status filter
    async fn transactions(
        &self,
        customer: &str,
        page: u32,
        per_page: u32,
        status: Option<TransactionStatus>,
    ) -> Result<TransactionPage, GatewayError>;

    /// Initialize a one-shot payment and return the checkout redirect
    ///
    /// # Arguments
    ///
    /// * `payer` - Payer email or id
    /// * `amount_minor` - Amount in minor currency units
    async fn initialize_payment(
        &self,
        payer: &str,
        amount_minor: i64,
    ) -> Result<PaymentInit, GatewayError>;
}
