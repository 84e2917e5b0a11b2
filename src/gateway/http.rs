//! HTTP implementation of the payment-gateway collaborator
//!
//! Wraps reqwest with the gateway's authentication and timeout contract:
//! every call carries a bearer credential and is bounded by a fixed deadline
//! (15 seconds unless configured otherwise). No retries happen here — the
//! Reconciler owns retry policy.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION};
use serde::Deserialize;
use tracing::debug;

use crate::gateway::{
    GatewayError, PaymentGateway, PaymentInit, TransactionPage, TransactionStatus,
};

/// Default per-call deadline
const DEFAULT_TIMEOUT: Duration = Duration::from_secs(15);

/// Reqwest-backed gateway client
#[derive(Debug, Clone)]
pub struct HttpGateway {
    client: reqwest::Client,
    base_url: String,
}

/// Envelope around the payment-initialization response
#[derive(Debug, Deserialize)]
struct InitEnvelope {
    data: PaymentInit,
}

impl HttpGateway {
    /// Create a gateway client
    ///
    /// # Arguments
    ///
    /// * `base_url` - Gateway API root, without trailing slash
    /// * `secret_key` - Bearer credential
    /// * `timeout` - Per-call deadline (defaults to 15s when `None`)
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::InvalidResponse`] if the credential cannot be
    /// encoded as a header value or the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        secret_key: &str,
        timeout: Option<Duration>,
    ) -> Result<Self, GatewayError> {
        let mut headers = HeaderMap::new();
        let bearer = HeaderValue::from_str(&format!("Bearer {secret_key}")).map_err(|e| {
            GatewayError::InvalidResponse {
                message: format!("invalid secret key header value: {e}"),
            }
        })?;
        headers.insert(AUTHORIZATION, bearer);

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout.unwrap_or(DEFAULT_TIMEOUT))
            .build()
            .map_err(|e| GatewayError::InvalidResponse {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        let mut base_url = base_url.into();
        while base_url.ends_with('/') {
            base_url.pop();
        }

        Ok(Self { client, base_url })
    }

    async fn read_success_body<T: serde::de::DeserializeOwned>(
        response: reqwest::Response,
    ) -> Result<T, GatewayError> {
        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(GatewayError::Http {
                status: status.as_u16(),
                message,
            });
        }

        let body = response
            .text()
            .await
            .map_err(|e| GatewayError::InvalidResponse {
                message: format!("failed to read response body: {e}"),
            })?;
        serde_json::from_str(&body).map_err(|e| GatewayError::InvalidResponse {
            message: format!("failed to parse gateway response: {e}"),
        })
    }
}

/// Classify a reqwest transport failure into the gateway taxonomy
fn classify_transport_error(error: reqwest::Error) -> GatewayError {
    if error.is_timeout() {
        GatewayError::Timeout {
            message: error.to_string(),
        }
    } else {
        GatewayError::Network {
            message: error.to_string(),
        }
    }
}

#[async_trait]
impl PaymentGateway for HttpGateway {
    async fn transactions(
        &self,
        customer: &str,
        page: u32,
        per_page: u32,
        status: Option<TransactionStatus>,
    ) -> Result<TransactionPage, GatewayError> {
        let url = format!("{}/transaction", self.base_url);
        let mut query: Vec<(&str, String)> = vec![
            ("customer", customer.to_string()),
            ("page", page.to_string()),
            ("perPage", per_page.to_string()),
        ];
        if let Some(status) = status {
            query.push(("status", status.as_query().to_string()));
        }

        debug!(customer, page, per_page, "fetching gateway transactions");

        let response = self
            .client
            .get(&url)
            .query(&query)
            .send()
            .await
            .map_err(classify_transport_error)?;

        Self::read_success_body(response).await
    }

    async fn initialize_payment(
        &self,
        payer: &str,
        amount_minor: i64,
    ) -> Result<PaymentInit, GatewayError> {
        let url = format!("{}/transaction/initialize", self.base_url);

        debug!(payer, amount_minor, "initializing gateway payment");

        let response = self
            .client
            .post(&url)
            .json(&serde_json::json!({
                "email": payer,
                "amount": amount_minor,
            }))
            .send()
            .await
            .map_err(classify_transport_error)?;

        let envelope: InitEnvelope = Self::read_success_body(response).await?;
        Ok(envelope.data)
    }
}
