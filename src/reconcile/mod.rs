//! Transaction reconciliation
//!
//! Turns a provider's confirmed payment-gateway transactions into ledger
//! grants: fetch the successful transactions (paginated), match each amount
//! to a plan, and grant the matched keys. The whole pass is idempotent —
//! grants dedupe on the transaction reference — so reconciliation is safe to
//! re-run after any partial failure, or simply on every dashboard load.
//!
//! The gateway fetch happens strictly before any ledger write; retries never
//! interleave with ledger mutations.

use std::sync::Arc;
use std::time::Duration;

use rust_decimal::Decimal;
use serde::Serialize;
use tracing::{debug, info, warn};

use crate::core::ledger::KeyLedger;
use crate::gateway::{GatewayTransaction, PaymentGateway, TransactionStatus};
use crate::types::{BundleId, LedgerError};

pub mod plans;

pub use plans::{Plan, PlanTable};

/// Retry policy for the gateway fetch
///
/// Applies to timeout/network failures only; HTTP-status rejections from the
/// gateway propagate immediately.
#[derive(Debug, Clone, Copy)]
pub struct RetryPolicy {
    /// Extra attempts after the first failure
    pub extra_attempts: u32,
    /// Fixed delay between attempts
    pub delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        RetryPolicy {
            extra_attempts: 2,
            delay: Duration::from_millis(1_500),
        }
    }
}

/// One reconciled transaction, for audit and API responses
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct GrantResult {
    /// Gateway payment reference the grant is keyed on
    pub transaction_id: String,
    /// Plan the amount matched
    pub plan_name: String,
    /// Keys granted by the plan
    pub keys: u32,
    /// Bundle holding the keys
    pub bundle_id: BundleId,
    /// False when the transaction had been reconciled before
    pub created: bool,
    /// Amount in major currency units, display/audit only
    pub amount: Decimal,
}

/// Reconciles gateway transactions into ledger grants
pub struct Reconciler {
    gateway: Arc<dyn PaymentGateway>,
    ledger: KeyLedger,
    plans: PlanTable,
    retry: RetryPolicy,
    page_size: u32,
}

impl Reconciler {
    /// Create a reconciler
    ///
    /// # Arguments
    ///
    /// * `gateway` - Payment-gateway collaborator
    /// * `ledger` - Ledger receiving the grants
    /// * `plans` - Ordered plan table for amount matching
    /// * `retry` - Fetch retry policy
    /// * `page_size` - Gateway page size
    pub fn new(
        gateway: Arc<dyn PaymentGateway>,
        ledger: KeyLedger,
        plans: PlanTable,
        retry: RetryPolicy,
        page_size: u32,
    ) -> Self {
        Reconciler {
            gateway,
            ledger,
            plans,
            retry,
            page_size: page_size.max(1),
        }
    }

    /// Reconcile a provider's gateway history into grants
    ///
    /// # Arguments
    ///
    /// * `owner` - Provider the grants belong to
    /// * `customer` - Customer email/id the gateway keys the history by
    ///
    /// # Errors
    ///
    /// Gateway failures after retry exhaustion, or store failures from the
    /// grant calls. Already-granted transactions are not errors; they come
    /// back with `created = false`.
    pub async fn reconcile(
        &self,
        owner: &str,
        customer: &str,
    ) -> Result<Vec<GrantResult>, LedgerError> {
        let transactions = self.fetch_successful(customer).await?;
        debug!(owner, count = transactions.len(), "reconciling gateway transactions");

        let mut results = Vec::with_capacity(transactions.len());
        for tx in transactions {
            let plan = self
                .plans
                .match_amount(tx.amount)
                .ok_or_else(|| LedgerError::config("plan table is empty"))?;

            let outcome =
                self.ledger
                    .grant(owner, &tx.reference, &plan.name, plan.keys, tx.paid_at)?;

            results.push(GrantResult {
                transaction_id: tx.reference,
                plan_name: plan.name.clone(),
                keys: plan.keys,
                bundle_id: outcome.bundle_id,
                created: outcome.created,
                // Gateway amounts are minor units; scale 2 renders them as
                // major units for the audit trail.
                amount: Decimal::new(tx.amount, 2),
            });
        }

        let fresh = results.iter().filter(|r| r.created).count();
        info!(owner, total = results.len(), fresh, "reconciliation finished");

        Ok(results)
    }

    /// Fetch every successful transaction for the customer, page by page
    async fn fetch_successful(
        &self,
        customer: &str,
    ) -> Result<Vec<GatewayTransaction>, LedgerError> {
        let mut all = Vec::new();
        let mut page = 1;

        loop {
            let fetched = self.fetch_page(customer, page).await?;
            let page_count = fetched.meta.page_count;

            all.extend(
                fetched
                    .data
                    .into_iter()
                    // Only settled transactions may grant, whatever the
                    // server-side filter returned.
                    .filter(|tx| tx.status == TransactionStatus::Success),
            );

            if page >= page_count {
                break;
            }
            page += 1;
        }

        Ok(all)
    }

    /// Fetch one page with the bounded retry policy
    async fn fetch_page(
        &self,
        customer: &str,
        page: u32,
    ) -> Result<crate::gateway::TransactionPage, LedgerError> {
        let mut last_error = None;

        for attempt in 0..=self.retry.extra_attempts {
            if attempt > 0 {
                tokio::time::sleep(self.retry.delay).await;
            }

            match self
                .gateway
                .transactions(
                    customer,
                    page,
                    self.page_size,
                    Some(TransactionStatus::Success),
                )
                .await
            {
                Ok(fetched) => return Ok(fetched),
                Err(e) if e.is_retryable() && attempt < self.retry.extra_attempts => {
                    warn!(customer, page, attempt, error = %e, "gateway fetch failed, will retry");
                    last_error = Some(e);
                }
                Err(e) => return Err(e.into()),
            }
        }

        // Only reachable when the final attempt was retryable
        Err(last_error
            .map(LedgerError::from)
            .unwrap_or_else(|| LedgerError::store("gateway fetch failed without error")))
    }
}
