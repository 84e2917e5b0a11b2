//! Unlock gate
//!
//! A narrower instance of the pay-to-unlock-state pattern: a one-shot
//! gateway payment (not a key spend) flips a booking's `is_paid` flag, which
//! in turn lets read paths include the booking's private payload fields.
//! Confirmation is idempotent — the gateway may deliver its callback more
//! than once.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::core::store::{DocumentStore, Write};
use crate::gateway::PaymentGateway;
use crate::types::{LedgerError, RequestId, RequestKind};

/// How many times a confirmation re-runs after a version conflict
const CONFIRM_RETRIES: u32 = 16;

/// Result of initiating an unlock payment
#[derive(Debug, Clone, PartialEq)]
pub struct UnlockInit {
    /// Hosted-checkout URL the payer is redirected to
    pub payment_redirect_url: String,
    /// Gateway reference for the pending payment
    pub reference: String,
}

/// Pay-to-unlock gate over booking private fields
pub struct UnlockGate {
    store: Arc<dyn DocumentStore>,
    gateway: Arc<dyn PaymentGateway>,
    /// One-shot unlock price in minor currency units
    price_minor: i64,
}

impl UnlockGate {
    /// Create an unlock gate
    ///
    /// # Arguments
    ///
    /// * `store` - Document store holding the bookings
    /// * `gateway` - Payment gateway used for the one-shot payment
    /// * `price_minor` - Configured unlock price in minor units
    pub fn new(
        store: Arc<dyn DocumentStore>,
        gateway: Arc<dyn PaymentGateway>,
        price_minor: i64,
    ) -> Self {
        UnlockGate {
            store,
            gateway,
            price_minor,
        }
    }

    /// Start an unlock payment for a booking
    ///
    /// Calls the gateway's payment-initialization endpoint and returns the
    /// redirect URL; no booking state changes until the confirmation
    /// callback arrives.
    ///
    /// # Errors
    ///
    /// * [`LedgerError::NotFound`] - no such request
    /// * [`LedgerError::InvalidState`] - not a booking, or already unlocked
    /// * [`LedgerError::Gateway`] - gateway initialization failed
    pub async fn initiate(
        &self,
        request_id: RequestId,
        payer: &str,
    ) -> Result<UnlockInit, LedgerError> {
        let (request, _) = self
            .store
            .get_request(request_id)?
            .ok_or_else(|| LedgerError::not_found("request", request_id.to_string()))?;

        if request.kind != RequestKind::Booking {
            return Err(LedgerError::invalid_state(
                request_id.to_string(),
                "not a booking",
            ));
        }
        if request.is_paid {
            return Err(LedgerError::invalid_state(
                request_id.to_string(),
                "already unlocked",
            ));
        }

        let init = self
            .gateway
            .initialize_payment(payer, self.price_minor)
            .await?;

        info!(%request_id, payer, reference = %init.reference, "unlock payment initiated");

        Ok(UnlockInit {
            payment_redirect_url: init.authorization_url,
            reference: init.reference,
        })
    }

    /// Confirm an unlock payment (gateway callback)
    ///
    /// Sets `is_paid = true` and records the gateway reference. Idempotent:
    /// confirming an already-unlocked booking is a no-op success, so a
    /// re-delivered callback cannot fail or double-apply.
    ///
    /// # Errors
    ///
    /// * [`LedgerError::NotFound`] - no such request
    /// * [`LedgerError::InvalidState`] - not a booking
    pub fn confirm(&self, request_id: RequestId, reference: &str) -> Result<(), LedgerError> {
        for attempt in 0..CONFIRM_RETRIES {
            let (request, version) = self
                .store
                .get_request(request_id)?
                .ok_or_else(|| LedgerError::not_found("request", request_id.to_string()))?;

            if request.kind != RequestKind::Booking {
                return Err(LedgerError::invalid_state(
                    request_id.to_string(),
                    "not a booking",
                ));
            }
            if request.is_paid {
                debug!(%request_id, "unlock already confirmed, nothing to do");
                return Ok(());
            }

            let mut updated = request;
            updated.is_paid = true;
            updated.unlock_reference = Some(reference.to_string());
            updated.updated_at = Utc::now();

            match self.store.commit(vec![Write::PutRequest {
                id: request_id,
                expected: version,
                doc: updated,
            }]) {
                Ok(()) => {
                    info!(%request_id, reference, "unlock confirmed");
                    return Ok(());
                }
                Err(LedgerError::StoreConflict { .. }) => {
                    debug!(%request_id, attempt, "unlock confirm conflicted, retrying");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }

        Err(LedgerError::store("unlock confirm retries exhausted"))
    }
}
