//! Request acceptance state machine
//!
//! Orchestrates the lifecycle of customer requests and the provider
//! acceptance relation, delegating balance work to the [`KeyLedger`].
//!
//! Accepting a request is one all-or-nothing transaction over exactly two
//! documents: the request gains the provider in its acceptor set (and flips
//! status), the chosen bundle loses the keys, and a usage record is
//! appended — in a single store commit. On a version conflict the whole
//! acceptance re-runs against fresh reads, so a later acceptor always sees
//! the state an earlier commit produced.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::core::ledger::KeyLedger;
use crate::core::store::{DocumentStore, Version, Write};
use crate::types::{
    BundleId, KeyUsageRecord, LedgerError, Request, RequestId, RequestKind, RequestStatus,
};

/// How many times a transition re-runs after a version conflict
const TRANSITION_RETRIES: u32 = 16;

/// State machine over requests and their acceptors
#[derive(Clone)]
pub struct RequestMachine {
    store: Arc<dyn DocumentStore>,
    ledger: KeyLedger,
}

impl RequestMachine {
    /// Create a state machine over the given store and ledger
    pub fn new(store: Arc<dyn DocumentStore>, ledger: KeyLedger) -> Self {
        RequestMachine { store, ledger }
    }

    /// Submit a new request into the store
    ///
    /// Request creation itself is owned by the surrounding product; this
    /// entry point exists for the service wiring and for tests.
    pub fn submit(&self, request: Request) -> Result<RequestId, LedgerError> {
        let id = request.id;
        self.store.insert_request(request)?;
        Ok(id)
    }

    /// Accept a request on behalf of a provider
    ///
    /// Validates the request, spends `price_in_keys` from the provider's
    /// bundles, and commits the acceptance atomically. Ledger failures
    /// propagate verbatim with no other write.
    ///
    /// # Arguments
    ///
    /// * `request_id` - Request being accepted
    /// * `provider` - Accepting provider
    /// * `preferred_bundle` - Optional explicit bundle to spend from
    ///
    /// # Errors
    ///
    /// * [`LedgerError::NotFound`] - no such request
    /// * [`LedgerError::AlreadyAccepted`] - provider already in the acceptor set
    /// * [`LedgerError::InvalidState`] - terminal request, or booking already
    ///   confirmed by another provider
    /// * [`LedgerError::InsufficientCredit`] / [`LedgerError::NoSuchOwner`] -
    ///   propagated from the ledger spend
    pub fn accept(
        &self,
        request_id: RequestId,
        provider: &str,
        preferred_bundle: Option<BundleId>,
    ) -> Result<(), LedgerError> {
        for attempt in 0..TRANSITION_RETRIES {
            let (request, version) = self.load(request_id)?;

            if request.has_acceptor(provider) {
                return Err(LedgerError::already_accepted(
                    request_id.to_string(),
                    provider,
                ));
            }
            if request.status.is_terminal() {
                return Err(LedgerError::invalid_state(
                    request_id.to_string(),
                    request.status.label(),
                ));
            }
            // A booking admits exactly one acceptor; once confirmed it is no
            // longer in an acceptable state for anyone else.
            if request.kind == RequestKind::Booking && request.status == RequestStatus::Confirmed {
                return Err(LedgerError::invalid_state(
                    request_id.to_string(),
                    request.status.label(),
                ));
            }

            let cost = request.price();
            let plan = self.ledger.prepare_spend(provider, cost, preferred_bundle)?;
            let bundle_id = plan.bundle_id;

            let now = Utc::now();
            let mut updated = request;
            updated.accepted_by.push(provider.to_string());
            updated.status = match updated.kind {
                RequestKind::Booking => RequestStatus::Confirmed,
                RequestKind::Service => RequestStatus::InProgress,
            };
            updated.updated_at = now;

            let usage = KeyUsageRecord {
                owner_id: provider.to_string(),
                bundle_id,
                request_id,
                keys_spent: cost,
                spent_at: now,
            };

            let writes = vec![
                Write::PutRequest {
                    id: request_id,
                    expected: version,
                    doc: updated,
                },
                plan.into_write(),
                Write::AppendUsage(usage),
            ];

            match self.store.commit(writes) {
                Ok(()) => {
                    info!(%request_id, provider, cost, %bundle_id, "request accepted");
                    return Ok(());
                }
                Err(LedgerError::StoreConflict { .. }) => {
                    debug!(%request_id, provider, attempt, "accept conflicted, retrying");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }

        Err(LedgerError::store("accept retries exhausted"))
    }

    /// Reject a request
    ///
    /// Business-level rejection; terminal. Never touches the ledger: keys
    /// spent on an earlier acceptance are not returned.
    ///
    /// # Errors
    ///
    /// * [`LedgerError::NotFound`] - no such request
    /// * [`LedgerError::InvalidState`] - the request is already terminal
    pub fn reject(&self, request_id: RequestId, provider: &str) -> Result<(), LedgerError> {
        self.transition(request_id, |request| {
            if request.status.is_terminal() {
                return Err(LedgerError::invalid_state(
                    request_id.to_string(),
                    request.status.label(),
                ));
            }
            request.status = RequestStatus::Rejected;
            Ok(())
        })?;
        info!(%request_id, provider, "request rejected");
        Ok(())
    }

    /// Complete a request
    ///
    /// Only legal from `InProgress` or `Confirmed`; terminal afterwards.
    ///
    /// # Errors
    ///
    /// * [`LedgerError::NotFound`] - no such request
    /// * [`LedgerError::InvalidState`] - not in a completable state
    pub fn complete(&self, request_id: RequestId) -> Result<(), LedgerError> {
        self.transition(request_id, |request| {
            if !matches!(
                request.status,
                RequestStatus::InProgress | RequestStatus::Confirmed
            ) {
                return Err(LedgerError::invalid_state(
                    request_id.to_string(),
                    request.status.label(),
                ));
            }
            request.status = RequestStatus::Completed;
            Ok(())
        })?;
        info!(%request_id, "request completed");
        Ok(())
    }

    /// Load a request for a read path
    pub fn get(&self, request_id: RequestId) -> Result<Request, LedgerError> {
        Ok(self.load(request_id)?.0)
    }

    fn load(&self, request_id: RequestId) -> Result<(Request, Version), LedgerError> {
        self.store
            .get_request(request_id)?
            .ok_or_else(|| LedgerError::not_found("request", request_id.to_string()))
    }

    /// Apply a validated single-document transition with conflict retry
    fn transition<F>(&self, request_id: RequestId, mutate: F) -> Result<(), LedgerError>
    where
        F: Fn(&mut Request) -> Result<(), LedgerError>,
    {
        for attempt in 0..TRANSITION_RETRIES {
            let (mut request, version) = self.load(request_id)?;
            mutate(&mut request)?;
            request.updated_at = Utc::now();

            match self.store.commit(vec![Write::PutRequest {
                id: request_id,
                expected: version,
                doc: request,
            }]) {
                Ok(()) => return Ok(()),
                Err(LedgerError::StoreConflict { .. }) => {
                    debug!(%request_id, attempt, "transition conflicted, retrying");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }

        Err(LedgerError::store("transition retries exhausted"))
    }
}
