//! Key ledger
//!
//! Owns bundle balances for every provider: idempotent grants from
//! reconciled gateway transactions, atomic spends against the oldest
//! sufficient bundle, and balance/audit queries.
//!
//! The ledger is the only write path to `keys_remaining`; no other code may
//! touch a bundle's counters directly.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use tracing::{debug, info};

use crate::core::store::{DocumentStore, InsertOutcome, Version, Write};
use crate::types::{BundleId, KeyBundle, KeyUsageRecord, LedgerError};

/// How many times a standalone spend re-runs after a version conflict
///
/// Every conflict implies another writer committed, so the bound is only a
/// backstop against pathological contention, not a tuning knob.
const SPEND_RETRIES: u32 = 16;

/// Outcome of a grant call
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantOutcome {
    /// The bundle holding the granted keys
    pub bundle_id: BundleId,
    /// False when the transaction had already been granted
    pub created: bool,
}

/// A spend prepared against a specific bundle version
///
/// The decrement is not yet committed; the caller includes `into_write` in
/// its own atomic commit so the bundle decrement, the usage record, and the
/// caller's state transition land together or not at all.
#[derive(Debug, Clone)]
pub struct SpendPlan {
    /// Bundle chosen for the spend
    pub bundle_id: BundleId,
    /// Version the bundle was read at
    pub expected_version: Version,
    /// Bundle contents with the decrement applied
    pub updated: KeyBundle,
    /// Keys the plan consumes
    pub keys: u32,
}

impl SpendPlan {
    /// The bundle write to include in the caller's commit
    pub fn into_write(self) -> Write {
        Write::PutBundle {
            id: self.bundle_id,
            expected: self.expected_version,
            doc: self.updated,
        }
    }
}

/// Bundle balance ledger for all providers
#[derive(Clone)]
pub struct KeyLedger {
    store: Arc<dyn DocumentStore>,
}

impl KeyLedger {
    /// Create a ledger over the given store
    pub fn new(store: Arc<dyn DocumentStore>) -> Self {
        KeyLedger { store }
    }

    /// Grant keys for a reconciled gateway transaction
    ///
    /// Idempotent on `transaction_id`: if a bundle for the transaction
    /// already exists its id is returned and nothing is mutated. The
    /// uniqueness is constraint-backed in the store, so two racing grants
    /// for the same transaction can never both create a bundle.
    ///
    /// # Arguments
    ///
    /// * `owner` - Provider receiving the keys
    /// * `transaction_id` - External payment reference (unique)
    /// * `plan_name` - Plan matched during reconciliation
    /// * `key_count` - Keys the plan grants (must be ≥ 1)
    /// * `purchased_at` - Payment time of the transaction
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::Config`] for a zero `key_count` and store
    /// errors verbatim.
    pub fn grant(
        &self,
        owner: &str,
        transaction_id: &str,
        plan_name: &str,
        key_count: u32,
        purchased_at: DateTime<Utc>,
    ) -> Result<GrantOutcome, LedgerError> {
        if key_count == 0 {
            return Err(LedgerError::config(format!(
                "plan {plan_name} grants zero keys"
            )));
        }

        let bundle = KeyBundle::new(owner, transaction_id, plan_name, key_count, purchased_at);
        let bundle_id = bundle.id;

        match self.store.insert_bundle(bundle)? {
            InsertOutcome::Created => {
                info!(owner, transaction_id, plan_name, key_count, "granted key bundle");
                Ok(GrantOutcome {
                    bundle_id,
                    created: true,
                })
            }
            InsertOutcome::Duplicate(existing) => {
                debug!(owner, transaction_id, "grant already applied, returning existing bundle");
                Ok(GrantOutcome {
                    bundle_id: existing,
                    created: false,
                })
            }
        }
    }

    /// Total remaining keys across the owner's bundles
    pub fn balance(&self, owner: &str) -> Result<u64, LedgerError> {
        Ok(self
            .store
            .bundles_for_owner(owner)?
            .iter()
            .map(|(bundle, _)| bundle.keys_remaining as u64)
            .sum())
    }

    /// Prepare a spend of `required` keys without committing it
    ///
    /// Selects the oldest bundle (by `purchased_at`) with enough remaining
    /// keys — a FIFO consumption policy, never cheapest-first or
    /// largest-first. A spend draws from exactly one bundle; if no single
    /// bundle can cover the cost the spend fails rather than splitting.
    ///
    /// # Arguments
    ///
    /// * `owner` - Provider whose keys are spent
    /// * `required` - Keys the spend needs
    /// * `preferred` - Optional explicit bundle choice; must belong to the
    ///   owner and cover the cost
    ///
    /// # Errors
    ///
    /// * [`LedgerError::NoSuchOwner`] - the owner has no bundles at all
    /// * [`LedgerError::InsufficientCredit`] - no single bundle covers the cost
    /// * [`LedgerError::NotFound`] - the preferred bundle does not exist or
    ///   belongs to another owner
    pub fn prepare_spend(
        &self,
        owner: &str,
        required: u32,
        preferred: Option<BundleId>,
    ) -> Result<SpendPlan, LedgerError> {
        let (bundle, version) = match preferred {
            Some(id) => self.preferred_bundle(owner, required, id)?,
            None => self.oldest_sufficient_bundle(owner, required)?,
        };

        let mut updated = bundle;
        updated.spend(required)?;

        Ok(SpendPlan {
            bundle_id: updated.id,
            expected_version: version,
            updated,
            keys: required,
        })
    }

    /// Spend `required` keys as a standalone atomic operation
    ///
    /// Concurrent spends against the same bundle serialize through the
    /// store's version check; a lost decrement is impossible. On conflict
    /// the spend re-reads and retries a bounded number of times.
    ///
    /// # Returns
    ///
    /// The id of the bundle the keys were drawn from.
    pub fn spend(
        &self,
        owner: &str,
        required: u32,
        preferred: Option<BundleId>,
    ) -> Result<BundleId, LedgerError> {
        for attempt in 0..SPEND_RETRIES {
            let plan = self.prepare_spend(owner, required, preferred)?;
            let bundle_id = plan.bundle_id;

            match self.store.commit(vec![plan.into_write()]) {
                Ok(()) => {
                    info!(owner, required, %bundle_id, "spent keys");
                    return Ok(bundle_id);
                }
                Err(LedgerError::StoreConflict { .. }) => {
                    debug!(owner, attempt, "spend conflicted, retrying");
                    continue;
                }
                Err(other) => return Err(other),
            }
        }

        Err(LedgerError::store("spend retries exhausted"))
    }

    /// Key-usage audit entries for the owner
    pub fn usage_for_owner(&self, owner: &str) -> Result<Vec<KeyUsageRecord>, LedgerError> {
        self.store.usage_for_owner(owner)
    }

    fn oldest_sufficient_bundle(
        &self,
        owner: &str,
        required: u32,
    ) -> Result<(KeyBundle, Version), LedgerError> {
        let bundles = self.store.bundles_for_owner(owner)?;
        if bundles.is_empty() {
            return Err(LedgerError::no_such_owner(owner));
        }

        let available: u64 = bundles
            .iter()
            .map(|(bundle, _)| bundle.keys_remaining as u64)
            .sum();

        // bundles_for_owner sorts oldest first, so the first candidate with
        // enough remaining keys is the FIFO choice.
        bundles
            .into_iter()
            .find(|(bundle, _)| bundle.can_cover(required))
            .ok_or_else(|| LedgerError::insufficient_credit(owner, available, required))
    }

    fn preferred_bundle(
        &self,
        owner: &str,
        required: u32,
        id: BundleId,
    ) -> Result<(KeyBundle, Version), LedgerError> {
        let (bundle, version) = self
            .store
            .get_bundle(id)?
            .ok_or_else(|| LedgerError::not_found("bundle", id.to_string()))?;

        if bundle.owner_id != owner {
            // Treated as absent rather than leaking another owner's bundle
            return Err(LedgerError::not_found("bundle", id.to_string()));
        }
        if !bundle.can_cover(required) {
            return Err(LedgerError::insufficient_credit(
                owner,
                bundle.keys_remaining as u64,
                required,
            ));
        }

        Ok((bundle, version))
    }
}
