//! Key-bundle types for the key-ledger engine
//!
//! A bundle is a batch of prepaid keys originating from a single
//! payment-gateway transaction. Bundles are created once by reconciliation,
//! mutated only by the ledger's spend operation, and never deleted — a
//! drained bundle stays behind for audit but is excluded from spend
//! candidates.

use crate::types::error::LedgerError;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Bundle identifier
pub type BundleId = Uuid;

/// Request identifier
pub type RequestId = Uuid;

/// Provider identifier (opaque to the ledger)
pub type ProviderId = String;

/// Customer identifier (opaque to the ledger)
pub type CustomerId = String;

/// One purchased block of prepaid keys
///
/// `transaction_id` is the external payment reference and is unique across
/// bundles; the store enforces the constraint, which is what makes grants
/// idempotent across reconciliation retries.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyBundle {
    /// Bundle identity
    pub id: BundleId,

    /// Provider who purchased the bundle
    pub owner_id: ProviderId,

    /// External payment reference, unique across all bundles
    pub transaction_id: String,

    /// Name of the plan matched during reconciliation
    pub plan_name: String,

    /// Keys the bundle was granted with (≥ 1, never changes)
    pub total_keys: u32,

    /// Keys consumed so far
    pub keys_used: u32,

    /// Keys still spendable
    ///
    /// Invariant: `keys_used + keys_remaining == total_keys` at all times,
    /// and `keys_remaining` is never negative.
    pub keys_remaining: u32,

    /// When the underlying gateway transaction was paid
    ///
    /// Spend consumes bundles oldest-first by this timestamp, so it is taken
    /// from the gateway's `paid_at` rather than the reconciliation time.
    pub purchased_at: DateTime<Utc>,
}

impl KeyBundle {
    /// Create a new bundle with all keys remaining
    ///
    /// # Arguments
    ///
    /// * `owner_id` - Provider the bundle belongs to
    /// * `transaction_id` - External payment reference (unique)
    /// * `plan_name` - Plan matched during reconciliation
    /// * `total_keys` - Keys granted by the plan
    /// * `purchased_at` - Payment time of the underlying transaction
    pub fn new(
        owner_id: impl Into<ProviderId>,
        transaction_id: impl Into<String>,
        plan_name: impl Into<String>,
        total_keys: u32,
        purchased_at: DateTime<Utc>,
    ) -> Self {
        KeyBundle {
            id: Uuid::new_v4(),
            owner_id: owner_id.into(),
            transaction_id: transaction_id.into(),
            plan_name: plan_name.into(),
            total_keys,
            keys_used: 0,
            keys_remaining: total_keys,
            purchased_at,
        }
    }

    /// Whether the bundle can cover a spend of `keys`
    pub fn can_cover(&self, keys: u32) -> bool {
        self.keys_remaining >= keys
    }

    /// Consume `keys` from the bundle
    ///
    /// Decrements `keys_remaining` and increments `keys_used` using checked
    /// arithmetic so the bundle invariant cannot be violated.
    ///
    /// # Arguments
    ///
    /// * `keys` - Number of keys to consume (must not exceed remaining)
    ///
    /// # Errors
    ///
    /// Returns [`LedgerError::InsufficientCredit`] if the bundle does not
    /// hold enough remaining keys. The bundle is left unchanged on error.
    pub fn spend(&mut self, keys: u32) -> Result<(), LedgerError> {
        let remaining = self.keys_remaining.checked_sub(keys).ok_or_else(|| {
            LedgerError::insufficient_credit(&self.owner_id, self.keys_remaining as u64, keys)
        })?;

        let used = self
            .keys_used
            .checked_add(keys)
            .ok_or_else(|| LedgerError::store("key usage counter overflow"))?;

        self.keys_remaining = remaining;
        self.keys_used = used;

        Ok(())
    }
}

/// Append-only audit entry for a successful spend
///
/// Written in the same atomic commit as the bundle decrement — exactly one
/// record per successful spend, never updated afterwards.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct KeyUsageRecord {
    /// Provider whose keys were spent
    pub owner_id: ProviderId,

    /// Bundle the keys were drawn from
    pub bundle_id: BundleId,

    /// Request the spend paid for
    pub request_id: RequestId,

    /// Keys consumed by the spend
    pub keys_spent: u32,

    /// When the spend committed
    pub spent_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bundle(total: u32) -> KeyBundle {
        KeyBundle::new("prov-1", "TX-1", "starter", total, Utc::now())
    }

    #[test]
    fn test_new_bundle_has_all_keys_remaining() {
        let b = bundle(5);
        assert_eq!(b.total_keys, 5);
        assert_eq!(b.keys_used, 0);
        assert_eq!(b.keys_remaining, 5);
        assert_eq!(b.keys_used + b.keys_remaining, b.total_keys);
    }

    #[test]
    fn test_spend_moves_keys_from_remaining_to_used() {
        let mut b = bundle(5);

        b.spend(2).unwrap();

        assert_eq!(b.keys_remaining, 3);
        assert_eq!(b.keys_used, 2);
        assert_eq!(b.keys_used + b.keys_remaining, b.total_keys);
    }

    #[test]
    fn test_spend_to_zero_keeps_invariant() {
        let mut b = bundle(3);

        b.spend(1).unwrap();
        b.spend(2).unwrap();

        assert_eq!(b.keys_remaining, 0);
        assert_eq!(b.keys_used, 3);
        assert!(!b.can_cover(1));
    }

    #[test]
    fn test_spend_more_than_remaining_is_rejected() {
        let mut b = bundle(2);

        let result = b.spend(3);

        assert!(matches!(
            result.unwrap_err(),
            LedgerError::InsufficientCredit { .. }
        ));
        // Bundle must be unchanged after a rejected spend
        assert_eq!(b.keys_remaining, 2);
        assert_eq!(b.keys_used, 0);
    }

    #[test]
    fn test_can_cover_boundary() {
        let b = bundle(2);
        assert!(b.can_cover(2));
        assert!(!b.can_cover(3));
    }

    #[test]
    fn test_bundle_ids_are_unique() {
        let a = bundle(1);
        let b = bundle(1);
        assert_ne!(a.id, b.id);
    }
}
