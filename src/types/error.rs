//! Error types for the key-ledger engine
//!
//! This module defines all error types that can occur while granting,
//! spending, and reconciling prepaid keys, and while driving the request
//! acceptance state machine.
//!
//! # Error Categories
//!
//! - **Business-rule errors**: insufficient credit, duplicate acceptance,
//!   terminal-state violations. Returned to the caller verbatim and never
//!   retried automatically — they require a different user action.
//! - **Infrastructure errors**: store conflicts and transient store failures,
//!   gateway timeouts. Retried a bounded number of times at the documented
//!   boundaries only.
//! - **Configuration errors**: invalid or missing configuration at startup.

use crate::gateway::GatewayError;
use thiserror::Error;

/// Main error type for the key-ledger engine
///
/// Every variant is scoped to a single request or bundle; no error here is
/// fatal to the process, and none may corrupt unrelated records.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum LedgerError {
    /// A referenced document does not exist
    ///
    /// `kind` names the document type ("request", "bundle") so callers can
    /// report which lookup failed.
    #[error("{kind} {id} not found")]
    NotFound {
        /// Document type that was looked up
        kind: &'static str,
        /// The identifier that was not found
        id: String,
    },

    /// The provider has no key bundles at all
    ///
    /// Distinct from [`LedgerError::InsufficientCredit`]: this provider has
    /// never had a grant reconciled, so there is nothing to spend from.
    #[error("provider {owner} has no key bundles")]
    NoSuchOwner {
        /// Provider id with no bundles
        owner: String,
    },

    /// No single bundle holds enough remaining keys for the spend
    ///
    /// User-correctable: the provider must purchase more keys. The spend is
    /// rejected with no state change anywhere.
    #[error("insufficient credit for provider {owner}: {available} keys remaining, {requested} required")]
    InsufficientCredit {
        /// Provider id whose spend was rejected
        owner: String,
        /// Total remaining keys across the provider's bundles
        available: u64,
        /// Keys required by the rejected spend
        requested: u32,
    },

    /// The provider already appears in the request's acceptor set
    ///
    /// A business-level idempotency violation, not a crash. The bundle
    /// balance is left unchanged.
    #[error("provider {provider} already accepted request {request}")]
    AlreadyAccepted {
        /// Request id
        request: String,
        /// Provider id that attempted the duplicate acceptance
        provider: String,
    },

    /// The request is in a state that does not admit the operation
    ///
    /// Terminal states (`completed`, `rejected`) never admit further
    /// transitions; a confirmed booking admits no further acceptors.
    #[error("request {request} is {status} and cannot accept this operation")]
    InvalidState {
        /// Request id
        request: String,
        /// The state that rejected the operation
        status: String,
    },

    /// Optimistic-concurrency conflict on a document commit
    ///
    /// Internal and retryable: the caller re-reads and re-runs the whole
    /// operation. Only surfaces to API callers once retries are exhausted,
    /// as a transient store failure.
    #[error("version conflict committing {document}")]
    StoreConflict {
        /// Document that failed its version check
        document: String,
    },

    /// Transient persistence failure
    ///
    /// Retryable at the caller's discretion; the failed operation was not
    /// partially applied.
    #[error("store error: {message}")]
    Store {
        /// Description of the store failure
        message: String,
    },

    /// Payment-gateway failure
    ///
    /// Timeouts and network failures are retried at the Reconciler boundary;
    /// HTTP-status rejections propagate immediately.
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// Invalid or missing configuration
    ///
    /// Fatal at startup only; never produced by a running operation.
    #[error("configuration error: {message}")]
    Config {
        /// Description of the configuration problem
        message: String,
    },
}

impl LedgerError {
    /// Create a NotFound error
    pub fn not_found(kind: &'static str, id: impl Into<String>) -> Self {
        LedgerError::NotFound {
            kind,
            id: id.into(),
        }
    }

    /// Create a NoSuchOwner error
    pub fn no_such_owner(owner: impl Into<String>) -> Self {
        LedgerError::NoSuchOwner {
            owner: owner.into(),
        }
    }

    /// Create an InsufficientCredit error
    pub fn insufficient_credit(owner: impl Into<String>, available: u64, requested: u32) -> Self {
        LedgerError::InsufficientCredit {
            owner: owner.into(),
            available,
            requested,
        }
    }

    /// Create an AlreadyAccepted error
    pub fn already_accepted(request: impl Into<String>, provider: impl Into<String>) -> Self {
        LedgerError::AlreadyAccepted {
            request: request.into(),
            provider: provider.into(),
        }
    }

    /// Create an InvalidState error
    pub fn invalid_state(request: impl Into<String>, status: impl Into<String>) -> Self {
        LedgerError::InvalidState {
            request: request.into(),
            status: status.into(),
        }
    }

    /// Create a StoreConflict error
    pub fn store_conflict(document: impl Into<String>) -> Self {
        LedgerError::StoreConflict {
            document: document.into(),
        }
    }

    /// Create a transient Store error
    pub fn store(message: impl Into<String>) -> Self {
        LedgerError::Store {
            message: message.into(),
        }
    }

    /// Create a Config error
    pub fn config(message: impl Into<String>) -> Self {
        LedgerError::Config {
            message: message.into(),
        }
    }

    /// Stable machine-readable reason code for API responses
    ///
    /// Callers must be able to distinguish "not enough credits" from
    /// "already acted on this" from "too late, already resolved"; these codes
    /// are the wire-level contract for that distinction.
    pub fn reason(&self) -> &'static str {
        match self {
            LedgerError::NotFound { .. } => "NotFound",
            LedgerError::NoSuchOwner { .. } => "NoSuchOwner",
            LedgerError::InsufficientCredit { .. } => "InsufficientCredit",
            LedgerError::AlreadyAccepted { .. } => "AlreadyAccepted",
            LedgerError::InvalidState { .. } => "InvalidState",
            LedgerError::StoreConflict { .. } | LedgerError::Store { .. } => "TransientStoreError",
            LedgerError::Gateway(GatewayError::Timeout { .. }) => "GatewayTimeout",
            LedgerError::Gateway(_) => "GatewayError",
            LedgerError::Config { .. } => "Config",
        }
    }

    /// Whether the error is a business-rule rejection
    ///
    /// Business-rule rejections are never retried automatically.
    pub fn is_business_rule(&self) -> bool {
        matches!(
            self,
            LedgerError::NoSuchOwner { .. }
                | LedgerError::InsufficientCredit { .. }
                | LedgerError::AlreadyAccepted { .. }
                | LedgerError::InvalidState { .. }
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[rstest]
    #[case::not_found(
        LedgerError::not_found("request", "req-1"),
        "request req-1 not found"
    )]
    #[case::no_such_owner(
        LedgerError::no_such_owner("prov-1"),
        "provider prov-1 has no key bundles"
    )]
    #[case::insufficient_credit(
        LedgerError::insufficient_credit("prov-1", 2, 5),
        "insufficient credit for provider prov-1: 2 keys remaining, 5 required"
    )]
    #[case::already_accepted(
        LedgerError::already_accepted("req-1", "prov-1"),
        "provider prov-1 already accepted request req-1"
    )]
    #[case::invalid_state(
        LedgerError::invalid_state("req-1", "completed"),
        "request req-1 is completed and cannot accept this operation"
    )]
    #[case::store_conflict(
        LedgerError::store_conflict("bundle b-1"),
        "version conflict committing bundle b-1"
    )]
    fn test_error_display(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.to_string(), expected);
    }

    #[rstest]
    #[case::insufficient(LedgerError::insufficient_credit("p", 0, 1), "InsufficientCredit")]
    #[case::already(LedgerError::already_accepted("r", "p"), "AlreadyAccepted")]
    #[case::invalid(LedgerError::invalid_state("r", "rejected"), "InvalidState")]
    #[case::conflict(LedgerError::store_conflict("request r"), "TransientStoreError")]
    #[case::timeout(
        LedgerError::Gateway(GatewayError::Timeout { message: "deadline".into() }),
        "GatewayTimeout"
    )]
    fn test_reason_codes(#[case] error: LedgerError, #[case] expected: &str) {
        assert_eq!(error.reason(), expected);
    }

    #[rstest]
    #[case::insufficient(LedgerError::insufficient_credit("p", 0, 1), true)]
    #[case::already(LedgerError::already_accepted("r", "p"), true)]
    #[case::invalid(LedgerError::invalid_state("r", "completed"), true)]
    #[case::conflict(LedgerError::store_conflict("request r"), false)]
    #[case::store(LedgerError::store("io"), false)]
    fn test_business_rule_classification(#[case] error: LedgerError, #[case] expected: bool) {
        assert_eq!(error.is_business_rule(), expected);
    }
}
