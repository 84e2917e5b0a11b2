//! Core data types for the key-ledger engine
//!
//! - [`bundle`] - Key bundles, usage records, and id aliases
//! - [`request`] - Requests, lifecycle states, and the unlock projection
//! - [`error`] - The engine-wide error taxonomy

pub mod bundle;
pub mod error;
pub mod request;

pub use bundle::{BundleId, CustomerId, KeyBundle, KeyUsageRecord, ProviderId, RequestId};
pub use error::LedgerError;
pub use request::{Request, RequestKind, RequestPayload, RequestStatus, RequestView};
