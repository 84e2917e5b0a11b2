//! Request types for the acceptance state machine
//!
//! A request is either a booking (single acceptor, confirmed on acceptance)
//! or a service request (many acceptors, in progress until completed). Both
//! run the same monotonic state machine; only the acceptance semantics and
//! the unlock flag differ.

use crate::types::bundle::{CustomerId, ProviderId, RequestId};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Structural flavor of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestKind {
    /// Single-acceptor request; acceptance confirms it
    Booking,

    /// Multi-acceptor request; first acceptance moves it in progress
    Service,
}

/// Lifecycle states of a request
///
/// Transitions are monotonic: `Completed` and `Rejected` are terminal and a
/// terminal request admits no further operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RequestStatus {
    /// Booking awaiting a provider
    Pending,

    /// Service request open for acceptance
    Open,

    /// Booking accepted by its provider
    Confirmed,

    /// Service request with at least one acceptor
    InProgress,

    /// Fulfilled; terminal
    Completed,

    /// Declined; terminal
    Rejected,
}

impl RequestStatus {
    /// Whether the state admits no further transition
    pub fn is_terminal(&self) -> bool {
        matches!(self, RequestStatus::Completed | RequestStatus::Rejected)
    }

    /// Lowercase wire label, used in errors and API payloads
    pub fn label(&self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Open => "open",
            RequestStatus::Confirmed => "confirmed",
            RequestStatus::InProgress => "in_progress",
            RequestStatus::Completed => "completed",
            RequestStatus::Rejected => "rejected",
        }
    }
}

/// Customer-supplied request content
///
/// Opaque to the ledger. The fields marked private are withheld from
/// viewers until the booking's unlock payment is confirmed; they are
/// withheld at the read boundary, never deleted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RequestPayload {
    /// Service address
    pub address: String,

    /// Requested service date, free-form
    pub service_date: Option<String>,

    /// Quoted cost in minor currency units
    pub cost_minor: i64,

    /// Customer contact details (private until unlocked)
    pub contact_info: String,

    /// Items selected by the customer (private until unlocked)
    pub selected_items: Vec<String>,

    /// Free-form special requests (private until unlocked)
    pub special_requests: Option<String>,
}

fn default_price_in_keys() -> u32 {
    1
}

/// A customer request moving through the acceptance state machine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Request {
    /// Request identity
    pub id: RequestId,

    /// Customer who created the request
    pub customer_id: CustomerId,

    /// Booking or service request
    pub kind: RequestKind,

    /// Customer-supplied content
    pub payload: RequestPayload,

    /// Current lifecycle state
    pub status: RequestStatus,

    /// Providers who have accepted, in acceptance order
    ///
    /// Invariant: a provider id appears at most once.
    pub accepted_by: Vec<ProviderId>,

    /// Keys a provider spends to accept this request (defaults to 1)
    #[serde(default = "default_price_in_keys")]
    pub price_in_keys: u32,

    /// Whether the one-shot unlock payment has been confirmed (bookings)
    #[serde(default)]
    pub is_paid: bool,

    /// Gateway reference recorded by the unlock confirmation, audit only
    #[serde(default)]
    pub unlock_reference: Option<String>,

    /// Creation time
    pub created_at: DateTime<Utc>,

    /// Last mutation time
    pub updated_at: DateTime<Utc>,
}

impl Request {
    /// Create a booking in `Pending` state
    pub fn new_booking(customer_id: impl Into<CustomerId>, payload: RequestPayload) -> Self {
        Self::new(customer_id, RequestKind::Booking, RequestStatus::Pending, payload)
    }

    /// Create a service request in `Open` state
    pub fn new_service(customer_id: impl Into<CustomerId>, payload: RequestPayload) -> Self {
        Self::new(customer_id, RequestKind::Service, RequestStatus::Open, payload)
    }

    fn new(
        customer_id: impl Into<CustomerId>,
        kind: RequestKind,
        status: RequestStatus,
        payload: RequestPayload,
    ) -> Self {
        let now = Utc::now();
        Request {
            id: Uuid::new_v4(),
            customer_id: customer_id.into(),
            kind,
            payload,
            status,
            accepted_by: Vec::new(),
            price_in_keys: default_price_in_keys(),
            is_paid: false,
            unlock_reference: None,
            created_at: now,
            updated_at: now,
        }
    }

    /// Set the key price of the request
    pub fn with_price(mut self, price_in_keys: u32) -> Self {
        self.price_in_keys = price_in_keys;
        self
    }

    /// Cost of accepting this request, in keys
    ///
    /// Always at least 1, even if a stored document carries a zero price.
    pub fn price(&self) -> u32 {
        self.price_in_keys.max(1)
    }

    /// Whether the provider already appears in the acceptor set
    pub fn has_acceptor(&self, provider: &str) -> bool {
        self.accepted_by.iter().any(|p| p == provider)
    }

    /// Read-boundary projection of the request
    ///
    /// Private payload fields are included only once the unlock payment has
    /// been confirmed. The underlying document is untouched.
    pub fn projected(&self) -> RequestView {
        RequestView {
            id: self.id,
            customer_id: self.customer_id.clone(),
            kind: self.kind,
            status: self.status,
            accepted_by: self.accepted_by.clone(),
            price_in_keys: self.price(),
            is_paid: self.is_paid,
            address: self.payload.address.clone(),
            service_date: self.payload.service_date.clone(),
            cost_minor: self.payload.cost_minor,
            contact_info: self.is_paid.then(|| self.payload.contact_info.clone()),
            selected_items: self.is_paid.then(|| self.payload.selected_items.clone()),
            special_requests: if self.is_paid {
                self.payload.special_requests.clone()
            } else {
                None
            },
            created_at: self.created_at,
            updated_at: self.updated_at,
        }
    }
}

/// Viewer-facing projection of a request
///
/// Serialized by the read API; private fields are `None` until unlocked.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RequestView {
    pub id: RequestId,
    pub customer_id: CustomerId,
    pub kind: RequestKind,
    pub status: RequestStatus,
    pub accepted_by: Vec<ProviderId>,
    pub price_in_keys: u32,
    pub is_paid: bool,
    pub address: String,
    pub service_date: Option<String>,
    pub cost_minor: i64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub contact_info: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub selected_items: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub special_requests: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    pub(crate) fn payload() -> RequestPayload {
        RequestPayload {
            address: "12 Harbour Lane".into(),
            service_date: Some("2026-09-01".into()),
            cost_minor: 25_000,
            contact_info: "+44 20 7946 0000".into(),
            selected_items: vec!["marquee".into(), "catering".into()],
            special_requests: Some("step-free access".into()),
        }
    }

    #[test]
    fn test_new_booking_starts_pending() {
        let r = Request::new_booking("cust-1", payload());
        assert_eq!(r.kind, RequestKind::Booking);
        assert_eq!(r.status, RequestStatus::Pending);
        assert!(r.accepted_by.is_empty());
        assert_eq!(r.price(), 1);
        assert!(!r.is_paid);
    }

    #[test]
    fn test_new_service_starts_open() {
        let r = Request::new_service("cust-1", payload());
        assert_eq!(r.kind, RequestKind::Service);
        assert_eq!(r.status, RequestStatus::Open);
    }

    #[rstest]
    #[case::pending(RequestStatus::Pending, false)]
    #[case::open(RequestStatus::Open, false)]
    #[case::confirmed(RequestStatus::Confirmed, false)]
    #[case::in_progress(RequestStatus::InProgress, false)]
    #[case::completed(RequestStatus::Completed, true)]
    #[case::rejected(RequestStatus::Rejected, true)]
    fn test_terminal_states(#[case] status: RequestStatus, #[case] terminal: bool) {
        assert_eq!(status.is_terminal(), terminal);
    }

    #[test]
    fn test_zero_price_defaults_to_one() {
        let r = Request::new_service("cust-1", payload()).with_price(0);
        assert_eq!(r.price(), 1);
    }

    #[test]
    fn test_has_acceptor() {
        let mut r = Request::new_service("cust-1", payload());
        assert!(!r.has_acceptor("prov-1"));
        r.accepted_by.push("prov-1".into());
        assert!(r.has_acceptor("prov-1"));
        assert!(!r.has_acceptor("prov-2"));
    }

    #[test]
    fn test_projection_withholds_private_fields_until_paid() {
        let r = Request::new_booking("cust-1", payload());

        let view = r.projected();
        assert_eq!(view.address, "12 Harbour Lane");
        assert!(view.contact_info.is_none());
        assert!(view.selected_items.is_none());
        assert!(view.special_requests.is_none());
    }

    #[test]
    fn test_projection_reveals_private_fields_once_paid() {
        let mut r = Request::new_booking("cust-1", payload());
        r.is_paid = true;

        let view = r.projected();
        assert_eq!(view.contact_info.as_deref(), Some("+44 20 7946 0000"));
        assert_eq!(
            view.selected_items,
            Some(vec!["marquee".to_string(), "catering".to_string()])
        );
        assert_eq!(view.special_requests.as_deref(), Some("step-free access"));
    }

    #[test]
    fn test_price_in_keys_default_on_deserialize() {
        // Stored documents written before pricing existed carry no price field
        let r = Request::new_booking("cust-1", payload());
        let mut value = serde_json::to_value(&r).unwrap();
        value.as_object_mut().unwrap().remove("price_in_keys");

        let back: Request = serde_json::from_value(value).unwrap();
        assert_eq!(back.price_in_keys, 1);
    }
}
