//! HTTP surface integration tests
//!
//! Boots the real service router on an ephemeral port, with the payment
//! gateway mocked by wiremock, and exercises the caller-facing operations
//! end to end: accept, balance, reconcile, the unlock gate, the projected
//! read path, and the error-reason mapping.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use key_ledger_engine::core::{KeyLedger, MemoryStore, RequestMachine, UnlockGate};
use key_ledger_engine::gateway::HttpGateway;
use key_ledger_engine::http::{router, AppState};
use key_ledger_engine::reconcile::{Plan, PlanTable, Reconciler, RetryPolicy};
use key_ledger_engine::types::{Request, RequestPayload};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

struct TestService {
    addr: SocketAddr,
    machine: RequestMachine,
    ledger: KeyLedger,
    client: reqwest::Client,
}

impl TestService {
    fn url(&self, path_and_query: &str) -> String {
        format!("http://{}{}", self.addr, path_and_query)
    }
}

/// Boot the service against a mock gateway and return handles into it
async fn boot(gateway_url: &str) -> TestService {
    let store = Arc::new(MemoryStore::new());
    let ledger = KeyLedger::new(store.clone());
    let machine = RequestMachine::new(store.clone(), ledger.clone());

    let gateway = Arc::new(
        HttpGateway::new(gateway_url, "sk_test", Some(Duration::from_millis(500))).unwrap(),
    );
    let plans = PlanTable::new(vec![
        Plan {
            name: "A".into(),
            price_minor: 5_000,
            keys: 5,
        },
        Plan {
            name: "B".into(),
            price_minor: 10_000,
            keys: 12,
        },
    ])
    .unwrap();
    let reconciler = Arc::new(Reconciler::new(
        gateway.clone(),
        ledger.clone(),
        plans,
        RetryPolicy {
            extra_attempts: 1,
            delay: Duration::from_millis(10),
        },
        50,
    ));
    let unlock = Arc::new(UnlockGate::new(store, gateway, 2_500));

    let state = AppState {
        machine: machine.clone(),
        ledger: ledger.clone(),
        reconciler,
        unlock,
    };

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, router(state)).await.unwrap();
    });

    TestService {
        addr,
        machine,
        ledger,
        client: reqwest::Client::new(),
    }
}

fn payload() -> RequestPayload {
    RequestPayload {
        address: "3 Quay Street".into(),
        service_date: None,
        cost_minor: 40_000,
        contact_info: "customer@example.com".into(),
        selected_items: vec!["stage".into()],
        special_requests: Some("after 6pm".into()),
    }
}

#[tokio::test]
async fn health_endpoint_answers() {
    let gateway = MockServer::start().await;
    let service = boot(&gateway.uri()).await;

    let response = service.client.get(service.url("/health")).send().await.unwrap();

    assert_eq!(response.status(), 200);
}

#[tokio::test]
async fn accept_endpoint_spends_a_key() {
    let gateway = MockServer::start().await;
    let service = boot(&gateway.uri()).await;

    service
        .ledger
        .grant("prov-1", "TX-1", "A", 5, Utc::now())
        .unwrap();
    let id = service
        .machine
        .submit(Request::new_service("cust-1", payload()))
        .unwrap();

    let response = service
        .client
        .post(service.url("/accept"))
        .json(&serde_json::json!({ "requestId": id, "providerId": "prov-1" }))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["ok"], true);
    assert_eq!(service.ledger.balance("prov-1").unwrap(), 4);
}

#[tokio::test]
async fn accept_errors_carry_distinct_reasons() {
    let gateway = MockServer::start().await;
    let service = boot(&gateway.uri()).await;

    service
        .ledger
        .grant("prov-1", "TX-1", "single", 1, Utc::now())
        .unwrap();
    let id = service
        .machine
        .submit(Request::new_service("cust-1", payload()).with_price(2))
        .unwrap();

    // Not enough credit: 400 InsufficientCredit
    let response = service
        .client
        .post(service.url("/accept"))
        .json(&serde_json::json!({ "requestId": id, "providerId": "prov-1" }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 400);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "InsufficientCredit");

    // Unknown request: 404 NotFound
    let response = service
        .client
        .post(service.url("/accept"))
        .json(&serde_json::json!({
            "requestId": uuid::Uuid::new_v4(),
            "providerId": "prov-1"
        }))
        .send()
        .await
        .unwrap();
    assert_eq!(response.status(), 404);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["error"], "NotFound");
}

#[tokio::test]
async fn duplicate_accept_is_already_accepted() {
    let gateway = MockServer::start().await;
    let service = boot(&gateway.uri()).await;

    service
        .ledger
        .grant("prov-1", "TX-1", "A", 5, Utc::now())
        .unwrap();
    let id = service
        .machine
        .submit(Request::new_service("cust-1", payload()))
        .unwrap();

    let accept = serde_json::json!({ "requestId": id, "providerId": "prov-1" });
    let first = service
        .client
        .post(service.url("/accept"))
        .json(&accept)
        .send()
        .await
        .unwrap();
    assert_eq!(first.status(), 200);

    let second = service
        .client
        .post(service.url("/accept"))
        .json(&accept)
        .send()
        .await
        .unwrap();
    assert_eq!(second.status(), 400);
    let body: serde_json::Value = second.json().await.unwrap();
    assert_eq!(body["error"], "AlreadyAccepted");
    assert_eq!(service.ledger.balance("prov-1").unwrap(), 4);
}

#[tokio::test]
async fn balance_endpoint_reports_remaining_keys() {
    let gateway = MockServer::start().await;
    let service = boot(&gateway.uri()).await;

    service
        .ledger
        .grant("prov-1", "TX-1", "A", 5, Utc::now())
        .unwrap();

    let response = service
        .client
        .get(service.url("/balance?owner=prov-1"))
        .send()
        .await
        .unwrap();

    assert_eq!(response.status(), 200);
    let body: serde_json::Value = response.json().await.unwrap();
    assert_eq!(body["keysRemaining"], 5);
}

#[tokio::test]
async fn reconcile_endpoint_is_idempotent() {
    let gateway = MockServer::start().await;
    Mock::given(method("GET"))
        .and(path("/transaction"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": [{
                "id": "1",
                "amount": 10_000,
                "status": "success",
                "reference": "ref-1",
                "paid_at": "2026-06-01T12:00:00Z"
            }],
            "meta": { "total": 1, "page": 1, "pageCount": 1 }
        })))
        .mount(&gateway)
        .await;

    let service = boot(&gateway.uri()).await;
    let reconcile = serde_json::json!({ "ownerId": "prov-1" });

    // Dashboard loads twice; keys arrive once
    for _ in 0..2 {
        let response = service
            .client
            .post(service.url("/reconcile"))
            .json(&reconcile)
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    assert_eq!(service.ledger.balance("prov-1").unwrap(), 12);
}

#[tokio::test]
async fn unlock_flow_reveals_private_fields() {
    let gateway = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/transaction/initialize"))
        .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
            "data": {
                "authorization_url": "https://checkout.example/pay",
                "reference": "unlock-ref-1"
            }
        })))
        .mount(&gateway)
        .await;

    let service = boot(&gateway.uri()).await;
    let id = service
        .machine
        .submit(Request::new_booking("cust-1", payload()))
        .unwrap();

    // Before unlock: private fields withheld
    let view: serde_json::Value = service
        .client
        .get(service.url(&format!("/requests/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["address"], "3 Quay Street");
    assert!(view.get("contactInfo").is_none());
    assert!(view.get("selectedItems").is_none());

    // Initiate returns the redirect
    let init: serde_json::Value = service
        .client
        .post(service.url("/unlock/initiate"))
        .json(&serde_json::json!({ "requestId": id, "payerId": "cust-1@example.com" }))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(init["paymentRedirectUrl"], "https://checkout.example/pay");

    // Gateway callback confirms; a duplicate delivery is harmless
    for _ in 0..2 {
        let response = service
            .client
            .post(service.url("/unlock/confirm"))
            .json(&serde_json::json!({ "requestId": id, "reference": "unlock-ref-1" }))
            .send()
            .await
            .unwrap();
        assert_eq!(response.status(), 200);
    }

    // After unlock: private fields visible
    let view: serde_json::Value = service
        .client
        .get(service.url(&format!("/requests/{id}")))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();
    assert_eq!(view["isPaid"], true);
    assert_eq!(view["contactInfo"], "customer@example.com");
    assert_eq!(view["selectedItems"][0], "stage");
    assert_eq!(view["specialRequests"], "after 6pm");
}

#[tokio::test]
async fn concurrent_http_accepts_cannot_double_spend() {
    let gateway = MockServer::start().await;
    let service = boot(&gateway.uri()).await;

    service
        .ledger
        .grant("prov-1", "TX-1", "single", 1, Utc::now())
        .unwrap();
    let first = service
        .machine
        .submit(Request::new_service("cust-1", payload()))
        .unwrap();
    let second = service
        .machine
        .submit(Request::new_service("cust-2", payload()))
        .unwrap();

    // One key, two simultaneous accepts through the HTTP surface
    let responses = futures::future::join_all([first, second].map(|id| {
        let client = service.client.clone();
        let url = service.url("/accept");
        async move {
            client
                .post(url)
                .json(&serde_json::json!({ "requestId": id, "providerId": "prov-1" }))
                .send()
                .await
                .unwrap()
        }
    }))
    .await;

    let statuses: Vec<u16> = responses.iter().map(|r| r.status().as_u16()).collect();
    let ok = statuses.iter().filter(|s| **s == 200).count();
    let rejected = statuses.iter().filter(|s| **s == 400).count();
    assert_eq!(ok, 1, "statuses: {statuses:?}");
    assert_eq!(rejected, 1, "statuses: {statuses:?}");
    assert_eq!(service.ledger.balance("prov-1").unwrap(), 0);
}

#[tokio::test]
async fn usage_endpoint_lists_audit_entries() {
    let gateway = MockServer::start().await;
    let service = boot(&gateway.uri()).await;

    service
        .ledger
        .grant("prov-1", "TX-1", "A", 5, Utc::now())
        .unwrap();
    let id = service
        .machine
        .submit(Request::new_service("cust-1", payload()))
        .unwrap();
    service.machine.accept(id, "prov-1", None).unwrap();

    let usage: serde_json::Value = service
        .client
        .get(service.url("/usage?owner=prov-1"))
        .send()
        .await
        .unwrap()
        .json()
        .await
        .unwrap();

    let entries = usage.as_array().unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0]["owner_id"], "prov-1");
    assert_eq!(entries[0]["keys_spent"], 1);
}
