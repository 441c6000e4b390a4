#![allow(clippy::unwrap_used, clippy::expect_used)]
//! Integration tests for the kernel's API routes.
//!
//! These drive the REAL router from `build_app`, so route gate order,
//! schemas and policies are exactly what the binary serves.

use axum::body::Body;
use axum::http::{Request, StatusCode, header};
use serde_json::json;
use uuid::Uuid;

use tapango_kernel::ErrorKind;

mod common;
use common::{
    ADMIN_ID, ADMIN_TOKEN, CUSTOMER_TOKEN, OPERATOR_ID, OPERATOR_TOKEN, TestApp, post_raw,
};

// =============================================================================
// Health and metrics
// =============================================================================

#[tokio::test]
async fn health_check_returns_healthy() {
    let app = TestApp::new();
    let response = app.get("/health", None).await;

    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["status"], "healthy");
    assert_eq!(response.body["schemas"], 8);
    assert_eq!(
        response.body["buckets"],
        json!(["api", "auth", "tracking", "uploads"])
    );
}

#[tokio::test]
async fn metrics_report_gate_rejections() {
    let app = TestApp::new();
    app.get("/api/protected/resource", None).await;

    let response = app
        .request(Request::get("/metrics").body(Body::empty()).unwrap())
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(
        response
            .header("content-type")
            .unwrap()
            .starts_with("text/plain")
    );
    assert_eq!(
        app.state
            .metrics()
            .rejections("auth", ErrorKind::Unauthenticated),
        1
    );
}

// =============================================================================
// Authentication routes
// =============================================================================

#[tokio::test]
async fn protected_resource_requires_session() {
    let app = TestApp::new();

    let response = app.get("/api/protected/resource", None).await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(
        response.body,
        json!({
            "ok": false,
            "error": "Unauthenticated",
            "message": "authentication required"
        })
    );

    let response = app.get("/api/protected/resource", Some(CUSTOMER_TOKEN)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["ok"], true);
    assert_eq!(response.body["userRole"], "customer");
}

#[tokio::test]
async fn session_cookie_is_accepted() {
    let app = TestApp::new();
    let request = Request::get("/api/protected/resource")
        .header(header::COOKIE, format!("theme=dark; sb-access-token={OPERATOR_TOKEN}"))
        .body(Body::empty())
        .unwrap();

    let response = app.request(request).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["userId"], OPERATOR_ID.to_string());
}

#[tokio::test]
async fn operator_only_route() {
    let app = TestApp::new();

    let response = app.get("/api/operator-only", Some(CUSTOMER_TOKEN)).await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["error"], "Forbidden");
    assert_eq!(response.body["message"], "requires operator role");

    let response = app.get("/api/operator-only", Some(OPERATOR_TOKEN)).await;
    assert_eq!(response.status, StatusCode::OK);

    let response = app.get("/api/operator-only", Some(ADMIN_TOKEN)).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["userId"], ADMIN_ID.to_string());
}

#[tokio::test]
async fn auth_and_validation_route() {
    let app = TestApp::new();

    let response = app
        .post_json("/api/auth/protected", Some(CUSTOMER_TOKEN), json!({ "action": "ping" }))
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["action"], "ping");
    assert_eq!(response.body["userRole"], "customer");

    let response = app
        .post_json("/api/auth/protected", Some(CUSTOMER_TOKEN), json!({ "action": "pong" }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["fieldErrors"]["action"], "must be \"ping\"");

    let response = app
        .request(post_raw("/api/auth/protected", Some(CUSTOMER_TOKEN), "ping"))
        .await;
    assert_eq!(response.body["error"], "MalformedPayload");

    // GET documents the contract and is not gated
    let response = app.get("/api/auth/protected", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert!(response.body["info"].as_str().unwrap().contains("ping"));
}

// =============================================================================
// Gated business routes
// =============================================================================

#[tokio::test]
async fn payments_are_admin_only() {
    let app = TestApp::new();
    let payment = json!({
        "invoiceId": Uuid::from_u128(42).to_string(),
        "amount": "1500.50",
        "paymentMode": "upi",
        "reference": "UTR-99812"
    });

    let response = app
        .post_json("/api/payments", Some(OPERATOR_TOKEN), payment.clone())
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["message"], "requires admin role");

    let response = app.post_json("/api/payments", Some(ADMIN_TOKEN), payment).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["payment"]["amount"], 1500.5);
    assert_eq!(response.body["payment"]["paymentMode"], "upi");
    assert_eq!(response.body["recordedBy"], ADMIN_ID.to_string());
    assert_eq!(response.header("x-ratelimit-limit"), Some("10"));
}

#[tokio::test]
async fn payment_validation_collects_every_field() {
    let app = TestApp::new();

    let response = app
        .post_json(
            "/api/payments",
            Some(ADMIN_TOKEN),
            json!({ "invoiceId": "INV-1", "amount": 0, "paymentMode": "barter" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);

    let errors = response.body["fieldErrors"].as_object().unwrap();
    assert_eq!(errors.len(), 3);
    assert_eq!(errors["invoiceId"], "must be a valid UUID");
    assert_eq!(errors["amount"], "Value must be greater than 0");
    assert_eq!(
        errors["paymentMode"],
        "must be one of: cash, bank_transfer, upi, cheque"
    );
}

#[tokio::test]
async fn shipment_defaults_are_applied() {
    let app = TestApp::new();

    let response = app
        .post_json(
            "/api/shipments",
            Some(OPERATOR_TOKEN),
            json!({
                "shipmentRef": "SHP-1001",
                "customerId": "cust-7",
                "origin": "Mumbai",
                "destination": "Delhi",
                "weight": 12.5
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);

    let shipment = &response.body["shipment"];
    assert_eq!(shipment["pieces"], 1);
    assert_eq!(shipment["serviceType"], "standard");
    assert_eq!(shipment["weight"], 12.5);
    assert_eq!(response.body["createdBy"], OPERATOR_ID.to_string());
}

#[tokio::test]
async fn customer_update_requires_operator() {
    let app = TestApp::new();
    let id = Uuid::from_u128(7).to_string();

    let response = app
        .post_json("/api/customers/update", Some(CUSTOMER_TOKEN), json!({ "id": id }))
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);

    let response = app
        .post_json(
            "/api/customers/update",
            Some(OPERATOR_TOKEN),
            json!({ "id": id, "name": " Asha Cargo ", "email": "", "phone": "+919812345678" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["customer"]["name"], "Asha Cargo");
    assert!(response.body["customer"]["email"].is_null());
    assert_eq!(response.body["customer"]["phone"], "+919812345678");

    let response = app
        .post_json(
            "/api/customers/update",
            Some(OPERATOR_TOKEN),
            json!({ "id": id, "phone": "call me" }),
        )
        .await;
    assert_eq!(
        response.body["fieldErrors"]["phone"],
        "Invalid phone number format"
    );
}

#[tokio::test]
async fn invoice_queue_runs_all_three_gates() {
    let app = TestApp::new();
    let invoice_id = Uuid::from_u128(99).to_string();

    let response = app
        .post_json("/api/invoices/queue", None, json!({ "invoiceId": invoice_id }))
        .await;
    assert_eq!(response.status, StatusCode::UNAUTHORIZED);
    assert_eq!(response.header("x-ratelimit-remaining"), Some("9"));

    let response = app
        .post_json(
            "/api/invoices/queue",
            Some(CUSTOMER_TOKEN),
            json!({ "invoiceId": invoice_id }),
        )
        .await;
    assert_eq!(response.status, StatusCode::FORBIDDEN);
    assert_eq!(response.body["message"], "requires one of: admin, operator");

    let response = app
        .post_json(
            "/api/invoices/queue",
            Some(OPERATOR_TOKEN),
            json!({ "invoiceId": "INV-2024-001" }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["fieldErrors"]["invoiceId"], "Invalid invoice ID");

    for token in [OPERATOR_TOKEN, ADMIN_TOKEN] {
        let response = app
            .post_json("/api/invoices/queue", Some(token), json!({ "invoiceId": invoice_id }))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["message"], "Invoice generation queued");
        assert_eq!(response.body["invoiceId"], invoice_id);
        assert!(Uuid::parse_str(response.body["jobId"].as_str().unwrap()).is_ok());
    }
}

#[tokio::test]
async fn invoice_line_items_report_nested_paths() {
    let app = TestApp::new();

    let response = app
        .post_json(
            "/api/invoices",
            Some(OPERATOR_TOKEN),
            json!({
                "invoiceRef": "INV-1001",
                "customerId": "cust-7",
                "amount": 2400,
                "items": [
                    { "description": "Freight", "amount": 2000 },
                    { "description": "", "amount": -5 }
                ]
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    let errors = response.body["fieldErrors"].as_object().unwrap();
    assert_eq!(errors.len(), 2);
    assert!(errors.contains_key("items.1.description"));
    assert_eq!(errors["items.1.amount"], "Value must be greater than 0");

    let response = app
        .post_json(
            "/api/invoices",
            Some(ADMIN_TOKEN),
            json!({
                "invoiceRef": "INV-1001",
                "customerId": "cust-7",
                "amount": 2400,
                "items": [{ "description": "Freight", "amount": 2400 }]
            }),
        )
        .await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["invoice"]["status"], "pending");
    assert_eq!(response.body["invoice"]["items"][0]["description"], "Freight");
    assert_eq!(response.body["createdBy"], ADMIN_ID.to_string());
}

// =============================================================================
// Validation-only routes
// =============================================================================

#[tokio::test]
async fn simulation_needs_no_session() {
    let app = TestApp::new();

    for path in ["/api/simulation", "/api/validation-test"] {
        let response = app
            .post_json(path, None, json!({ "name": "load", "value": 3.5, "tags": ["a"] }))
            .await;
        assert_eq!(response.status, StatusCode::OK);
        assert_eq!(response.body["message"], "Validation successful");
        assert_eq!(
            response.body["data"],
            json!({ "name": "load", "value": 3.5, "tags": ["a"] })
        );
        assert!(response.header("x-ratelimit-limit").is_none());
    }

    let response = app
        .post_json("/api/simulation", None, json!({ "name": "load", "value": -1 }))
        .await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["error"], "ValidationFailed");
    assert_eq!(response.body["fieldErrors"]["value"], "Value must be positive");
    assert_eq!(app.provider.calls(), 0);
}

// =============================================================================
// Rate-limited routes
// =============================================================================

#[tokio::test]
async fn rate_limit_demo_rejects_after_quota() {
    let app = TestApp::new();

    for _ in 0..10 {
        let response = app.get("/api/endpoint-to-test-rate-limit", None).await;
        assert_eq!(response.status, StatusCode::OK);
    }

    let response = app
        .request(post_raw("/api/endpoint-to-test-rate-limit", None, "{}"))
        .await;
    assert_eq!(response.status, StatusCode::TOO_MANY_REQUESTS);
    assert_eq!(response.body["error"], "RateLimited");
    assert!(response.body["retryAfterSeconds"].as_u64().unwrap() >= 1);
    assert!(response.header("retry-after").is_some());
}

#[tokio::test]
async fn public_tracking_validates_query() {
    let app = TestApp::new();

    let response = app.get("/api/public/track", None).await;
    assert_eq!(response.status, StatusCode::BAD_REQUEST);
    assert_eq!(response.body["fieldErrors"]["query"], "is required");

    let response = app.get("/api/public/track?query=SHP-1001", None).await;
    assert_eq!(response.status, StatusCode::OK);
    assert_eq!(response.body["query"], "SHP-1001");
    assert_eq!(response.header("x-ratelimit-limit"), Some("30"));
    assert_eq!(response.header("x-ratelimit-remaining"), Some("28"));

    // Absolute reset time in Unix milliseconds, within the 60s window
    let reset_at: i64 = response.header("x-ratelimit-reset").unwrap().parse().unwrap();
    let now = chrono::Utc::now().timestamp_millis();
    assert!(reset_at > now && reset_at <= now + 61_000);
}
