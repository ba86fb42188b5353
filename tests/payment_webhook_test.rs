mod common;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use common::{checkout_event, response_json, TestApp, TEST_WEBHOOK_SECRET};
use rust_decimal_macros::dec;
use sea_orm::{EntityTrait, PaginatorTrait};
use serde_json::json;
use storefront_api::{entities::order, webhooks::SignatureVerifier};

fn cart_metadata(cart: serde_json::Value) -> serde_json::Value {
    json!({
        "cart": serde_json::to_string(&cart).unwrap(),
        "payment_method": "card",
        "delivery_type": "delivery",
        "shipping_cost": "5.00",
    })
}

async fn order_count(app: &TestApp) -> u64 {
    order::Entity::find()
        .count(&*app.state.db)
        .await
        .expect("count orders")
}

#[tokio::test]
async fn valid_signature_creates_order() {
    let app = TestApp::new().await;
    app.seed_customer("buyer@example.com").await;
    let product = app.seed_product("Oak Table", dec!(120.00)).await;

    let payload = checkout_event(
        "cs_valid_sig",
        Some("buyer@example.com"),
        Some(12_500),
        cart_metadata(json!([
            {"id": product.id, "name": "Oak Table", "price": "120.00", "quantity": 1}
        ])),
    );

    let response = app.post_signed_webhook(&payload).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(order_count(&app).await, 1);
}

#[tokio::test]
async fn combined_gateway_header_is_accepted() {
    let app = TestApp::new().await;
    app.seed_customer("buyer@example.com").await;
    let product = app.seed_product("Oak Table", dec!(120.00)).await;

    let payload = checkout_event(
        "cs_gateway_header",
        Some("buyer@example.com"),
        Some(12_500),
        cart_metadata(json!([
            {"id": product.id, "name": "Oak Table", "price": "120.00", "quantity": 1}
        ])),
    );

    let body = serde_json::to_vec(&payload).unwrap();
    let timestamp = Utc::now().timestamp().to_string();
    let signature = SignatureVerifier::new(TEST_WEBHOOK_SECRET, 300).sign(&timestamp, &body);
    let combined = format!("t={timestamp},v1={signature}");

    let response = app
        .post_webhook_raw(body, &[("stripe-signature", &combined)])
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(order_count(&app).await, 1);
}

#[tokio::test]
async fn invalid_signature_is_rejected_without_side_effects() {
    let app = TestApp::new().await;
    app.seed_customer("buyer@example.com").await;
    let product = app.seed_product("Oak Table", dec!(120.00)).await;

    let payload = checkout_event(
        "cs_bad_sig",
        Some("buyer@example.com"),
        Some(12_500),
        cart_metadata(json!([
            {"id": product.id, "name": "Oak Table", "price": "120.00", "quantity": 1}
        ])),
    );

    let body = serde_json::to_vec(&payload).unwrap();
    let timestamp = Utc::now().timestamp().to_string();
    let response = app
        .post_webhook_raw(
            body,
            &[
                ("x-timestamp", timestamp.as_str()),
                ("x-signature", "deadbeef"),
            ],
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let error = response_json(response).await;
    assert_eq!(error["error"], json!("Bad Request"));
    assert!(
        error["message"]
            .as_str()
            .unwrap_or_default()
            .contains("signature"),
        "unexpected error body: {error}"
    );
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn missing_signature_headers_are_rejected() {
    let app = TestApp::new().await;

    let payload = checkout_event("cs_no_headers", Some("buyer@example.com"), None, json!({}));
    let body = serde_json::to_vec(&payload).unwrap();

    let response = app.post_webhook_raw(body, &[]).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn tampered_body_is_rejected() {
    let app = TestApp::new().await;
    app.seed_customer("buyer@example.com").await;

    let payload = checkout_event("cs_tampered", Some("buyer@example.com"), Some(1000), json!({}));
    let signed_body = serde_json::to_vec(&payload).unwrap();
    let timestamp = Utc::now().timestamp().to_string();
    let signature = SignatureVerifier::new(TEST_WEBHOOK_SECRET, 300).sign(&timestamp, &signed_body);

    let tampered = checkout_event("cs_tampered", Some("intruder@example.com"), Some(1), json!({}));
    let response = app
        .post_webhook_raw(
            serde_json::to_vec(&tampered).unwrap(),
            &[
                ("x-timestamp", timestamp.as_str()),
                ("x-signature", signature.as_str()),
            ],
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn stale_timestamp_is_rejected() {
    let app = TestApp::new().await;

    let payload = checkout_event("cs_stale", Some("buyer@example.com"), None, json!({}));
    let body = serde_json::to_vec(&payload).unwrap();
    let old_timestamp = (Utc::now().timestamp() - 3_600).to_string();
    let signature = SignatureVerifier::new(TEST_WEBHOOK_SECRET, 300).sign(&old_timestamp, &body);

    let response = app
        .post_webhook_raw(
            body,
            &[
                ("x-timestamp", old_timestamp.as_str()),
                ("x-signature", signature.as_str()),
            ],
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn garbage_payload_with_valid_signature_is_bad_request() {
    let app = TestApp::new().await;

    let body = b"not json at all".to_vec();
    let timestamp = Utc::now().timestamp().to_string();
    let signature = SignatureVerifier::new(TEST_WEBHOOK_SECRET, 300).sign(&timestamp, &body);

    let response = app
        .post_webhook_raw(
            body,
            &[
                ("x-timestamp", timestamp.as_str()),
                ("x-signature", signature.as_str()),
            ],
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unhandled_event_types_are_acknowledged_and_ignored() {
    let app = TestApp::new().await;
    app.seed_customer("buyer@example.com").await;

    let payload = json!({
        "type": "payment_intent.created",
        "data": {
            "object": {
                "id": "cs_ignored_type",
                "customer_email": "buyer@example.com",
                "metadata": {},
            }
        }
    });

    let response = app.post_signed_webhook(&payload).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn unknown_customer_is_acknowledged_without_order() {
    let app = TestApp::new().await;
    let product = app.seed_product("Oak Table", dec!(120.00)).await;

    let payload = checkout_event(
        "cs_no_customer",
        Some("nobody@example.com"),
        Some(12_000),
        cart_metadata(json!([
            {"id": product.id, "name": "Oak Table", "price": "120.00", "quantity": 1}
        ])),
    );

    let response = app.post_signed_webhook(&payload).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(order_count(&app).await, 0);
}

#[tokio::test]
async fn order_lookup_requires_existing_transaction() {
    let app = TestApp::new().await;

    let response = app
        .request(
            Method::GET,
            "/api/v1/orders/by-transaction/cs_never_seen",
            None,
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let error = response_json(response).await;
    assert_eq!(error["error"], json!("Not Found"));
}
