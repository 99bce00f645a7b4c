mod common;

use axum::http::{Method, StatusCode};
use chrono::Utc;
use common::{body_json, shipping_address, TestApp};
use meatshop_api::{
    entities::order::OrderStatus,
    payment_gateway::{gateway_order_id, SIGNATURE_HEADER, TIMESTAMP_HEADER},
};
use rust_decimal_macros::dec;
use serde_json::{json, Value};
use uuid::Uuid;

async fn pending_order(app: &TestApp) -> Uuid {
    let buyer = app.create_user("hook@example.com", false).await;
    let product = app.seed_product("Mutton", dec!(200)).await;
    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({
                "orderItems": [{ "product": product.id, "quantity": 1 }],
                "shippingAddress": shipping_address(),
                "paymentMethod": "cashfree"
            })),
            Some(&buyer.token),
        )
        .await;
    body_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .parse()
        .unwrap()
}

fn notification(order_id: Uuid, status: &str) -> Value {
    json!({
        "order_id": gateway_order_id(order_id),
        "order_status": status,
        "cf_payment_id": 885473311,
        "payment_time": "2024-03-01T10:00:00+05:30",
        "customer_details": { "customer_email": "hook@example.com" }
    })
}

#[tokio::test]
async fn paid_notification_places_the_order() {
    let app = TestApp::new().await;
    let order_id = pending_order(&app).await;

    let response = app.signed_webhook(&notification(order_id, "PAID")).await;
    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    assert_eq!(body["data"]["outcome"], "applied");
    assert_eq!(body["data"]["status"], "order_placed");

    let order = app.order(order_id).await;
    assert_eq!(order.status, OrderStatus::OrderPlaced);
    assert!(order.is_paid);
    assert!(order.paid_at.is_some());
    let result = order.payment_result.expect("payment result recorded");
    assert_eq!(result.payment_id, "885473311");
    assert_eq!(result.status, "PAID");
    assert_eq!(result.email_address.as_deref(), Some("hook@example.com"));
}

#[tokio::test]
async fn duplicate_paid_notification_changes_nothing() {
    let app = TestApp::new().await;
    let order_id = pending_order(&app).await;

    app.signed_webhook(&notification(order_id, "PAID")).await;
    let first = app.order(order_id).await;

    let response = app.signed_webhook(&notification(order_id, "PAID")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["outcome"], "duplicate");

    let second = app.order(order_id).await;
    assert_eq!(second.status, first.status);
    assert_eq!(second.is_paid, first.is_paid);
    assert_eq!(second.paid_at, first.paid_at);
    assert_eq!(second.updated_at, first.updated_at);
}

#[tokio::test]
async fn late_failure_or_pending_does_not_regress_a_paid_order() {
    let app = TestApp::new().await;
    let order_id = pending_order(&app).await;

    app.signed_webhook(&notification(order_id, "PAID")).await;

    for status in ["FAILED", "PENDING"] {
        let response = app.signed_webhook(&notification(order_id, status)).await;
        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(body_json(response).await["data"]["outcome"], "ignored");
    }

    let order = app.order(order_id).await;
    assert_eq!(order.status, OrderStatus::OrderPlaced);
    assert!(order.is_paid);
}

#[tokio::test]
async fn failure_then_success_ends_paid() {
    let app = TestApp::new().await;
    let order_id = pending_order(&app).await;

    let failed = app.signed_webhook(&notification(order_id, "FAILED")).await;
    assert_eq!(body_json(failed).await["data"]["status"], "payment_failed");
    assert_eq!(app.order(order_id).await.status, OrderStatus::PaymentFailed);
    assert!(!app.order(order_id).await.is_paid);

    let paid = app.signed_webhook(&notification(order_id, "PAID")).await;
    assert_eq!(body_json(paid).await["data"]["outcome"], "applied");
    let order = app.order(order_id).await;
    assert_eq!(order.status, OrderStatus::OrderPlaced);
    assert!(order.is_paid);
}

#[tokio::test]
async fn paid_notification_does_not_rewind_fulfillment() {
    let app = TestApp::new().await;
    let order_id = pending_order(&app).await;
    app.signed_webhook(&notification(order_id, "PAID")).await;

    app.state
        .services
        .order_status
        .update_status(order_id, OrderStatus::Shipped)
        .await
        .unwrap();

    let response = app.signed_webhook(&notification(order_id, "PAID")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.order(order_id).await.status, OrderStatus::Shipped);
}

#[tokio::test]
async fn cashfree_envelope_is_accepted() {
    let app = TestApp::new().await;
    let order_id = pending_order(&app).await;

    let response = app
        .signed_webhook(&json!({
            "type": "PAYMENT_SUCCESS_WEBHOOK",
            "event_time": "2024-03-01T10:00:05+05:30",
            "data": {
                "order": { "order_id": gateway_order_id(order_id), "order_amount": 200 },
                "payment": { "cf_payment_id": 42, "payment_status": "SUCCESS" },
                "customer_details": { "customer_email": "hook@example.com" }
            }
        }))
        .await;

    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(app.order(order_id).await.status, OrderStatus::OrderPlaced);
}

#[tokio::test]
async fn missing_or_wrong_signature_is_rejected() {
    let app = TestApp::new().await;
    let order_id = pending_order(&app).await;
    let raw = serde_json::to_vec(&notification(order_id, "PAID")).unwrap();

    let unsigned = app.raw_webhook(raw.clone(), &[]).await;
    assert_eq!(unsigned.status(), StatusCode::UNAUTHORIZED);

    let timestamp = Utc::now().timestamp().to_string();
    let forged = app
        .raw_webhook(
            raw.clone(),
            &[
                (TIMESTAMP_HEADER, timestamp.as_str()),
                (SIGNATURE_HEADER, "bm90IGEgcmVhbCBzaWduYXR1cmU="),
            ],
        )
        .await;
    assert_eq!(forged.status(), StatusCode::UNAUTHORIZED);

    // Valid signature over a different body
    let signature = app
        .state
        .webhook_verifier
        .sign(&timestamp, b"{}")
        .unwrap();
    let tampered = app
        .raw_webhook(
            raw,
            &[
                (TIMESTAMP_HEADER, timestamp.as_str()),
                (SIGNATURE_HEADER, signature.as_str()),
            ],
        )
        .await;
    assert_eq!(tampered.status(), StatusCode::UNAUTHORIZED);

    let order = app.order(order_id).await;
    assert_eq!(order.status, OrderStatus::PaymentPending);
    assert!(!order.is_paid);
}

#[tokio::test]
async fn stale_timestamp_is_rejected() {
    let app = TestApp::new().await;
    let order_id = pending_order(&app).await;
    let raw = serde_json::to_vec(&notification(order_id, "PAID")).unwrap();

    let timestamp = (Utc::now().timestamp() - 3600).to_string();
    let signature = app.state.webhook_verifier.sign(&timestamp, &raw).unwrap();
    let response = app
        .raw_webhook(
            raw,
            &[
                (TIMESTAMP_HEADER, timestamp.as_str()),
                (SIGNATURE_HEADER, signature.as_str()),
            ],
        )
        .await;

    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    assert!(!app.order(order_id).await.is_paid);
}

#[tokio::test]
async fn malformed_payload_is_bad_request() {
    let app = TestApp::new().await;
    let response = app.signed_webhook(&json!({ "order_status": "PAID" })).await;
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn unknown_order_is_acknowledged() {
    let app = TestApp::new().await;
    let response = app
        .signed_webhook(&notification(Uuid::new_v4(), "PAID"))
        .await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["data"]["outcome"], "unknown_order");
}

#[tokio::test]
async fn unsupported_status_is_acknowledged_without_change() {
    let app = TestApp::new().await;
    let order_id = pending_order(&app).await;

    let response = app.signed_webhook(&notification(order_id, "EXPIRED")).await;
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(
        body_json(response).await["data"]["outcome"],
        "unsupported_status"
    );
    assert_eq!(app.order(order_id).await.status, OrderStatus::PaymentPending);
}

#[tokio::test]
async fn concurrent_duplicate_deliveries_apply_once() {
    let app = TestApp::new().await;
    let order_id = pending_order(&app).await;
    let body = notification(order_id, "PAID");

    let (a, b) = tokio::join!(app.signed_webhook(&body), app.signed_webhook(&body));
    assert_eq!(a.status(), StatusCode::OK);
    assert_eq!(b.status(), StatusCode::OK);

    let outcomes = [
        body_json(a).await["data"]["outcome"].clone(),
        body_json(b).await["data"]["outcome"].clone(),
    ];
    assert_eq!(outcomes.iter().filter(|o| *o == "applied").count(), 1);
    assert_eq!(outcomes.iter().filter(|o| *o == "duplicate").count(), 1);
}

#[tokio::test]
async fn unapplied_notification_is_a_server_error_so_it_is_redelivered() {
    let app = TestApp::new().await;
    let order_id = pending_order(&app).await;

    // Every write to the order is silently skipped.
    app.exec(
        "CREATE TRIGGER freeze_orders BEFORE UPDATE ON orders \
         BEGIN SELECT RAISE(IGNORE); END",
    )
    .await;

    let response = app.signed_webhook(&notification(order_id, "PAID")).await;
    assert_eq!(response.status(), StatusCode::INTERNAL_SERVER_ERROR);

    app.exec("DROP TRIGGER freeze_orders").await;
    let order = app.order(order_id).await;
    assert_eq!(order.status, OrderStatus::PaymentPending);
    assert!(!order.is_paid);

    let retried = app.signed_webhook(&notification(order_id, "PAID")).await;
    assert_eq!(body_json(retried).await["data"]["outcome"], "applied");
}
