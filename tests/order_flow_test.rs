mod common;

use axum::http::{Method, StatusCode};
use common::{body_json, decimal, shipping_address, TestApp};
use meatshop_api::{
    entities::order::OrderStatus,
    services::cart::AddToCartRequest,
};
use rust_decimal_macros::dec;
use serde_json::json;

#[tokio::test]
async fn order_total_comes_from_catalog_not_client() {
    let app = TestApp::new().await;
    let buyer = app.create_user("buyer@example.com", false).await;
    let mutton = app.seed_product("Mutton", dec!(200)).await;
    let chicken = app.seed_product("Chicken", dec!(50)).await;

    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({
                "orderItems": [
                    { "product": mutton.id, "quantity": 2, "weight": "1kg", "price": 180 },
                    { "product": chicken.id, "quantity": 1, "weight": "500g", "price": 50 }
                ],
                "shippingAddress": shipping_address(),
                "paymentMethod": "cashfree"
            })),
            Some(&buyer.token),
        )
        .await;

    assert_eq!(response.status(), StatusCode::CREATED);
    let body = body_json(response).await;
    let data = &body["data"];
    assert_eq!(decimal(&data["total_price"]), dec!(450));
    assert_eq!(data["status"], "payment_pending");
    assert_eq!(data["is_paid"], false);
    assert_eq!(decimal(&data["items"][0]["price"]), dec!(200));
    assert_eq!(data["items"][0]["title"], "Mutton");

    let id = data["id"].as_str().unwrap().parse().unwrap();
    let stored = app.order(id).await;
    assert_eq!(stored.total_price, dec!(450));
    assert_eq!(stored.status, OrderStatus::PaymentPending);
    assert_eq!(stored.user_id, buyer.id());
    assert!(stored.paid_at.is_none());
}

#[tokio::test]
async fn placing_an_order_clears_the_cart() {
    let app = TestApp::new().await;
    let buyer = app.create_user("cart-clear@example.com", false).await;
    let mutton = app.seed_product("Mutton", dec!(200)).await;

    app.state
        .services
        .cart
        .add_item(
            buyer.id(),
            AddToCartRequest {
                product_id: mutton.id,
                quantity: 1,
                weight: "500g".into(),
            },
        )
        .await
        .unwrap();

    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({
                "order_items": [{ "product_id": mutton.id, "quantity": 1, "weight": "500g" }],
                "shipping_address": shipping_address(),
                "payment_method": "cashfree"
            })),
            Some(&buyer.token),
        )
        .await;
    assert_eq!(response.status(), StatusCode::CREATED);

    let cart = app.state.services.cart.get_cart(buyer.id()).await.unwrap();
    assert!(cart.is_empty());
}

#[tokio::test]
async fn empty_order_is_rejected() {
    let app = TestApp::new().await;
    let buyer = app.create_user("empty@example.com", false).await;

    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({
                "orderItems": [],
                "shippingAddress": shipping_address(),
                "paymentMethod": "cashfree"
            })),
            Some(&buyer.token),
        )
        .await;

    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    let orders = app.state.services.orders.list_all().await.unwrap();
    assert!(orders.is_empty());
}

#[tokio::test]
async fn unknown_product_fails_without_touching_the_cart() {
    let app = TestApp::new().await;
    let buyer = app.create_user("unknown@example.com", false).await;
    let mutton = app.seed_product("Mutton", dec!(200)).await;

    app.state
        .services
        .cart
        .add_item(
            buyer.id(),
            AddToCartRequest {
                product_id: mutton.id,
                quantity: 2,
                weight: "1kg".into(),
            },
        )
        .await
        .unwrap();

    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({
                "orderItems": [
                    { "product": mutton.id, "quantity": 1 },
                    { "product": uuid::Uuid::new_v4(), "quantity": 1 }
                ],
                "shippingAddress": shipping_address(),
                "paymentMethod": "cashfree"
            })),
            Some(&buyer.token),
        )
        .await;

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
    let cart = app.state.services.cart.get_cart(buyer.id()).await.unwrap();
    assert_eq!(cart.len(), 1);
    assert_eq!(cart[0].quantity, 2);
}

#[tokio::test]
async fn zero_quantity_and_missing_address_are_bad_requests() {
    let app = TestApp::new().await;
    let buyer = app.create_user("zero@example.com", false).await;
    let mutton = app.seed_product("Mutton", dec!(200)).await;

    let zero = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({
                "orderItems": [{ "product": mutton.id, "quantity": 0 }],
                "shippingAddress": shipping_address(),
                "paymentMethod": "cashfree"
            })),
            Some(&buyer.token),
        )
        .await;
    assert_eq!(zero.status(), StatusCode::BAD_REQUEST);

    let no_address = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({
                "orderItems": [{ "product": mutton.id, "quantity": 1 }],
                "paymentMethod": "cashfree"
            })),
            Some(&buyer.token),
        )
        .await;
    assert_eq!(no_address.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn orders_require_authentication() {
    let app = TestApp::new().await;
    let response = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({ "orderItems": [] })),
            None,
        )
        .await;
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn order_is_visible_to_owner_and_admin_only() {
    let app = TestApp::new().await;
    let owner = app.create_user("owner@example.com", false).await;
    let other = app.create_user("other@example.com", false).await;
    let admin = app.create_user("admin@example.com", true).await;
    let mutton = app.seed_product("Mutton", dec!(200)).await;

    let created = app
        .request(
            Method::POST,
            "/api/orders",
            Some(json!({
                "orderItems": [{ "product": mutton.id, "quantity": 1 }],
                "shippingAddress": shipping_address(),
                "paymentMethod": "cashfree"
            })),
            Some(&owner.token),
        )
        .await;
    let id = body_json(created).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();
    let uri = format!("/api/orders/{id}");

    let as_owner = app.request(Method::GET, &uri, None, Some(&owner.token)).await;
    assert_eq!(as_owner.status(), StatusCode::OK);

    let as_other = app.request(Method::GET, &uri, None, Some(&other.token)).await;
    assert_eq!(as_other.status(), StatusCode::FORBIDDEN);

    let as_admin = app.request(Method::GET, &uri, None, Some(&admin.token)).await;
    assert_eq!(as_admin.status(), StatusCode::OK);

    let mine = body_json(
        app.request(Method::GET, "/api/orders/mine", None, Some(&other.token))
            .await,
    )
    .await;
    assert_eq!(mine["data"].as_array().unwrap().len(), 0);

    let all_as_customer = app
        .request(Method::GET, "/api/orders", None, Some(&owner.token))
        .await;
    assert_eq!(all_as_customer.status(), StatusCode::FORBIDDEN);

    let all = body_json(
        app.request(Method::GET, "/api/orders", None, Some(&admin.token))
            .await,
    )
    .await;
    assert_eq!(all["data"].as_array().unwrap().len(), 1);
}
