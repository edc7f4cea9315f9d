//! Order lifecycle: cancellation windows, fulfillment transitions, and
//! snapshot isolation from later address edits.

mod common;

use axum::http::Method;
use common::{response_json, seed_card, seed_cart, seed_shipping_address, TestApp};
use serde_json::json;
use storefront_api::entities::order::OrderStatus;
use uuid::Uuid;

async fn place_test_order(app: &TestApp) -> (Uuid, Uuid, Uuid) {
    let (customer_id, cart_id) = seed_cart(app, "25.00", 1).await;
    let shipping_id = seed_shipping_address(app, customer_id).await;
    let card_id = seed_card(app, customer_id, "4242424242424242").await;

    let session = app
        .state
        .services
        .checkout
        .start_checkout(customer_id, cart_id)
        .await
        .expect("start checkout");
    app.state
        .services
        .checkout
        .set_addresses(
            customer_id,
            session.id,
            serde_json::from_value(json!({ "shipping_address_id": shipping_id })).unwrap(),
        )
        .await
        .expect("set addresses");
    app.state
        .services
        .checkout
        .set_payment_method(
            customer_id,
            session.id,
            serde_json::from_value(json!({ "payment_method_id": card_id })).unwrap(),
        )
        .await
        .expect("set payment method");
    let order = app
        .state
        .services
        .checkout
        .place_order(customer_id, session.id)
        .await
        .expect("place order");

    (customer_id, order.id, shipping_id)
}

#[tokio::test]
async fn pending_order_can_be_cancelled() {
    let app = TestApp::new().await;
    let (customer_id, order_id, _) = place_test_order(&app).await;

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/cancel"),
            Some(json!({ "customer_id": customer_id })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "cancelled");

    // Terminal: cancelling again is rejected.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/orders/{order_id}/cancel"),
            Some(json!({ "customer_id": customer_id })),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn shipped_order_cannot_be_cancelled() {
    let app = TestApp::new().await;
    let (customer_id, order_id, _) = place_test_order(&app).await;

    app.state
        .services
        .orders
        .update_order_status(order_id, OrderStatus::Processing)
        .await
        .expect("to processing");
    app.state
        .services
        .orders
        .update_order_status(order_id, OrderStatus::Shipped)
        .await
        .expect("to shipped");

    let err = app
        .state
        .services
        .orders
        .cancel_order(customer_id, order_id)
        .await
        .expect_err("shipped orders cannot be cancelled");
    assert!(err.to_string().contains("cannot be cancelled"));
}

#[tokio::test]
async fn status_transitions_must_follow_the_lifecycle() {
    let app = TestApp::new().await;
    let (_, order_id, _) = place_test_order(&app).await;

    // Skipping processing is rejected.
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{order_id}/status"),
            Some(json!({ "status": "shipped" })),
        )
        .await;
    assert_eq!(response.status(), 400);

    // Forward one step at a time works.
    for status in ["processing", "shipped", "delivered"] {
        let response = app
            .request(
                Method::PUT,
                &format!("/api/v1/orders/{order_id}/status"),
                Some(json!({ "status": status })),
            )
            .await;
        assert_eq!(response.status(), 200, "transition to {status}");
    }

    // Delivered is terminal.
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/orders/{order_id}/status"),
            Some(json!({ "status": "processing" })),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn order_snapshot_survives_address_edits() {
    let app = TestApp::new().await;
    let (customer_id, order_id, shipping_id) = place_test_order(&app).await;

    // Rewrite the address the order was shipped to.
    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/customers/{customer_id}/addresses/{shipping_id}"),
            Some(json!({ "city": "Manchester" })),
        )
        .await;
    assert_eq!(response.status(), 200);

    // The order still shows the city captured at placement time.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/{order_id}?customer_id={customer_id}"),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["shipping_address"]["city"], "London");
}

#[tokio::test]
async fn orders_are_listed_newest_first_with_pagination() {
    let app = TestApp::new().await;
    let (customer_id, first_order, _) = place_test_order(&app).await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders?customer_id={customer_id}&page=1&limit=10"),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["total"], 1);
    assert_eq!(body["data"]["items"][0]["id"], first_order.to_string());

    // Lookup by human-facing number round-trips.
    let order_number = body["data"]["items"][0]["order_number"]
        .as_str()
        .unwrap()
        .to_string();
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/orders/by-number/{order_number}?customer_id={customer_id}"),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["id"], first_order.to_string());
}
