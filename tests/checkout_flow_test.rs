//! End-to-end checkout flow: cart, addresses, tokenized card, review,
//! place-order, and the declined-payment path.

mod common;

use axum::http::Method;
use common::{response_json, seed_card, seed_cart, seed_shipping_address, TestApp};
use rust_decimal::Decimal;
use rust_decimal_macros::dec;
use serde_json::json;
use uuid::Uuid;

// SQLite strips trailing zeros from stored decimals, so money fields are
// compared as `Decimal`, not as strings.
fn money(value: &serde_json::Value) -> Decimal {
    serde_json::from_value(value.clone()).expect("decimal value")
}

#[tokio::test]
async fn happy_path_checkout_places_an_order() {
    let app = TestApp::new().await;
    let (customer_id, cart_id) = seed_cart(&app, "30.00", 2).await;
    let shipping_id = seed_shipping_address(&app, customer_id).await;
    let card_id = seed_card(&app, customer_id, "4242 4242 4242 4242").await;

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(json!({ "customer_id": customer_id, "cart_id": cart_id })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    let session_id = body["data"]["id"].as_str().unwrap().to_string();

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/checkout/{session_id}/addresses"),
            Some(json!({
                "customer_id": customer_id,
                "shipping_address_id": shipping_id
            })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["step"], "payment");

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/checkout/{session_id}/payment-method"),
            Some(json!({
                "customer_id": customer_id,
                "payment_method_id": card_id
            })),
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(body["data"]["step"], "review");

    // 60.00 subtotal ships free; tax is 4.80.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/checkout/{session_id}/review?customer_id={customer_id}"),
            None,
        )
        .await;
    assert_eq!(response.status(), 200);
    let body = response_json(response).await;
    assert_eq!(money(&body["data"]["summary"]["subtotal"]), dec!(60.00));
    assert_eq!(money(&body["data"]["summary"]["shipping"]), dec!(0));
    assert_eq!(money(&body["data"]["summary"]["tax"]), dec!(4.80));
    assert_eq!(money(&body["data"]["summary"]["total"]), dec!(64.80));
    assert_eq!(body["data"]["payment_method"]["last4"], "4242");

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/{session_id}/place-order"),
            Some(json!({ "customer_id": customer_id })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    let order = &body["data"];
    assert_eq!(order["status"], "pending");
    assert_eq!(money(&order["total"]), dec!(64.80));
    assert!(order["order_number"]
        .as_str()
        .unwrap()
        .starts_with("ORD-"));
    // Order embeds the address snapshot, not a reference.
    assert_eq!(order["shipping_address"]["city"], "London");
    let order_id = order["id"].as_str().unwrap().to_string();

    // Session is completed and linked to the order.
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/checkout/{session_id}?customer_id={customer_id}"),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["step"], "completed");
    assert_eq!(body["data"]["order_id"], order_id.as_str());

    // Cart was converted.
    let response = app
        .request(Method::GET, &format!("/api/v1/carts/{cart_id}"), None)
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["status"], "converted");

    // Placing again is idempotent: same order comes back, no duplicate.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/{session_id}/place-order"),
            Some(json!({ "customer_id": customer_id })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    assert_eq!(body["data"]["id"], order_id.as_str());
}

#[tokio::test]
async fn declined_card_returns_session_to_review_without_an_order() {
    let app = TestApp::new().await;
    let (customer_id, cart_id) = seed_cart(&app, "20.00", 1).await;
    seed_shipping_address(&app, customer_id).await;
    // 4000 0000 0000 0002 always declines.
    let card_id = seed_card(&app, customer_id, "4000000000000002").await;

    let session = app
        .state
        .services
        .checkout
        .start_checkout(customer_id, cart_id)
        .await
        .expect("start checkout");
    let session_id = session.id;

    let shipping_id = seed_shipping_address(&app, customer_id).await;
    app.state
        .services
        .checkout
        .set_addresses(
            customer_id,
            session_id,
            serde_json::from_value(json!({ "shipping_address_id": shipping_id })).unwrap(),
        )
        .await
        .expect("set addresses");
    app.state
        .services
        .checkout
        .set_payment_method(
            customer_id,
            session_id,
            serde_json::from_value(json!({ "payment_method_id": card_id })).unwrap(),
        )
        .await
        .expect("set payment method");

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/{session_id}/place-order"),
            Some(json!({ "customer_id": customer_id })),
        )
        .await;
    assert_eq!(response.status(), 402);

    // Session parked back at review with the decline recorded.
    let session = app
        .state
        .services
        .checkout
        .get_session(customer_id, session_id)
        .await
        .expect("session still readable");
    assert_eq!(
        session.step,
        storefront_api::entities::checkout_session::CheckoutStep::Review
    );
    assert!(session.last_error.is_some());
    assert!(session.order_id.is_none());

    // No order was created.
    let (orders, total) = app
        .state
        .services
        .orders
        .list_orders(customer_id, 1, 20)
        .await
        .expect("list orders");
    assert_eq!(total, 0);
    assert!(orders.is_empty());
}

#[tokio::test]
async fn empty_cart_cannot_start_checkout() {
    let app = TestApp::new().await;
    let customer_id = uuid::Uuid::new_v4();
    let cart = app
        .state
        .services
        .carts
        .create_cart(customer_id, "USD")
        .await
        .expect("create cart");

    let response = app
        .request(
            Method::POST,
            "/api/v1/checkout",
            Some(json!({ "customer_id": customer_id, "cart_id": cart.id })),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn below_threshold_cart_pays_flat_shipping() {
    let app = TestApp::new().await;
    let (customer_id, cart_id) = seed_cart(&app, "40.00", 1).await;
    let shipping_id = seed_shipping_address(&app, customer_id).await;
    let card_id = seed_card(&app, customer_id, "4242424242424242").await;

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

    let review = app
        .state
        .services
        .checkout
        .review(customer_id, session.id)
        .await
        .expect("review");
    assert_eq!(review.summary.shipping, dec!(9.99));
    assert_eq!(review.summary.tax, dec!(3.20));
    assert_eq!(review.summary.total, dec!(53.19));
    // 5319 cents goes to the gateway.
    assert_eq!(review.summary.amount_minor(), 5319);
}

#[tokio::test]
async fn reconciliation_sweep_finds_charged_intents_without_orders() {
    use chrono::Utc;
    use sea_orm::{ActiveModelTrait, Set};
    use storefront_api::entities::payment_intent::{self, PaymentIntentStatus};

    let app = TestApp::new().await;
    let (customer_id, cart_id) = seed_cart(&app, "30.00", 2).await;
    seed_shipping_address(&app, customer_id).await;
    let card_id = seed_card(&app, customer_id, "4242424242424242").await;

    let checkout = &app.state.services.checkout;
    let session = checkout
        .start_checkout(customer_id, cart_id)
        .await
        .expect("start checkout");
    checkout
        .set_payment_method(
            customer_id,
            session.id,
            serde_json::from_value(json!({ "payment_method_id": card_id })).unwrap(),
        )
        .await
        .expect("set payment method");
    checkout
        .place_order(customer_id, session.id)
        .await
        .expect("place order");

    // A cleanly placed order leaves nothing behind.
    let orphans = app
        .state
        .services
        .payment_intents
        .find_orphaned_intents()
        .await
        .expect("sweep");
    assert!(orphans.is_empty());

    // A charge that crashed before order creation: succeeded, no order.
    let now = Utc::now();
    let orphan_id = Uuid::new_v4();
    payment_intent::ActiveModel {
        id: Set(orphan_id),
        checkout_session_id: Set(Uuid::new_v4()),
        idempotency_key: Set(format!("co_{}", Uuid::new_v4().simple())),
        client_secret: Set(format!("pi_secret_{}", Uuid::new_v4().simple())),
        amount_minor: Set(6480),
        currency: Set("USD".to_string()),
        status: Set(PaymentIntentStatus::Succeeded),
        order_id: Set(None),
        last_error: Set(None),
        created_at: Set(now),
        updated_at: Set(now),
    }
    .insert(&*app.state.db)
    .await
    .expect("insert stranded intent");

    let orphans = app
        .state
        .services
        .payment_intents
        .find_orphaned_intents()
        .await
        .expect("sweep");
    assert_eq!(orphans.len(), 1);
    assert_eq!(orphans[0].id, orphan_id);
}

#[tokio::test]
async fn conflicting_retry_returns_the_session_to_review() {
    let app = TestApp::new().await;
    let (customer_id, cart_id) = seed_cart(&app, "20.00", 1).await;
    seed_shipping_address(&app, customer_id).await;
    seed_card(&app, customer_id, "4000 0000 0000 0002").await;

    let checkout = &app.state.services.checkout;
    let session = checkout
        .start_checkout(customer_id, cart_id)
        .await
        .expect("start checkout");
    let card_id = session.payment_method_id.expect("default card prefilled");
    checkout
        .set_payment_method(
            customer_id,
            session.id,
            serde_json::from_value(json!({ "payment_method_id": card_id })).unwrap(),
        )
        .await
        .expect("set payment method");

    // First attempt charges the declining card: the intent is persisted
    // against the session's key at the original amount.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/{}/place-order", session.id),
            Some(json!({ "customer_id": customer_id })),
        )
        .await;
    assert_eq!(response.status(), 402);

    // The cart total changes underneath the retried key.
    app.state
        .services
        .carts
        .add_item(
            cart_id,
            serde_json::from_value(json!({
                "product_id": Uuid::new_v4(),
                "name": "Extra Item",
                "quantity": 1,
                "unit_price": "5.00",
            }))
            .unwrap(),
        )
        .await
        .expect("add cart item");

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/checkout/{}/place-order", session.id),
            Some(json!({ "customer_id": customer_id })),
        )
        .await;
    assert_eq!(response.status(), 409);

    // The session is back at review, not stranded at processing, so the
    // customer can still edit it.
    let response = app
        .request(
            Method::GET,
            &format!(
                "/api/v1/checkout/{}?customer_id={customer_id}",
                session.id
            ),
            None,
        )
        .await;
    let body = response_json(response).await;
    assert_eq!(body["data"]["step"], "review");
    assert!(body["data"]["last_error"].as_str().is_some());

    checkout
        .set_payment_method(
            customer_id,
            session.id,
            serde_json::from_value(json!({ "payment_method_id": card_id })).unwrap(),
        )
        .await
        .expect("session must stay editable after a conflicting retry");
}
