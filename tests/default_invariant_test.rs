//! One default per (customer, kind): election sequences for addresses and
//! payment methods.

mod common;

use axum::http::Method;
use common::{response_json, seed_card, TestApp};
use serde_json::json;
use uuid::Uuid;

fn address_payload(kind: &str, city: &str, is_default: bool) -> serde_json::Value {
    json!({
        "kind": kind,
        "first_name": "Grace",
        "last_name": "Hopper",
        "address_line_1": "1 Harbor View",
        "city": city,
        "province": "VA",
        "postal_code": "22201",
        "country_code": "US",
        "is_default": is_default
    })
}

async fn default_count(app: &TestApp, customer_id: Uuid, kind: &str) -> usize {
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/customers/{customer_id}/addresses"),
            None,
        )
        .await;
    let body = response_json(response).await;
    body["data"]
        .as_array()
        .unwrap()
        .iter()
        .filter(|a| a["kind"] == kind && a["is_default"] == true)
        .count()
}

#[tokio::test]
async fn new_default_address_displaces_the_old_one() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    for city in ["Arlington", "Boston"] {
        let response = app
            .request(
                Method::POST,
                &format!("/api/v1/customers/{customer_id}/addresses"),
                Some(address_payload("shipping", city, true)),
            )
            .await;
        assert_eq!(response.status(), 201);
    }

    assert_eq!(default_count(&app, customer_id, "shipping").await, 1);
    let default = app
        .state
        .services
        .addresses
        .default_address(
            customer_id,
            storefront_api::entities::address::AddressKind::Shipping,
        )
        .await
        .expect("query default")
        .expect("a default exists");
    assert_eq!(default.city, "Boston");
}

#[tokio::test]
async fn defaults_are_tracked_per_kind() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    for (kind, city) in [("shipping", "Arlington"), ("billing", "Boston")] {
        let response = app
            .request(
                Method::POST,
                &format!("/api/v1/customers/{customer_id}/addresses"),
                Some(address_payload(kind, city, true)),
            )
            .await;
        assert_eq!(response.status(), 201);
    }

    // A default shipping address never displaces the billing default.
    assert_eq!(default_count(&app, customer_id, "shipping").await, 1);
    assert_eq!(default_count(&app, customer_id, "billing").await, 1);
}

#[tokio::test]
async fn updating_an_address_to_default_displaces_the_current_default() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/customers/{customer_id}/addresses"),
            Some(address_payload("shipping", "Arlington", true)),
        )
        .await;
    let first = response_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/customers/{customer_id}/addresses"),
            Some(address_payload("shipping", "Boston", false)),
        )
        .await;
    let second = response_json(response).await["data"]["id"]
        .as_str()
        .unwrap()
        .to_string();

    let response = app
        .request(
            Method::PUT,
            &format!("/api/v1/customers/{customer_id}/addresses/{second}"),
            Some(json!({ "is_default": true })),
        )
        .await;
    assert_eq!(response.status(), 200);

    assert_eq!(default_count(&app, customer_id, "shipping").await, 1);
    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/customers/{customer_id}/addresses"),
            None,
        )
        .await;
    let body = response_json(response).await;
    for address in body["data"].as_array().unwrap() {
        let expected = address["id"] == second.as_str();
        assert_eq!(address["is_default"], expected, "address {}", address["id"]);
    }
    let _ = first;
}

#[tokio::test]
async fn first_payment_method_becomes_default_automatically() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/customers/{customer_id}/payment-methods"),
            Some(json!({
                "card_number": "4242424242424242",
                "cvc": "123",
                "exp_month": 12,
                "exp_year": 2031,
                "set_default": false
            })),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    assert_eq!(body["data"]["is_default"], true);
    assert_eq!(body["data"]["brand"], "visa");
    assert_eq!(body["data"]["last4"], "4242");
}

#[tokio::test]
async fn new_default_card_displaces_and_soft_delete_hides() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let first = seed_card(&app, customer_id, "4242424242424242").await;
    // Mastercard test number, also set default.
    let second = seed_card(&app, customer_id, "5555555555554444").await;

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/customers/{customer_id}/payment-methods"),
            None,
        )
        .await;
    let body = response_json(response).await;
    let methods = body["data"].as_array().unwrap();
    assert_eq!(methods.len(), 2);
    for method in methods {
        let expected = method["id"] == second.to_string();
        assert_eq!(method["is_default"], expected);
    }

    // Soft delete the default; it disappears from the listing.
    let response = app
        .request(
            Method::DELETE,
            &format!("/api/v1/customers/{customer_id}/payment-methods/{second}"),
            None,
        )
        .await;
    assert_eq!(response.status(), 204);

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/customers/{customer_id}/payment-methods"),
            None,
        )
        .await;
    let body = response_json(response).await;
    let methods = body["data"].as_array().unwrap();
    assert_eq!(methods.len(), 1);
    assert_eq!(methods[0]["id"], first.to_string());
}

#[tokio::test]
async fn invalid_card_numbers_are_rejected() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    // Fails the Luhn check.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/customers/{customer_id}/payment-methods"),
            Some(json!({
                "card_number": "4242424242424241",
                "cvc": "123",
                "exp_month": 12,
                "exp_year": 2031
            })),
        )
        .await;
    assert_eq!(response.status(), 400);

    // Expired card.
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/customers/{customer_id}/payment-methods"),
            Some(json!({
                "card_number": "4242424242424242",
                "cvc": "123",
                "exp_month": 1,
                "exp_year": 2020
            })),
        )
        .await;
    assert_eq!(response.status(), 400);
}

#[tokio::test]
async fn created_address_round_trips_both_street_lines() {
    let app = TestApp::new().await;
    let customer_id = Uuid::new_v4();

    let mut payload = address_payload("shipping", "Arlington", true);
    payload["address_line_2"] = json!("Suite 400");
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/customers/{customer_id}/addresses"),
            Some(payload),
        )
        .await;
    assert_eq!(response.status(), 201);
    let body = response_json(response).await;
    assert_eq!(body["data"]["address_line_1"], "1 Harbor View");
    assert_eq!(body["data"]["address_line_2"], "Suite 400");

    let response = app
        .request(
            Method::GET,
            &format!("/api/v1/customers/{customer_id}/addresses"),
            None,
        )
        .await;
    let body = response_json(response).await;
    let listed = &body["data"].as_array().unwrap()[0];
    assert_eq!(listed["address_line_1"], "1 Harbor View");
    assert_eq!(listed["address_line_2"], "Suite 400");
}
