use axum::{
    body::{self, Body},
    http::{Method, Request},
    response::Response,
    routing::get,
    Router,
};
use sea_orm::Database;
use serde_json::Value;
use std::sync::Arc;
use storefront_api::{config::AppConfig, db, events::EventSender, AppState};
use tokio::sync::mpsc;
use tower::ServiceExt;
use uuid::Uuid;

/// Test application over an in-memory SQLite database. Each instance owns
/// its own database; a single pooled connection keeps the in-memory schema
/// alive for the harness's lifetime.
pub struct TestApp {
    router: Router,
    pub state: AppState,
    _event_task: tokio::task::JoinHandle<()>,
}

impl TestApp {
    pub async fn new() -> Self {
        let mut cfg = AppConfig::new(
            "sqlite::memory:".to_string(),
            "127.0.0.1".to_string(),
            18_080,
            "test".to_string(),
        );
        cfg.db_max_connections = 1;
        cfg.db_min_connections = 1;
        // Keep tests fast and deterministic.
        cfg.gateway.latency_ms = 0;
        cfg.gateway.success_rate = 1.0;

        let mut options = sea_orm::ConnectOptions::new(cfg.database_url.clone());
        options.max_connections(1).min_connections(1);
        let pool = Database::connect(options)
            .await
            .expect("failed to open test database");
        db::run_migrations(&pool)
            .await
            .expect("failed to run migrations in tests");

        let db_arc = Arc::new(pool);
        let (event_tx, event_rx) = mpsc::channel(256);
        let event_sender = EventSender::new(event_tx);
        let event_task = tokio::spawn(storefront_api::events::process_events(event_rx));

        let state = AppState::new(db_arc, cfg, event_sender);

        let router = Router::new()
            .route("/", get(|| async { "ok" }))
            .nest("/api/v1", storefront_api::api_v1_routes())
            .layer(axum::middleware::from_fn(
                storefront_api::request_id::propagate_request_id,
            ))
            .with_state(state.clone());

        Self {
            router,
            state,
            _event_task: event_task,
        }
    }

    pub async fn request(&self, method: Method, uri: &str, body: Option<Value>) -> Response {
        let mut builder = Request::builder().method(method).uri(uri);

        let body = if let Some(json) = body {
            builder = builder.header("content-type", "application/json");
            Body::from(serde_json::to_vec(&json).expect("serialize json request body"))
        } else {
            Body::empty()
        };

        let request = builder.body(body).expect("build request");
        self.router
            .clone()
            .oneshot(request)
            .await
            .expect("router error during test request")
    }
}

pub async fn response_json(response: Response) -> Value {
    let bytes = body::to_bytes(response.into_body(), usize::MAX)
        .await
        .expect("response body bytes");
    serde_json::from_slice(&bytes).expect("json response")
}

/// Seed a cart with one line item and return (customer_id, cart_id).
#[allow(dead_code)]
pub async fn seed_cart(app: &TestApp, unit_price: &str, quantity: i32) -> (Uuid, Uuid) {
    let customer_id = Uuid::new_v4();
    let cart = app
        .state
        .services
        .carts
        .create_cart(customer_id, "USD")
        .await
        .expect("create cart");

    app.state
        .services
        .carts
        .add_item(
            cart.id,
            serde_json::from_value(serde_json::json!({
                "product_id": Uuid::new_v4(),
                "name": "Test Product",
                "quantity": quantity,
                "unit_price": unit_price,
            }))
            .expect("cart item request"),
        )
        .await
        .expect("add cart item");

    (customer_id, cart.id)
}

/// Create a shipping address (default) for the customer via the API.
#[allow(dead_code)]
pub async fn seed_shipping_address(app: &TestApp, customer_id: Uuid) -> Uuid {
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/customers/{customer_id}/addresses"),
            Some(serde_json::json!({
                "kind": "shipping",
                "first_name": "Ada",
                "last_name": "Lovelace",
                "address_line_1": "1 Analytical Way",
                "city": "London",
                "province": "LDN",
                "postal_code": "E1 6AN",
                "country_code": "GB",
                "phone": "+44 20 7946 0958",
                "is_default": true
            })),
        )
        .await;
    assert_eq!(response.status(), 201, "seed shipping address");
    let body = response_json(response).await;
    body["data"]["id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .expect("address id")
}

/// Tokenize a card for the customer via the API and return the method id.
#[allow(dead_code)]
pub async fn seed_card(app: &TestApp, customer_id: Uuid, card_number: &str) -> Uuid {
    let response = app
        .request(
            Method::POST,
            &format!("/api/v1/customers/{customer_id}/payment-methods"),
            Some(serde_json::json!({
                "card_number": card_number,
                "cvc": "123",
                "exp_month": 12,
                "exp_year": 2031,
                "set_default": true
            })),
        )
        .await;
    assert_eq!(response.status(), 201, "seed payment method");
    let body = response_json(response).await;
    body["data"]["id"]
        .as_str()
        .and_then(|s| Uuid::parse_str(s).ok())
        .expect("payment method id")
}
