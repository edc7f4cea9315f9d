use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::{cart, cart_item};
use crate::services::carts::AddCartItemRequest;
use crate::{errors::ServiceError, ApiResponse, AppState};

pub fn carts_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_cart))
        .route("/:id", get(get_cart))
        .route("/:id/items", post(add_item))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CreateCartRequest {
    pub customer_id: Uuid,
    pub currency: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct CartResponse {
    #[serde(flatten)]
    pub cart: cart::Model,
    pub items: Vec<cart_item::Model>,
}

async fn create_cart(
    State(state): State<AppState>,
    Json(request): Json<CreateCartRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let currency = request
        .currency
        .unwrap_or_else(|| state.config.currency.clone());
    let cart = state
        .services
        .carts
        .create_cart(request.customer_id, &currency)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(cart))))
}

async fn get_cart(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let cart = state.services.carts.get_cart(cart_id).await?;
    let items = state.services.carts.get_cart_items(cart_id).await?;
    Ok(Json(ApiResponse::success(CartResponse { cart, items })))
}

async fn add_item(
    State(state): State<AppState>,
    Path(cart_id): Path<Uuid>,
    Json(request): Json<AddCartItemRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let item = state.services.carts.add_item(cart_id, request).await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(item))))
}
