use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::checkout_session;
use crate::models::{AddressSnapshot, PaymentMethodSnapshot};
use crate::services::checkout::{SetAddressesRequest, SetPaymentMethodRequest};
use crate::services::pricing::OrderSummary;
use crate::{errors::ServiceError, ApiResponse, AppState};

pub fn checkout_routes() -> Router<AppState> {
    Router::new()
        .route("/", post(start_checkout))
        .route("/:session_id", get(get_session))
        .route("/:session_id/addresses", put(set_addresses))
        .route("/:session_id/payment-method", put(set_payment_method))
        .route("/:session_id/review", get(review))
        .route("/:session_id/place-order", post(place_order))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct StartCheckoutRequest {
    pub customer_id: Uuid,
    pub cart_id: Uuid,
}

/// Session-scoped requests still carry the customer id until an auth layer
/// exists to supply it.
#[derive(Debug, Deserialize, ToSchema)]
pub struct CustomerScoped<T> {
    pub customer_id: Uuid,
    #[serde(flatten)]
    pub body: T,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CustomerQuery {
    pub customer_id: Uuid,
}

#[derive(Debug, Serialize)]
pub struct ReviewResponse {
    pub session: checkout_session::Model,
    pub summary: OrderSummary,
    pub shipping_address: AddressSnapshot,
    pub billing_address: AddressSnapshot,
    pub payment_method: PaymentMethodSnapshot,
}

async fn start_checkout(
    State(state): State<AppState>,
    Json(request): Json<StartCheckoutRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state
        .services
        .checkout
        .start_checkout(request.customer_id, request.cart_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(session))))
}

async fn get_session(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    axum::extract::Query(query): axum::extract::Query<CustomerQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state
        .services
        .checkout
        .get_session(query.customer_id, session_id)
        .await?;
    Ok(Json(ApiResponse::success(session)))
}

async fn set_addresses(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<CustomerScoped<SetAddressesRequest>>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state
        .services
        .checkout
        .set_addresses(request.customer_id, session_id, request.body)
        .await?;
    Ok(Json(ApiResponse::success(session)))
}

async fn set_payment_method(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<CustomerScoped<SetPaymentMethodRequest>>,
) -> Result<impl IntoResponse, ServiceError> {
    let session = state
        .services
        .checkout
        .set_payment_method(request.customer_id, session_id, request.body)
        .await?;
    Ok(Json(ApiResponse::success(session)))
}

async fn review(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    axum::extract::Query(query): axum::extract::Query<CustomerQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let review = state
        .services
        .checkout
        .review(query.customer_id, session_id)
        .await?;
    Ok(Json(ApiResponse::success(ReviewResponse {
        session: review.session,
        summary: review.summary,
        shipping_address: review.shipping_address,
        billing_address: review.billing_address,
        payment_method: review.payment_method,
    })))
}

async fn place_order(
    State(state): State<AppState>,
    Path(session_id): Path<Uuid>,
    Json(request): Json<CustomerQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .checkout
        .place_order(request.customer_id, session_id)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(order))))
}
