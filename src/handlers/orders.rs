use axum::{
    extract::{Path, Query, State},
    response::{IntoResponse, Json},
    routing::{get, post, put},
    Router,
};
use serde::Deserialize;
use utoipa::ToSchema;
use uuid::Uuid;

use crate::entities::order::OrderStatus;
use crate::{errors::ServiceError, ApiResponse, AppState, PaginatedResponse};

pub fn orders_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_orders))
        .route("/by-number/:order_number", get(get_order_by_number))
        .route("/:id", get(get_order))
        .route("/:id/items", get(get_order_items))
        .route("/:id/cancel", post(cancel_order))
        .route("/:id/status", put(update_order_status))
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct CustomerQuery {
    pub customer_id: Uuid,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct OrderListQuery {
    pub customer_id: Uuid,
    #[serde(default = "crate::default_page")]
    pub page: u64,
    #[serde(default = "crate::default_limit")]
    pub limit: u64,
}

#[derive(Debug, Deserialize, ToSchema)]
pub struct UpdateOrderStatusRequest {
    pub status: OrderStatus,
}

async fn list_orders(
    State(state): State<AppState>,
    Query(query): Query<OrderListQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let (orders, total) = state
        .services
        .orders
        .list_orders(query.customer_id, query.page, query.limit)
        .await?;
    let limit = query.limit.max(1);
    Ok(Json(ApiResponse::success(PaginatedResponse {
        items: orders,
        total,
        page: query.page,
        limit,
        total_pages: total.div_ceil(limit),
    })))
}

async fn get_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Query(query): Query<CustomerQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .get_order(query.customer_id, order_id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

async fn get_order_by_number(
    State(state): State<AppState>,
    Path(order_number): Path<String>,
    Query(query): Query<CustomerQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .get_order_by_number(query.customer_id, &order_number)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

async fn get_order_items(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Query(query): Query<CustomerQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let items = state
        .services
        .orders
        .get_order_items(query.customer_id, order_id)
        .await?;
    Ok(Json(ApiResponse::success(items)))
}

async fn cancel_order(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<CustomerQuery>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .cancel_order(request.customer_id, order_id)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}

/// Fulfillment-side transition; no customer scoping, this is the back-office
/// surface.
async fn update_order_status(
    State(state): State<AppState>,
    Path(order_id): Path<Uuid>,
    Json(request): Json<UpdateOrderStatusRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let order = state
        .services
        .orders
        .update_order_status(order_id, request.status)
        .await?;
    Ok(Json(ApiResponse::success(order)))
}
