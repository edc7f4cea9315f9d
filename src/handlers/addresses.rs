use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, put},
    Router,
};
use uuid::Uuid;

use crate::services::addresses::{CreateAddressRequest, UpdateAddressRequest};
use crate::{errors::ServiceError, ApiResponse, AppState};

pub fn addresses_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_addresses).post(create_address))
        .route("/:id", put(update_address).delete(delete_address))
}

async fn list_addresses(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let addresses = state.services.addresses.list_addresses(customer_id).await?;
    Ok(Json(ApiResponse::success(addresses)))
}

async fn create_address(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(request): Json<CreateAddressRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let address = state
        .services
        .addresses
        .create_address(customer_id, request)
        .await?;
    Ok((StatusCode::CREATED, Json(ApiResponse::success(address))))
}

async fn update_address(
    State(state): State<AppState>,
    Path((customer_id, address_id)): Path<(Uuid, Uuid)>,
    Json(request): Json<UpdateAddressRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let address = state
        .services
        .addresses
        .update_address(customer_id, address_id, request)
        .await?;
    Ok(Json(ApiResponse::success(address)))
}

async fn delete_address(
    State(state): State<AppState>,
    Path((customer_id, address_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .addresses
        .delete_address(customer_id, address_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
