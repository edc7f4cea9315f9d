use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{delete, get},
    Router,
};
use uuid::Uuid;

use crate::services::payment_methods::{CreatePaymentMethodRequest, PaymentMethodResponse};
use crate::{errors::ServiceError, ApiResponse, AppState};

pub fn payment_methods_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(list_payment_methods).post(create_payment_method))
        .route("/:id", delete(delete_payment_method))
}

async fn list_payment_methods(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
) -> Result<impl IntoResponse, ServiceError> {
    let methods = state
        .services
        .payment_methods
        .list_payment_methods(customer_id)
        .await?;
    let responses: Vec<PaymentMethodResponse> =
        methods.into_iter().map(PaymentMethodResponse::from).collect();
    Ok(Json(ApiResponse::success(responses)))
}

/// Raw card data comes in, only the token goes out.
async fn create_payment_method(
    State(state): State<AppState>,
    Path(customer_id): Path<Uuid>,
    Json(request): Json<CreatePaymentMethodRequest>,
) -> Result<impl IntoResponse, ServiceError> {
    let method = state
        .services
        .payment_methods
        .create_payment_method(customer_id, request)
        .await?;
    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::success(PaymentMethodResponse::from(method))),
    ))
}

async fn delete_payment_method(
    State(state): State<AppState>,
    Path((customer_id, payment_method_id)): Path<(Uuid, Uuid)>,
) -> Result<impl IntoResponse, ServiceError> {
    state
        .services
        .payment_methods
        .delete_payment_method(customer_id, payment_method_id)
        .await?;
    Ok(StatusCode::NO_CONTENT)
}
