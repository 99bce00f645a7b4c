use super::common::{success_response, AppJson};
use crate::{
    auth::AuthUser,
    errors::ServiceError,
    payment_gateway::GatewayOrderStatus,
    services::payments::{CreatePaymentSessionRequest, PaymentSessionResponse},
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, State},
    routing::{get, post},
    Json, Router,
};
use uuid::Uuid;

/// Authenticated payment routes. The webhook is mounted separately.
pub fn payment_routes() -> Router<AppState> {
    Router::new()
        .route("/create-order", post(create_payment_session))
        .route("/order-status/:order_id", get(get_payment_status))
}

#[utoipa::path(
    post,
    path = "/api/payment/create-order",
    summary = "Open a checkout session",
    description = "Creates a gateway checkout session for an unpaid order. The asserted amount must equal the stored total.",
    request_body = CreatePaymentSessionRequest,
    responses(
        (status = 200, description = "Session created", body = ApiResponse<PaymentSessionResponse>),
        (status = 400, description = "Amount mismatch or invalid currency", body = crate::errors::ErrorResponse),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 409, description = "Order already paid", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway unavailable", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn create_payment_session(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<CreatePaymentSessionRequest>,
) -> Result<Json<ApiResponse<PaymentSessionResponse>>, ServiceError> {
    let session = state.services.payments.create_session(&user, request).await?;
    Ok(success_response(session))
}

#[utoipa::path(
    get,
    path = "/api/payment/order-status/{order_id}",
    summary = "Gateway payment status",
    description = "Asks the gateway for its current view of the order's payment. Does not modify the order.",
    params(("order_id" = Uuid, Path, description = "Order ID")),
    responses(
        (status = 200, description = "Gateway status", body = ApiResponse<GatewayOrderStatus>),
        (status = 403, description = "Not the owner", body = crate::errors::ErrorResponse),
        (status = 404, description = "Order not found", body = crate::errors::ErrorResponse),
        (status = 502, description = "Gateway unavailable", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Payments"
)]
pub async fn get_payment_status(
    State(state): State<AppState>,
    user: AuthUser,
    Path(order_id): Path<Uuid>,
) -> Result<Json<ApiResponse<GatewayOrderStatus>>, ServiceError> {
    let status = state
        .services
        .payments
        .gateway_status(&user, order_id)
        .await?;
    Ok(success_response(status))
}
