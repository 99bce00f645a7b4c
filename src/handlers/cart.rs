use super::common::{success_response, AppJson};
use crate::{
    auth::AuthUser,
    entities::user::CartLine,
    errors::ServiceError,
    services::cart::{AddToCartRequest, UpdateCartItemRequest},
    ApiResponse, AppState,
};
use axum::{
    extract::{Path, State},
    routing::{get, put},
    Json, Router,
};
use uuid::Uuid;

pub fn cart_routes() -> Router<AppState> {
    Router::new()
        .route("/", get(get_cart).post(add_to_cart))
        .route("/:line_id", put(update_cart_item).delete(remove_cart_item))
}

#[utoipa::path(
    get,
    path = "/api/cart",
    summary = "Current cart",
    responses(
        (status = 200, description = "Cart lines", body = ApiResponse<Vec<CartLine>>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn get_cart(
    State(state): State<AppState>,
    user: AuthUser,
) -> Result<Json<ApiResponse<Vec<CartLine>>>, ServiceError> {
    let lines = state.services.cart.get_cart(user.user_id).await?;
    Ok(success_response(lines))
}

#[utoipa::path(
    post,
    path = "/api/cart",
    summary = "Add to cart",
    description = "Adds a product at one of its weight options; repeats merge into the existing line",
    request_body = AddToCartRequest,
    responses(
        (status = 200, description = "Updated cart", body = ApiResponse<Vec<CartLine>>),
        (status = 400, description = "Invalid quantity or weight", body = crate::errors::ErrorResponse),
        (status = 404, description = "Product not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn add_to_cart(
    State(state): State<AppState>,
    user: AuthUser,
    AppJson(request): AppJson<AddToCartRequest>,
) -> Result<Json<ApiResponse<Vec<CartLine>>>, ServiceError> {
    let lines = state.services.cart.add_item(user.user_id, request).await?;
    Ok(success_response(lines))
}

#[utoipa::path(
    put,
    path = "/api/cart/{line_id}",
    summary = "Change line quantity",
    params(("line_id" = Uuid, Path, description = "Cart line ID")),
    request_body = UpdateCartItemRequest,
    responses(
        (status = 200, description = "Updated line", body = ApiResponse<CartLine>),
        (status = 400, description = "Invalid quantity", body = crate::errors::ErrorResponse),
        (status = 404, description = "Cart line not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn update_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(line_id): Path<Uuid>,
    AppJson(request): AppJson<UpdateCartItemRequest>,
) -> Result<Json<ApiResponse<CartLine>>, ServiceError> {
    let line = state
        .services
        .cart
        .update_quantity(user.user_id, line_id, request)
        .await?;
    Ok(success_response(line))
}

#[utoipa::path(
    delete,
    path = "/api/cart/{line_id}",
    summary = "Remove cart line",
    params(("line_id" = Uuid, Path, description = "Cart line ID")),
    responses(
        (status = 200, description = "Remaining cart", body = ApiResponse<Vec<CartLine>>),
        (status = 404, description = "Cart line not found", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Cart"
)]
pub async fn remove_cart_item(
    State(state): State<AppState>,
    user: AuthUser,
    Path(line_id): Path<Uuid>,
) -> Result<Json<ApiResponse<Vec<CartLine>>>, ServiceError> {
    let lines = state.services.cart.remove_item(user.user_id, line_id).await?;
    Ok(success_response(lines))
}
