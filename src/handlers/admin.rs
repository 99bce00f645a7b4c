use super::common::success_response;
use crate::{
    auth::AdminUser, errors::ServiceError, services::admin::DashboardStats, ApiResponse, AppState,
};
use axum::{extract::State, routing::get, Json, Router};

pub fn admin_routes() -> Router<AppState> {
    Router::new().route("/stats", get(dashboard_stats))
}

#[utoipa::path(
    get,
    path = "/api/admin/stats",
    summary = "Dashboard figures",
    responses(
        (status = 200, description = "Order count, revenue and undelivered count", body = ApiResponse<DashboardStats>),
        (status = 401, description = "Unauthorized", body = crate::errors::ErrorResponse),
        (status = 403, description = "Admin only", body = crate::errors::ErrorResponse),
    ),
    security(("Bearer" = [])),
    tag = "Admin"
)]
pub async fn dashboard_stats(
    State(state): State<AppState>,
    _admin: AdminUser,
) -> Result<Json<ApiResponse<DashboardStats>>, ServiceError> {
    let stats = state.services.admin.dashboard_stats().await?;
    Ok(success_response(stats))
}
