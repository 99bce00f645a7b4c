use super::common::success_response;
use crate::{
    errors::ServiceError,
    services::reconciliation::{parse_notification, ReconcileOutcome},
    ApiResponse, AppState,
};
use axum::{extract::State, http::HeaderMap, Json};
use bytes::Bytes;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use utoipa::ToSchema;

/// Acknowledgement returned to the gateway
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct WebhookAck {
    pub outcome: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<String>,
}

impl From<ReconcileOutcome> for WebhookAck {
    fn from(outcome: ReconcileOutcome) -> Self {
        let (label, status) = match outcome {
            ReconcileOutcome::Applied(s) => ("applied", Some(s)),
            ReconcileOutcome::Unchanged(s) => ("duplicate", Some(s)),
            ReconcileOutcome::Ignored(s) => ("ignored", Some(s)),
            ReconcileOutcome::UnknownOrder => ("unknown_order", None),
            ReconcileOutcome::UnsupportedStatus => ("unsupported_status", None),
        };
        Self {
            outcome: label.to_string(),
            status: status.map(|s| s.to_string()),
        }
    }
}

// POST /api/payment/webhook
#[utoipa::path(
    post,
    path = "/api/payment/webhook",
    summary = "Gateway payment notification",
    description = "Signed with HMAC-SHA256 over timestamp and raw body (x-webhook-timestamp, x-webhook-signature). Applied at most once per order.",
    request_body = String,
    responses(
        (status = 200, description = "Webhook accepted", body = ApiResponse<WebhookAck>),
        (status = 400, description = "Invalid payload", body = crate::errors::ErrorResponse),
        (status = 401, description = "Invalid signature", body = crate::errors::ErrorResponse),
        (status = 500, description = "Storage failure, gateway should retry", body = crate::errors::ErrorResponse),
    ),
    tag = "Payments"
)]
pub async fn payment_webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<Json<ApiResponse<WebhookAck>>, ServiceError> {
    if let Err(e) = state.webhook_verifier.verify(&headers, &body) {
        warn!(error = %e, "payment webhook signature verification failed");
        return Err(ServiceError::Unauthorized(
            "Invalid webhook signature".to_string(),
        ));
    }

    let notification = parse_notification(&body)?;
    let outcome = state
        .services
        .reconciliation
        .apply(&notification)
        .await?;

    info!(
        gateway_order_id = %notification.gateway_order_id,
        outcome = ?outcome,
        "payment webhook processed"
    );
    Ok(success_response(WebhookAck::from(outcome)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::entities::order::OrderStatus;

    #[test]
    fn ack_labels_each_outcome() {
        let ack = WebhookAck::from(ReconcileOutcome::Applied(OrderStatus::OrderPlaced));
        assert_eq!(ack.outcome, "applied");
        assert_eq!(ack.status.as_deref(), Some("order_placed"));

        let ack = WebhookAck::from(ReconcileOutcome::UnknownOrder);
        assert_eq!(ack.outcome, "unknown_order");
        assert!(ack.status.is_none());
    }
}
