//! Applies gateway payment notifications to stored orders.
//!
//! Every write is a single conditional UPDATE whose predicate is the
//! transition table in [`crate::services::order_status`], so concurrent or
//! repeated deliveries of the same notification change the order at most
//! once.

use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, OrderStatus, PaymentResult},
    errors::ServiceError,
    payment_gateway::parse_gateway_order_id,
    services::order_status::{plan_payment_transition, PaymentSignal, PaymentTransition},
};
use chrono::Utc;
use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Deserializer};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use uuid::Uuid;

/// Normalized payment notification.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentNotification {
    pub gateway_order_id: String,
    pub raw_status: String,
    pub signal: Option<PaymentSignal>,
    pub payment_id: Option<String>,
    pub payment_time: Option<String>,
    pub payer_email: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    Applied(OrderStatus),
    /// Duplicate delivery; the order already reflects it.
    Unchanged(OrderStatus),
    /// Out-of-order delivery that would regress the order.
    Ignored(OrderStatus),
    UnknownOrder,
    UnsupportedStatus,
}

#[derive(Debug, Deserialize)]
struct CustomerDetails {
    #[serde(default)]
    customer_email: Option<String>,
}

/// `{order_id, order_status, cf_payment_id, payment_time, customer_details}`
#[derive(Debug, Deserialize)]
struct FlatPayload {
    order_id: String,
    order_status: String,
    #[serde(default, deserialize_with = "string_or_number")]
    cf_payment_id: Option<String>,
    #[serde(default)]
    payment_time: Option<String>,
    #[serde(default)]
    customer_details: Option<CustomerDetails>,
}

/// Cashfree PG webhook envelope: `{type, data: {order, payment, customer_details}}`
#[derive(Debug, Deserialize)]
struct Envelope {
    data: EnvelopeData,
}

#[derive(Debug, Deserialize)]
struct EnvelopeData {
    order: EnvelopeOrder,
    payment: EnvelopePayment,
    #[serde(default)]
    customer_details: Option<CustomerDetails>,
}

#[derive(Debug, Deserialize)]
struct EnvelopeOrder {
    order_id: String,
}

#[derive(Debug, Deserialize)]
struct EnvelopePayment {
    payment_status: String,
    #[serde(default, deserialize_with = "string_or_number")]
    cf_payment_id: Option<String>,
    #[serde(default)]
    payment_time: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum WebhookBody {
    Flat(FlatPayload),
    Envelope(Envelope),
}

fn string_or_number<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: Deserializer<'de>,
{
    Ok(
        match Option::<serde_json::Value>::deserialize(deserializer)? {
            Some(serde_json::Value::String(s)) => Some(s),
            Some(serde_json::Value::Number(n)) => Some(n.to_string()),
            _ => None,
        },
    )
}

fn signal_for(status: &str) -> Option<PaymentSignal> {
    match status.trim().to_ascii_uppercase().as_str() {
        "PAID" | "SUCCESS" => Some(PaymentSignal::Paid),
        "FAILED" | "USER_DROPPED" => Some(PaymentSignal::Failed),
        "PENDING" => Some(PaymentSignal::Pending),
        _ => None,
    }
}

/// Parses a raw webhook body. Malformed input is an `InvalidRequest`.
pub fn parse_notification(body: &[u8]) -> Result<PaymentNotification, ServiceError> {
    let parsed: WebhookBody = serde_json::from_slice(body)
        .map_err(|e| ServiceError::InvalidRequest(format!("Malformed webhook payload: {e}")))?;

    let (order_id, status, payment_id, payment_time, customer) = match parsed {
        WebhookBody::Flat(p) => (
            p.order_id,
            p.order_status,
            p.cf_payment_id,
            p.payment_time,
            p.customer_details,
        ),
        WebhookBody::Envelope(e) => (
            e.data.order.order_id,
            e.data.payment.payment_status,
            e.data.payment.cf_payment_id,
            e.data.payment.payment_time,
            e.data.customer_details,
        ),
    };

    if order_id.trim().is_empty() {
        return Err(ServiceError::InvalidRequest(
            "Webhook payload has an empty order_id".to_string(),
        ));
    }

    Ok(PaymentNotification {
        gateway_order_id: order_id,
        signal: signal_for(&status),
        raw_status: status,
        payment_id,
        payment_time,
        payer_email: customer.and_then(|c| c.customer_email),
    })
}

const MAX_ATTEMPTS: usize = 2;

#[derive(Clone)]
pub struct ReconciliationService {
    db_pool: Arc<DbPool>,
}

impl ReconciliationService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    #[instrument(skip(self, notification), fields(gateway_order_id = %notification.gateway_order_id, status = %notification.raw_status))]
    pub async fn apply(
        &self,
        notification: &PaymentNotification,
    ) -> Result<ReconcileOutcome, ServiceError> {
        let Some(signal) = notification.signal else {
            info!("ignoring unsupported payment status");
            return Ok(ReconcileOutcome::UnsupportedStatus);
        };
        let Some(order_id) = parse_gateway_order_id(&notification.gateway_order_id) else {
            warn!("webhook for unrecognized gateway order id");
            return Ok(ReconcileOutcome::UnknownOrder);
        };

        for _ in 0..MAX_ATTEMPTS {
            if signal != PaymentSignal::Pending
                && self.compare_and_set(order_id, signal, notification).await?
            {
                info!(order_id = %order_id, new_status = %signal.target(), "payment notification applied");
                return Ok(ReconcileOutcome::Applied(signal.target()));
            }

            let Some(current) = OrderEntity::find_by_id(order_id)
                .one(&*self.db_pool)
                .await?
            else {
                warn!(order_id = %order_id, "webhook for unknown order");
                return Ok(ReconcileOutcome::UnknownOrder);
            };

            match plan_payment_transition(current.status, current.is_paid, signal) {
                PaymentTransition::Unchanged => {
                    info!(order_id = %order_id, "duplicate payment notification");
                    return Ok(ReconcileOutcome::Unchanged(current.status));
                }
                PaymentTransition::Ignore => {
                    warn!(order_id = %order_id, current = %current.status, "stale payment notification ignored");
                    return Ok(ReconcileOutcome::Ignored(current.status));
                }
                // The row moved between the conditional write and the read.
                PaymentTransition::Apply(_) => continue,
            }
        }

        // Answer 5xx so the gateway redelivers.
        error!(order_id = %order_id, "payment notification not applied after retries");
        Err(ServiceError::InternalError(format!(
            "Order {order_id} changed concurrently, retry the notification"
        )))
    }

    /// Returns whether the conditional update matched the order.
    async fn compare_and_set(
        &self,
        order_id: Uuid,
        signal: PaymentSignal,
        notification: &PaymentNotification,
    ) -> Result<bool, ServiceError> {
        let now = Utc::now();
        let mut update = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(signal.target()))
            .col_expr(order::Column::UpdatedAt, Expr::value(now));

        if signal == PaymentSignal::Paid {
            let result = PaymentResult {
                payment_id: notification.payment_id.clone().unwrap_or_default(),
                status: notification.raw_status.clone(),
                update_time: notification.payment_time.clone(),
                email_address: notification.payer_email.clone(),
            };
            update = update
                .col_expr(order::Column::IsPaid, Expr::value(true))
                .col_expr(order::Column::PaidAt, Expr::value(now))
                .col_expr(order::Column::PaymentResult, Expr::value(result));
        }

        let result = update
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::IsPaid.eq(false))
            .filter(order::Column::Status.is_in(signal.sources().iter().copied()))
            .exec(&*self.db_pool)
            .await?;

        Ok(result.rows_affected == 1)
    }
}
