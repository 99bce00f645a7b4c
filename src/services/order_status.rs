use std::sync::Arc;

use chrono::Utc;
use sea_orm::{sea_query::Expr, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus},
    errors::ServiceError,
};

/// Payment outcome reported by the gateway.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentSignal {
    Paid,
    Failed,
    Pending,
}

/// What a payment signal does to an order in a given state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaymentTransition {
    Apply(OrderStatus),
    /// The order already reflects this signal.
    Unchanged,
    /// The signal is stale for the current state.
    Ignore,
}

const FULFILLMENT_STATUSES: [OrderStatus; 4] = [
    OrderStatus::OrderPlaced,
    OrderStatus::Packed,
    OrderStatus::Shipped,
    OrderStatus::Delivered,
];

impl OrderStatus {
    pub fn is_fulfillment(self) -> bool {
        FULFILLMENT_STATUSES.contains(&self)
    }
}

impl PaymentSignal {
    /// States from which this signal moves the order.
    pub fn sources(self) -> &'static [OrderStatus] {
        match self {
            PaymentSignal::Paid => &[OrderStatus::PaymentPending, OrderStatus::PaymentFailed],
            PaymentSignal::Failed => &[OrderStatus::PaymentPending],
            PaymentSignal::Pending => &[],
        }
    }

    pub fn target(self) -> OrderStatus {
        match self {
            PaymentSignal::Paid => OrderStatus::OrderPlaced,
            PaymentSignal::Failed => OrderStatus::PaymentFailed,
            PaymentSignal::Pending => OrderStatus::PaymentPending,
        }
    }
}

/// Transition table for payment notifications. `is_paid` never goes back
/// to false, so a paid order only ever reports [`PaymentTransition::Unchanged`]
/// for PAID and [`PaymentTransition::Ignore`] for anything else.
pub fn plan_payment_transition(
    current: OrderStatus,
    is_paid: bool,
    signal: PaymentSignal,
) -> PaymentTransition {
    match signal {
        PaymentSignal::Paid if is_paid => PaymentTransition::Unchanged,
        _ if is_paid => PaymentTransition::Ignore,
        _ if signal.sources().contains(&current) => PaymentTransition::Apply(signal.target()),
        _ if current == signal.target() => PaymentTransition::Unchanged,
        _ => PaymentTransition::Ignore,
    }
}

/// Staff may move between fulfillment statuses freely but never into or
/// out of the payment statuses.
pub fn admin_can_set(current: OrderStatus, target: OrderStatus) -> bool {
    current.is_fulfillment() && target.is_fulfillment()
}

#[derive(Clone)]
pub struct OrderStatusService {
    db: Arc<DatabaseConnection>,
}

impl OrderStatusService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    /// Sets a fulfillment status on behalf of an administrator.
    #[instrument(skip(self), fields(order_id = %order_id, new_status = %new_status))]
    pub async fn update_status(
        &self,
        order_id: Uuid,
        new_status: OrderStatus,
    ) -> Result<OrderModel, ServiceError> {
        let db = &*self.db;

        let mut order = OrderEntity::find_by_id(order_id)
            .one(db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        if !admin_can_set(order.status, new_status) {
            warn!(current = %order.status, "invalid status transition");
            return Err(ServiceError::Conflict(format!(
                "Cannot move order from {} to {new_status}",
                order.status
            )));
        }

        let now = Utc::now();
        let result = OrderEntity::update_many()
            .col_expr(order::Column::Status, Expr::value(new_status))
            .col_expr(order::Column::UpdatedAt, Expr::value(now))
            .filter(order::Column::Id.eq(order_id))
            .filter(order::Column::Status.is_in(FULFILLMENT_STATUSES))
            .exec(db)
            .await?;

        // Same guard as admin_can_set, evaluated against the stored row.
        if result.rows_affected == 0 {
            return Err(ServiceError::Conflict(format!(
                "Order {order_id} changed while updating"
            )));
        }

        order.status = new_status;
        order.updated_at = now;
        info!("order status updated");
        Ok(order)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;
    use OrderStatus::*;

    #[rstest]
    #[case(PaymentPending, false, PaymentSignal::Paid, PaymentTransition::Apply(OrderPlaced))]
    #[case(PaymentFailed, false, PaymentSignal::Paid, PaymentTransition::Apply(OrderPlaced))]
    #[case(OrderPlaced, true, PaymentSignal::Paid, PaymentTransition::Unchanged)]
    #[case(Shipped, true, PaymentSignal::Paid, PaymentTransition::Unchanged)]
    #[case(PaymentPending, false, PaymentSignal::Failed, PaymentTransition::Apply(PaymentFailed))]
    #[case(PaymentFailed, false, PaymentSignal::Failed, PaymentTransition::Unchanged)]
    #[case(OrderPlaced, true, PaymentSignal::Failed, PaymentTransition::Ignore)]
    #[case(PaymentPending, false, PaymentSignal::Pending, PaymentTransition::Unchanged)]
    #[case(PaymentFailed, false, PaymentSignal::Pending, PaymentTransition::Ignore)]
    #[case(Delivered, true, PaymentSignal::Pending, PaymentTransition::Ignore)]
    fn payment_transitions(
        #[case] current: OrderStatus,
        #[case] is_paid: bool,
        #[case] signal: PaymentSignal,
        #[case] expected: PaymentTransition,
    ) {
        assert_eq!(plan_payment_transition(current, is_paid, signal), expected);
    }

    #[rstest]
    #[case(OrderPlaced, Delivered, true)]
    #[case(Delivered, Packed, true)]
    #[case(PaymentPending, Packed, false)]
    #[case(PaymentFailed, Shipped, false)]
    #[case(OrderPlaced, PaymentPending, false)]
    fn admin_transitions(
        #[case] current: OrderStatus,
        #[case] target: OrderStatus,
        #[case] allowed: bool,
    ) {
        assert_eq!(admin_can_set(current, target), allowed);
    }
}
