use crate::{
    auth::AuthUser,
    config::PaymentGatewayConfig,
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, Model as OrderModel},
    errors::ServiceError,
    payment_gateway::{
        gateway_attempt, gateway_attempt_id, gateway_order_id, render_return_url, Buyer,
        GatewayOrderStatus, PaymentGateway, SessionRequest,
    },
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{sea_query::Expr, ColumnTrait, EntityTrait, QueryFilter};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreatePaymentSessionRequest {
    #[serde(alias = "orderId")]
    pub order_id: Uuid,
    /// Must equal the stored order total exactly.
    pub amount: Decimal,
    #[serde(default)]
    pub currency: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct PaymentSessionResponse {
    pub payment_session_id: String,
    /// Gateway-side order id
    pub order_id: String,
    pub app_order_id: Uuid,
}

/// Opens gateway checkout sessions for stored orders
#[derive(Clone)]
pub struct PaymentService {
    db_pool: Arc<DbPool>,
    gateway: Arc<dyn PaymentGateway>,
    config: Arc<PaymentGatewayConfig>,
    default_currency: String,
}

impl PaymentService {
    pub fn new(
        db_pool: Arc<DbPool>,
        gateway: Arc<dyn PaymentGateway>,
        config: Arc<PaymentGatewayConfig>,
        default_currency: String,
    ) -> Self {
        Self {
            db_pool,
            gateway,
            config,
            default_currency,
        }
    }

    async fn accessible_order(
        &self,
        caller: &AuthUser,
        order_id: Uuid,
    ) -> Result<OrderModel, ServiceError> {
        let order = OrderEntity::find_by_id(order_id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Order {order_id} not found")))?;

        if !caller.can_access(order.user_id) {
            return Err(ServiceError::Forbidden(
                "Not authorized to pay for this order".to_string(),
            ));
        }
        Ok(order)
    }

    fn resolve_currency(&self, requested: Option<&str>) -> Result<String, ServiceError> {
        let currency = requested
            .map(str::trim)
            .filter(|c| !c.is_empty())
            .unwrap_or(&self.default_currency)
            .to_ascii_uppercase();
        if currency.len() != 3 || !currency.chars().all(|c| c.is_ascii_alphabetic()) {
            return Err(ServiceError::InvalidRequest(format!(
                "Invalid currency code: {currency}"
            )));
        }
        Ok(currency)
    }

    /// Creates a gateway session after checking ownership and that the
    /// asserted amount matches the stored total. A gateway failure leaves
    /// the order untouched.
    #[instrument(skip(self, caller, request), fields(order_id = %request.order_id, user_id = %caller.user_id))]
    pub async fn create_session(
        &self,
        caller: &AuthUser,
        request: CreatePaymentSessionRequest,
    ) -> Result<PaymentSessionResponse, ServiceError> {
        let order = self.accessible_order(caller, request.order_id).await?;

        if request.amount != order.total_price {
            warn!(asserted = %request.amount, expected = %order.total_price, "payment amount mismatch");
            return Err(ServiceError::AmountMismatch {
                asserted: request.amount,
                expected: order.total_price,
            });
        }

        if order.is_paid {
            return Err(ServiceError::Conflict(format!(
                "Order {} is already paid",
                order.id
            )));
        }

        let currency = self.resolve_currency(request.currency.as_deref())?;
        let phone = caller
            .phone
            .as_deref()
            .map(str::trim)
            .filter(|p| !p.is_empty())
            .unwrap_or(&self.config.placeholder_phone)
            .to_string();

        let attempt = order
            .gateway_order_id
            .as_deref()
            .and_then(gateway_attempt)
            .map_or(1, |last| last.saturating_add(1));

        let session_request = SessionRequest {
            gateway_order_id: gateway_attempt_id(order.id, attempt),
            amount: order.total_price,
            currency,
            buyer: Buyer {
                customer_id: order.user_id.to_string(),
                email: caller.email.clone(),
                phone,
            },
            return_url: render_return_url(&self.config.return_url_template, order.id),
        };

        let session = self
            .gateway
            .create_session(&session_request)
            .await
            .map_err(|e| {
                warn!(error = %e, "payment gateway call failed");
                ServiceError::GatewayError(e)
            })?;

        // The session is live at the gateway even if recording it fails, and
        // webhooks resolve the order from the gateway id alone.
        if let Err(e) = OrderEntity::update_many()
            .col_expr(
                order::Column::PaymentSessionId,
                Expr::value(session.session_id.clone()),
            )
            .col_expr(
                order::Column::GatewayOrderId,
                Expr::value(session.gateway_order_id.clone()),
            )
            .col_expr(order::Column::UpdatedAt, Expr::value(Utc::now()))
            .filter(order::Column::Id.eq(order.id))
            .exec(&*self.db_pool)
            .await
        {
            error!(error = %e, "failed to record payment session id");
        }

        info!(gateway_order_id = %session.gateway_order_id, "payment session created");
        Ok(PaymentSessionResponse {
            payment_session_id: session.session_id,
            order_id: session.gateway_order_id,
            app_order_id: order.id,
        })
    }

    /// Gateway's current view of an order's payment.
    #[instrument(skip(self, caller))]
    pub async fn gateway_status(
        &self,
        caller: &AuthUser,
        order_id: Uuid,
    ) -> Result<GatewayOrderStatus, ServiceError> {
        let order = self.accessible_order(caller, order_id).await?;
        let gateway_id = order
            .gateway_order_id
            .unwrap_or_else(|| gateway_order_id(order.id));
        Ok(self.gateway.fetch_order(&gateway_id).await?)
    }
}
