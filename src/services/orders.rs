use crate::{
    auth::AuthUser,
    db::DbPool,
    entities::{
        order::{self, Entity as OrderEntity, Model as OrderModel, OrderStatus, ShippingAddress},
        product::{self, Entity as ProductEntity},
        user::{self, CartLines, Entity as UserEntity},
    },
    errors::ServiceError,
    services::pricing::{price_order, referenced_products, PricingError, RequestedLine},
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    sea_query::Expr, ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, QueryOrder, Set,
    TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{error, info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

/// Line item as submitted by the storefront.
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct OrderItemInput {
    #[serde(alias = "product")]
    pub product_id: Uuid,
    pub quantity: u32,
    #[serde(default)]
    pub weight: String,
    /// Accepted for compatibility and ignored; the catalog price is used.
    #[serde(default)]
    pub price: Option<Decimal>,
}

impl From<&OrderItemInput> for RequestedLine {
    fn from(item: &OrderItemInput) -> Self {
        RequestedLine {
            product_id: item.product_id,
            quantity: item.quantity,
            weight: item.weight.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct CreateOrderRequest {
    #[serde(alias = "orderItems")]
    pub order_items: Vec<OrderItemInput>,
    #[validate]
    #[serde(alias = "shippingAddress")]
    pub shipping_address: ShippingAddress,
    #[validate(length(min = 1, message = "Payment method is required"))]
    #[serde(alias = "paymentMethod")]
    pub payment_method: String,
}

/// Service for placing and reading orders
#[derive(Clone)]
pub struct OrderService {
    db_pool: Arc<DbPool>,
}

impl OrderService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Prices the request against the catalog, stores the order as
    /// `PaymentPending` and empties the buyer's cart.
    ///
    /// The insert and the cart reset share one transaction, so a failed
    /// insert leaves the cart as it was.
    #[instrument(skip(self, buyer, request), fields(user_id = %buyer.user_id, items = request.order_items.len()))]
    pub async fn create_order(
        &self,
        buyer: &AuthUser,
        request: CreateOrderRequest,
    ) -> Result<OrderModel, ServiceError> {
        request.validate()?;

        let lines: Vec<RequestedLine> = request.order_items.iter().map(Into::into).collect();
        if lines.is_empty() {
            return Err(PricingError::Empty.into());
        }

        let db = &*self.db_pool;
        let catalog = ProductEntity::find()
            .filter(product::Column::Id.is_in(referenced_products(&lines)))
            .all(db)
            .await?;

        let priced = price_order(&lines, &catalog).map_err(|e| {
            warn!(error = %e, "order rejected during pricing");
            ServiceError::from(e)
        })?;

        let now = Utc::now();
        let order_id = Uuid::new_v4();

        let txn = db.begin().await.map_err(|e| {
            error!(error = %e, "Failed to start transaction for order creation");
            ServiceError::DatabaseError(e)
        })?;

        let order = order::ActiveModel {
            id: Set(order_id),
            user_id: Set(buyer.user_id),
            items: Set(order::OrderLines(priced.lines)),
            shipping_address: Set(request.shipping_address),
            payment_method: Set(request.payment_method),
            total_price: Set(priced.total_price),
            is_paid: Set(false),
            paid_at: Set(None),
            payment_result: Set(None),
            status: Set(OrderStatus::PaymentPending),
            payment_session_id: Set(None),
            gateway_order_id: Set(None),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&txn)
        .await
        .map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to create order in database");
            ServiceError::DatabaseError(e)
        })?;

        UserEntity::update_many()
            .col_expr(user::Column::Cart, Expr::value(CartLines::default()))
            .col_expr(user::Column::UpdatedAt, Expr::value(now))
            .filter(user::Column::Id.eq(buyer.user_id))
            .exec(&txn)
            .await?;

        txn.commit().await.map_err(|e| {
            error!(error = %e, order_id = %order_id, "Failed to commit order creation transaction");
            ServiceError::DatabaseError(e)
        })?;

        info!(order_id = %order.id, total = %order.total_price, "order created");
        Ok(order)
    }

    /// Fetches an order visible to `caller` (owner or admin).
    #[instrument(skip(self, caller))]
    pub async fn get_order(
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
                "Not authorized to view this order".to_string(),
            ));
        }
        Ok(order)
    }

    /// Orders placed by one user, newest first.
    pub async fn list_for_user(&self, user_id: Uuid) -> Result<Vec<OrderModel>, ServiceError> {
        Ok(OrderEntity::find()
            .filter(order::Column::UserId.eq(user_id))
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }

    /// Every order, newest first.
    pub async fn list_all(&self) -> Result<Vec<OrderModel>, ServiceError> {
        Ok(OrderEntity::find()
            .order_by_desc(order::Column::CreatedAt)
            .all(&*self.db_pool)
            .await?)
    }
}
