use crate::{
    db::DbPool,
    entities::order::{self, Entity as OrderEntity, OrderStatus},
    errors::ServiceError,
};
use rust_decimal::Decimal;
use sea_orm::{ColumnTrait, EntityTrait, PaginatorTrait, QueryFilter, QuerySelect};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::instrument;
use utoipa::ToSchema;

/// Dashboard figures, recomputed on every call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct DashboardStats {
    pub total_orders: u64,
    pub total_revenue: Decimal,
    pub undelivered_orders: u64,
}

#[derive(Clone)]
pub struct AdminService {
    db_pool: Arc<DbPool>,
}

impl AdminService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    /// Revenue sums `total_price` over every order regardless of status.
    #[instrument(skip(self))]
    pub async fn dashboard_stats(&self) -> Result<DashboardStats, ServiceError> {
        let db = &*self.db_pool;

        let total_orders = OrderEntity::find().count(db).await?;

        let totals: Vec<Decimal> = OrderEntity::find()
            .select_only()
            .column(order::Column::TotalPrice)
            .into_tuple()
            .all(db)
            .await?;
        let total_revenue = totals.into_iter().sum();

        let undelivered_orders = OrderEntity::find()
            .filter(order::Column::Status.ne(OrderStatus::Delivered))
            .count(db)
            .await?;

        Ok(DashboardStats {
            total_orders,
            total_revenue,
            undelivered_orders,
        })
    }
}
