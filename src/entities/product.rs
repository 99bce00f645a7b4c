use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::FromJsonQueryResult;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;
use uuid::Uuid;

/// Catalog item priced per unit of weight.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize, ToSchema)]
#[sea_orm(table_name = "products")]
#[schema(as = Product)]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,
    pub title: String,
    #[sea_orm(column_type = "Text")]
    pub description: String,
    #[sea_orm(column_type = "Decimal(Some((19, 4)))")]
    pub price_per_unit: Decimal,
    /// Informational only; order pricing ignores it.
    #[sea_orm(column_type = "Decimal(Some((19, 4)))", nullable)]
    pub discount: Option<Decimal>,
    #[sea_orm(column_type = "Json")]
    pub weights: WeightOptions,
    pub image: String,
    pub stock_quantity: i32,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

/// Purchasable weight options such as "500g" or "1kg".
#[derive(
    Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize, FromJsonQueryResult, ToSchema,
)]
pub struct WeightOptions(pub Vec<String>);

impl WeightOptions {
    /// An empty option list accepts any weight.
    pub fn offers(&self, weight: &str) -> bool {
        self.0.is_empty() || self.0.iter().any(|w| w.eq_ignore_ascii_case(weight))
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {}

impl ActiveModelBehavior for ActiveModel {}
