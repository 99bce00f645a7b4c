use crate::{
    db::DbPool,
    entities::product::{self, Entity as ProductEntity, Model as ProductModel, WeightOptions},
    errors::ServiceError,
};
use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{ActiveModelTrait, EntityTrait, QueryOrder, Set};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_positive_price(price: &Decimal) -> Result<(), ValidationError> {
    if *price <= Decimal::ZERO {
        return Err(ValidationError::new("price_must_be_positive"));
    }
    Ok(())
}

fn validate_non_negative(value: &Decimal) -> Result<(), ValidationError> {
    if value.is_sign_negative() {
        return Err(ValidationError::new("must_not_be_negative"));
    }
    Ok(())
}

/// Full product definition used for both create and replace.
#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct ProductInput {
    #[validate(length(min = 1, max = 200, message = "Title is required"))]
    pub title: String,
    #[validate(length(min = 1, message = "Description is required"))]
    #[serde(alias = "desc")]
    pub description: String,
    #[validate(custom = "validate_positive_price")]
    #[serde(alias = "pricePerKg")]
    pub price_per_unit: Decimal,
    #[validate(custom = "validate_non_negative")]
    #[serde(default)]
    pub discount: Option<Decimal>,
    #[validate(length(min = 1, message = "At least one weight option is required"))]
    pub weights: Vec<String>,
    #[validate(length(min = 1, message = "Image is required"))]
    pub image: String,
    #[validate(range(min = 0, message = "Stock cannot be negative"))]
    #[serde(default, alias = "quantity")]
    pub stock_quantity: i32,
}

#[derive(Clone)]
pub struct CatalogService {
    db_pool: Arc<DbPool>,
}

impl CatalogService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    pub async fn list_products(&self) -> Result<Vec<ProductModel>, ServiceError> {
        Ok(ProductEntity::find()
            .order_by_asc(product::Column::Title)
            .all(&*self.db_pool)
            .await?)
    }

    pub async fn get_product(&self, id: Uuid) -> Result<ProductModel, ServiceError> {
        ProductEntity::find_by_id(id)
            .one(&*self.db_pool)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Product {id} not found")))
    }

    #[instrument(skip(self, input), fields(title = %input.title))]
    pub async fn create_product(&self, input: ProductInput) -> Result<ProductModel, ServiceError> {
        input.validate()?;
        let now = Utc::now();

        let created = product::ActiveModel {
            id: Set(Uuid::new_v4()),
            title: Set(input.title),
            description: Set(input.description),
            price_per_unit: Set(input.price_per_unit),
            discount: Set(input.discount),
            weights: Set(WeightOptions(input.weights)),
            image: Set(input.image),
            stock_quantity: Set(input.stock_quantity),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await?;

        info!(product_id = %created.id, "product created");
        Ok(created)
    }

    /// Replaces every editable field of an existing product.
    #[instrument(skip(self, input))]
    pub async fn update_product(
        &self,
        id: Uuid,
        input: ProductInput,
    ) -> Result<ProductModel, ServiceError> {
        input.validate()?;
        let existing = self.get_product(id).await?;

        let mut active: product::ActiveModel = existing.into();
        active.title = Set(input.title);
        active.description = Set(input.description);
        active.price_per_unit = Set(input.price_per_unit);
        active.discount = Set(input.discount);
        active.weights = Set(WeightOptions(input.weights));
        active.image = Set(input.image);
        active.stock_quantity = Set(input.stock_quantity);
        active.updated_at = Set(Utc::now());

        let updated = active.update(&*self.db_pool).await?;
        info!(product_id = %id, "product updated");
        Ok(updated)
    }

    /// Past orders keep their own snapshot, so deletion is unconditional.
    #[instrument(skip(self))]
    pub async fn delete_product(&self, id: Uuid) -> Result<(), ServiceError> {
        let result = ProductEntity::delete_by_id(id)
            .exec(&*self.db_pool)
            .await?;
        if result.rows_affected == 0 {
            return Err(ServiceError::NotFound(format!("Product {id} not found")));
        }
        info!(product_id = %id, "product deleted");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn input() -> ProductInput {
        ProductInput {
            title: "Mutton curry cut".into(),
            description: "Bone-in".into(),
            price_per_unit: dec!(750),
            discount: None,
            weights: vec!["500g".into()],
            image: "/img/mutton.jpg".into(),
            stock_quantity: 4,
        }
    }

    #[test]
    fn accepts_complete_product() {
        assert!(input().validate().is_ok());
    }

    #[test]
    fn rejects_non_positive_price_and_negative_discount() {
        let mut bad = input();
        bad.price_per_unit = dec!(0);
        assert!(bad.validate().is_err());

        let mut bad = input();
        bad.discount = Some(dec!(-5));
        assert!(bad.validate().is_err());
    }

    #[test]
    fn rejects_missing_weights_and_negative_stock() {
        let mut bad = input();
        bad.weights.clear();
        assert!(bad.validate().is_err());

        let mut bad = input();
        bad.stock_quantity = -1;
        assert!(bad.validate().is_err());
    }

    #[test]
    fn accepts_legacy_field_names() {
        let parsed: ProductInput = serde_json::from_value(serde_json::json!({
            "title": "Prawns",
            "desc": "Cleaned",
            "pricePerKg": "600",
            "weights": ["250g"],
            "image": "/img/prawns.jpg",
            "quantity": 3
        }))
        .unwrap();
        assert_eq!(parsed.price_per_unit, dec!(600));
        assert_eq!(parsed.stock_quantity, 3);
    }
}
