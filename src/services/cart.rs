use crate::{
    db::DbPool,
    entities::{
        product::Entity as ProductEntity,
        user::{self, CartLine, CartLines, Entity as UserEntity, Model as UserModel},
    },
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ConnectionTrait, DatabaseTransaction, EntityTrait, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::Validate;

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct AddToCartRequest {
    #[serde(alias = "productId")]
    pub product_id: Uuid,
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u32,
    #[serde(default)]
    pub weight: String,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct UpdateCartItemRequest {
    #[validate(range(min = 1, message = "Quantity must be at least 1"))]
    pub quantity: u32,
}

/// Cart lines live inside the user row; every mutation rewrites the whole
/// cart in a transaction.
#[derive(Clone)]
pub struct CartService {
    db_pool: Arc<DbPool>,
}

async fn load_user<C: ConnectionTrait>(db: &C, user_id: Uuid) -> Result<UserModel, ServiceError> {
    UserEntity::find_by_id(user_id)
        .one(db)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("User {user_id} not found")))
}

async fn save_cart(
    txn: &DatabaseTransaction,
    user: UserModel,
    cart: CartLines,
) -> Result<UserModel, ServiceError> {
    let mut active: user::ActiveModel = user.into();
    active.cart = Set(cart);
    active.updated_at = Set(Utc::now());
    Ok(active.update(txn).await?)
}

impl CartService {
    pub fn new(db_pool: Arc<DbPool>) -> Self {
        Self { db_pool }
    }

    pub async fn get_cart(&self, user_id: Uuid) -> Result<Vec<CartLine>, ServiceError> {
        Ok(load_user(&*self.db_pool, user_id).await?.cart.0)
    }

    /// Adds a product at one of its weight options. A line for the same
    /// product and weight has its quantity increased instead.
    #[instrument(skip(self, request), fields(user_id = %user_id, product_id = %request.product_id))]
    pub async fn add_item(
        &self,
        user_id: Uuid,
        request: AddToCartRequest,
    ) -> Result<Vec<CartLine>, ServiceError> {
        request.validate()?;

        let txn = self.db_pool.begin().await?;
        let user = load_user(&txn, user_id).await?;
        let product = ProductEntity::find_by_id(request.product_id)
            .one(&txn)
            .await?
            .ok_or_else(|| {
                ServiceError::NotFound(format!("Product {} not found", request.product_id))
            })?;

        if !product.weights.offers(&request.weight) {
            return Err(ServiceError::InvalidRequest(format!(
                "Weight '{}' is not offered for {}",
                request.weight, product.title
            )));
        }

        let mut cart = user.cart.clone();
        match cart
            .0
            .iter_mut()
            .find(|line| line.product_id == product.id && line.weight == request.weight)
        {
            Some(line) => line.quantity = line.quantity.saturating_add(request.quantity),
            None => cart.0.push(CartLine {
                id: Uuid::new_v4(),
                product_id: product.id,
                title: product.title.clone(),
                image: product.image.clone(),
                price_per_unit: product.price_per_unit,
                discount: product.discount,
                weight: request.weight.clone(),
                quantity: request.quantity,
            }),
        }

        let saved = save_cart(&txn, user, cart).await?;
        txn.commit().await?;

        info!(lines = saved.cart.0.len(), "cart item added");
        Ok(saved.cart.0)
    }

    #[instrument(skip(self, request), fields(user_id = %user_id, line_id = %line_id))]
    pub async fn update_quantity(
        &self,
        user_id: Uuid,
        line_id: Uuid,
        request: UpdateCartItemRequest,
    ) -> Result<CartLine, ServiceError> {
        request.validate()?;

        let txn = self.db_pool.begin().await?;
        let user = load_user(&txn, user_id).await?;

        let mut cart = user.cart.clone();
        let line = cart
            .find_mut(line_id)
            .ok_or_else(|| ServiceError::NotFound(format!("Cart item {line_id} not found")))?;
        line.quantity = request.quantity;
        let updated = line.clone();

        save_cart(&txn, user, cart).await?;
        txn.commit().await?;
        Ok(updated)
    }

    #[instrument(skip(self), fields(user_id = %user_id, line_id = %line_id))]
    pub async fn remove_item(
        &self,
        user_id: Uuid,
        line_id: Uuid,
    ) -> Result<Vec<CartLine>, ServiceError> {
        let txn = self.db_pool.begin().await?;
        let user = load_user(&txn, user_id).await?;

        let mut cart = user.cart.clone();
        let before = cart.0.len();
        cart.0.retain(|line| line.id != line_id);
        if cart.0.len() == before {
            return Err(ServiceError::NotFound(format!(
                "Cart item {line_id} not found"
            )));
        }

        let saved = save_cart(&txn, user, cart).await?;
        txn.commit().await?;
        Ok(saved.cart.0)
    }
}
