use crate::{
    auth::{hash_password, verify_password, AuthError, AuthService, TokenResponse},
    db::DbPool,
    entities::user::{self, CartLines, Entity as UserEntity, Model as UserModel},
    errors::ServiceError,
};
use chrono::{DateTime, Utc};
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set, SqlErr};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use utoipa::ToSchema;
use uuid::Uuid;
use validator::{Validate, ValidationError};

fn validate_phone(phone: &str) -> Result<(), ValidationError> {
    let digits = phone.trim_start_matches('+');
    if digits.len() < 10 || digits.len() > 15 || !digits.chars().all(|c| c.is_ascii_digit()) {
        return Err(ValidationError::new("invalid_phone"));
    }
    Ok(())
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct RegisterRequest {
    #[validate(length(min = 1, max = 100, message = "First name is required"))]
    #[serde(alias = "firstName")]
    pub first_name: String,
    #[validate(length(min = 1, max = 100, message = "Last name is required"))]
    #[serde(alias = "lastName")]
    pub last_name: String,
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 6, max = 128, message = "Password must be at least 6 characters"))]
    pub password: String,
    #[validate(custom = "validate_phone")]
    #[serde(default)]
    pub phone: Option<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize, Validate, ToSchema)]
pub struct LoginRequest {
    #[validate(email(message = "Invalid email address"))]
    pub email: String,
    #[validate(length(min = 1, message = "Password is required"))]
    pub password: String,
}

/// Public view of an account
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, ToSchema)]
pub struct UserProfile {
    pub id: Uuid,
    pub first_name: String,
    pub last_name: String,
    pub email: String,
    pub phone: Option<String>,
    pub is_admin: bool,
    pub created_at: DateTime<Utc>,
}

impl From<&UserModel> for UserProfile {
    fn from(model: &UserModel) -> Self {
        Self {
            id: model.id,
            first_name: model.first_name.clone(),
            last_name: model.last_name.clone(),
            email: model.email.clone(),
            phone: model.phone.clone(),
            is_admin: model.is_admin,
            created_at: model.created_at,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct AuthResponse {
    pub user: UserProfile,
    pub token: TokenResponse,
}

fn normalize_email(email: &str) -> String {
    email.trim().to_ascii_lowercase()
}

#[derive(Clone)]
pub struct UserService {
    db_pool: Arc<DbPool>,
    auth: Arc<AuthService>,
}

impl UserService {
    pub fn new(db_pool: Arc<DbPool>, auth: Arc<AuthService>) -> Self {
        Self { db_pool, auth }
    }

    async fn find_by_email(&self, email: &str) -> Result<Option<UserModel>, ServiceError> {
        Ok(UserEntity::find()
            .filter(user::Column::Email.eq(normalize_email(email)))
            .one(&*self.db_pool)
            .await?)
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn register(&self, request: RegisterRequest) -> Result<AuthResponse, ServiceError> {
        request.validate()?;

        if self.find_by_email(&request.email).await?.is_some() {
            return Err(ServiceError::Conflict("User already exists".to_string()));
        }

        let now = Utc::now();
        let created = user::ActiveModel {
            id: Set(Uuid::new_v4()),
            first_name: Set(request.first_name.trim().to_string()),
            last_name: Set(request.last_name.trim().to_string()),
            email: Set(normalize_email(&request.email)),
            password_hash: Set(hash_password(&request.password)?),
            phone: Set(request.phone.map(|p| p.trim().to_string())),
            is_admin: Set(false),
            cart: Set(CartLines::default()),
            created_at: Set(now),
            updated_at: Set(now),
        }
        .insert(&*self.db_pool)
        .await
        .map_err(|e| match e.sql_err() {
            Some(SqlErr::UniqueConstraintViolation(_)) => {
                ServiceError::Conflict("User already exists".to_string())
            }
            _ => ServiceError::DatabaseError(e),
        })?;

        info!(user_id = %created.id, "user registered");
        Ok(AuthResponse {
            token: self.auth.generate_token(&created)?,
            user: UserProfile::from(&created),
        })
    }

    #[instrument(skip(self, request), fields(email = %request.email))]
    pub async fn login(&self, request: LoginRequest) -> Result<AuthResponse, ServiceError> {
        request.validate()?;

        let Some(user) = self.find_by_email(&request.email).await? else {
            warn!("login for unknown email");
            return Err(AuthError::InvalidCredentials.into());
        };
        if !verify_password(&request.password, &user.password_hash)? {
            warn!(user_id = %user.id, "login with wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        Ok(AuthResponse {
            token: self.auth.generate_token(&user)?,
            user: UserProfile::from(&user),
        })
    }

    pub async fn profile(&self, user_id: Uuid) -> Result<UserProfile, ServiceError> {
        UserEntity::find_by_id(user_id)
            .one(&*self.db_pool)
            .await?
            .map(|u| UserProfile::from(&u))
            .ok_or_else(|| ServiceError::NotFound(format!("User {user_id} not found")))
    }

    /// Grants or revokes the admin flag. Takes effect on the next login.
    #[instrument(skip(self))]
    pub async fn set_admin(&self, email: &str, is_admin: bool) -> Result<UserProfile, ServiceError> {
        let user = self
            .find_by_email(email)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {email} not found")))?;

        let mut active: user::ActiveModel = user.into();
        active.is_admin = Set(is_admin);
        active.updated_at = Set(Utc::now());
        let updated = active.update(&*self.db_pool).await?;

        info!(user_id = %updated.id, is_admin, "admin flag changed");
        Ok(UserProfile::from(&updated))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn phone_validation() {
        assert!(validate_phone("9876543210").is_ok());
        assert!(validate_phone("+919876543210").is_ok());
        assert!(validate_phone("98765").is_err());
        assert!(validate_phone("98765abcde").is_err());
    }

    #[test]
    fn register_request_accepts_camel_case() {
        let req: RegisterRequest = serde_json::from_value(serde_json::json!({
            "firstName": "Asha",
            "lastName": "Rao",
            "email": "asha@example.com",
            "password": "secret1",
            "phone": "9876543210"
        }))
        .unwrap();
        assert!(req.validate().is_ok());
        assert_eq!(normalize_email(" Asha@Example.COM "), "asha@example.com");
    }
}
