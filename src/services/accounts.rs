//! Account signup, login and profile lookup.

use crate::{
    auth::{hash_password, verify_password, AuthError, AuthService},
    entities::{user, Role},
    errors::ServiceError,
};
use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, PaginatorTrait, QueryFilter,
    Set,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{info, instrument, warn};
use validator::Validate;

#[derive(Clone)]
pub struct UserService {
    db: Arc<DatabaseConnection>,
    auth: Arc<AuthService>,
}

impl UserService {
    pub fn new(db: Arc<DatabaseConnection>, auth: Arc<AuthService>) -> Self {
        Self { db, auth }
    }

    /// Registers a customer account and signs them in.
    #[instrument(skip_all, fields(email = %input.email))]
    pub async fn signup(&self, input: SignupInput) -> Result<AuthResponse, ServiceError> {
        input.validate()?;

        let user = self
            .create_user(&input.name, &input.email, &input.password, Role::Customer)
            .await?;
        self.respond(user)
    }

    #[instrument(skip_all, fields(email = %input.email))]
    pub async fn login(&self, input: LoginInput) -> Result<AuthResponse, ServiceError> {
        input.validate()?;

        let email = normalize_email(&input.email);
        let user = user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .one(&*self.db)
            .await?
            .ok_or(AuthError::InvalidCredentials)?;

        if !verify_password(&user.password_hash, &input.password)? {
            warn!(user_id = user.id, "login failed: wrong password");
            return Err(AuthError::InvalidCredentials.into());
        }

        info!(user_id = user.id, "user logged in");
        self.respond(user)
    }

    /// Current profile of the caller
    #[instrument(skip(self))]
    pub async fn me(&self, user_id: i32) -> Result<user::Model, ServiceError> {
        user::Entity::find_by_id(user_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("User {} not found", user_id)))
    }

    /// Inserts an account with a freshly hashed password.
    pub async fn create_user(
        &self,
        name: &str,
        email: &str,
        password: &str,
        role: Role,
    ) -> Result<user::Model, ServiceError> {
        let email = normalize_email(email);

        let taken = user::Entity::find()
            .filter(user::Column::Email.eq(email.as_str()))
            .count(&*self.db)
            .await?;
        if taken > 0 {
            return Err(user_exists());
        }

        let password_hash = hash_password(password)?;
        let now = Utc::now();
        let user = user::ActiveModel {
            name: Set(name.trim().to_string()),
            email: Set(email),
            password_hash: Set(password_hash),
            role: Set(role),
            created_at: Set(now),
            updated_at: Set(now),
            ..Default::default()
        }
        .insert(&*self.db)
        .await
        .map_err(ServiceError::from)
        .map_err(|e| if e.is_unique_violation() { user_exists() } else { e })?;

        info!(user_id = user.id, role = %user.role, "user created");
        Ok(user)
    }

    fn respond(&self, user: user::Model) -> Result<AuthResponse, ServiceError> {
        let token = self.auth.issue_token(&user)?;
        Ok(AuthResponse {
            user,
            token,
            expires_in: self.auth.expires_in(),
        })
    }
}

fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

fn user_exists() -> ServiceError {
    ServiceError::BadRequest("User already exists".to_string())
}

/// Names are stored trimmed, so the trimmed value is what must be non-empty.
fn validate_name(name: &str) -> Result<(), validator::ValidationError> {
    if name.trim().is_empty() {
        let mut err = validator::ValidationError::new("name");
        err.message = Some("name must not be blank".into());
        return Err(err);
    }
    Ok(())
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct SignupInput {
    #[validate(length(max = 100), custom = "validate_name")]
    pub name: String,
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 8, max = 128))]
    pub password: String,
}

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct LoginInput {
    #[validate(email)]
    pub email: String,
    #[validate(length(min = 1))]
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct AuthResponse {
    pub user: user::Model,
    pub token: String,
    pub expires_in: i64,
}
