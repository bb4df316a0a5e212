//! Authentication and user management service

use argon2::{
    password_hash::{rand_core::OsRng, PasswordHash, PasswordHasher, PasswordVerifier, SaltString},
    Argon2,
};
use chrono::Utc;
use validator::Validate;

use crate::{
    config::{AuthConfig, BootstrapConfig},
    error::{AppError, AppResult},
    models::user::{RegisterUser, Role, User, UserClaims, UserQuery},
    repository::Repository,
};

#[derive(Clone)]
pub struct UsersService {
    repository: Repository,
    config: AuthConfig,
}

impl UsersService {
    pub fn new(repository: Repository, config: AuthConfig) -> Self {
        Self { repository, config }
    }

    /// Register a new user account. New accounts always start as students;
    /// promotion to admin goes through `set_role`.
    pub async fn register(&self, request: RegisterUser) -> AppResult<(String, User)> {
        request
            .validate()
            .map_err(|e| AppError::Validation(e.to_string()))?;

        if self.repository.users.email_exists(&request.email).await? {
            return Err(AppError::Conflict("Email already registered".to_string()));
        }

        let password_hash = self.hash_password(&request.password)?;

        let user = self
            .repository
            .users
            .create(&request.email, &password_hash, &request.name, Role::Student)
            .await?;

        tracing::info!(user_id = user.id, "user registered");

        let token = self.create_token_for_user(&user)?;
        Ok((token, user))
    }

    /// Create the bootstrap admin account on startup if it does not exist.
    /// Without it a fresh install would have no way to reach the admin tier.
    pub async fn ensure_bootstrap_admin(&self, bootstrap: &BootstrapConfig) -> AppResult<()> {
        if self
            .repository
            .users
            .email_exists(&bootstrap.admin_email)
            .await?
        {
            return Ok(());
        }

        let password_hash = self.hash_password(&bootstrap.admin_password)?;
        let admin = self
            .repository
            .users
            .create(
                &bootstrap.admin_email,
                &password_hash,
                &bootstrap.admin_name,
                Role::Admin,
            )
            .await?;

        tracing::info!(user_id = admin.id, email = %admin.email, "bootstrap admin created");
        Ok(())
    }

    /// Authenticate by email and password, returning a JWT token.
    /// The failure message never reveals which of the two was wrong.
    pub async fn authenticate(&self, email: &str, password: &str) -> AppResult<(String, User)> {
        let user = self
            .repository
            .users
            .get_by_email(email)
            .await?
            .ok_or_else(|| AppError::Authentication("Invalid email or password".to_string()))?;

        if !self.verify_password(&user, password)? {
            return Err(AppError::Authentication(
                "Invalid email or password".to_string(),
            ));
        }

        let token = self.create_token_for_user(&user)?;
        Ok((token, user))
    }

    /// Create JWT token for a user
    fn create_token_for_user(&self, user: &User) -> AppResult<String> {
        let now = Utc::now().timestamp();
        let exp = now + (self.config.jwt_expiration_hours as i64 * 3600);

        let claims = UserClaims {
            sub: user.email.clone(),
            user_id: user.id,
            role: user.role,
            exp,
            iat: now,
        };

        claims
            .create_token(&self.config.jwt_secret)
            .map_err(|e| AppError::Internal(format!("Failed to create token: {}", e)))
    }

    /// Verify user password
    fn verify_password(&self, user: &User, password: &str) -> AppResult<bool> {
        let parsed_hash = PasswordHash::new(&user.password_hash)
            .map_err(|_| AppError::Internal("Invalid password hash".to_string()))?;
        Ok(Argon2::default()
            .verify_password(password.as_bytes(), &parsed_hash)
            .is_ok())
    }

    /// Hash a password using Argon2
    pub fn hash_password(&self, password: &str) -> AppResult<String> {
        let salt = SaltString::generate(&mut OsRng);
        let argon2 = Argon2::default();
        let hash = argon2
            .hash_password(password.as_bytes(), &salt)
            .map_err(|e| AppError::Internal(format!("Failed to hash password: {}", e)))?;
        Ok(hash.to_string())
    }

    /// Get user by ID
    pub async fn get_by_id(&self, id: i32) -> AppResult<User> {
        self.repository.users.get_by_id(id).await
    }

    /// List users with pagination
    pub async fn list_users(&self, query: &UserQuery) -> AppResult<(Vec<User>, i64)> {
        self.repository.users.list(query).await
    }

    /// Change a user's role
    pub async fn set_role(&self, id: i32, role: Role) -> AppResult<User> {
        let user = self.repository.users.set_role(id, role).await?;
        tracing::info!(user_id = id, role = %role, "role updated");
        Ok(user)
    }
}
