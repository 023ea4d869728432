use std::sync::Arc;

use chrono::Utc;
use secrecy::{ExposeSecret, SecretString};
use thiserror::Error;
use tracing::{info, warn};

use matchcast_core::credentials::{hash_password, verify_password};
use matchcast_core::domain::user::{User, UserId};
use matchcast_core::errors::ApplicationError;
use matchcast_db::{DbPool, RepositoryError, SqlUserRepository, UserRepository};

#[derive(Debug, Error)]
pub enum AuthError {
    #[error("username and password must not be empty")]
    EmptyCredentials,
    #[error("username `{0}` is already registered")]
    DuplicateUsername(String),
    #[error("invalid username or password")]
    InvalidCredential,
    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
    #[error("credential processing failed: {0}")]
    Credential(String),
}

impl From<AuthError> for ApplicationError {
    fn from(value: AuthError) -> Self {
        match value {
            AuthError::EmptyCredentials => Self::EmptyCredentials,
            AuthError::DuplicateUsername(username) => Self::DuplicateUsername(username),
            AuthError::InvalidCredential => Self::InvalidCredential,
            AuthError::Persistence(error) => Self::Persistence(error.to_string()),
            AuthError::Credential(message) => Self::Configuration(message),
        }
    }
}

pub struct AuthService {
    users: Arc<dyn UserRepository>,
    iterations: u32,
}

impl AuthService {
    pub fn new(pool: DbPool, iterations: u32) -> Self {
        Self::with_repository(Arc::new(SqlUserRepository::new(pool)), iterations)
    }

    pub fn with_repository(users: Arc<dyn UserRepository>, iterations: u32) -> Self {
        Self { users, iterations }
    }

    pub async fn register(
        &self,
        username: &str,
        password: &SecretString,
    ) -> Result<UserId, AuthError> {
        let username = normalize(username, password)?;

        // Fast path; the unique index still decides races between two registrations.
        if self.users.find_by_username(&username).await?.is_some() {
            return Err(AuthError::DuplicateUsername(username));
        }

        let credential_hash = digest(password, self.iterations).await?;
        let user = User { id: UserId::generate(), username, credential_hash, created_at: Utc::now() };

        match self.users.insert(&user).await {
            Ok(id) => {
                info!(event_name = "auth.registered", user_id = %id, "user registered");
                Ok(id)
            }
            Err(error) if error.is_unique_violation() => {
                Err(AuthError::DuplicateUsername(user.username))
            }
            Err(error) => Err(AuthError::Persistence(error)),
        }
    }

    /// Unknown usernames and wrong passwords are indistinguishable to the caller.
    pub async fn login(&self, username: &str, password: &SecretString) -> Result<UserId, AuthError> {
        let username = normalize(username, password)?;

        let Some(user) = self.users.find_by_username(&username).await? else {
            warn!(event_name = "auth.login_rejected", reason = "unknown_user", "login rejected");
            return Err(AuthError::InvalidCredential);
        };

        let stored = user.credential_hash.clone();
        let candidate: SecretString = password.expose_secret().to_owned().into();
        let verified = tokio::task::spawn_blocking(move || verify_password(&candidate, &stored))
            .await
            .map_err(|e| AuthError::Credential(e.to_string()))?
            .map_err(|e| AuthError::Credential(e.to_string()))?;

        if verified {
            info!(event_name = "auth.login", user_id = %user.id, "login accepted");
            Ok(user.id)
        } else {
            warn!(
                event_name = "auth.login_rejected",
                reason = "bad_password",
                user_id = %user.id,
                "login rejected"
            );
            Err(AuthError::InvalidCredential)
        }
    }
}

fn normalize(username: &str, password: &SecretString) -> Result<String, AuthError> {
    let username = username.trim();
    if username.is_empty() || password.expose_secret().is_empty() {
        return Err(AuthError::EmptyCredentials);
    }
    Ok(username.to_string())
}

/// Key stretching is CPU-bound, so it runs off the async workers.
async fn digest(password: &SecretString, iterations: u32) -> Result<String, AuthError> {
    let password: SecretString = password.expose_secret().to_owned().into();
    tokio::task::spawn_blocking(move || hash_password(&password, iterations))
        .await
        .map_err(|e| AuthError::Credential(e.to_string()))
}
