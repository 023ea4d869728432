use async_trait::async_trait;
use chrono::{DateTime, SecondsFormat, Utc};
use sqlx::SqliteConnection;
use thiserror::Error;

use matchcast_core::domain::prediction::{
    HistoryEntry, MatchId, MatchRecord, PredictionResult, ResultId,
};
use matchcast_core::domain::user::{User, UserId};

pub mod game_match;
pub mod prediction_result;
pub mod user;

pub use game_match::SqlMatchRepository;
pub use prediction_result::SqlResultRepository;
pub use user::SqlUserRepository;

#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("decode error: {0}")]
    Decode(String),
    #[error("invalid record: {0}")]
    InvalidRecord(String),
}

impl RepositoryError {
    pub fn is_unique_violation(&self) -> bool {
        matches!(self, Self::Database(sqlx::Error::Database(db)) if db.is_unique_violation())
    }

    pub fn is_foreign_key_violation(&self) -> bool {
        matches!(self, Self::Database(sqlx::Error::Database(db)) if db.is_foreign_key_violation())
    }
}

#[async_trait]
pub trait UserRepository: Send + Sync {
    async fn insert(&self, user: &User) -> Result<UserId, RepositoryError>;
    async fn find_by_username(&self, username: &str) -> Result<Option<User>, RepositoryError>;
    async fn find_by_id(&self, id: &UserId) -> Result<Option<User>, RepositoryError>;
}

/// Match rows are only ever written inside a caller-owned transaction, so
/// `insert` takes the connection rather than the pool.
#[async_trait]
pub trait MatchRepository: Send + Sync {
    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        record: &MatchRecord,
    ) -> Result<MatchId, RepositoryError>;
    async fn find_by_id(&self, id: &MatchId) -> Result<Option<MatchRecord>, RepositoryError>;
    async fn count_for_user(&self, user_id: &UserId) -> Result<i64, RepositoryError>;
}

#[async_trait]
pub trait ResultRepository: Send + Sync {
    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        result: &PredictionResult,
    ) -> Result<ResultId, RepositoryError>;
    /// Results joined with their match records, newest first.
    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<HistoryEntry>, RepositoryError>;
    async fn count_for_user(&self, user_id: &UserId) -> Result<i64, RepositoryError>;
}

pub(crate) fn format_timestamp(at: &DateTime<Utc>) -> String {
    at.to_rfc3339_opts(SecondsFormat::Nanos, true)
}

pub(crate) fn parse_timestamp(column: &str, raw: &str) -> Result<DateTime<Utc>, RepositoryError> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|e| RepositoryError::Decode(format!("{column}: {e}")))
}
