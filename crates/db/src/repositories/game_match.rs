use sqlx::{Row, SqliteConnection};

use matchcast_core::domain::prediction::{MatchId, MatchRecord};
use matchcast_core::domain::user::UserId;
use matchcast_core::features::{FeatureEncoder, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

use super::{format_timestamp, parse_timestamp, MatchRepository, RepositoryError};
use crate::DbPool;

pub struct SqlMatchRepository {
    pool: DbPool,
}

impl SqlMatchRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

/// Comma-separated feature columns in vector order, optionally table-qualified.
pub(crate) fn feature_columns(qualifier: Option<&str>) -> String {
    FEATURE_NAMES
        .iter()
        .map(|name| match qualifier {
            Some(table) => format!("{table}.{name} AS {name}"),
            None => (*name).to_string(),
        })
        .collect::<Vec<_>>()
        .join(", ")
}

/// Reads the 23 feature columns back into a vector and checks that it is a
/// well-formed encoding.
pub(crate) fn decode_features(
    row: &sqlx::sqlite::SqliteRow,
) -> Result<FeatureVector, RepositoryError> {
    let mut slots = [0.0; FEATURE_COUNT];
    for (slot, name) in slots.iter_mut().zip(FEATURE_NAMES) {
        let value: i64 = row.try_get(name).map_err(|e| RepositoryError::Decode(e.to_string()))?;
        *slot = value as f64;
    }
    let vector = FeatureVector(slots);
    FeatureEncoder::decode(&vector).map_err(|e| RepositoryError::Decode(e.to_string()))?;
    Ok(vector)
}

fn row_to_match(row: &sqlx::sqlite::SqliteRow) -> Result<MatchRecord, RepositoryError> {
    let id: String = row.try_get("id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let user_id: String =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let created_at: String =
        row.try_get("created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    Ok(MatchRecord {
        id: MatchId(id),
        user_id: UserId(user_id),
        features: decode_features(row)?,
        created_at: parse_timestamp("created_at", &created_at)?,
    })
}

#[async_trait::async_trait]
impl MatchRepository for SqlMatchRepository {
    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        record: &MatchRecord,
    ) -> Result<MatchId, RepositoryError> {
        // Only well-formed encodings are stored; integral columns follow from that.
        FeatureEncoder::decode(&record.features)
            .map_err(|e| RepositoryError::InvalidRecord(e.to_string()))?;

        let placeholders = vec!["?"; FEATURE_COUNT].join(", ");
        let sql = format!(
            "INSERT INTO game_match (id, user_id, {}, created_at) VALUES (?, ?, {placeholders}, ?)",
            feature_columns(None)
        );

        let mut query = sqlx::query(&sql).bind(&record.id.0).bind(&record.user_id.0);
        for value in record.features.as_slice() {
            query = query.bind(*value as i64);
        }
        query.bind(format_timestamp(&record.created_at)).execute(&mut *conn).await?;

        Ok(record.id.clone())
    }

    async fn find_by_id(&self, id: &MatchId) -> Result<Option<MatchRecord>, RepositoryError> {
        let sql = format!(
            "SELECT id, user_id, {}, created_at FROM game_match WHERE id = ?",
            feature_columns(None)
        );
        let row = sqlx::query(&sql).bind(&id.0).fetch_optional(&self.pool).await?;

        row.as_ref().map(row_to_match).transpose()
    }

    async fn count_for_user(&self, user_id: &UserId) -> Result<i64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM game_match WHERE user_id = ?")
            .bind(&user_id.0)
            .fetch_one(&self.pool)
            .await?;
        row.try_get("count").map_err(|e| RepositoryError::Decode(e.to_string()))
    }
}
