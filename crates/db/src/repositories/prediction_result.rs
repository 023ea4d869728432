use sqlx::{Row, SqliteConnection};

use matchcast_core::domain::prediction::{
    HistoryEntry, MatchId, MatchRecord, PredictedLabel, PredictionResult, ResultId,
};
use matchcast_core::domain::user::UserId;

use super::game_match::{decode_features, feature_columns};
use super::{format_timestamp, parse_timestamp, RepositoryError, ResultRepository};
use crate::DbPool;

pub struct SqlResultRepository {
    pool: DbPool,
}

impl SqlResultRepository {
    pub fn new(pool: DbPool) -> Self {
        Self { pool }
    }
}

fn row_to_entry(row: &sqlx::sqlite::SqliteRow) -> Result<HistoryEntry, RepositoryError> {
    let result_id: String =
        row.try_get("result_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let match_id: String =
        row.try_get("match_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let user_id: String =
        row.try_get("user_id").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let win_probability: f64 =
        row.try_get("win_probability").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let label: String =
        row.try_get("predicted_label").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let model_version: String =
        row.try_get("model_version").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let predicted_at: String =
        row.try_get("predicted_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;
    let match_created_at: String =
        row.try_get("match_created_at").map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let predicted_label =
        label.parse::<PredictedLabel>().map_err(|e| RepositoryError::Decode(e.to_string()))?;

    let match_record = MatchRecord {
        id: MatchId(match_id.clone()),
        user_id: UserId(user_id.clone()),
        features: decode_features(row)?,
        created_at: parse_timestamp("match_created_at", &match_created_at)?,
    };
    let result = PredictionResult {
        id: ResultId(result_id),
        match_id: MatchId(match_id),
        user_id: UserId(user_id),
        win_probability,
        predicted_label,
        model_version,
        predicted_at: parse_timestamp("predicted_at", &predicted_at)?,
    };

    Ok(HistoryEntry { result, match_record })
}

#[async_trait::async_trait]
impl ResultRepository for SqlResultRepository {
    async fn insert(
        &self,
        conn: &mut SqliteConnection,
        result: &PredictionResult,
    ) -> Result<ResultId, RepositoryError> {
        sqlx::query(
            "INSERT INTO prediction_result
                 (id, match_id, user_id, win_probability, predicted_label, model_version, predicted_at)
             VALUES (?, ?, ?, ?, ?, ?, ?)",
        )
        .bind(&result.id.0)
        .bind(&result.match_id.0)
        .bind(&result.user_id.0)
        .bind(result.win_probability)
        .bind(result.predicted_label.as_str())
        .bind(&result.model_version)
        .bind(format_timestamp(&result.predicted_at))
        .execute(&mut *conn)
        .await?;

        Ok(result.id.clone())
    }

    async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<HistoryEntry>, RepositoryError> {
        // rowid breaks ties between results stamped in the same instant.
        let sql = format!(
            "SELECT r.id AS result_id, r.match_id, r.user_id, r.win_probability,
                    r.predicted_label, r.model_version, r.predicted_at,
                    m.created_at AS match_created_at, {}
             FROM prediction_result r
             JOIN game_match m ON m.id = r.match_id
             WHERE r.user_id = ?
             ORDER BY r.predicted_at DESC, r.rowid DESC",
            feature_columns(Some("m"))
        );
        let rows = sqlx::query(&sql).bind(&user_id.0).fetch_all(&self.pool).await?;

        rows.iter().map(row_to_entry).collect::<Result<Vec<_>, _>>()
    }

    async fn count_for_user(&self, user_id: &UserId) -> Result<i64, RepositoryError> {
        let row = sqlx::query("SELECT COUNT(*) AS count FROM prediction_result WHERE user_id = ?")
            .bind(&user_id.0)
            .fetch_one(&self.pool)
            .await?;
        row.try_get("count").map_err(|e| RepositoryError::Decode(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use chrono::{Duration, Utc};

    use matchcast_core::domain::prediction::{MatchId, MatchRecord, PredictionResult};
    use matchcast_core::domain::signals::{CategoricalSignals, ObjectiveDiffs, Side};
    use matchcast_core::domain::user::UserId;
    use matchcast_core::features::FeatureEncoder;

    use super::SqlResultRepository;
    use crate::repositories::test_support::{migrated_pool, seed_user};
    use crate::repositories::{MatchRepository, ResultRepository, SqlMatchRepository};
    use crate::DbPool;

    async fn store_prediction(
        pool: &DbPool,
        user_id: &UserId,
        probability: f64,
        offset_secs: i64,
    ) -> PredictionResult {
        let at = Utc::now() + Duration::seconds(offset_secs);
        let record = MatchRecord::new(
            user_id.clone(),
            FeatureEncoder::encode(&CategoricalSignals::uniform(Side::Red), &ObjectiveDiffs::default()),
            at,
        );
        let result = PredictionResult::from_score(&record, probability, "v-test", at);

        let mut tx = pool.begin().await.expect("begin");
        SqlMatchRepository::new(pool.clone()).insert(&mut *tx, &record).await.expect("match");
        SqlResultRepository::new(pool.clone()).insert(&mut *tx, &result).await.expect("result");
        tx.commit().await.expect("commit");
        result
    }

    #[tokio::test]
    async fn list_by_user_is_newest_first_and_joined() {
        let pool = migrated_pool().await;
        let alice = seed_user(&pool, "alice").await;
        let oldest = store_prediction(&pool, &alice, 0.2, -20).await;
        let newest = store_prediction(&pool, &alice, 0.9, 0).await;
        let middle = store_prediction(&pool, &alice, 0.6, -10).await;

        let history = SqlResultRepository::new(pool.clone()).list_by_user(&alice).await.expect("list");
        let ids: Vec<_> = history.iter().map(|entry| entry.result.id.clone()).collect();
        assert_eq!(ids, vec![newest.id, middle.id, oldest.id]);

        for entry in &history {
            assert_eq!(entry.match_record.id, entry.result.match_id);
            assert_eq!(entry.match_record.user_id, alice);
            assert!(entry.match_record.signals().is_ok());
        }
    }

    #[tokio::test]
    async fn list_by_user_excludes_other_users() {
        let pool = migrated_pool().await;
        let alice = seed_user(&pool, "alice").await;
        let bob = seed_user(&pool, "bob").await;
        store_prediction(&pool, &alice, 0.7, 0).await;
        store_prediction(&pool, &bob, 0.3, 0).await;
        store_prediction(&pool, &bob, 0.4, 1).await;

        let repo = SqlResultRepository::new(pool.clone());
        let history = repo.list_by_user(&alice).await.expect("list");
        assert_eq!(history.len(), 1);
        assert!(history.iter().all(|entry| entry.result.user_id == alice));
        assert_eq!(repo.count_for_user(&bob).await.expect("count"), 2);
    }

    #[tokio::test]
    async fn user_without_predictions_gets_empty_history() {
        let pool = migrated_pool().await;
        let carol = seed_user(&pool, "carol").await;
        let history = SqlResultRepository::new(pool).list_by_user(&carol).await.expect("list");
        assert!(history.is_empty());
    }

    #[tokio::test]
    async fn second_result_for_same_match_is_rejected() {
        let pool = migrated_pool().await;
        let alice = seed_user(&pool, "alice").await;
        let first = store_prediction(&pool, &alice, 0.55, 0).await;

        let record = SqlMatchRepository::new(pool.clone())
            .find_by_id(&first.match_id)
            .await
            .expect("find")
            .expect("present");
        let duplicate = PredictionResult::from_score(&record, 0.1, "v-test", Utc::now());

        let mut conn = pool.acquire().await.expect("acquire");
        let error = SqlResultRepository::new(pool.clone())
            .insert(&mut *conn, &duplicate)
            .await
            .expect_err("unique match_id");
        assert!(error.is_unique_violation(), "unexpected error: {error}");
    }

    #[tokio::test]
    async fn result_without_match_violates_foreign_key() {
        let pool = migrated_pool().await;
        let alice = seed_user(&pool, "alice").await;
        let orphan = MatchRecord {
            id: MatchId("M-never-inserted".to_string()),
            ..MatchRecord::new(
                alice,
                FeatureEncoder::encode(&CategoricalSignals::default(), &ObjectiveDiffs::default()),
                Utc::now(),
            )
        };
        let result = PredictionResult::from_score(&orphan, 0.5, "v-test", Utc::now());

        let mut conn = pool.acquire().await.expect("acquire");
        let error = SqlResultRepository::new(pool.clone())
            .insert(&mut *conn, &result)
            .await
            .expect_err("fk violation");
        assert!(error.is_foreign_key_violation(), "unexpected error: {error}");
    }
}
