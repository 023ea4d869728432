//! The prediction unit of work: the classifier is consulted first, then the match
//! insert and result insert commit together or not at all.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use sqlx::{Sqlite, Transaction};
use thiserror::Error;
use tracing::{debug, info, warn};

use matchcast_core::domain::prediction::{MatchRecord, PredictionOutcome, PredictionResult};
use matchcast_core::domain::signals::MatchSignals;
use matchcast_core::domain::user::UserId;
use matchcast_core::errors::ApplicationError;
use matchcast_core::features::{FeatureEncoder, FeatureVector};
use matchcast_core::ml::{check_probability, Classifier, ClassifierError};
use matchcast_db::{
    DbPool, MatchRepository, RepositoryError, ResultRepository, SqlMatchRepository,
    SqlResultRepository,
};

use crate::scorer::ScorerHandle;

#[derive(Debug, Error)]
pub enum PredictionError {
    #[error("persistence failure: {0}")]
    Persistence(#[from] RepositoryError),
    #[error("classification failure: {0}")]
    Classification(#[from] ClassifierError),
}

impl From<PredictionError> for ApplicationError {
    fn from(value: PredictionError) -> Self {
        match value {
            PredictionError::Persistence(error) => Self::Persistence(error.to_string()),
            PredictionError::Classification(error) => Self::Classification(error.to_string()),
        }
    }
}

pub struct PredictionCoordinator {
    pool: DbPool,
    matches: Arc<dyn MatchRepository>,
    results: Arc<dyn ResultRepository>,
    scorer: ScorerHandle,
    classifier_timeout: Duration,
}

impl PredictionCoordinator {
    pub fn new(pool: DbPool, scorer: ScorerHandle, classifier_timeout: Duration) -> Self {
        let matches = Arc::new(SqlMatchRepository::new(pool.clone()));
        let results = Arc::new(SqlResultRepository::new(pool.clone()));
        Self::with_repositories(pool, matches, results, scorer, classifier_timeout)
    }

    pub fn with_repositories(
        pool: DbPool,
        matches: Arc<dyn MatchRepository>,
        results: Arc<dyn ResultRepository>,
        scorer: ScorerHandle,
        classifier_timeout: Duration,
    ) -> Self {
        Self { pool, matches, results, scorer, classifier_timeout }
    }

    pub fn scorer(&self) -> &ScorerHandle {
        &self.scorer
    }

    /// Encodes and scores `signals`, then inserts the match and its result
    /// inside one short transaction. Any failure leaves neither row behind.
    /// Differential bounds are the caller's contract and are not re-checked.
    pub async fn submit(
        &self,
        user_id: &UserId,
        signals: &MatchSignals,
    ) -> Result<PredictionOutcome, PredictionError> {
        let features = FeatureEncoder::encode_signals(signals);
        let record = MatchRecord::new(user_id.clone(), features, Utc::now());
        let classifier = self.scorer.current().await;

        // Scoring happens before `begin` so no write lock is held across the classifier call.
        let probability = match self.score(classifier.as_ref(), &features).await {
            Ok(probability) => probability,
            Err(error) => {
                warn!(
                    event_name = "prediction.classification_failed",
                    user_id = %user_id,
                    match_id = %record.id,
                    error = %error,
                    "classifier call failed"
                );
                return Err(PredictionError::Classification(error));
            }
        };

        let mut tx = self.pool.begin().await.map_err(RepositoryError::from)?;

        if let Err(error) = self.matches.insert(&mut *tx, &record).await {
            abort(tx, "match_insert", user_id).await;
            return Err(PredictionError::Persistence(error));
        }
        debug!(
            event_name = "prediction.match_inserted",
            user_id = %user_id,
            match_id = %record.id,
            "match row staged"
        );

        let result =
            PredictionResult::from_score(&record, probability, classifier.version(), Utc::now());
        if let Err(error) = self.results.insert(&mut *tx, &result).await {
            abort(tx, "result_insert", user_id).await;
            return Err(PredictionError::Persistence(error));
        }

        tx.commit().await.map_err(RepositoryError::from)?;

        info!(
            event_name = "prediction.committed",
            user_id = %user_id,
            match_id = %result.match_id,
            result_id = %result.id,
            win_probability = result.win_probability,
            predicted_label = result.predicted_label.as_str(),
            model_version = %result.model_version,
            "prediction committed"
        );

        Ok(PredictionOutcome::from(&result))
    }

    async fn score(
        &self,
        classifier: &dyn Classifier,
        features: &FeatureVector,
    ) -> Result<f64, ClassifierError> {
        match tokio::time::timeout(self.classifier_timeout, classifier.score(features)).await {
            Ok(Ok(probability)) => check_probability(probability),
            Ok(Err(error)) => Err(error),
            Err(_) => Err(ClassifierError::Timeout {
                timeout_ms: u64::try_from(self.classifier_timeout.as_millis()).unwrap_or(u64::MAX),
            }),
        }
    }
}

async fn abort(tx: Transaction<'_, Sqlite>, stage: &'static str, user_id: &UserId) {
    match tx.rollback().await {
        Ok(()) => debug!(event_name = "prediction.rolled_back", stage, user_id = %user_id, "rolled back"),
        // Dropping the connection still discards the uncommitted work.
        Err(error) => warn!(
            event_name = "prediction.rollback_failed",
            stage,
            user_id = %user_id,
            error = %error,
            "explicit rollback failed"
        ),
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use async_trait::async_trait;
    use chrono::Utc;
    use sqlx::SqliteConnection;

    use matchcast_core::domain::prediction::{
        HistoryEntry, PredictedLabel, PredictionResult, ResultId,
    };
    use matchcast_core::domain::signals::{CategoricalSignals, MatchSignals, ObjectiveDiffs, Side};
    use matchcast_core::domain::user::{User, UserId};
    use matchcast_core::features::FeatureVector;
    use matchcast_core::ml::{Classifier, ClassifierError};
    use matchcast_db::{
        connect_with_settings, migrations, DbPool, MatchRepository, RepositoryError,
        ResultRepository, SqlMatchRepository, SqlResultRepository, SqlUserRepository,
        UserRepository,
    };

    use super::{PredictionCoordinator, PredictionError};
    use crate::scorer::ScorerHandle;

    struct FixedClassifier(f64);

    #[async_trait]
    impl Classifier for FixedClassifier {
        async fn score(&self, _features: &FeatureVector) -> Result<f64, ClassifierError> {
            Ok(self.0)
        }

        fn version(&self) -> &str {
            "stub-fixed"
        }
    }

    struct UnavailableClassifier;

    #[async_trait]
    impl Classifier for UnavailableClassifier {
        async fn score(&self, _features: &FeatureVector) -> Result<f64, ClassifierError> {
            Err(ClassifierError::Unavailable("artifact evicted".to_string()))
        }

        fn version(&self) -> &str {
            "stub-unavailable"
        }
    }

    struct SlowClassifier;

    #[async_trait]
    impl Classifier for SlowClassifier {
        async fn score(&self, _features: &FeatureVector) -> Result<f64, ClassifierError> {
            tokio::time::sleep(Duration::from_secs(5)).await;
            Ok(0.9)
        }

        fn version(&self) -> &str {
            "stub-slow"
        }
    }

    /// Reads through the shared pool while scoring, which needs a free connection.
    struct PoolReadingClassifier {
        pool: DbPool,
        matches_seen: std::sync::Mutex<Option<i64>>,
    }

    #[async_trait]
    impl Classifier for PoolReadingClassifier {
        async fn score(&self, _features: &FeatureVector) -> Result<f64, ClassifierError> {
            let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM game_match")
                .fetch_one(&self.pool)
                .await
                .map_err(|error| ClassifierError::Unavailable(error.to_string()))?;
            if let Ok(mut seen) = self.matches_seen.lock() {
                *seen = Some(count);
            }
            Ok(0.61)
        }

        fn version(&self) -> &str {
            "stub-pool-reader"
        }
    }

    /// Stores nothing and always fails, so the match insert before it must be undone.
    struct RejectingResultRepository {
        inner: SqlResultRepository,
    }

    #[async_trait]
    impl ResultRepository for RejectingResultRepository {
        async fn insert(
            &self,
            _conn: &mut SqliteConnection,
            _result: &PredictionResult,
        ) -> Result<ResultId, RepositoryError> {
            Err(RepositoryError::InvalidRecord("result store offline".to_string()))
        }

        async fn list_by_user(&self, user_id: &UserId) -> Result<Vec<HistoryEntry>, RepositoryError> {
            self.inner.list_by_user(user_id).await
        }

        async fn count_for_user(&self, user_id: &UserId) -> Result<i64, RepositoryError> {
            self.inner.count_for_user(user_id).await
        }
    }

    async fn setup() -> (DbPool, UserId) {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let user = User {
            id: UserId::generate(),
            username: "alice".to_string(),
            credential_hash: "pbkdf2-sha256$1000$00$00".to_string(),
            created_at: Utc::now(),
        };
        let user_id = SqlUserRepository::new(pool.clone()).insert(&user).await.expect("user");
        (pool, user_id)
    }

    fn coordinator(pool: &DbPool, classifier: Arc<dyn Classifier>) -> PredictionCoordinator {
        PredictionCoordinator::new(
            pool.clone(),
            ScorerHandle::new(classifier),
            Duration::from_millis(50),
        )
    }

    fn first_blood_only() -> MatchSignals {
        MatchSignals::new(
            CategoricalSignals { first_blood: Side::Blue, ..CategoricalSignals::default() },
            ObjectiveDiffs::default(),
        )
    }

    async fn row_counts(pool: &DbPool, user_id: &UserId) -> (i64, i64) {
        let matches = SqlMatchRepository::new(pool.clone()).count_for_user(user_id).await;
        let results = SqlResultRepository::new(pool.clone()).count_for_user(user_id).await;
        (matches.expect("match count"), results.expect("result count"))
    }

    #[tokio::test]
    async fn successful_submit_persists_one_row_of_each() {
        let (pool, user_id) = setup().await;
        let outcome = coordinator(&pool, Arc::new(FixedClassifier(0.73)))
            .submit(&user_id, &first_blood_only())
            .await
            .expect("submit");

        assert_eq!(outcome.win_probability, 0.73);
        assert_eq!(outcome.loss_probability, 0.27);
        assert_eq!(outcome.predicted_label, PredictedLabel::Win);
        assert_eq!(outcome.model_version, "stub-fixed");
        assert_eq!(row_counts(&pool, &user_id).await, (1, 1));

        let stored = SqlMatchRepository::new(pool.clone())
            .find_by_id(&outcome.match_id)
            .await
            .expect("find")
            .expect("match row");
        assert_eq!(stored.signals().expect("decode"), first_blood_only());
    }

    #[tokio::test]
    async fn raw_score_is_rounded_before_labelling() {
        let (pool, user_id) = setup().await;
        let outcome = coordinator(&pool, Arc::new(FixedClassifier(0.123456)))
            .submit(&user_id, &first_blood_only())
            .await
            .expect("submit");

        assert_eq!(outcome.win_probability, 0.123);
        assert_eq!(outcome.predicted_label, PredictedLabel::Loss);
    }

    #[tokio::test]
    async fn classifier_failure_leaves_no_rows() {
        let (pool, user_id) = setup().await;
        let error = coordinator(&pool, Arc::new(UnavailableClassifier))
            .submit(&user_id, &first_blood_only())
            .await
            .expect_err("classifier unavailable");

        assert!(matches!(error, PredictionError::Classification(ClassifierError::Unavailable(_))));
        assert_eq!(row_counts(&pool, &user_id).await, (0, 0));
    }

    #[tokio::test]
    async fn classifier_timeout_leaves_no_rows() {
        let (pool, user_id) = setup().await;
        let error = coordinator(&pool, Arc::new(SlowClassifier))
            .submit(&user_id, &first_blood_only())
            .await
            .expect_err("classifier timeout");

        assert!(matches!(
            error,
            PredictionError::Classification(ClassifierError::Timeout { timeout_ms: 50 })
        ));
        assert_eq!(row_counts(&pool, &user_id).await, (0, 0));
    }

    #[tokio::test]
    async fn out_of_range_score_is_a_classification_error() {
        let (pool, user_id) = setup().await;
        for bad in [1.7, -0.2, f64::NAN] {
            let error = coordinator(&pool, Arc::new(FixedClassifier(bad)))
                .submit(&user_id, &first_blood_only())
                .await
                .expect_err("out of range");
            assert!(matches!(
                error,
                PredictionError::Classification(ClassifierError::OutOfRange(_))
            ));
        }
        assert_eq!(row_counts(&pool, &user_id).await, (0, 0));
    }

    #[tokio::test]
    async fn result_insert_failure_rolls_back_match_row() {
        let (pool, user_id) = setup().await;
        let coordinator = PredictionCoordinator::with_repositories(
            pool.clone(),
            Arc::new(SqlMatchRepository::new(pool.clone())),
            Arc::new(RejectingResultRepository { inner: SqlResultRepository::new(pool.clone()) }),
            ScorerHandle::new(Arc::new(FixedClassifier(0.6))),
            Duration::from_millis(50),
        );

        let error =
            coordinator.submit(&user_id, &first_blood_only()).await.expect_err("result insert");
        assert!(matches!(error, PredictionError::Persistence(RepositoryError::InvalidRecord(_))));
        assert_eq!(row_counts(&pool, &user_id).await, (0, 0));
    }

    #[tokio::test]
    async fn classifier_runs_before_any_connection_is_held() {
        let (pool, user_id) = setup().await;
        let classifier =
            Arc::new(PoolReadingClassifier { pool: pool.clone(), matches_seen: Default::default() });
        let coordinator = PredictionCoordinator::new(
            pool.clone(),
            ScorerHandle::new(classifier.clone()),
            Duration::from_secs(2),
        );

        let outcome =
            coordinator.submit(&user_id, &first_blood_only()).await.expect("submit");

        assert_eq!(outcome.win_probability, 0.61);
        assert_eq!(*classifier.matches_seen.lock().expect("lock"), Some(0));
        assert_eq!(row_counts(&pool, &user_id).await, (1, 1));
    }

    #[tokio::test]
    async fn unknown_user_is_a_persistence_error() {
        let (pool, _) = setup().await;
        let stranger = UserId("USR-unknown".to_string());
        let error = coordinator(&pool, Arc::new(FixedClassifier(0.5)))
            .submit(&stranger, &first_blood_only())
            .await
            .expect_err("fk violation");

        assert!(matches!(error, PredictionError::Persistence(ref e) if e.is_foreign_key_violation()));
        assert_eq!(row_counts(&pool, &stranger).await, (0, 0));
    }

    #[tokio::test]
    async fn repeated_submits_create_independent_pairs() {
        let (pool, user_id) = setup().await;
        let coordinator = coordinator(&pool, Arc::new(FixedClassifier(0.5)));
        let first = coordinator.submit(&user_id, &first_blood_only()).await.expect("first");
        let second = coordinator.submit(&user_id, &first_blood_only()).await.expect("second");

        assert_ne!(first.match_id, second.match_id);
        assert_eq!(first.predicted_label, PredictedLabel::Win);
        assert_eq!(row_counts(&pool, &user_id).await, (2, 2));
    }
}
