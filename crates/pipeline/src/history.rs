use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use matchcast_core::domain::prediction::{HistoryEntry, MatchId, PredictedLabel, ResultId};
use matchcast_core::domain::signals::MatchSignals;
use matchcast_core::domain::user::UserId;
use matchcast_db::{DbPool, RepositoryError, ResultRepository, SqlResultRepository};

/// One row of a user's prediction history, with the signals that produced it.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct HistorySummary {
    pub result_id: ResultId,
    pub match_id: MatchId,
    pub win_probability: f64,
    pub loss_probability: f64,
    pub predicted_label: PredictedLabel,
    pub model_version: String,
    pub predicted_at: DateTime<Utc>,
    pub signals: MatchSignals,
}

impl TryFrom<HistoryEntry> for HistorySummary {
    type Error = RepositoryError;

    fn try_from(entry: HistoryEntry) -> Result<Self, Self::Error> {
        let signals =
            entry.match_record.signals().map_err(|e| RepositoryError::Decode(e.to_string()))?;
        let loss_probability = entry.result.loss_probability();
        let result = entry.result;
        Ok(Self {
            result_id: result.id,
            match_id: result.match_id,
            win_probability: result.win_probability,
            loss_probability,
            predicted_label: result.predicted_label,
            model_version: result.model_version,
            predicted_at: result.predicted_at,
            signals,
        })
    }
}

pub struct HistoryQueryService {
    results: Arc<dyn ResultRepository>,
}

impl HistoryQueryService {
    pub fn new(pool: DbPool) -> Self {
        Self::with_repository(Arc::new(SqlResultRepository::new(pool)))
    }

    pub fn with_repository(results: Arc<dyn ResultRepository>) -> Self {
        Self { results }
    }

    /// Newest first. A user with no predictions gets an empty list.
    pub async fn history(&self, user_id: &UserId) -> Result<Vec<HistorySummary>, RepositoryError> {
        let entries = self.results.list_by_user(user_id).await?;
        debug!(
            event_name = "history.listed",
            user_id = %user_id,
            count = entries.len(),
            "history query served"
        );
        entries.into_iter().map(HistorySummary::try_from).collect()
    }
}
