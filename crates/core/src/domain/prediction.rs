use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::signals::MatchSignals;
use crate::domain::user::UserId;
use crate::errors::DomainError;
use crate::features::{FeatureEncoder, FeatureVector};

pub const WIN_THRESHOLD: f64 = 0.5;

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MatchId(pub String);

impl MatchId {
    pub fn generate() -> Self {
        Self(format!("M-{}", Uuid::new_v4()))
    }
}

impl std::fmt::Display for MatchId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ResultId(pub String);

impl ResultId {
    pub fn generate() -> Self {
        Self(format!("PR-{}", Uuid::new_v4()))
    }
}

impl std::fmt::Display for ResultId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PredictedLabel {
    Win,
    Loss,
}

impl PredictedLabel {
    pub fn from_probability(probability: f64) -> Self {
        if probability >= WIN_THRESHOLD {
            Self::Win
        } else {
            Self::Loss
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Win => "win",
            Self::Loss => "loss",
        }
    }
}

impl std::str::FromStr for PredictedLabel {
    type Err = DomainError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "win" => Ok(Self::Win),
            "loss" => Ok(Self::Loss),
            other => Err(DomainError::InvariantViolation(format!(
                "unknown predicted label `{other}`"
            ))),
        }
    }
}

/// Rounds to three decimals, the precision persisted and reported.
pub fn round_probability(probability: f64) -> f64 {
    (probability * 1000.0).round() / 1000.0
}

/// Snapshot of the signals submitted for one prediction request.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct MatchRecord {
    pub id: MatchId,
    pub user_id: UserId,
    pub features: FeatureVector,
    pub created_at: DateTime<Utc>,
}

impl MatchRecord {
    pub fn new(user_id: UserId, features: FeatureVector, created_at: DateTime<Utc>) -> Self {
        Self { id: MatchId::generate(), user_id, features, created_at }
    }

    pub fn signals(&self) -> Result<MatchSignals, DomainError> {
        FeatureEncoder::decode(&self.features)
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionResult {
    pub id: ResultId,
    pub match_id: MatchId,
    pub user_id: UserId,
    pub win_probability: f64,
    pub predicted_label: PredictedLabel,
    pub model_version: String,
    pub predicted_at: DateTime<Utc>,
}

impl PredictionResult {
    /// Builds a result from a raw classifier score. The label is derived from
    /// the rounded probability so the reported pair always agrees.
    pub fn from_score(
        record: &MatchRecord,
        raw_probability: f64,
        model_version: impl Into<String>,
        predicted_at: DateTime<Utc>,
    ) -> Self {
        let win_probability = round_probability(raw_probability);
        Self {
            id: ResultId::generate(),
            match_id: record.id.clone(),
            user_id: record.user_id.clone(),
            win_probability,
            predicted_label: PredictedLabel::from_probability(win_probability),
            model_version: model_version.into(),
            predicted_at,
        }
    }

    pub fn loss_probability(&self) -> f64 {
        round_probability(1.0 - self.win_probability)
    }
}

/// A prediction result joined with the match record it was scored from.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct HistoryEntry {
    pub result: PredictionResult,
    pub match_record: MatchRecord,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PredictionOutcome {
    pub match_id: MatchId,
    pub result_id: ResultId,
    pub win_probability: f64,
    pub loss_probability: f64,
    pub predicted_label: PredictedLabel,
    pub model_version: String,
}

impl From<&PredictionResult> for PredictionOutcome {
    fn from(result: &PredictionResult) -> Self {
        Self {
            match_id: result.match_id.clone(),
            result_id: result.id.clone(),
            win_probability: result.win_probability,
            loss_probability: result.loss_probability(),
            predicted_label: result.predicted_label,
            model_version: result.model_version.clone(),
        }
    }
}
