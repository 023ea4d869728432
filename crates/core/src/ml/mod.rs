//! Win probability classifier contract and the logistic model artifact.
//!
//! The pipeline only depends on [`Classifier`]; [`LogisticModel`] is the
//! artifact format shipped with the service. Artifacts declare the feature
//! names they were calibrated on, and loading fails unless those names match
//! [`FEATURE_NAMES`] slot for slot.

use std::fs;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::features::{FeatureVector, FEATURE_COUNT, FEATURE_NAMES};

#[derive(Clone, Debug, Error, PartialEq)]
pub enum ClassifierError {
    #[error("classifier unavailable: {0}")]
    Unavailable(String),
    #[error("classifier did not respond within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },
    #[error("classifier returned out-of-range probability {0}")]
    OutOfRange(f64),
}

#[derive(Debug, Error)]
pub enum ArtifactError {
    #[error("could not read classifier artifact `{path}`: {source}")]
    Read { path: PathBuf, source: std::io::Error },
    #[error("could not parse classifier artifact `{path}`: {source}")]
    Parse { path: PathBuf, source: serde_json::Error },
    #[error("classifier artifact expects {expected} weights, got {actual}")]
    Dimension { expected: usize, actual: usize },
    #[error("classifier artifact feature #{index} is `{actual}`, expected `{expected}`")]
    FeatureOrder { index: usize, expected: &'static str, actual: String },
    #[error("classifier artifact contains non-finite coefficients")]
    NonFinite,
}

/// Black-box scoring capability: probability in `[0, 1]` that the blue side wins.
#[async_trait]
pub trait Classifier: Send + Sync {
    async fn score(&self, features: &FeatureVector) -> Result<f64, ClassifierError>;

    fn version(&self) -> &str;
}

/// Rejects scores a well-behaved classifier can never produce.
pub fn check_probability(probability: f64) -> Result<f64, ClassifierError> {
    if probability.is_finite() && (0.0..=1.0).contains(&probability) {
        Ok(probability)
    } else {
        Err(ClassifierError::OutOfRange(probability))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LogisticModel {
    pub version: String,
    pub trained_at: DateTime<Utc>,
    pub feature_names: Vec<String>,
    pub bias: f64,
    pub weights: Vec<f64>,
}

impl LogisticModel {
    pub fn with_weights(
        version: impl Into<String>,
        bias: f64,
        weights: Vec<f64>,
    ) -> Result<Self, ArtifactError> {
        let model = Self {
            version: version.into(),
            trained_at: Utc::now(),
            feature_names: FEATURE_NAMES.iter().map(ToString::to_string).collect(),
            bias,
            weights,
        };
        model.validate()?;
        Ok(model)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path)
            .map_err(|source| ArtifactError::Read { path: path.to_path_buf(), source })?;
        Self::from_json(&raw).map_err(|error| match error {
            JsonLoadError::Parse(source) => ArtifactError::Parse { path: path.to_path_buf(), source },
            JsonLoadError::Invalid(error) => error,
        })
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }

    fn from_json(raw: &str) -> Result<Self, JsonLoadError> {
        let model: Self = serde_json::from_str(raw).map_err(JsonLoadError::Parse)?;
        model.validate().map_err(JsonLoadError::Invalid)?;
        Ok(model)
    }

    fn validate(&self) -> Result<(), ArtifactError> {
        if self.weights.len() != FEATURE_COUNT {
            return Err(ArtifactError::Dimension {
                expected: FEATURE_COUNT,
                actual: self.weights.len(),
            });
        }
        if self.feature_names.len() != FEATURE_COUNT {
            return Err(ArtifactError::Dimension {
                expected: FEATURE_COUNT,
                actual: self.feature_names.len(),
            });
        }
        for (index, (expected, actual)) in FEATURE_NAMES.iter().zip(&self.feature_names).enumerate()
        {
            if *expected != actual.as_str() {
                return Err(ArtifactError::FeatureOrder {
                    index,
                    expected: *expected,
                    actual: actual.clone(),
                });
            }
        }
        if !self.bias.is_finite() || self.weights.iter().any(|weight| !weight.is_finite()) {
            return Err(ArtifactError::NonFinite);
        }
        Ok(())
    }

    fn sigmoid(z: f64) -> f64 {
        let z = z.clamp(-500.0, 500.0);
        1.0 / (1.0 + (-z).exp())
    }

    pub fn predict(&self, features: &FeatureVector) -> f64 {
        let z: f64 = self.bias
            + self.weights.iter().zip(features.as_slice()).map(|(w, x)| w * x).sum::<f64>();
        Self::sigmoid(z)
    }
}

enum JsonLoadError {
    Parse(serde_json::Error),
    Invalid(ArtifactError),
}

#[async_trait]
impl Classifier for LogisticModel {
    async fn score(&self, features: &FeatureVector) -> Result<f64, ClassifierError> {
        check_probability(self.predict(features))
    }

    fn version(&self) -> &str {
        &self.version
    }
}
