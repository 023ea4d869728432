pub mod config;
pub mod credentials;
pub mod domain;
pub mod errors;
pub mod features;
pub mod ml;

pub use domain::prediction::{
    HistoryEntry, MatchId, MatchRecord, PredictedLabel, PredictionOutcome, PredictionResult,
    ResultId,
};
pub use domain::signals::{CategoricalSignals, MatchSignals, ObjectiveDiffs, Side};
pub use domain::user::{User, UserId};
pub use errors::{ApplicationError, DomainError, InterfaceError};
pub use features::{FeatureEncoder, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use ml::{Classifier, ClassifierError, LogisticModel};
