//! Process-wide classifier lifecycle: loaded once at startup, shared by every
//! request, swapped only on an explicit reload.

use std::path::Path;
use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{info, warn};

use matchcast_core::features::{FeatureVector, FEATURE_COUNT};
use matchcast_core::ml::{
    check_probability, ArtifactError, Classifier, ClassifierError, LogisticModel,
};

#[derive(Clone)]
pub struct ScorerHandle {
    inner: Arc<RwLock<Arc<dyn Classifier>>>,
}

impl ScorerHandle {
    pub fn new(classifier: Arc<dyn Classifier>) -> Self {
        Self { inner: Arc::new(RwLock::new(classifier)) }
    }

    /// Loads the artifact at `path`. A failure here is fatal to startup.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ArtifactError> {
        let model = LogisticModel::load(path.as_ref())?;
        info!(
            event_name = "classifier.loaded",
            model_version = %model.version,
            path = %path.as_ref().display(),
            "classifier artifact loaded"
        );
        Ok(Self::new(Arc::new(model)))
    }

    /// The classifier in effect right now. Callers keep the returned handle for
    /// the whole request so a concurrent reload cannot change it mid-flight.
    pub async fn current(&self) -> Arc<dyn Classifier> {
        Arc::clone(&*self.inner.read().await)
    }

    pub async fn version(&self) -> String {
        self.inner.read().await.version().to_string()
    }

    /// Scores the all-zero vector through the current classifier and returns
    /// the model version alongside the probability it produced.
    pub async fn score_reference(&self) -> (String, Result<f64, ClassifierError>) {
        let classifier = self.current().await;
        let reference = FeatureVector([0.0; FEATURE_COUNT]);
        let scored = classifier.score(&reference).await.and_then(check_probability);
        (classifier.version().to_string(), scored)
    }

    /// Swaps in a freshly loaded artifact. On failure the previous model stays
    /// in service.
    pub async fn reload_from(&self, path: impl AsRef<Path>) -> Result<String, ArtifactError> {
        let path = path.as_ref();
        let model = match LogisticModel::load(path) {
            Ok(model) => model,
            Err(error) => {
                warn!(
                    event_name = "classifier.reload_failed",
                    path = %path.display(),
                    error = %error,
                    "classifier reload failed, keeping current model"
                );
                return Err(error);
            }
        };

        let version = model.version.clone();
        let mut slot = self.inner.write().await;
        let previous = slot.version().to_string();
        *slot = Arc::new(model);
        info!(
            event_name = "classifier.reloaded",
            previous_version = %previous,
            model_version = %version,
            "classifier artifact reloaded"
        );
        Ok(version)
    }
}
