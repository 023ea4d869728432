use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tracing::info;

use matchcast_core::config::{AppConfig, ConfigError};
use matchcast_core::ml::ArtifactError;
use matchcast_db::{connect_with_config, migrations, DbPool};
use matchcast_pipeline::{AuthService, HistoryQueryService, PredictionCoordinator, ScorerHandle};

use crate::api::ApiState;
use crate::health::HealthState;

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub scorer: ScorerHandle,
    pub coordinator: Arc<PredictionCoordinator>,
    pub history: Arc<HistoryQueryService>,
    pub auth: Arc<AuthService>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("classifier artifact could not be loaded: {0}")]
    ClassifierArtifact(#[source] ArtifactError),
}

impl Application {
    pub fn api_state(&self) -> ApiState {
        ApiState {
            coordinator: Arc::clone(&self.coordinator),
            history: Arc::clone(&self.history),
            auth: Arc::clone(&self.auth),
            artifact_path: self.config.classifier.artifact_path.clone(),
        }
    }

    pub fn health_state(&self) -> HealthState {
        HealthState { db_pool: self.db_pool.clone(), scorer: self.scorer.clone() }
    }
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    // Artifact load failure is fatal and happens before any database work.
    let scorer = ScorerHandle::load(&config.classifier.artifact_path)
        .map_err(BootstrapError::ClassifierArtifact)?;

    let db_pool =
        connect_with_config(&config.database).await.map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let coordinator = Arc::new(PredictionCoordinator::new(
        db_pool.clone(),
        scorer.clone(),
        Duration::from_millis(config.classifier.timeout_ms),
    ));
    let history = Arc::new(HistoryQueryService::new(db_pool.clone()));
    let auth = Arc::new(AuthService::new(db_pool.clone(), config.auth.pbkdf2_iterations));

    Ok(Application { config, db_pool, scorer, coordinator, history, auth })
}
