use axum::{extract::State, http::StatusCode, routing::get, Json, Router};
use chrono::Utc;
use serde::Serialize;

use matchcast_core::ml::ClassifierError;
use matchcast_db::DbPool;
use matchcast_pipeline::ScorerHandle;

#[derive(Clone)]
pub struct HealthState {
    pub db_pool: DbPool,
    pub scorer: ScorerHandle,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthCheck {
    pub status: &'static str,
    pub detail: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub service: HealthCheck,
    pub database: HealthCheck,
    pub classifier: HealthCheck,
    pub checked_at: String,
}

pub fn router(state: HealthState) -> Router {
    Router::new().route("/health", get(health)).with_state(state)
}

pub async fn health(State(state): State<HealthState>) -> (StatusCode, Json<HealthResponse>) {
    let database = database_check(&state.db_pool).await;
    let (version, scored) = state.scorer.score_reference().await;
    let classifier = classifier_check(&version, scored);
    let ready = database.status == "ready" && classifier.status == "ready";

    let payload = HealthResponse {
        status: if ready { "ready" } else { "degraded" },
        service: HealthCheck {
            status: "ready",
            detail: "matchcast-server runtime initialized".to_string(),
        },
        database,
        classifier,
        checked_at: Utc::now().to_rfc3339(),
    };

    let status_code = if ready { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    (status_code, Json(payload))
}

async fn database_check(pool: &DbPool) -> HealthCheck {
    match sqlx::query_scalar::<_, i64>("SELECT 1").fetch_one(pool).await {
        Ok(_) => HealthCheck { status: "ready", detail: "database query succeeded".to_string() },
        Err(error) => {
            HealthCheck { status: "degraded", detail: format!("database query failed: {error}") }
        }
    }
}

fn classifier_check(version: &str, scored: Result<f64, ClassifierError>) -> HealthCheck {
    match scored {
        Ok(probability) => HealthCheck {
            status: "ready",
            detail: format!("model {version} scored reference vector at {probability:.4}"),
        },
        Err(error) => HealthCheck {
            status: "degraded",
            detail: format!("model {version} failed reference scoring: {error}"),
        },
    }
}
