use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::post,
    Json, Router,
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use tracing::{info, info_span, warn, Instrument};
use uuid::Uuid;

use matchcast_core::domain::prediction::PredictionOutcome;
use matchcast_core::domain::signals::MatchSignals;
use matchcast_core::domain::user::UserId;
use matchcast_core::errors::{ApplicationError, InterfaceError};
use matchcast_pipeline::{AuthService, HistoryQueryService, HistorySummary, PredictionCoordinator};

#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<PredictionCoordinator>,
    pub history: Arc<HistoryQueryService>,
    pub auth: Arc<AuthService>,
    pub artifact_path: PathBuf,
}

#[derive(Deserialize)]
pub struct CredentialsRequest {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Serialize)]
pub struct UserResponse {
    pub user_id: UserId,
}

#[derive(Debug, Serialize)]
pub struct HistoryResponse {
    pub user_id: UserId,
    pub predictions: Vec<HistorySummary>,
}

#[derive(Debug, Serialize)]
pub struct ReloadResponse {
    pub model_version: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ApiError {
    pub error: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    pub correlation_id: String,
}

type ApiResult<T> = Result<T, (StatusCode, Json<ApiError>)>;

pub fn router(state: ApiState) -> Router {
    Router::new()
        .route("/api/v1/users", post(register))
        .route("/api/v1/sessions", post(login))
        .route(
            "/api/v1/users/{user_id}/predictions",
            post(submit_prediction).get(list_predictions),
        )
        .route("/api/v1/admin/classifier/reload", post(reload_classifier))
        .with_state(state)
}

fn correlation_id() -> String {
    format!("req-{}", Uuid::new_v4())
}

fn status_for(error: &InterfaceError) -> StatusCode {
    match error {
        InterfaceError::BadRequest { .. } => StatusCode::BAD_REQUEST,
        InterfaceError::Unauthorized { .. } => StatusCode::UNAUTHORIZED,
        InterfaceError::Conflict { .. } => StatusCode::CONFLICT,
        InterfaceError::ServiceUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
        InterfaceError::Internal { .. } => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Client errors carry their detail; server-side detail stays in the logs.
fn reject(
    error: impl Into<ApplicationError>,
    correlation_id: &str,
) -> (StatusCode, Json<ApiError>) {
    let interface = error.into().into_interface(correlation_id);
    let status = status_for(&interface);
    let detail = if status.is_server_error() {
        warn!(
            event_name = "api.request_failed",
            correlation_id = %correlation_id,
            status = status.as_u16(),
            error = %interface,
            "request failed"
        );
        None
    } else {
        Some(interface.to_string())
    };

    (
        status,
        Json(ApiError {
            error: interface.user_message().to_string(),
            detail,
            correlation_id: interface.correlation_id().to_string(),
        }),
    )
}

async fn register(
    State(state): State<ApiState>,
    Json(body): Json<CredentialsRequest>,
) -> ApiResult<(StatusCode, Json<UserResponse>)> {
    let correlation_id = correlation_id();
    let password: SecretString = body.password.into();

    let user_id = state
        .auth
        .register(&body.username, &password)
        .instrument(info_span!("register", correlation_id = %correlation_id))
        .await
        .map_err(|error| reject(error, &correlation_id))?;

    Ok((StatusCode::CREATED, Json(UserResponse { user_id })))
}

async fn login(
    State(state): State<ApiState>,
    Json(body): Json<CredentialsRequest>,
) -> ApiResult<Json<UserResponse>> {
    let correlation_id = correlation_id();
    let password: SecretString = body.password.into();

    let user_id = state
        .auth
        .login(&body.username, &password)
        .instrument(info_span!("login", correlation_id = %correlation_id))
        .await
        .map_err(|error| reject(error, &correlation_id))?;

    Ok(Json(UserResponse { user_id }))
}

async fn submit_prediction(
    Path(user_id): Path<String>,
    State(state): State<ApiState>,
    Json(signals): Json<MatchSignals>,
) -> ApiResult<Json<PredictionOutcome>> {
    let correlation_id = correlation_id();
    signals.validate().map_err(|error| reject(error, &correlation_id))?;

    let user_id = UserId(user_id);
    let outcome = state
        .coordinator
        .submit(&user_id, &signals)
        .instrument(info_span!("submit_prediction", correlation_id = %correlation_id))
        .await
        .map_err(|error| reject(error, &correlation_id))?;

    Ok(Json(outcome))
}

async fn list_predictions(
    Path(user_id): Path<String>,
    State(state): State<ApiState>,
) -> ApiResult<Json<HistoryResponse>> {
    let correlation_id = correlation_id();
    let user_id = UserId(user_id);

    let predictions = state
        .history
        .history(&user_id)
        .instrument(info_span!("list_predictions", correlation_id = %correlation_id))
        .await
        .map_err(|error| {
            reject(ApplicationError::Persistence(error.to_string()), &correlation_id)
        })?;

    Ok(Json(HistoryResponse { user_id, predictions }))
}

async fn reload_classifier(State(state): State<ApiState>) -> ApiResult<Json<ReloadResponse>> {
    let correlation_id = correlation_id();

    let model_version = state
        .coordinator
        .scorer()
        .reload_from(&state.artifact_path)
        .await
        .map_err(|error| {
            reject(ApplicationError::Classification(error.to_string()), &correlation_id)
        })?;

    info!(
        event_name = "api.classifier_reloaded",
        correlation_id = %correlation_id,
        model_version = %model_version,
        "classifier reloaded by admin request"
    );
    Ok(Json(ReloadResponse { model_version }))
}

#[cfg(test)]
mod tests {
    use std::path::PathBuf;
    use std::sync::Arc;
    use std::time::Duration;

    use axum::{
        body::{to_bytes, Body},
        http::{Request, StatusCode},
        Router,
    };
    use serde_json::{json, Value};
    use tower::ServiceExt;

    use matchcast_db::{connect_with_settings, migrations};
    use matchcast_pipeline::{AuthService, HistoryQueryService, PredictionCoordinator, ScorerHandle};

    use super::{router, ApiState};

    fn bundled_model() -> PathBuf {
        PathBuf::from(env!("CARGO_MANIFEST_DIR")).join("../../models/win_model.json")
    }

    async fn app_with_artifact(artifact_path: PathBuf) -> Router {
        let pool = connect_with_settings("sqlite::memory:", 1, 30).await.expect("connect");
        migrations::run_pending(&pool).await.expect("migrate");
        let scorer = ScorerHandle::load(bundled_model()).expect("bundled model");

        router(ApiState {
            coordinator: Arc::new(PredictionCoordinator::new(
                pool.clone(),
                scorer,
                Duration::from_secs(2),
            )),
            history: Arc::new(HistoryQueryService::new(pool.clone())),
            auth: Arc::new(AuthService::new(pool, 1_000)),
            artifact_path,
        })
    }

    async fn send(app: &Router, method: &str, uri: &str, body: Option<Value>) -> (StatusCode, Value) {
        let request = Request::builder()
            .method(method)
            .uri(uri)
            .header("content-type", "application/json")
            .body(body.map_or_else(Body::empty, |value| Body::from(value.to_string())))
            .expect("request");
        let response = app.clone().oneshot(request).await.expect("response");
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.expect("body");
        let value = if bytes.is_empty() {
            Value::Null
        } else {
            serde_json::from_slice(&bytes).expect("json body")
        };
        (status, value)
    }

    async fn registered_user(app: &Router, username: &str) -> String {
        let (status, body) = send(
            app,
            "POST",
            "/api/v1/users",
            Some(json!({"username": username, "password": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::CREATED);
        body["user_id"].as_str().expect("user id").to_string()
    }

    fn first_blood_signals(tower: i32) -> Value {
        json!({
            "categorical": {
                "first_blood": "side_a",
                "first_tower": "none",
                "first_inhibitor": "none",
                "first_baron": "none",
                "first_dragon": "none",
                "first_rift_herald": "none"
            },
            "diffs": {"tower": tower, "inhibitor": 0, "baron": 0, "dragon": 0, "herald": 0}
        })
    }

    #[tokio::test]
    async fn duplicate_registration_is_a_conflict() {
        let app = app_with_artifact(bundled_model()).await;
        let user_id = registered_user(&app, "alice").await;
        assert!(user_id.starts_with("USR-"));

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/users",
            Some(json!({"username": "alice", "password": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert!(body["correlation_id"].as_str().expect("correlation id").starts_with("req-"));
    }

    #[tokio::test]
    async fn login_distinguishes_only_success_from_failure() {
        let app = app_with_artifact(bundled_model()).await;
        let user_id = registered_user(&app, "alice").await;

        let (status, body) = send(
            &app,
            "POST",
            "/api/v1/sessions",
            Some(json!({"username": "alice", "password": "x"})),
        )
        .await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["user_id"], user_id.as_str());

        let (wrong, wrong_body) = send(
            &app,
            "POST",
            "/api/v1/sessions",
            Some(json!({"username": "alice", "password": "nope"})),
        )
        .await;
        let (unknown, unknown_body) = send(
            &app,
            "POST",
            "/api/v1/sessions",
            Some(json!({"username": "zed", "password": "x"})),
        )
        .await;
        assert_eq!(wrong, StatusCode::UNAUTHORIZED);
        assert_eq!(unknown, StatusCode::UNAUTHORIZED);
        assert_eq!(wrong_body["error"], unknown_body["error"]);
    }

    #[tokio::test]
    async fn submit_then_list_history() {
        let app = app_with_artifact(bundled_model()).await;
        let user_id = registered_user(&app, "alice").await;
        let uri = format!("/api/v1/users/{user_id}/predictions");

        let (status, outcome) = send(&app, "POST", &uri, Some(first_blood_signals(2))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(outcome["predicted_label"], "win");
        let win = outcome["win_probability"].as_f64().expect("probability");
        assert!(win > 0.5 && win <= 1.0);

        let (status, history) = send(&app, "GET", &uri, None).await;
        assert_eq!(status, StatusCode::OK);
        let predictions = history["predictions"].as_array().expect("array");
        assert_eq!(predictions.len(), 1);
        assert_eq!(predictions[0]["match_id"], outcome["match_id"]);
        assert_eq!(predictions[0]["signals"]["categorical"]["first_blood"], "blue");
    }

    #[tokio::test]
    async fn out_of_range_differential_is_a_bad_request() {
        let app = app_with_artifact(bundled_model()).await;
        let user_id = registered_user(&app, "alice").await;
        let uri = format!("/api/v1/users/{user_id}/predictions");

        let (status, body) = send(&app, "POST", &uri, Some(first_blood_signals(11))).await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().expect("detail").contains("tower"));

        let (_, history) = send(&app, "GET", &uri, None).await;
        assert_eq!(history["predictions"].as_array().expect("array").len(), 0);
    }

    #[tokio::test]
    async fn history_for_user_without_predictions_is_empty() {
        let app = app_with_artifact(bundled_model()).await;
        let user_id = registered_user(&app, "carol").await;

        let (status, body) =
            send(&app, "GET", &format!("/api/v1/users/{user_id}/predictions"), None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["predictions"], json!([]));
    }

    #[tokio::test]
    async fn reload_reports_model_version_or_service_unavailable() {
        let app = app_with_artifact(bundled_model()).await;
        let (status, body) = send(&app, "POST", "/api/v1/admin/classifier/reload", None).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["model_version"], "logit-2024.06-r3");

        let dir = tempfile::TempDir::new().expect("tempdir");
        let broken = app_with_artifact(dir.path().join("absent.json")).await;
        let (status, body) = send(&broken, "POST", "/api/v1/admin/classifier/reload", None).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
        assert!(body.get("detail").is_none(), "server-side detail must not leak");
    }
}
