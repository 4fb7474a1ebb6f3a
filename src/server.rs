//! HTTP request layer.
//!
//! Thin `axum` wrapper around [`TaskRegistry`] and [`EditOrchestrator`]:
//! `POST /generate` registers a task and runs it in the background, the
//! `/task/{id}` routes expose its status, result, log and cancellation.

use crate::error::PatchwrightError;
use crate::orchestrator::EditOrchestrator;
use crate::task::{TaskId, TaskRegistry};
use axum::extract::{Path, State};
use axum::http::{header, HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use serde::Deserialize;
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::info;

/// Shared state handed to every handler.
#[derive(Clone)]
pub struct AppState {
    pub registry: Arc<TaskRegistry>,
    pub orchestrator: Arc<EditOrchestrator>,
}

impl AppState {
    #[must_use]
    pub fn new(orchestrator: EditOrchestrator) -> Self {
        Self {
            registry: Arc::new(TaskRegistry::new()),
            orchestrator: Arc::new(orchestrator),
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct GenerateInput {
    repo_url: String,
    prompt: String,
}

/// Error response with a JSON `{"error": ...}` body.
struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn new(status: StatusCode, message: impl Into<String>) -> Self {
        Self {
            status,
            message: message.into(),
        }
    }
}

impl From<PatchwrightError> for ApiError {
    fn from(err: PatchwrightError) -> Self {
        let status = match err {
            PatchwrightError::TaskNotFound { .. } => StatusCode::NOT_FOUND,
            PatchwrightError::InvalidTransition { .. } => StatusCode::CONFLICT,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self::new(status, err.to_string())
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

fn parse_task_id(raw: &str) -> Result<TaskId, ApiError> {
    raw.parse::<TaskId>().map_err(|_| {
        ApiError::new(
            StatusCode::BAD_REQUEST,
            format!("Invalid task id '{}'", raw),
        )
    })
}

fn base_url(headers: &HeaderMap) -> String {
    headers
        .get(header::HOST)
        .and_then(|h| h.to_str().ok())
        .map(|host| format!("http://{}", host))
        .unwrap_or_default()
}

async fn root() -> &'static str {
    "Patchwright API"
}

async fn generate(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(input): Json<GenerateInput>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if input.repo_url.trim().is_empty() || input.prompt.trim().is_empty() {
        return Err(ApiError::new(
            StatusCode::UNPROCESSABLE_ENTITY,
            "repoUrl and prompt must not be empty",
        ));
    }

    let task = state.registry.create(input.repo_url.trim(), &input.prompt);
    info!(task_id = %task.id(), "Accepted generation request");

    let orchestrator = Arc::clone(&state.orchestrator);
    let background = Arc::clone(&task);
    tokio::spawn(async move {
        orchestrator.run(&background).await;
    });

    Ok(Json(json!({
        "task_id": task.id(),
        "task_url": format!("{}/task/{}", base_url(&headers), task.id()),
    })))
}

async fn get_task(
    State(state): State<AppState>,
    headers: HeaderMap,
    Path(raw_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task = state.registry.get(&parse_task_id(&raw_id)?)?;
    Ok(Json(json!({
        "task_id": task.id(),
        "status": task.status(),
        "result_url": format!("{}/task/{}/result", base_url(&headers), task.id()),
    })))
}

async fn get_result(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Response, ApiError> {
    let task = state.registry.get(&parse_task_id(&raw_id)?)?;
    if !task.is_done() {
        return Ok((StatusCode::CONFLICT, "Task Still Pending...").into_response());
    }
    Ok(task.result().unwrap_or_default().into_response())
}

async fn get_log(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task = state.registry.get(&parse_task_id(&raw_id)?)?;
    Ok(Json(json!({
        "task_id": task.id(),
        "log": task.log(),
    })))
}

async fn cancel_task(
    State(state): State<AppState>,
    Path(raw_id): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let task = state.registry.get(&parse_task_id(&raw_id)?)?;
    task.cancel()?;
    Ok(Json(json!({
        "task_id": task.id(),
        "status": task.status(),
    })))
}

async fn stats(State(state): State<AppState>) -> Json<serde_json::Value> {
    let counts = state.registry.status_counts();
    Json(json!({
        "CREATED": counts.created,
        "PENDING": counts.pending,
        "DONE": counts.done,
        "ERROR": counts.error,
        "CANCELLED": counts.cancelled,
        "running": counts.running(),
        "total": counts.total(),
    }))
}

/// Build the router.
pub fn app_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/generate", post(generate))
        .route("/stats", get(stats))
        .route("/task/{id}", get(get_task))
        .route("/task/{id}/result", get(get_result))
        .route("/task/{id}/log", get(get_log))
        .route("/task/{id}/cancel", delete(cancel_task))
        .with_state(state)
}

/// Serve until Ctrl-C.
///
/// # Errors
///
/// Returns an error if the address cannot be bound or the server fails.
pub async fn serve(addr: SocketAddr, state: AppState) -> anyhow::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", listener.local_addr()?);

    axum::serve(listener, app_router(state))
        .with_graceful_shutdown(async {
            if tokio::signal::ctrl_c().await.is_err() {
                std::future::pending::<()>().await;
            }
        })
        .await?;
    Ok(())
}
