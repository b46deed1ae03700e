use crate::orchestrator::{Orchestrator, TaskHandle, TaskOutcome, TaskOutput};
use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Json},
    routing::{get, post},
    Router,
};
use gitlite_core::{Commit, CommitDiff, ErrorKind, StageAllReport, StageOutcome, StatusReport};
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub orchestrator: Orchestrator,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct ErrorBody {
    pub error: String,
    pub kind: ErrorKind,
}

type ApiError = (StatusCode, Json<ErrorBody>);
type ApiResult<T> = Result<Json<T>, ApiError>;

pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/health", get(health_check))
        .route("/status", get(get_status))
        .route("/staged", post(stage_file))
        .route("/staged/all", post(stage_all))
        .route("/commits", get(get_commits).post(create_commit))
        .route("/commits/:id", get(get_commit))
        .route("/diff/:from/:to", get(get_diff))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

fn status_for(kind: ErrorKind) -> StatusCode {
    match kind {
        ErrorKind::Validation => StatusCode::BAD_REQUEST,
        ErrorKind::NotFound => StatusCode::NOT_FOUND,
        ErrorKind::EmptyCommit => StatusCode::CONFLICT,
        ErrorKind::PartiallyPersisted
        | ErrorKind::Transaction
        | ErrorKind::StoreUnavailable
        | ErrorKind::Io => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

/// Awaits a task and extracts the expected payload. A cancelled task still
/// yields its partial output.
async fn finish<T>(handle: TaskHandle, pick: impl FnOnce(TaskOutput) -> Option<T>) -> ApiResult<T> {
    let output = match handle.outcome().await {
        TaskOutcome::Succeeded { output } | TaskOutcome::Cancelled { output } => output,
        TaskOutcome::Failed { message, kind } => {
            return Err((status_for(kind), Json(ErrorBody { error: message, kind })))
        }
    };

    pick(output).map(Json).ok_or_else(|| {
        (
            StatusCode::INTERNAL_SERVER_ERROR,
            Json(ErrorBody {
                error: "unexpected task output".to_string(),
                kind: ErrorKind::Io,
            }),
        )
    })
}

async fn health_check() -> impl IntoResponse {
    Json(serde_json::json!({"status": "ok"}))
}

async fn get_status(State(state): State<AppState>) -> ApiResult<StatusReport> {
    finish(state.orchestrator.status(), |output| match output {
        TaskOutput::Status(report) => Some(report),
        _ => None,
    })
    .await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StageRequest {
    pub path: String,
}

async fn stage_file(
    State(state): State<AppState>,
    Json(req): Json<StageRequest>,
) -> ApiResult<StageOutcome> {
    finish(
        state.orchestrator.add(vec![PathBuf::from(req.path)]),
        |output| match output {
            TaskOutput::Staged(outcomes) => outcomes.into_iter().next(),
            _ => None,
        },
    )
    .await
}

#[derive(Debug, Default, Serialize, Deserialize)]
pub struct StageAllRequest {
    pub root: Option<String>,
    pub exclude: Option<Vec<String>>,
}

async fn stage_all(
    State(state): State<AppState>,
    Json(req): Json<StageAllRequest>,
) -> ApiResult<StageAllReport> {
    finish(
        state
            .orchestrator
            .add_all(req.root.map(PathBuf::from), req.exclude),
        |output| match output {
            TaskOutput::StagedAll(report) => Some(report),
            _ => None,
        },
    )
    .await
}

async fn get_commits(State(state): State<AppState>) -> ApiResult<Vec<Commit>> {
    finish(state.orchestrator.log(), |output| match output {
        TaskOutput::Log(commits) => Some(commits),
        _ => None,
    })
    .await
}

#[derive(Debug, Serialize, Deserialize)]
pub struct CreateCommitRequest {
    pub message: String,
    pub summary: Option<String>,
}

async fn create_commit(
    State(state): State<AppState>,
    Json(req): Json<CreateCommitRequest>,
) -> ApiResult<Commit> {
    finish(
        state.orchestrator.commit(req.message, req.summary),
        |output| match output {
            TaskOutput::Committed(commit) => Some(commit),
            _ => None,
        },
    )
    .await
}

async fn get_commit(State(state): State<AppState>, Path(id): Path<String>) -> ApiResult<Commit> {
    finish(state.orchestrator.show(id), |output| match output {
        TaskOutput::Commit(commit) => Some(commit),
        _ => None,
    })
    .await
}

#[derive(Debug, Default, Deserialize)]
struct DiffQuery {
    #[serde(default)]
    detailed: bool,
}

async fn get_diff(
    State(state): State<AppState>,
    Path((from, to)): Path<(String, String)>,
    Query(query): Query<DiffQuery>,
) -> ApiResult<CommitDiff> {
    finish(
        state.orchestrator.diff(from, to, query.detailed),
        |output| match output {
            TaskOutput::Diff(diff) => Some(diff),
            _ => None,
        },
    )
    .await
}
