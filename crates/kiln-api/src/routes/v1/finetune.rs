use axum::{
    Json, Router,
    extract::{Path, State, WebSocketUpgrade},
    http::StatusCode,
    response::Response,
    routing::{get, post, put},
};
use kiln::{Flavor, RequestIndex};

use super::jobs::{
    self, ApiError, CreateJobRequest, JobDetailDto, JobSummaryDto, ListJobsResponse, UrlResponse,
    index_error,
};
use crate::AppState;
use crate::extract::Caller;

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_finetune).get(list_finetunes))
        .route("/{id}", get(get_finetune).delete(delete_finetune))
        .route("/{id}/terminate", put(terminate_finetune))
        .route("/{id}/log", get(finetune_log))
        .route("/{id}/ws", get(watch_finetune))
}

fn index(caller: &Caller) -> Result<RequestIndex, ApiError> {
    RequestIndex::finetune(caller.0.clone()).map_err(index_error)
}

/// Start a fine-tuning job
#[utoipa::path(
    post,
    path = "/api/v1/finetune",
    request_body = CreateJobRequest,
    responses(
        (status = 201, description = "Fine-tune accepted", body = JobSummaryDto),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Authentication required"),
        (status = 409, description = "A fine-tune is running or the record limit is reached")
    ),
    tag = "finetune"
)]
pub async fn create_finetune(
    State(state): State<AppState>,
    caller: Caller,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobSummaryDto>), ApiError> {
    let index = index(&caller)?;
    jobs::create(&state.kiln.finetune, &index, request).await
}

/// List fine-tunes of the caller, newest first
#[utoipa::path(
    get,
    path = "/api/v1/finetune",
    responses(
        (status = 200, description = "List of fine-tunes", body = ListJobsResponse),
        (status = 401, description = "Authentication required")
    ),
    tag = "finetune"
)]
pub async fn list_finetunes(
    State(state): State<AppState>,
    caller: Caller,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let index = index(&caller)?;
    jobs::list(&state.kiln.finetune, &index).await
}

/// Get a fine-tune
#[utoipa::path(
    get,
    path = "/api/v1/finetune/{id}",
    params(("id" = String, Path, description = "Fine-tune ID")),
    responses(
        (status = 200, description = "Fine-tune found", body = JobDetailDto),
        (status = 404, description = "Fine-tune not found")
    ),
    tag = "finetune"
)]
pub async fn get_finetune(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<JobDetailDto>, ApiError> {
    let index = index(&caller)?;
    jobs::get(&state.kiln.finetune, &index, id).await
}

/// Delete a fine-tune and its platform job
#[utoipa::path(
    delete,
    path = "/api/v1/finetune/{id}",
    params(("id" = String, Path, description = "Fine-tune ID")),
    responses(
        (status = 204, description = "Fine-tune deleted")
    ),
    tag = "finetune"
)]
pub async fn delete_finetune(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let index = index(&caller)?;
    jobs::delete(&state.kiln.finetune, &index, id).await
}

/// Stop a running fine-tune
#[utoipa::path(
    put,
    path = "/api/v1/finetune/{id}/terminate",
    params(("id" = String, Path, description = "Fine-tune ID")),
    responses(
        (status = 204, description = "Fine-tune terminated"),
        (status = 404, description = "Fine-tune not found"),
        (status = 409, description = "Fine-tune cannot be terminated in its status")
    ),
    tag = "finetune"
)]
pub async fn terminate_finetune(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<StatusCode, ApiError> {
    let index = index(&caller)?;
    jobs::terminate(&state.kiln.finetune, &index, id).await
}

/// Download link for the fine-tune log
#[utoipa::path(
    get,
    path = "/api/v1/finetune/{id}/log",
    params(("id" = String, Path, description = "Fine-tune ID")),
    responses(
        (status = 200, description = "Log link", body = UrlResponse),
        (status = 404, description = "Fine-tune or log not found")
    ),
    tag = "finetune"
)]
pub async fn finetune_log(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
) -> Result<Json<UrlResponse>, ApiError> {
    let index = index(&caller)?;
    jobs::log(&state.kiln.finetune, &index, id).await
}

/// Watch a fine-tune until it is done
#[utoipa::path(
    get,
    path = "/api/v1/finetune/{id}/ws",
    params(("id" = String, Path, description = "Fine-tune ID")),
    responses(
        (status = 101, description = "Switching to the WebSocket protocol")
    ),
    tag = "finetune"
)]
pub async fn watch_finetune(
    State(state): State<AppState>,
    caller: Caller,
    Path(id): Path<String>,
    upgrade: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let index = index(&caller)?;
    let notifier = state.kiln.notifier(Flavor::Finetune).clone();
    Ok(jobs::watch(upgrade, notifier, index, id))
}
