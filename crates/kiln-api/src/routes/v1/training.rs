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
        .route("/{project_id}", post(create_training).get(list_trainings))
        .route("/{project_id}/{id}", get(get_training).delete(delete_training))
        .route("/{project_id}/{id}/recreate", post(recreate_training))
        .route("/{project_id}/{id}/terminate", put(terminate_training))
        .route("/{project_id}/{id}/log", get(training_log))
        .route("/{project_id}/{id}/ws", get(watch_training))
}

fn index(caller: &Caller, project_id: String) -> Result<RequestIndex, ApiError> {
    RequestIndex::training(caller.0.clone(), project_id).map_err(index_error)
}

/// Start a training job for a project
#[utoipa::path(
    post,
    path = "/api/v1/training/{project_id}",
    params(("project_id" = String, Path, description = "Project ID")),
    request_body = CreateJobRequest,
    responses(
        (status = 201, description = "Training accepted", body = JobSummaryDto),
        (status = 400, description = "Invalid request"),
        (status = 401, description = "Authentication required"),
        (status = 409, description = "A training is running or the record limit is reached")
    ),
    tag = "training"
)]
pub async fn create_training(
    State(state): State<AppState>,
    caller: Caller,
    Path(project_id): Path<String>,
    Json(request): Json<CreateJobRequest>,
) -> Result<(StatusCode, Json<JobSummaryDto>), ApiError> {
    let index = index(&caller, project_id)?;
    jobs::create(&state.kiln.training, &index, request).await
}

/// List trainings of a project, newest first
#[utoipa::path(
    get,
    path = "/api/v1/training/{project_id}",
    params(("project_id" = String, Path, description = "Project ID")),
    responses(
        (status = 200, description = "List of trainings", body = ListJobsResponse),
        (status = 401, description = "Authentication required")
    ),
    tag = "training"
)]
pub async fn list_trainings(
    State(state): State<AppState>,
    caller: Caller,
    Path(project_id): Path<String>,
) -> Result<Json<ListJobsResponse>, ApiError> {
    let index = index(&caller, project_id)?;
    jobs::list(&state.kiln.training, &index).await
}

/// Get a training
#[utoipa::path(
    get,
    path = "/api/v1/training/{project_id}/{id}",
    params(
        ("project_id" = String, Path, description = "Project ID"),
        ("id" = String, Path, description = "Training ID")
    ),
    responses(
        (status = 200, description = "Training found", body = JobDetailDto),
        (status = 404, description = "Training not found")
    ),
    tag = "training"
)]
pub async fn get_training(
    State(state): State<AppState>,
    caller: Caller,
    Path((project_id, id)): Path<(String, String)>,
) -> Result<Json<JobDetailDto>, ApiError> {
    let index = index(&caller, project_id)?;
    jobs::get(&state.kiln.training, &index, id).await
}

/// Delete a training and its platform job
#[utoipa::path(
    delete,
    path = "/api/v1/training/{project_id}/{id}",
    params(
        ("project_id" = String, Path, description = "Project ID"),
        ("id" = String, Path, description = "Training ID")
    ),
    responses(
        (status = 204, description = "Training deleted")
    ),
    tag = "training"
)]
pub async fn delete_training(
    State(state): State<AppState>,
    caller: Caller,
    Path((project_id, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let index = index(&caller, project_id)?;
    jobs::delete(&state.kiln.training, &index, id).await
}

/// Start a new training with the settings of an earlier one
#[utoipa::path(
    post,
    path = "/api/v1/training/{project_id}/{id}/recreate",
    params(
        ("project_id" = String, Path, description = "Project ID"),
        ("id" = String, Path, description = "Training to copy")
    ),
    responses(
        (status = 201, description = "Training accepted", body = JobSummaryDto),
        (status = 404, description = "Training not found"),
        (status = 409, description = "A training is running or the record limit is reached")
    ),
    tag = "training"
)]
pub async fn recreate_training(
    State(state): State<AppState>,
    caller: Caller,
    Path((project_id, id)): Path<(String, String)>,
) -> Result<(StatusCode, Json<JobSummaryDto>), ApiError> {
    let index = index(&caller, project_id)?;
    jobs::recreate(&state.kiln.training, &index, id).await
}

/// Stop a running training
#[utoipa::path(
    put,
    path = "/api/v1/training/{project_id}/{id}/terminate",
    params(
        ("project_id" = String, Path, description = "Project ID"),
        ("id" = String, Path, description = "Training ID")
    ),
    responses(
        (status = 204, description = "Training terminated"),
        (status = 404, description = "Training not found"),
        (status = 409, description = "Training cannot be terminated in its status")
    ),
    tag = "training"
)]
pub async fn terminate_training(
    State(state): State<AppState>,
    caller: Caller,
    Path((project_id, id)): Path<(String, String)>,
) -> Result<StatusCode, ApiError> {
    let index = index(&caller, project_id)?;
    jobs::terminate(&state.kiln.training, &index, id).await
}

/// Download link for the training log
#[utoipa::path(
    get,
    path = "/api/v1/training/{project_id}/{id}/log",
    params(
        ("project_id" = String, Path, description = "Project ID"),
        ("id" = String, Path, description = "Training ID")
    ),
    responses(
        (status = 200, description = "Log link", body = UrlResponse),
        (status = 404, description = "Training or log not found")
    ),
    tag = "training"
)]
pub async fn training_log(
    State(state): State<AppState>,
    caller: Caller,
    Path((project_id, id)): Path<(String, String)>,
) -> Result<Json<UrlResponse>, ApiError> {
    let index = index(&caller, project_id)?;
    jobs::log(&state.kiln.training, &index, id).await
}

/// Watch a training until it is done
#[utoipa::path(
    get,
    path = "/api/v1/training/{project_id}/{id}/ws",
    params(
        ("project_id" = String, Path, description = "Project ID"),
        ("id" = String, Path, description = "Training ID")
    ),
    responses(
        (status = 101, description = "Switching to the WebSocket protocol")
    ),
    tag = "training"
)]
pub async fn watch_training(
    State(state): State<AppState>,
    caller: Caller,
    Path((project_id, id)): Path<(String, String)>,
    upgrade: WebSocketUpgrade,
) -> Result<Response, ApiError> {
    let index = index(&caller, project_id)?;
    let notifier = state.kiln.notifier(Flavor::Training).clone();
    Ok(jobs::watch(upgrade, notifier, index, id))
}
