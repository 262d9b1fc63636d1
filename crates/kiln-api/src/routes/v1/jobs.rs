//! Handlers shared by the training and fine-tune routes

use axum::{
    Json,
    extract::{WebSocketUpgrade, ws::WebSocket},
    http::StatusCode,
    response::Response,
};
use kiln::job::{JobCreateCmd, JobDetail, JobError, JobService, JobSummary};
use kiln::notifier::Notifier;
use kiln::{Instance, InstanceId, RequestIndex};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::ws;

pub(crate) type ApiError = (StatusCode, &'static str);

/// Request to start a job
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct CreateJobRequest {
    pub name: String,
    pub description: Option<String>,
    /// Free-form settings passed to the platform
    #[serde(default)]
    #[schema(value_type = Object)]
    pub config: serde_json::Value,
}

impl From<CreateJobRequest> for JobCreateCmd {
    fn from(request: CreateJobRequest) -> Self {
        JobCreateCmd {
            name: request.name,
            description: request.description,
            config: request.config,
        }
    }
}

/// API representation of a job in a listing
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobSummaryDto {
    pub id: String,
    pub name: String,
    pub status: Option<String>,
    pub error: Option<String>,
    pub duration: i64,
    pub created_at: i64,
    pub is_done: bool,
}

impl From<JobSummary> for JobSummaryDto {
    fn from(summary: JobSummary) -> Self {
        Self {
            id: summary.id.to_string(),
            name: summary.name,
            status: summary.status,
            error: summary.error,
            duration: summary.duration,
            created_at: summary.created_at,
            is_done: summary.is_done,
        }
    }
}

impl JobSummaryDto {
    /// A job that was just accepted and is waiting to be scheduled
    fn accepted(instance: &Instance) -> Self {
        Self {
            id: instance.id.to_string(),
            name: instance
                .input
                .get("name")
                .and_then(|n| n.as_str())
                .unwrap_or_default()
                .to_string(),
            status: instance.detail.status.clone(),
            error: instance.detail.error.clone(),
            duration: instance.detail.duration,
            created_at: instance.created_at,
            is_done: false,
        }
    }
}

/// API representation of one job
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct JobDetailDto {
    pub id: String,
    pub name: String,
    pub description: Option<String>,
    pub status: Option<String>,
    pub error: Option<String>,
    pub duration: i64,
    pub created_at: i64,
    pub is_done: bool,
    #[schema(value_type = Object)]
    pub config: serde_json::Value,
    pub log_preview_url: Option<String>,
    pub has_log: bool,
    pub has_output: bool,
}

impl From<JobDetail> for JobDetailDto {
    fn from(detail: JobDetail) -> Self {
        let summary = detail.summary;
        Self {
            id: summary.id.to_string(),
            name: summary.name,
            description: detail.description,
            status: summary.status,
            error: summary.error,
            duration: summary.duration,
            created_at: summary.created_at,
            is_done: summary.is_done,
            config: detail.config,
            log_preview_url: detail.log_preview_url,
            has_log: detail.has_log,
            has_output: detail.has_output,
        }
    }
}

/// Response for listing jobs
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct ListJobsResponse {
    pub jobs: Vec<JobSummaryDto>,
    pub total: usize,
}

/// A download link
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UrlResponse {
    pub url: String,
}

pub(crate) fn job_error(e: &JobError) -> ApiError {
    match e {
        JobError::NotFound(_) => (StatusCode::NOT_FOUND, "Job not found"),
        JobError::RunningJobExists(_) => (StatusCode::CONFLICT, "A job is already running"),
        JobError::RecordLimitExceeded(_) => {
            (StatusCode::CONFLICT, "Job limit reached, delete an old job first")
        }
        JobError::CannotTerminate(_, _) => {
            (StatusCode::CONFLICT, "Job cannot be terminated in its status")
        }
        JobError::NotReady(_, _) => (StatusCode::NOT_FOUND, "Job has no log yet"),
        JobError::InvalidInput(_) => (StatusCode::BAD_REQUEST, "Invalid request"),
        _ => {
            tracing::error!("job request failed: {}", e);
            (StatusCode::INTERNAL_SERVER_ERROR, "Failed to process job")
        }
    }
}

pub(crate) fn index_error(e: kiln::CoreError) -> ApiError {
    tracing::debug!("rejected index: {}", e);
    (StatusCode::BAD_REQUEST, "Invalid request")
}

pub(crate) async fn create(
    service: &JobService,
    index: &RequestIndex,
    request: CreateJobRequest,
) -> Result<(StatusCode, Json<JobSummaryDto>), ApiError> {
    let cmd = JobCreateCmd::from(request);
    match service.create(index, &cmd).await {
        Ok(instance) => Ok((StatusCode::CREATED, Json(JobSummaryDto::accepted(&instance)))),
        Err(e) => Err(job_error(&e)),
    }
}

pub(crate) async fn recreate(
    service: &JobService,
    index: &RequestIndex,
    id: String,
) -> Result<(StatusCode, Json<JobSummaryDto>), ApiError> {
    match service.recreate(index, &InstanceId::from_string(id)).await {
        Ok(instance) => Ok((StatusCode::CREATED, Json(JobSummaryDto::accepted(&instance)))),
        Err(e) => Err(job_error(&e)),
    }
}

pub(crate) async fn list(
    service: &JobService,
    index: &RequestIndex,
) -> Result<Json<ListJobsResponse>, ApiError> {
    match service.list(index).await {
        Ok(summaries) => {
            let jobs: Vec<JobSummaryDto> = summaries.into_iter().map(JobSummaryDto::from).collect();
            let total = jobs.len();
            Ok(Json(ListJobsResponse { jobs, total }))
        }
        Err(e) => Err(job_error(&e)),
    }
}

pub(crate) async fn get(
    service: &JobService,
    index: &RequestIndex,
    id: String,
) -> Result<Json<JobDetailDto>, ApiError> {
    match service.get(index, &InstanceId::from_string(id)).await {
        Ok(detail) => Ok(Json(JobDetailDto::from(detail))),
        Err(e) => Err(job_error(&e)),
    }
}

pub(crate) async fn delete(
    service: &JobService,
    index: &RequestIndex,
    id: String,
) -> Result<StatusCode, ApiError> {
    match service.delete(index, &InstanceId::from_string(id)).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err(job_error(&e)),
    }
}

pub(crate) async fn terminate(
    service: &JobService,
    index: &RequestIndex,
    id: String,
) -> Result<StatusCode, ApiError> {
    match service.terminate(index, &InstanceId::from_string(id)).await {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(e) => Err(job_error(&e)),
    }
}

pub(crate) async fn log(
    service: &JobService,
    index: &RequestIndex,
    id: String,
) -> Result<Json<UrlResponse>, ApiError> {
    match service
        .log_download_url(index, &InstanceId::from_string(id))
        .await
    {
        Ok(url) => Ok(Json(UrlResponse { url })),
        Err(e) => Err(job_error(&e)),
    }
}

/// Stream progress frames until the job reaches a done status
pub(crate) fn watch(
    upgrade: WebSocketUpgrade,
    notifier: Notifier,
    index: RequestIndex,
    id: String,
) -> Response {
    upgrade.on_upgrade(move |socket: WebSocket| async move {
        let (sink, receiver) = ws::split(socket);
        ws::watch(&notifier, &index, &InstanceId::from_string(id), sink, receiver).await;
    })
}
