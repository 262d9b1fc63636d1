//! Callback surface for the execution platform
//!
//! Served on its own listener so it is never exposed with the public API.

use axum::{
    Json, Router,
    extract::{Path, State},
    http::StatusCode,
    routing::put,
};
use kiln::reconciler::ReconcileError;
use kiln::store::StoreError;
use kiln::{DetailPatch, Flavor, InstanceId, RequestIndex};
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

use crate::AppState;

pub fn routes() -> Router<AppState> {
    Router::new().route("/{flavor}/instances/{id}", put(update_detail))
}

/// Document an instance belongs to
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct IndexDto {
    pub owner: String,
    pub parent_id: String,
    pub fingerprint: Option<String>,
}

/// Reported fields; absent fields are left untouched
#[derive(Debug, Clone, Default, Serialize, Deserialize, ToSchema)]
pub struct DetailDto {
    pub error: Option<String>,
    pub access_url: Option<String>,
    pub expiry: Option<i64>,
    pub status: Option<String>,
    pub duration: Option<i64>,
    pub log_path: Option<String>,
    pub output_path: Option<String>,
}

impl From<DetailDto> for DetailPatch {
    fn from(dto: DetailDto) -> Self {
        DetailPatch {
            error: dto.error,
            access_url: dto.access_url,
            expiry: dto.expiry,
            status: dto.status,
            duration: dto.duration,
            log_path: dto.log_path,
            output_path: dto.output_path,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct UpdateDetailRequest {
    pub index: IndexDto,
    #[serde(default)]
    pub detail: DetailDto,
}

/// Apply a platform report to one instance
#[utoipa::path(
    put,
    path = "/internal/v1/{flavor}/instances/{id}",
    params(
        ("flavor" = String, Path, description = "inference, evaluate, finetune or training"),
        ("id" = String, Path, description = "Instance ID")
    ),
    request_body = UpdateDetailRequest,
    responses(
        (status = 204, description = "Report applied"),
        (status = 400, description = "Invalid report"),
        (status = 404, description = "Instance not found")
    ),
    tag = "internal"
)]
pub async fn update_detail(
    State(state): State<AppState>,
    Path((flavor, id)): Path<(String, String)>,
    Json(request): Json<UpdateDetailRequest>,
) -> Result<StatusCode, (StatusCode, &'static str)> {
    let flavor: Flavor = flavor
        .parse()
        .map_err(|_| (StatusCode::BAD_REQUEST, "Unknown flavor"))?;
    let index = RequestIndex::new(
        flavor,
        request.index.owner,
        request.index.parent_id,
        request.index.fingerprint,
    )
    .map_err(|_| (StatusCode::BAD_REQUEST, "Invalid index"))?;

    match state
        .kiln
        .reconciler
        .update_detail(&index, &InstanceId::from_string(id), request.detail.into())
        .await
    {
        Ok(()) => Ok(StatusCode::NO_CONTENT),
        Err(ReconcileError::Invalid(e)) => {
            tracing::warn!("rejected report for {}: {}", index, e);
            Err((StatusCode::BAD_REQUEST, "Invalid report"))
        }
        Err(ReconcileError::Store(StoreError::NotFound(_))) => {
            Err((StatusCode::NOT_FOUND, "Instance not found"))
        }
        Err(e) => {
            tracing::error!("failed to apply report for {}: {}", index, e);
            Err((StatusCode::INTERNAL_SERVER_ERROR, "Failed to apply report"))
        }
    }
}
