use crate::AppState;
use axum::{Router, http::StatusCode};
use kiln::Instance;
use kiln::service::ServiceError;
use kiln::store::StoreError;
use serde::{Deserialize, Serialize};
use utoipa::ToSchema;

pub mod evaluate;
pub mod finetune;
pub mod inference;
pub mod jobs;
pub mod training;

/// API v1 routes
pub fn routes() -> Router<AppState> {
    Router::new()
        .nest("/inference", inference::routes())
        .nest("/evaluate", evaluate::routes())
        .nest("/training", training::routes())
        .nest("/finetune", finetune::routes())
}

/// API representation of a short-lived instance
#[derive(Debug, Clone, Serialize, Deserialize, ToSchema)]
pub struct InstanceDto {
    pub instance_id: String,
    pub error: Option<String>,
    pub access_url: Option<String>,
    pub expiry: i64,
    pub created_at: i64,
}

impl From<Instance> for InstanceDto {
    fn from(instance: Instance) -> Self {
        Self {
            instance_id: instance.id.to_string(),
            error: instance.detail.error,
            access_url: instance.detail.access_url,
            expiry: instance.detail.expiry,
            created_at: instance.created_at,
        }
    }
}

pub(crate) fn service_error(e: &ServiceError) -> (StatusCode, &'static str) {
    match e {
        ServiceError::InvalidInput(_) | ServiceError::InvalidRequest(_) => {
            (StatusCode::BAD_REQUEST, "Invalid request")
        }
        ServiceError::Store(StoreError::NotFound(_)) => (StatusCode::NOT_FOUND, "Instance not found"),
        _ => (StatusCode::INTERNAL_SERVER_ERROR, "Failed to process instance"),
    }
}
