use crate::AppState;
use axum::{Json, Router, extract::State, routing::get};
use kiln::Flavor;
use serde::Serialize;
use utoipa::ToSchema;

#[derive(Serialize, ToSchema)]
pub struct HealthResponse {
    pub status: String,
    pub version: String,
    pub service: String,
    /// Backing of the instance store and dispatch queue
    pub storage: String,
    /// Queue messages the dispatch worker handles at once
    pub dispatch_slots: usize,
    /// Instance flavors this broker hands out
    pub flavors: Vec<String>,
}

pub fn routes() -> Router<AppState> {
    Router::new().route("/health", get(health_check))
}

#[utoipa::path(
    get,
    path = "/health",
    tag = "health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        service: "kiln-api".to_string(),
        storage: state.kiln.storage_kind().to_string(),
        dispatch_slots: state.kiln.config().queue.concurrency,
        flavors: Flavor::ALL.iter().map(|f| f.to_string()).collect(),
    })
}
