use axum::{
    Json, Router,
    extract::{Path, State, WebSocketUpgrade, ws::WebSocket},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::get,
};
use kiln::evaluate::EvaluateCreateCmd;
use kiln::{Flavor, InstanceId, RequestIndex};

use super::{InstanceDto, service_error};
use crate::{AppState, ws};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(watch_evaluate))
        .route("/{owner}/{project_id}/{training_id}/{id}", get(get_evaluate))
}

/// Request an evaluation board and watch it until it is usable.
///
/// The first client frame is the create command, with `type` set to
/// `custom` (with `aim_path`) or `standard` (with `log_path` and scopes).
#[utoipa::path(
    get,
    path = "/api/v1/evaluate/ws",
    responses(
        (status = 101, description = "Switching to the WebSocket protocol")
    ),
    tag = "evaluate"
)]
pub async fn watch_evaluate(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| run(socket, state))
}

async fn run(socket: WebSocket, state: AppState) {
    let (sink, mut receiver) = ws::split(socket);

    let cmd: EvaluateCreateCmd = match ws::read_request(&mut receiver).await {
        Some(Ok(cmd)) => cmd,
        Some(Err(e)) => return ws::reject(sink, format!("invalid request: {}", e)).await,
        None => return,
    };

    match state.kiln.evaluate.create(&cmd).await {
        Ok((index, view)) => {
            let notifier = state.kiln.notifier(Flavor::Evaluate);
            ws::watch(notifier, &index, &view.instance_id, sink, receiver).await;
        }
        Err(e) => {
            tracing::warn!("evaluate request failed: {}", e);
            ws::reject(sink, service_error(&e).1).await;
        }
    }
}

/// Get one evaluation board
#[utoipa::path(
    get,
    path = "/api/v1/evaluate/{owner}/{project_id}/{training_id}/{id}",
    params(
        ("owner" = String, Path, description = "Project owner"),
        ("project_id" = String, Path, description = "Project ID"),
        ("training_id" = String, Path, description = "Evaluated training"),
        ("id" = String, Path, description = "Instance ID")
    ),
    responses(
        (status = 200, description = "Instance state", body = InstanceDto),
        (status = 404, description = "Instance not found")
    ),
    tag = "evaluate"
)]
pub async fn get_evaluate(
    State(state): State<AppState>,
    Path((owner, project_id, training_id, id)): Path<(String, String, String, String)>,
) -> impl IntoResponse {
    let Ok(index) = RequestIndex::evaluate(owner, project_id, training_id) else {
        return Err((StatusCode::BAD_REQUEST, "Invalid request"));
    };

    match state
        .kiln
        .evaluate
        .get(&index, &InstanceId::from_string(id))
        .await
    {
        Ok(instance) => Ok(Json(InstanceDto::from(instance))),
        Err(e) => Err(service_error(&e)),
    }
}
