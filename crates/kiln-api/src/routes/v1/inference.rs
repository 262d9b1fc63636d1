use axum::{
    Json, Router,
    extract::{Path, State, WebSocketUpgrade, ws::WebSocket},
    response::{IntoResponse, Response},
    routing::get,
};
use kiln::inference::InferenceCreateCmd;
use kiln::{Flavor, InstanceId, RequestIndex};

use super::{InstanceDto, service_error};
use crate::{AppState, ws};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/ws", get(watch_inference))
        .route("/{owner}/{project_id}/{last_commit}/{id}", get(get_inference))
}

/// Request an inference instance and watch it until it is usable.
///
/// The client sends one JSON frame with the create command; the server
/// answers with `{accessURL, instanceId}`, `{error}` or `{timeoutError}`.
#[utoipa::path(
    get,
    path = "/api/v1/inference/ws",
    responses(
        (status = 101, description = "Switching to the WebSocket protocol")
    ),
    tag = "inference"
)]
pub async fn watch_inference(State(state): State<AppState>, upgrade: WebSocketUpgrade) -> Response {
    upgrade.on_upgrade(move |socket| run(socket, state))
}

async fn run(socket: WebSocket, state: AppState) {
    let (sink, mut receiver) = ws::split(socket);

    let cmd: InferenceCreateCmd = match ws::read_request(&mut receiver).await {
        Some(Ok(cmd)) => cmd,
        Some(Err(e)) => return ws::reject(sink, format!("invalid request: {}", e)).await,
        None => return,
    };

    match state.kiln.inference.create(&cmd).await {
        Ok((index, view)) => {
            let notifier = state.kiln.notifier(Flavor::Inference);
            ws::watch(notifier, &index, &view.instance_id, sink, receiver).await;
        }
        Err(e) => {
            tracing::warn!("inference request failed: {}", e);
            ws::reject(sink, service_error(&e).1).await;
        }
    }
}

/// Get one inference instance
#[utoipa::path(
    get,
    path = "/api/v1/inference/{owner}/{project_id}/{last_commit}/{id}",
    params(
        ("owner" = String, Path, description = "Project owner"),
        ("project_id" = String, Path, description = "Project ID"),
        ("last_commit" = String, Path, description = "Commit the instance serves"),
        ("id" = String, Path, description = "Instance ID")
    ),
    responses(
        (status = 200, description = "Instance state", body = InstanceDto),
        (status = 404, description = "Instance not found")
    ),
    tag = "inference"
)]
pub async fn get_inference(
    State(state): State<AppState>,
    Path((owner, project_id, last_commit, id)): Path<(String, String, String, String)>,
) -> impl IntoResponse {
    let Ok(index) = RequestIndex::inference(owner, project_id, last_commit) else {
        return Err((axum::http::StatusCode::BAD_REQUEST, "Invalid request"));
    };

    match state
        .kiln
        .inference
        .get(&index, &InstanceId::from_string(id))
        .await
    {
        Ok(instance) => Ok(Json(InstanceDto::from(instance))),
        Err(e) => Err(service_error(&e)),
    }
}
