//! WebSocket watch endpoints against a real listener

mod common;

use common::{USER, create_test_app_with, dispatch_next};
use futures::{SinkExt, Stream, StreamExt};
use kiln::store::InstanceStore;
use kiln::{DetailPatch, KilnConfig, RequestIndex};
use serde_json::{Value, json};
use std::net::SocketAddr;
use std::time::Duration;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::tungstenite::client::IntoClientRequest;

async fn serve(app: axum::Router) -> SocketAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    addr
}

fn fast_config() -> KilnConfig {
    let mut config = KilnConfig::default();
    config.inference.poll_interval_ms = 20;
    config.inference.timeout_iterations = 200;
    config.training.poll_interval_ms = 20;
    config.training.timeout_iterations = 200;
    config
}

async fn next_frame<S>(socket: &mut S) -> Value
where
    S: Stream<Item = Result<Message, tokio_tungstenite::tungstenite::Error>> + Unpin,
{
    loop {
        let message = tokio::time::timeout(Duration::from_secs(5), socket.next())
            .await
            .expect("no frame in time")
            .expect("socket closed")
            .unwrap();
        if let Message::Text(text) = message {
            return serde_json::from_str(text.as_str()).unwrap();
        }
    }
}

#[tokio::test]
async fn test_inference_watch_reports_access_url() {
    let app = create_test_app_with(fast_config());
    let addr = serve(app.public.clone()).await;

    let url = format!("ws://{}/api/v1/inference/ws", addr);
    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    let request = json!({
        "project_owner": USER,
        "project_id": "p1",
        "project_name": "demo",
        "last_commit": "abc",
        "inference_dir": "inference",
        "boot_file": "app.py"
    });
    socket
        .send(Message::text(request.to_string()))
        .await
        .unwrap();

    // The instance is provisioned and reported ready while the client waits
    dispatch_next(&app).await;
    let index = RequestIndex::inference(USER, "p1", "abc").unwrap();
    let snapshot = app.kiln.store().find_instances(&index).await.unwrap();
    let id = snapshot.instances[0].id.clone();
    app.kiln
        .reconciler
        .update_detail(&index, &id, DetailPatch::ready("https://x", 4_000_000_000))
        .await
        .unwrap();

    let frame = next_frame(&mut socket).await;
    assert_eq!(frame, json!({ "accessURL": "https://x", "instanceId": id.to_string() }));
}

#[tokio::test]
async fn test_inference_watch_rejects_malformed_request() {
    let app = create_test_app_with(fast_config());
    let addr = serve(app.public.clone()).await;

    let url = format!("ws://{}/api/v1/inference/ws", addr);
    let (mut socket, _) = tokio_tungstenite::connect_async(url).await.unwrap();
    socket.send(Message::text("{\"project_owner\": 1}")).await.unwrap();

    let frame = next_frame(&mut socket).await;
    assert!(frame["error"].as_str().unwrap().starts_with("invalid request"));
}

#[tokio::test]
async fn test_training_watch_ends_with_done_frame() {
    let app = create_test_app_with(fast_config());
    let addr = serve(app.public.clone()).await;

    let index = RequestIndex::training(USER, "p1").unwrap();
    let cmd = kiln::job::JobCreateCmd {
        name: "run".to_string(),
        description: None,
        config: json!({}),
    };
    let instance = app.kiln.training.create(&index, &cmd).await.unwrap();
    dispatch_next(&app).await;

    let url = format!("ws://{}/api/v1/training/p1/{}/ws", addr, instance.id);
    let mut request = url.into_client_request().unwrap();
    request
        .headers_mut()
        .insert(kiln_api::extract::CALLER_HEADER, USER.parse().unwrap());
    let (mut socket, _) = tokio_tungstenite::connect_async(request).await.unwrap();

    let first = next_frame(&mut socket).await;
    assert_eq!(first["instanceId"], instance.id.to_string());
    assert!(first.get("done").is_none());

    app.kiln
        .reconciler
        .update_detail(
            &index,
            &instance.id,
            DetailPatch {
                status: Some("completed".to_string()),
                ..Default::default()
            },
        )
        .await
        .unwrap();

    let last = loop {
        let frame = next_frame(&mut socket).await;
        if frame.get("done").is_some() {
            break frame;
        }
    };
    assert_eq!(last["done"], true);
    assert_eq!(last["status"], "completed");
}
