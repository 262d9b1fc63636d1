mod common;

use axum::http::StatusCode;
use common::{USER, create_test_app, json_request, report};
use kiln::inference::InferenceCreateCmd;
use kiln::store::InstanceStore;
use serde_json::json;

fn inference_cmd() -> InferenceCreateCmd {
    InferenceCreateCmd {
        project_owner: USER.to_string(),
        project_id: "p1".to_string(),
        project_name: "demo".to_string(),
        last_commit: "abc".to_string(),
        inference_dir: "inference".to_string(),
        boot_file: "app.py".to_string(),
    }
}

fn inference_index() -> serde_json::Value {
    json!({ "owner": USER, "parent_id": "p1", "fingerprint": "abc" })
}

#[tokio::test]
async fn test_report_ready_instance() {
    let app = create_test_app();
    let (index, view) = app.kiln.inference.create(&inference_cmd()).await.unwrap();
    let id = view.instance_id.to_string();

    let detail = json!({ "access_url": "https://x", "expiry": 4_000_000_000i64 });
    let status = report(&app, "inference", &id, inference_index(), detail.clone()).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    // Same report again changes nothing
    let status = report(&app, "inference", &id, inference_index(), detail).await;
    assert_eq!(status, StatusCode::NO_CONTENT);

    let instance = app
        .kiln
        .store()
        .find_instance(&index, &view.instance_id)
        .await
        .unwrap();
    assert_eq!(instance.detail.access_url.as_deref(), Some("https://x"));
    assert_eq!(instance.detail.expiry, 4_000_000_000);

    let uri = format!("/api/v1/inference/{}/p1/abc/{}", USER, id);
    let (status, body) = json_request(&app.public, "GET", &uri, None, None).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["access_url"], "https://x");
}

#[tokio::test]
async fn test_report_rejects_contradictory_detail() {
    let app = create_test_app();
    let (_, view) = app.kiln.inference.create(&inference_cmd()).await.unwrap();

    let status = report(
        &app,
        "inference",
        &view.instance_id.to_string(),
        inference_index(),
        json!({ "error": "boom", "access_url": "https://x", "expiry": 10 }),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_report_rejects_empty_detail() {
    let app = create_test_app();
    let (_, view) = app.kiln.inference.create(&inference_cmd()).await.unwrap();

    let status = report(
        &app,
        "inference",
        &view.instance_id.to_string(),
        inference_index(),
        json!({}),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_report_unknown_flavor() {
    let app = create_test_app();

    let status = report(&app, "notebook", "x", inference_index(), json!({ "error": "boom" })).await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn test_report_unknown_instance() {
    let app = create_test_app();

    let status = report(
        &app,
        "inference",
        "missing",
        inference_index(),
        json!({ "error": "boom" }),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn test_internal_routes_are_not_public() {
    let app = create_test_app();

    let (status, _) = json_request(
        &app.public,
        "PUT",
        "/internal/v1/inference/instances/x",
        None,
        Some(json!({ "index": inference_index(), "detail": { "error": "boom" } })),
    )
    .await;

    assert_eq!(status, StatusCode::NOT_FOUND);
}
