mod common;
use crate::common::{open_registry, registry, with_timeout, SettingsBuilder};

use std::time::Duration;

use axum::Router;
use axum::body::{to_bytes, Body};
use axum::http::{header, Request, StatusCode};
use serde_json::{json, Value};
use tower::ServiceExt;

use rundeck::api::router;

async fn send(app: &Router, req: Request<Body>) -> (StatusCode, String) {
    let resp = app.clone().oneshot(req).await.unwrap();
    let status = resp.status();
    let bytes = with_timeout(to_bytes(resp.into_body(), usize::MAX))
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}

async fn send_json(app: &Router, req: Request<Body>) -> (StatusCode, Value) {
    let (status, body) = send(app, req).await;
    (status, serde_json::from_str(&body).unwrap())
}

fn post_json(uri: &str, body: Value) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn post_empty(uri: &str) -> Request<Body> {
    Request::builder()
        .method("POST")
        .uri(uri)
        .body(Body::empty())
        .unwrap()
}

fn get(uri: &str) -> Request<Body> {
    Request::builder().uri(uri).body(Body::empty()).unwrap()
}

#[tokio::test]
async fn run_with_empty_command_is_a_400() {
    let app = router(open_registry());
    let (status, body) = send_json(
        &app,
        post_json("/api/run", json!({"mode": "command", "value": "  "})),
    )
    .await;

    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["success"], json!(false));
    assert_eq!(body["error"]["code"], json!("empty_command"));
}

#[tokio::test]
async fn malformed_run_request_is_a_400() {
    let app = router(open_registry());
    let (status, body) = send_json(&app, post_json("/api/run", json!({"value": "ls"}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("invalid_request"));
}

#[tokio::test]
async fn unlisted_command_is_refused_in_controlled_mode() {
    let app = router(registry(SettingsBuilder::new().build()));
    let (status, body) = send_json(
        &app,
        post_json("/api/run", json!({"mode": "command", "value": "rm -rf /"})),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_eq!(body["error"]["code"], json!("command_not_allowed"));
}

#[tokio::test]
async fn unknown_task_is_404_everywhere() {
    let app = router(open_registry());

    let (status, body) = send_json(&app, get("/api/stream/nonexistent")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert_eq!(body["error"]["code"], json!("not_found"));

    let (status, _) = send_json(&app, post_empty("/api/stop/nonexistent")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);

    let (status, _) = send_json(&app, get("/api/tasks/nonexistent")).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
}

async fn run(app: &Router, command: &str) -> String {
    let (status, body) = send_json(
        app,
        post_json("/api/run", json!({"mode": "command", "value": command})),
    )
    .await;
    assert_eq!(status, StatusCode::OK, "{body}");
    assert_eq!(body["success"], json!(true));
    body["task_id"].as_str().unwrap().to_string()
}

#[tokio::test]
async fn run_then_stream_delivers_sse_events() {
    let app = router(open_registry());
    let task_id = run(&app, "echo hi").await;

    let resp = app
        .clone()
        .oneshot(get(&format!("/api/stream/{task_id}")))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    assert_eq!(
        resp.headers()[header::CONTENT_TYPE],
        "text/event-stream"
    );

    let bytes = with_timeout(to_bytes(resp.into_body(), usize::MAX))
        .await
        .unwrap();
    let text = String::from_utf8(bytes.to_vec()).unwrap();
    let banner = format!("data: [task {task_id}] Started command: echo hi\n");
    assert!(text.contains(&banner), "{text}");
    assert!(text.contains("data: [stdout] hi\n"), "{text}");
    assert!(
        text.contains("data: [system] process exited with code 0\n"),
        "{text}"
    );
    assert!(text.contains("id: 0\n"), "{text}");
    assert!(text.contains("id: 2\n"), "{text}");
    assert!(text.find(&banner).unwrap() < text.find("data: [stdout] hi").unwrap());
    assert!(text.find("data: [stdout] hi").unwrap() < text.find("data: [system]").unwrap());
}

#[tokio::test]
async fn stream_opened_after_the_task_ended_replays_its_output() {
    let app = router(registry(
        SettingsBuilder::new().allow_arbitrary_command(true).build(),
    ));
    let task_id = run(&app, "echo hi; echo oops 1>&2").await;

    tokio::time::sleep(Duration::from_millis(300)).await;
    let (_, body) = send_json(&app, get(&format!("/api/tasks/{task_id}"))).await;
    assert_eq!(body["task"]["state"], json!("completed"));

    let (status, text) = send(&app, get(&format!("/api/stream/{task_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert!(text.contains("Started command: echo hi; echo oops 1>&2\n"), "{text}");
    assert!(text.contains("data: [stdout] hi\n"), "{text}");
    assert!(text.contains("data: [stderr] oops\n"), "{text}");
    assert!(
        text.contains("data: [system] process exited with code 0\n"),
        "{text}"
    );
}

#[tokio::test]
async fn stop_then_status_reports_terminated() {
    let app = router(open_registry());
    let (_, body) = send_json(
        &app,
        post_json("/api/run", json!({"mode": "command", "value": "sleep 30"})),
    )
    .await;
    let task_id = body["task_id"].as_str().unwrap().to_string();

    // Keep a stream open so we know when the task has finished.
    let stream = app
        .clone()
        .oneshot(get(&format!("/api/stream/{task_id}")))
        .await
        .unwrap();

    for _ in 0..2 {
        let (status, body) = send_json(&app, post_empty(&format!("/api/stop/{task_id}"))).await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"success": true}));
    }

    let bytes = with_timeout(to_bytes(stream.into_body(), usize::MAX))
        .await
        .unwrap();
    assert!(String::from_utf8_lossy(&bytes).contains("terminated by user"));

    let (status, body) = send_json(&app, get(&format!("/api/tasks/{task_id}"))).await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["task"]["state"], json!("terminated"));
    assert_eq!(body["task"]["mode"], json!("command"));

    let (_, body) = send_json(&app, get("/api/tasks")).await;
    assert_eq!(body["tasks"].as_array().map(Vec::len), Some(1));
}

#[tokio::test]
async fn busy_server_answers_409() {
    let reg = registry(
        SettingsBuilder::new()
            .allow_arbitrary_command(true)
            .max_running_tasks(1)
            .build(),
    );
    let app = router(reg.clone());

    let (status, _) = send_json(
        &app,
        post_json("/api/run", json!({"mode": "command", "value": "sleep 30"})),
    )
    .await;
    assert_eq!(status, StatusCode::OK);

    let (status, body) = send_json(
        &app,
        post_json("/api/run", json!({"mode": "command", "value": "sleep 30"})),
    )
    .await;
    assert_eq!(status, StatusCode::CONFLICT);
    assert_eq!(body["error"]["code"], json!("busy"));

    reg.terminate_all();
}
