use super::*;
use axum::routing::{get, post};
use axum::Router;

async fn spawn_fake_daemon() -> String {
    let app = Router::new()
        .route("/tasks", post(|| async { axum::Json(serde_json::json!({"id": "11111111-1111-1111-1111-111111111111"})) }).get(|| async { axum::Json(serde_json::json!([])) }))
        .route("/pause", post(|| async { axum::http::StatusCode::NO_CONTENT }))
        .route("/resume", post(|| async { axum::http::StatusCode::NO_CONTENT }))
        .route("/history", get(|| async { axum::Json(serde_json::json!([{"id": "a"}])) }))
        .route("/healthz", get(|| async { axum::http::StatusCode::OK }));
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.expect("bind");
    let addr = listener.local_addr().expect("addr");
    tokio::spawn(async move {
        axum::serve(listener, app).await.ok();
    });
    format!("http://{addr}")
}

#[tokio::test]
async fn admit_parses_the_generated_id() {
    let base = spawn_fake_daemon().await;
    let client = DaemonClient::new(base);
    let id = client.admit("nop", serde_json::json!({})).await.expect("admit should succeed");
    assert_eq!(id, "11111111-1111-1111-1111-111111111111");
}

#[tokio::test]
async fn pause_and_resume_succeed() {
    let base = spawn_fake_daemon().await;
    let client = DaemonClient::new(base);
    client.pause().await.expect("pause should succeed");
    client.resume().await.expect("resume should succeed");
}

#[tokio::test]
async fn history_returns_the_records_array() {
    let base = spawn_fake_daemon().await;
    let client = DaemonClient::new(base);
    let history = client.history().await.expect("history should succeed");
    assert_eq!(history.len(), 1);
}

#[tokio::test]
async fn healthz_succeeds_against_a_live_daemon() {
    let base = spawn_fake_daemon().await;
    let client = DaemonClient::new(base);
    client.healthz().await.expect("healthz should succeed");
}
