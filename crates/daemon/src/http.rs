// SPDX-License-Identifier: MIT

//! HTTP Adapter (F, consumed contract) implemented with `axum` (§6,
//! `[AMBIENT]`): the teacher's own daemon has no HTTP surface at all, so
//! this module follows the request/response shape `axum::Router` +
//! `State` + `Json` idiom used elsewhere in the retrieved pack rather
//! than any teacher precedent.

use std::sync::Arc;

use axum::extract::{Query, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::{get, post};
use axum::{Json, Router};
use cnagent_core::SystemClock;
use cnagent_engine::Supervisor;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::error::DaemonError;

#[derive(Clone)]
pub struct AppState {
    pub supervisor: Arc<Supervisor<SystemClock>>,
}

pub fn router(state: AppState) -> Router {
    Router::new()
        .route("/tasks", post(admit_task).get(list_tasks))
        .route("/pause", post(pause))
        .route("/resume", post(resume))
        .route("/history", get(history))
        .route("/healthz", get(healthz))
        .with_state(state)
}

#[derive(Debug, Deserialize)]
struct AdmitQuery {
    task: String,
}

#[derive(Debug, Deserialize, Default)]
struct AdmitBody {
    #[serde(default)]
    params: Value,
}

const CONTROLLER_ID_HEADER: &str = "x-controller-id";
const CONTROLLER_TRACE_HEADER: &str = "x-controller-trace";

/// `POST /tasks?task=<kind>` (§4.6, §6): admits immediately, never waits
/// for the task to finish.
async fn admit_task(
    State(state): State<AppState>,
    Query(query): Query<AdmitQuery>,
    headers: HeaderMap,
    body: Option<Json<AdmitBody>>,
) -> Result<Json<Value>, DaemonError> {
    let controller_id = headers.get(CONTROLLER_ID_HEADER).and_then(|v| v.to_str().ok()).unwrap_or("unknown").to_string();
    let controller_trace = headers.get(CONTROLLER_TRACE_HEADER).and_then(|v| v.to_str().ok()).map(str::to_string);
    let params = body.map(|Json(b)| b.params).unwrap_or(Value::Null);

    let id = state.supervisor.admit(&query.task, params, controller_id, controller_trace)?;
    Ok(Json(json!({"id": id.to_string()})))
}

async fn pause(State(state): State<AppState>) -> StatusCode {
    state.supervisor.pause();
    StatusCode::NO_CONTENT
}

async fn resume(State(state): State<AppState>) -> StatusCode {
    state.supervisor.resume();
    StatusCode::NO_CONTENT
}

/// `GET /history` (§4.6, §6): History plus currently running records.
/// Uses the same in-flight-plus-finished snapshot `GET /tasks` does —
/// `Supervisor::history()` alone only has the finished half.
async fn history(State(state): State<AppState>) -> Json<Vec<Value>> {
    Json(state.supervisor.snapshot())
}

/// `GET /tasks` (§6): snapshot of in-flight and recently-finished records.
async fn list_tasks(State(state): State<AppState>) -> Json<Vec<Value>> {
    Json(state.supervisor.snapshot())
}

/// `GET /healthz` (`[SUPPLEMENT]`): trivial liveness probe, not a
/// task-domain feature and so not excluded by any scope non-goal.
async fn healthz() -> StatusCode {
    StatusCode::OK
}

#[cfg(test)]
#[path = "http_tests.rs"]
mod tests;
