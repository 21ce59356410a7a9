// SPDX-License-Identifier: MIT

//! Top-level daemon error type (§7 `[AMBIENT]`): chains every crate
//! boundary's error outward and maps the ones the HTTP adapter can
//! surface to a status code.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use cnagent_core::{AdmitError, CoreError};
use serde_json::json;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error(transparent)]
    Admit(#[from] AdmitError),
    #[error(transparent)]
    Core(#[from] CoreError),
    #[error(transparent)]
    Engine(#[from] cnagent_engine::EngineError),
    #[error(transparent)]
    Config(#[from] crate::config::ConfigError),
}

impl IntoResponse for DaemonError {
    fn into_response(self) -> Response {
        let status = match &self {
            DaemonError::Admit(AdmitError::UnknownTask(_)) => StatusCode::NOT_FOUND,
            DaemonError::Admit(AdmitError::Paused) => StatusCode::SERVICE_UNAVAILABLE,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        (status, Json(json!({"error": self.to_string()}))).into_response()
    }
}
