// SPDX-License-Identifier: MIT

//! HTTP client for the daemon's admin surface (§6): one method per
//! command, mirroring the request/response shape of `cnagent-daemon::http`.

use serde_json::Value;

#[derive(Debug, thiserror::Error)]
pub enum ClientError {
    #[error("request to daemon failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("daemon returned {status}: {body}")]
    Daemon { status: reqwest::StatusCode, body: String },
}

pub struct DaemonClient {
    base_url: String,
    http: reqwest::Client,
}

impl DaemonClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self { base_url: base_url.into(), http: reqwest::Client::new() }
    }

    /// Admits a task of the given kind and returns its generated id.
    pub async fn admit(&self, task_kind: &str, params: Value) -> Result<String, ClientError> {
        let url = format!("{}/tasks", self.base_url);
        let response = self.http.post(url).query(&[("task", task_kind)]).json(&serde_json::json!({"params": params})).send().await?;
        let body = Self::ok_json(response).await?;
        Ok(body["id"].as_str().unwrap_or_default().to_string())
    }

    pub async fn pause(&self) -> Result<(), ClientError> {
        let url = format!("{}/pause", self.base_url);
        Self::ok_empty(self.http.post(url).send().await?).await
    }

    pub async fn resume(&self) -> Result<(), ClientError> {
        let url = format!("{}/resume", self.base_url);
        Self::ok_empty(self.http.post(url).send().await?).await
    }

    pub async fn history(&self) -> Result<Vec<Value>, ClientError> {
        let url = format!("{}/history", self.base_url);
        let response = self.http.get(url).send().await?;
        let body = Self::ok_json(response).await?;
        Ok(body.as_array().cloned().unwrap_or_default())
    }

    pub async fn tasks(&self) -> Result<Vec<Value>, ClientError> {
        let url = format!("{}/tasks", self.base_url);
        let response = self.http.get(url).send().await?;
        let body = Self::ok_json(response).await?;
        Ok(body.as_array().cloned().unwrap_or_default())
    }

    pub async fn healthz(&self) -> Result<(), ClientError> {
        let url = format!("{}/healthz", self.base_url);
        Self::ok_empty(self.http.get(url).send().await?).await
    }

    async fn ok_json(response: reqwest::Response) -> Result<Value, ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Daemon { status, body });
        }
        Ok(response.json().await?)
    }

    async fn ok_empty(response: reqwest::Response) -> Result<(), ClientError> {
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::Daemon { status, body });
        }
        Ok(())
    }
}

#[cfg(test)]
#[path = "client_tests.rs"]
mod tests;
