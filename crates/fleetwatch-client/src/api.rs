//! Request/response access to the dashboard backend.
//!
//! [`DashboardApi`] is the seam every component talks through; [`HttpApi`]
//! implements it over `reqwest`. Tests substitute their own implementation.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::debug;

use fleetwatch_core::{AgentUpdate, SearchHit, SystemMetrics, View};

use crate::config::ClientConfig;
use crate::error::{ClientError, Result};

/// Structured result of `POST /api/execute`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CommandResult {
    pub success: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub data: Option<Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl CommandResult {
    pub fn ok(data: Option<Value>) -> Self {
        Self {
            success: true,
            data,
            error: None,
        }
    }

    pub fn failed(error: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(error.into()),
        }
    }
}

/// Lifecycle actions accepted by `POST /api/agents/{id}/{action}`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentAction {
    Start,
    Stop,
}

impl AgentAction {
    pub fn path_segment(&self) -> &'static str {
        match self {
            AgentAction::Start => "start",
            AgentAction::Stop => "stop",
        }
    }
}

/// Backend operations used by the dashboard.
#[async_trait]
pub trait DashboardApi: Send + Sync {
    /// `GET /api/search?q=`
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>>;

    /// `POST /api/execute`
    async fn execute(&self, command: &str) -> Result<CommandResult>;

    /// `GET /api/system/metrics`
    async fn system_metrics(&self) -> Result<SystemMetrics>;

    /// `GET /api/agents/status`
    async fn agent_statuses(&self) -> Result<Vec<AgentUpdate>>;

    /// `POST /api/agents/{id}/start|stop`
    async fn agent_action(&self, agent_id: &str, action: AgentAction) -> Result<()>;

    /// View-scoped payload, opaque to the client.
    async fn view_data(&self, view: View) -> Result<Value>;
}

/// [`DashboardApi`] over HTTP.
pub struct HttpApi {
    client: reqwest::Client,
    base_url: String,
    timeout_secs: u64,
}

impl HttpApi {
    /// Create an API client from config.
    pub fn from_config(config: &ClientConfig) -> Result<Self> {
        Self::new(&config.base_url, config.request_timeout_secs)
    }

    /// Create an API client for `base_url`.
    pub fn new(base_url: impl Into<String>, timeout_secs: u64) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(timeout_secs))
            .build()
            .map_err(|e| ClientError::Config(format!("Failed to create HTTP client: {}", e)))?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout_secs,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn map_send_error(&self, path: &str, err: reqwest::Error) -> ClientError {
        if err.is_timeout() {
            ClientError::Timeout(self.timeout_secs, path.to_string())
        } else {
            ClientError::Http(err)
        }
    }

    async fn get_json<T: serde::de::DeserializeOwned>(
        &self,
        path: &str,
        query: Option<&[(&str, &str)]>,
    ) -> Result<T> {
        debug!(path, "GET");
        let mut request = self.client.get(self.url(path));
        if let Some(query) = query {
            request = request.query(query);
        }

        let response = request
            .send()
            .await
            .map_err(|e| self.map_send_error(path, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_http_status(status, &body));
        }

        let body = response
            .text()
            .await
            .map_err(|e| self.map_send_error(path, e))?;
        serde_json::from_str(&body).map_err(|source| ClientError::InvalidResponse {
            path: path.to_string(),
            source,
        })
    }

    /// `/api/agents/{id}/{action}` with the id percent-encoded as one segment.
    fn agent_action_url(&self, agent_id: &str, action: AgentAction) -> Result<reqwest::Url> {
        let mut url = reqwest::Url::parse(&self.url("/api/agents"))
            .map_err(|e| ClientError::Config(format!("Invalid base URL {}: {}", self.base_url, e)))?;
        url.path_segments_mut()
            .map_err(|_| ClientError::Config(format!("Base URL cannot hold a path: {}", self.base_url)))?
            .push(agent_id)
            .push(action.path_segment());
        Ok(url)
    }
}

#[async_trait]
impl DashboardApi for HttpApi {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.get_json("/api/search", Some(&[("q", query)][..])).await
    }

    async fn execute(&self, command: &str) -> Result<CommandResult> {
        let path = "/api/execute";
        debug!(path, command, "POST");

        let response = self
            .client
            .post(self.url(path))
            .json(&serde_json::json!({ "command": command }))
            .send()
            .await
            .map_err(|e| self.map_send_error(path, e))?;

        let status = response.status();
        let body = response.text().await.unwrap_or_default();

        // Backends may reject a command with a non-2xx status and a normal result body.
        match serde_json::from_str::<CommandResult>(&body) {
            Ok(result) => Ok(result),
            Err(_) if !status.is_success() => {
                Err(ClientError::from_http_status(status.as_u16(), &body))
            }
            Err(source) => Err(ClientError::InvalidResponse {
                path: path.to_string(),
                source,
            }),
        }
    }

    async fn system_metrics(&self) -> Result<SystemMetrics> {
        self.get_json("/api/system/metrics", None).await
    }

    async fn agent_statuses(&self) -> Result<Vec<AgentUpdate>> {
        self.get_json("/api/agents/status", None).await
    }

    async fn agent_action(&self, agent_id: &str, action: AgentAction) -> Result<()> {
        let url = self.agent_action_url(agent_id, action)?;
        let path = url.path().to_string();
        debug!(path = %path, "POST");

        let response = self
            .client
            .post(url)
            .send()
            .await
            .map_err(|e| self.map_send_error(&path, e))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ClientError::from_http_status(status, &body));
        }
        Ok(())
    }

    async fn view_data(&self, view: View) -> Result<Value> {
        self.get_json(view.endpoint(), None).await
    }
}
