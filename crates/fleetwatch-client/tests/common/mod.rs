//! Shared test doubles for the client integration tests.

#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Mutex;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use fleetwatch_client::{AgentAction, ClientError, CommandResult, DashboardApi, Result};
use fleetwatch_core::{AgentUpdate, SearchHit, SystemMetrics, View};

/// In-memory backend with call recording and configurable latency.
#[derive(Default)]
pub struct MockApi {
    pub search_calls: Mutex<Vec<String>>,
    pub search_delays: Mutex<HashMap<String, Duration>>,
    pub search_fails: Mutex<bool>,

    pub execute_calls: Mutex<Vec<String>>,
    pub execute_response: Mutex<Option<CommandResult>>,
    pub execute_delay: Mutex<Duration>,

    pub metrics_calls: AtomicUsize,
    pub metrics_delay: Mutex<Duration>,
    pub metrics_fail: Mutex<bool>,

    pub agent_status_calls: AtomicUsize,
    pub agent_statuses: Mutex<Vec<AgentUpdate>>,

    pub agent_actions: Mutex<Vec<(String, AgentAction)>>,
    pub agent_action_fail: Mutex<bool>,

    pub view_calls: Mutex<Vec<View>>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_search_delay(self, query: &str, delay: Duration) -> Self {
        self.search_delays
            .lock()
            .unwrap()
            .insert(query.to_string(), delay);
        self
    }

    pub fn with_execute_response(self, response: CommandResult) -> Self {
        *self.execute_response.lock().unwrap() = Some(response);
        self
    }

    pub fn with_execute_delay(self, delay: Duration) -> Self {
        *self.execute_delay.lock().unwrap() = delay;
        self
    }

    pub fn with_metrics_delay(self, delay: Duration) -> Self {
        *self.metrics_delay.lock().unwrap() = delay;
        self
    }

    pub fn with_agent_statuses(self, updates: Vec<AgentUpdate>) -> Self {
        *self.agent_statuses.lock().unwrap() = updates;
        self
    }

    pub fn search_calls(&self) -> Vec<String> {
        self.search_calls.lock().unwrap().clone()
    }

    pub fn execute_calls(&self) -> Vec<String> {
        self.execute_calls.lock().unwrap().clone()
    }

    pub fn metrics_calls(&self) -> usize {
        self.metrics_calls.load(Ordering::SeqCst)
    }

    pub fn agent_status_calls(&self) -> usize {
        self.agent_status_calls.load(Ordering::SeqCst)
    }

    pub fn view_calls(&self) -> Vec<View> {
        self.view_calls.lock().unwrap().clone()
    }

    pub fn view_calls_for(&self, view: View) -> usize {
        self.view_calls().into_iter().filter(|v| *v == view).count()
    }
}

#[async_trait]
impl DashboardApi for MockApi {
    async fn search(&self, query: &str) -> Result<Vec<SearchHit>> {
        self.search_calls.lock().unwrap().push(query.to_string());
        let delay = self.search_delays.lock().unwrap().get(query).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }
        if *self.search_fails.lock().unwrap() {
            return Err(ClientError::ApiTransient("search backend down".into()));
        }

        Ok(vec![SearchHit {
            kind: "agent".into(),
            id: format!("hit-{query}"),
            title: format!("Result for {query}"),
            description: String::new(),
            timestamp: None,
            query: query.to_string(),
        }])
    }

    async fn execute(&self, command: &str) -> Result<CommandResult> {
        self.execute_calls.lock().unwrap().push(command.to_string());
        let delay = *self.execute_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        let response = self.execute_response.lock().unwrap().clone();
        Ok(response.unwrap_or_else(|| CommandResult::ok(None)))
    }

    async fn system_metrics(&self) -> Result<SystemMetrics> {
        let call = self.metrics_calls.fetch_add(1, Ordering::SeqCst) + 1;
        let delay = *self.metrics_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if *self.metrics_fail.lock().unwrap() {
            return Err(ClientError::ApiTransient("metrics unavailable".into()));
        }
        Ok(SystemMetrics {
            cpu: call as f64,
            ..Default::default()
        })
    }

    async fn agent_statuses(&self) -> Result<Vec<AgentUpdate>> {
        self.agent_status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self.agent_statuses.lock().unwrap().clone())
    }

    async fn agent_action(&self, agent_id: &str, action: AgentAction) -> Result<()> {
        self.agent_actions
            .lock()
            .unwrap()
            .push((agent_id.to_string(), action));
        if *self.agent_action_fail.lock().unwrap() {
            return Err(ClientError::Api("HTTP 404: no such agent".into()));
        }
        Ok(())
    }

    async fn view_data(&self, view: View) -> Result<Value> {
        self.view_calls.lock().unwrap().push(view);
        Ok(serde_json::json!({ "view": view.to_string() }))
    }
}
