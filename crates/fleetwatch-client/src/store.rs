//! Client-side state store.
//!
//! [`StateStore`] is the single shared, mutable view of the fleet. The router,
//! scheduler, search coordinator and command dispatcher all write through its
//! entry points; renderers read snapshots. Every entry point takes the write
//! lock once, so a reader never sees half of a multi-field update.

use std::collections::{HashMap, VecDeque};

use serde_json::Value;
use tokio::sync::RwLock;
use tracing::{debug, trace};

use fleetwatch_core::types::now;
use fleetwatch_core::{
    ActivityEntry, AgentId, AgentRecord, AgentStatus, AgentUpdate, SearchHit, SystemMetrics,
    Timestamp, View,
};

use crate::config::DEFAULT_ACTIVITY_CAPACITY;
use crate::connection::ConnectionState;

/// Results currently shown for the search box.
#[derive(Debug, Clone, PartialEq)]
pub struct SearchResults {
    pub query: String,
    pub seq: u64,
    pub hits: Vec<SearchHit>,
}

/// Plain state, mutated only through [`StateStore`].
#[derive(Debug, Clone)]
pub struct DashboardState {
    agents: HashMap<AgentId, AgentRecord>,
    activity: VecDeque<ActivityEntry>,
    activity_capacity: usize,
    activity_total: u64,
    metrics: Option<SystemMetrics>,
    active_view: View,
    connection: ConnectionState,
    search: Option<SearchResults>,
    view_data: HashMap<View, Value>,
    last_update: Option<Timestamp>,
}

impl Default for DashboardState {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_CAPACITY)
    }
}

impl DashboardState {
    pub fn new(activity_capacity: usize) -> Self {
        Self {
            agents: HashMap::new(),
            activity: VecDeque::with_capacity(activity_capacity),
            activity_capacity: activity_capacity.max(1),
            activity_total: 0,
            metrics: None,
            active_view: View::default(),
            connection: ConnectionState::Idle,
            search: None,
            view_data: HashMap::new(),
            last_update: None,
        }
    }

    fn touch(&mut self) {
        self.last_update = Some(now());
    }

    /// Merge an agent update. Returns true if the agent was new.
    pub fn upsert_agent(&mut self, update: &AgentUpdate) -> bool {
        self.touch();
        match self.agents.get_mut(&update.id) {
            Some(record) => {
                record.apply(update);
                false
            }
            None => {
                self.agents
                    .insert(update.id.clone(), AgentRecord::from_update(update));
                true
            }
        }
    }

    /// Record an acknowledged status change. Unknown agents are added.
    pub fn set_agent_status(&mut self, agent_id: &str, status: AgentStatus) {
        self.upsert_agent(&AgentUpdate::new(agent_id, status));
    }

    /// Prepend an activity entry, evicting the oldest beyond capacity.
    /// Returns the number of entries evicted.
    pub fn record_activity(&mut self, entry: ActivityEntry) -> usize {
        self.touch();
        self.activity.push_front(entry);
        self.activity_total += 1;

        let mut evicted = 0;
        while self.activity.len() > self.activity_capacity {
            self.activity.pop_back();
            evicted += 1;
        }
        evicted
    }

    pub fn set_metrics(&mut self, metrics: SystemMetrics) {
        self.touch();
        self.metrics = Some(metrics);
    }

    /// Switch view, returning the previous one.
    pub fn set_active_view(&mut self, view: View) -> View {
        std::mem::replace(&mut self.active_view, view)
    }

    pub fn set_connection_state(&mut self, state: ConnectionState) {
        self.connection = state;
    }

    pub fn set_search_results(&mut self, results: SearchResults) {
        self.search = Some(results);
    }

    pub fn clear_search_results(&mut self) {
        self.search = None;
    }

    pub fn set_view_data(&mut self, view: View, data: Value) {
        self.touch();
        self.view_data.insert(view, data);
    }

    pub fn agent(&self, agent_id: &str) -> Option<&AgentRecord> {
        self.agents.get(agent_id)
    }

    /// All agents sorted by id.
    pub fn agents(&self) -> Vec<&AgentRecord> {
        let mut agents: Vec<_> = self.agents.values().collect();
        agents.sort_by(|a, b| a.id.cmp(&b.id));
        agents
    }

    pub fn agent_count(&self) -> usize {
        self.agents.len()
    }

    /// Activity entries, newest first.
    pub fn activity(&self) -> impl Iterator<Item = &ActivityEntry> {
        self.activity.iter()
    }

    pub fn activity_len(&self) -> usize {
        self.activity.len()
    }

    /// Entries ever recorded, including evicted ones.
    pub fn activity_total(&self) -> u64 {
        self.activity_total
    }

    pub fn metrics(&self) -> Option<&SystemMetrics> {
        self.metrics.as_ref()
    }

    pub fn active_view(&self) -> View {
        self.active_view
    }

    pub fn connection_state(&self) -> ConnectionState {
        self.connection
    }

    pub fn search_results(&self) -> Option<&SearchResults> {
        self.search.as_ref()
    }

    pub fn view_data(&self, view: View) -> Option<&Value> {
        self.view_data.get(&view)
    }

    pub fn last_update(&self) -> Option<Timestamp> {
        self.last_update
    }

    /// Agents per status, for summary lines.
    pub fn status_counts(&self) -> HashMap<AgentStatus, usize> {
        let mut counts = HashMap::new();
        for record in self.agents.values() {
            *counts.entry(record.status).or_insert(0) += 1;
        }
        counts
    }
}

/// Shared store guarding a [`DashboardState`].
#[derive(Debug)]
pub struct StateStore {
    state: RwLock<DashboardState>,
}

impl Default for StateStore {
    fn default() -> Self {
        Self::new(DEFAULT_ACTIVITY_CAPACITY)
    }
}

impl StateStore {
    pub fn new(activity_capacity: usize) -> Self {
        Self {
            state: RwLock::new(DashboardState::new(activity_capacity)),
        }
    }

    /// Merge semantics: present fields overwrite, absent fields are kept.
    pub async fn upsert_agent(&self, update: &AgentUpdate) {
        let created = self.state.write().await.upsert_agent(update);
        trace!(agent_id = %update.id, status = %update.status, created, "agent upserted");
    }

    /// Apply a batch of updates under one lock (agent-status refresh).
    pub async fn upsert_agents(&self, updates: &[AgentUpdate]) {
        let mut state = self.state.write().await;
        for update in updates {
            state.upsert_agent(update);
        }
        debug!(count = updates.len(), "agent statuses refreshed");
    }

    pub async fn set_agent_status(&self, agent_id: &str, status: AgentStatus) {
        self.state.write().await.set_agent_status(agent_id, status);
    }

    pub async fn record_activity(&self, entry: ActivityEntry) {
        let evicted = self.state.write().await.record_activity(entry);
        if evicted > 0 {
            trace!(evicted, "activity log at capacity");
        }
    }

    pub async fn set_metrics(&self, metrics: SystemMetrics) {
        self.state.write().await.set_metrics(metrics);
    }

    /// Records the new view and returns the previous one.
    pub async fn set_active_view(&self, view: View) -> View {
        self.state.write().await.set_active_view(view)
    }

    pub async fn set_connection_state(&self, connection: ConnectionState) {
        self.state.write().await.set_connection_state(connection);
    }

    pub async fn set_search_results(&self, results: SearchResults) {
        self.state.write().await.set_search_results(results);
    }

    pub async fn clear_search_results(&self) {
        self.state.write().await.clear_search_results();
    }

    pub async fn set_view_data(&self, view: View, data: Value) {
        self.state.write().await.set_view_data(view, data);
    }

    /// Cloned, consistent copy of the whole state.
    pub async fn snapshot(&self) -> DashboardState {
        self.state.read().await.clone()
    }

    pub async fn agent(&self, agent_id: &str) -> Option<AgentRecord> {
        self.state.read().await.agent(agent_id).cloned()
    }

    pub async fn agents(&self) -> Vec<AgentRecord> {
        self.state
            .read()
            .await
            .agents()
            .into_iter()
            .cloned()
            .collect()
    }

    /// Activity entries, newest first.
    pub async fn activity(&self) -> Vec<ActivityEntry> {
        self.state.read().await.activity().cloned().collect()
    }

    pub async fn metrics(&self) -> Option<SystemMetrics> {
        self.state.read().await.metrics().cloned()
    }

    pub async fn active_view(&self) -> View {
        self.state.read().await.active_view()
    }

    pub async fn connection_state(&self) -> ConnectionState {
        self.state.read().await.connection_state()
    }

    pub async fn search_results(&self) -> Option<SearchResults> {
        self.state.read().await.search_results().cloned()
    }

    pub async fn view_data(&self, view: View) -> Option<Value> {
        self.state.read().await.view_data(view).cloned()
    }

    pub async fn last_update(&self) -> Option<Timestamp> {
        self.state.read().await.last_update()
    }
}
