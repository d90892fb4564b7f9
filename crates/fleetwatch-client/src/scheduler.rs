//! Periodic refresh tasks.
//!
//! Each [`RefreshTask`] runs on its own interval. Executions are
//! non-reentrant: a tick that finds the previous run unfinished is skipped,
//! never queued. Hiding the dashboard stops all timers; showing it again runs
//! every task once immediately and then resumes the normal cadence.

use std::sync::Arc;
use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::Duration;

use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior, interval_at};
use tracing::{debug, warn};

use fleetwatch_core::{Notification, View};

use crate::api::DashboardApi;
use crate::config::RefreshConfig;
use crate::error::Result;
use crate::store::StateStore;

/// The periodic refresh jobs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RefreshTask {
    Metrics,
    AgentStatus,
    /// Only runs while the Activity view is active.
    Activity,
}

impl RefreshTask {
    pub const ALL: [RefreshTask; 3] = [
        RefreshTask::Metrics,
        RefreshTask::AgentStatus,
        RefreshTask::Activity,
    ];

    pub fn name(&self) -> &'static str {
        match self {
            RefreshTask::Metrics => "metrics",
            RefreshTask::AgentStatus => "agent_status",
            RefreshTask::Activity => "activity",
        }
    }

    fn index(&self) -> usize {
        match self {
            RefreshTask::Metrics => 0,
            RefreshTask::AgentStatus => 1,
            RefreshTask::Activity => 2,
        }
    }

    /// Interval for this task.
    pub fn period(&self, config: &RefreshConfig) -> Duration {
        let secs = match self {
            RefreshTask::Metrics => config.metrics_secs,
            RefreshTask::AgentStatus => config.agent_status_secs,
            RefreshTask::Activity => config.activity_secs,
        };
        Duration::from_secs(secs)
    }
}

/// Counters for one task.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RefreshStats {
    /// Executions that issued a request.
    pub runs: u64,
    /// Triggers dropped because a run was still in flight.
    pub skipped: u64,
}

#[derive(Default)]
struct TaskSlot {
    in_flight: AtomicBool,
    runs: AtomicU64,
    skipped: AtomicU64,
}

struct Inner {
    api: Arc<dyn DashboardApi>,
    store: Arc<StateStore>,
    notifier: mpsc::UnboundedSender<Notification>,
    slots: [TaskSlot; 3],
}

/// Releases a task's in-flight flag when the execution ends, however it ends.
struct InFlight {
    inner: Arc<Inner>,
    task: RefreshTask,
}

impl Drop for InFlight {
    fn drop(&mut self) {
        self.inner.slot(self.task).in_flight.store(false, Ordering::Release);
    }
}

impl Inner {
    fn slot(&self, task: RefreshTask) -> &TaskSlot {
        &self.slots[task.index()]
    }

    /// Start an execution unless one is already running.
    fn trigger(self: &Arc<Self>, task: RefreshTask) -> bool {
        let slot = self.slot(task);
        if slot
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            slot.skipped.fetch_add(1, Ordering::Relaxed);
            debug!(task = task.name(), "refresh still in flight, skipping tick");
            return false;
        }

        let guard = InFlight {
            inner: Arc::clone(self),
            task,
        };
        tokio::spawn(async move {
            guard.inner.execute(task).await;
            drop(guard);
        });
        true
    }

    async fn execute(&self, task: RefreshTask) {
        if task == RefreshTask::Activity && self.store.active_view().await != View::Activity {
            return;
        }
        self.slot(task).runs.fetch_add(1, Ordering::Relaxed);

        if let Err(e) = self.fetch_and_apply(task).await {
            self.report(task, e.friendly_message());
        }
    }

    async fn fetch_and_apply(&self, task: RefreshTask) -> Result<()> {
        match task {
            RefreshTask::Metrics => {
                let metrics = self.api.system_metrics().await?;
                self.store.set_metrics(metrics).await;
            }
            RefreshTask::AgentStatus => {
                let updates = self.api.agent_statuses().await?;
                self.store.upsert_agents(&updates).await;
            }
            RefreshTask::Activity => {
                let data = self.api.view_data(View::Activity).await?;
                self.store.set_view_data(View::Activity, data).await;
            }
        }
        Ok(())
    }

    fn report(&self, task: RefreshTask, message: String) {
        warn!(task = task.name(), error = %message, "refresh failed");
        let _ = self
            .notifier
            .send(Notification::error(format!("Failed to refresh {}: {}", task.name(), message)));
    }
}

/// Visibility as the timer loops see it. `resumes` counts hidden-to-shown
/// transitions so a hide and show that land between two polls still restart
/// the loops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
struct Visibility {
    hidden: bool,
    resumes: u64,
}

/// Drives the periodic refresh tasks.
pub struct RefreshScheduler {
    inner: Arc<Inner>,
    config: RefreshConfig,
    visible: watch::Sender<Visibility>,
    shutdown: watch::Sender<bool>,
    handles: Mutex<Vec<JoinHandle<()>>>,
}

impl RefreshScheduler {
    pub fn new(
        api: Arc<dyn DashboardApi>,
        store: Arc<StateStore>,
        notifier: mpsc::UnboundedSender<Notification>,
        config: RefreshConfig,
    ) -> Self {
        let (visible, _) = watch::channel(Visibility::default());
        let (shutdown, _) = watch::channel(false);
        Self {
            inner: Arc::new(Inner {
                api,
                store,
                notifier,
                slots: Default::default(),
            }),
            config,
            visible,
            shutdown,
            handles: Mutex::new(Vec::new()),
        }
    }

    /// Spawn one timer loop per task. Calling it again is a no-op.
    pub fn start(&self) {
        let Ok(mut handles) = self.handles.lock() else {
            warn!("scheduler handle list poisoned");
            return;
        };
        if !handles.is_empty() {
            return;
        }

        for task in RefreshTask::ALL {
            let period = task.period(&self.config);
            debug!(task = task.name(), period_secs = period.as_secs(), "starting refresh task");
            handles.push(tokio::spawn(run_task(
                Arc::clone(&self.inner),
                task,
                period,
                self.visible.subscribe(),
                self.shutdown.subscribe(),
            )));
        }
    }

    /// Pause (`false`) or resume (`true`) all timers.
    pub fn set_visible(&self, visible: bool) {
        let changed = self.visible.send_if_modified(|state| {
            if state.hidden != visible {
                return false;
            }
            state.hidden = !visible;
            if visible {
                state.resumes += 1;
            }
            true
        });
        if changed {
            debug!(visible, "refresh visibility changed");
        }
    }

    pub fn is_visible(&self) -> bool {
        !self.visible.borrow().hidden
    }

    /// Run `task` once now. Returns false if a run was already in flight.
    pub fn refresh_now(&self, task: RefreshTask) -> bool {
        self.inner.trigger(task)
    }

    pub fn is_in_flight(&self, task: RefreshTask) -> bool {
        self.inner.slot(task).in_flight.load(Ordering::Acquire)
    }

    pub fn stats(&self, task: RefreshTask) -> RefreshStats {
        let slot = self.inner.slot(task);
        RefreshStats {
            runs: slot.runs.load(Ordering::Relaxed),
            skipped: slot.skipped.load(Ordering::Relaxed),
        }
    }

    /// Cancel all timers. In-flight executions finish on their own.
    pub fn shutdown(&self) {
        let _ = self.shutdown.send_replace(true);
        if let Ok(mut handles) = self.handles.lock() {
            handles.clear();
        }
    }
}

impl Drop for RefreshScheduler {
    fn drop(&mut self) {
        let _ = self.shutdown.send_replace(true);
    }
}

async fn run_task(
    inner: Arc<Inner>,
    task: RefreshTask,
    period: Duration,
    mut visible: watch::Receiver<Visibility>,
    mut shutdown: watch::Receiver<bool>,
) {
    loop {
        if *shutdown.borrow() {
            return;
        }

        let resumes = loop {
            let state = *visible.borrow_and_update();
            if !state.hidden {
                break state.resumes;
            }
            tokio::select! {
                changed = visible.changed() => {
                    if changed.is_err() {
                        return;
                    }
                }
                _ = shutdown.changed() => return,
            }
        };

        // Eager run on start and on every resume, then the regular cadence.
        inner.trigger(task);
        let mut ticker = interval_at(Instant::now() + period, period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    inner.trigger(task);
                }
                changed = visible.changed() => {
                    if changed.is_err() {
                        return;
                    }
                    let state = *visible.borrow_and_update();
                    if state.hidden {
                        debug!(task = task.name(), "refresh paused");
                        break;
                    }
                    if state.resumes != resumes {
                        debug!(task = task.name(), "refresh resumed");
                        break;
                    }
                }
                _ = shutdown.changed() => return,
            }
        }
    }
}
