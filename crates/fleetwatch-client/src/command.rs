//! Operator command submission and agent lifecycle actions.

use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, warn};

use fleetwatch_core::{AgentStatus, Notification, log_command};

use crate::api::{AgentAction, CommandResult, DashboardApi};
use crate::error::{ClientError, Result};
use crate::store::StateStore;

/// Local effect applied after a command succeeds.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FollowUp {
    /// Reload metrics, agent statuses and the active view.
    FullRefresh,
    /// Reload agent statuses only.
    AgentStatusRefresh,
    /// Hand the command's data to the renderer for export.
    Export,
    None,
}

impl FollowUp {
    /// Select the follow-up from the command's leading word.
    pub fn for_command(command: &str) -> Self {
        let verb = command
            .split_whitespace()
            .next()
            .unwrap_or_default()
            .to_ascii_lowercase();

        match verb.as_str() {
            "sync" | "refresh" => FollowUp::FullRefresh,
            "start" | "stop" | "restart" | "agents" | "spawn" | "kill" => {
                FollowUp::AgentStatusRefresh
            }
            "export" => FollowUp::Export,
            _ => FollowUp::None,
        }
    }
}

/// A follow-up queued for the client loop.
#[derive(Debug, Clone, PartialEq)]
pub struct FollowUpRequest {
    pub command: String,
    pub follow_up: FollowUp,
    pub data: Option<Value>,
}

/// Agent lifecycle operations offered to the operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LifecycleAction {
    Start,
    Stop,
    /// Stop, then start.
    Restart,
}

impl LifecycleAction {
    pub fn verb(&self) -> &'static str {
        match self {
            LifecycleAction::Start => "start",
            LifecycleAction::Stop => "stop",
            LifecycleAction::Restart => "restart",
        }
    }

    fn past_tense(&self) -> &'static str {
        match self {
            LifecycleAction::Start => "started",
            LifecycleAction::Stop => "stopped",
            LifecycleAction::Restart => "restarted",
        }
    }
}

struct InFlightGuard<'a>(&'a AtomicBool);

impl Drop for InFlightGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

/// Submits operator commands, one at a time.
pub struct CommandDispatcher {
    api: Arc<dyn DashboardApi>,
    store: Arc<StateStore>,
    notifier: mpsc::UnboundedSender<Notification>,
    follow_ups: mpsc::UnboundedSender<FollowUpRequest>,
    in_flight: AtomicBool,
}

impl CommandDispatcher {
    pub fn new(
        api: Arc<dyn DashboardApi>,
        store: Arc<StateStore>,
        notifier: mpsc::UnboundedSender<Notification>,
        follow_ups: mpsc::UnboundedSender<FollowUpRequest>,
    ) -> Self {
        Self {
            api,
            store,
            notifier,
            follow_ups,
            in_flight: AtomicBool::new(false),
        }
    }

    pub fn is_in_flight(&self) -> bool {
        self.in_flight.load(Ordering::Acquire)
    }

    fn notify(&self, notification: Notification) {
        let _ = self.notifier.send(notification);
    }

    /// Submit a command.
    ///
    /// Blank input returns [`ClientError::EmptyCommand`] without touching the
    /// network. A submission while another is pending returns
    /// [`ClientError::CommandInFlight`]. A backend rejection is surfaced
    /// verbatim as [`ClientError::CommandFailed`] and never triggers a
    /// follow-up.
    pub async fn execute(&self, text: &str) -> Result<CommandResult> {
        let command = text.trim();
        if command.is_empty() {
            return Err(ClientError::EmptyCommand);
        }

        if self
            .in_flight
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .is_err()
        {
            self.notify(Notification::warning(ClientError::CommandInFlight.to_string()));
            return Err(ClientError::CommandInFlight);
        }
        let _guard = InFlightGuard(&self.in_flight);

        debug!(command, "submitting command");
        let result = match self.api.execute(command).await {
            Ok(result) => result,
            Err(e) => {
                log_command!(command, success = false, error = %e);
                self.notify(Notification::error(e.friendly_message()));
                return Err(e);
            }
        };

        if !result.success {
            let message = result
                .error
                .clone()
                .unwrap_or_else(|| "Command failed".to_string());
            log_command!(command, success = false, error = %message);
            self.notify(Notification::error(message.clone()));
            return Err(ClientError::CommandFailed(message));
        }

        let follow_up = FollowUp::for_command(command);
        log_command!(command, success = true, follow_up = ?follow_up);
        self.notify(Notification::success(format!("Command executed: {command}")));

        if follow_up != FollowUp::None {
            let request = FollowUpRequest {
                command: command.to_string(),
                follow_up,
                data: result.data.clone(),
            };
            if self.follow_ups.send(request).is_err() {
                debug!("follow-up channel closed");
            }
        }

        Ok(result)
    }

    /// Start, stop or restart an agent and record the acknowledged status.
    pub async fn agent_action(&self, agent_id: &str, action: LifecycleAction) -> Result<()> {
        let outcome = match action {
            LifecycleAction::Start => self.api.agent_action(agent_id, AgentAction::Start).await,
            LifecycleAction::Stop => self.api.agent_action(agent_id, AgentAction::Stop).await,
            LifecycleAction::Restart => {
                match self.api.agent_action(agent_id, AgentAction::Stop).await {
                    Ok(()) => self.api.agent_action(agent_id, AgentAction::Start).await,
                    Err(e) => Err(e),
                }
            }
        };

        match outcome {
            Ok(()) => {
                let status = match action {
                    LifecycleAction::Stop => AgentStatus::Stopped,
                    LifecycleAction::Start | LifecycleAction::Restart => AgentStatus::Running,
                };
                self.store.set_agent_status(agent_id, status).await;
                log_command!(action.verb(), agent_id, success = true);
                self.notify(Notification::success(format!(
                    "Agent {} {}",
                    agent_id,
                    action.past_tense()
                )));
                Ok(())
            }
            Err(e) => {
                warn!(agent_id, action = ?action, error = %e, "agent action failed");
                self.notify(Notification::error(format!(
                    "Failed to {} agent {}: {}",
                    action.verb(),
                    agent_id,
                    e.friendly_message()
                )));
                Err(e)
            }
        }
    }

    pub async fn start_agent(&self, agent_id: &str) -> Result<()> {
        self.agent_action(agent_id, LifecycleAction::Start).await
    }

    pub async fn stop_agent(&self, agent_id: &str) -> Result<()> {
        self.agent_action(agent_id, LifecycleAction::Stop).await
    }

    pub async fn restart_agent(&self, agent_id: &str) -> Result<()> {
        self.agent_action(agent_id, LifecycleAction::Restart).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_follow_up_by_leading_token() {
        assert_eq!(FollowUp::for_command("sync"), FollowUp::FullRefresh);
        assert_eq!(FollowUp::for_command("refresh all"), FollowUp::FullRefresh);
        assert_eq!(FollowUp::for_command("spawn scout"), FollowUp::AgentStatusRefresh);
        assert_eq!(FollowUp::for_command("KILL worker-2"), FollowUp::AgentStatusRefresh);
        assert_eq!(FollowUp::for_command("export csv"), FollowUp::Export);
        assert_eq!(FollowUp::for_command("help"), FollowUp::None);
        assert_eq!(FollowUp::for_command("synchronize"), FollowUp::None);
    }

    #[test]
    fn test_in_flight_guard_releases() {
        let flag = AtomicBool::new(true);
        {
            let _guard = InFlightGuard(&flag);
        }
        assert!(!flag.load(Ordering::Acquire));
    }
}
