//! The dashboard client event loop.
//!
//! [`DashboardClient::run`] owns every channel the components write to and
//! processes them in a single `select!` loop, so inbound frames are routed in
//! arrival order. Operators drive it through a [`ClientHandle`]; renderers
//! read the [`StateStore`] and listen for [`ClientEvent`]s.

use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use fleetwatch_core::{Notification, View};

use crate::api::DashboardApi;
use crate::command::{CommandDispatcher, FollowUp, FollowUpRequest, LifecycleAction};
use crate::config::ClientConfig;
use crate::connection::{ConnectionEvent, ConnectionManager, ConnectionState, Connector};
use crate::error::{ClientError, Result};
use crate::router::{RouteOutcome, Router};
use crate::scheduler::{RefreshScheduler, RefreshTask};
use crate::search::SearchCoordinator;
use crate::store::StateStore;

const FRAME_BUFFER: usize = 256;

/// Operator input accepted by the client loop.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientInput {
    QueryChanged(String),
    Execute(String),
    SetView(View),
    SetVisible(bool),
    Agent {
        agent_id: String,
        action: LifecycleAction,
    },
    Refresh,
    Reconnect,
    Shutdown,
}

/// Output for the rendering side.
#[derive(Debug, Clone, PartialEq)]
pub enum ClientEvent {
    Notification(Notification),
    Connection(ConnectionState),
    /// A view's data finished loading into the store.
    ViewLoaded(View),
    /// Data returned by an `export` command.
    Export(Option<Value>),
}

/// Cheap, cloneable sender for [`ClientInput`].
#[derive(Clone)]
pub struct ClientHandle {
    inputs: mpsc::UnboundedSender<ClientInput>,
    store: Arc<StateStore>,
}

impl ClientHandle {
    pub fn send(&self, input: ClientInput) -> Result<()> {
        self.inputs
            .send(input)
            .map_err(|_| ClientError::ChannelClosed("client input"))
    }

    pub fn query_changed(&self, text: impl Into<String>) -> Result<()> {
        self.send(ClientInput::QueryChanged(text.into()))
    }

    pub fn execute(&self, command: impl Into<String>) -> Result<()> {
        self.send(ClientInput::Execute(command.into()))
    }

    pub fn set_view(&self, view: View) -> Result<()> {
        self.send(ClientInput::SetView(view))
    }

    pub fn set_visible(&self, visible: bool) -> Result<()> {
        self.send(ClientInput::SetVisible(visible))
    }

    pub fn agent_action(&self, agent_id: impl Into<String>, action: LifecycleAction) -> Result<()> {
        self.send(ClientInput::Agent {
            agent_id: agent_id.into(),
            action,
        })
    }

    pub fn refresh(&self) -> Result<()> {
        self.send(ClientInput::Refresh)
    }

    pub fn reconnect(&self) -> Result<()> {
        self.send(ClientInput::Reconnect)
    }

    pub fn shutdown(&self) -> Result<()> {
        self.send(ClientInput::Shutdown)
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }
}

/// One dashboard client instance.
pub struct DashboardClient {
    api: Arc<dyn DashboardApi>,
    store: Arc<StateStore>,
    connection: ConnectionManager,
    router: Router,
    scheduler: RefreshScheduler,
    search: SearchCoordinator,
    commands: Arc<CommandDispatcher>,

    notifier: mpsc::UnboundedSender<Notification>,
    events: mpsc::UnboundedSender<ClientEvent>,
    events_rx: Option<mpsc::UnboundedReceiver<ClientEvent>>,
    inputs_tx: mpsc::UnboundedSender<ClientInput>,
    inputs: mpsc::UnboundedReceiver<ClientInput>,
    frames: mpsc::Receiver<String>,
    connection_events: mpsc::UnboundedReceiver<ConnectionEvent>,
    notifications: mpsc::UnboundedReceiver<Notification>,
    follow_ups: mpsc::UnboundedReceiver<FollowUpRequest>,
}

impl DashboardClient {
    pub fn new(
        config: ClientConfig,
        api: Arc<dyn DashboardApi>,
        connector: Arc<dyn Connector>,
    ) -> Self {
        let store = Arc::new(StateStore::new(config.activity_capacity));

        let (notifier, notifications) = mpsc::unbounded_channel();
        let (events, events_rx) = mpsc::unbounded_channel();
        let (inputs_tx, inputs) = mpsc::unbounded_channel();
        let (frames_tx, frames) = mpsc::channel(FRAME_BUFFER);
        let (connection_tx, connection_events) = mpsc::unbounded_channel();
        let (follow_up_tx, follow_ups) = mpsc::unbounded_channel();

        let connection = ConnectionManager::new(
            config.realtime_url(),
            config.reconnect.clone(),
            connector,
            frames_tx,
            connection_tx,
        );
        let router = Router::new(Arc::clone(&store), notifier.clone());
        let scheduler = RefreshScheduler::new(
            Arc::clone(&api),
            Arc::clone(&store),
            notifier.clone(),
            config.refresh.clone(),
        );
        let search = SearchCoordinator::new(
            Arc::clone(&api),
            Arc::clone(&store),
            notifier.clone(),
            &config.search,
        );
        let commands = Arc::new(CommandDispatcher::new(
            Arc::clone(&api),
            Arc::clone(&store),
            notifier.clone(),
            follow_up_tx,
        ));

        Self {
            api,
            store,
            connection,
            router,
            scheduler,
            search,
            commands,
            notifier,
            events,
            events_rx: Some(events_rx),
            inputs_tx,
            inputs,
            frames,
            connection_events,
            notifications,
            follow_ups,
        }
    }

    pub fn handle(&self) -> ClientHandle {
        ClientHandle {
            inputs: self.inputs_tx.clone(),
            store: Arc::clone(&self.store),
        }
    }

    /// Take the event receiver. Returns `None` after the first call.
    pub fn take_events(&mut self) -> Option<mpsc::UnboundedReceiver<ClientEvent>> {
        self.events_rx.take()
    }

    pub fn store(&self) -> Arc<StateStore> {
        Arc::clone(&self.store)
    }

    /// Connect, start refreshing, and process events until shutdown.
    pub async fn run(mut self) -> Result<()> {
        info!(url = %self.connection.url(), "dashboard client starting");
        self.connection.open();
        self.scheduler.start();
        let view = self.store.active_view().await;
        self.load_view(view);

        loop {
            tokio::select! {
                Some(frame) = self.frames.recv() => {
                    if let Some(RouteOutcome::TasksReloadRequested) =
                        self.router.handle_frame(&frame).await
                    {
                        self.load_view(View::Tasks);
                    }
                }
                Some(event) = self.connection_events.recv() => {
                    self.on_connection_event(event).await;
                }
                Some(notification) = self.notifications.recv() => {
                    self.emit(ClientEvent::Notification(notification));
                }
                Some(request) = self.follow_ups.recv() => {
                    self.apply_follow_up(request).await;
                }
                input = self.inputs.recv() => match input {
                    Some(ClientInput::Shutdown) | None => break,
                    Some(input) => self.on_input(input).await,
                },
            }
        }

        info!("dashboard client shutting down");
        self.search.cancel();
        self.scheduler.shutdown();
        self.connection.close().await;
        Ok(())
    }

    fn emit(&self, event: ClientEvent) {
        if self.events.send(event).is_err() {
            debug!("no event listener");
        }
    }

    async fn on_input(&self, input: ClientInput) {
        match input {
            ClientInput::QueryChanged(text) => self.search.on_query_changed(&text).await,
            ClientInput::Execute(text) => {
                let commands = Arc::clone(&self.commands);
                tokio::spawn(async move {
                    if let Err(e) = commands.execute(&text).await {
                        debug!(error = %e, "command not applied");
                    }
                });
            }
            ClientInput::SetView(view) => {
                let previous = self.store.set_active_view(view).await;
                debug!(from = %previous, to = %view, "view switched");
                self.load_view(view);
            }
            ClientInput::SetVisible(visible) => self.scheduler.set_visible(visible),
            ClientInput::Agent { agent_id, action } => {
                let commands = Arc::clone(&self.commands);
                tokio::spawn(async move {
                    let _ = commands.agent_action(&agent_id, action).await;
                });
            }
            ClientInput::Refresh => self.full_refresh().await,
            ClientInput::Reconnect => self.connection.reconnect().await,
            ClientInput::Shutdown => {}
        }
    }

    async fn on_connection_event(&self, event: ConnectionEvent) {
        match event {
            ConnectionEvent::StateChanged(state) => {
                self.store.set_connection_state(state).await;
                self.emit(ClientEvent::Connection(state));
            }
            ConnectionEvent::Reconnecting { attempt, delay } => {
                debug!(attempt, delay_ms = delay.as_millis() as u64, "reconnect scheduled");
            }
            ConnectionEvent::RetriesExhausted { attempts } => {
                let err = ClientError::RetriesExhausted(attempts);
                warn!(attempts, "giving up on realtime connection");
                self.emit(ClientEvent::Notification(Notification::error(
                    err.friendly_message(),
                )));
            }
            ConnectionEvent::Error(reason) => debug!(reason = %reason, "transport error"),
        }
    }

    async fn apply_follow_up(&self, request: FollowUpRequest) {
        debug!(command = %request.command, follow_up = ?request.follow_up, "applying follow-up");
        match request.follow_up {
            FollowUp::FullRefresh => self.full_refresh().await,
            FollowUp::AgentStatusRefresh => {
                self.scheduler.refresh_now(RefreshTask::AgentStatus);
            }
            FollowUp::Export => self.emit(ClientEvent::Export(request.data)),
            FollowUp::None => {}
        }
    }

    /// Metrics, agent statuses and the active view.
    async fn full_refresh(&self) {
        self.scheduler.refresh_now(RefreshTask::Metrics);
        self.scheduler.refresh_now(RefreshTask::AgentStatus);
        let view = self.store.active_view().await;
        self.load_view(view);
    }

    /// Fetch a view's data in the background.
    fn load_view(&self, view: View) {
        let api = Arc::clone(&self.api);
        let store = Arc::clone(&self.store);
        let notifier = self.notifier.clone();
        let events = self.events.clone();

        tokio::spawn(async move {
            match api.view_data(view).await {
                Ok(data) => {
                    store.set_view_data(view, data).await;
                    let _ = events.send(ClientEvent::ViewLoaded(view));
                }
                Err(e) => {
                    warn!(%view, error = %e, "view load failed");
                    let _ = notifier.send(Notification::error(format!(
                        "Failed to load {}: {}",
                        view.title(),
                        e.friendly_message()
                    )));
                }
            }
        });
    }
}
