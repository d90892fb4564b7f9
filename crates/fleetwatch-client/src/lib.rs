//! # fleetwatch-client
//!
//! Realtime state-synchronization client for the FLEETWATCH dashboard.
//!
//! This crate provides:
//! - [`ConnectionManager`] - Realtime connection with exponential-backoff reconnect
//! - [`Router`] - Decodes inbound frames and applies them to the store
//! - [`StateStore`] - Agent registry, bounded activity log, metrics and active view
//! - [`RefreshScheduler`] - Non-reentrant periodic refresh with visibility gating
//! - [`SearchCoordinator`] - Debounced search with stale-response suppression
//! - [`CommandDispatcher`] - Operator commands and agent lifecycle actions
//! - [`DashboardClient`] - The event loop wiring all of the above together
//!
//! ## Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use fleetwatch_client::{ClientConfig, DashboardClient, HttpApi, WsConnector};
//!
//! #[tokio::main]
//! async fn main() -> fleetwatch_client::Result<()> {
//!     let config = ClientConfig::load(None)?;
//!     let api = Arc::new(HttpApi::from_config(&config)?);
//!     let client = DashboardClient::new(config, api, Arc::new(WsConnector));
//!
//!     let handle = client.handle();
//!     handle.execute("sync")?;
//!     client.run().await
//! }
//! ```

pub mod api;
pub mod client;
pub mod command;
pub mod config;
pub mod connection;
pub mod error;
pub mod router;
pub mod scheduler;
pub mod search;
pub mod store;

// Re-export main types
pub use api::{AgentAction, CommandResult, DashboardApi, HttpApi};
pub use client::{ClientEvent, ClientHandle, ClientInput, DashboardClient};
pub use command::{CommandDispatcher, FollowUp, FollowUpRequest, LifecycleAction};
pub use config::{ClientConfig, RefreshConfig, SearchConfig};
pub use connection::{
    ConnectionEvent, ConnectionManager, ConnectionState, Connector, FrameStream, WsConnector,
};
pub use error::{ClientError, FaultClass, Result};
pub use router::{InboundMessage, RouteOutcome, Router, decode};
pub use scheduler::{RefreshScheduler, RefreshStats, RefreshTask};
pub use search::SearchCoordinator;
pub use store::{DashboardState, SearchResults, StateStore};
