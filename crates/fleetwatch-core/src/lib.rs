//! # fleetwatch-core
//!
//! Core types, errors, and utilities for the FLEETWATCH dashboard.
//!
//! This crate provides:
//! - [`FleetError`] - Error type for configuration, I/O and parsing failures
//! - [`logging`] - Tracing setup and log management utilities
//! - [`types`] - Agent, activity, metrics and view types shared by all crates
//! - [`backoff`] - Reconnect backoff policy for the realtime channel
//!
//! ## Example
//!
//! ```no_run
//! use fleetwatch_core::{logging, types::View};
//!
//! fn main() -> fleetwatch_core::Result<()> {
//!     let _guard = logging::init_logging(None, false)?;
//!
//!     let view: View = "agents".parse()?;
//!     tracing::info!(%view, "starting on view");
//!
//!     Ok(())
//! }
//! ```

pub mod backoff;
pub mod error;
pub mod logging;
pub mod types;

// Re-export main types for convenience
pub use backoff::{Backoff, BackoffStep, ReconnectPolicy};
pub use error::{FleetError, Result};
pub use logging::{LogGuard, init_logging};
pub use types::{
    ActivityEntry, AgentId, AgentMetrics, AgentRecord, AgentStatus, AgentUpdate, Notification,
    NotificationLevel, SearchHit, SystemMetrics, Timestamp, View,
};
