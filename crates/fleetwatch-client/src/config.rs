//! Configuration for the dashboard client.
//!
//! Loaded from `~/.fleetwatch/config.yaml` when present. Every field has a
//! default, so a partial file (or no file at all) is valid.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use fleetwatch_core::{FleetError, ReconnectPolicy};
use tracing::debug;

/// Environment variable overriding [`ClientConfig::base_url`].
pub const URL_ENV_VAR: &str = "FLEETWATCH_URL";

/// Default backend address.
pub const DEFAULT_BASE_URL: &str = "http://localhost:3000";

/// Default bound on the activity log.
pub const DEFAULT_ACTIVITY_CAPACITY: usize = 100;

/// Dashboard client configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ClientConfig {
    /// HTTP base URL of the backend (e.g., "http://localhost:3000")
    pub base_url: String,

    /// Realtime channel URL; derived from `base_url` when unset
    pub ws_url: Option<String>,

    /// HTTP request timeout in seconds
    pub request_timeout_secs: u64,

    /// Reconnect policy for the realtime channel
    pub reconnect: ReconnectPolicy,

    /// Periodic refresh intervals
    pub refresh: RefreshConfig,

    /// Search behaviour
    pub search: SearchConfig,

    /// Maximum number of activity entries kept in memory
    pub activity_capacity: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            base_url: DEFAULT_BASE_URL.to_string(),
            ws_url: None,
            request_timeout_secs: 30,
            reconnect: ReconnectPolicy::default(),
            refresh: RefreshConfig::default(),
            search: SearchConfig::default(),
            activity_capacity: DEFAULT_ACTIVITY_CAPACITY,
        }
    }
}

/// Intervals for the periodic refresh tasks.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RefreshConfig {
    /// System metrics refresh interval in seconds
    pub metrics_secs: u64,

    /// Agent status refresh interval in seconds
    pub agent_status_secs: u64,

    /// Activity view refresh interval in seconds (only while that view is active)
    pub activity_secs: u64,
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            metrics_secs: 5,
            agent_status_secs: 10,
            activity_secs: 30,
        }
    }
}

/// Search debounce settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SearchConfig {
    /// Quiet period after the last keystroke before a query is sent
    pub debounce_ms: u64,

    /// Queries shorter than this never reach the backend
    pub min_query_len: usize,
}

impl Default for SearchConfig {
    fn default() -> Self {
        Self {
            debounce_ms: 300,
            min_query_len: 2,
        }
    }
}

impl SearchConfig {
    pub fn debounce(&self) -> Duration {
        Duration::from_millis(self.debounce_ms)
    }
}

impl ClientConfig {
    /// Default config file location: `~/.fleetwatch/config.yaml`.
    pub fn default_path() -> fleetwatch_core::Result<PathBuf> {
        Ok(fleetwatch_core::logging::fleetwatch_home()?.join("config.yaml"))
    }

    /// Load configuration.
    ///
    /// An explicit `path` must exist. Without one, the default location is
    /// tried and defaults are used if it is absent. `FLEETWATCH_URL` overrides
    /// the base URL in either case.
    pub fn load(path: Option<&Path>) -> fleetwatch_core::Result<Self> {
        let mut config = match path {
            Some(path) => Self::from_file(path)?,
            None => {
                let default_path = Self::default_path()?;
                if default_path.exists() {
                    Self::from_file(&default_path)?
                } else {
                    debug!(path = %default_path.display(), "no config file, using defaults");
                    Self::default()
                }
            }
        };

        if let Ok(url) = std::env::var(URL_ENV_VAR)
            && !url.trim().is_empty()
        {
            config.base_url = url.trim().to_string();
        }

        config.validate()?;
        Ok(config)
    }

    /// Parse a YAML config file.
    pub fn from_file(path: &Path) -> fleetwatch_core::Result<Self> {
        let contents = std::fs::read_to_string(path).map_err(|e| {
            if e.kind() == std::io::ErrorKind::NotFound {
                FleetError::ConfigNotFound {
                    path: path.to_path_buf(),
                    source: Some(e),
                }
            } else {
                FleetError::io("reading config", path, e)
            }
        })?;

        Self::from_yaml(&contents).map_err(|message| FleetError::config_invalid(path, message))
    }

    /// Parse YAML text. An empty document yields the defaults.
    pub fn from_yaml(contents: &str) -> std::result::Result<Self, String> {
        if contents.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(contents).map_err(|e| e.to_string())
    }

    /// Reject values that would stall the client.
    pub fn validate(&self) -> fleetwatch_core::Result<()> {
        if self.base_url.trim().is_empty() {
            return Err(FleetError::config_validation("base_url must not be empty"));
        }
        if self.request_timeout_secs == 0 {
            return Err(FleetError::config_validation(
                "request_timeout_secs must be greater than zero",
            ));
        }
        if self.refresh.metrics_secs == 0
            || self.refresh.agent_status_secs == 0
            || self.refresh.activity_secs == 0
        {
            return Err(FleetError::config_validation(
                "refresh intervals must be greater than zero",
            ));
        }
        if self.activity_capacity == 0 {
            return Err(FleetError::config_validation(
                "activity_capacity must be greater than zero",
            ));
        }
        Ok(())
    }

    /// Realtime channel URL: explicit `ws_url`, or `base_url` with a ws scheme and `/ws` path.
    pub fn realtime_url(&self) -> String {
        if let Some(url) = &self.ws_url {
            return url.clone();
        }

        let base = self.base_url.trim_end_matches('/');
        let swapped = if let Some(rest) = base.strip_prefix("https://") {
            format!("wss://{rest}")
        } else if let Some(rest) = base.strip_prefix("http://") {
            format!("ws://{rest}")
        } else {
            format!("ws://{base}")
        };
        format!("{swapped}/ws")
    }

    /// HTTP request timeout.
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Set the backend base URL.
    pub fn with_base_url(mut self, url: impl Into<String>) -> Self {
        self.base_url = url.into();
        self
    }

    /// Set an explicit realtime URL.
    pub fn with_ws_url(mut self, url: impl Into<String>) -> Self {
        self.ws_url = Some(url.into());
        self
    }

    /// Set the reconnect policy.
    pub fn with_reconnect(mut self, policy: ReconnectPolicy) -> Self {
        self.reconnect = policy;
        self
    }

    /// Set the refresh intervals.
    pub fn with_refresh(mut self, refresh: RefreshConfig) -> Self {
        self.refresh = refresh;
        self
    }

    /// Set the search debounce window.
    pub fn with_debounce_ms(mut self, debounce_ms: u64) -> Self {
        self.search.debounce_ms = debounce_ms;
        self
    }
}
