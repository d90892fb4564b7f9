//! Error types for the dashboard client.

use thiserror::Error;

/// Dashboard client errors.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Could not establish the realtime connection
    #[error("Connection failed: {0}")]
    ConnectionFailed(String),

    /// The realtime connection was closed by the remote side or the network
    #[error("Connection closed: {0}")]
    ConnectionClosed(String),

    /// Reconnect attempts were used up
    #[error("Connection lost after {0} reconnect attempts")]
    RetriesExhausted(u32),

    /// Inbound frame could not be decoded
    #[error("Malformed frame: {0}")]
    Decode(String),

    /// API request failed (transient)
    #[error("API request failed (transient): {0}")]
    ApiTransient(String),

    /// API request failed (permanent)
    #[error("API request failed: {0}")]
    Api(String),

    /// Request timed out
    #[error("Request timed out after {0}s: {1}")]
    Timeout(u64, String),

    /// HTTP response body did not have the expected shape
    #[error("Invalid response from {path}: {source}")]
    InvalidResponse {
        path: String,
        #[source]
        source: serde_json::Error,
    },

    /// Backend answered a command with `success: false`
    #[error("{0}")]
    CommandFailed(String),

    /// Another command is still waiting for its result
    #[error("A command is already in flight")]
    CommandInFlight,

    /// Command text was empty or whitespace
    #[error("Empty command")]
    EmptyCommand,

    /// An internal channel was closed (client shutting down)
    #[error("Channel closed: {0}")]
    ChannelClosed(&'static str),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// HTTP request error
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// WebSocket protocol error
    #[error("WebSocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    /// Core error
    #[error("Core error: {0}")]
    Core(#[from] fleetwatch_core::FleetError),
}

/// Where a failure sits in the dashboard's recovery model.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FaultClass {
    /// Connection drop or timeout on the realtime channel; handled by reconnect.
    Transport,
    /// Malformed inbound frame; logged and dropped.
    Decode,
    /// Failed HTTP call; shown as a transient notification.
    Request,
    /// Backend rejected a command; its message is shown verbatim.
    Command,
    /// Retry budget exhausted; the operator must reconnect manually.
    Fatal,
    /// Local misuse or configuration problems.
    Local,
}

impl ClientError {
    /// Check if this error is retryable (transient network/API issues).
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            ClientError::ApiTransient(_)
                | ClientError::Timeout(_, _)
                | ClientError::ConnectionFailed(_)
                | ClientError::ConnectionClosed(_)
        )
    }

    /// Classify this error.
    pub fn fault_class(&self) -> FaultClass {
        match self {
            ClientError::ConnectionFailed(_)
            | ClientError::ConnectionClosed(_)
            | ClientError::WebSocket(_) => FaultClass::Transport,
            ClientError::RetriesExhausted(_) => FaultClass::Fatal,
            ClientError::Decode(_) => FaultClass::Decode,
            ClientError::ApiTransient(_)
            | ClientError::Api(_)
            | ClientError::Timeout(_, _)
            | ClientError::InvalidResponse { .. }
            | ClientError::Http(_) => FaultClass::Request,
            ClientError::CommandFailed(_) => FaultClass::Command,
            ClientError::CommandInFlight
            | ClientError::EmptyCommand
            | ClientError::ChannelClosed(_)
            | ClientError::Config(_)
            | ClientError::Core(_) => FaultClass::Local,
        }
    }

    /// Get a user-friendly error message.
    pub fn friendly_message(&self) -> String {
        match self {
            ClientError::RetriesExhausted(attempts) => format!(
                "Lost connection to the server after {} attempts. Reconnect manually.",
                attempts
            ),
            ClientError::ApiTransient(msg) => {
                format!("Temporary server issue: {}. Please try again.", msg)
            }
            ClientError::Timeout(secs, _) => {
                format!("Request timed out after {}s. Check your connection.", secs)
            }
            ClientError::ConnectionFailed(msg) => {
                format!("Connection failed: {}. Check the server address.", msg)
            }
            ClientError::CommandFailed(msg) | ClientError::Api(msg) => msg.clone(),
            ClientError::Http(e) if e.is_timeout() => "Request timed out.".to_string(),
            ClientError::Http(e) if e.is_connect() => {
                "Could not reach the server. Check your network.".to_string()
            }
            _ => format!("Error: {}", self),
        }
    }

    /// Classify an HTTP status code into appropriate error type.
    pub fn from_http_status(status: u16, body: &str) -> Self {
        match status {
            408 => ClientError::Timeout(30, "Request timeout".to_string()),
            429 | 500 | 502 | 503 | 504 => {
                ClientError::ApiTransient(format!("Server error ({}): {}", status, body))
            }
            401 | 403 => ClientError::Api(format!("Authentication error ({}): {}", status, body)),
            _ => ClientError::Api(format!("HTTP {}: {}", status, body)),
        }
    }
}

/// Result type for client operations.
pub type Result<T> = std::result::Result<T, ClientError>;
