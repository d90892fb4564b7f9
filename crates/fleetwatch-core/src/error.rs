//! Error types for FLEETWATCH operations.
//!
//! This module defines [`FleetError`], the error enum shared by every
//! FLEETWATCH crate for failures that are not specific to the network client:
//! configuration, local I/O, parsing, and internal invariants.

use std::path::PathBuf;
use thiserror::Error;

/// Result type alias using [`FleetError`].
pub type Result<T> = std::result::Result<T, FleetError>;

/// Error type for core FLEETWATCH operations.
///
/// Errors are meant to be shown to the operator:
/// - No silent failures - every error is logged or surfaced
/// - Clear actionable messages with guidance where there is any
#[derive(Debug, Error)]
pub enum FleetError {
    // =========================================================================
    // Configuration Errors
    // =========================================================================
    /// Configuration file not found
    #[error("Configuration not found at {path}")]
    ConfigNotFound {
        path: PathBuf,
        #[source]
        source: Option<std::io::Error>,
    },

    /// Configuration file is invalid YAML
    #[error("Invalid configuration at {path}: {message}")]
    ConfigInvalid { path: PathBuf, message: String },

    /// Configuration validation failed
    #[error("Configuration validation failed: {message}")]
    ConfigValidation { message: String },

    // =========================================================================
    // I/O Errors
    // =========================================================================
    /// Generic I/O error with context
    #[error("I/O error {operation}: {path}")]
    Io {
        operation: String,
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Directory creation failed
    #[error("Failed to create directory: {path}")]
    DirectoryCreation {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    // =========================================================================
    // Parsing Errors
    // =========================================================================
    /// Unknown view name
    #[error("Unknown view: {name}")]
    UnknownView { name: String },

    // =========================================================================
    // Internal Errors
    // =========================================================================
    /// Internal error (bug in FLEETWATCH)
    #[error("Internal error: {message}")]
    Internal { message: String },
}

impl FleetError {
    /// Create a ConfigNotFound error
    pub fn config_not_found(path: impl Into<PathBuf>) -> Self {
        Self::ConfigNotFound {
            path: path.into(),
            source: None,
        }
    }

    /// Create an invalid configuration error
    pub fn config_invalid(path: impl Into<PathBuf>, message: impl Into<String>) -> Self {
        Self::ConfigInvalid {
            path: path.into(),
            message: message.into(),
        }
    }

    /// Create a configuration validation error
    pub fn config_validation(message: impl Into<String>) -> Self {
        Self::ConfigValidation {
            message: message.into(),
        }
    }

    /// Create an I/O error
    pub fn io(operation: impl Into<String>, path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            operation: operation.into(),
            path: path.into(),
            source,
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    /// Returns actionable guidance for the user
    pub fn guidance(&self) -> Option<&'static str> {
        match self {
            Self::ConfigNotFound { .. } => {
                Some("Create ~/.fleetwatch/config.yaml or pass --url on the command line")
            }
            Self::ConfigInvalid { .. } => Some("Check the YAML syntax of the configuration file"),
            Self::ConfigValidation { .. } => {
                Some("Intervals and timeouts must be greater than zero")
            }
            Self::UnknownView { .. } => {
                Some("Valid views: overview, agents, tasks, knowledge, activity")
            }
            Self::DirectoryCreation { .. } => Some("Check permissions on ~/.fleetwatch/"),
            _ => None,
        }
    }
}
