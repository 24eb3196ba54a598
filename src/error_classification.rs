//! Failure taxonomy for a pass and the user-visible status it maps to.
//!
//! Rule misses never surface here: they are plain `None`s inside the
//! extractor. What remains is "not found" (a normal outcome), transport
//! failures, and missing configuration. None of them abort the process.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Error from an outbound lookup (registry, log-search service).
#[derive(Debug, Clone, PartialEq)]
pub enum LookupError {
    /// The endpoint the lookup needs is not configured
    Config(String),
    /// Network failure, non-success status (other than a meaningful 404), or unreadable body
    Transport(String),
}

impl fmt::Display for LookupError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LookupError::Config(msg) => write!(f, "Configuration error: {msg}"),
            LookupError::Transport(msg) => write!(f, "{msg}"),
        }
    }
}

impl std::error::Error for LookupError {}

/// Severity of a status line shown under the sidebar header.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StatusLevel {
    Info,
    Success,
    Warning,
    Error,
}

impl StatusLevel {
    pub fn as_str(self) -> &'static str {
        match self {
            StatusLevel::Info => "info",
            StatusLevel::Success => "success",
            StatusLevel::Warning => "warning",
            StatusLevel::Error => "error",
        }
    }
}

/// One user-visible status message.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Status {
    pub level: StatusLevel,
    pub message: String,
}

impl Status {
    pub fn new(level: StatusLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn invalid_page() -> Self {
        Self::new(StatusLevel::Error, "Unable to analyze current page")
    }

    pub fn no_project() -> Self {
        Self::new(StatusLevel::Warning, "No project detected")
    }

    pub fn app_not_found() -> Self {
        Self::new(StatusLevel::Warning, "App not found in config service")
    }

    pub fn found(count: usize) -> Self {
        Self::new(StatusLevel::Success, format!("Found {count} correlations"))
    }

    /// Status for a failed registry lookup.
    pub fn from_lookup_error(err: &LookupError) -> Self {
        match err {
            LookupError::Config(_) => Self::new(StatusLevel::Error, "Config service URL not configured"),
            LookupError::Transport(_) => Self::new(StatusLevel::Error, "Error loading correlations"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn not_found_and_transport_statuses_differ() {
        let not_found = Status::app_not_found();
        let transport = Status::from_lookup_error(&LookupError::Transport("HTTP 500".into()));
        assert_ne!(not_found.message, transport.message);
        assert_eq!(not_found.level, StatusLevel::Warning);
        assert_eq!(transport.level, StatusLevel::Error);
    }

    #[test]
    fn config_error_status() {
        let status = Status::from_lookup_error(&LookupError::Config("registryUrl".into()));
        assert_eq!(status.message, "Config service URL not configured");
    }

    #[test]
    fn found_counts_entries() {
        assert_eq!(Status::found(3).message, "Found 3 correlations");
    }

    #[test]
    fn lookup_error_display() {
        assert_eq!(LookupError::Transport("HTTP 502".into()).to_string(), "HTTP 502");
        assert_eq!(
            LookupError::Config("registry URL is empty".into()).to_string(),
            "Configuration error: registry URL is empty"
        );
    }

    #[test]
    fn status_level_serializes_lowercase() {
        let json = serde_json::to_string(&Status::no_project()).unwrap();
        assert_eq!(json, r#"{"level":"warning","message":"No project detected"}"#);
    }
}
