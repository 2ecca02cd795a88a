//! Boundary to the external scan service.
//!
//! The orchestrator only talks to a [`ScanClient`]. [`http::HttpScanClient`]
//! is the real implementation; tests drive the orchestrator with a scripted
//! in-memory client instead.

pub mod http;
#[cfg(test)]
pub(crate) mod scripted;

use serde::{Deserialize, Serialize};

use crate::error::ApiError;

pub use http::HttpScanClient;

/// A request to schedule one plugin against one target.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScanRequest {
    pub target: String,
    pub plugin: String,
}

impl ScanRequest {
    pub fn new(target: impl Into<String>, plugin: impl Into<String>) -> Self {
        Self {
            target: target.into(),
            plugin: plugin.into(),
        }
    }
}

/// How the service answered a queue request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum QueueOutcome {
    Success,
    /// The service declined to queue: billing is not set up or a scan of
    /// this plugin is already running. Not an error.
    Skipped,
    Failed,
    Undefined,
}

impl std::fmt::Display for QueueOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Success => write!(f, "queued"),
            Self::Skipped => write!(f, "skipped"),
            Self::Failed => write!(f, "failed"),
            Self::Undefined => write!(f, "undefined"),
        }
    }
}

/// Whether a finished scan ran to completion.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ResultStatus {
    Ok,
    Aborted,
}

impl ResultStatus {
    /// Anything other than `ok` counts as an abnormal end.
    pub fn from_str_lenient(s: &str) -> Self {
        if s.trim().eq_ignore_ascii_case("ok") {
            Self::Ok
        } else {
            Self::Aborted
        }
    }
}

/// Traffic-light color the service assigns to a finished scan.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum StatusColor {
    Green,
    Grey,
    Other(String),
}

impl From<String> for StatusColor {
    fn from(value: String) -> Self {
        match value.trim().to_lowercase().as_str() {
            "green" => Self::Green,
            "grey" | "gray" => Self::Grey,
            _ => Self::Other(value),
        }
    }
}

impl From<StatusColor> for String {
    fn from(color: StatusColor) -> Self {
        color.to_string()
    }
}

impl std::fmt::Display for StatusColor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Green => write!(f, "green"),
            Self::Grey => write!(f, "grey"),
            Self::Other(raw) => write!(f, "{raw}"),
        }
    }
}

/// Terminal outcome of one plugin's scan.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanResult {
    pub result_status: ResultStatus,
    /// Short status text shown by the service (e.g. "no issues").
    pub status: String,
    pub status_color: StatusColor,
    pub message: String,
    /// Where an operator can inspect the full result.
    pub result_url: String,
}

/// Per-plugin state as reported by a target status fetch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PluginStatus {
    pub name: String,
    /// True while the scan has not reached a terminal state.
    pub is_queued: bool,
    pub scan: Option<ScanResult>,
}

/// Capability the orchestrator needs from the scan service.
///
/// Implementations must not retry; retry policy belongs to the caller.
pub trait ScanClient {
    /// Ask the service to schedule a scan.
    fn queue(&self, request: &ScanRequest) -> Result<QueueOutcome, ApiError>;

    /// Current state of every plugin known for `target`, in server order.
    fn fetch_target_status(&self, target: &str) -> Result<Vec<PluginStatus>, ApiError>;
}

impl<C: ScanClient + ?Sized> ScanClient for &C {
    fn queue(&self, request: &ScanRequest) -> Result<QueueOutcome, ApiError> {
        (**self).queue(request)
    }

    fn fetch_target_status(&self, target: &str) -> Result<Vec<PluginStatus>, ApiError> {
        (**self).fetch_target_status(target)
    }
}
