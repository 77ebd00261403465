use thiserror::Error;

/// Failures a single poll cycle can surface.
#[derive(Debug, Error)]
pub enum MonitorError {
    /// Fetch failed: network, timeout, or non-success status.
    #[error("transport error: {0}")]
    Transport(String),

    /// Payload could not be decoded into counters.
    #[error("data format error: {0}")]
    DataFormat(String),

    /// Baseline could not be persisted.
    #[error("baseline store error: {0}")]
    Store(String),
}

impl From<reqwest::Error> for MonitorError {
    fn from(e: reqwest::Error) -> Self {
        MonitorError::Transport(e.to_string())
    }
}

impl From<serde_json::Error> for MonitorError {
    fn from(e: serde_json::Error) -> Self {
        MonitorError::DataFormat(e.to_string())
    }
}

pub type Result<T> = std::result::Result<T, MonitorError>;
