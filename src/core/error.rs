use thiserror::Error;

#[derive(Error, Debug)]
pub enum VigilError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("System sampling error: {0}")]
    Sampling(String),

    #[error("Notification error: {0}")]
    Notification(String),

    #[error("Health probe '{probe}' failed: {message}")]
    Probe { probe: String, message: String },

    #[error("Metric path not found: {0}")]
    PathNotFound(String),

    #[error("Metric path '{path}' does not hold a number")]
    NotNumeric { path: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Async task join error: {0}")]
    Join(#[from] tokio::task::JoinError),

    #[error("Channel send error")]
    ChannelSend,

    #[error("Notification queue full: alert '{0}' dropped")]
    QueueFull(String),

    #[error("Timeout error: operation took longer than {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    #[error("Network error: {0}")]
    Network(String),
}

/// Result type alias for Vigil operations
pub type Result<T> = std::result::Result<T, VigilError>;

impl VigilError {
    /// Creates a new configuration error
    pub fn config<S: Into<String>>(msg: S) -> Self {
        Self::Config(msg.into())
    }

    /// Creates a new sampling error
    pub fn sampling<S: Into<String>>(msg: S) -> Self {
        Self::Sampling(msg.into())
    }

    /// Creates a new notification error
    pub fn notification<S: Into<String>>(msg: S) -> Self {
        Self::Notification(msg.into())
    }

    /// Creates a new probe error
    pub fn probe<P: Into<String>, S: Into<String>>(probe: P, msg: S) -> Self {
        Self::Probe {
            probe: probe.into(),
            message: msg.into(),
        }
    }

    /// Creates a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Returns true if retrying the operation later may succeed
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Sampling(_)
                | Self::Notification(_)
                | Self::Probe { .. }
                | Self::Network(_)
                | Self::Timeout { .. }
                | Self::ChannelSend
                | Self::QueueFull(_)
        )
    }

    /// Returns the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            Self::Config(_) => "config",
            Self::Sampling(_) => "sampling",
            Self::Notification(_) | Self::QueueFull(_) => "notification",
            Self::Probe { .. } => "probe",
            Self::PathNotFound(_) | Self::NotNumeric { .. } => "rule",
            Self::Io(_) => "io",
            Self::Serialization(_) => "serialization",
            Self::Join(_) => "async",
            Self::ChannelSend => "channel",
            Self::Timeout { .. } => "timeout",
            Self::Network(_) => "network",
        }
    }
}
