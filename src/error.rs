use thiserror::Error;

#[derive(Error, Debug)]
pub enum ThermcamError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Permission denied for device {device}")]
    PermissionDenied { device: String },

    #[error("Failed to open device {device}: {details}")]
    OpenFailed { device: String, details: String },

    #[error("Initialization step '{step}' failed: {details}")]
    CommandFailed { step: String, details: String },

    #[error("Device {device} disconnected unexpectedly")]
    UnexpectedDisconnect { device: String },

    #[error("Device watcher error: {0}")]
    Watcher(String),

    #[error("Device watcher has been destroyed")]
    WatcherDestroyed,

    #[error("No active camera session")]
    NoSession,

    #[error("Invalid session state: {details}")]
    InvalidState { details: String },

    #[error("System error: {message}")]
    System { message: String },
}

impl ThermcamError {
    pub fn system<S: Into<String>>(message: S) -> Self {
        Self::System {
            message: message.into(),
        }
    }

    pub fn watcher<S: Into<String>>(message: S) -> Self {
        Self::Watcher(message.into())
    }

    pub fn invalid_state<S: Into<String>>(details: S) -> Self {
        Self::InvalidState {
            details: details.into(),
        }
    }

    /// Short machine-readable kind, used when errors are published as events
    pub fn kind(&self) -> &'static str {
        match self {
            ThermcamError::Config(_) => "config",
            ThermcamError::PermissionDenied { .. } => "permission_denied",
            ThermcamError::OpenFailed { .. } => "open_failed",
            ThermcamError::CommandFailed { .. } => "command_failed",
            ThermcamError::UnexpectedDisconnect { .. } => "unexpected_disconnect",
            ThermcamError::Watcher(_) => "watcher",
            ThermcamError::WatcherDestroyed => "watcher_destroyed",
            ThermcamError::NoSession => "no_session",
            ThermcamError::InvalidState { .. } => "invalid_state",
            ThermcamError::System { .. } => "system",
        }
    }
}

/// Error reported by a camera command sink
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    #[error("Device rejected command: {0}")]
    Rejected(String),

    #[error("Control channel is not open")]
    NotOpen,

    #[error("Transfer failed: {0}")]
    Transfer(String),
}

pub type Result<T> = std::result::Result<T, ThermcamError>;
