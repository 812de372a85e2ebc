use crate::error::Result;
use crate::session::SessionStatus;
use serde::{Deserialize, Serialize};
use std::fmt;
use tokio::sync::oneshot;

/// Service lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ServiceState {
    /// Constructed, watcher not yet registered
    Created,
    Running,
    /// Watcher unregistered and plan cancelled; the session is kept
    Paused,
    Stopped,
}

/// System shutdown reason
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ShutdownReason {
    Signal(String),
    Error(String),
    UserRequest,
}

impl ShutdownReason {
    pub fn exit_code(&self) -> i32 {
        match self {
            ShutdownReason::Error(_) => 1,
            _ => 0,
        }
    }
}

impl fmt::Display for ShutdownReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ShutdownReason::Signal(signal) => write!(f, "signal {}", signal),
            ShutdownReason::Error(message) => write!(f, "error: {}", message),
            ShutdownReason::UserRequest => write!(f, "user request"),
        }
    }
}

/// Snapshot of the whole service, returned by status queries
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServiceStatus {
    pub state: ServiceState,
    pub watcher_registered: bool,
    pub session: SessionStatus,
}

pub(super) type Reply<T> = oneshot::Sender<Result<T>>;

/// Requests from application code to the service task
pub(super) enum ServiceRequest {
    Status(Reply<ServiceStatus>),
    Pause(Reply<()>),
    Resume(Reply<()>),
    StartMeasurement(Reply<()>),
    StopMeasurement(Reply<()>),
    StopPreview(Reply<()>),
    Reinitialize(Reply<()>),
    CloseSession(Reply<bool>),
    Shutdown(ShutdownReason),
}
