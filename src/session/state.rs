use crate::device::{ControlHandle, DeviceDescriptor};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Session lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SessionState {
    /// No session
    Idle,
    /// Control handle obtained, initialization plan not started
    Connecting,
    /// Plan running, preview not yet flowing
    Initializing,
    /// Frames flowing to the surface, no temperature measurement
    Previewing,
    /// Preview and temperature measurement both running
    Active,
}

/// The live state of one connected device
pub(crate) struct Session {
    pub(crate) id: Uuid,
    pub(crate) device: DeviceDescriptor,
    pub(crate) handle: ControlHandle,
    pub(crate) state: SessionState,
    pub(crate) previewing: bool,
    pub(crate) measuring: bool,
    pub(crate) ready: bool,
    pub(crate) connected_at: DateTime<Utc>,
}

impl Session {
    pub(crate) fn new(device: DeviceDescriptor, handle: ControlHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            device,
            handle,
            state: SessionState::Connecting,
            previewing: false,
            measuring: false,
            ready: false,
            connected_at: Utc::now(),
        }
    }

    pub(crate) fn reset_flags(&mut self) {
        self.previewing = false;
        self.measuring = false;
        self.ready = false;
    }
}

/// Point-in-time view of the session, safe to hand to other tasks
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionStatus {
    pub state: SessionState,
    pub previewing: bool,
    pub measuring: bool,
    /// The initialization plan ran to completion
    pub ready: bool,
    pub session_id: Option<Uuid>,
    pub device: Option<DeviceDescriptor>,
    pub connected_at: Option<DateTime<Utc>>,
}

impl SessionStatus {
    pub fn idle() -> Self {
        Self {
            state: SessionState::Idle,
            previewing: false,
            measuring: false,
            ready: false,
            session_id: None,
            device: None,
            connected_at: None,
        }
    }

    pub(crate) fn of(session: &Session) -> Self {
        Self {
            state: session.state,
            previewing: session.previewing,
            measuring: session.measuring,
            ready: session.ready,
            session_id: Some(session.id),
            device: Some(session.device.clone()),
            connected_at: Some(session.connected_at),
        }
    }
}
