use crate::device::{ControlHandle, DeviceDescriptor};
use crate::session::SessionState;
use serde::{Deserialize, Serialize};
use std::time::SystemTime;
use tokio::sync::broadcast;
use tracing::{debug, error, info, warn};

/// Raw events emitted by the device watcher for its bus
#[derive(Debug)]
pub enum DeviceEvent {
    Attached(DeviceDescriptor),
    Detached(DeviceDescriptor),
    PermissionResult {
        device: DeviceDescriptor,
        granted: bool,
    },
    Connected {
        device: DeviceDescriptor,
        handle: ControlHandle,
    },
    Disconnected(DeviceDescriptor),
}

impl DeviceEvent {
    pub fn device(&self) -> &DeviceDescriptor {
        match self {
            DeviceEvent::Attached(device)
            | DeviceEvent::Detached(device)
            | DeviceEvent::Disconnected(device) => device,
            DeviceEvent::PermissionResult { device, .. } => device,
            DeviceEvent::Connected { device, .. } => device,
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            DeviceEvent::Attached(_) => "attached",
            DeviceEvent::Detached(_) => "detached",
            DeviceEvent::PermissionResult { .. } => "permission_result",
            DeviceEvent::Connected { .. } => "connected",
            DeviceEvent::Disconnected(_) => "disconnected",
        }
    }
}

/// Status events published by the camera service
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum ThermcamEvent {
    /// A device matching the camera signature asked for permission
    PermissionRequested {
        device: DeviceDescriptor,
        timestamp: SystemTime,
    },
    /// Session lifecycle state changed
    StateChanged {
        from: SessionState,
        to: SessionState,
        timestamp: SystemTime,
    },
    /// The initialization plan ran to completion
    InitializationComplete {
        device: DeviceDescriptor,
        timestamp: SystemTime,
    },
    /// A non-fatal failure surfaced by the session controller
    Error {
        kind: String,
        message: String,
        timestamp: SystemTime,
    },
    /// Service shutdown requested
    ShutdownRequested {
        timestamp: SystemTime,
        reason: String,
    },
}

impl ThermcamEvent {
    pub fn timestamp(&self) -> SystemTime {
        match self {
            ThermcamEvent::PermissionRequested { timestamp, .. }
            | ThermcamEvent::StateChanged { timestamp, .. }
            | ThermcamEvent::InitializationComplete { timestamp, .. }
            | ThermcamEvent::Error { timestamp, .. }
            | ThermcamEvent::ShutdownRequested { timestamp, .. } => *timestamp,
        }
    }

    /// Get a human-readable description of the event
    pub fn description(&self) -> String {
        match self {
            ThermcamEvent::PermissionRequested { device, .. } => {
                format!("Permission requested for {}", device)
            }
            ThermcamEvent::StateChanged { from, to, .. } => {
                format!("Session state {:?} -> {:?}", from, to)
            }
            ThermcamEvent::InitializationComplete { device, .. } => {
                format!("Initialization complete for {}", device)
            }
            ThermcamEvent::Error { kind, message, .. } => format!("{}: {}", kind, message),
            ThermcamEvent::ShutdownRequested { reason, .. } => {
                format!("Shutdown requested: {}", reason)
            }
        }
    }

    pub fn event_type(&self) -> &'static str {
        match self {
            ThermcamEvent::PermissionRequested { .. } => "permission_requested",
            ThermcamEvent::StateChanged { .. } => "state_changed",
            ThermcamEvent::InitializationComplete { .. } => "initialization_complete",
            ThermcamEvent::Error { .. } => "error",
            ThermcamEvent::ShutdownRequested { .. } => "shutdown_requested",
        }
    }
}

/// Broadcast bus for service status events
pub struct EventBus {
    sender: broadcast::Sender<ThermcamEvent>,
}

impl EventBus {
    /// Create a new event bus with the specified channel capacity
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity);
        Self { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<ThermcamEvent> {
        self.sender.subscribe()
    }

    /// Publish an event to all subscribers.
    ///
    /// Returns the number of subscribers that received it; having none is
    /// not an error for a status bus.
    pub fn publish(&self, event: ThermcamEvent) -> usize {
        match &event {
            ThermcamEvent::Error { kind, message, .. } => {
                error!("Session error ({}): {}", kind, message);
            }
            ThermcamEvent::StateChanged { from, to, .. } => {
                info!("Session state {:?} -> {:?}", from, to);
            }
            ThermcamEvent::ShutdownRequested { reason, .. } => {
                warn!("Shutdown requested: {}", reason);
            }
            _ => debug!("Event: {}", event.description()),
        }

        self.sender.send(event).unwrap_or(0)
    }

    pub fn subscriber_count(&self) -> usize {
        self.sender.receiver_count()
    }
}

impl Clone for EventBus {
    fn clone(&self) -> Self {
        Self {
            sender: self.sender.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_publish_reaches_subscribers() {
        let bus = EventBus::new(8);
        let mut receiver = bus.subscribe();

        let delivered = bus.publish(ThermcamEvent::StateChanged {
            from: SessionState::Idle,
            to: SessionState::Connecting,
            timestamp: SystemTime::now(),
        });
        assert_eq!(delivered, 1);

        match receiver.recv().await.unwrap() {
            ThermcamEvent::StateChanged { from, to, .. } => {
                assert_eq!(from, SessionState::Idle);
                assert_eq!(to, SessionState::Connecting);
            }
            other => panic!("Unexpected event: {:?}", other),
        }
    }

    #[test]
    fn test_publish_without_subscribers() {
        let bus = EventBus::new(8);
        assert_eq!(bus.subscriber_count(), 0);
        assert_eq!(
            bus.publish(ThermcamEvent::ShutdownRequested {
                timestamp: SystemTime::now(),
                reason: "test".to_string(),
            }),
            0
        );
    }

    #[test]
    fn test_device_event_accessors() {
        let device = DeviceDescriptor::new(3, 239, 2);
        let event = DeviceEvent::PermissionResult {
            device: device.clone(),
            granted: false,
        };

        assert_eq!(event.device(), &device);
        assert_eq!(event.event_type(), "permission_result");
    }
}
