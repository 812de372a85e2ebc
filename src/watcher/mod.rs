mod mock;
#[cfg(all(feature = "usb", target_os = "linux"))]
mod usb;

#[cfg(test)]
mod tests;

pub use mock::{mock_bus, MockHotplugBackend, MockUsbBus};
#[cfg(all(feature = "usb", target_os = "linux"))]
pub use usb::UsbHotplugBackend;

use crate::device::DeviceDescriptor;
use crate::error::{Result, ThermcamError};
use crate::events::DeviceEvent;
use tokio::sync::mpsc;
use tracing::{debug, info};

/// OS-specific source of hot-plug and permission events
pub trait HotplugBackend: Send + 'static {
    /// Begin delivering attach/detach events to `events`
    fn listen(&mut self, events: mpsc::UnboundedSender<DeviceEvent>) -> Result<()>;

    /// Stop delivering events; resources needed to listen again are kept
    fn stop_listening(&mut self);

    /// Ask for access to `device`.
    ///
    /// The outcome arrives on `events` as a permission result, followed by a
    /// connect event carrying the control handle when access was granted.
    fn request_permission(
        &mut self,
        device: &DeviceDescriptor,
        events: &mpsc::UnboundedSender<DeviceEvent>,
    ) -> Result<()>;

    /// Release everything the backend holds
    fn release(&mut self);
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum WatcherState {
    Unregistered,
    Registered,
    Destroyed,
}

/// Watches a single USB bus and forwards its events over a channel
pub struct DeviceWatcher<B: HotplugBackend> {
    backend: B,
    events: mpsc::UnboundedSender<DeviceEvent>,
    state: WatcherState,
}

impl<B: HotplugBackend> DeviceWatcher<B> {
    pub fn new(backend: B, events: mpsc::UnboundedSender<DeviceEvent>) -> Self {
        Self {
            backend,
            events,
            state: WatcherState::Unregistered,
        }
    }

    /// Start listening; a no-op when already registered
    pub fn register(&mut self) -> Result<()> {
        match self.state {
            WatcherState::Destroyed => Err(ThermcamError::WatcherDestroyed),
            WatcherState::Registered => {
                debug!("Device watcher already registered");
                Ok(())
            }
            WatcherState::Unregistered => {
                self.backend.listen(self.events.clone())?;
                self.state = WatcherState::Registered;
                info!("Device watcher registered");
                Ok(())
            }
        }
    }

    /// Stop listening; a no-op when not registered
    pub fn unregister(&mut self) -> Result<()> {
        match self.state {
            WatcherState::Destroyed => Err(ThermcamError::WatcherDestroyed),
            WatcherState::Unregistered => Ok(()),
            WatcherState::Registered => {
                self.backend.stop_listening();
                self.state = WatcherState::Unregistered;
                info!("Device watcher unregistered");
                Ok(())
            }
        }
    }

    /// Release all resources. Terminal: later calls fail with
    /// [`ThermcamError::WatcherDestroyed`].
    pub fn destroy(&mut self) {
        if self.state == WatcherState::Destroyed {
            return;
        }

        if self.state == WatcherState::Registered {
            self.backend.stop_listening();
        }
        self.backend.release();
        self.state = WatcherState::Destroyed;
        info!("Device watcher destroyed");
    }

    pub fn request_permission(&mut self, device: &DeviceDescriptor) -> Result<()> {
        if self.state == WatcherState::Destroyed {
            return Err(ThermcamError::WatcherDestroyed);
        }

        debug!("Requesting permission for {}", device);
        self.backend.request_permission(device, &self.events)
    }

    pub fn is_registered(&self) -> bool {
        self.state == WatcherState::Registered
    }

    pub fn is_destroyed(&self) -> bool {
        self.state == WatcherState::Destroyed
    }
}
