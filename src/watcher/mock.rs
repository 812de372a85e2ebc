use super::HotplugBackend;
use crate::device::{ControlHandle, DeviceDescriptor};
use crate::error::Result;
use crate::events::DeviceEvent;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::mpsc;
use tracing::debug;

struct BusState {
    listener: Option<mpsc::UnboundedSender<DeviceEvent>>,
    grant_permission: bool,
    attached: HashMap<u32, DeviceDescriptor>,
    permission_requests: Vec<DeviceDescriptor>,
    next_handle_id: u64,
    released_handles: Vec<u64>,
    released: bool,
}

/// Create an in-process USB bus: the backend goes to the watcher, the bus
/// stays with the caller to plug devices in and out.
pub fn mock_bus() -> (MockHotplugBackend, MockUsbBus) {
    let state = Arc::new(Mutex::new(BusState {
        listener: None,
        grant_permission: true,
        attached: HashMap::new(),
        permission_requests: Vec::new(),
        next_handle_id: 1,
        released_handles: Vec::new(),
        released: false,
    }));

    (
        MockHotplugBackend {
            state: Arc::clone(&state),
        },
        MockUsbBus { state },
    )
}

pub struct MockHotplugBackend {
    state: Arc<Mutex<BusState>>,
}

/// Test-side controller of a mock bus
#[derive(Clone)]
pub struct MockUsbBus {
    state: Arc<Mutex<BusState>>,
}

impl MockUsbBus {
    /// Whether permission requests are granted (default: granted)
    pub fn set_grant_permission(&self, grant: bool) {
        self.state.lock().grant_permission = grant;
    }

    pub fn attach(&self, device: DeviceDescriptor) {
        self.state.lock().attached.insert(device.id, device.clone());
        self.emit(DeviceEvent::Attached(device));
    }

    pub fn detach(&self, device: DeviceDescriptor) {
        self.state.lock().attached.remove(&device.id);
        self.emit(DeviceEvent::Detached(device));
    }

    pub fn disconnect(&self, device: DeviceDescriptor) {
        self.emit(DeviceEvent::Disconnected(device));
    }

    /// Deliver a connect event with a fresh handle, as the OS does when an
    /// already-permitted device re-opens. Returns the handle id.
    pub fn connect(&self, device: DeviceDescriptor) -> u64 {
        let handle = self.new_handle(&device);
        let id = handle.id();
        self.emit(DeviceEvent::Connected { device, handle });
        id
    }

    pub fn permission_requests(&self) -> Vec<DeviceDescriptor> {
        self.state.lock().permission_requests.clone()
    }

    /// Ids of handles released so far, in release order
    pub fn released_handles(&self) -> Vec<u64> {
        self.state.lock().released_handles.clone()
    }

    pub fn release_count(&self, handle_id: u64) -> usize {
        self.state
            .lock()
            .released_handles
            .iter()
            .filter(|id| **id == handle_id)
            .count()
    }

    pub fn is_listening(&self) -> bool {
        self.state.lock().listener.is_some()
    }

    pub fn is_released(&self) -> bool {
        self.state.lock().released
    }

    fn new_handle(&self, device: &DeviceDescriptor) -> ControlHandle {
        new_handle(&self.state, device)
    }

    fn emit(&self, event: DeviceEvent) {
        // clone the sender so a failed send never drops a handle under the lock
        let listener = self.state.lock().listener.clone();
        match listener {
            Some(listener) => {
                let _ = listener.send(event);
            }
            None => debug!("Mock bus not watched, dropping {}", event.event_type()),
        }
    }
}

fn new_handle(state: &Arc<Mutex<BusState>>, device: &DeviceDescriptor) -> ControlHandle {
    let id = {
        let mut state = state.lock();
        let id = state.next_handle_id;
        state.next_handle_id += 1;
        id
    };

    let state = Arc::clone(state);
    ControlHandle::new(id, device.clone()).with_release_hook(move |id| {
        state.lock().released_handles.push(id);
    })
}

impl HotplugBackend for MockHotplugBackend {
    /// Devices already on the bus are reported as attached, the way libusb
    /// enumerates on hot-plug registration
    fn listen(&mut self, events: mpsc::UnboundedSender<DeviceEvent>) -> Result<()> {
        let present: Vec<DeviceDescriptor> = {
            let mut state = self.state.lock();
            state.listener = Some(events.clone());
            state.attached.values().cloned().collect()
        };

        for device in present {
            let _ = events.send(DeviceEvent::Attached(device));
        }
        Ok(())
    }

    fn stop_listening(&mut self) {
        self.state.lock().listener = None;
    }

    fn request_permission(
        &mut self,
        device: &DeviceDescriptor,
        events: &mpsc::UnboundedSender<DeviceEvent>,
    ) -> Result<()> {
        let granted = {
            let mut state = self.state.lock();
            state.permission_requests.push(device.clone());
            state.grant_permission
        };

        let _ = events.send(DeviceEvent::PermissionResult {
            device: device.clone(),
            granted,
        });

        if granted {
            let handle = new_handle(&self.state, device);
            let _ = events.send(DeviceEvent::Connected {
                device: device.clone(),
                handle,
            });
        }

        Ok(())
    }

    fn release(&mut self) {
        let mut state = self.state.lock();
        state.listener = None;
        state.attached.clear();
        state.released = true;
    }
}
