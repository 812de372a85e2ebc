//! libusb hot-plug backend.
//!
//! Hot-plug callbacks are dispatched from a dedicated thread running the
//! libusb event loop. "Permission" on a desktop host is simply whether the
//! device node can be opened by this process.

use super::HotplugBackend;
use crate::device::{ControlHandle, DeviceDescriptor};
use crate::error::{Result, ThermcamError};
use crate::events::DeviceEvent;
use parking_lot::Mutex;
use rusb::{Context, Device, Hotplug, HotplugBuilder, Registration, UsbContext};
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

const EVENT_LOOP_TIMEOUT: Duration = Duration::from_millis(100);

type DeviceMap = Arc<Mutex<HashMap<u32, (Device<Context>, DeviceDescriptor)>>>;

fn device_key(device: &Device<Context>) -> u32 {
    ((device.bus_number() as u32) << 8) | device.address() as u32
}

fn describe(device: &Device<Context>) -> Option<DeviceDescriptor> {
    match device.device_descriptor() {
        Ok(descriptor) => Some(
            DeviceDescriptor::new(
                device_key(device),
                descriptor.class_code(),
                descriptor.sub_class_code(),
            )
            .with_ids(descriptor.vendor_id(), descriptor.product_id()),
        ),
        Err(e) => {
            warn!(
                "Failed to read descriptor (bus={}, addr={}): {}",
                device.bus_number(),
                device.address(),
                e
            );
            None
        }
    }
}

pub struct UsbHotplugBackend {
    context: Context,
    devices: DeviceMap,
    registration: Option<Registration<Context>>,
    running: Arc<AtomicBool>,
    event_thread: Option<JoinHandle<()>>,
    next_handle_id: Arc<AtomicU64>,
}

impl UsbHotplugBackend {
    pub fn new() -> Result<Self> {
        if !rusb::has_hotplug() {
            return Err(ThermcamError::watcher(
                "libusb was built without hot-plug support",
            ));
        }

        let context = Context::new()
            .map_err(|e| ThermcamError::watcher(format!("Failed to create USB context: {}", e)))?;

        Ok(Self {
            context,
            devices: Arc::new(Mutex::new(HashMap::new())),
            registration: None,
            running: Arc::new(AtomicBool::new(false)),
            event_thread: None,
            next_handle_id: Arc::new(AtomicU64::new(1)),
        })
    }

    fn ensure_event_thread(&mut self) -> Result<()> {
        if self.event_thread.is_some() {
            return Ok(());
        }

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let context = self.context.clone();

        let thread = std::thread::Builder::new()
            .name("usb-events".to_string())
            .spawn(move || {
                info!("USB event thread started");
                while running.load(Ordering::SeqCst) {
                    match context.handle_events(Some(EVENT_LOOP_TIMEOUT)) {
                        Ok(()) | Err(rusb::Error::Interrupted) => {}
                        Err(e) => warn!("Error handling USB events: {}", e),
                    }
                }
                info!("USB event thread stopped");
            })
            .map_err(|e| ThermcamError::watcher(format!("Failed to spawn USB thread: {}", e)))?;

        self.event_thread = Some(thread);
        Ok(())
    }
}

impl HotplugBackend for UsbHotplugBackend {
    fn listen(&mut self, events: mpsc::UnboundedSender<DeviceEvent>) -> Result<()> {
        let callback = HotplugCallback {
            events,
            devices: Arc::clone(&self.devices),
        };

        let registration = HotplugBuilder::new()
            .enumerate(true)
            .register(&self.context, Box::new(callback))
            .map_err(|e| ThermcamError::watcher(format!("Hot-plug registration failed: {}", e)))?;

        self.registration = Some(registration);
        self.ensure_event_thread()?;
        debug!("Hot-plug callbacks registered");
        Ok(())
    }

    fn stop_listening(&mut self) {
        // dropping the registration deregisters the callback
        self.registration = None;
        debug!("Hot-plug callbacks deregistered");
    }

    fn request_permission(
        &mut self,
        device: &DeviceDescriptor,
        events: &mpsc::UnboundedSender<DeviceEvent>,
    ) -> Result<()> {
        let usb_device = self
            .devices
            .lock()
            .get(&device.id)
            .map(|(usb_device, _)| usb_device.clone())
            .ok_or_else(|| ThermcamError::watcher(format!("Unknown device {}", device)))?;

        match usb_device.open() {
            Ok(usb_handle) => {
                let _ = events.send(DeviceEvent::PermissionResult {
                    device: device.clone(),
                    granted: true,
                });

                let id = self.next_handle_id.fetch_add(1, Ordering::SeqCst);
                let handle = ControlHandle::new(id, device.clone()).with_release_hook(move |id| {
                    debug!("Closing USB handle {}", id);
                    drop(usb_handle);
                });
                let _ = events.send(DeviceEvent::Connected {
                    device: device.clone(),
                    handle,
                });
            }
            Err(e) => {
                if e != rusb::Error::Access {
                    warn!("Opening {} failed: {}", device, e);
                }
                let _ = events.send(DeviceEvent::PermissionResult {
                    device: device.clone(),
                    granted: false,
                });
            }
        }

        Ok(())
    }

    fn release(&mut self) {
        self.registration = None;
        self.running.store(false, Ordering::SeqCst);
        if let Some(thread) = self.event_thread.take() {
            if thread.join().is_err() {
                error!("USB event thread panicked");
            }
        }
        self.devices.lock().clear();
    }
}

impl Drop for UsbHotplugBackend {
    fn drop(&mut self) {
        self.release();
    }
}

struct HotplugCallback {
    events: mpsc::UnboundedSender<DeviceEvent>,
    devices: DeviceMap,
}

impl Hotplug<Context> for HotplugCallback {
    fn device_arrived(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug callback: device arrived (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );

        if let Some(descriptor) = describe(&device) {
            self.devices
                .lock()
                .insert(descriptor.id, (device, descriptor.clone()));
            let _ = self.events.send(DeviceEvent::Attached(descriptor));
        }
    }

    fn device_left(&mut self, device: Device<Context>) {
        debug!(
            "Hot-plug callback: device left (bus={}, addr={})",
            device.bus_number(),
            device.address()
        );

        // descriptor reads fail once the device is gone; use the cached one
        let key = device_key(&device);
        let descriptor = match self.devices.lock().remove(&key) {
            Some((_, descriptor)) => descriptor,
            None => DeviceDescriptor::new(key, 0, 0),
        };
        let _ = self.events.send(DeviceEvent::Detached(descriptor));
    }
}
