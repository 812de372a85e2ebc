use serde::{Deserialize, Serialize};
use std::fmt;

/// USB device class used by composite video devices (miscellaneous / IAD)
pub const THERMAL_DEVICE_CLASS: u8 = 239;

/// Device subclass paired with [`THERMAL_DEVICE_CLASS`] by the thermal camera
pub const THERMAL_DEVICE_SUBCLASS: u8 = 2;

/// Identity of a physical USB device as observed on attach
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct DeviceDescriptor {
    /// Bus-assigned id, stable for the lifetime of one physical attachment
    pub id: u32,
    pub device_class: u8,
    pub device_subclass: u8,
    pub vendor_id: u16,
    pub product_id: u16,
}

impl DeviceDescriptor {
    pub fn new(id: u32, device_class: u8, device_subclass: u8) -> Self {
        Self {
            id,
            device_class,
            device_subclass,
            vendor_id: 0,
            product_id: 0,
        }
    }

    pub fn with_ids(mut self, vendor_id: u16, product_id: u16) -> Self {
        self.vendor_id = vendor_id;
        self.product_id = product_id;
        self
    }
}

impl fmt::Display for DeviceDescriptor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "#{} [{:04x}:{:04x} class={} subclass={}]",
            self.id, self.vendor_id, self.product_id, self.device_class, self.device_subclass
        )
    }
}

/// Class/subclass pair a device must declare to be driven by this crate
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceSignature {
    pub class: u8,
    pub subclass: u8,
}

impl DeviceSignature {
    pub fn matches(&self, descriptor: &DeviceDescriptor) -> bool {
        descriptor.device_class == self.class && descriptor.device_subclass == self.subclass
    }
}

impl Default for DeviceSignature {
    fn default() -> Self {
        Self {
            class: THERMAL_DEVICE_CLASS,
            subclass: THERMAL_DEVICE_SUBCLASS,
        }
    }
}

type ReleaseHook = Box<dyn FnOnce(u64) + Send>;

/// Exclusively owned control channel to a connected device.
///
/// The handle is not `Clone`. Whatever the backend attached as its release
/// hook runs exactly once, when the handle is dropped (normally inside
/// [`crate::command::CommandSink::close`]).
pub struct ControlHandle {
    id: u64,
    device: DeviceDescriptor,
    release: Option<ReleaseHook>,
}

impl ControlHandle {
    pub fn new(id: u64, device: DeviceDescriptor) -> Self {
        Self {
            id,
            device,
            release: None,
        }
    }

    /// Attach the backend's release action (closing the OS-level channel)
    pub fn with_release_hook<F>(mut self, hook: F) -> Self
    where
        F: FnOnce(u64) + Send + 'static,
    {
        self.release = Some(Box::new(hook));
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn device(&self) -> &DeviceDescriptor {
        &self.device
    }
}

impl fmt::Debug for ControlHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ControlHandle")
            .field("id", &self.id)
            .field("device", &self.device)
            .field("has_release_hook", &self.release.is_some())
            .finish()
    }
}

impl Drop for ControlHandle {
    fn drop(&mut self) {
        if let Some(release) = self.release.take() {
            release(self.id);
        }
    }
}
