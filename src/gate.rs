use crate::device::{DeviceDescriptor, DeviceSignature};
use tracing::{debug, info};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    RequestPermission,
    Ignore,
}

/// Decides which attached devices are worth a permission prompt.
///
/// Only devices declaring the camera's class/subclass pair pass; anything
/// else on the bus is ignored without prompting. There are no retries: a
/// device is reconsidered only on its next attach.
#[derive(Debug, Clone)]
pub struct PermissionGate {
    signature: DeviceSignature,
}

impl PermissionGate {
    pub fn new(signature: DeviceSignature) -> Self {
        Self { signature }
    }

    pub fn evaluate(&self, device: &DeviceDescriptor) -> GateDecision {
        if self.signature.matches(device) {
            info!("Thermal camera attached: {}", device);
            GateDecision::RequestPermission
        } else {
            debug!("Ignoring unrelated device {}", device);
            GateDecision::Ignore
        }
    }

    pub fn signature(&self) -> DeviceSignature {
        self.signature
    }
}

impl Default for PermissionGate {
    fn default() -> Self {
        Self::new(DeviceSignature::default())
    }
}
