use super::sink::{CameraControl, CommandSink, PreviewFormat, PreviewTarget};
use crate::device::ControlHandle;
use crate::error::CommandError;
use tracing::{debug, info};

/// Command sink that only logs what it is asked to do.
///
/// Keeps no history, so it can sit behind a long-running service until a
/// vendor driver sink is plugged in.
#[derive(Debug, Default)]
pub struct LoggingCommandSink {
    open_handle: Option<u64>,
}

impl LoggingCommandSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_open(&self) -> bool {
        self.open_handle.is_some()
    }

    fn require_open(&self, command: &str) -> Result<(), CommandError> {
        match self.open_handle {
            Some(handle_id) => {
                debug!(handle_id, "Camera command: {}", command);
                Ok(())
            }
            None => Err(CommandError::NotOpen),
        }
    }
}

impl CommandSink for LoggingCommandSink {
    fn open(&mut self, handle: &ControlHandle, format: PreviewFormat) -> Result<(), CommandError> {
        info!(
            handle_id = handle.id(),
            "Opening {} at {}x{} (mirror={}, bandwidth={})",
            handle.device(),
            format.width,
            format.height,
            format.mirror,
            format.bandwidth
        );
        self.open_handle = Some(handle.id());
        Ok(())
    }

    fn close(&mut self, handle: ControlHandle) {
        info!(handle_id = handle.id(), "Closing {}", handle.device());
        if self.open_handle == Some(handle.id()) {
            self.open_handle = None;
        }
    }

    fn set_control(&mut self, control: CameraControl, value: u32) -> Result<(), CommandError> {
        self.require_open(&format!(
            "set_control(selector={:#04x}, value={:#06x})",
            control.selector(),
            value
        ))
    }

    fn change_palette(&mut self, index: u8) -> Result<(), CommandError> {
        self.require_open(&format!("change_palette({})", index))
    }

    fn start_preview(&mut self, target: PreviewTarget) -> Result<(), CommandError> {
        self.require_open(&format!(
            "start_preview(surface={}, {}x{})",
            target.surface_id, target.width, target.height
        ))
    }

    fn stop_preview(&mut self) -> Result<(), CommandError> {
        self.require_open("stop_preview")
    }

    fn start_measurement(&mut self) -> Result<(), CommandError> {
        self.require_open("start_measurement")
    }

    fn stop_measurement(&mut self) -> Result<(), CommandError> {
        self.require_open("stop_measurement")
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::device::DeviceDescriptor;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn format() -> PreviewFormat {
        PreviewFormat {
            width: 256,
            height: 192,
            mirror: true,
            bandwidth: 1.0,
        }
    }

    #[test]
    fn test_commands_require_open_channel() {
        let mut sink = LoggingCommandSink::new();
        assert_eq!(sink.start_measurement(), Err(CommandError::NotOpen));

        let handle = ControlHandle::new(3, DeviceDescriptor::new(1, 239, 2));
        sink.open(&handle, format()).unwrap();
        assert!(sink.is_open());
        assert!(sink
            .set_control(CameraControl::ZoomAbsolute, 0x8004)
            .is_ok());
        assert!(sink.start_measurement().is_ok());

        sink.close(handle);
        assert!(!sink.is_open());
        assert_eq!(sink.change_palette(2), Err(CommandError::NotOpen));
    }

    #[test]
    fn test_close_releases_handle() {
        let released = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&released);
        let handle = ControlHandle::new(3, DeviceDescriptor::new(1, 239, 2))
            .with_release_hook(move |_| {
                counter.fetch_add(1, Ordering::SeqCst);
            });

        let mut sink = LoggingCommandSink::new();
        sink.open(&handle, format()).unwrap();
        sink.close(handle);

        assert_eq!(released.load(Ordering::SeqCst), 1);
    }
}
