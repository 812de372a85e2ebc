pub mod app;
pub mod command;
pub mod config;
pub mod device;
pub mod error;
pub mod events;
pub mod gate;
pub mod plan;
pub mod scheduler;
pub mod session;
pub mod watcher;

pub use app::{
    spawn_signal_handlers, ServiceHandle, ServiceState, ServiceStatus, ShutdownReason,
    ThermcamService,
};
pub use command::{
    CameraControl, CommandSink, HeadlessSurface, LoggingCommandSink, OverlayAssets, PreviewFormat,
    RecordingCommandSink, RenderSurface,
};
pub use config::ThermcamConfig;
pub use device::{ControlHandle, DeviceDescriptor, DeviceSignature};
pub use error::{CommandError, Result, ThermcamError};
pub use events::{DeviceEvent, EventBus, ThermcamEvent};
pub use gate::{GateDecision, PermissionGate};
pub use session::{SessionController, SessionState, SessionStatus};
pub use watcher::{mock_bus, DeviceWatcher, HotplugBackend, MockHotplugBackend, MockUsbBus};

#[cfg(all(feature = "usb", target_os = "linux"))]
pub use watcher::UsbHotplugBackend;
