use super::handle::ServiceHandle;
use super::types::{ServiceRequest, ServiceState, ServiceStatus};
use crate::command::{CommandSink, OverlayAssets, PreviewFormat, RenderSurface};
use crate::config::ThermcamConfig;
use crate::error::Result;
use crate::events::{DeviceEvent, EventBus};
use crate::gate::PermissionGate;
use crate::session::SessionController;
use crate::watcher::{DeviceWatcher, HotplugBackend};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::debug;

/// Owns every camera component and serializes all work on one task.
///
/// The hot-plug backend, command sink and render surface are passed in so
/// the service runs the same against real hardware and test doubles.
pub struct ThermcamService<B: HotplugBackend, S: CommandSink, R: RenderSurface> {
    pub(super) config: ThermcamConfig,
    pub(super) event_bus: EventBus,
    pub(super) state: ServiceState,

    // Components
    pub(super) watcher: DeviceWatcher<B>,
    pub(super) gate: PermissionGate,
    pub(super) controller: SessionController<S, R>,

    // Channels
    pub(super) device_events: mpsc::UnboundedReceiver<DeviceEvent>,
    pub(super) requests: mpsc::Receiver<ServiceRequest>,
    pub(super) request_sender: mpsc::Sender<ServiceRequest>,
    pub(super) cancellation_token: CancellationToken,
}

impl<B: HotplugBackend, S: CommandSink, R: RenderSurface> ThermcamService<B, S, R> {
    /// Create a new service with the given configuration
    pub fn new(config: ThermcamConfig, backend: B, sink: S, surface: R) -> Result<Self> {
        config.validate()?;

        let event_bus = EventBus::new(config.system.event_bus_capacity);
        let (device_sender, device_events) = mpsc::unbounded_channel();
        let (request_sender, requests) = mpsc::channel(config.system.request_queue_capacity);

        let watcher = DeviceWatcher::new(backend, device_sender);
        let gate = PermissionGate::new(config.device.signature());
        let controller = SessionController::new(
            sink,
            surface,
            PreviewFormat::from(&config.preview),
            event_bus.clone(),
        );

        debug!(
            "Camera service created for devices matching class {} subclass {}",
            config.device.class, config.device.subclass
        );

        Ok(Self {
            config,
            event_bus,
            state: ServiceState::Created,
            watcher,
            gate,
            controller,
            device_events,
            requests,
            request_sender,
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Replace the overlay assets bound when the preview starts
    pub fn with_assets(mut self, assets: OverlayAssets) -> Self {
        self.controller = self.controller.with_assets(assets);
        self
    }

    /// Handle for talking to the service once it runs on its own task
    pub fn handle(&self) -> ServiceHandle {
        ServiceHandle::new(self.request_sender.clone(), self.event_bus.clone())
    }

    /// Token that stops the service loop when cancelled
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn event_bus(&self) -> &EventBus {
        &self.event_bus
    }

    pub fn config(&self) -> &ThermcamConfig {
        &self.config
    }

    pub fn state(&self) -> ServiceState {
        self.state
    }

    pub fn status(&self) -> ServiceStatus {
        ServiceStatus {
            state: self.state,
            watcher_registered: self.watcher.is_registered(),
            session: self.controller.status(),
        }
    }
}
