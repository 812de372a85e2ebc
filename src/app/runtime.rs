use super::types::ServiceRequest;
use super::{ServiceHandle, ShutdownReason, ThermcamService};
use crate::command::{CommandSink, RenderSurface};
use crate::error::{Result, ThermcamError};
use crate::events::{DeviceEvent, ThermcamEvent};
use crate::gate::GateDecision;
use crate::watcher::HotplugBackend;
use std::time::SystemTime;
use tokio::signal;
use tracing::{debug, error, info, warn};

impl<B: HotplugBackend, S: CommandSink, R: RenderSurface> ThermcamService<B, S, R> {
    /// Run the service loop until shutdown is requested.
    ///
    /// Device events take priority over application requests, which take
    /// priority over due initialization steps. Returns the exit code.
    pub async fn run(mut self) -> Result<i32> {
        self.start()?;
        info!("Thermal camera service is running");

        let reason = loop {
            tokio::select! {
                biased;

                _ = self.cancellation_token.cancelled() => {
                    break ShutdownReason::UserRequest;
                }
                Some(event) = self.device_events.recv() => {
                    self.handle_device_event(event);
                }
                // the service holds a sender, so the request channel never closes
                Some(request) = self.requests.recv() => {
                    if let Some(reason) = self.handle_request(request) {
                        break reason;
                    }
                }
                due = self.controller.next_step() => {
                    if let Err(e) = self.controller.execute(due) {
                        debug!("Initialization plan stopped: {}", e);
                    }
                }
            }
        };

        let exit_code = self.shutdown(reason);
        info!("Thermal camera service stopped");
        Ok(exit_code)
    }

    pub(super) fn handle_device_event(&mut self, event: DeviceEvent) {
        debug!(
            event = event.event_type(),
            device_id = event.device().id,
            "Device event"
        );

        match event {
            DeviceEvent::Attached(device) => {
                if self.gate.evaluate(&device) == GateDecision::Ignore {
                    return;
                }

                self.event_bus.publish(ThermcamEvent::PermissionRequested {
                    device: device.clone(),
                    timestamp: SystemTime::now(),
                });
                if let Err(e) = self.watcher.request_permission(&device) {
                    error!("Permission request for {} failed: {}", device, e);
                    self.report(&e);
                }
            }
            DeviceEvent::PermissionResult { device, granted } => {
                if granted {
                    info!("Permission granted for {}", device);
                } else {
                    warn!("Permission denied for {}", device);
                    self.report(&ThermcamError::PermissionDenied {
                        device: device.to_string(),
                    });
                }
            }
            DeviceEvent::Connected { device, handle } => {
                // open failures are reported by the controller
                if let Err(e) = self.controller.connect(device, handle) {
                    debug!("Connect did not produce a session: {}", e);
                }
            }
            DeviceEvent::Disconnected(device) | DeviceEvent::Detached(device) => {
                self.controller.disconnect(&device);
            }
        }
    }

    /// Serve one application request; returns the shutdown reason when the
    /// request asks the service to stop.
    pub(super) fn handle_request(&mut self, request: ServiceRequest) -> Option<ShutdownReason> {
        match request {
            ServiceRequest::Status(reply) => {
                let _ = reply.send(Ok(self.status()));
            }
            ServiceRequest::Pause(reply) => {
                let _ = reply.send(self.pause());
            }
            ServiceRequest::Resume(reply) => {
                let _ = reply.send(self.resume());
            }
            ServiceRequest::StartMeasurement(reply) => {
                let _ = reply.send(self.controller.start_measurement());
            }
            ServiceRequest::StopMeasurement(reply) => {
                let _ = reply.send(self.controller.stop_measurement());
            }
            ServiceRequest::StopPreview(reply) => {
                let _ = reply.send(self.controller.stop_preview());
            }
            ServiceRequest::Reinitialize(reply) => {
                let _ = reply.send(self.controller.reinitialize());
            }
            ServiceRequest::CloseSession(reply) => {
                let _ = reply.send(Ok(self.controller.close()));
            }
            ServiceRequest::Shutdown(reason) => return Some(reason),
        }
        None
    }

    pub(super) fn report(&self, error: &ThermcamError) {
        self.event_bus.publish(ThermcamEvent::Error {
            kind: error.kind().to_string(),
            message: error.to_string(),
            timestamp: SystemTime::now(),
        });
    }
}

/// Forward SIGTERM and SIGINT to the service as shutdown requests
pub fn spawn_signal_handlers(handle: ServiceHandle) {
    // Handle SIGTERM (systemd stop) - Unix only
    #[cfg(unix)]
    {
        let handle = handle.clone();
        tokio::spawn(async move {
            let mut sigterm = match signal::unix::signal(signal::unix::SignalKind::terminate()) {
                Ok(sigterm) => sigterm,
                Err(e) => {
                    warn!("Failed to register SIGTERM handler: {}", e);
                    return;
                }
            };

            if sigterm.recv().await.is_some() {
                info!("Received SIGTERM signal");
                let _ = handle
                    .shutdown(ShutdownReason::Signal("SIGTERM".to_string()))
                    .await;
            }
        });
    }

    // Handle SIGINT (Ctrl+C) - Cross-platform
    tokio::spawn(async move {
        if let Ok(()) = signal::ctrl_c().await {
            info!("Received SIGINT signal (Ctrl+C)");
            let _ = handle
                .shutdown(ShutdownReason::Signal("SIGINT".to_string()))
                .await;
        }
    });
}
