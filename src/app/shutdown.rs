use super::{ServiceState, ShutdownReason, ThermcamService};
use crate::command::{CommandSink, RenderSurface};
use crate::events::ThermcamEvent;
use crate::watcher::HotplugBackend;
use std::time::SystemTime;
use tracing::info;

impl<B: HotplugBackend, S: CommandSink, R: RenderSurface> ThermcamService<B, S, R> {
    /// Close the session and release the watcher. Returns the exit code.
    ///
    /// Runs synchronously so the control handle is released before the
    /// caller can exit the process.
    pub(super) fn shutdown(&mut self, reason: ShutdownReason) -> i32 {
        info!("Beginning shutdown: {}", reason);
        self.event_bus.publish(ThermcamEvent::ShutdownRequested {
            timestamp: SystemTime::now(),
            reason: reason.to_string(),
        });

        if self.controller.close() {
            info!("Camera session closed");
        }
        self.watcher.destroy();
        self.state = ServiceState::Stopped;
        self.cancellation_token.cancel();

        let exit_code = reason.exit_code();
        info!("Shutdown completed with exit code: {}", exit_code);
        exit_code
    }
}
