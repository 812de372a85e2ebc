use super::{ServiceState, ThermcamService};
use crate::command::{CommandSink, RenderSurface};
use crate::error::{Result, ThermcamError};
use crate::watcher::HotplugBackend;
use tracing::{debug, info};

impl<B: HotplugBackend, S: CommandSink, R: RenderSurface> ThermcamService<B, S, R> {
    /// Register the device watcher and begin accepting devices
    pub fn start(&mut self) -> Result<()> {
        match self.state {
            ServiceState::Running => Ok(()),
            ServiceState::Paused => self.resume(),
            ServiceState::Stopped => Err(stopped()),
            ServiceState::Created => {
                info!("Starting thermal camera service");
                self.watcher.register()?;
                self.state = ServiceState::Running;
                Ok(())
            }
        }
    }

    /// Stop reacting to the bus while the host is in the background.
    ///
    /// Pending initialization steps are cancelled; the session and its
    /// handle are kept so resuming does not need a new permission prompt.
    pub fn pause(&mut self) -> Result<()> {
        match self.state {
            ServiceState::Stopped => return Err(stopped()),
            ServiceState::Paused => return Ok(()),
            ServiceState::Created | ServiceState::Running => {}
        }

        if self.controller.cancel_plan() {
            debug!("Initialization plan cancelled by pause");
        }
        self.watcher.unregister()?;
        self.state = ServiceState::Paused;
        info!("Camera service paused");
        Ok(())
    }

    /// Register the watcher again if needed; a no-op while running
    pub fn resume(&mut self) -> Result<()> {
        if self.state == ServiceState::Stopped {
            return Err(stopped());
        }

        self.watcher.register()?;
        if self.state != ServiceState::Running {
            self.state = ServiceState::Running;
            info!("Camera service resumed");
        }
        Ok(())
    }
}

fn stopped() -> ThermcamError {
    ThermcamError::invalid_state("camera service has shut down")
}
