use super::state::{Session, SessionState, SessionStatus};
use crate::command::{CommandSink, OverlayAssets, PreviewFormat, RenderSurface};
use crate::device::{ControlHandle, DeviceDescriptor};
use crate::error::{CommandError, Result, ThermcamError};
use crate::events::{EventBus, ThermcamEvent};
use crate::plan::{initialization_plan, PlanStep};
use crate::scheduler::{DueStep, Scheduler};
use std::time::SystemTime;
use tracing::{debug, info, warn};

/// Owns the camera session and drives it through the initialization plan.
///
/// All methods run on the service task. The controller is the only holder of
/// the control handle and of the `previewing`/`measuring` flags.
pub struct SessionController<S: CommandSink, R: RenderSurface> {
    sink: S,
    surface: R,
    assets: OverlayAssets,
    format: PreviewFormat,
    scheduler: Scheduler<PlanStep>,
    session: Option<Session>,
    event_bus: EventBus,
}

impl<S: CommandSink, R: RenderSurface> SessionController<S, R> {
    pub fn new(sink: S, surface: R, format: PreviewFormat, event_bus: EventBus) -> Self {
        Self {
            sink,
            surface,
            assets: OverlayAssets::default(),
            format,
            scheduler: Scheduler::new(),
            session: None,
            event_bus,
        }
    }

    pub fn with_assets(mut self, assets: OverlayAssets) -> Self {
        self.assets = assets;
        self
    }

    pub fn state(&self) -> SessionState {
        self.session
            .as_ref()
            .map(|session| session.state)
            .unwrap_or(SessionState::Idle)
    }

    pub fn status(&self) -> SessionStatus {
        let status = match &self.session {
            Some(session) => SessionStatus::of(session),
            None => SessionStatus::idle(),
        };
        debug_assert!(!status.measuring || status.previewing);
        status
    }

    pub fn has_session(&self) -> bool {
        self.session.is_some()
    }

    /// Whether initialization steps are still scheduled
    pub fn plan_pending(&self) -> bool {
        self.scheduler.is_active()
    }

    /// Take over a freshly connected device.
    ///
    /// A live session is torn down first, cancelling its plan before its
    /// handle is closed. When the device cannot be opened the handle is
    /// released and the controller stays idle.
    pub fn connect(&mut self, device: DeviceDescriptor, handle: ControlHandle) -> Result<()> {
        if self.session.is_some() {
            info!("{} connected while a session is live, replacing it", device);
            self.end_session();
        }

        let mut session = Session::new(device, handle);
        let session_id = session.id;
        info!(session_id = %session_id, "Opening {}", session.device);
        self.publish_transition(SessionState::Idle, SessionState::Connecting);

        if let Err(e) = self.sink.open(&session.handle, self.format) {
            let device = session.device.to_string();
            // dropping the session releases the unopened handle
            drop(session);
            self.publish_transition(SessionState::Connecting, SessionState::Idle);

            let error = ThermcamError::OpenFailed {
                device,
                details: e.to_string(),
            };
            self.report(&error);
            return Err(error);
        }

        session.state = SessionState::Initializing;
        self.session = Some(session);
        self.publish_transition(SessionState::Connecting, SessionState::Initializing);

        let generation = self.scheduler.start(initialization_plan());
        debug!(session_id = %session_id, generation, "Initialization plan started");
        Ok(())
    }

    /// Handle a disconnect or detach. Returns whether a session was torn down.
    ///
    /// Events for devices other than the session's own are ignored.
    pub fn disconnect(&mut self, device: &DeviceDescriptor) -> bool {
        match &self.session {
            Some(session) if session.device.id == device.id => {}
            Some(session) => {
                debug!(
                    "Ignoring disconnect of {}; session belongs to {}",
                    device, session.device
                );
                return false;
            }
            None => {
                debug!("Ignoring disconnect of {}; no session", device);
                return false;
            }
        }

        warn!("Camera {} disconnected", device);
        self.end_session();
        self.report(&ThermcamError::UnexpectedDisconnect {
            device: device.to_string(),
        });
        true
    }

    /// Explicit teardown. Returns whether there was a session to close.
    pub fn close(&mut self) -> bool {
        self.end_session().is_some()
    }

    /// Cancel the pending initialization steps, keeping the session open
    pub fn cancel_plan(&mut self) -> bool {
        self.scheduler.cancel()
    }

    /// Wait until the next initialization step is due
    pub async fn next_step(&mut self) -> DueStep<PlanStep> {
        self.scheduler.next_due().await
    }

    /// Run a due step against the sink and arm the following one.
    ///
    /// A failing step cancels the rest of the plan; the session stays open.
    pub fn execute(&mut self, due: DueStep<PlanStep>) -> Result<()> {
        let session_id = match &self.session {
            Some(session) if due.generation == self.scheduler.generation() => session.id,
            _ => {
                debug!("Dropping stale step {}", due.action);
                return Ok(());
            }
        };

        debug!(session_id = %session_id, index = due.index, "Running step {}", due.action);

        match self.run_step(due.action) {
            Ok(()) => {
                self.scheduler.complete(&due);
                Ok(())
            }
            Err(e) => {
                self.scheduler.cancel();
                Err(self.command_failed(&due.action.to_string(), e))
            }
        }
    }

    /// Restart the initialization plan on the current session
    pub fn reinitialize(&mut self) -> Result<()> {
        let session_id = self.session.as_ref().ok_or(ThermcamError::NoSession)?.id;

        self.scheduler.cancel();
        if self.is_measuring() {
            if let Err(e) = self.sink.stop_measurement() {
                warn!("Stopping measurement before reinitialize failed: {}", e);
            }
        }
        if self.is_previewing() {
            if let Err(e) = self.sink.stop_preview() {
                warn!("Stopping preview before reinitialize failed: {}", e);
            }
        }

        if let Some(session) = self.session.as_mut() {
            session.reset_flags();
        }
        self.set_state(SessionState::Initializing);

        let generation = self.scheduler.start(initialization_plan());
        info!(session_id = %session_id, generation, "Initialization plan restarted");
        Ok(())
    }

    pub fn start_measurement(&mut self) -> Result<()> {
        if !self.has_session() {
            return Err(ThermcamError::NoSession);
        }
        if !self.is_previewing() {
            return Err(ThermcamError::invalid_state(
                "measurement requires a running preview",
            ));
        }
        if self.is_measuring() {
            return Ok(());
        }

        self.sink
            .start_measurement()
            .map_err(|e| self.command_failed("start_measurement", e))?;

        if let Some(session) = self.session.as_mut() {
            session.measuring = true;
        }
        self.set_state(SessionState::Active);
        Ok(())
    }

    pub fn stop_measurement(&mut self) -> Result<()> {
        if !self.has_session() {
            return Err(ThermcamError::NoSession);
        }
        if !self.is_measuring() {
            return Ok(());
        }

        self.sink
            .stop_measurement()
            .map_err(|e| self.command_failed("stop_measurement", e))?;

        if let Some(session) = self.session.as_mut() {
            session.measuring = false;
        }
        self.set_state(SessionState::Previewing);
        Ok(())
    }

    /// Stop the preview (and measurement with it). Pending plan steps are
    /// cancelled; the control channel stays open.
    pub fn stop_preview(&mut self) -> Result<()> {
        if !self.has_session() {
            return Err(ThermcamError::NoSession);
        }

        self.scheduler.cancel();
        self.stop_measurement()?;

        if self.is_previewing() {
            self.sink
                .stop_preview()
                .map_err(|e| self.command_failed("stop_preview", e))?;
        }

        if let Some(session) = self.session.as_mut() {
            session.previewing = false;
        }
        self.set_state(SessionState::Connecting);
        Ok(())
    }

    fn run_step(&mut self, step: PlanStep) -> std::result::Result<(), CommandError> {
        match step {
            PlanStep::BindPreview => {
                let bounds = self.surface.bounds();
                self.surface.init_overlay(bounds.width(), bounds.height());
                self.surface.bind_assets(&self.assets);
                self.sink.start_preview(self.surface.preview_target())?;

                if let Some(session) = self.session.as_mut() {
                    session.previewing = true;
                }
                self.set_state(SessionState::Previewing);
            }
            PlanStep::SetControl { control, value } => {
                self.sink.set_control(control, value)?;
            }
            PlanStep::SelectPalette(index) => {
                self.sink.change_palette(index)?;
            }
            PlanStep::StartMeasurement => {
                // measurement may already have been started by hand
                if !self.is_measuring() {
                    self.sink.start_measurement()?;
                }

                if let Some(session) = self.session.as_mut() {
                    session.previewing = true;
                    session.measuring = true;
                }
                self.set_state(SessionState::Active);
            }
            PlanStep::SignalReady => {
                if let Some(session) = self.session.as_mut() {
                    session.ready = true;
                    info!(session_id = %session.id, "Camera {} ready", session.device);
                    let device = session.device.clone();
                    self.event_bus
                        .publish(ThermcamEvent::InitializationComplete {
                            device,
                            timestamp: SystemTime::now(),
                        });
                }
            }
        }
        Ok(())
    }

    /// Cancel the plan, close the handle and drop the session
    fn end_session(&mut self) -> Option<DeviceDescriptor> {
        self.scheduler.cancel();

        let Session {
            id,
            device,
            handle,
            state,
            ..
        } = self.session.take()?;

        self.sink.close(handle);
        info!(session_id = %id, "Closed {}", device);
        self.publish_transition(state, SessionState::Idle);
        Some(device)
    }

    fn is_previewing(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| session.previewing)
            .unwrap_or(false)
    }

    fn is_measuring(&self) -> bool {
        self.session
            .as_ref()
            .map(|session| session.measuring)
            .unwrap_or(false)
    }

    fn set_state(&mut self, to: SessionState) {
        let from = match self.session.as_mut() {
            Some(session) if session.state != to => {
                let from = session.state;
                session.state = to;
                from
            }
            _ => return,
        };
        self.publish_transition(from, to);
    }

    fn publish_transition(&self, from: SessionState, to: SessionState) {
        self.event_bus.publish(ThermcamEvent::StateChanged {
            from,
            to,
            timestamp: SystemTime::now(),
        });
    }

    fn command_failed(&self, step: &str, error: CommandError) -> ThermcamError {
        let error = ThermcamError::CommandFailed {
            step: step.to_string(),
            details: error.to_string(),
        };
        self.report(&error);
        error
    }

    fn report(&self, error: &ThermcamError) {
        self.event_bus.publish(ThermcamEvent::Error {
            kind: error.kind().to_string(),
            message: error.to_string(),
            timestamp: SystemTime::now(),
        });
    }
}
