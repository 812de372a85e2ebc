use super::sink::{
    CameraControl, CommandSink, OverlayAssets, PreviewFormat, PreviewTarget, RenderSurface,
    SurfaceBounds,
};
use crate::device::ControlHandle;
use crate::error::CommandError;
use parking_lot::Mutex;
use serde::Serialize;
use std::collections::HashSet;
use std::sync::Arc;
use tokio::time::Instant;
use tracing::debug;

/// A command as observed by [`RecordingCommandSink`]
#[derive(Debug, Clone, PartialEq, Serialize)]
pub enum IssuedCommand {
    Open { handle_id: u64, format: PreviewFormat },
    Close { handle_id: u64 },
    SetControl { control: CameraControl, value: u32 },
    ChangePalette(u8),
    StartPreview(PreviewTarget),
    StopPreview,
    StartMeasurement,
    StopMeasurement,
}

impl IssuedCommand {
    pub fn kind(&self) -> CommandKind {
        match self {
            IssuedCommand::Open { .. } => CommandKind::Open,
            IssuedCommand::Close { .. } => CommandKind::Close,
            IssuedCommand::SetControl { .. } => CommandKind::SetControl,
            IssuedCommand::ChangePalette(_) => CommandKind::ChangePalette,
            IssuedCommand::StartPreview(_) => CommandKind::StartPreview,
            IssuedCommand::StopPreview => CommandKind::StopPreview,
            IssuedCommand::StartMeasurement => CommandKind::StartMeasurement,
            IssuedCommand::StopMeasurement => CommandKind::StopMeasurement,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandKind {
    Open,
    Close,
    SetControl,
    ChangePalette,
    StartPreview,
    StopPreview,
    StartMeasurement,
    StopMeasurement,
}

#[derive(Default)]
struct SinkState {
    timeline: Vec<(Instant, IssuedCommand)>,
    failing: HashSet<CommandKind>,
    open_handle: Option<u64>,
}

/// Command sink that records every command instead of driving hardware.
///
/// Clones share the same record, so a test can keep one clone while the
/// service owns another. Used by the `--simulate` CLI mode as well.
#[derive(Clone, Default)]
pub struct RecordingCommandSink {
    state: Arc<Mutex<SinkState>>,
}

impl RecordingCommandSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every later command of `kind` fail with a rejection
    pub fn fail_on(&self, kind: CommandKind) {
        self.state.lock().failing.insert(kind);
    }

    pub fn clear_failures(&self) {
        self.state.lock().failing.clear();
    }

    pub fn commands(&self) -> Vec<IssuedCommand> {
        self.state
            .lock()
            .timeline
            .iter()
            .map(|(_, command)| command.clone())
            .collect()
    }

    /// Commands with the (tokio) instant they were issued at
    pub fn timeline(&self) -> Vec<(Instant, IssuedCommand)> {
        self.state.lock().timeline.clone()
    }

    pub fn count(&self, kind: CommandKind) -> usize {
        self.state
            .lock()
            .timeline
            .iter()
            .filter(|(_, command)| command.kind() == kind)
            .count()
    }

    pub fn is_open(&self) -> bool {
        self.state.lock().open_handle.is_some()
    }

    fn issue(&self, command: IssuedCommand) -> Result<(), CommandError> {
        let mut state = self.state.lock();
        let kind = command.kind();

        debug!("Camera command: {:?}", command);
        state.timeline.push((Instant::now(), command));

        if state.failing.contains(&kind) {
            return Err(CommandError::Rejected(format!("{:?} rejected", kind)));
        }

        if kind != CommandKind::Open && state.open_handle.is_none() {
            return Err(CommandError::NotOpen);
        }

        Ok(())
    }
}

impl CommandSink for RecordingCommandSink {
    fn open(&mut self, handle: &ControlHandle, format: PreviewFormat) -> Result<(), CommandError> {
        self.issue(IssuedCommand::Open {
            handle_id: handle.id(),
            format,
        })?;
        self.state.lock().open_handle = Some(handle.id());
        Ok(())
    }

    fn close(&mut self, handle: ControlHandle) {
        {
            let mut state = self.state.lock();
            debug!("Camera command: Close {}", handle.id());
            state.timeline.push((
                Instant::now(),
                IssuedCommand::Close {
                    handle_id: handle.id(),
                },
            ));
            if state.open_handle == Some(handle.id()) {
                state.open_handle = None;
            }
        }
        drop(handle);
    }

    fn set_control(&mut self, control: CameraControl, value: u32) -> Result<(), CommandError> {
        self.issue(IssuedCommand::SetControl { control, value })
    }

    fn change_palette(&mut self, index: u8) -> Result<(), CommandError> {
        self.issue(IssuedCommand::ChangePalette(index))
    }

    fn start_preview(&mut self, target: PreviewTarget) -> Result<(), CommandError> {
        self.issue(IssuedCommand::StartPreview(target))
    }

    fn stop_preview(&mut self) -> Result<(), CommandError> {
        self.issue(IssuedCommand::StopPreview)
    }

    fn start_measurement(&mut self) -> Result<(), CommandError> {
        self.issue(IssuedCommand::StartMeasurement)
    }

    fn stop_measurement(&mut self) -> Result<(), CommandError> {
        self.issue(IssuedCommand::StopMeasurement)
    }
}

#[derive(Default)]
struct SurfaceState {
    overlay_size: Option<(u32, u32)>,
    assets: Option<OverlayAssets>,
}

/// Off-screen surface with fixed bounds
#[derive(Clone)]
pub struct HeadlessSurface {
    bounds: SurfaceBounds,
    surface_id: u64,
    state: Arc<Mutex<SurfaceState>>,
}

impl HeadlessSurface {
    pub fn new(width: u32, height: u32) -> Self {
        Self {
            bounds: SurfaceBounds::from_size(width, height),
            surface_id: 1,
            state: Arc::new(Mutex::new(SurfaceState::default())),
        }
    }

    pub fn overlay_size(&self) -> Option<(u32, u32)> {
        self.state.lock().overlay_size
    }

    pub fn bound_assets(&self) -> Option<OverlayAssets> {
        self.state.lock().assets.clone()
    }
}

impl RenderSurface for HeadlessSurface {
    fn bounds(&self) -> SurfaceBounds {
        self.bounds
    }

    fn init_overlay(&mut self, width: u32, height: u32) {
        self.state.lock().overlay_size = Some((width, height));
    }

    fn bind_assets(&mut self, assets: &OverlayAssets) {
        self.state.lock().assets = Some(assets.clone());
    }

    fn preview_target(&self) -> PreviewTarget {
        PreviewTarget {
            surface_id: self.surface_id,
            width: self.bounds.width(),
            height: self.bounds.height(),
        }
    }
}
