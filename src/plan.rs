use crate::command::CameraControl;
use crate::scheduler::ScheduledStep;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::Duration;

/// Value written to the zoom control right after the preview starts
pub const CALIBRATION_ZOOM_VALUE: u32 = 0x8004;

/// Palette the preview is switched to during initialization
pub const INITIAL_PALETTE: u8 = 2;

pub const BIND_PREVIEW_DELAY: Duration = Duration::from_millis(500);
pub const CALIBRATE_DELAY: Duration = Duration::from_millis(300);
pub const PALETTE_DELAY: Duration = Duration::from_millis(300);
pub const MEASUREMENT_DELAY: Duration = Duration::from_millis(1000);
pub const READY_DELAY: Duration = Duration::from_millis(500);

/// Actions of the initialization plan
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlanStep {
    /// Size the overlay from the view, bind overlay assets, start the preview
    BindPreview,
    SetControl { control: CameraControl, value: u32 },
    SelectPalette(u8),
    StartMeasurement,
    /// Initialization finished; the host may dismiss its loading indicator
    SignalReady,
}

impl PlanStep {
    pub fn name(&self) -> &'static str {
        match self {
            PlanStep::BindPreview => "bind_preview",
            PlanStep::SetControl { .. } => "set_control",
            PlanStep::SelectPalette(_) => "select_palette",
            PlanStep::StartMeasurement => "start_measurement",
            PlanStep::SignalReady => "signal_ready",
        }
    }
}

impl fmt::Display for PlanStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PlanStep::SetControl { control, value } => {
                write!(f, "set_control({:?}={:#06x})", control, value)
            }
            PlanStep::SelectPalette(index) => write!(f, "select_palette({})", index),
            other => f.write_str(other.name()),
        }
    }
}

/// The fixed plan run once per session, with settle-time between steps
pub fn initialization_plan() -> Vec<ScheduledStep<PlanStep>> {
    vec![
        ScheduledStep::new(BIND_PREVIEW_DELAY, PlanStep::BindPreview),
        ScheduledStep::new(
            CALIBRATE_DELAY,
            PlanStep::SetControl {
                control: CameraControl::ZoomAbsolute,
                value: CALIBRATION_ZOOM_VALUE,
            },
        ),
        ScheduledStep::new(PALETTE_DELAY, PlanStep::SelectPalette(INITIAL_PALETTE)),
        ScheduledStep::new(MEASUREMENT_DELAY, PlanStep::StartMeasurement),
        ScheduledStep::new(READY_DELAY, PlanStep::SignalReady),
    ]
}

/// Sum of all plan delays
pub fn plan_duration() -> Duration {
    initialization_plan().iter().map(|step| step.delay).sum()
}
