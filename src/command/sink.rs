use crate::config::PreviewConfig;
use crate::device::ControlHandle;
use crate::error::CommandError;
use serde::{Deserialize, Serialize};

/// Hardware controls the session writes during initialization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CameraControl {
    /// UVC camera terminal zoom (absolute); the thermal firmware uses it as
    /// a calibration register
    ZoomAbsolute,
}

impl CameraControl {
    /// UVC control selector
    pub fn selector(&self) -> u8 {
        match self {
            CameraControl::ZoomAbsolute => 0x0b,
        }
    }
}

/// Stream parameters handed to the driver when the channel is opened
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct PreviewFormat {
    pub width: u32,
    pub height: u32,
    pub mirror: bool,
    pub bandwidth: f64,
}

impl From<&PreviewConfig> for PreviewFormat {
    fn from(config: &PreviewConfig) -> Self {
        Self {
            width: config.resolution.0,
            height: config.resolution.1,
            mirror: config.mirror,
            bandwidth: config.bandwidth,
        }
    }
}

/// Raw binding for the surface frames are rendered into
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreviewTarget {
    pub surface_id: u64,
    pub width: u32,
    pub height: u32,
}

/// View bounds of the rendering surface in layout coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SurfaceBounds {
    pub left: i32,
    pub top: i32,
    pub right: i32,
    pub bottom: i32,
}

impl SurfaceBounds {
    pub fn from_size(width: u32, height: u32) -> Self {
        Self {
            left: 0,
            top: 0,
            right: width as i32,
            bottom: height as i32,
        }
    }

    pub fn width(&self) -> u32 {
        (self.right - self.left).max(0) as u32
    }

    pub fn height(&self) -> u32 {
        (self.bottom - self.top).max(0) as u32
    }
}

/// Identity of a bitmap asset loaded by the host application
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AssetId(pub String);

impl From<&str> for AssetId {
    fn from(name: &str) -> Self {
        AssetId(name.to_string())
    }
}

/// Cursor markers and watermark drawn over the thermal image
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OverlayAssets {
    pub cursor_red: AssetId,
    pub cursor_green: AssetId,
    pub cursor_blue: AssetId,
    pub cursor_yellow: AssetId,
    pub watermark: AssetId,
}

impl Default for OverlayAssets {
    fn default() -> Self {
        Self {
            cursor_red: "cursor_red".into(),
            cursor_green: "cursor_green".into(),
            cursor_blue: "cursor_blue".into(),
            cursor_yellow: "cursor_yellow".into(),
            watermark: "watermark".into(),
        }
    }
}

/// Commands accepted by the camera driver layer.
///
/// Every call runs on the service task; implementations must not block for
/// longer than a single control transfer.
pub trait CommandSink: Send + 'static {
    fn open(&mut self, handle: &ControlHandle, format: PreviewFormat) -> Result<(), CommandError>;

    /// Close the channel and release the handle
    fn close(&mut self, handle: ControlHandle);

    fn set_control(&mut self, control: CameraControl, value: u32) -> Result<(), CommandError>;

    fn change_palette(&mut self, index: u8) -> Result<(), CommandError>;

    fn start_preview(&mut self, target: PreviewTarget) -> Result<(), CommandError>;

    fn stop_preview(&mut self) -> Result<(), CommandError>;

    fn start_measurement(&mut self) -> Result<(), CommandError>;

    fn stop_measurement(&mut self) -> Result<(), CommandError>;
}

/// The view thermal frames are rendered into
pub trait RenderSurface: Send + 'static {
    fn bounds(&self) -> SurfaceBounds;

    /// Allocate the temperature overlay for the given view size
    fn init_overlay(&mut self, width: u32, height: u32);

    fn bind_assets(&mut self, assets: &OverlayAssets);

    fn preview_target(&self) -> PreviewTarget;
}
