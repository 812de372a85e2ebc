mod logging;
mod recording;
mod sink;

pub use logging::LoggingCommandSink;
pub use recording::{CommandKind, HeadlessSurface, IssuedCommand, RecordingCommandSink};
pub use sink::{
    AssetId, CameraControl, CommandSink, OverlayAssets, PreviewFormat, PreviewTarget,
    RenderSurface, SurfaceBounds,
};
