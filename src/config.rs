use crate::device::{DeviceSignature, THERMAL_DEVICE_CLASS, THERMAL_DEVICE_SUBCLASS};
use config::{Config, ConfigError, Environment, File};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;
use tracing::{debug, info};

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct ThermcamConfig {
    pub device: DeviceConfig,
    pub preview: PreviewConfig,
    pub system: SystemConfig,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct DeviceConfig {
    /// USB device class the camera declares
    #[serde(default = "default_device_class")]
    pub class: u8,

    /// USB device subclass the camera declares
    #[serde(default = "default_device_subclass")]
    pub subclass: u8,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct PreviewConfig {
    /// Sensor frame size (width, height)
    #[serde(default = "default_preview_resolution")]
    pub resolution: (u32, u32),

    /// Mirror the preview horizontally
    #[serde(default = "default_preview_mirror")]
    pub mirror: bool,

    /// Fraction of the USB bandwidth requested for the stream (0, 1]
    #[serde(default = "default_preview_bandwidth")]
    pub bandwidth: f64,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct SystemConfig {
    /// Event bus capacity
    #[serde(default = "default_event_bus_capacity")]
    pub event_bus_capacity: usize,

    /// Capacity of the application request queue
    #[serde(default = "default_request_queue_capacity")]
    pub request_queue_capacity: usize,

    /// Upper bound for the shutdown sequence in milliseconds
    #[serde(default = "default_shutdown_timeout_ms")]
    pub shutdown_timeout_ms: u64,
}

impl DeviceConfig {
    pub fn signature(&self) -> DeviceSignature {
        DeviceSignature {
            class: self.class,
            subclass: self.subclass,
        }
    }
}

impl SystemConfig {
    pub fn shutdown_timeout(&self) -> Duration {
        Duration::from_millis(self.shutdown_timeout_ms)
    }
}

impl ThermcamConfig {
    /// Load configuration from default sources (file + environment variables)
    pub fn load() -> Result<Self, ConfigError> {
        Self::load_from_file("thermcam.toml")
    }

    /// Load configuration from a specific file path
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self, ConfigError> {
        let path_str = path.as_ref().to_string_lossy();
        debug!("Loading configuration from: {}", path_str);

        let settings = Config::builder()
            .set_default("device.class", default_device_class() as i64)?
            .set_default("device.subclass", default_device_subclass() as i64)?
            .set_default(
                "preview.resolution",
                vec![default_preview_resolution().0, default_preview_resolution().1],
            )?
            .set_default("preview.mirror", default_preview_mirror())?
            .set_default("preview.bandwidth", default_preview_bandwidth())?
            .set_default(
                "system.event_bus_capacity",
                default_event_bus_capacity() as i64,
            )?
            .set_default(
                "system.request_queue_capacity",
                default_request_queue_capacity() as i64,
            )?
            .set_default(
                "system.shutdown_timeout_ms",
                default_shutdown_timeout_ms() as i64,
            )?
            .add_source(File::with_name(&path_str).required(false))
            // THERMCAM_SYSTEM__EVENT_BUS_CAPACITY=128
            .add_source(
                Environment::with_prefix("THERMCAM")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let config: ThermcamConfig = settings.try_deserialize()?;

        info!("Configuration loaded successfully");
        debug!("Final configuration: {:#?}", config);

        Ok(config)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.preview.resolution.0 == 0 || self.preview.resolution.1 == 0 {
            return Err(ConfigError::Message(
                "Preview resolution must be greater than 0".to_string(),
            ));
        }

        if !(self.preview.bandwidth > 0.0 && self.preview.bandwidth <= 1.0) {
            return Err(ConfigError::Message(
                "Preview bandwidth must be in the range (0, 1]".to_string(),
            ));
        }

        if self.system.event_bus_capacity == 0 {
            return Err(ConfigError::Message(
                "Event bus capacity must be greater than 0".to_string(),
            ));
        }

        if self.system.request_queue_capacity == 0 {
            return Err(ConfigError::Message(
                "Request queue capacity must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    /// Render the configuration as TOML
    pub fn to_toml(&self) -> Result<String, toml::ser::Error> {
        toml::to_string_pretty(self)
    }
}

impl Default for ThermcamConfig {
    fn default() -> Self {
        Self {
            device: DeviceConfig {
                class: default_device_class(),
                subclass: default_device_subclass(),
            },
            preview: PreviewConfig {
                resolution: default_preview_resolution(),
                mirror: default_preview_mirror(),
                bandwidth: default_preview_bandwidth(),
            },
            system: SystemConfig {
                event_bus_capacity: default_event_bus_capacity(),
                request_queue_capacity: default_request_queue_capacity(),
                shutdown_timeout_ms: default_shutdown_timeout_ms(),
            },
        }
    }
}

// Default value functions
fn default_device_class() -> u8 {
    THERMAL_DEVICE_CLASS
}
fn default_device_subclass() -> u8 {
    THERMAL_DEVICE_SUBCLASS
}

fn default_preview_resolution() -> (u32, u32) {
    (256, 192)
}
fn default_preview_mirror() -> bool {
    true
}
fn default_preview_bandwidth() -> f64 {
    1.0
}

fn default_event_bus_capacity() -> usize {
    64
}
fn default_request_queue_capacity() -> usize {
    16
}
fn default_shutdown_timeout_ms() -> u64 {
    3000
}
