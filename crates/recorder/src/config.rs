//! Recorder configuration

use crate::RecorderError;
use ::config::{Config, Environment, File};
use camera_capture::SyntheticConfig;
use ring_buffer::FrameGeometry;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use storage::WriterConfig;

/// Config file looked up in the working directory when none is given
pub const DEFAULT_CONFIG_FILE: &str = "rgbd-logger";

/// Prefix for environment overrides, e.g. `RGBD_OUTPUT_PATH`,
/// `RGBD_WRITER__JPEG_QUALITY`
pub const ENV_PREFIX: &str = "RGBD";

/// Which camera driver to open
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DeviceKind {
    /// Built-in moving test pattern
    Synthetic,
    /// Native driver shim (`openni` feature)
    Native,
}

/// Logging configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct LogConfig {
    /// Default filter directive; `RUST_LOG` takes precedence
    pub level: String,
    /// Emit JSON lines instead of human-readable output
    pub json: bool,
}

impl Default for LogConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            json: false,
        }
    }
}

/// Recorder configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RecorderConfig {
    pub device: DeviceKind,

    /// Zero-based index for native devices
    pub device_index: u32,

    /// Frame size of both streams
    pub geometry: FrameGeometry,

    /// Synthetic stream rates
    pub color_fps: u32,
    pub depth_fps: u32,

    /// Log file to record into
    pub output_path: PathBuf,

    /// Stop after this many seconds; record until Ctrl-C when unset
    pub record_seconds: Option<u64>,

    /// Re-read and decode the file after recording
    pub verify: bool,

    pub writer: WriterConfig,

    pub log: LogConfig,
}

impl Default for RecorderConfig {
    fn default() -> Self {
        Self {
            device: DeviceKind::Synthetic,
            device_index: 0,
            geometry: FrameGeometry::VGA,
            color_fps: 30,
            depth_fps: 30,
            output_path: PathBuf::from("capture.klg"),
            record_seconds: None,
            verify: false,
            writer: WriterConfig::default(),
            log: LogConfig::default(),
        }
    }
}

impl RecorderConfig {
    /// Load defaults, then the config file, then `RGBD_` environment
    /// variables. `path` must exist when given; otherwise
    /// `rgbd-logger.{toml,json,yaml,..}` is optional.
    pub fn load(path: Option<&Path>) -> Result<Self, RecorderError> {
        Self::load_with(path, Self::environment())
    }

    fn environment() -> Environment {
        Environment::with_prefix(ENV_PREFIX)
            .prefix_separator("_")
            .separator("__")
            .try_parsing(true)
    }

    fn load_with(path: Option<&Path>, environment: Environment) -> Result<Self, RecorderError> {
        let file = match path {
            Some(path) => File::from(path).required(true),
            None => File::with_name(DEFAULT_CONFIG_FILE).required(false),
        };
        let settings = Config::builder()
            .add_source(file)
            .add_source(environment)
            .build()?;
        Ok(settings.try_deserialize()?)
    }

    /// Settings for the synthetic camera
    pub fn synthetic(&self) -> SyntheticConfig {
        SyntheticConfig {
            geometry: self.geometry,
            color_fps: self.color_fps,
            depth_fps: self.depth_fps,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::tempdir;

    fn no_env() -> Environment {
        Environment::with_prefix(ENV_PREFIX).source(Some(::config::Map::new()))
    }

    #[test]
    fn test_defaults_without_file() {
        let config = RecorderConfig::load_with(None, no_env()).unwrap();
        assert_eq!(config, RecorderConfig::default());
        assert_eq!(config.writer.jpeg_quality, 90);
        assert_eq!(config.geometry, FrameGeometry::VGA);
    }

    #[test]
    fn test_file_overrides_defaults() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("logger.toml");
        fs::write(
            &path,
            r#"
output_path = "/tmp/run.klg"
record_seconds = 5

[geometry]
width = 320
height = 240

[writer]
jpeg_quality = 75
"#,
        )
        .unwrap();

        let config = RecorderConfig::load_with(Some(&path), no_env()).unwrap();
        assert_eq!(config.output_path, PathBuf::from("/tmp/run.klg"));
        assert_eq!(config.record_seconds, Some(5));
        assert_eq!(config.geometry, FrameGeometry::new(320, 240));
        assert_eq!(config.writer.jpeg_quality, 75);
        assert_eq!(config.writer.poll_interval_ms, 1);
        assert_eq!(config.device, DeviceKind::Synthetic);
    }

    #[test]
    fn test_environment_overrides_file() {
        let mut vars = ::config::Map::new();
        vars.insert("RGBD_DEVICE".to_string(), "native".to_string());
        vars.insert("RGBD_WRITER__JPEG_QUALITY".to_string(), "60".to_string());
        let environment = RecorderConfig::environment().source(Some(vars));

        let config = RecorderConfig::load_with(None, environment).unwrap();
        assert_eq!(config.device, DeviceKind::Native);
        assert_eq!(config.writer.jpeg_quality, 60);
    }

    #[test]
    fn test_missing_explicit_file_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(
            RecorderConfig::load_with(Some(&path), no_env()),
            Err(RecorderError::Config(_))
        ));
    }
}
