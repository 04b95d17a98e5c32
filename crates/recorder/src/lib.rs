//! RGB-D Logger
//!
//! Wires a depth camera session to the background frame writer and a
//! live preview reader:
//! - [`Logger`]: owns the device session and the writer
//! - [`LivePreview`]: samples the newest paired frame for display
//! - [`RecorderConfig`]: layered file + environment configuration

pub mod config;
pub mod live;
pub mod logger;
pub mod logging;

pub use config::{DeviceKind, LogConfig, RecorderConfig};
pub use live::LivePreview;
pub use logger::Logger;
pub use logging::init_logging;

use camera_capture::CameraError;
use storage::StorageError;
use thiserror::Error;

/// Recorder errors
#[derive(Error, Debug)]
pub enum RecorderError {
    #[error("Configuration error: {0}")]
    Config(#[from] ::config::ConfigError),

    #[error("Logging setup failed: {0}")]
    Logging(String),

    #[error("Camera error: {0}")]
    Camera(#[from] CameraError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Device '{0}' is not available in this build")]
    DeviceUnavailable(String),
}
