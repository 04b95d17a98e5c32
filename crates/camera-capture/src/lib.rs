//! RGB-D Camera Capture
//!
//! Connects a depth camera's per-frame callbacks to the Frame Rings:
//! - Color producer: converts each color frame into the Staging Ring
//! - Depth producer: pairs each depth frame with the newest staged color
//! - Device session: owns the driver, its callbacks and stream lifetime
//!
//! Drivers plug in through the [`DepthCamera`] trait. A synthetic
//! test-pattern camera and a caller-driven fake ship with the crate;
//! the native adapter is behind the `openni` feature.

pub mod camera;
pub mod frame;
pub mod manual;
pub mod producer;
pub mod synthetic;

#[cfg(feature = "openni")]
pub mod ffi;

pub use camera::{ColorCallback, DepthCallback, DepthCamera, DeviceSession};
pub use frame::{ColorImage, DepthImage, PixelFormat};
pub use manual::{ManualCamera, ManualFeed};
pub use producer::{now_micros, ProducerCounts, Producers};
pub use synthetic::{SyntheticCamera, SyntheticConfig};

use ring_buffer::{FrameGeometry, RingError};
use thiserror::Error;

/// Camera error types
#[derive(Error, Debug)]
pub enum CameraError {
    #[error("Failed to open camera: {0}")]
    Open(String),

    #[error("Invalid format: {0}")]
    Format(String),

    #[error("Frame is {actual:?}, session expects {expected:?}")]
    Geometry {
        expected: FrameGeometry,
        actual: FrameGeometry,
    },

    #[error("Streaming error: {0}")]
    Stream(String),

    #[error("No {0} callback registered")]
    MissingCallback(&'static str),

    #[error("Not supported by this device: {0}")]
    Unsupported(&'static str),

    #[error("Frame ring error: {0}")]
    Ring(#[from] RingError),
}
