//! Frame Rings for RGB-D capture
//!
//! Fixed-size rings of preallocated frame slots shared between the
//! sensor callbacks (one writer per ring), the log writer and the live
//! preview. Only the two "latest index" counters are mutex-guarded;
//! slot contents are published by advancing the index after the copy
//! completes, and readers validate what they copied against a per-slot
//! sequence counter.

mod buffer;
mod guarded;
mod slot;

pub use buffer::{FrameRing, FrameSnapshot, StagingRing};
pub use guarded::GuardedScalar;
pub use slot::slot_of;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Number of slots in every ring
pub const RING_CAPACITY: usize = 10;

/// Index value meaning "nothing published yet"
pub const NO_FRAME: i64 = -1;

/// Ring access errors
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum RingError {
    /// No frame has been published
    #[error("No frame published yet")]
    NoFrame,

    /// The slot has been reused for a newer frame
    #[error("Frame {index} was overwritten (slot now holds {generation})")]
    Overwritten { index: i64, generation: i64 },

    /// A producer wrote to the slot while it was being copied
    #[error("Frame {index} was torn by a concurrent write")]
    Torn { index: i64 },

    /// Buffer length does not match the ring's plane size
    #[error("Plane size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

/// Frame dimensions shared by every slot in a session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FrameGeometry {
    pub width: u32,
    pub height: u32,
}

impl FrameGeometry {
    /// 640x480, the resolution the log format assumes
    pub const VGA: FrameGeometry = FrameGeometry {
        width: 640,
        height: 480,
    };

    /// Create a geometry
    pub fn new(width: u32, height: u32) -> Self {
        Self { width, height }
    }

    /// Number of pixels per frame
    pub fn pixels(&self) -> usize {
        self.width as usize * self.height as usize
    }

    /// Raw depth plane size (16-bit samples)
    pub fn depth_len(&self) -> usize {
        self.pixels() * 2
    }

    /// RGB24 color plane size
    pub fn color_len(&self) -> usize {
        self.pixels() * 3
    }
}

impl Default for FrameGeometry {
    fn default() -> Self {
        Self::VGA
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_vga_plane_sizes() {
        let geometry = FrameGeometry::default();
        assert_eq!(geometry.depth_len(), 640 * 480 * 2);
        assert_eq!(geometry.color_len(), 640 * 480 * 3);
    }
}
