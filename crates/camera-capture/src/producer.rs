//! Color and depth producers

use crate::{CameraError, ColorImage, DepthImage};
use ring_buffer::{FrameGeometry, FrameRing, RingError, StagingRing, NO_FRAME};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tracing::{debug, warn};

/// Wall-clock time in microseconds since the Unix epoch
pub fn now_micros() -> i64 {
    chrono::Utc::now().timestamp_micros()
}

/// Point-in-time copy of the producer counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerCounts {
    pub color_published: u64,
    pub depth_published: u64,
    /// Depth frames dropped because no color frame existed yet
    pub depth_unpaired: u64,
    /// Frames refused for wrong dimensions or short buffers
    pub rejected: u64,
    /// Depth frames dropped because the staged color was overwritten mid-copy
    pub color_torn: u64,
}

#[derive(Debug, Default)]
struct Counters {
    color_published: AtomicU64,
    depth_published: AtomicU64,
    depth_unpaired: AtomicU64,
    rejected: AtomicU64,
    color_torn: AtomicU64,
}

/// Publishes driver frames into the Staging and Frame Rings.
///
/// `publish_color` must only ever run on one thread at a time, and the
/// same holds for `publish_depth`; the two may run concurrently.
pub struct Producers {
    staging: Arc<StagingRing>,
    frames: Arc<FrameRing>,
    geometry: FrameGeometry,
    counters: Counters,
}

impl Producers {
    /// Allocate both rings for `geometry`
    pub fn new(geometry: FrameGeometry) -> Self {
        Self {
            staging: Arc::new(StagingRing::new(geometry)),
            frames: Arc::new(FrameRing::new(geometry)),
            geometry,
            counters: Counters::default(),
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        self.geometry
    }

    /// The paired Frame Ring, for the writer and live preview
    pub fn frames(&self) -> Arc<FrameRing> {
        Arc::clone(&self.frames)
    }

    pub fn staging(&self) -> Arc<StagingRing> {
        Arc::clone(&self.staging)
    }

    /// Copy a color frame into the next staging slot and publish it
    pub fn publish_color(&self, image: &ColorImage<'_>, timestamp_us: i64) -> Result<i64, CameraError> {
        self.check_geometry(image.geometry())?;
        let index = self
            .staging
            .publish(timestamp_us, |color| image.write_rgb24(color))
            .map_err(|e| {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                e
            })?;
        self.counters.color_published.fetch_add(1, Ordering::Relaxed);
        Ok(index)
    }

    /// Pair a depth frame with the newest staged color and publish it.
    ///
    /// Returns `Ok(None)` when no color frame has completed yet; the
    /// depth frame is dropped and the Frame Ring index does not move.
    pub fn publish_depth(
        &self,
        image: &DepthImage<'_>,
        timestamp_us: i64,
    ) -> Result<Option<i64>, CameraError> {
        self.check_geometry(image.geometry())?;

        let color_index = self.staging.latest_index();
        if color_index == NO_FRAME {
            self.counters.depth_unpaired.fetch_add(1, Ordering::Relaxed);
            return Ok(None);
        }

        let result = self.frames.publish(timestamp_us, |depth, color| {
            image.write_le(depth)?;
            self.staging.read_color(color_index, color)?;
            Ok::<(), CameraError>(())
        });

        match result {
            Ok(index) => {
                self.counters.depth_published.fetch_add(1, Ordering::Relaxed);
                Ok(Some(index))
            }
            Err(e) if is_torn(&e) => {
                self.counters.color_torn.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
            Err(e) => {
                self.counters.rejected.fetch_add(1, Ordering::Relaxed);
                Err(e)
            }
        }
    }

    /// Driver callback for a completed color frame
    pub fn on_color_frame(&self, image: ColorImage<'_>) {
        if let Err(e) = self.publish_color(&image, now_micros()) {
            warn!("Dropping color frame: {}", e);
        }
    }

    /// Driver callback for a completed depth frame
    pub fn on_depth_frame(&self, image: DepthImage<'_>) {
        match self.publish_depth(&image, now_micros()) {
            Ok(Some(_)) => {}
            Ok(None) => debug!("Depth frame before any color frame, dropped"),
            Err(e) => warn!("Dropping depth frame: {}", e),
        }
    }

    pub fn counts(&self) -> ProducerCounts {
        ProducerCounts {
            color_published: self.counters.color_published.load(Ordering::Relaxed),
            depth_published: self.counters.depth_published.load(Ordering::Relaxed),
            depth_unpaired: self.counters.depth_unpaired.load(Ordering::Relaxed),
            rejected: self.counters.rejected.load(Ordering::Relaxed),
            color_torn: self.counters.color_torn.load(Ordering::Relaxed),
        }
    }

    fn check_geometry(&self, actual: FrameGeometry) -> Result<(), CameraError> {
        if actual != self.geometry {
            self.counters.rejected.fetch_add(1, Ordering::Relaxed);
            return Err(CameraError::Geometry {
                expected: self.geometry,
                actual,
            });
        }
        Ok(())
    }
}

/// Staged color was rewritten while it was being copied
fn is_torn(e: &CameraError) -> bool {
    matches!(
        e,
        CameraError::Ring(RingError::Overwritten { .. } | RingError::Torn { .. })
    )
}
