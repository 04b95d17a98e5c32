//! Live preview reader

use image::{GrayImage, RgbImage};
use ring_buffer::{FrameRing, FrameSnapshot, NO_FRAME};
use std::collections::VecDeque;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::debug;

/// Inter-frame intervals averaged for the displayed frame rate
pub const FPS_WINDOW: usize = 15;

/// Samples the newest paired frame for display.
///
/// Reads never block the producers or the writer. A read that races an
/// overwrite is discarded and retried on the next poll.
pub struct LivePreview {
    frames: Arc<FrameRing>,
    snapshot: FrameSnapshot,
    last_index: i64,
    last_arrival: Option<Instant>,
    intervals: VecDeque<Duration>,
}

impl LivePreview {
    pub fn new(frames: Arc<FrameRing>) -> Self {
        let snapshot = FrameSnapshot::new(frames.geometry());
        Self {
            frames,
            snapshot,
            last_index: NO_FRAME,
            last_arrival: None,
            intervals: VecDeque::with_capacity(FPS_WINDOW),
        }
    }

    /// Copy the newest frame if it changed since the last poll
    pub fn poll(&mut self) -> Option<&FrameSnapshot> {
        let latest = self.frames.latest_index();
        if latest == NO_FRAME || latest == self.last_index {
            return None;
        }
        if let Err(e) = self.frames.read(latest, &mut self.snapshot) {
            debug!("Preview skipped frame {}: {}", latest, e);
            return None;
        }
        self.last_index = latest;
        self.record_arrival(Instant::now());
        Some(&self.snapshot)
    }

    fn record_arrival(&mut self, now: Instant) {
        if let Some(previous) = self.last_arrival {
            if self.intervals.len() == FPS_WINDOW {
                self.intervals.pop_front();
            }
            self.intervals.push_back(now.saturating_duration_since(previous));
        }
        self.last_arrival = Some(now);
    }

    /// Rolling frame rate over the last [`FPS_WINDOW`] intervals
    pub fn fps(&self) -> f64 {
        let total: Duration = self.intervals.iter().sum();
        if self.intervals.is_empty() || total.is_zero() {
            return 0.0;
        }
        self.intervals.len() as f64 / total.as_secs_f64()
    }

    /// Index of the frame last returned by [`poll`](Self::poll)
    pub fn last_index(&self) -> i64 {
        self.last_index
    }

    pub fn snapshot(&self) -> Option<&FrameSnapshot> {
        (self.last_index != NO_FRAME).then_some(&self.snapshot)
    }

    /// Color plane of the current snapshot
    pub fn color_image(&self) -> Option<RgbImage> {
        let geometry = self.frames.geometry();
        let snapshot = self.snapshot()?;
        RgbImage::from_raw(geometry.width, geometry.height, snapshot.color.clone())
    }

    /// Depth plane stretched between its minimum and maximum sample
    pub fn depth_image(&self) -> Option<GrayImage> {
        let geometry = self.frames.geometry();
        let snapshot = self.snapshot()?;

        let (min, max) = snapshot
            .depth_samples()
            .fold((u16::MAX, u16::MIN), |(lo, hi), s| (lo.min(s), hi.max(s)));
        let range = u32::from(max.saturating_sub(min));
        let pixels = snapshot
            .depth_samples()
            .map(|s| {
                if range == 0 {
                    0
                } else {
                    (u32::from(s - min) * 255 / range) as u8
                }
            })
            .collect();
        GrayImage::from_raw(geometry.width, geometry.height, pixels)
    }
}
