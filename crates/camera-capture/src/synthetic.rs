//! Synthetic test-pattern camera

use crate::{CameraError, ColorCallback, ColorImage, DepthCallback, DepthCamera, DepthImage};
use ring_buffer::FrameGeometry;
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};
use tracing::{debug, error, info};

/// Synthetic camera configuration
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SyntheticConfig {
    /// Frame size of both streams
    pub geometry: FrameGeometry,
    /// Color stream rate
    pub color_fps: u32,
    /// Depth stream rate
    pub depth_fps: u32,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            geometry: FrameGeometry::VGA,
            color_fps: 30,
            depth_fps: 30,
        }
    }
}

struct Streams {
    shutdown: Arc<AtomicBool>,
    color: JoinHandle<ColorCallback>,
    depth: JoinHandle<DepthCallback>,
}

/// A camera that generates moving gradients on two stream threads
pub struct SyntheticCamera {
    config: SyntheticConfig,
    color_callback: Option<ColorCallback>,
    depth_callback: Option<DepthCallback>,
    streams: Option<Streams>,
}

impl SyntheticCamera {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config,
            color_callback: None,
            depth_callback: None,
            streams: None,
        }
    }
}

fn frame_interval(fps: u32) -> Duration {
    Duration::from_micros(1_000_000 / u64::from(fps.max(1)))
}

/// Run `step` every `interval` until `shutdown` is set
fn pace(shutdown: &AtomicBool, interval: Duration, mut step: impl FnMut(u32)) {
    let mut next = Instant::now();
    let mut frame = 0u32;
    while !shutdown.load(Ordering::Relaxed) {
        step(frame);
        frame = frame.wrapping_add(1);

        next += interval;
        let now = Instant::now();
        if next > now {
            thread::sleep(next - now);
        } else {
            next = now;
        }
    }
}

fn fill_color(rgb: &mut [u8], geometry: FrameGeometry, frame: u32) {
    let width = geometry.width as usize;
    for (i, pixel) in rgb.chunks_exact_mut(3).enumerate() {
        let (x, y) = (i % width, i / width);
        pixel[0] = (x as u32).wrapping_add(frame) as u8;
        pixel[1] = y as u8;
        pixel[2] = frame.wrapping_mul(3) as u8;
    }
}

fn fill_depth(depth: &mut [u16], geometry: FrameGeometry, frame: u32) {
    let width = geometry.width.max(1);
    let shift = frame.wrapping_mul(4) % width;
    for (i, sample) in depth.iter_mut().enumerate() {
        let x = i as u32 % width;
        // 0.5 m .. 4.5 m ramp drifting sideways
        let offset = (x + shift) % width;
        *sample = (500 + offset * 4000 / width) as u16;
    }
}

impl DepthCamera for SyntheticCamera {
    fn description(&self) -> String {
        format!(
            "synthetic {}x{} color@{} depth@{}",
            self.config.geometry.width,
            self.config.geometry.height,
            self.config.color_fps,
            self.config.depth_fps
        )
    }

    fn register_color_callback(&mut self, callback: ColorCallback) {
        self.color_callback = Some(callback);
    }

    fn register_depth_callback(&mut self, callback: DepthCallback) {
        self.depth_callback = Some(callback);
    }

    fn start_streams(&mut self) -> Result<(), CameraError> {
        if self.streams.is_some() {
            return Ok(());
        }
        let mut color_callback = self
            .color_callback
            .take()
            .ok_or(CameraError::MissingCallback("color"))?;
        let mut depth_callback = match self.depth_callback.take() {
            Some(cb) => cb,
            None => {
                self.color_callback = Some(color_callback);
                return Err(CameraError::MissingCallback("depth"));
            }
        };

        let shutdown = Arc::new(AtomicBool::new(false));
        let geometry = self.config.geometry;

        let color_shutdown = Arc::clone(&shutdown);
        let color_interval = frame_interval(self.config.color_fps);
        let color = thread::Builder::new()
            .name("synthetic-color".to_string())
            .spawn(move || {
                let mut rgb = vec![0u8; geometry.color_len()];
                pace(&color_shutdown, color_interval, |frame| {
                    fill_color(&mut rgb, geometry, frame);
                    color_callback(ColorImage::rgb(&rgb, geometry.width, geometry.height));
                });
                color_callback
            })
            .map_err(|e| CameraError::Stream(e.to_string()))?;

        let depth_shutdown = Arc::clone(&shutdown);
        let depth_interval = frame_interval(self.config.depth_fps);
        let depth = thread::Builder::new()
            .name("synthetic-depth".to_string())
            .spawn(move || {
                let mut samples = vec![0u16; geometry.pixels()];
                pace(&depth_shutdown, depth_interval, |frame| {
                    fill_depth(&mut samples, geometry, frame);
                    depth_callback(DepthImage::new(&samples, geometry.width, geometry.height));
                });
                depth_callback
            });
        let depth = match depth {
            Ok(handle) => handle,
            Err(e) => {
                shutdown.store(true, Ordering::Relaxed);
                if let Ok(cb) = color.join() {
                    self.color_callback = Some(cb);
                }
                return Err(CameraError::Stream(e.to_string()));
            }
        };

        info!("Synthetic streams running");
        self.streams = Some(Streams {
            shutdown,
            color,
            depth,
        });
        Ok(())
    }

    fn stop_streams(&mut self) {
        let Some(streams) = self.streams.take() else {
            return;
        };
        streams.shutdown.store(true, Ordering::Relaxed);

        match streams.color.join() {
            Ok(cb) => self.color_callback = Some(cb),
            Err(_) => error!("Synthetic color stream panicked"),
        }
        match streams.depth.join() {
            Ok(cb) => self.depth_callback = Some(cb),
            Err(_) => error!("Synthetic depth stream panicked"),
        }
        debug!("Synthetic streams joined");
    }

    fn is_streaming(&self) -> bool {
        self.streams.is_some()
    }

    fn color_fps(&self) -> u32 {
        self.config.color_fps
    }

    fn depth_fps(&self) -> u32 {
        self.config.depth_fps
    }
}

impl Drop for SyntheticCamera {
    fn drop(&mut self) {
        self.stop_streams();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::DeviceSession;
    use std::sync::atomic::AtomicUsize;

    fn small() -> SyntheticConfig {
        SyntheticConfig {
            geometry: FrameGeometry::new(16, 8),
            color_fps: 200,
            depth_fps: 200,
        }
    }

    #[test]
    fn test_streams_deliver_and_stop() {
        let mut camera = SyntheticCamera::new(small());
        let colors = Arc::new(AtomicUsize::new(0));
        let depths = Arc::new(AtomicUsize::new(0));

        let c = Arc::clone(&colors);
        camera.register_color_callback(Box::new(move |image: ColorImage<'_>| {
            assert_eq!(image.data.len(), 16 * 8 * 3);
            c.fetch_add(1, Ordering::SeqCst);
        }));
        let d = Arc::clone(&depths);
        camera.register_depth_callback(Box::new(move |image: DepthImage<'_>| {
            assert_eq!(image.samples.len(), 16 * 8);
            d.fetch_add(1, Ordering::SeqCst);
        }));

        camera.start_streams().unwrap();
        assert!(camera.is_streaming());
        thread::sleep(Duration::from_millis(100));
        camera.stop_streams();
        assert!(!camera.is_streaming());

        let delivered = (colors.load(Ordering::SeqCst), depths.load(Ordering::SeqCst));
        assert!(delivered.0 > 0 && delivered.1 > 0);

        thread::sleep(Duration::from_millis(20));
        assert_eq!(colors.load(Ordering::SeqCst), delivered.0);
    }

    #[test]
    fn test_restart_reuses_callbacks() {
        let mut camera = SyntheticCamera::new(small());
        camera.register_color_callback(Box::new(|_: ColorImage<'_>| {}));
        camera.register_depth_callback(Box::new(|_: DepthImage<'_>| {}));

        camera.start_streams().unwrap();
        camera.stop_streams();
        camera.start_streams().unwrap();
        assert!(camera.is_streaming());
    }

    #[test]
    fn test_session_publishes_pairs() {
        let config = small();
        let session = DeviceSession::open(SyntheticCamera::new(config), config.geometry).unwrap();
        thread::sleep(Duration::from_millis(100));

        assert!(session.frames().latest_index() >= 0);
        assert_eq!(session.producers().counts().rejected, 0);
    }

    #[test]
    fn test_depth_pattern_in_range() {
        let geometry = FrameGeometry::new(16, 1);
        let mut samples = vec![0u16; 16];
        fill_depth(&mut samples, geometry, 7);
        assert!(samples.iter().all(|&s| (500..4500).contains(&s)));
    }
}
