//! Camera capability trait and device session

use crate::{CameraError, ColorImage, DepthImage, Producers};
use ring_buffer::{FrameGeometry, FrameRing};
use std::sync::Arc;
use tracing::{info, warn};

/// Color frame callback, invoked on a driver-owned thread
pub type ColorCallback = Box<dyn FnMut(ColorImage<'_>) + Send + 'static>;

/// Depth frame callback, invoked on a driver-owned thread
pub type DepthCallback = Box<dyn FnMut(DepthImage<'_>) + Send + 'static>;

/// What the capture core needs from a depth camera driver.
///
/// Implementations must invoke each callback from at most one thread at
/// a time; the color and depth callbacks may run concurrently with each
/// other in any order.
pub trait DepthCamera: Send {
    /// Human-readable device name for logs
    fn description(&self) -> String;

    fn register_color_callback(&mut self, callback: ColorCallback);

    fn register_depth_callback(&mut self, callback: DepthCallback);

    fn start_streams(&mut self) -> Result<(), CameraError>;

    /// Stop both streams. No callback runs after this returns.
    fn stop_streams(&mut self);

    fn is_streaming(&self) -> bool;

    fn color_fps(&self) -> u32;

    fn depth_fps(&self) -> u32;

    /// Whether the device can lock depth and color frame timing
    fn is_synchronization_supported(&self) -> bool {
        false
    }

    fn is_synchronized(&self) -> bool {
        false
    }

    fn set_synchronization(&mut self, _enabled: bool) -> Result<(), CameraError> {
        Err(CameraError::Unsupported("frame synchronization"))
    }
}

/// A connected camera feeding the Frame Rings
pub struct DeviceSession<C: DepthCamera> {
    camera: C,
    producers: Arc<Producers>,
}

impl<C: DepthCamera> DeviceSession<C> {
    /// Register the producer callbacks on `camera`. Streams stay stopped.
    pub fn new(mut camera: C, geometry: FrameGeometry) -> Self {
        let producers = Arc::new(Producers::new(geometry));

        let color = Arc::clone(&producers);
        camera.register_color_callback(Box::new(move |image: ColorImage<'_>| {
            color.on_color_frame(image)
        }));
        let depth = Arc::clone(&producers);
        camera.register_depth_callback(Box::new(move |image: DepthImage<'_>| {
            depth.on_depth_frame(image)
        }));

        info!(
            "Opened '{}' ({}x{})",
            camera.description(),
            geometry.width,
            geometry.height
        );

        Self { camera, producers }
    }

    /// Register callbacks and start streaming
    pub fn open(camera: C, geometry: FrameGeometry) -> Result<Self, CameraError> {
        let mut session = Self::new(camera, geometry);
        session.start()?;
        Ok(session)
    }

    /// Start both streams and enable synchronization when possible
    pub fn start(&mut self) -> Result<(), CameraError> {
        if self.camera.is_streaming() {
            return Ok(());
        }
        self.camera.start_streams()?;
        info!(
            "Streams started: color {} fps, depth {} fps",
            self.camera.color_fps(),
            self.camera.depth_fps()
        );
        self.start_synchronization();
        Ok(())
    }

    /// Stop both streams
    pub fn stop(&mut self) {
        if !self.camera.is_streaming() {
            return;
        }
        self.stop_synchronization();
        self.camera.stop_streams();
        info!("Streams stopped: {:?}", self.producers.counts());
    }

    pub fn is_streaming(&self) -> bool {
        self.camera.is_streaming()
    }

    pub fn producers(&self) -> &Arc<Producers> {
        &self.producers
    }

    pub fn frames(&self) -> Arc<FrameRing> {
        self.producers.frames()
    }

    pub fn camera(&self) -> &C {
        &self.camera
    }

    pub fn camera_mut(&mut self) -> &mut C {
        &mut self.camera
    }

    fn start_synchronization(&mut self) {
        let camera = &mut self.camera;
        if camera.is_synchronization_supported()
            && !camera.is_synchronized()
            && camera.color_fps() == camera.depth_fps()
            && camera.is_streaming()
        {
            match camera.set_synchronization(true) {
                Ok(()) => info!("Frame synchronization enabled"),
                Err(e) => warn!("Could not enable frame synchronization: {}", e),
            }
        }
    }

    fn stop_synchronization(&mut self) {
        let camera = &mut self.camera;
        if camera.is_synchronization_supported() && camera.is_synchronized() {
            if let Err(e) = camera.set_synchronization(false) {
                warn!("Could not disable frame synchronization: {}", e);
            }
        }
    }
}

impl<C: DepthCamera> Drop for DeviceSession<C> {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ManualCamera;
    use ring_buffer::NO_FRAME;

    fn tiny() -> FrameGeometry {
        FrameGeometry::new(2, 1)
    }

    #[test]
    fn test_callbacks_feed_rings() {
        let (camera, feed) = ManualCamera::new(30, 30);
        let session = DeviceSession::open(camera, tiny()).unwrap();

        let rgb = [10u8; 6];
        let depth = [500u16; 2];
        assert!(feed.color(ColorImage::rgb(&rgb, 2, 1)));
        assert!(feed.depth(DepthImage::new(&depth, 2, 1)));

        assert_eq!(session.frames().latest_index(), 0);
        assert_eq!(session.producers().counts().depth_published, 1);
    }

    #[test]
    fn test_no_delivery_before_start() {
        let (camera, feed) = ManualCamera::new(30, 30);
        let mut session = DeviceSession::new(camera, tiny());

        let rgb = [10u8; 6];
        assert!(!feed.color(ColorImage::rgb(&rgb, 2, 1)));
        assert_eq!(session.producers().staging().latest_index(), NO_FRAME);

        session.start().unwrap();
        assert!(feed.color(ColorImage::rgb(&rgb, 2, 1)));
        assert_eq!(session.producers().staging().latest_index(), 0);
    }

    #[test]
    fn test_synchronization_enabled_when_rates_match() {
        let (camera, _feed) = ManualCamera::new(30, 30);
        let camera = camera.with_synchronization_support();
        let mut session = DeviceSession::open(camera, tiny()).unwrap();
        assert!(session.camera().is_synchronized());

        session.stop();
        assert!(!session.camera().is_synchronized());
        assert!(!session.is_streaming());
    }

    #[test]
    fn test_synchronization_skipped_when_rates_differ() {
        let (camera, _feed) = ManualCamera::new(30, 15);
        let camera = camera.with_synchronization_support();
        let session = DeviceSession::open(camera, tiny()).unwrap();
        assert!(!session.camera().is_synchronized());
    }

    #[test]
    fn test_drop_stops_streams() {
        let (camera, feed) = ManualCamera::new(30, 30);
        let session = DeviceSession::open(camera, tiny()).unwrap();
        drop(session);

        let rgb = [10u8; 6];
        assert!(!feed.color(ColorImage::rgb(&rgb, 2, 1)));
    }
}
