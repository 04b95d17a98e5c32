//! Caller-driven camera for tests and replay

use crate::{CameraError, ColorCallback, ColorImage, DepthCallback, DepthCamera, DepthImage};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

struct Shared {
    streaming: AtomicBool,
    color: Mutex<Option<ColorCallback>>,
    depth: Mutex<Option<DepthCallback>>,
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A camera whose frames are pushed in through a [`ManualFeed`].
///
/// Each feed call runs the registered callback on the calling thread,
/// which stands in for the driver's stream thread.
pub struct ManualCamera {
    shared: Arc<Shared>,
    color_fps: u32,
    depth_fps: u32,
    sync_supported: bool,
    synchronized: bool,
}

/// Handle that delivers frames to a [`ManualCamera`]'s callbacks
#[derive(Clone)]
pub struct ManualFeed {
    shared: Arc<Shared>,
}

impl ManualCamera {
    /// Create a camera reporting the given stream rates, plus its feed
    pub fn new(color_fps: u32, depth_fps: u32) -> (Self, ManualFeed) {
        let shared = Arc::new(Shared {
            streaming: AtomicBool::new(false),
            color: Mutex::new(None),
            depth: Mutex::new(None),
        });
        let camera = Self {
            shared: Arc::clone(&shared),
            color_fps,
            depth_fps,
            sync_supported: false,
            synchronized: false,
        };
        (camera, ManualFeed { shared })
    }

    /// Report frame synchronization as supported
    pub fn with_synchronization_support(mut self) -> Self {
        self.sync_supported = true;
        self
    }
}

impl DepthCamera for ManualCamera {
    fn description(&self) -> String {
        "manual feed".to_string()
    }

    fn register_color_callback(&mut self, callback: ColorCallback) {
        *lock(&self.shared.color) = Some(callback);
    }

    fn register_depth_callback(&mut self, callback: DepthCallback) {
        *lock(&self.shared.depth) = Some(callback);
    }

    fn start_streams(&mut self) -> Result<(), CameraError> {
        if lock(&self.shared.color).is_none() {
            return Err(CameraError::MissingCallback("color"));
        }
        if lock(&self.shared.depth).is_none() {
            return Err(CameraError::MissingCallback("depth"));
        }
        self.shared.streaming.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn stop_streams(&mut self) {
        self.shared.streaming.store(false, Ordering::SeqCst);
        // Wait out any delivery already inside a callback
        drop(lock(&self.shared.color));
        drop(lock(&self.shared.depth));
    }

    fn is_streaming(&self) -> bool {
        self.shared.streaming.load(Ordering::SeqCst)
    }

    fn color_fps(&self) -> u32 {
        self.color_fps
    }

    fn depth_fps(&self) -> u32 {
        self.depth_fps
    }

    fn is_synchronization_supported(&self) -> bool {
        self.sync_supported
    }

    fn is_synchronized(&self) -> bool {
        self.synchronized
    }

    fn set_synchronization(&mut self, enabled: bool) -> Result<(), CameraError> {
        if !self.sync_supported {
            return Err(CameraError::Unsupported("frame synchronization"));
        }
        self.synchronized = enabled;
        Ok(())
    }
}

impl ManualFeed {
    /// Deliver a color frame. Returns false if the camera is not streaming.
    pub fn color(&self, image: ColorImage<'_>) -> bool {
        let mut callback = lock(&self.shared.color);
        if !self.shared.streaming.load(Ordering::SeqCst) {
            return false;
        }
        match callback.as_mut() {
            Some(callback) => {
                callback(image);
                true
            }
            None => false,
        }
    }

    /// Deliver a depth frame. Returns false if the camera is not streaming.
    pub fn depth(&self, image: DepthImage<'_>) -> bool {
        let mut callback = lock(&self.shared.depth);
        if !self.shared.streaming.load(Ordering::SeqCst) {
            return false;
        }
        match callback.as_mut() {
            Some(callback) => {
                callback(image);
                true
            }
            None => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::AtomicUsize;

    #[test]
    fn test_start_requires_callbacks() {
        let (mut camera, _feed) = ManualCamera::new(30, 30);
        assert!(matches!(
            camera.start_streams(),
            Err(CameraError::MissingCallback("color"))
        ));
    }

    #[test]
    fn test_feed_runs_callback_only_while_streaming() {
        let (mut camera, feed) = ManualCamera::new(30, 30);
        let seen = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&seen);
        camera.register_color_callback(Box::new(move |_: ColorImage<'_>| {
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        camera.register_depth_callback(Box::new(|_: DepthImage<'_>| {}));

        let rgb = [0u8; 3];
        assert!(!feed.color(ColorImage::rgb(&rgb, 1, 1)));

        camera.start_streams().unwrap();
        assert!(feed.color(ColorImage::rgb(&rgb, 1, 1)));

        camera.stop_streams();
        assert!(!feed.color(ColorImage::rgb(&rgb, 1, 1)));
        assert_eq!(seen.load(Ordering::SeqCst), 1);
    }
}
