//! Session + writer facade

use crate::{LivePreview, RecorderError};
use camera_capture::{DepthCamera, DeviceSession, ProducerCounts};
use ring_buffer::{FrameGeometry, FrameRing};
use std::path::Path;
use std::sync::Arc;
use storage::{FrameWriter, WriterConfig, WriterStats};
use tracing::{error, info};

/// A streaming camera whose paired frames can be recorded on demand.
///
/// Producers run for the whole lifetime of the logger; recording sessions
/// come and go on top of them.
pub struct Logger<C: DepthCamera> {
    session: DeviceSession<C>,
    writer: FrameWriter,
}

impl<C: DepthCamera> Logger<C> {
    /// Connect `camera` to fresh rings and start streaming
    pub fn open(camera: C, geometry: FrameGeometry, config: WriterConfig) -> Result<Self, RecorderError> {
        let session = DeviceSession::open(camera, geometry)?;
        let writer = FrameWriter::new(session.frames(), config);
        Ok(Self { session, writer })
    }

    /// Begin recording to `path`
    pub fn start_writing(&mut self, path: impl AsRef<Path>) -> Result<(), RecorderError> {
        self.writer.start_writing(path)?;
        Ok(())
    }

    /// Finish the active recording
    pub fn stop_writing(&mut self) -> Result<WriterStats, RecorderError> {
        Ok(self.writer.stop_writing()?)
    }

    pub fn is_recording(&self) -> bool {
        self.writer.is_recording()
    }

    /// Newest published depth index, or `NO_FRAME`
    pub fn latest_depth_index(&self) -> i64 {
        self.session.frames().latest_index()
    }

    pub fn frames(&self) -> Arc<FrameRing> {
        self.session.frames()
    }

    /// A reader for the newest paired frame
    pub fn live_preview(&self) -> LivePreview {
        LivePreview::new(self.session.frames())
    }

    pub fn producer_counts(&self) -> ProducerCounts {
        self.session.producers().counts()
    }

    pub fn session(&self) -> &DeviceSession<C> {
        &self.session
    }

    pub fn session_mut(&mut self) -> &mut DeviceSession<C> {
        &mut self.session
    }
}

impl<C: DepthCamera> Drop for Logger<C> {
    fn drop(&mut self) {
        self.session.stop();
        if self.writer.is_recording() {
            match self.writer.stop_writing() {
                Ok(stats) => info!("Recording closed on shutdown: {} frames", stats.frames_written),
                Err(e) => error!("Recording failed on shutdown: {}", e),
            }
        }
    }
}
