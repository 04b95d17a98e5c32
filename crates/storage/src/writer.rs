//! Background writer draining the Frame Ring into a log file

use crate::codec::{FrameEncoder, RecordEncoder};
use crate::format::{LogWriter, RECORD_HEADER_LEN};
use crate::StorageError;
use ring_buffer::{FrameGeometry, FrameRing, FrameSnapshot, GuardedScalar, RingError, NO_FRAME};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::Duration;
use tracing::{debug, error, info, warn};

/// Writer configuration
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct WriterConfig {
    /// Maximum time between Frame Ring polls (milliseconds)
    pub poll_interval_ms: u64,
    /// JPEG quality for the color payload (1-100)
    pub jpeg_quality: u8,
}

impl Default for WriterConfig {
    fn default() -> Self {
        Self {
            poll_interval_ms: 1,
            jpeg_quality: 90,
        }
    }
}

/// Outcome of one recording session
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WriterStats {
    /// Records appended to the file
    pub frames_written: u64,
    /// Indices published during the session but overwritten before the
    /// writer reached them
    pub frames_skipped: u64,
    /// Reads that raced a producer and were discarded
    pub torn_reads: u64,
    /// Total file size including the header
    pub bytes_written: u64,
}

/// Builds the encoder for each recording session
pub type EncoderFactory = Box<dyn Fn(FrameGeometry, &WriterConfig) -> Box<dyn FrameEncoder> + Send>;

struct Session {
    path: PathBuf,
    handle: JoinHandle<SessionOutcome>,
}

struct SessionOutcome {
    log: LogWriter,
    stats: WriterStats,
    error: Option<StorageError>,
}

/// Records paired frames to disk on a dedicated thread.
///
/// A session first writes the frames still live in the ring when
/// [`start_writing`](Self::start_writing) runs, then every frame published
/// until [`stop_writing`](Self::stop_writing), in index order, except
/// frames the depth producer overwrote before the writer could copy them.
pub struct FrameWriter {
    frames: Arc<FrameRing>,
    config: WriterConfig,
    make_encoder: EncoderFactory,
    recording: Arc<GuardedScalar<bool>>,
    session: Option<Session>,
}

impl FrameWriter {
    /// Writer using zlib depth and JPEG color
    pub fn new(frames: Arc<FrameRing>, config: WriterConfig) -> Self {
        Self::with_encoder(frames, config, |geometry, config| {
            Box::new(RecordEncoder::new(geometry, config.jpeg_quality))
        })
    }

    /// Writer with a caller-supplied payload encoder
    pub fn with_encoder<F>(frames: Arc<FrameRing>, config: WriterConfig, make_encoder: F) -> Self
    where
        F: Fn(FrameGeometry, &WriterConfig) -> Box<dyn FrameEncoder> + Send + 'static,
    {
        Self {
            frames,
            config,
            make_encoder: Box::new(make_encoder),
            recording: Arc::new(GuardedScalar::new(false)),
            session: None,
        }
    }

    pub fn config(&self) -> &WriterConfig {
        &self.config
    }

    pub fn is_recording(&self) -> bool {
        self.session.is_some()
    }

    /// File of the active session, if any
    pub fn current_path(&self) -> Option<&Path> {
        self.session.as_ref().map(|s| s.path.as_path())
    }

    /// Open `path` and start the writer thread
    pub fn start_writing(&mut self, path: impl AsRef<Path>) -> Result<(), StorageError> {
        let path = path.as_ref();
        if let Some(session) = &self.session {
            return Err(StorageError::AlreadyRecording(session.path.clone()));
        }
        if path.as_os_str().is_empty() {
            return Err(StorageError::NoOutputPath);
        }

        let log = LogWriter::create(path)?;
        let geometry = self.frames.geometry();
        let start_index = self.frames.latest_index();

        let mut drain = Drain::new(
            Arc::clone(&self.frames),
            (self.make_encoder)(geometry, &self.config),
            start_index,
        );
        let recording = Arc::clone(&self.recording);
        let poll = Duration::from_millis(self.config.poll_interval_ms.max(1));

        self.recording.set(true);
        let handle = thread::Builder::new()
            .name("frame-writer".to_string())
            .spawn(move || {
                let mut log = log;
                let error = drain.run(&recording, poll, &mut log).err();
                if let Some(e) = &error {
                    error!("Recording to {} failed: {}", log.path().display(), e);
                }
                drain.stats.bytes_written = log.bytes_written();
                SessionOutcome {
                    log,
                    stats: drain.stats,
                    error,
                }
            });
        let handle = match handle {
            Ok(handle) => handle,
            Err(e) => {
                self.recording.set(false);
                return Err(e.into());
            }
        };

        info!(
            "Recording to {} from frame index {}",
            path.display(),
            self.frames.oldest_live_index().max(0)
        );
        self.session = Some(Session {
            path: path.to_path_buf(),
            handle,
        });
        Ok(())
    }

    /// Drain remaining frames, patch the header and close the file
    pub fn stop_writing(&mut self) -> Result<WriterStats, StorageError> {
        let session = self.session.take().ok_or(StorageError::NotRecording)?;
        self.recording.set(false);

        let outcome = session
            .handle
            .join()
            .map_err(|_| StorageError::WriterPanicked)?;
        let frame_count = outcome.log.finish()?;

        let stats = outcome.stats;
        info!(
            "Closed {}: {} frames, {} skipped, {} torn, {} bytes",
            session.path.display(),
            frame_count,
            stats.frames_skipped,
            stats.torn_reads,
            stats.bytes_written
        );
        match outcome.error {
            Some(e) => Err(e),
            None => Ok(stats),
        }
    }
}

impl Drop for FrameWriter {
    fn drop(&mut self) {
        if self.session.is_some() {
            if let Err(e) = self.stop_writing() {
                error!("Failed to close recording: {}", e);
            }
        }
    }
}

/// Writer-thread state
struct Drain {
    frames: Arc<FrameRing>,
    snapshot: FrameSnapshot,
    encoder: Box<dyn FrameEncoder>,
    /// Latest index when the session started
    session_start: i64,
    last_written: i64,
    stats: WriterStats,
}

impl Drain {
    fn new(frames: Arc<FrameRing>, encoder: Box<dyn FrameEncoder>, session_start: i64) -> Self {
        let snapshot = FrameSnapshot::new(frames.geometry());
        Self {
            frames,
            snapshot,
            encoder,
            session_start,
            last_written: NO_FRAME,
            stats: WriterStats::default(),
        }
    }

    fn run(
        &mut self,
        recording: &GuardedScalar<bool>,
        poll: Duration,
        log: &mut LogWriter,
    ) -> Result<(), StorageError> {
        while recording.wait_for_change_or_timeout(poll) {
            self.drain(log)?;
        }
        // Frames published before the stop request
        self.drain(log)
    }

    /// Write every live index after `last_written`, oldest first
    fn drain(&mut self, log: &mut LogWriter) -> Result<(), StorageError> {
        let latest = self.frames.latest_index();
        if latest == NO_FRAME || latest <= self.last_written {
            return Ok(());
        }

        let oldest_live = self.frames.oldest_live_index();
        let first = (self.last_written + 1).max(oldest_live);

        // Only frames published after the start can be missed
        let expected = (self.last_written + 1).max(self.session_start + 1);
        let skipped = first - expected;
        if skipped > 0 {
            self.stats.frames_skipped += skipped as u64;
            warn!("Writer fell behind, {} frames overwritten", skipped);
        }

        for index in first..=latest {
            match self.frames.read(index, &mut self.snapshot) {
                Ok(()) => self.write_snapshot(log)?,
                Err(RingError::Overwritten { .. }) | Err(RingError::Torn { .. }) => {
                    self.stats.torn_reads += 1;
                    debug!("Discarded frame {} overwritten during copy", index);
                }
                Err(e) => return Err(e.into()),
            }
            self.last_written = index;
        }
        Ok(())
    }

    fn write_snapshot(&mut self, log: &mut LogWriter) -> Result<(), StorageError> {
        self.encoder.encode(&self.snapshot, self.frames.geometry())?;

        let depth = self.encoder.depth_payload();
        let color = self.encoder.color_payload();
        log.append(self.snapshot.timestamp_us, depth, color)?;

        self.stats.frames_written += 1;
        debug!(
            "Wrote frame {} ({} bytes)",
            self.snapshot.index,
            RECORD_HEADER_LEN + depth.len() + color.len()
        );
        Ok(())
    }
}
