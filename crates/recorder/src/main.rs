//! RGB-D Logger - Main Entry Point

use anyhow::{ensure, Context, Result};
use camera_capture::{DepthCamera, SyntheticCamera};
use recorder::{init_logging, DeviceKind, Logger, RecorderConfig, RecorderError};
use ring_buffer::FrameGeometry;
use std::path::{Path, PathBuf};
use std::time::Duration;
use storage::{decode_color, decompress_depth, LogReader};
use tracing::{debug, info, warn};

const PREVIEW_INTERVAL: Duration = Duration::from_millis(33);
const STATUS_INTERVAL: Duration = Duration::from_secs(1);

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args_os().nth(1).map(PathBuf::from);
    let config = RecorderConfig::load(config_path.as_deref()).context("loading configuration")?;
    init_logging(&config.log)?;

    info!("=== RGB-D Logger v{} ===", env!("CARGO_PKG_VERSION"));

    match config.device {
        DeviceKind::Synthetic => record(SyntheticCamera::new(config.synthetic()), &config).await,
        #[cfg(feature = "openni")]
        DeviceKind::Native => record(open_native(&config)?, &config).await,
        #[cfg(not(feature = "openni"))]
        DeviceKind::Native => Err(RecorderError::DeviceUnavailable("native".to_string()).into()),
    }
}

#[cfg(feature = "openni")]
fn open_native(config: &RecorderConfig) -> Result<camera_capture::ffi::NativeCamera, RecorderError> {
    info!(
        "{} native device(s) attached",
        camera_capture::ffi::NativeCamera::device_count()
    );
    Ok(camera_capture::ffi::NativeCamera::open(config.device_index)?)
}

async fn record<C: DepthCamera + 'static>(camera: C, config: &RecorderConfig) -> Result<()> {
    let mut logger = Logger::open(camera, config.geometry, config.writer)?;
    logger
        .start_writing(&config.output_path)
        .with_context(|| format!("starting recording to {}", config.output_path.display()))?;

    let deadline = config.record_seconds.map(Duration::from_secs);
    match deadline {
        Some(limit) => info!("Recording for {} s (Ctrl-C to stop early)", limit.as_secs()),
        None => info!("Recording until Ctrl-C"),
    }

    let mut preview = logger.live_preview();
    let mut ticker = tokio::time::interval(PREVIEW_INTERVAL);
    let started = tokio::time::Instant::now();
    let mut last_status = started;
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            result = &mut ctrl_c => {
                result?;
                info!("Interrupted");
                break;
            }
            now = ticker.tick() => {
                if let Some(snapshot) = preview.poll() {
                    debug!("Preview frame {} at {} us", snapshot.index, snapshot.timestamp_us);
                }
                if now.duration_since(last_status) >= STATUS_INTERVAL {
                    last_status = now;
                    info!(
                        "Frame {} | preview {:.1} fps | {:?}",
                        logger.latest_depth_index(),
                        preview.fps(),
                        logger.producer_counts()
                    );
                }
                if deadline.is_some_and(|limit| now.duration_since(started) >= limit) {
                    break;
                }
            }
        }
    }

    // Joining the writer blocks until the final drain is on disk
    let stats = tokio::task::spawn_blocking(move || {
        let stats = logger.stop_writing();
        drop(logger);
        stats
    })
    .await??;
    info!(
        "Wrote {} frames ({} bytes), {} skipped, {} torn",
        stats.frames_written, stats.bytes_written, stats.frames_skipped, stats.torn_reads
    );

    if config.verify {
        verify(&config.output_path, config.geometry)?;
    }
    Ok(())
}

/// Decode every record and check the file ends after the last one
fn verify(path: &Path, geometry: FrameGeometry) -> Result<()> {
    let mut reader = LogReader::open(path)?;
    let frame_count = reader.frame_count();
    let mut previous = i64::MIN;

    while let Some(record) = reader.next_record()? {
        if record.timestamp_us < previous {
            warn!("Clock stepped back {} us before this frame", previous - record.timestamp_us);
        }
        previous = record.timestamp_us;
        decompress_depth(&record.depth, geometry)?;
        let color = decode_color(&record.color)?;
        ensure!(
            color.dimensions() == (geometry.width, geometry.height),
            "color frame is {:?}",
            color.dimensions()
        );
    }
    reader.finish()?;

    info!("Verified {} frames in {}", frame_count, path.display());
    Ok(())
}
