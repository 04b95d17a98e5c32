//! Storage Layer
//!
//! Streams paired depth+color frames from the Frame Ring into a compact
//! binary log:
//!
//! ```text
//! i32 frame_count                      (patched at close)
//! repeated frame_count times:
//!   i64 timestamp_us
//!   i32 depth_size
//!   i32 color_size
//!   depth_size bytes  zlib(raw little-endian u16 depth)
//!   color_size bytes  JPEG(RGB24 color)
//! ```
//!
//! All integers are little-endian.

pub mod codec;
pub mod format;
pub mod writer;

pub use codec::{
    decode_color, decompress_depth, ColorEncoder, DepthCompressor, FrameEncoder, RecordEncoder,
};
pub use format::{LogReader, LogRecord, LogWriter, RecordHeader};
pub use writer::{EncoderFactory, FrameWriter, WriterConfig, WriterStats};

use ring_buffer::RingError;
use std::io;
use std::path::PathBuf;
use thiserror::Error;

/// Storage errors
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("No output path given")]
    NoOutputPath,

    #[error("Already recording to {}", .0.display())]
    AlreadyRecording(PathBuf),

    #[error("No recording in progress")]
    NotRecording,

    #[error("Failed to open {}: {source}", .path.display())]
    Open { path: PathBuf, source: io::Error },

    #[error("I/O error: {0}")]
    Io(#[from] io::Error),

    #[error("Codec error: {0}")]
    Codec(String),

    #[error("Payload of {0} bytes does not fit a record header")]
    PayloadTooLarge(usize),

    #[error("Invalid log file: {0}")]
    InvalidFormat(String),

    #[error("{0} bytes after the last record")]
    TrailingBytes(u64),

    #[error("Frame ring error: {0}")]
    Ring(#[from] RingError),

    #[error("Writer thread panicked")]
    WriterPanicked,
}
