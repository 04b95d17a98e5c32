//! Log file reader and writer

use crate::StorageError;
use std::fs::{self, File};
use std::io::{self, BufReader, BufWriter, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// File header size (frame count)
pub const HEADER_LEN: usize = 4;

/// Per-record header size
pub const RECORD_HEADER_LEN: usize = 16;

/// Fixed part of each record
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RecordHeader {
    pub timestamp_us: i64,
    pub depth_size: i32,
    pub color_size: i32,
}

impl RecordHeader {
    pub fn to_bytes(&self) -> [u8; RECORD_HEADER_LEN] {
        let mut buf = [0u8; RECORD_HEADER_LEN];
        buf[0..8].copy_from_slice(&self.timestamp_us.to_le_bytes());
        buf[8..12].copy_from_slice(&self.depth_size.to_le_bytes());
        buf[12..16].copy_from_slice(&self.color_size.to_le_bytes());
        buf
    }

    pub fn from_bytes(buf: &[u8; RECORD_HEADER_LEN]) -> Self {
        Self {
            timestamp_us: i64::from_le_bytes([
                buf[0], buf[1], buf[2], buf[3], buf[4], buf[5], buf[6], buf[7],
            ]),
            depth_size: i32::from_le_bytes([buf[8], buf[9], buf[10], buf[11]]),
            color_size: i32::from_le_bytes([buf[12], buf[13], buf[14], buf[15]]),
        }
    }
}

fn payload_size(len: usize) -> Result<i32, StorageError> {
    i32::try_from(len).map_err(|_| StorageError::PayloadTooLarge(len))
}

/// Appends records to a log file and patches the frame count on finish
pub struct LogWriter {
    file: BufWriter<File>,
    path: PathBuf,
    frame_count: i32,
    /// End of the last complete record
    bytes_written: u64,
    /// A record write failed part way
    failed: bool,
}

impl LogWriter {
    /// Create (or truncate) `path` and write the placeholder header
    pub fn create(path: &Path) -> Result<Self, StorageError> {
        let file = File::options()
            .read(true)
            .write(true)
            .create(true)
            .truncate(true)
            .open(path)
            .map_err(|source| StorageError::Open {
                path: path.to_path_buf(),
                source,
            })?;

        let mut file = BufWriter::new(file);
        if let Err(e) = file.write_all(&0i32.to_le_bytes()) {
            drop(file);
            if let Err(rm) = fs::remove_file(path) {
                warn!("Could not remove {}: {}", path.display(), rm);
            }
            return Err(e.into());
        }

        debug!("Created log file {}", path.display());
        Ok(Self {
            file,
            path: path.to_path_buf(),
            frame_count: 0,
            bytes_written: HEADER_LEN as u64,
            failed: false,
        })
    }

    /// Append one record. After a failed append the writer accepts no more
    /// records.
    pub fn append(&mut self, timestamp_us: i64, depth: &[u8], color: &[u8]) -> Result<(), StorageError> {
        if self.failed {
            return Err(StorageError::Io(io::Error::new(
                io::ErrorKind::Other,
                "an earlier record write failed",
            )));
        }
        let header = RecordHeader {
            timestamp_us,
            depth_size: payload_size(depth.len())?,
            color_size: payload_size(color.len())?,
        };
        let frame_count = self
            .frame_count
            .checked_add(1)
            .ok_or_else(|| StorageError::InvalidFormat("frame count overflow".to_string()))?;

        let written = self
            .file
            .write_all(&header.to_bytes())
            .and_then(|()| self.file.write_all(depth))
            .and_then(|()| self.file.write_all(color));
        if let Err(e) = written {
            self.failed = true;
            return Err(e.into());
        }

        self.frame_count = frame_count;
        self.bytes_written += (RECORD_HEADER_LEN + depth.len() + color.len()) as u64;
        Ok(())
    }

    pub fn frame_count(&self) -> i32 {
        self.frame_count
    }

    pub fn bytes_written(&self) -> u64 {
        self.bytes_written
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Cut any partial record, rewrite the header with the true frame
    /// count, flush and close
    pub fn finish(self) -> Result<i32, StorageError> {
        let mut file = self.file.into_inner().map_err(|e| e.into_error())?;
        file.set_len(self.bytes_written)?;
        file.seek(SeekFrom::Start(0))?;
        file.write_all(&self.frame_count.to_le_bytes())?;
        file.flush()?;
        file.sync_all()?;
        debug!(
            "Closed {} with {} frames",
            self.path.display(),
            self.frame_count
        );
        Ok(self.frame_count)
    }
}

/// One record as stored on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    pub timestamp_us: i64,
    /// zlib-compressed raw depth
    pub depth: Vec<u8>,
    /// JPEG-encoded color
    pub color: Vec<u8>,
}

/// Sequential reader over a log file
pub struct LogReader<R> {
    reader: R,
    frame_count: i32,
    records_read: i32,
}

impl LogReader<BufReader<File>> {
    /// Open a log file and read its header
    pub fn open(path: &Path) -> Result<Self, StorageError> {
        let file = File::open(path).map_err(|source| StorageError::Open {
            path: path.to_path_buf(),
            source,
        })?;
        Self::new(BufReader::new(file))
    }
}

fn truncated(e: io::Error, what: &str) -> StorageError {
    if e.kind() == io::ErrorKind::UnexpectedEof {
        StorageError::InvalidFormat(format!("truncated {}", what))
    } else {
        e.into()
    }
}

impl<R: Read> LogReader<R> {
    pub fn new(mut reader: R) -> Result<Self, StorageError> {
        let mut buf = [0u8; HEADER_LEN];
        reader
            .read_exact(&mut buf)
            .map_err(|e| truncated(e, "file header"))?;

        let frame_count = i32::from_le_bytes(buf);
        if frame_count < 0 {
            return Err(StorageError::InvalidFormat(format!(
                "negative frame count {}",
                frame_count
            )));
        }

        Ok(Self {
            reader,
            frame_count,
            records_read: 0,
        })
    }

    /// Frame count from the header
    pub fn frame_count(&self) -> i32 {
        self.frame_count
    }

    /// Read the next record, or `None` after `frame_count` records
    pub fn next_record(&mut self) -> Result<Option<LogRecord>, StorageError> {
        if self.records_read >= self.frame_count {
            return Ok(None);
        }
        let record = self.records_read;

        let mut buf = [0u8; RECORD_HEADER_LEN];
        self.reader
            .read_exact(&mut buf)
            .map_err(|e| truncated(e, &format!("record {} header", record)))?;
        let header = RecordHeader::from_bytes(&buf);

        if header.depth_size < 0 || header.color_size < 0 {
            return Err(StorageError::InvalidFormat(format!(
                "record {} has negative payload size",
                record
            )));
        }

        let depth = self.read_payload(header.depth_size, || format!("record {} depth", record))?;
        let color = self.read_payload(header.color_size, || format!("record {} color", record))?;

        self.records_read += 1;
        Ok(Some(LogRecord {
            timestamp_us: header.timestamp_us,
            depth,
            color,
        }))
    }

    /// Read `len` bytes, growing the buffer only as data arrives
    fn read_payload(&mut self, len: i32, what: impl FnOnce() -> String) -> Result<Vec<u8>, StorageError> {
        let len = len as usize;
        let mut payload = Vec::new();
        (&mut self.reader)
            .take(len as u64)
            .read_to_end(&mut payload)?;
        if payload.len() != len {
            return Err(StorageError::InvalidFormat(format!("truncated {}", what())));
        }
        Ok(payload)
    }

    /// Read any remaining records and require end of file after them
    pub fn finish(mut self) -> Result<(), StorageError> {
        while self.next_record()?.is_some() {}

        let trailing = io::copy(&mut self.reader, &mut io::sink())?;
        if trailing > 0 {
            return Err(StorageError::TrailingBytes(trailing));
        }
        Ok(())
    }
}

impl<R: Read> Iterator for LogReader<R> {
    type Item = Result<LogRecord, StorageError>;

    fn next(&mut self) -> Option<Self::Item> {
        self.next_record().transpose()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;
    use tempfile::tempdir;

    #[test]
    fn test_record_header_layout() {
        let header = RecordHeader {
            timestamp_us: 0x0102030405060708,
            depth_size: 0x11,
            color_size: 0x22,
        };
        let bytes = header.to_bytes();
        assert_eq!(&bytes[0..8], &[8, 7, 6, 5, 4, 3, 2, 1]);
        assert_eq!(&bytes[8..12], &[0x11, 0, 0, 0]);
        assert_eq!(&bytes[12..16], &[0x22, 0, 0, 0]);
        assert_eq!(RecordHeader::from_bytes(&bytes), header);
    }

    #[test]
    fn test_placeholder_header_while_open() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("open.klg");

        let mut writer = LogWriter::create(&path).unwrap();
        writer.append(1, &[1, 2], &[3]).unwrap();
        writer.file.flush().unwrap();

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], &0i32.to_le_bytes());
        assert_eq!(bytes.len(), HEADER_LEN + RECORD_HEADER_LEN + 3);
    }

    #[test]
    fn test_write_then_read_exactly_consumes_file() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("frames.klg");

        let mut writer = LogWriter::create(&path).unwrap();
        writer.append(100, &[1, 2, 3], &[9; 5]).unwrap();
        writer.append(200, &[], &[7]).unwrap();
        assert_eq!(writer.finish().unwrap(), 2);

        let bytes = fs::read(&path).unwrap();
        assert_eq!(&bytes[..4], &2i32.to_le_bytes());
        assert_eq!(bytes.len(), 4 + (16 + 8) + (16 + 1));

        let mut reader = LogReader::open(&path).unwrap();
        assert_eq!(reader.frame_count(), 2);
        let first = reader.next_record().unwrap().unwrap();
        assert_eq!(first.timestamp_us, 100);
        assert_eq!(first.depth, vec![1, 2, 3]);
        assert_eq!(first.color, vec![9; 5]);
        let second = reader.next_record().unwrap().unwrap();
        assert_eq!(second.timestamp_us, 200);
        assert!(second.depth.is_empty());
        assert!(reader.next_record().unwrap().is_none());
        reader.finish().unwrap();
    }

    #[test]
    fn test_trailing_bytes_reported() {
        let mut bytes = 0i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(&[1, 2, 3]);

        let reader = LogReader::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(reader.finish(), Err(StorageError::TrailingBytes(3))));
    }

    #[test]
    fn test_truncated_record_reported() {
        let mut bytes = 1i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(
            &RecordHeader {
                timestamp_us: 5,
                depth_size: 10,
                color_size: 0,
            }
            .to_bytes(),
        );
        bytes.extend_from_slice(&[0; 4]);

        let mut reader = LogReader::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            reader.next_record(),
            Err(StorageError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_huge_declared_size_is_truncation() {
        let mut bytes = 1i32.to_le_bytes().to_vec();
        bytes.extend_from_slice(
            &RecordHeader {
                timestamp_us: 5,
                depth_size: 1 << 30,
                color_size: 0,
            }
            .to_bytes(),
        );
        bytes.extend_from_slice(&[0; 8]);

        let mut reader = LogReader::new(Cursor::new(bytes)).unwrap();
        assert!(matches!(
            reader.next_record(),
            Err(StorageError::InvalidFormat(_))
        ));
    }

    #[test]
    fn test_finish_cuts_partial_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("partial.klg");

        let mut writer = LogWriter::create(&path).unwrap();
        writer.append(1, &[1, 2], &[3]).unwrap();
        // Start of a record that never completed
        writer.file.write_all(&[0xAA; 7]).unwrap();
        writer.failed = true;
        assert!(writer.append(2, &[4], &[5]).is_err());
        assert_eq!(writer.finish().unwrap(), 1);

        let bytes = fs::read(&path).unwrap();
        assert_eq!(bytes.len(), HEADER_LEN + RECORD_HEADER_LEN + 3);
        assert_eq!(&bytes[..4], &1i32.to_le_bytes());

        let reader = LogReader::open(&path).unwrap();
        reader.finish().unwrap();
    }

    #[test]
    fn test_finish_cuts_flushed_partial_record() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("flushed.klg");

        let mut writer = LogWriter::create(&path).unwrap();
        writer.append(1, &[1, 2], &[3]).unwrap();
        writer.file.write_all(&[0xAA; 7]).unwrap();
        writer.file.flush().unwrap();
        writer.failed = true;
        assert_eq!(writer.finish().unwrap(), 1);

        assert_eq!(
            fs::metadata(&path).unwrap().len(),
            (HEADER_LEN + RECORD_HEADER_LEN + 3) as u64
        );
    }

    #[test]
    fn test_open_missing_directory_fails() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("missing").join("x.klg");
        assert!(matches!(
            LogWriter::create(&path),
            Err(StorageError::Open { .. })
        ));
    }
}
