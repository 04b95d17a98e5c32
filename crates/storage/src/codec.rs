//! Depth compression and color encoding

use crate::StorageError;
use flate2::read::ZlibDecoder;
use flate2::{Compress, Compression, FlushCompress, Status};
use image::codecs::jpeg::JpegEncoder;
use image::{ExtendedColorType, ImageFormat, RgbImage};
use ring_buffer::{FrameGeometry, FrameSnapshot};
use std::io::Read;
use std::thread;

/// Worst-case zlib output size for `len` input bytes
pub fn compress_bound(len: usize) -> usize {
    len + (len >> 12) + (len >> 14) + (len >> 25) + 13
}

/// zlib compressor for raw depth planes, using the fastest level.
///
/// The output buffer is reused across frames.
pub struct DepthCompressor {
    compress: Compress,
    output: Vec<u8>,
}

impl DepthCompressor {
    /// Create a compressor sized for `depth_len` input bytes
    pub fn new(depth_len: usize) -> Self {
        Self {
            compress: Compress::new(Compression::fast(), true),
            output: Vec::with_capacity(compress_bound(depth_len)),
        }
    }

    /// Compress one depth plane. Returns the compressed size.
    pub fn compress(&mut self, raw: &[u8]) -> Result<usize, StorageError> {
        self.compress.reset();
        self.output.clear();
        let bound = compress_bound(raw.len());
        if self.output.capacity() < bound {
            self.output.reserve(bound);
        }

        loop {
            let consumed = self.compress.total_in() as usize;
            let status = self
                .compress
                .compress_vec(&raw[consumed..], &mut self.output, FlushCompress::Finish)
                .map_err(|e| StorageError::Codec(format!("zlib: {}", e)))?;
            match status {
                Status::StreamEnd => return Ok(self.output.len()),
                Status::Ok | Status::BufError => {
                    let extra = self.output.capacity().max(1024);
                    self.output.reserve(extra);
                }
            }
        }
    }

    /// Output of the last successful [`compress`](Self::compress)
    pub fn output(&self) -> &[u8] {
        &self.output
    }
}

/// Baseline JPEG encoder for RGB24 color planes
pub struct ColorEncoder {
    quality: u8,
    output: Vec<u8>,
}

impl ColorEncoder {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            output: Vec::new(),
        }
    }

    pub fn quality(&self) -> u8 {
        self.quality
    }

    /// Encode one RGB24 plane. Returns the encoded size.
    pub fn encode(&mut self, rgb: &[u8], geometry: FrameGeometry) -> Result<usize, StorageError> {
        if rgb.len() != geometry.color_len() {
            return Err(StorageError::Codec(format!(
                "color plane is {} bytes, expected {}",
                rgb.len(),
                geometry.color_len()
            )));
        }
        self.output.clear();
        let mut encoder = JpegEncoder::new_with_quality(&mut self.output, self.quality);
        encoder
            .encode(rgb, geometry.width, geometry.height, ExtendedColorType::Rgb8)
            .map_err(|e| StorageError::Codec(format!("jpeg: {}", e)))?;
        Ok(self.output.len())
    }

    /// Output of the last successful [`encode`](Self::encode)
    pub fn output(&self) -> &[u8] {
        &self.output
    }
}

/// Turns one paired frame into its depth and color payloads
pub trait FrameEncoder: Send {
    /// Encode `snapshot`, replacing the previous payloads
    fn encode(&mut self, snapshot: &FrameSnapshot, geometry: FrameGeometry) -> Result<(), StorageError>;

    fn depth_payload(&self) -> &[u8];

    fn color_payload(&self) -> &[u8];
}

/// zlib depth and JPEG color, encoded on two threads and joined
pub struct RecordEncoder {
    depth: DepthCompressor,
    color: ColorEncoder,
}

impl RecordEncoder {
    pub fn new(geometry: FrameGeometry, jpeg_quality: u8) -> Self {
        Self {
            depth: DepthCompressor::new(geometry.depth_len()),
            color: ColorEncoder::new(jpeg_quality),
        }
    }
}

impl FrameEncoder for RecordEncoder {
    fn encode(&mut self, snapshot: &FrameSnapshot, geometry: FrameGeometry) -> Result<(), StorageError> {
        let depth = &mut self.depth;
        let color = &mut self.color;

        let (depth_result, color_result) = thread::scope(|scope| {
            let compress = scope.spawn(|| depth.compress(&snapshot.depth));
            let color_result = color.encode(&snapshot.color, geometry);
            (compress.join(), color_result)
        });
        depth_result
            .map_err(|_| StorageError::Codec("depth compression panicked".to_string()))??;
        color_result?;
        Ok(())
    }

    fn depth_payload(&self) -> &[u8] {
        self.depth.output()
    }

    fn color_payload(&self) -> &[u8] {
        self.color.output()
    }
}

/// Inflate a stored depth payload back to raw little-endian samples
pub fn decompress_depth(data: &[u8], geometry: FrameGeometry) -> Result<Vec<u8>, StorageError> {
    let mut raw = Vec::with_capacity(geometry.depth_len());
    ZlibDecoder::new(data)
        .read_to_end(&mut raw)
        .map_err(|e| StorageError::Codec(format!("zlib: {}", e)))?;
    if raw.len() != geometry.depth_len() {
        return Err(StorageError::Codec(format!(
            "depth plane is {} bytes, expected {}",
            raw.len(),
            geometry.depth_len()
        )));
    }
    Ok(raw)
}

/// Decode a stored JPEG color payload
pub fn decode_color(data: &[u8]) -> Result<RgbImage, StorageError> {
    let image = image::load_from_memory_with_format(data, ImageFormat::Jpeg)
        .map_err(|e| StorageError::Codec(format!("jpeg: {}", e)))?;
    Ok(image.to_rgb8())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_depth_round_trip() {
        let geometry = FrameGeometry::new(32, 24);
        let raw: Vec<u8> = (0..geometry.pixels())
            .flat_map(|i| (1000 + (i % 32) as u16).to_le_bytes())
            .collect();

        let mut compressor = DepthCompressor::new(raw.len());
        let size = compressor.compress(&raw).unwrap();
        assert!(size < raw.len());
        assert_eq!(compressor.output().len(), size);
        // zlib stream header
        assert_eq!(compressor.output()[0], 0x78);

        assert_eq!(decompress_depth(compressor.output(), geometry).unwrap(), raw);
    }

    #[test]
    fn test_compressor_reuse_is_independent() {
        let mut compressor = DepthCompressor::new(64);
        compressor.compress(&[7u8; 64]).unwrap();
        let first = compressor.output().to_vec();
        compressor.compress(&[1u8; 64]).unwrap();
        compressor.compress(&[7u8; 64]).unwrap();
        assert_eq!(compressor.output(), first.as_slice());
    }

    #[test]
    fn test_incompressible_input_fits() {
        let mut state = 0x1234_5678u32;
        let raw: Vec<u8> = (0..4096)
            .map(|_| {
                state ^= state << 13;
                state ^= state >> 17;
                state ^= state << 5;
                state as u8
            })
            .collect();

        let mut compressor = DepthCompressor::new(raw.len());
        let size = compressor.compress(&raw).unwrap();
        assert!(size <= compress_bound(raw.len()) + 64);
        let geometry = FrameGeometry::new(2048, 1);
        assert_eq!(decompress_depth(compressor.output(), geometry).unwrap(), raw);
    }

    #[test]
    fn test_jpeg_encode_decodes_to_same_size() {
        let geometry = FrameGeometry::new(16, 8);
        let rgb = vec![128u8; geometry.color_len()];

        let mut encoder = ColorEncoder::new(90);
        encoder.encode(&rgb, geometry).unwrap();
        assert_eq!(&encoder.output()[..2], &[0xFF, 0xD8]);

        let decoded = decode_color(encoder.output()).unwrap();
        assert_eq!(decoded.dimensions(), (16, 8));
        let pixel = decoded.get_pixel(3, 3);
        assert!((pixel[0] as i32 - 128).abs() <= 4);
    }

    #[test]
    fn test_jpeg_rejects_wrong_plane_size() {
        let mut encoder = ColorEncoder::new(90);
        assert!(matches!(
            encoder.encode(&[0u8; 10], FrameGeometry::new(16, 8)),
            Err(StorageError::Codec(_))
        ));
    }

    #[test]
    fn test_record_encoder_produces_both_payloads() {
        let geometry = FrameGeometry::new(16, 8);
        let mut snapshot = FrameSnapshot::new(geometry);
        snapshot.depth.fill(3);
        snapshot.color.fill(60);

        let mut encoder = RecordEncoder::new(geometry, 90);
        encoder.encode(&snapshot, geometry).unwrap();

        assert_eq!(
            decompress_depth(encoder.depth_payload(), geometry).unwrap(),
            snapshot.depth
        );
        assert_eq!(decode_color(encoder.color_payload()).unwrap().dimensions(), (16, 8));
    }

    #[test]
    fn test_wrong_depth_size_rejected() {
        let mut compressor = DepthCompressor::new(8);
        compressor.compress(&[0u8; 8]).unwrap();
        assert!(decompress_depth(compressor.output(), FrameGeometry::new(2, 1)).is_err());
    }
}
