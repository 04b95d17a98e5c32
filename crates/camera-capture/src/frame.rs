//! Borrowed frame views delivered by camera drivers

use crate::CameraError;
use ring_buffer::FrameGeometry;

/// Color pixel layout as delivered by the driver
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelFormat {
    /// Interleaved R, G, B
    Rgb24,
    /// Interleaved B, G, R
    Bgr24,
    /// Packed 4:2:2, Y0 U Y1 V
    Yuyv,
}

impl PixelFormat {
    /// Bytes needed for a `width` x `height` image
    pub fn frame_len(self, width: u32, height: u32) -> usize {
        let pixels = width as usize * height as usize;
        match self {
            PixelFormat::Rgb24 | PixelFormat::Bgr24 => pixels * 3,
            PixelFormat::Yuyv => pixels * 2,
        }
    }
}

/// A completed color frame, valid only for the callback's duration
#[derive(Debug, Clone, Copy)]
pub struct ColorImage<'a> {
    pub data: &'a [u8],
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
}

impl<'a> ColorImage<'a> {
    /// Wrap an RGB24 buffer
    pub fn rgb(data: &'a [u8], width: u32, height: u32) -> Self {
        Self {
            data,
            width,
            height,
            format: PixelFormat::Rgb24,
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.width, self.height)
    }

    /// Convert into interleaved RGB24 at `dst`
    pub fn write_rgb24(&self, dst: &mut [u8]) -> Result<(), CameraError> {
        // YUYV pairs share chroma, so a pair must not cross a row
        if self.format == PixelFormat::Yuyv && self.width % 2 != 0 {
            return Err(CameraError::Format(format!(
                "YUYV frame width {} is odd",
                self.width
            )));
        }
        let expected = self.format.frame_len(self.width, self.height);
        if self.data.len() < expected {
            return Err(CameraError::Format(format!(
                "{:?} frame has {} bytes, need {}",
                self.format,
                self.data.len(),
                expected
            )));
        }
        let rgb_len = self.geometry().color_len();
        if dst.len() != rgb_len {
            return Err(CameraError::Format(format!(
                "RGB destination has {} bytes, need {}",
                dst.len(),
                rgb_len
            )));
        }

        match self.format {
            PixelFormat::Rgb24 => dst.copy_from_slice(&self.data[..rgb_len]),
            PixelFormat::Bgr24 => {
                for (out, bgr) in dst.chunks_exact_mut(3).zip(self.data.chunks_exact(3)) {
                    out[0] = bgr[2];
                    out[1] = bgr[1];
                    out[2] = bgr[0];
                }
            }
            PixelFormat::Yuyv => {
                for (out, yuyv) in dst.chunks_exact_mut(6).zip(self.data.chunks_exact(4)) {
                    let (u, v) = (yuyv[1], yuyv[3]);
                    out[..3].copy_from_slice(&yuv_to_rgb(yuyv[0], u, v));
                    out[3..].copy_from_slice(&yuv_to_rgb(yuyv[2], u, v));
                }
            }
        }
        Ok(())
    }
}

/// BT.601 limited-range conversion in fixed point
fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (y as i32 - 16).max(0) * 298;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let clamp = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clamp(c + 409 * e),
        clamp(c - 100 * d - 208 * e),
        clamp(c + 516 * d),
    ]
}

/// A completed depth frame of raw 16-bit samples
#[derive(Debug, Clone, Copy)]
pub struct DepthImage<'a> {
    pub samples: &'a [u16],
    pub width: u32,
    pub height: u32,
}

impl<'a> DepthImage<'a> {
    pub fn new(samples: &'a [u16], width: u32, height: u32) -> Self {
        Self {
            samples,
            width,
            height,
        }
    }

    pub fn geometry(&self) -> FrameGeometry {
        FrameGeometry::new(self.width, self.height)
    }

    /// Store the samples little-endian at `dst`
    pub fn write_le(&self, dst: &mut [u8]) -> Result<(), CameraError> {
        let pixels = self.geometry().pixels();
        if self.samples.len() < pixels || dst.len() != pixels * 2 {
            return Err(CameraError::Format(format!(
                "depth frame has {} samples for {} pixels ({} byte destination)",
                self.samples.len(),
                pixels,
                dst.len()
            )));
        }

        for (out, sample) in dst.chunks_exact_mut(2).zip(self.samples) {
            out.copy_from_slice(&sample.to_le_bytes());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rgb_copy() {
        let data = [1, 2, 3, 4, 5, 6];
        let mut dst = [0u8; 6];
        ColorImage::rgb(&data, 2, 1).write_rgb24(&mut dst).unwrap();
        assert_eq!(dst, data);
    }

    #[test]
    fn test_bgr_swaps_channels() {
        let data = [3, 2, 1, 6, 5, 4];
        let image = ColorImage {
            data: &data,
            width: 2,
            height: 1,
            format: PixelFormat::Bgr24,
        };
        let mut dst = [0u8; 6];
        image.write_rgb24(&mut dst).unwrap();
        assert_eq!(dst, [1, 2, 3, 4, 5, 6]);
    }

    #[test]
    fn test_yuyv_grey_levels() {
        // Neutral chroma: black and white luma extremes
        let data = [16, 128, 235, 128];
        let image = ColorImage {
            data: &data,
            width: 2,
            height: 1,
            format: PixelFormat::Yuyv,
        };
        let mut dst = [0u8; 6];
        image.write_rgb24(&mut dst).unwrap();
        assert_eq!(&dst[..3], &[0, 0, 0]);
        assert_eq!(&dst[3..], &[255, 255, 255]);
    }

    #[test]
    fn test_yuyv_odd_width_rejected() {
        let data = [16u8, 128, 235, 128, 16, 128];
        let image = ColorImage {
            data: &data,
            width: 3,
            height: 1,
            format: PixelFormat::Yuyv,
        };
        let mut dst = [0u8; 9];
        assert!(matches!(
            image.write_rgb24(&mut dst),
            Err(CameraError::Format(_))
        ));
    }

    #[test]
    fn test_short_color_frame_rejected() {
        let data = [0u8; 5];
        let mut dst = [0u8; 6];
        let err = ColorImage::rgb(&data, 2, 1).write_rgb24(&mut dst);
        assert!(matches!(err, Err(CameraError::Format(_))));
    }

    #[test]
    fn test_depth_little_endian() {
        let samples = [0x1234u16, 0xabcd];
        let mut dst = [0u8; 4];
        DepthImage::new(&samples, 2, 1).write_le(&mut dst).unwrap();
        assert_eq!(dst, [0x34, 0x12, 0xcd, 0xab]);
    }
}
