//! Frame and pixel-buffer types.
//!
//! Frames are owned, heap-allocated copies sliced out of the hardware ring
//! buffer. They are shared between the acquisition engine, observers, and the
//! persistence sink as `Arc<Frame>`; whoever pulls a frame from the reader
//! owns it transiently and releases it after forwarding.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Pixel encodings a consumer may request from the frame store.
///
/// The hardware ring buffer holds only `Mono16` and `Mono32`; `Float32` is a
/// derived format some analysis consumers ask for and is rejected by the
/// reader with `UnsupportedFormat`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PixelFormat {
    /// 16-bit unsigned pixels, the native CCD readout encoding.
    Mono16,
    /// 32-bit signed pixels, used for accumulated data.
    Mono32,
    /// 32-bit float pixels; not a hardware encoding.
    Float32,
}

impl PixelFormat {
    /// Bytes occupied by one pixel in this encoding.
    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            PixelFormat::Mono16 => 2,
            PixelFormat::Mono32 => 4,
            PixelFormat::Float32 => 4,
        }
    }

    /// Whether the hardware frame store can deliver this encoding directly.
    pub fn is_hardware_encoding(&self) -> bool {
        matches!(self, PixelFormat::Mono16 | PixelFormat::Mono32)
    }
}

impl std::fmt::Display for PixelFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let label = match self {
            PixelFormat::Mono16 => "Mono16",
            PixelFormat::Mono32 => "Mono32",
            PixelFormat::Float32 => "Float32",
        };
        write!(f, "{}", label)
    }
}

/// Owned pixel data in one of the two hardware encodings.
#[derive(Debug, Clone, PartialEq)]
pub enum PixelBuffer {
    /// 16-bit unsigned pixels.
    Mono16(Vec<u16>),
    /// 32-bit signed pixels.
    Mono32(Vec<i32>),
}

impl PixelBuffer {
    /// Number of pixels in the buffer.
    pub fn len(&self) -> usize {
        match self {
            PixelBuffer::Mono16(v) => v.len(),
            PixelBuffer::Mono32(v) => v.len(),
        }
    }

    /// True if the buffer holds no pixels.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// The encoding of this buffer.
    pub fn format(&self) -> PixelFormat {
        match self {
            PixelBuffer::Mono16(_) => PixelFormat::Mono16,
            PixelBuffer::Mono32(_) => PixelFormat::Mono32,
        }
    }

    /// Size of the pixel payload in bytes.
    pub fn size_bytes(&self) -> usize {
        self.len() * self.format().bytes_per_pixel()
    }
}

/// A single acquired image frame.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Pixel payload.
    pub buffer: PixelBuffer,
    /// Width in pixels after binning.
    pub width: u32,
    /// Height in pixels after binning.
    pub height: u32,
    /// 1-based acquisition index within the session.
    pub index: u64,
    /// Hardware-stamped or extrapolated acquisition time.
    pub timestamp: DateTime<Utc>,
}

impl Frame {
    /// Construct a frame from an owned pixel buffer.
    pub fn new(
        buffer: PixelBuffer,
        width: u32,
        height: u32,
        index: u64,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            buffer,
            width,
            height,
            index,
            timestamp,
        }
    }

    /// Size of the pixel payload in bytes.
    pub fn size_bytes(&self) -> usize {
        self.buffer.size_bytes()
    }

    /// Access 16-bit pixel data, if this frame is `Mono16`.
    pub fn as_mono16(&self) -> Option<&[u16]> {
        match &self.buffer {
            PixelBuffer::Mono16(v) => Some(v),
            PixelBuffer::Mono32(_) => None,
        }
    }

    /// Access 32-bit pixel data, if this frame is `Mono32`.
    pub fn as_mono32(&self) -> Option<&[i32]> {
        match &self.buffer {
            PixelBuffer::Mono32(v) => Some(v),
            PixelBuffer::Mono16(_) => None,
        }
    }
}

/// Readout region and binning, 1-based inclusive coordinates.
///
/// Matches the convention of index-addressed CCD drivers: `hstart..=hend`
/// columns and `vstart..=vend` rows are read out, then binned by
/// `hbin`/`vbin`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ImageArea {
    /// Horizontal binning factor.
    pub hbin: u32,
    /// Vertical binning factor.
    pub vbin: u32,
    /// First column, 1-based.
    pub hstart: u32,
    /// Last column, inclusive.
    pub hend: u32,
    /// First row, 1-based.
    pub vstart: u32,
    /// Last row, inclusive.
    pub vend: u32,
}

impl ImageArea {
    /// Full-detector area with no binning.
    pub fn full(width: u32, height: u32) -> Self {
        Self {
            hbin: 1,
            vbin: 1,
            hstart: 1,
            hend: width,
            vstart: 1,
            vend: height,
        }
    }

    /// Output width in pixels after binning.
    pub fn width(&self) -> u32 {
        (self.hend - self.hstart + 1) / self.hbin
    }

    /// Output height in pixels after binning.
    pub fn height(&self) -> u32 {
        (self.vend - self.vstart + 1) / self.vbin
    }

    /// Check the area against detector bounds and binning divisibility.
    pub fn validate(&self, detector: (u32, u32)) -> Result<(), String> {
        if self.hbin == 0 || self.vbin == 0 {
            return Err("binning factors must be at least 1".into());
        }
        if self.hstart == 0 || self.vstart == 0 {
            return Err("image area coordinates are 1-based".into());
        }
        if self.hstart > self.hend || self.vstart > self.vend {
            return Err("image area start must not exceed end".into());
        }
        if self.hend > detector.0 || self.vend > detector.1 {
            return Err(format!(
                "image area {}x{} exceeds detector {}x{}",
                self.hend, self.vend, detector.0, detector.1
            ));
        }
        if (self.hend - self.hstart + 1) % self.hbin != 0
            || (self.vend - self.vstart + 1) % self.vbin != 0
        {
            return Err("image area extent must be divisible by binning".into());
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pixel_format_sizes() {
        assert_eq!(PixelFormat::Mono16.bytes_per_pixel(), 2);
        assert_eq!(PixelFormat::Mono32.bytes_per_pixel(), 4);
        assert!(PixelFormat::Mono16.is_hardware_encoding());
        assert!(!PixelFormat::Float32.is_hardware_encoding());
    }

    #[test]
    fn frame_size_bytes() {
        let frame = Frame::new(
            PixelBuffer::Mono16(vec![0u16; 64 * 48]),
            64,
            48,
            1,
            Utc::now(),
        );
        assert_eq!(frame.size_bytes(), 64 * 48 * 2);
        assert!(frame.as_mono16().is_some());
        assert!(frame.as_mono32().is_none());
    }

    #[test]
    fn image_area_validation() {
        let full = ImageArea::full(512, 512);
        assert!(full.validate((512, 512)).is_ok());
        assert_eq!(full.width(), 512);

        let oversized = ImageArea {
            hend: 600,
            ..ImageArea::full(512, 512)
        };
        assert!(oversized.validate((512, 512)).is_err());

        let binned = ImageArea {
            hbin: 2,
            vbin: 2,
            ..ImageArea::full(512, 512)
        };
        assert_eq!(binned.width(), 256);
        assert!(binned.validate((512, 512)).is_ok());

        let indivisible = ImageArea {
            hbin: 3,
            ..ImageArea::full(512, 512)
        };
        assert!(indivisible.validate((512, 512)).is_err());
    }
}
