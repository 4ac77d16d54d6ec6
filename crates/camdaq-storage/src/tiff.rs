//! TIFF export for camera frames.
//!
//! 16-bit grayscale is the native CCD readout encoding and maps directly
//! onto a TIFF `L16` page. 32-bit accumulated data has no grayscale TIFF
//! representation in this encoder and is rejected; use
//! [`RawWriter`](crate::writer::RawWriter) for it.

use crate::writer::FrameWriter;
use anyhow::{anyhow, Context, Result};
use camdaq_core::frame::{Frame, PixelBuffer};
use std::fs::File;
use std::io::BufWriter;
use std::path::Path;

/// Writes frames as single-page 16-bit grayscale TIFF files.
pub struct TiffWriter;

impl TiffWriter {
    fn write_mono16(frame: &Frame, data: &[u16], path: &Path) -> Result<()> {
        let expected = (frame.width as usize) * (frame.height as usize);
        if data.len() != expected {
            return Err(anyhow!(
                "frame data size mismatch: expected {} pixels for {}x{}, got {}",
                expected,
                frame.width,
                frame.height,
                data.len()
            ));
        }

        let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
        let out = BufWriter::new(file);

        let bytes: Vec<u8> = data.iter().flat_map(|&v| v.to_le_bytes()).collect();
        let encoder = image::codecs::tiff::TiffEncoder::new(out);
        encoder
            .encode(
                &bytes,
                frame.width,
                frame.height,
                image::ExtendedColorType::L16,
            )
            .with_context(|| format!("failed to encode TIFF to {:?}", path))?;

        tracing::debug!(
            path = ?path,
            width = frame.width,
            height = frame.height,
            index = frame.index,
            "wrote 16-bit TIFF"
        );
        Ok(())
    }
}

impl FrameWriter for TiffWriter {
    fn write(&self, frame: &Frame, path: &Path) -> Result<()> {
        match &frame.buffer {
            PixelBuffer::Mono16(data) => Self::write_mono16(frame, data, path),
            PixelBuffer::Mono32(_) => Err(anyhow!(
                "32-bit frames cannot be written as grayscale TIFF"
            )),
        }
    }

    fn extension(&self) -> &'static str {
        "tiff"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn writes_mono16_frame() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.tiff");
        let frame = Frame::new(PixelBuffer::Mono16(vec![0u16; 8 * 4]), 8, 4, 1, Utc::now());
        TiffWriter.write(&frame, &path).unwrap();
        assert!(path.exists());
        assert!(std::fs::metadata(&path).unwrap().len() > 0);
    }

    #[test]
    fn rejects_mono32_frames() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.tiff");
        let frame = Frame::new(PixelBuffer::Mono32(vec![0i32; 4]), 2, 2, 1, Utc::now());
        assert!(TiffWriter.write(&frame, &path).is_err());
    }

    #[test]
    fn rejects_geometry_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.tiff");
        let frame = Frame::new(PixelBuffer::Mono16(vec![0u16; 10]), 8, 4, 1, Utc::now());
        assert!(TiffWriter.write(&frame, &path).is_err());
    }
}
