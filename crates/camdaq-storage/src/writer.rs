//! Per-frame file writers.

use anyhow::{Context, Result};
use camdaq_core::frame::{Frame, PixelBuffer};
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;

/// Writes one frame to one file. Implementations choose the encoding; the
/// sink chooses the path and sequence numbering.
pub trait FrameWriter: Send + Sync {
    /// Write `frame` to `path`, creating or overwriting the file.
    fn write(&self, frame: &Frame, path: &Path) -> Result<()>;

    /// File extension for this encoding, without the dot.
    fn extension(&self) -> &'static str;
}

/// Raw little-endian pixel dump. Handles every hardware encoding; carries no
/// header, so geometry must be known from elsewhere.
pub struct RawWriter;

impl FrameWriter for RawWriter {
    fn write(&self, frame: &Frame, path: &Path) -> Result<()> {
        let file = File::create(path).with_context(|| format!("failed to create {:?}", path))?;
        let mut out = BufWriter::new(file);
        match &frame.buffer {
            PixelBuffer::Mono16(data) => {
                for value in data {
                    out.write_all(&value.to_le_bytes())?;
                }
            }
            PixelBuffer::Mono32(data) => {
                for value in data {
                    out.write_all(&value.to_le_bytes())?;
                }
            }
        }
        out.flush()
            .with_context(|| format!("failed to flush {:?}", path))?;
        Ok(())
    }

    fn extension(&self) -> &'static str {
        "raw"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;

    #[test]
    fn raw_writer_dumps_little_endian_pixels() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("frame.raw");
        let frame = Frame::new(PixelBuffer::Mono16(vec![0x0102, 0x0304]), 2, 1, 1, Utc::now());
        RawWriter.write(&frame, &path).unwrap();
        let bytes = std::fs::read(&path).unwrap();
        assert_eq!(bytes, vec![0x02, 0x01, 0x04, 0x03]);
    }
}
