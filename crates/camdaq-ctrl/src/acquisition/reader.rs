//! Frame retrieval from the hardware ring buffer.
//!
//! The driver exposes frames two ways: single-frame reads the monitor uses
//! as frames arrive, and an all-or-nothing bulk read of an index range. The
//! bulk form has no incremental variant, so [`FrameBufferReader::pull_all`]
//! slices the available range into blocks sized by a caller-supplied memory
//! budget and stitches owned [`Frame`]s out of each flat block.

use crate::acquisition::session::CancelFlag;
use camdaq_core::error::{CamError, CamResult};
use camdaq_core::frame::{Frame, PixelBuffer, PixelFormat};
use camdaq_core::sdk::CameraSdk;
use chrono::{DateTime, Utc};
use std::sync::Arc;

/// Reads frames out of the hardware ring buffer as owned copies.
pub struct FrameBufferReader {
    sdk: Arc<dyn CameraSdk>,
    width: u32,
    height: u32,
}

impl FrameBufferReader {
    /// Reader for frames of the given post-binning geometry.
    pub fn new(sdk: Arc<dyn CameraSdk>, width: u32, height: u32) -> Self {
        Self { sdk, width, height }
    }

    fn pixels_per_frame(&self) -> usize {
        (self.width as usize) * (self.height as usize)
    }

    /// Size of one frame in bytes for the given encoding.
    pub fn frame_size_bytes(&self, format: PixelFormat) -> usize {
        self.pixels_per_frame() * format.bytes_per_pixel()
    }

    /// Pull a single frame by 1-based index.
    ///
    /// `Ok(None)` means the frame is not in the ring buffer yet, an expected
    /// race with the acquisition clock, not a failure.
    pub async fn pull_one(
        &self,
        index: u64,
        format: PixelFormat,
        timestamp: DateTime<Utc>,
    ) -> CamResult<Option<Frame>> {
        if !format.is_hardware_encoding() {
            return Err(CamError::UnsupportedFormat(format));
        }
        let Some(buffer) = self.sdk.read_frame(index, format).await? else {
            return Ok(None);
        };
        Ok(Some(Frame::new(
            buffer,
            self.width,
            self.height,
            index,
            timestamp,
        )))
    }

    /// Pull every frame currently available, in index order, using at most
    /// `budget_bytes` of pixel data per driver round-trip.
    ///
    /// The block size is `clamp(budget / frame_size, 1, total)`: a budget
    /// smaller than one frame degrades to frame-at-a-time rather than
    /// failing. `stamp` assigns each frame its timestamp from its 1-based
    /// index. Cancellation is checked between blocks and surfaces as
    /// [`CamError::Cancelled`] so callers never mistake a truncated result
    /// for a complete one.
    pub async fn pull_all(
        &self,
        format: PixelFormat,
        budget_bytes: usize,
        cancel: &CancelFlag,
        stamp: impl Fn(u64) -> DateTime<Utc>,
    ) -> CamResult<Vec<Frame>> {
        if !format.is_hardware_encoding() {
            return Err(CamError::UnsupportedFormat(format));
        }
        let Some((first, last)) = self.sdk.available_frame_range().await? else {
            return Ok(Vec::new());
        };
        let total = last - first + 1;
        let frame_size = self.frame_size_bytes(format);
        let per_block = ((budget_bytes / frame_size.max(1)) as u64).clamp(1, total);

        tracing::debug!(
            first,
            last,
            per_block,
            frame_bytes = frame_size,
            "bulk frame retrieval"
        );

        let mut frames = Vec::with_capacity(total as usize);
        let mut block_first = first;
        while block_first <= last {
            if cancel.is_cancelled() {
                return Err(CamError::Cancelled);
            }
            let block_last = (block_first + per_block - 1).min(last);
            let flat = self.sdk.read_frames(block_first, block_last, format).await?;
            self.split_block(flat, block_first, block_last, &stamp, &mut frames)?;
            block_first = block_last + 1;
        }
        Ok(frames)
    }

    fn split_block(
        &self,
        flat: PixelBuffer,
        first: u64,
        last: u64,
        stamp: &impl Fn(u64) -> DateTime<Utc>,
        out: &mut Vec<Frame>,
    ) -> CamResult<()> {
        let pixels = self.pixels_per_frame();
        let expected = pixels * ((last - first + 1) as usize);
        if flat.len() != expected {
            return Err(CamError::AcquisitionFault(format!(
                "bulk read returned {} pixels for frames {}..={}, expected {}",
                flat.len(),
                first,
                last,
                expected
            )));
        }
        match flat {
            PixelBuffer::Mono16(data) => {
                for (offset, chunk) in data.chunks_exact(pixels).enumerate() {
                    let index = first + offset as u64;
                    out.push(Frame::new(
                        PixelBuffer::Mono16(chunk.to_vec()),
                        self.width,
                        self.height,
                        index,
                        stamp(index),
                    ));
                }
            }
            PixelBuffer::Mono32(data) => {
                for (offset, chunk) in data.chunks_exact(pixels).enumerate() {
                    let index = first + offset as u64;
                    out.push(Frame::new(
                        PixelBuffer::Mono32(chunk.to_vec()),
                        self.width,
                        self.height,
                        index,
                        stamp(index),
                    ));
                }
            }
        }
        Ok(())
    }
}
