//! Ordered, best-effort asynchronous persistence.
//!
//! A [`FrameSink`] consumes a live frame stream during a session without
//! blocking the producer: enqueue is non-blocking, a single consumer task
//! writes strictly in arrival order, and a per-frame write failure is logged
//! and skipped rather than stopping the stream. Sequence numbers continue
//! one past the highest number already on disk, so a restarted session never
//! overwrites earlier files.

use crate::writer::FrameWriter;
use anyhow::{anyhow, Context, Result};
use camdaq_core::events::SaveEvent;
use camdaq_core::frame::Frame;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;

/// One enqueued save.
struct SaveRequest {
    frame: Arc<Frame>,
    tag: String,
}

/// Counters for one sink session, returned by [`FrameSink::finish`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SinkStats {
    /// Frames accepted by the consumer.
    pub received: u64,
    /// Frames successfully written.
    pub written: u64,
    /// Frames whose write failed and was skipped.
    pub failed: u64,
}

struct ActiveSession {
    tx: mpsc::UnboundedSender<SaveRequest>,
    task: JoinHandle<SinkStats>,
}

/// Asynchronous frame-to-disk consumer.
pub struct FrameSink {
    dir: PathBuf,
    writer: Arc<dyn FrameWriter>,
    saved_tx: broadcast::Sender<SaveEvent>,
    active: Option<ActiveSession>,
}

impl FrameSink {
    /// Create a sink writing into `dir` with the given encoder. The
    /// directory is created if missing.
    pub fn new(dir: impl Into<PathBuf>, writer: Arc<dyn FrameWriter>) -> Result<Self> {
        let dir = dir.into();
        std::fs::create_dir_all(&dir)
            .with_context(|| format!("failed to create output directory {:?}", dir))?;
        let (saved_tx, _) = broadcast::channel(256);
        Ok(Self {
            dir,
            writer,
            saved_tx,
            active: None,
        })
    }

    /// Subscribe to per-file save notifications.
    pub fn subscribe_saved(&self) -> broadcast::Receiver<SaveEvent> {
        self.saved_tx.subscribe()
    }

    /// Start a consumer session. Scans the output directory once to resume
    /// sequence numbering past any pre-existing files.
    pub fn begin(&mut self) -> Result<()> {
        if self.active.is_some() {
            return Err(anyhow!("sink session already active"));
        }
        let next_seq = next_sequence(&self.dir, self.writer.extension())?;
        tracing::info!(dir = ?self.dir, next_seq, "persistence sink started");

        let (tx, mut rx) = mpsc::unbounded_channel::<SaveRequest>();
        let dir = self.dir.clone();
        let writer = self.writer.clone();
        let saved_tx = self.saved_tx.clone();
        let task = tokio::task::spawn_blocking(move || {
            let mut stats = SinkStats::default();
            let mut seq = next_seq;
            while let Some(req) = rx.blocking_recv() {
                stats.received += 1;
                let path = dir.join(format!(
                    "{}_{:06}.{}",
                    req.tag,
                    seq,
                    writer.extension()
                ));
                // The sequence number is consumed whether or not the write
                // lands, keeping filenames aligned with arrival order.
                seq += 1;
                match writer.write(&req.frame, &path) {
                    Ok(()) => {
                        stats.written += 1;
                        let _ = saved_tx.send(SaveEvent::FrameSaved {
                            path,
                            index: req.frame.index,
                        });
                    }
                    Err(err) => {
                        stats.failed += 1;
                        tracing::warn!(
                            path = ?path,
                            index = req.frame.index,
                            error = %err,
                            "frame write failed, continuing"
                        );
                    }
                }
            }
            stats
        });

        self.active = Some(ActiveSession { tx, task });
        Ok(())
    }

    /// Queue a frame for writing. Non-blocking; returns `false` if no
    /// session is active.
    pub fn enqueue(&self, frame: Arc<Frame>, tag: &str) -> bool {
        match &self.active {
            Some(session) => session
                .tx
                .send(SaveRequest {
                    frame,
                    tag: tag.to_string(),
                })
                .is_ok(),
            None => false,
        }
    }

    /// Signal end-of-input and wait for the consumer to drain. The sink can
    /// begin a new session afterwards.
    pub async fn finish(&mut self) -> Result<SinkStats> {
        let session = self
            .active
            .take()
            .ok_or_else(|| anyhow!("no sink session active"))?;
        drop(session.tx);
        let stats = session
            .task
            .await
            .context("sink consumer task panicked")?;
        tracing::info!(
            received = stats.received,
            written = stats.written,
            failed = stats.failed,
            "persistence sink drained"
        );
        Ok(stats)
    }
}

/// One past the highest `{tag}_{NNNNNN}.{ext}` sequence number in `dir`, or
/// 1 for an empty directory. The tag is ignored on scan so concurrent tags
/// never collide on a number.
fn next_sequence(dir: &Path, extension: &str) -> Result<u64> {
    let mut max_seq = 0u64;
    for entry in std::fs::read_dir(dir)
        .with_context(|| format!("failed to scan output directory {:?}", dir))?
    {
        let entry = entry?;
        let name = entry.file_name();
        let Some(name) = name.to_str() else { continue };
        let Some(stem) = name.strip_suffix(&format!(".{}", extension)) else {
            continue;
        };
        let Some((_, seq)) = stem.rsplit_once('_') else {
            continue;
        };
        if let Ok(seq) = seq.parse::<u64>() {
            max_seq = max_seq.max(seq);
        }
    }
    Ok(max_seq + 1)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sequence_scan_skips_foreign_files() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("scan_000007.raw"), b"").unwrap();
        std::fs::write(dir.path().join("scan_000003.raw"), b"").unwrap();
        std::fs::write(dir.path().join("notes.txt"), b"").unwrap();
        std::fs::write(dir.path().join("oddname.raw"), b"").unwrap();
        assert_eq!(next_sequence(dir.path(), "raw").unwrap(), 8);
    }

    #[test]
    fn sequence_starts_at_one_in_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(next_sequence(dir.path(), "raw").unwrap(), 1);
    }
}
