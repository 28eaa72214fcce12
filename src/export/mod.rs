//! Buffer export: draining a frozen snapshot to a sequential media sink.
//!
//! Export runs on its own thread, one per save request, against a
//! [`BufferSnapshot`] taken under the session lock. The snapshot holds
//! `Arc` clones of the frames, so the drain never races with capture and
//! holds no lock while it runs.
//!
//! The sink contract is deliberately small: `open` with the stream
//! parameters, one `write_frame` per frame in snapshot order, then `finish`.
//! The exporter calls `finish` exactly once even when a mid-stream write
//! fails; a partial file is not guaranteed to be playable and callers should
//! treat it as discardable.

pub mod ffmpeg;

pub use ffmpeg::FfmpegSink;

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};

use crate::error::{ReplayError, ReplayResult};
use crate::frame::{Frame, SharedFrame};

/// Output codec for exported clips.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ExportCodec {
    /// H.264 in MP4 (libx264, yuv420p, faststart).
    H264,
    /// VP9 in WebM (libvpx-vp9, realtime deadline).
    Vp9,
}

impl ExportCodec {
    /// Container file extension for this codec.
    pub fn extension(&self) -> &'static str {
        match self {
            ExportCodec::H264 => "mp4",
            ExportCodec::Vp9 => "webm",
        }
    }
}

/// Stream parameters handed to a sink at open time.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct StreamParams {
    pub width: u32,
    pub height: u32,
    pub channels: u32,
    pub frame_rate: f64,
    pub codec: ExportCodec,
}

/// An ordered copy of a ring buffer's contents, frozen at snapshot time,
/// plus the stream parameters needed to encode it.
#[derive(Debug, Clone)]
pub struct BufferSnapshot {
    /// Frames in logical write order, oldest to newest.
    pub frames: Vec<SharedFrame>,
    pub width: u32,
    pub height: u32,
    pub frame_rate: f64,
}

impl BufferSnapshot {
    pub fn frame_count(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }
}

/// A sequential frame-writing sink: open once, one write per frame, one
/// finalize. Implementations report failures as [`ReplayError::ExportFailure`].
pub trait ExportSink: Send {
    fn open(&mut self, params: &StreamParams) -> ReplayResult<()>;
    fn write_frame(&mut self, frame: &Frame) -> ReplayResult<()>;
    fn finish(&mut self) -> ReplayResult<()>;
}

/// Shared progress for an in-flight export.
#[derive(Debug)]
pub struct ExportProgress {
    frames_written: AtomicU64,
    total_frames: u64,
    finished: AtomicBool,
}

impl ExportProgress {
    fn new(total_frames: u64) -> Self {
        Self {
            frames_written: AtomicU64::new(0),
            total_frames,
            finished: AtomicBool::new(false),
        }
    }

    fn increment(&self) {
        self.frames_written.fetch_add(1, Ordering::Relaxed);
    }

    fn mark_finished(&self) {
        self.finished.store(true, Ordering::SeqCst);
    }

    pub fn frames_written(&self) -> u64 {
        self.frames_written.load(Ordering::Relaxed)
    }

    pub fn total_frames(&self) -> u64 {
        self.total_frames
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

/// Result of a completed export.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ExportSummary {
    pub frames_written: u64,
    /// RFC 3339 timestamp of when the export started.
    pub started_at: String,
    #[serde(skip)]
    pub elapsed: Duration,
}

/// Handle to an export running on its own thread.
pub struct ExportHandle {
    progress: Arc<ExportProgress>,
    join: Option<JoinHandle<ReplayResult<ExportSummary>>>,
}

impl ExportHandle {
    pub fn progress(&self) -> Arc<ExportProgress> {
        Arc::clone(&self.progress)
    }

    /// Block until the export completes and return its outcome. The source
    /// buffer and ongoing capture are unaffected by an export failure.
    pub fn wait(mut self) -> ReplayResult<ExportSummary> {
        match self.join.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ReplayError::Other("export thread panicked".to_string()))?,
            None => Err(ReplayError::Other("export thread failed to start".to_string())),
        }
    }
}

/// Drains buffer snapshots to export sinks, one thread per save request.
pub struct BufferExporter;

impl BufferExporter {
    /// Start exporting `snapshot` through `sink` on a new thread.
    pub fn spawn<K: ExportSink + 'static>(
        snapshot: BufferSnapshot,
        codec: ExportCodec,
        sink: K,
    ) -> ExportHandle {
        let progress = Arc::new(ExportProgress::new(snapshot.frame_count() as u64));
        let thread_progress = Arc::clone(&progress);

        let join = std::thread::Builder::new()
            .name("buffer-export".into())
            .spawn(move || {
                let started_at = chrono::Local::now().to_rfc3339();
                let start = Instant::now();
                let result = drain(&snapshot, codec, sink, &thread_progress);
                thread_progress.mark_finished();
                let frames_written = result?;
                log::info!(
                    "[EXPORT] wrote {} frames in {:?}",
                    frames_written,
                    start.elapsed()
                );
                Ok(ExportSummary {
                    frames_written,
                    started_at,
                    elapsed: start.elapsed(),
                })
            })
            .ok();

        ExportHandle {
            progress,
            join,
        }
    }
}

/// Write every snapshot frame to the sink in order. `finish` is called
/// exactly once after `open` succeeds, even when a write fails mid-stream;
/// the first error wins.
fn drain<K: ExportSink>(
    snapshot: &BufferSnapshot,
    codec: ExportCodec,
    mut sink: K,
    progress: &ExportProgress,
) -> ReplayResult<u64> {
    let channels = snapshot
        .frames
        .first()
        .map(|f| f.channels())
        .unwrap_or(4);
    let params = StreamParams {
        width: snapshot.width,
        height: snapshot.height,
        channels,
        frame_rate: snapshot.frame_rate,
        codec,
    };

    log::info!(
        "[EXPORT] draining {} frames ({}x{} @ {} fps, {:?})",
        snapshot.frame_count(),
        params.width,
        params.height,
        params.frame_rate,
        codec
    );

    sink.open(&params)?;

    let mut written = 0u64;
    let mut write_error = None;
    for frame in &snapshot.frames {
        if let Err(e) = sink.write_frame(frame) {
            log::error!("[EXPORT] write failed after {} frames: {}", written, e);
            write_error = Some(e);
            break;
        }
        written += 1;
        progress.increment();
    }

    let finish_result = sink.finish();
    if let Some(e) = write_error {
        return Err(e);
    }
    finish_result?;
    Ok(written)
}


impl std::fmt::Debug for ExportHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ExportHandle").finish_non_exhaustive()
    }
}
