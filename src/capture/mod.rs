//! Per-camera capture sessions.
//!
//! A capture session owns one ring buffer and one frame source and runs an
//! acquisition loop on its own thread, paced by the sync coordinator. Every
//! cycle acquires one frame, writes it to the buffer (unless in playback),
//! selects the frame to display according to the current view mode, and
//! emits a `(frame, head, tail)` event for the renderer.
//!
//! Mode and cursor changes arrive from the consumer side through
//! [`SessionHandle`] setters; they share a single `parking_lot::Mutex` with
//! the acquisition loop, which is the only lock in the session. Head/tail
//! positions are additionally published as atomics so display code can
//! sample them without taking the lock.

mod source;

#[cfg(test)]
mod tests;

pub use source::{FrameSource, SyntheticSource};

use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use parking_lot::Mutex;
use serde::{Deserialize, Serialize};

use crate::buffer::RingBuffer;
use crate::error::{ReplayError, ReplayResult};
use crate::export::BufferSnapshot;
use crate::frame::SharedFrame;
use crate::sync::TickReceiver;

/// Capacity of the per-session event channel. The renderer consuming late
/// costs dropped display frames, never a stalled capture loop.
const EVENT_CHANNEL_CAPACITY: usize = 8;

/// What the viewer is currently looking at.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ViewMode {
    /// Frames stream through the buffer; display follows the tail cursor.
    Live,
    /// Viewer is dragging the scrub control: writes continue, display shows
    /// the frame at the peek position.
    Peeking,
    /// Replaying history from the oldest frame; writes are suspended.
    Playback,
}

/// Per-cycle output of a session, sent to the renderer.
#[derive(Debug, Clone)]
pub enum SessionEvent {
    /// One completed acquisition cycle.
    Cycle {
        frame: SharedFrame,
        head: usize,
        tail: usize,
    },
    /// The session's acquisition loop died; no further cycles will follow.
    Fault { message: String },
}

/// State shared between the acquisition loop and consumer-side setters.
/// Single lock; all mode/cursor mutations go through it.
struct SessionShared {
    buffer: RingBuffer<SharedFrame>,
    mode: ViewMode,
    peek_position: usize,
}

/// The acquisition loop. Constructed internally by [`CaptureSession::spawn`]
/// and moved onto the capture thread.
pub struct CaptureSession<S: FrameSource> {
    source: S,
    shared: Arc<Mutex<SessionShared>>,
    head: Arc<AtomicUsize>,
    tail: Arc<AtomicUsize>,
    stopped: Arc<AtomicBool>,
    errored: Arc<AtomicBool>,
    events: flume::Sender<SessionEvent>,
}

impl<S: FrameSource> CaptureSession<S> {
    /// Open `source` and start the acquisition loop on a new thread, paced by
    /// `ticks`. Returns the consumer-side handle.
    ///
    /// Fails with [`ReplayError::SourceUnavailable`] if the source cannot be
    /// opened, or [`ReplayError::InvalidCapacity`] for a zero buffer size.
    pub fn spawn(
        mut source: S,
        buffer_capacity: usize,
        ticks: TickReceiver,
    ) -> ReplayResult<SessionHandle> {
        source
            .open()
            .map_err(|e| ReplayError::SourceUnavailable(e.to_string()))?;

        let (width, height) = source.dimensions();
        let frame_rate = source.nominal_frame_rate();
        log::info!(
            "[CAPTURE] session starting: {}x{} @ {} fps, buffer {} frames",
            width,
            height,
            frame_rate,
            buffer_capacity
        );

        let shared = Arc::new(Mutex::new(SessionShared {
            buffer: RingBuffer::new(buffer_capacity)?,
            mode: ViewMode::Live,
            peek_position: 0,
        }));
        let head = Arc::new(AtomicUsize::new(0));
        let tail = Arc::new(AtomicUsize::new(0));
        let stopped = Arc::new(AtomicBool::new(false));
        let errored = Arc::new(AtomicBool::new(false));
        let (event_tx, event_rx) = flume::bounded(EVENT_CHANNEL_CAPACITY);

        let session = CaptureSession {
            source,
            shared: Arc::clone(&shared),
            head: Arc::clone(&head),
            tail: Arc::clone(&tail),
            stopped: Arc::clone(&stopped),
            errored: Arc::clone(&errored),
            events: event_tx,
        };

        let join = std::thread::Builder::new()
            .name("capture-session".into())
            .spawn(move || session.run(ticks))
            .map_err(|e| ReplayError::Other(format!("failed to spawn capture thread: {}", e)))?;

        Ok(SessionHandle {
            shared,
            head,
            tail,
            stopped,
            errored,
            events: event_rx,
            join: Some(join),
            width,
            height,
            frame_rate,
        })
    }

    fn run(mut self, ticks: TickReceiver) -> ReplayResult<()> {
        loop {
            // Stop flag is observed at the top of the cycle; stopping is
            // cooperative, an in-flight acquisition completes first.
            if self.stopped.load(Ordering::SeqCst) {
                log::debug!("[CAPTURE] session stopped");
                return Ok(());
            }

            // Coordinator shutdown disconnects the tick channel.
            if ticks.recv().is_err() {
                log::debug!("[CAPTURE] tick source disconnected, session stopping");
                return Ok(());
            }
            if self.stopped.load(Ordering::SeqCst) {
                return Ok(());
            }

            let frame: SharedFrame = match self.source.read() {
                Ok(frame) => Arc::new(frame),
                Err(e) => {
                    let err = ReplayError::AcquisitionFailure(e.to_string());
                    log::error!("[CAPTURE] {}", err);
                    self.errored.store(true, Ordering::SeqCst);
                    let _ = self.events.try_send(SessionEvent::Fault {
                        message: err.to_string(),
                    });
                    return Err(err);
                }
            };

            let (display, head, tail) = self.cycle(frame);
            self.head.store(head, Ordering::Relaxed);
            self.tail.store(tail, Ordering::Relaxed);

            if let Some(frame) = display {
                // Drop the frame rather than block capture on a slow renderer.
                if let Err(flume::TrySendError::Full(_)) =
                    self.events.try_send(SessionEvent::Cycle { frame, head, tail })
                {
                    log::trace!("[CAPTURE] renderer lagging, display frame dropped");
                }
            }
        }
    }

    /// One write-select step under the session lock. Returns the display
    /// frame and the cursor positions after the cycle.
    fn cycle(&self, frame: SharedFrame) -> (Option<SharedFrame>, usize, usize) {
        let mut s = self.shared.lock();

        // Playback freezes the buffer; the incoming frame is dropped.
        if s.mode != ViewMode::Playback {
            s.buffer.write(frame);
        }

        let display = match s.mode {
            ViewMode::Peeking => {
                let position = s.peek_position;
                match s.buffer.peek(position) {
                    Ok(frame) => Some(frame),
                    Err(e) => {
                        // Same observable fallback as a bad scrub release:
                        // show the newest frame instead of going dark.
                        log::warn!("[CAPTURE] {}, showing newest frame", e);
                        s.buffer.latest()
                    }
                }
            }
            ViewMode::Live | ViewMode::Playback => s.buffer.read_at_tail(),
        };

        (display, s.buffer.head_position(), s.buffer.tail_position())
    }
}

/// Consumer-side handle to a running capture session.
///
/// Setter calls lock the session's shared state and therefore serialize with
/// the acquisition loop; position getters read published atomics and never
/// block capture.
pub struct SessionHandle {
    shared: Arc<Mutex<SessionShared>>,
    head: Arc<AtomicUsize>,
    tail: Arc<AtomicUsize>,
    stopped: Arc<AtomicBool>,
    errored: Arc<AtomicBool>,
    events: flume::Receiver<SessionEvent>,
    join: Option<JoinHandle<ReplayResult<()>>>,
    width: u32,
    height: u32,
    frame_rate: f64,
}

impl SessionHandle {
    /// Switch the viewing mode. Transitions commit cursor state:
    /// leaving `Peeking` plants the tail at the scrub position, entering
    /// `Playback` rewinds the tail to the oldest frame, and returning from
    /// `Playback` to `Live` snaps the tail to the head.
    pub fn set_mode(&self, mode: ViewMode) {
        let mut s = self.shared.lock();
        if s.mode == mode {
            return;
        }

        if s.mode == ViewMode::Peeking {
            // Resume exactly where the user released the scrub control.
            let position = s.peek_position;
            s.buffer.set_tail(position);
        }

        match (s.mode, mode) {
            (_, ViewMode::Playback) => {
                let oldest = s.buffer.oldest_position();
                s.buffer.set_tail(oldest);
            }
            (ViewMode::Playback, ViewMode::Live) => {
                s.buffer.snap_tail_to_head();
            }
            _ => {}
        }

        log::debug!("[CAPTURE] mode {:?} -> {:?}", s.mode, mode);
        s.mode = mode;
        self.tail.store(s.buffer.tail_position(), Ordering::Relaxed);
    }

    /// Move the scrub position used while peeking. Validation happens at
    /// read time; a stale out-of-range index degrades to the newest frame.
    pub fn set_peek_position(&self, position: usize) {
        self.shared.lock().peek_position = position;
    }

    pub fn mode(&self) -> ViewMode {
        self.shared.lock().mode
    }

    /// Lock-free snapshot of the write cursor.
    pub fn head_position(&self) -> usize {
        self.head.load(Ordering::Relaxed)
    }

    /// Lock-free snapshot of the read cursor.
    pub fn tail_position(&self) -> usize {
        self.tail.load(Ordering::Relaxed)
    }

    pub fn buffer_len(&self) -> usize {
        self.shared.lock().buffer.len()
    }

    pub fn buffer_capacity(&self) -> usize {
        self.shared.lock().buffer.capacity()
    }

    /// Drop all buffered history and reset both cursors.
    pub fn clear(&self) {
        let mut s = self.shared.lock();
        s.buffer.clear();
        self.head.store(0, Ordering::Relaxed);
        self.tail.store(0, Ordering::Relaxed);
    }

    /// Change the replay window length, keeping the newest frames.
    pub fn resize_buffer(&self, capacity: usize) -> ReplayResult<()> {
        let mut s = self.shared.lock();
        s.buffer.resize(capacity)?;
        self.head
            .store(s.buffer.head_position(), Ordering::Relaxed);
        self.tail
            .store(s.buffer.tail_position(), Ordering::Relaxed);
        Ok(())
    }

    /// Frozen copy of the buffer contents plus stream parameters, taken
    /// under the session lock. Capture proceeds untouched afterwards; the
    /// exporter needs no further synchronization with this session.
    pub fn snapshot(&self) -> BufferSnapshot {
        let s = self.shared.lock();
        BufferSnapshot {
            frames: s.buffer.snapshot(),
            width: self.width,
            height: self.height,
            frame_rate: self.frame_rate,
        }
    }

    /// Event stream of per-cycle `(frame, head, tail)` outputs and faults.
    /// Receivers are cheap clones; dropping them never blocks the session.
    pub fn events(&self) -> flume::Receiver<SessionEvent> {
        self.events.clone()
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn frame_rate(&self) -> f64 {
        self.frame_rate
    }

    /// True once the acquisition loop has died on a source failure.
    pub fn is_errored(&self) -> bool {
        self.errored.load(Ordering::SeqCst)
    }

    /// Request a cooperative stop; observed at the next cycle boundary.
    pub fn stop(&self) {
        self.stopped.store(true, Ordering::SeqCst);
    }

    /// Stop the session and wait for its thread, surfacing an acquisition
    /// failure if the loop died on one.
    pub fn join(mut self) -> ReplayResult<()> {
        self.stop();
        match self.join.take() {
            Some(handle) => handle
                .join()
                .map_err(|_| ReplayError::Other("capture thread panicked".to_string()))?,
            None => Ok(()),
        }
    }
}

impl std::fmt::Debug for SessionHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionHandle").finish_non_exhaustive()
    }
}
