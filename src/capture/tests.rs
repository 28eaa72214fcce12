//! Session-level tests driven by a manual coordinator. Every tick is
//! followed by a wait on the event channel, so cycle counts are exact and
//! nothing depends on wall-clock timing.

use std::time::Duration;

use super::*;
use crate::frame::Frame;
use crate::sync::SyncCoordinator;

/// Source that emits frames whose first byte is a running counter, and can
/// be scripted to fail at open or after a fixed number of reads.
struct ScriptedSource {
    counter: u64,
    fail_open: bool,
    fail_after: Option<u64>,
}

impl ScriptedSource {
    fn new() -> Self {
        Self {
            counter: 0,
            fail_open: false,
            fail_after: None,
        }
    }

    fn failing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::new()
        }
    }

    fn failing_after(reads: u64) -> Self {
        Self {
            fail_after: Some(reads),
            ..Self::new()
        }
    }
}

impl FrameSource for ScriptedSource {
    fn open(&mut self) -> ReplayResult<()> {
        if self.fail_open {
            return Err(ReplayError::SourceUnavailable(
                "scripted open failure".to_string(),
            ));
        }
        Ok(())
    }

    fn read(&mut self) -> ReplayResult<Frame> {
        if self.fail_after == Some(self.counter) {
            return Err(ReplayError::AcquisitionFailure(
                "scripted device disconnect".to_string(),
            ));
        }
        let frame = Frame::filled(4, 4, 1, (self.counter % 256) as u8);
        self.counter += 1;
        Ok(frame)
    }

    fn dimensions(&self) -> (u32, u32) {
        (4, 4)
    }

    fn nominal_frame_rate(&self) -> f64 {
        25.0
    }
}

fn spawn_session(
    coordinator: &SyncCoordinator,
    source: ScriptedSource,
    capacity: usize,
) -> SessionHandle {
    let ticks = coordinator.register();
    CaptureSession::spawn(source, capacity, ticks).unwrap()
}

/// Wait for the cycle produced by the last tick and return its payload.
fn next_cycle(events: &flume::Receiver<SessionEvent>) -> (u8, usize, usize) {
    match events
        .recv_timeout(Duration::from_secs(2))
        .expect("session cycle timed out")
    {
        SessionEvent::Cycle { frame, head, tail } => (frame.data()[0], head, tail),
        SessionEvent::Fault { message } => panic!("unexpected fault: {}", message),
    }
}

fn next_fault(events: &flume::Receiver<SessionEvent>) -> String {
    match events
        .recv_timeout(Duration::from_secs(2))
        .expect("session event timed out")
    {
        SessionEvent::Fault { message } => message,
        SessionEvent::Cycle { .. } => panic!("expected a fault event"),
    }
}

#[test]
fn test_sessions_advance_in_lockstep() {
    let mut coordinator = SyncCoordinator::manual();
    let a = spawn_session(&coordinator, ScriptedSource::new(), 6);
    let b = spawn_session(&coordinator, ScriptedSource::new(), 6);
    let a_events = a.events();
    let b_events = b.events();

    for _ in 0..10 {
        coordinator.tick();
        let (_, a_head, _) = next_cycle(&a_events);
        let (_, b_head, _) = next_cycle(&b_events);
        // Both sessions have completed the same cycle when its events arrive.
        assert_eq!(a_head, b_head);
    }

    // 10 writes into 6 slots.
    assert_eq!(a.head_position(), 4);
    assert_eq!(b.head_position(), 4);
    assert_eq!(a.buffer_len(), 6);

    coordinator.shutdown();
    a.join().unwrap();
    b.join().unwrap();
}

#[test]
fn test_live_display_follows_capture() {
    let mut coordinator = SyncCoordinator::manual();
    let session = spawn_session(&coordinator, ScriptedSource::new(), 8);
    let events = session.events();

    for expected in 0..5u8 {
        coordinator.tick();
        let (value, _, _) = next_cycle(&events);
        assert_eq!(value, expected);
    }

    coordinator.shutdown();
    session.join().unwrap();
}

#[test]
fn test_playback_suspends_writes_and_live_resumes() {
    let mut coordinator = SyncCoordinator::manual();
    let session = spawn_session(&coordinator, ScriptedSource::new(), 8);
    let events = session.events();

    // Frames 0..4 go live into the buffer.
    for _ in 0..5 {
        coordinator.tick();
        next_cycle(&events);
    }
    assert_eq!(session.buffer_len(), 5);

    // Playback rewinds to the oldest frame and freezes the buffer.
    session.set_mode(ViewMode::Playback);
    assert_eq!(session.tail_position(), 0);
    for expected in 0..3u8 {
        coordinator.tick();
        let (value, head, _) = next_cycle(&events);
        assert_eq!(value, expected);
        assert_eq!(head, 5);
    }
    // Nothing was written while replaying.
    assert_eq!(session.buffer_len(), 5);

    // Back to live: the tail snaps to the head, so the next displayed frame
    // is the next one captured (sources kept producing during playback, so
    // the counter has moved on to 8).
    session.set_mode(ViewMode::Live);
    assert_eq!(session.tail_position(), 5);
    coordinator.tick();
    let (value, head, tail) = next_cycle(&events);
    assert_eq!(value, 8);
    assert_eq!(head, 6);
    assert_eq!(tail, 6);

    coordinator.shutdown();
    session.join().unwrap();
}

#[test]
fn test_peek_release_commits_tail() {
    let mut coordinator = SyncCoordinator::manual();
    let session = spawn_session(&coordinator, ScriptedSource::new(), 8);
    let events = session.events();

    for _ in 0..6 {
        coordinator.tick();
        next_cycle(&events);
    }

    // Scrub to position 2: writes continue, display shows the pinned frame.
    session.set_peek_position(2);
    session.set_mode(ViewMode::Peeking);
    coordinator.tick();
    let (value, head, _) = next_cycle(&events);
    assert_eq!(value, 2);
    assert_eq!(head, 7);

    // Releasing the scrub control resumes from the scrubbed-to frame.
    session.set_mode(ViewMode::Live);
    assert_eq!(session.tail_position(), 2);
    coordinator.tick();
    let (value, _, tail) = next_cycle(&events);
    assert_eq!(value, 2);
    assert_eq!(tail, 3);

    coordinator.shutdown();
    session.join().unwrap();
}

#[test]
fn test_stale_peek_position_shows_newest_frame() {
    let mut coordinator = SyncCoordinator::manual();
    let session = spawn_session(&coordinator, ScriptedSource::new(), 8);
    let events = session.events();

    for _ in 0..3 {
        coordinator.tick();
        next_cycle(&events);
    }

    session.set_peek_position(99);
    session.set_mode(ViewMode::Peeking);
    coordinator.tick();
    // The cycle wrote frame 3 before peeking, so the newest frame is 3.
    let (value, _, _) = next_cycle(&events);
    assert_eq!(value, 3);

    coordinator.shutdown();
    session.join().unwrap();
}

#[test]
fn test_open_failure_reports_source_unavailable() {
    let coordinator = SyncCoordinator::manual();
    let ticks = coordinator.register();
    let err = CaptureSession::spawn(ScriptedSource::failing_open(), 8, ticks).unwrap_err();
    assert!(matches!(err, ReplayError::SourceUnavailable(_)));
}

#[test]
fn test_acquisition_failure_is_fatal() {
    let mut coordinator = SyncCoordinator::manual();
    let session = spawn_session(&coordinator, ScriptedSource::failing_after(3), 8);
    let events = session.events();

    for _ in 0..3 {
        coordinator.tick();
        next_cycle(&events);
    }

    coordinator.tick();
    let message = next_fault(&events);
    assert!(message.contains("scripted device disconnect"));
    assert!(session.is_errored());

    // The three frames captured before the failure stay exportable.
    assert_eq!(session.buffer_len(), 3);
    assert_eq!(session.snapshot().frame_count(), 3);

    coordinator.shutdown();
    let err = session.join().unwrap_err();
    assert!(matches!(err, ReplayError::AcquisitionFailure(_)));
}

#[test]
fn test_clear_and_resize_through_handle() {
    let mut coordinator = SyncCoordinator::manual();
    let session = spawn_session(&coordinator, ScriptedSource::new(), 8);
    let events = session.events();

    for _ in 0..5 {
        coordinator.tick();
        next_cycle(&events);
    }

    session.resize_buffer(3).unwrap();
    assert_eq!(session.buffer_capacity(), 3);
    assert_eq!(session.buffer_len(), 3);

    assert!(matches!(
        session.resize_buffer(0),
        Err(ReplayError::InvalidCapacity { .. })
    ));

    session.clear();
    assert_eq!(session.buffer_len(), 0);
    assert_eq!(session.head_position(), 0);
    assert_eq!(session.tail_position(), 0);

    coordinator.shutdown();
    session.join().unwrap();
}

#[test]
fn test_snapshot_preserves_logical_order() {
    let mut coordinator = SyncCoordinator::manual();
    let session = spawn_session(&coordinator, ScriptedSource::new(), 4);
    let events = session.events();

    // 6 writes into 4 slots: the window holds frames 2..=5.
    for _ in 0..6 {
        coordinator.tick();
        next_cycle(&events);
    }

    let snapshot = session.snapshot();
    let values: Vec<u8> = snapshot.frames.iter().map(|f| f.data()[0]).collect();
    assert_eq!(values, vec![2, 3, 4, 5]);
    assert_eq!(snapshot.width, 4);
    assert_eq!(snapshot.height, 4);

    coordinator.shutdown();
    session.join().unwrap();
}

#[test]
fn test_stop_without_ticks() {
    let mut coordinator = SyncCoordinator::manual();
    let session = spawn_session(&coordinator, ScriptedSource::new(), 8);
    // Shutting the coordinator down disconnects the tick channel; a session
    // that never saw a tick still stops cleanly.
    coordinator.shutdown();
    session.join().unwrap();
}
