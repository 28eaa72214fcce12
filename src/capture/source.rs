//! Frame source abstraction.
//!
//! The raw acquisition call into a camera driver lives behind [`FrameSource`]
//! so the capture loop never depends on a concrete backend. A source is
//! opened once per session; every cycle performs one blocking `read`. Any
//! read failure is fatal to the owning session: a camera disconnect
//! invalidates the assumption of continuous capture, so the loop stops and
//! reports upward instead of retrying.

use crate::error::ReplayResult;
use crate::frame::Frame;

/// One camera (or camera-like) frame producer.
pub trait FrameSource: Send + 'static {
    /// Open the underlying device. Called once before the first `read`;
    /// failure aborts session construction.
    fn open(&mut self) -> ReplayResult<()>;

    /// Block until the next decoded frame is available.
    fn read(&mut self) -> ReplayResult<Frame>;

    /// Fixed frame dimensions `(width, height)` for this source.
    fn dimensions(&self) -> (u32, u32);

    /// Nominal frames per second the device is configured for.
    fn nominal_frame_rate(&self) -> f64;
}

/// Test-pattern source producing solid-color frames with a rolling intensity.
///
/// Useful for wiring checks without camera hardware: frame N is filled with
/// the byte `N % 256`, so buffer contents remain identifiable downstream.
pub struct SyntheticSource {
    width: u32,
    height: u32,
    channels: u32,
    frame_rate: f64,
    frames_produced: u64,
}

impl SyntheticSource {
    pub fn new(width: u32, height: u32, channels: u32, frame_rate: f64) -> Self {
        Self {
            width,
            height,
            channels,
            frame_rate,
            frames_produced: 0,
        }
    }

    pub fn frames_produced(&self) -> u64 {
        self.frames_produced
    }
}

impl FrameSource for SyntheticSource {
    fn open(&mut self) -> ReplayResult<()> {
        log::debug!(
            "[CAPTURE] synthetic source opened: {}x{}x{} @ {} fps",
            self.width,
            self.height,
            self.channels,
            self.frame_rate
        );
        Ok(())
    }

    fn read(&mut self) -> ReplayResult<Frame> {
        let value = (self.frames_produced % 256) as u8;
        self.frames_produced += 1;
        Ok(Frame::filled(self.width, self.height, self.channels, value))
    }

    fn dimensions(&self) -> (u32, u32) {
        (self.width, self.height)
    }

    fn nominal_frame_rate(&self) -> f64 {
        self.frame_rate
    }
}
