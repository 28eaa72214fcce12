//! Captured video frames.
//!
//! A [`Frame`] is a fixed-shape decoded pixel buffer. Width, height and
//! channel count are fixed for the lifetime of a capture session; ordering
//! comes from buffer position, not from an intrinsic timestamp. Once written
//! into a ring buffer slot a frame is immutable: sessions store frames as
//! [`SharedFrame`] (`Arc<Frame>`), so a concurrent reader sees either the old
//! frame or the new one, never a torn mix of both.

use std::sync::Arc;

use crate::error::{ReplayError, ReplayResult};

/// A frame shared between the ring buffer, the renderer and the exporter.
pub type SharedFrame = Arc<Frame>;

/// A decoded video frame.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    width: u32,
    height: u32,
    channels: u32,
    data: Vec<u8>,
}

impl Frame {
    /// Create a frame, validating that `data` matches the declared shape.
    pub fn new(width: u32, height: u32, channels: u32, data: Vec<u8>) -> ReplayResult<Self> {
        let expected = (width as usize) * (height as usize) * (channels as usize);
        if expected == 0 || data.len() != expected {
            return Err(ReplayError::FrameShape {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            channels,
            data,
        })
    }

    /// Create a solid-color frame. Used by the synthetic source and tests.
    pub fn filled(width: u32, height: u32, channels: u32, value: u8) -> Self {
        let len = (width as usize) * (height as usize) * (channels as usize);
        Self {
            width,
            height,
            channels,
            data: vec![value; len],
        }
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn channels(&self) -> u32 {
        self.channels
    }

    /// Raw pixel bytes, row-major, `channels` bytes per pixel.
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn byte_len(&self) -> usize {
        self.data.len()
    }
}
