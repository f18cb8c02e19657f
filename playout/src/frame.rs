//! Timestamped PCM frames.
//!
//! A [`Frame`] is the unit the receiver hands to the jitter buffer: a
//! sequence number, a media timestamp and a block of interleaved signed
//! 16-bit samples. The sequence and timestamp never change once the frame
//! is built; the jitter buffer may consume a prefix of the samples, in
//! which case [`Frame::timestamp`] reports the position of the first
//! remaining sample.

use crate::codec;
use crate::error::PlayerError;

/// One timestamped unit of decoded audio awaiting playback.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Frame {
    // ---
    sequence: u32,
    timestamp: u32,
    samples: Vec<i16>,

    /// Samples already handed to the sink.
    consumed: usize,

    /// Sample frames (one sample per channel) already handed to the sink.
    consumed_frames: u32,
}

/// Copyable view of a frame's metadata, returned by non-destructive peeks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FrameHeader {
    pub sequence: u32,

    /// Media timestamp of the first remaining sample.
    pub timestamp: u32,

    /// Number of samples not yet consumed.
    pub remaining: usize,
}

impl Frame {
    // ---
    /// Creates a frame from already decoded samples.
    pub fn new(sequence: u32, timestamp: u32, samples: Vec<i16>) -> Self {
        // ---
        Self {
            sequence,
            timestamp,
            samples,
            consumed: 0,
            consumed_frames: 0,
        }
    }

    /// Creates a frame from a little-endian 16-bit PCM payload.
    ///
    /// # Errors
    ///
    /// Returns [`PlayerError::Decode`] if the payload has an odd length.
    pub fn from_le_bytes(
        sequence: u32,
        timestamp: u32,
        payload: &[u8],
    ) -> Result<Self, PlayerError> {
        // ---
        let samples =
            codec::decode_pcm_le(payload).map_err(|source| PlayerError::Decode { sequence, source })?;
        Ok(Self::new(sequence, timestamp, samples))
    }

    pub fn sequence(&self) -> u32 {
        self.sequence
    }

    /// Media timestamp of the first remaining sample.
    ///
    /// Equal to the original timestamp until part of the frame has been
    /// consumed, then offset by the number of sample frames played.
    pub fn timestamp(&self) -> u32 {
        self.timestamp.wrapping_add(self.consumed_frames)
    }

    /// Samples not yet consumed.
    pub fn samples(&self) -> &[i16] {
        &self.samples[self.consumed..]
    }

    /// Number of samples not yet consumed.
    pub fn remaining(&self) -> usize {
        self.samples.len() - self.consumed
    }

    pub fn is_consumed(&self) -> bool {
        self.remaining() == 0
    }

    pub fn header(&self) -> FrameHeader {
        FrameHeader {
            sequence: self.sequence,
            timestamp: self.timestamp(),
            remaining: self.remaining(),
        }
    }

    /// Copies as many remaining samples as fit into `out` and marks them
    /// consumed. Returns the number of samples copied.
    ///
    /// `channels` converts the consumed sample count into a timestamp
    /// advance; a trailing partial sample frame does not advance it.
    pub(crate) fn read_into(&mut self, out: &mut [i16], channels: usize) -> usize {
        // ---
        let n = out.len().min(self.remaining());
        out[..n].copy_from_slice(&self.samples[self.consumed..self.consumed + n]);
        self.consumed += n;
        self.consumed_frames = (self.consumed / channels.max(1)) as u32;
        n
    }
}

/// Signed distance from `from` to `to` in media timestamp units.
///
/// Positive when `to` is ahead of `from`. Valid while the true distance is
/// below half the timestamp space.
pub fn timestamp_distance(from: u32, to: u32) -> i64 {
    to.wrapping_sub(from) as i32 as i64
}

/// Returns `true` if `sequence` lies in the inclusive window
/// `[from, until]`. An inverted window (`from > until`) is empty.
pub fn sequence_in_window(sequence: u32, from: u32, until: u32) -> bool {
    from <= sequence && sequence <= until
}
