//! Jitter buffer for timestamped PCM frames.
//!
//! A bounded FIFO shared by three execution contexts: the receiver
//! (producer) enqueues frames, the render callback consumes them, and the
//! control path flushes or resets. A single mutex serializes every
//! mutation; a condition variable parks producers while the buffer is full.
//!
//! The buffer knows nothing about wall-clock time. Timing decisions are
//! supplied by the caller, either by peeking and popping frame by frame or
//! through a [`TimingDecision`] policy passed to
//! [`JitterBuffer::read_filtered`].

use std::collections::VecDeque;

use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, trace};

use crate::codec;
use crate::error::BufferError;
use crate::frame::{Frame, FrameHeader};

/// Jitter buffer configuration.
#[derive(Debug, Clone)]
pub struct JitterBufferConfig {
    // ---
    /// Maximum frames held at once
    pub capacity: usize,

    /// Interleaved channels per sample frame, used to advance the
    /// timestamp of partially consumed frames
    pub channels: usize,
}

impl Default for JitterBufferConfig {
    fn default() -> Self {
        // ---
        Self {
            capacity: 512, // ~12s of 1024-frame blocks at 44.1kHz
            channels: codec::CHANNELS as usize,
        }
    }
}

/// Verdict of a timing policy for the oldest buffered frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TimingDecision {
    /// Copy the frame's samples into the destination.
    Play,

    /// Drop the frame without copying and inspect the next one.
    Discard,

    /// Stop; the caller fills the rest of the destination with silence.
    Delay,
}

/// Outcome of [`JitterBuffer::read_filtered`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct FilteredRead {
    /// Samples written to the destination.
    pub written: usize,

    /// Whether the destination was filled completely.
    pub complete: bool,

    /// Whether the head frame was only partially consumed and retained.
    pub partial: bool,

    /// Frames dropped by a `Discard` verdict.
    pub discarded: usize,

    /// Whether reading stopped on a `Delay` verdict.
    pub delayed: bool,
}

/// Bounded, thread-safe FIFO of frames.
///
/// # Design
///
/// - **Arrival order**: frames are never reordered, only removed
/// - **Bounded**: `len() <= capacity` at all times
/// - **Non-blocking reads**: every consumer operation fails fast with
///   [`BufferError::Empty`] so the real-time render thread never waits
/// - **Blocking writes**: [`enqueue`](Self::enqueue) parks the producer
///   until a pop, flush or reset frees space, and never drops the frame
///
/// # Example
///
/// ```
/// use playout::frame::Frame;
/// use playout::jitter_buffer::{JitterBuffer, JitterBufferConfig};
///
/// let buffer = JitterBuffer::new(JitterBufferConfig { capacity: 4, channels: 2 });
///
/// buffer.try_enqueue(Frame::new(0, 0, vec![0; 8])).unwrap();
/// buffer.try_enqueue(Frame::new(1, 4, vec![0; 8])).unwrap();
///
/// assert_eq!(buffer.peek_oldest().unwrap().sequence, 0);
/// assert_eq!(buffer.pop_oldest().unwrap().sequence(), 0);
/// assert_eq!(buffer.len(), 1);
/// ```
#[derive(Debug)]
pub struct JitterBuffer {
    // ---
    /// Buffer configuration
    config: JitterBufferConfig,

    /// Buffered frames, oldest at the front
    frames: Mutex<VecDeque<Frame>>,

    /// Signalled whenever space is freed
    space_available: Condvar,
}

impl JitterBuffer {
    // ---
    /// Creates an empty jitter buffer. A zero capacity is raised to one.
    pub fn new(config: JitterBufferConfig) -> Self {
        // ---
        let config = JitterBufferConfig {
            capacity: config.capacity.max(1),
            channels: config.channels.max(1),
        };

        Self {
            frames: Mutex::new(VecDeque::with_capacity(config.capacity)),
            config,
            space_available: Condvar::new(),
        }
    }

    /// Inserts a frame at the tail, waiting for space if the buffer is full.
    ///
    /// There is no timeout: the call returns only once a pop, flush or reset
    /// elsewhere has made room. Producers that need bounded latency use
    /// [`try_enqueue`](Self::try_enqueue).
    pub fn enqueue(&self, frame: Frame) {
        // ---
        let mut frames = self.lock();
        while frames.len() >= self.config.capacity {
            trace!("Jitter buffer full, producer waiting: seq={}", frame.sequence());
            self.space_available.wait(&mut frames);
        }
        frames.push_back(frame);
    }

    /// Inserts a frame at the tail without waiting.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Full`] carrying the rejected frame if the
    /// buffer is at capacity; the buffer is left unchanged.
    pub fn try_enqueue(&self, frame: Frame) -> Result<(), BufferError> {
        // ---
        let mut frames = self.lock();
        if frames.len() >= self.config.capacity {
            return Err(BufferError::Full(frame));
        }
        frames.push_back(frame);
        Ok(())
    }

    /// Returns the oldest frame's header without removing it.
    pub fn peek_oldest(&self) -> Result<FrameHeader, BufferError> {
        // ---
        self.lock()
            .front()
            .map(Frame::header)
            .ok_or(BufferError::Empty)
    }

    /// Removes and returns the oldest frame.
    pub fn pop_oldest(&self) -> Result<Frame, BufferError> {
        // ---
        let frame = self.lock().pop_front().ok_or(BufferError::Empty)?;
        self.space_available.notify_all();
        Ok(frame)
    }

    /// Fills `dest` from the oldest frames as directed by `policy`.
    ///
    /// The policy is consulted for the head frame before every step:
    /// `Play` copies as many remaining samples as fit (a partially consumed
    /// frame stays at the head with its timestamp advanced), `Discard`
    /// drops the frame, `Delay` stops. Positions past
    /// [`FilteredRead::written`] are left for the caller to silence.
    ///
    /// # Errors
    ///
    /// Returns [`BufferError::Empty`] only if the buffer held no frame at
    /// the first inspection.
    pub fn read_filtered<F>(
        &self,
        dest: &mut [i16],
        mut policy: F,
    ) -> Result<FilteredRead, BufferError>
    where
        F: FnMut(&Frame) -> TimingDecision,
    {
        // ---
        let mut frames = self.lock();
        if frames.is_empty() {
            return Err(BufferError::Empty);
        }

        let mut read = FilteredRead::default();
        let mut removed = 0;

        while read.written < dest.len() {
            let Some(head) = frames.front_mut() else {
                break;
            };

            match policy(head) {
                TimingDecision::Play => {
                    let copied = head.read_into(&mut dest[read.written..], self.config.channels);
                    read.written += copied;
                    if head.is_consumed() {
                        frames.pop_front();
                        removed += 1;
                    } else {
                        read.partial = true;
                    }
                }
                TimingDecision::Discard => {
                    frames.pop_front();
                    removed += 1;
                    read.discarded += 1;
                }
                TimingDecision::Delay => {
                    read.delayed = true;
                    break;
                }
            }
        }
        drop(frames);

        if removed > 0 {
            self.space_available.notify_all();
        }

        read.complete = read.written == dest.len();
        Ok(read)
    }

    /// Removes every frame for which `predicate(sequence, timestamp)` holds.
    ///
    /// Survivors keep their relative order. Returns the number removed.
    pub fn flush<P>(&self, mut predicate: P) -> usize
    where
        P: FnMut(u32, u32) -> bool,
    {
        // ---
        let mut frames = self.lock();
        let before = frames.len();
        frames.retain(|f| !predicate(f.sequence(), f.timestamp()));
        let removed = before - frames.len();
        drop(frames);

        if removed > 0 {
            debug!("Flushed {} frames from jitter buffer", removed);
            self.space_available.notify_all();
        }
        removed
    }

    /// Empties the buffer and wakes every blocked producer.
    pub fn reset(&self) {
        // ---
        let dropped = {
            let mut frames = self.lock();
            let n = frames.len();
            frames.clear();
            n
        };
        debug!("Jitter buffer reset, dropped {} frames", dropped);
        self.space_available.notify_all();
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.config.capacity
    }

    #[cfg(test)]
    pub(crate) fn is_locked(&self) -> bool {
        self.frames.is_locked()
    }

    fn lock(&self) -> MutexGuard<'_, VecDeque<Frame>> {
        self.frames.lock()
    }
}
