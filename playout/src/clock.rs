//! Playback clock: maps synchronized network time onto media timestamps.
//!
//! The clock holds an anchor pair (reference time, media timestamp) set by
//! the transport `Start` command. The expected media position is always
//! derived from time elapsed since the anchor; the block counter only
//! tracks render cadence for diagnostics.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use tracing::debug;

const NANOS_PER_SEC: i128 = 1_000_000_000;

/// Monotonically increasing, cross-device synchronized time.
///
/// Implemented by the time-synchronization subsystem (PTP, NTP or a
/// sender-driven clock). Values are offsets from an epoch shared with the
/// sender of `Start` commands.
pub trait TimeSource: Send + Sync {
    fn now(&self) -> Duration;
}

/// Local monotonic time with its epoch at construction.
///
/// Suitable when the sender and receiver run on the same host, and as the
/// fallback when no network time is available.
#[derive(Debug, Clone)]
pub struct MonotonicTimeSource {
    origin: Instant,
}

impl MonotonicTimeSource {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicTimeSource {
    fn default() -> Self {
        Self::new()
    }
}

impl TimeSource for MonotonicTimeSource {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Time source advanced by hand, for simulation and tests.
#[derive(Debug, Default)]
pub struct ManualTimeSource {
    nanos: AtomicU64,
}

impl ManualTimeSource {
    pub fn new(start: Duration) -> Self {
        Self {
            nanos: AtomicU64::new(start.as_nanos() as u64),
        }
    }

    pub fn set(&self, now: Duration) {
        self.nanos.store(now.as_nanos() as u64, Ordering::SeqCst);
    }

    pub fn advance(&self, by: Duration) {
        self.nanos.fetch_add(by.as_nanos() as u64, Ordering::SeqCst);
    }
}

impl TimeSource for ManualTimeSource {
    fn now(&self) -> Duration {
        Duration::from_nanos(self.nanos.load(Ordering::SeqCst))
    }
}

/// Mapping between synchronized time and media position.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Anchor {
    /// Synchronized time at which `media_timestamp` should be rendering.
    pub reference_time: Duration,
    pub media_timestamp: u32,
}

/// Projects synchronized time onto the media timeline.
///
/// Shared between the control path (which re-anchors it) and the render
/// callback (which reads it), hence the interior mutability.
pub struct PlaybackClock {
    // ---
    time: Arc<dyn TimeSource>,
    sample_rate: u32,
    anchor: Mutex<Anchor>,

    /// Render blocks elapsed since construction
    blocks: AtomicU64,

    /// Number of explicit re-anchors
    anchors: AtomicU64,
}

impl PlaybackClock {
    // ---
    /// Creates a clock anchored at media timestamp 0 at the current time.
    pub fn new(time: Arc<dyn TimeSource>, sample_rate: u32) -> Self {
        // ---
        let anchor = Anchor {
            reference_time: time.now(),
            media_timestamp: 0,
        };

        Self {
            time,
            sample_rate,
            anchor: Mutex::new(anchor),
            blocks: AtomicU64::new(0),
            anchors: AtomicU64::new(0),
        }
    }

    /// Sets the anchor pair. Called for every transport `Start`.
    pub fn anchor(&self, reference_time: Duration, media_timestamp: u32) {
        // ---
        *self.anchor.lock() = Anchor {
            reference_time,
            media_timestamp,
        };
        let n = self.anchors.fetch_add(1, Ordering::Relaxed) + 1;
        debug!(
            "Clock anchored #{}: ts={} at {:?}",
            n, media_timestamp, reference_time
        );
    }

    /// Media timestamp that should be rendering right now.
    ///
    /// `anchor.media_timestamp + (now - anchor.reference_time) * sample_rate`,
    /// wrapping in the 32-bit timestamp space. Non-decreasing between
    /// anchors as long as the time source is monotonic. A reference time in
    /// the future projects to a position before the anchor timestamp.
    pub fn projected_now(&self) -> u32 {
        // ---
        let anchor = self.current_anchor();
        let elapsed = self.time.now().as_nanos() as i128 - anchor.reference_time.as_nanos() as i128;
        let elapsed_samples = elapsed * self.sample_rate as i128 / NANOS_PER_SEC;

        // Truncation to u32 is the intended wraparound.
        anchor.media_timestamp.wrapping_add(elapsed_samples as u32)
    }

    /// Counts one render block. Returns the new block count.
    pub fn advance_block(&self) -> u64 {
        self.blocks.fetch_add(1, Ordering::Relaxed) + 1
    }

    pub fn blocks(&self) -> u64 {
        self.blocks.load(Ordering::Relaxed)
    }

    pub fn anchor_count(&self) -> u64 {
        self.anchors.load(Ordering::Relaxed)
    }

    pub fn current_anchor(&self) -> Anchor {
        *self.anchor.lock()
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    /// Synchronized time now, as seen by this clock.
    pub fn now(&self) -> Duration {
        self.time.now()
    }
}

impl std::fmt::Debug for PlaybackClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlaybackClock")
            .field("sample_rate", &self.sample_rate)
            .field("anchor", &self.current_anchor())
            .field("blocks", &self.blocks())
            .finish()
    }
}
