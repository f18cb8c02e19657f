//! Playout reporting and statistics.
//!
//! The player reports every notable render-path and control-path event to
//! an injected [`PlaybackReporter`] instead of a process-wide logger, so
//! failure handling is observable in tests. [`PlayoutStats`] is the
//! production reporter: lock-free counters, `tracing` output and optional
//! Prometheus forwarding.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use playout_common::MetricsContext;
use tracing::{debug, error, info, warn};

use crate::control::{ControlMessage, TransportState};
use crate::error::PlayerError;
use crate::frame::FrameHeader;

/// Receives playout events from the player.
///
/// Render-path hooks (`played`, `stale_discarded`, `underrun`,
/// `decode_failure`, `render_time`, `occupancy`) run on the audio thread
/// and must not block.
pub trait PlaybackReporter: Send + Sync {
    fn played(&self, _frame: &FrameHeader) {}

    fn stale_discarded(&self, _frame: &FrameHeader) {}

    /// A render block was filled with silence because no frame was due.
    fn underrun(&self) {}

    fn decode_failure(&self, err: &PlayerError);

    fn sink_failure(&self, err: &PlayerError);

    fn render_time(&self, _elapsed: Duration) {}

    fn occupancy(&self, _frames: usize) {}

    fn transport(&self, _message: &ControlMessage, _state: TransportState) {}
}

/// Playout statistics.
///
/// Counters are atomics so the render thread can update them without
/// locking; [`log`](Self::log) is meant to be called periodically from a
/// non-real-time context.
pub struct PlayoutStats {
    // ---
    /// Frames rendered to the sink
    frames_played: AtomicU64,

    /// Frames dropped for being more than one block late
    frames_stale: AtomicU64,

    /// Blocks filled with silence
    underrun_blocks: AtomicU64,

    /// Frames whose payload could not fill a block
    decode_failures: AtomicU64,

    /// Sink start/stop/init failures
    sink_failures: AtomicU64,

    /// Transport commands processed
    transport_commands: AtomicU64,

    /// Start time for rate calculations
    start_time: Instant,

    metrics: Option<MetricsContext>,
}

/// Point-in-time copy of [`PlayoutStats`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct StatsSnapshot {
    pub frames_played: u64,
    pub frames_stale: u64,
    pub underrun_blocks: u64,
    pub decode_failures: u64,
    pub sink_failures: u64,
    pub transport_commands: u64,
}

impl StatsSnapshot {
    /// Percentage of render blocks that played silence.
    pub fn underrun_percentage(&self) -> f64 {
        // ---
        let total = self.frames_played + self.underrun_blocks;
        if total == 0 {
            0.0
        } else {
            (self.underrun_blocks as f64 / total as f64) * 100.0
        }
    }

    /// Percentage of dequeued frames that were discarded as stale.
    pub fn stale_percentage(&self) -> f64 {
        // ---
        let total = self.frames_played + self.frames_stale;
        if total == 0 {
            0.0
        } else {
            (self.frames_stale as f64 / total as f64) * 100.0
        }
    }
}

impl PlayoutStats {
    // ---
    pub fn new() -> Self {
        // ---
        Self {
            frames_played: AtomicU64::new(0),
            frames_stale: AtomicU64::new(0),
            underrun_blocks: AtomicU64::new(0),
            decode_failures: AtomicU64::new(0),
            sink_failures: AtomicU64::new(0),
            transport_commands: AtomicU64::new(0),
            start_time: Instant::now(),
            metrics: None,
        }
    }

    /// Forwards every counted event to Prometheus as well.
    pub fn with_metrics(mut self, metrics: MetricsContext) -> Self {
        // ---
        self.metrics = Some(metrics);
        self
    }

    pub fn snapshot(&self) -> StatsSnapshot {
        // ---
        StatsSnapshot {
            frames_played: self.frames_played.load(Ordering::Relaxed),
            frames_stale: self.frames_stale.load(Ordering::Relaxed),
            underrun_blocks: self.underrun_blocks.load(Ordering::Relaxed),
            decode_failures: self.decode_failures.load(Ordering::Relaxed),
            sink_failures: self.sink_failures.load(Ordering::Relaxed),
            transport_commands: self.transport_commands.load(Ordering::Relaxed),
        }
    }

    /// Returns runtime duration.
    pub fn runtime(&self) -> Duration {
        self.start_time.elapsed()
    }

    /// Logs current statistics.
    pub fn log(&self) {
        // ---
        let s = self.snapshot();
        info!(
            "Playout: {} frames played, {:.2}% underrun blocks, {:.2}% stale, {} decode failures, {} sink failures ({:.0}s)",
            s.frames_played,
            s.underrun_percentage(),
            s.stale_percentage(),
            s.decode_failures,
            s.sink_failures,
            self.runtime().as_secs_f64()
        );
    }
}

impl Default for PlayoutStats {
    fn default() -> Self {
        Self::new()
    }
}

impl PlaybackReporter for PlayoutStats {
    fn played(&self, _frame: &FrameHeader) {
        // ---
        self.frames_played.fetch_add(1, Ordering::Relaxed);
        if let Some(m) = &self.metrics {
            m.frames_played_total.inc();
        }
    }

    fn stale_discarded(&self, frame: &FrameHeader) {
        // ---
        self.frames_stale.fetch_add(1, Ordering::Relaxed);
        if let Some(m) = &self.metrics {
            m.frames_stale_total.inc();
        }
        debug!("Discarding stale frame: seq={} ts={}", frame.sequence, frame.timestamp);
    }

    fn underrun(&self) {
        // ---
        self.underrun_blocks.fetch_add(1, Ordering::Relaxed);
        if let Some(m) = &self.metrics {
            m.underrun_blocks_total.inc();
        }
    }

    fn decode_failure(&self, err: &PlayerError) {
        // ---
        self.decode_failures.fetch_add(1, Ordering::Relaxed);
        if let Some(m) = &self.metrics {
            m.decode_failures_total.inc();
        }
        warn!("Error reading frame data: {}", err);
    }

    fn sink_failure(&self, err: &PlayerError) {
        // ---
        self.sink_failures.fetch_add(1, Ordering::Relaxed);
        if let Some(m) = &self.metrics {
            m.sink_failures_total.inc();
        }
        error!("Audio sink failure, stopping playback: {}", err);
    }

    fn render_time(&self, elapsed: Duration) {
        if let Some(m) = &self.metrics {
            m.render_seconds.observe(elapsed.as_secs_f64());
        }
    }

    fn occupancy(&self, frames: usize) {
        if let Some(m) = &self.metrics {
            m.jitter_buffer_occupancy_frames.set(frames as i64);
        }
    }

    fn transport(&self, message: &ControlMessage, state: TransportState) {
        // ---
        self.transport_commands.fetch_add(1, Ordering::Relaxed);
        if let Some(m) = &self.metrics {
            m.transport_commands_total.inc();
        }
        info!("Transport {} -> {:?}", message.kind(), state);
    }
}
