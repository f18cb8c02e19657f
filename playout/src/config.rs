//! Player configuration.

use std::time::Duration;

use anyhow::{ensure, Result};

use crate::codec::{CHANNELS, FRAMES_PER_BLOCK, SAMPLE_RATE};
use crate::jitter_buffer::JitterBufferConfig;

/// How the render path pulls samples out of the jitter buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum PlayoutMode {
    /// One frame per render block; stale frames popped one by one.
    /// Frames are expected to hold exactly one block of samples.
    #[default]
    WholeFrame,

    /// Timing-policy driven read; frames may be any length and straddle
    /// block boundaries.
    Filtered,
}

/// Player configuration.
#[derive(Debug, Clone)]
pub struct PlayerConfig {
    // ---
    /// Sample frames per second
    pub sample_rate: u32,

    /// Interleaved channels
    pub channels: u16,

    /// Sample frames per render block. Also the staleness tolerance: a
    /// frame more than one block behind the projected position is dropped.
    pub frames_per_block: u32,

    /// Jitter buffer capacity in frames
    pub buffer_capacity: usize,

    /// Depth of the control message channel
    pub control_capacity: usize,

    pub mode: PlayoutMode,
}

impl Default for PlayerConfig {
    fn default() -> Self {
        // ---
        Self {
            sample_rate: SAMPLE_RATE,
            channels: CHANNELS,
            frames_per_block: FRAMES_PER_BLOCK,
            buffer_capacity: JitterBufferConfig::default().capacity,
            control_capacity: 100,
            mode: PlayoutMode::WholeFrame,
        }
    }
}

impl PlayerConfig {
    // ---
    /// Samples in one render block (all channels).
    pub fn block_len(&self) -> usize {
        self.frames_per_block as usize * self.channels as usize
    }

    /// Wall-clock duration of one render block.
    pub fn block_duration(&self) -> Duration {
        Duration::from_secs_f64(self.frames_per_block as f64 / self.sample_rate as f64)
    }

    pub fn jitter_buffer(&self) -> JitterBufferConfig {
        JitterBufferConfig {
            capacity: self.buffer_capacity,
            channels: self.channels as usize,
        }
    }

    /// Rejects configurations the render path cannot work with.
    pub fn validate(&self) -> Result<()> {
        // ---
        ensure!(self.sample_rate > 0, "sample rate must be positive");
        ensure!(self.channels > 0, "channel count must be positive");
        ensure!(self.frames_per_block > 0, "block size must be positive");
        ensure!(
            self.frames_per_block < i32::MAX as u32 / 2,
            "block size {} exceeds the timestamp comparison range",
            self.frames_per_block
        );
        ensure!(self.buffer_capacity > 0, "buffer capacity must be positive");
        ensure!(self.control_capacity > 0, "control channel depth must be positive");
        Ok(())
    }
}
