//! Synced Playout Library
//!
//! Playback-timing engine for a networked audio receiver: a bounded jitter
//! buffer fed by the network receiver, and a scheduler that renders due
//! frames into an audio sink at the moment dictated by a synchronized
//! clock, under control of transport commands (start/pause/skip/volume).
//!
//! ```text
//! receiver ──enqueue──▶ JitterBuffer ◀──peek/pop── Renderer ◀── sink callback
//!                             ▲                       │
//!                 flush/reset │                       ▼
//! controller ──ControlMessage──▶ Player ──anchor──▶ PlaybackClock
//!                                  └──start/stop/volume──▶ AudioSink
//! ```

pub mod audio;
pub mod clock;
pub mod codec;
pub mod config;
pub mod control;
pub mod error;
pub mod frame;
pub mod jitter_buffer;
pub mod report;
pub mod scheduler;
pub mod sink;

pub use audio::CpalSink;
pub use clock::{ManualTimeSource, MonotonicTimeSource, PlaybackClock, TimeSource};
pub use config::{PlayerConfig, PlayoutMode};
pub use control::{Command, ControlMessage, TransportState};
pub use error::{BufferError, DecodeError, PlayerError, SinkOp};
pub use frame::{Frame, FrameHeader};
pub use jitter_buffer::{FilteredRead, JitterBuffer, JitterBufferConfig, TimingDecision};
pub use report::{PlaybackReporter, PlayoutStats, StatsSnapshot};
pub use scheduler::{IngestHandle, Player, Renderer};
pub use sink::{AudioSink, NullSink, RenderCallback};
