//! Error types for the playout engine.
//!
//! Buffer conditions (`Empty`, `Full`) are expected control-flow signals
//! handled by the scheduler. `PlayerError` covers the two reportable
//! failures: malformed sample payloads and audio sink failures.

use thiserror::Error;

use crate::frame::Frame;

/// Conditions reported by the jitter buffer.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum BufferError {
    /// No frame to offer.
    #[error("jitter buffer is empty")]
    Empty,

    /// Non-blocking enqueue rejected; the frame is handed back to the caller.
    #[error("jitter buffer is full, frame seq={} rejected", .0.sequence())]
    Full(Frame),
}

/// Ways a sample payload can fail to produce a render block.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DecodeError {
    #[error("odd PCM payload length: {0} bytes")]
    OddLength(usize),

    #[error("payload holds {actual} samples, render block needs {expected}")]
    ShortPayload { expected: usize, actual: usize },
}

/// Sink operation that failed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SinkOp {
    Init,
    Start,
    Stop,
    SetVolume,
    Close,
}

impl std::fmt::Display for SinkOp {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            SinkOp::Init => "init",
            SinkOp::Start => "start",
            SinkOp::Stop => "stop",
            SinkOp::SetVolume => "set-volume",
            SinkOp::Close => "close",
        };
        f.write_str(name)
    }
}

/// Reportable playout failures.
#[derive(Debug, Error)]
pub enum PlayerError {
    /// Sample payload malformed. Recovered locally; playback continues.
    #[error("decode failure in frame seq={sequence}: {source}")]
    Decode {
        sequence: u32,
        #[source]
        source: DecodeError,
    },

    /// Audio sink failure. Fatal to the current playback session.
    #[error("audio sink {op} failed: {reason}")]
    Sink { op: SinkOp, reason: String },
}

impl PlayerError {
    /// Wraps a sink-side `anyhow` error, keeping its full context chain.
    pub fn sink(op: SinkOp, err: anyhow::Error) -> Self {
        Self::Sink {
            op,
            reason: format!("{err:#}"),
        }
    }
}
