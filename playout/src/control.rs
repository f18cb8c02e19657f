//! Transport control messages.
//!
//! Messages flow from the session controller (RTSP/HTTP handler, CLI) over
//! a bounded channel to the player's control loop, which applies them one
//! at a time in arrival order.

use std::str::FromStr;
use std::time::Duration;

use anyhow::{bail, Context, Result};

/// A transport command.
#[derive(Debug, Clone, PartialEq)]
pub enum ControlMessage {
    /// Stop the sink if playing and enter `Stopped`.
    Pause,

    /// Start the sink if stopped, enter `Playing` and re-anchor the clock.
    Start {
        reference_time: Duration,
        media_timestamp: u32,
    },

    /// Drop every buffered frame whose sequence number lies outside the
    /// inclusive window `[from_sequence, until_sequence]`.
    Skip {
        from_sequence: u32,
        until_sequence: u32,
    },

    /// Forward a volume level to the sink.
    Volume(f64),
}

impl ControlMessage {
    /// Short name used in logs and metrics.
    pub fn kind(&self) -> &'static str {
        match self {
            ControlMessage::Pause => "pause",
            ControlMessage::Start { .. } => "start",
            ControlMessage::Skip { .. } => "skip",
            ControlMessage::Volume(_) => "volume",
        }
    }
}

/// Transport state. Only the control loop changes it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TransportState {
    #[default]
    Stopped,
    Playing,
}

/// A line of operator input.
///
/// `start` carries no reference time: the caller anchors it to the current
/// synchronized time when converting to a [`ControlMessage`].
#[derive(Debug, Clone, PartialEq)]
pub enum Command {
    Pause,
    Start { media_timestamp: Option<u32> },
    Skip { from: u32, until: u32 },
    Volume(f64),
    Reset,
}

impl FromStr for Command {
    type Err = anyhow::Error;

    /// Parses `pause`, `start [ts]`, `skip <from> <until>`, `volume <db>`
    /// and `reset`.
    fn from_str(line: &str) -> Result<Self> {
        // ---
        let mut words = line.split_whitespace();
        let Some(verb) = words.next() else {
            bail!("empty command");
        };

        let command = match verb.to_ascii_lowercase().as_str() {
            "pause" => Command::Pause,
            "start" | "play" => Command::Start {
                media_timestamp: words
                    .next()
                    .map(|w| w.parse::<u32>().context("invalid media timestamp"))
                    .transpose()?,
            },
            "skip" => {
                let from = next_arg(&mut words, "from sequence")?;
                let until = next_arg(&mut words, "until sequence")?;
                Command::Skip { from, until }
            }
            "volume" | "vol" => {
                let level: f64 = next_arg(&mut words, "volume level")?;
                if !level.is_finite() {
                    bail!("volume level must be finite, got {level}");
                }
                Command::Volume(level)
            }
            "reset" => Command::Reset,
            other => bail!("unknown command {other:?}"),
        };

        if let Some(extra) = words.next() {
            bail!("unexpected argument {extra:?}");
        }
        Ok(command)
    }
}

fn next_arg<'a, T>(words: &mut impl Iterator<Item = &'a str>, what: &str) -> Result<T>
where
    T: FromStr,
    T::Err: std::error::Error + Send + Sync + 'static,
{
    words
        .next()
        .with_context(|| format!("missing {what}"))?
        .parse()
        .with_context(|| format!("invalid {what}"))
}
