//! Synced playout engine - CLI binary.
//!
//! Plays a synthetic tone through the timing engine: a producer thread
//! emits timestamped frames with random arrival jitter, the player renders
//! them against the synchronized clock, and transport commands are read
//! from stdin (`pause`, `start [ts]`, `skip <from> <until>`,
//! `volume <db>`, `reset`).

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use anyhow::{Context, Result};
use clap::Parser;
use rand::Rng;
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{info, warn};

use playout::{
    AudioSink, Command, ControlMessage, CpalSink, Frame, IngestHandle, MonotonicTimeSource,
    NullSink, PlaybackClock, Player, PlayerConfig, PlayoutMode, PlayoutStats, TimeSource,
};
use playout_common::{init_tracing, ColorWhen, MetricsContext, MetricsServerConfig};

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum ColorArg {
    Auto,
    Always,
    Never,
}

impl From<ColorArg> for ColorWhen {
    fn from(v: ColorArg) -> Self {
        match v {
            ColorArg::Auto => ColorWhen::Auto,
            ColorArg::Always => ColorWhen::Always,
            ColorArg::Never => ColorWhen::Never,
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy)]
enum ModeArg {
    WholeFrame,
    Filtered,
}

impl From<ModeArg> for PlayoutMode {
    fn from(v: ModeArg) -> Self {
        match v {
            ModeArg::WholeFrame => PlayoutMode::WholeFrame,
            ModeArg::Filtered => PlayoutMode::Filtered,
        }
    }
}

#[derive(clap::ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
enum SinkArg {
    /// Default system output device
    Cpal,
    /// Timer-driven sink without audio hardware
    Null,
}

/// Synced Playout - render timestamped audio against a synchronized clock
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    // ---
    /// Sample rate in Hz
    #[arg(short = 'r', long, default_value = "44100")]
    sample_rate: u32,

    /// Interleaved channels
    #[arg(short, long, default_value = "2")]
    channels: u16,

    /// Sample frames per render block (also the staleness tolerance)
    #[arg(long, default_value = "1024")]
    block_frames: u32,

    /// Jitter buffer capacity in frames
    #[arg(short = 'b', long, default_value = "512")]
    buffer_frames: usize,

    /// Playout latency between frame creation and rendering, in milliseconds
    #[arg(short, long, default_value = "200")]
    latency_ms: u64,

    /// Maximum random arrival delay added to each frame, in milliseconds
    #[arg(short, long, default_value = "20")]
    jitter_ms: u64,

    /// Test tone frequency in Hz
    #[arg(long, default_value = "440")]
    tone_hz: f32,

    /// Render mode
    #[arg(long, value_enum, default_value = "whole-frame")]
    mode: ModeArg,

    /// Audio output
    #[arg(long, value_enum, default_value = "cpal")]
    sink: SinkArg,

    /// Seconds between statistics log lines
    #[arg(long, default_value = "5")]
    stats_interval_secs: u64,

    /// Prometheus metrics bind address (serves `GET /metrics`).
    #[arg(long, default_value = "127.0.0.1:9200")]
    metrics_bind: String,

    /// Coloring
    #[arg(long, value_enum, default_value = "auto")]
    color: ColorArg,
}

/// Capture version number from Cargo.toml
const VERSION: &str = env!("CARGO_PKG_VERSION");

#[tokio::main]
async fn main() -> Result<()> {
    // ---
    let args = Args::parse();
    init_tracing(args.color.into(), "info")?;
    info!("Starting synced playout v{VERSION}");
    info!("Latency: {}ms, arrival jitter: up to {}ms", args.latency_ms, args.jitter_ms);
    info!("Metrics bind: {}", args.metrics_bind);

    let metrics = MetricsContext::new("playout")?;
    let metrics_bind = args.metrics_bind.parse().context("invalid metrics bind")?;
    let _metrics_task = metrics.spawn_metrics_server(MetricsServerConfig::new(metrics_bind));

    let config = PlayerConfig {
        sample_rate: args.sample_rate,
        channels: args.channels,
        frames_per_block: args.block_frames,
        buffer_capacity: args.buffer_frames,
        mode: args.mode.into(),
        ..PlayerConfig::default()
    };
    config.validate().context("invalid player configuration")?;

    match args.sink {
        SinkArg::Cpal => {
            let sink = CpalSink::new(config.sample_rate, config.channels, config.block_len())
                .context("failed to open audio output")?;
            run(sink, config, &args, metrics).await
        }
        SinkArg::Null => {
            let sink = NullSink::new(config.block_len(), config.block_duration());
            run(sink, config, &args, metrics).await
        }
    }
}

/// Wires producer, control input and statistics around the player and
/// runs until interrupted.
async fn run<S: AudioSink>(
    sink: S,
    config: PlayerConfig,
    args: &Args,
    metrics: MetricsContext,
) -> Result<()> {
    // ---
    let time = Arc::new(MonotonicTimeSource::new());
    let stats = Arc::new(PlayoutStats::new().with_metrics(metrics.clone()));

    let (player, control) = Player::new(config.clone(), sink, time.clone(), stats.clone())?;
    let ingest = player.ingest().with_metrics(metrics);
    let clock = player.clock();

    // Frame k is due at origin + latency + k blocks.
    let origin = time.now();
    let running = Arc::new(AtomicBool::new(true));
    let producer = ToneProducer {
        config: config.clone(),
        tone_hz: args.tone_hz,
        jitter: Duration::from_millis(args.jitter_ms),
        time: time.clone(),
        origin,
        ingest: ingest.clone(),
        running: Arc::clone(&running),
    }
    .spawn()?;

    control
        .send(ControlMessage::Start {
            reference_time: origin + Duration::from_millis(args.latency_ms),
            media_timestamp: 0,
        })
        .await
        .context("player stopped before start")?;

    let stats_task = {
        let stats = Arc::clone(&stats);
        let every = Duration::from_secs(args.stats_interval_secs.max(1));
        tokio::spawn(async move {
            let mut tick = tokio::time::interval(every);
            tick.tick().await;
            loop {
                tick.tick().await;
                stats.log();
            }
        })
    };

    let control_task = tokio::spawn(operator_input(control, clock, ingest.clone()));

    let result = player.run().await;

    running.store(false, Ordering::SeqCst);
    ingest.reset(); // wake the producer if it is blocked on a full buffer
    control_task.abort();
    stats_task.abort();
    if producer.join().is_err() {
        warn!("Tone producer panicked");
    }

    stats.log();
    result.context("playback session failed")
}

/// Translates stdin lines into transport commands until Ctrl-C.
///
/// Dropping `control` on return closes the channel and ends the player's
/// run loop.
async fn operator_input(
    control: mpsc::Sender<ControlMessage>,
    clock: Arc<PlaybackClock>,
    ingest: IngestHandle,
) {
    // ---
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut stdin_open = true;

    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                info!("Interrupted, shutting down");
                break;
            }
            line = lines.next_line(), if stdin_open => match line {
                Ok(Some(line)) if line.trim().is_empty() => {}
                Ok(Some(line)) => {
                    let message = match line.parse::<Command>() {
                        Ok(Command::Pause) => ControlMessage::Pause,
                        Ok(Command::Start { media_timestamp }) => ControlMessage::Start {
                            reference_time: clock.now(),
                            media_timestamp: media_timestamp.unwrap_or_else(|| clock.projected_now()),
                        },
                        Ok(Command::Skip { from, until }) => ControlMessage::Skip {
                            from_sequence: from,
                            until_sequence: until,
                        },
                        Ok(Command::Volume(level)) => ControlMessage::Volume(level),
                        Ok(Command::Reset) => {
                            ingest.reset();
                            continue;
                        }
                        Err(e) => {
                            warn!("Ignoring input {:?}: {:#}", line, e);
                            continue;
                        }
                    };
                    if control.send(message).await.is_err() {
                        break;
                    }
                }
                Ok(None) => {
                    info!("stdin closed; Ctrl-C to stop");
                    stdin_open = false;
                }
                Err(e) => {
                    warn!("Failed to read stdin: {}", e);
                    stdin_open = false;
                }
            }
        }
    }
}

/// Synthetic receiver: sine tone frames delivered with random delay.
struct ToneProducer {
    // ---
    config: PlayerConfig,
    tone_hz: f32,
    jitter: Duration,
    time: Arc<MonotonicTimeSource>,
    origin: Duration,
    ingest: IngestHandle,
    running: Arc<AtomicBool>,
}

impl ToneProducer {
    fn spawn(self) -> Result<thread::JoinHandle<()>> {
        thread::Builder::new()
            .name("tone-producer".into())
            .spawn(move || self.produce())
            .context("failed to spawn producer thread")
    }

    fn produce(self) {
        // ---
        let mut rng = rand::thread_rng();
        let frames_per_block = self.config.frames_per_block;
        let channels = self.config.channels as usize;
        let block = self.config.block_duration();
        let step = 2.0 * std::f32::consts::PI * self.tone_hz / self.config.sample_rate as f32;

        let mut phase = 0.0f32;
        let mut sequence: u32 = 0;
        let mut timestamp: u32 = 0;

        while self.running.load(Ordering::SeqCst) {
            let mut samples = Vec::with_capacity(self.config.block_len());
            for _ in 0..frames_per_block {
                let value = (phase.sin() * 0.2 * i16::MAX as f32) as i16;
                samples.extend(std::iter::repeat(value).take(channels));
                phase = (phase + step) % (2.0 * std::f32::consts::PI);
            }

            // Arrival time: creation time plus network delay.
            let jitter_ms = self.jitter.as_millis() as u64;
            let delay = Duration::from_millis(rng.gen_range(0..=jitter_ms));
            let arrival = self.origin + block.mul_f64(sequence as f64) + delay;
            thread::sleep(arrival.saturating_sub(self.time.now()));

            self.ingest.enqueue(Frame::new(sequence, timestamp, samples));

            sequence = sequence.wrapping_add(1);
            timestamp = timestamp.wrapping_add(frames_per_block);
        }
        info!("Tone producer stopped after {} frames", sequence);
    }
}
