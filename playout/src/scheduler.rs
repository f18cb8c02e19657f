//! Clock-driven playout scheduler.
//!
//! The [`Player`] owns the audio sink, the playback clock and a reference
//! to the jitter buffer. It runs two paths:
//!
//! - **Render path** ([`Renderer::render`]): invoked by the sink once per
//!   hardware period on the audio thread. Decides whether the next frame
//!   is due, stale or early and fills the output block accordingly. Never
//!   blocks and never touches transport state.
//! - **Control path** ([`Player::run`]): consumes [`ControlMessage`]s in
//!   arrival order and drives the `Stopped`/`Playing` state machine, the
//!   sink, clock re-anchoring and buffer flushes.

use std::sync::Arc;
use std::time::Instant;

use playout_common::MetricsContext;
use tokio::sync::mpsc;
use tracing::{debug, info, trace, warn};

use crate::clock::{PlaybackClock, TimeSource};
use crate::codec;
use crate::config::{PlayerConfig, PlayoutMode};
use crate::control::{ControlMessage, TransportState};
use crate::error::{BufferError, PlayerError, SinkOp};
use crate::frame::{sequence_in_window, timestamp_distance, Frame, FrameHeader};
use crate::jitter_buffer::{JitterBuffer, TimingDecision};
use crate::report::PlaybackReporter;
use crate::sink::{AudioSink, RenderCallback};

/// Render-path state shared with the sink's audio thread.
pub struct Renderer {
    // ---
    clock: Arc<PlaybackClock>,
    buffer: Arc<JitterBuffer>,
    reporter: Arc<dyn PlaybackReporter>,

    /// Staleness tolerance in sample frames (one render block)
    frames_per_block: u32,
    channels: usize,
    mode: PlayoutMode,
}

impl Renderer {
    // ---
    /// Fills one output block.
    ///
    /// The block always ends up fully populated except after a decode
    /// failure, where the frame's available prefix is written and the
    /// remainder is left as it was.
    pub fn render(&self, out: &mut [i16]) {
        // ---
        let started = Instant::now();

        match self.mode {
            PlayoutMode::WholeFrame => self.render_whole_frame(out),
            PlayoutMode::Filtered => self.render_filtered(out),
        }

        self.clock.advance_block();
        self.reporter.render_time(started.elapsed());
        self.reporter.occupancy(self.buffer.len());
    }

    /// One frame per block: skip ahead past stale frames, play the first
    /// one that is at most one block late.
    fn render_whole_frame(&self, out: &mut [i16]) {
        // ---
        let target = self.clock.projected_now();

        let Ok(head) = self.buffer.peek_oldest() else {
            self.silence(out);
            return;
        };
        // Nothing due yet: leave the buffer untouched.
        if timestamp_distance(head.timestamp, target) < 0 {
            self.silence(out);
            return;
        }

        let Some(frame) = self.pop_fresh(target) else {
            self.silence(out);
            return;
        };

        match codec::copy_block(frame.samples(), out) {
            Ok(()) => self.reporter.played(&frame.header()),
            Err(source) => self.reporter.decode_failure(&PlayerError::Decode {
                sequence: frame.sequence(),
                source,
            }),
        }
    }

    /// Pops frames until one is no more than a block behind `target`.
    fn pop_fresh(&self, target: u32) -> Option<Frame> {
        // ---
        let tolerance = self.frames_per_block as i64;
        loop {
            let frame = self.buffer.pop_oldest().ok()?;
            if timestamp_distance(frame.timestamp(), target) > tolerance {
                self.reporter.stale_discarded(&frame.header());
                continue;
            }
            return Some(frame);
        }
    }

    /// Timing-policy read: frames of any length, played back to back from
    /// the start of the block.
    ///
    /// A frame whose timestamp lies ahead of the next unwritten sample is
    /// delayed whole to a later block; the rest of this block is silence.
    fn render_filtered(&self, out: &mut [i16]) {
        // ---
        let target = self.clock.projected_now();
        let tolerance = self.frames_per_block as i64;
        let channels = self.channels;
        let capacity = out.len();
        let mut planned = 0usize;

        // Reported once the buffer lock is released.
        let mut stale: Vec<FrameHeader> = Vec::new();
        let mut played: Vec<FrameHeader> = Vec::new();

        let policy = |frame: &Frame| {
            // Media position of the next unwritten sample in this block.
            let position = target.wrapping_add((planned / channels) as u32);
            let lag = timestamp_distance(frame.timestamp(), position);
            let length = (frame.remaining() / channels) as i64;

            if lag - length > tolerance {
                stale.push(frame.header());
                TimingDecision::Discard
            } else if lag < 0 {
                TimingDecision::Delay
            } else {
                let take = frame.remaining().min(capacity - planned);
                if take == frame.remaining() {
                    played.push(frame.header());
                }
                planned += take;
                TimingDecision::Play
            }
        };

        let written = match self.buffer.read_filtered(out, policy) {
            Ok(read) => {
                trace!(
                    "Filtered read: {} samples, {} discarded, partial={}",
                    read.written,
                    read.discarded,
                    read.partial
                );
                read.written
            }
            Err(_) => 0,
        };

        for header in &stale {
            self.reporter.stale_discarded(header);
        }
        for header in &played {
            self.reporter.played(header);
        }

        if written == 0 {
            self.silence(out);
        } else {
            out[written..].fill(0);
        }
    }

    fn silence(&self, out: &mut [i16]) {
        out.fill(0);
        self.reporter.underrun();
    }
}

/// Receiver-facing access to the jitter buffer.
///
/// Cheap to clone; every clone refers to the same buffer.
#[derive(Clone)]
pub struct IngestHandle {
    // ---
    buffer: Arc<JitterBuffer>,
    metrics: Option<MetricsContext>,
}

impl IngestHandle {
    // ---
    pub fn new(buffer: Arc<JitterBuffer>) -> Self {
        Self {
            buffer,
            metrics: None,
        }
    }

    /// Counts accepted frames in `frames_enqueued_total`.
    pub fn with_metrics(mut self, metrics: MetricsContext) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Pushes a frame, waiting for space. Must not be called from an async
    /// task or the render thread.
    pub fn enqueue(&self, frame: Frame) {
        // ---
        self.buffer.enqueue(frame);
        self.count_enqueued();
    }

    /// Pushes a frame, handing it back in [`BufferError::Full`] if there is
    /// no space.
    pub fn try_enqueue(&self, frame: Frame) -> Result<(), BufferError> {
        // ---
        self.buffer.try_enqueue(frame)?;
        self.count_enqueued();
        Ok(())
    }

    /// Keeps only frames whose sequence lies in `[from, until]`.
    /// Returns the number of frames removed.
    pub fn flush_window(&self, from: u32, until: u32) -> usize {
        flush_outside_window(&self.buffer, from, until)
    }

    /// Drops every buffered frame (resync or seek).
    pub fn reset(&self) {
        self.buffer.reset();
    }

    pub fn len(&self) -> usize {
        self.buffer.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buffer.is_empty()
    }

    fn count_enqueued(&self) {
        if let Some(m) = &self.metrics {
            m.frames_enqueued_total.inc();
        }
    }
}

fn flush_outside_window(buffer: &JitterBuffer, from: u32, until: u32) -> usize {
    buffer.flush(|sequence, _| !sequence_in_window(sequence, from, until))
}

/// Playout scheduler.
///
/// # Example
///
/// ```no_run
/// use std::sync::Arc;
/// use std::time::Duration;
/// use playout::{ControlMessage, Frame, NullSink, Player, PlayerConfig, PlayoutStats};
/// use playout::clock::MonotonicTimeSource;
///
/// # async fn demo() -> Result<(), Box<dyn std::error::Error>> {
/// let config = PlayerConfig::default();
/// let sink = NullSink::new(config.block_len(), config.block_duration());
/// let (player, control) = Player::new(
///     config,
///     sink,
///     Arc::new(MonotonicTimeSource::new()),
///     Arc::new(PlayoutStats::new()),
/// )?;
///
/// player.ingest().enqueue(Frame::new(0, 0, vec![0; 2048]));
/// control
///     .send(ControlMessage::Start { reference_time: Duration::ZERO, media_timestamp: 0 })
///     .await?;
/// drop(control);
///
/// player.run().await?;
/// # Ok(())
/// # }
/// ```
pub struct Player<S: AudioSink> {
    // ---
    config: PlayerConfig,
    sink: S,
    state: TransportState,
    control_rx: mpsc::Receiver<ControlMessage>,
    clock: Arc<PlaybackClock>,
    buffer: Arc<JitterBuffer>,
    renderer: Arc<Renderer>,
    reporter: Arc<dyn PlaybackReporter>,
    initialized: bool,
}

impl<S: AudioSink> Player<S> {
    // ---
    /// Creates a stopped player and its control channel.
    ///
    /// # Arguments
    ///
    /// * `config` - Stream format, block size, buffer and channel depth
    /// * `sink` - Audio output; only the player starts, stops or closes it
    /// * `time` - Synchronized time source for the playback clock
    /// * `reporter` - Receives render and control events
    ///
    /// # Errors
    ///
    /// Returns error if the configuration is invalid.
    pub fn new(
        config: PlayerConfig,
        sink: S,
        time: Arc<dyn TimeSource>,
        reporter: Arc<dyn PlaybackReporter>,
    ) -> anyhow::Result<(Self, mpsc::Sender<ControlMessage>)> {
        // ---
        config.validate()?;

        let buffer = Arc::new(JitterBuffer::new(config.jitter_buffer()));
        let clock = Arc::new(PlaybackClock::new(time, config.sample_rate));
        let renderer = Arc::new(Renderer {
            clock: Arc::clone(&clock),
            buffer: Arc::clone(&buffer),
            reporter: Arc::clone(&reporter),
            frames_per_block: config.frames_per_block,
            channels: config.channels as usize,
            mode: config.mode,
        });
        let (control_tx, control_rx) = mpsc::channel(config.control_capacity);

        let player = Self {
            config,
            sink,
            state: TransportState::Stopped,
            control_rx,
            clock,
            buffer,
            renderer,
            reporter,
            initialized: false,
        };
        Ok((player, control_tx))
    }

    /// Handle for the network receiver.
    pub fn ingest(&self) -> IngestHandle {
        IngestHandle::new(Arc::clone(&self.buffer))
    }

    pub fn clock(&self) -> Arc<PlaybackClock> {
        Arc::clone(&self.clock)
    }

    pub fn state(&self) -> TransportState {
        self.state
    }

    pub fn config(&self) -> &PlayerConfig {
        &self.config
    }

    pub fn sink(&self) -> &S {
        &self.sink
    }

    /// Registers the render callback with the sink. Idempotent.
    ///
    /// # Errors
    ///
    /// Returns [`PlayerError::Sink`] if the sink cannot be initialized.
    pub fn init(&mut self) -> Result<(), PlayerError> {
        // ---
        if self.initialized {
            return Ok(());
        }

        let renderer = Arc::clone(&self.renderer);
        let callback: RenderCallback = Box::new(move |out, _now, _dac_time| {
            renderer.render(out);
        });

        self.sink
            .init(callback)
            .map_err(|e| self.sink_failure(SinkOp::Init, e))?;
        self.initialized = true;

        info!(
            "Player ready: {} Hz, {} ch, {} frames/block, {:?} mode",
            self.config.sample_rate, self.config.channels, self.config.frames_per_block, self.config.mode
        );
        Ok(())
    }

    /// Applies one transport command.
    ///
    /// # Errors
    ///
    /// Returns [`PlayerError::Sink`] if the sink fails to start or stop;
    /// the session cannot continue. Volume failures are logged only.
    pub fn handle(&mut self, message: ControlMessage) -> Result<(), PlayerError> {
        // ---
        match message {
            ControlMessage::Pause => {
                if self.state == TransportState::Playing {
                    self.sink
                        .stop()
                        .map_err(|e| self.sink_failure(SinkOp::Stop, e))?;
                }
                self.state = TransportState::Stopped;
            }
            ControlMessage::Start {
                reference_time,
                media_timestamp,
            } => {
                if self.state == TransportState::Stopped {
                    self.sink
                        .start()
                        .map_err(|e| self.sink_failure(SinkOp::Start, e))?;
                }
                self.state = TransportState::Playing;
                self.clock.anchor(reference_time, media_timestamp);
            }
            ControlMessage::Skip {
                from_sequence,
                until_sequence,
            } => {
                let removed = flush_outside_window(&self.buffer, from_sequence, until_sequence);
                debug!(
                    "Skip to [{}, {}]: {} frames flushed",
                    from_sequence, until_sequence, removed
                );
            }
            ControlMessage::Volume(level) => {
                if let Err(e) = self.sink.set_volume(level) {
                    warn!("Failed to set volume to {:.1} dB: {:#}", level, e);
                }
            }
        }

        self.reporter.transport(&message, self.state);
        Ok(())
    }

    /// Runs the control loop until every control sender is dropped or the
    /// sink fails. The sink is closed on the way out either way.
    ///
    /// # Errors
    ///
    /// Returns [`PlayerError::Sink`] on sink init/start/stop failure.
    pub async fn run(mut self) -> Result<(), PlayerError> {
        // ---
        let result = self.control_loop().await;
        self.shutdown();
        result
    }

    async fn control_loop(&mut self) -> Result<(), PlayerError> {
        // ---
        self.init()?;

        while let Some(message) = self.control_rx.recv().await {
            trace!("Control message: {:?}", message);
            self.handle(message)?;
        }

        info!("Control channel closed");
        Ok(())
    }

    /// Stops and releases the sink. Errors are logged: the session is over.
    fn shutdown(&mut self) {
        // ---
        if self.state == TransportState::Playing {
            if let Err(e) = self.sink.stop() {
                warn!("Failed to stop audio sink during shutdown: {:#}", e);
            }
            self.state = TransportState::Stopped;
        }
        if let Err(e) = self.sink.close() {
            warn!("Failed to close audio sink: {:#}", e);
        }
        info!("Player shut down after {} render blocks", self.clock.blocks());
    }

    fn sink_failure(&self, op: SinkOp, err: anyhow::Error) -> PlayerError {
        // ---
        let err = PlayerError::sink(op, err);
        self.reporter.sink_failure(&err);
        err
    }
}

impl<S: AudioSink> std::fmt::Debug for Player<S> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Player")
            .field("state", &self.state)
            .field("buffered", &self.buffer.len())
            .field("clock", &self.clock)
            .finish()
    }
}
