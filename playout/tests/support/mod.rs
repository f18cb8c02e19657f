//! Shared fixtures for the integration tests: a sink that hands the render
//! callback to the test and a reporter that records every event.

#![allow(dead_code)]

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use playout::{
    AudioSink, ControlMessage, FrameHeader, ManualTimeSource, PlaybackReporter, Player,
    PlayerConfig, PlayerError, PlayoutMode, RenderCallback, TransportState,
};
use tokio::sync::mpsc;

/// Sink whose render callback is driven by the test instead of a device.
pub struct CapturingSink {
    tap: SinkTap,
}

/// Test-side view of a [`CapturingSink`].
#[derive(Clone, Default)]
pub struct SinkTap {
    callback: Arc<Mutex<Option<RenderCallback>>>,
    calls: Arc<Mutex<Vec<&'static str>>>,
}

impl SinkTap {
    /// Runs one render cycle into a block pre-filled with `-1`.
    pub fn render(&self, block_len: usize) -> Vec<i16> {
        // ---
        let mut out = vec![-1i16; block_len];
        let mut slot = self.callback.lock().unwrap();
        let callback = slot.as_mut().expect("sink not initialized");
        callback(&mut out, Duration::ZERO, Duration::ZERO);
        out
    }

    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, call: &'static str) {
        self.calls.lock().unwrap().push(call);
    }
}

pub fn capturing_sink() -> (CapturingSink, SinkTap) {
    let tap = SinkTap::default();
    (
        CapturingSink {
            tap: tap.clone(),
        },
        tap,
    )
}

impl AudioSink for CapturingSink {
    fn init(&mut self, callback: RenderCallback) -> anyhow::Result<()> {
        *self.tap.callback.lock().unwrap() = Some(callback);
        self.tap.record("init");
        Ok(())
    }

    fn start(&mut self) -> anyhow::Result<()> {
        self.tap.record("start");
        Ok(())
    }

    fn stop(&mut self) -> anyhow::Result<()> {
        self.tap.record("stop");
        Ok(())
    }

    fn set_volume(&mut self, _level: f64) -> anyhow::Result<()> {
        self.tap.record("volume");
        Ok(())
    }

    fn close(&mut self) -> anyhow::Result<()> {
        self.tap.record("close");
        Ok(())
    }
}

/// Reporter that keeps every event for later assertions.
#[derive(Default)]
pub struct RecordingReporter {
    pub played: Mutex<Vec<FrameHeader>>,
    pub stale: Mutex<Vec<FrameHeader>>,
    pub underruns: AtomicU64,
    pub decode_failures: AtomicU64,
    pub sink_failures: AtomicU64,
    pub transports: Mutex<Vec<TransportState>>,
}

impl RecordingReporter {
    pub fn played_timestamps(&self) -> Vec<u32> {
        self.played.lock().unwrap().iter().map(|h| h.timestamp).collect()
    }

    pub fn played_sequences(&self) -> Vec<u32> {
        self.played.lock().unwrap().iter().map(|h| h.sequence).collect()
    }

    pub fn played_count(&self) -> u64 {
        self.played.lock().unwrap().len() as u64
    }

    pub fn stale_count(&self) -> u64 {
        self.stale.lock().unwrap().len() as u64
    }

    pub fn underrun_count(&self) -> u64 {
        self.underruns.load(Ordering::SeqCst)
    }
}

impl PlaybackReporter for RecordingReporter {
    fn played(&self, frame: &FrameHeader) {
        self.played.lock().unwrap().push(*frame);
    }

    fn stale_discarded(&self, frame: &FrameHeader) {
        self.stale.lock().unwrap().push(*frame);
    }

    fn underrun(&self) {
        self.underruns.fetch_add(1, Ordering::SeqCst);
    }

    fn decode_failure(&self, _err: &PlayerError) {
        self.decode_failures.fetch_add(1, Ordering::SeqCst);
    }

    fn sink_failure(&self, _err: &PlayerError) {
        self.sink_failures.fetch_add(1, Ordering::SeqCst);
    }

    fn transport(&self, _message: &ControlMessage, state: TransportState) {
        self.transports.lock().unwrap().push(state);
    }
}

/// An initialized player on a manual clock.
pub struct Harness {
    pub player: Player<CapturingSink>,
    pub control: mpsc::Sender<ControlMessage>,
    pub time: Arc<ManualTimeSource>,
    pub tap: SinkTap,
    pub reporter: Arc<RecordingReporter>,
}

impl Harness {
    pub fn render(&self) -> Vec<i16> {
        self.tap.render(self.player.config().block_len())
    }

    pub fn start_at(&mut self, reference_time: Duration, media_timestamp: u32) {
        self.player
            .handle(ControlMessage::Start {
                reference_time,
                media_timestamp,
            })
            .unwrap();
    }
}

/// Mono, 1 kHz, `frames_per_block` sample frames per block: one sample
/// frame per simulated millisecond.
pub fn harness(frames_per_block: u32, buffer_capacity: usize, mode: PlayoutMode) -> Harness {
    // ---
    let config = PlayerConfig {
        sample_rate: 1_000,
        channels: 1,
        frames_per_block,
        buffer_capacity,
        control_capacity: 16,
        mode,
    };
    let time = Arc::new(ManualTimeSource::new(Duration::ZERO));
    let reporter = Arc::new(RecordingReporter::default());
    let (sink, tap) = capturing_sink();

    let (mut player, control) =
        Player::new(config, sink, time.clone(), reporter.clone()).unwrap();
    player.init().unwrap();

    Harness {
        player,
        control,
        time,
        tap,
        reporter,
    }
}
