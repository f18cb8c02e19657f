//! Playout under simulated network conditions.
//!
//! A sender produces one block-sized frame every block period; frames pass
//! through the arrival simulator into the jitter buffer while the sink
//! renders on the same simulated clock, `LATENCY_MS` behind the sender.

mod arrival_simulator;
mod support;

use std::time::Duration;

use arrival_simulator::{ArrivalSimulator, ArrivalSimulatorConfig, ArrivalSimulatorStats};
use playout::{Frame, PlayoutMode};
use support::{harness, Harness};

/// Sample frames per block; at 1 kHz also the block period in ms.
const BLOCK: u32 = 10;
const LATENCY_MS: u64 = 50;
const FRAMES: u32 = 200;

fn value_of(seq: u32) -> i16 {
    (seq % 1000) as i16 + 1
}

struct Outcome {
    harness: Harness,
    sim: ArrivalSimulator,
    blocks: Vec<Vec<i16>>,

    /// Sequences in the order they entered the jitter buffer
    arrivals: Vec<u32>,
}

impl Outcome {
    fn stats(&self) -> ArrivalSimulatorStats {
        self.sim.stats()
    }
}

/// Runs the session millisecond by millisecond until every frame's render
/// slot has passed.
fn run_session(config: ArrivalSimulatorConfig) -> Outcome {
    // ---
    let mut h = harness(BLOCK, 64, PlayoutMode::WholeFrame);
    let mut sim = ArrivalSimulator::new(config);
    let ingest = h.player.ingest();
    h.start_at(Duration::from_millis(LATENCY_MS), 0);

    let mut blocks = Vec::new();
    let mut arrivals = Vec::new();
    let end_ms = LATENCY_MS + (FRAMES * BLOCK) as u64;

    for ms in 0..end_ms {
        let now = Duration::from_millis(ms);
        h.time.set(now);

        if ms % BLOCK as u64 == 0 && ms < (FRAMES * BLOCK) as u64 {
            let seq = (ms / BLOCK as u64) as u32;
            let frame = Frame::new(seq, seq * BLOCK, vec![value_of(seq); BLOCK as usize]);
            sim.send(frame, now);
        }

        while let Some(frame) = sim.receive(now) {
            arrivals.push(frame.sequence());
            ingest.try_enqueue(frame).expect("buffer sized for the whole run");
        }

        if ms >= LATENCY_MS && (ms - LATENCY_MS) % BLOCK as u64 == 0 {
            blocks.push(h.render());
        }
    }

    Outcome {
        harness: h,
        sim,
        blocks,
        arrivals,
    }
}

#[test]
fn test_clean_network_plays_every_frame() {
    // ---
    let out = run_session(ArrivalSimulatorConfig::default());
    let reporter = &out.harness.reporter;

    assert_eq!(out.blocks.len(), FRAMES as usize);
    for (seq, block) in out.blocks.iter().enumerate() {
        assert_eq!(block, &vec![value_of(seq as u32); BLOCK as usize]);
    }
    assert_eq!(reporter.played_count(), FRAMES as u64);
    assert_eq!(reporter.underrun_count(), 0);
    assert_eq!(reporter.stale_count(), 0);
}

/// Jitter within the playout latency is fully absorbed.
#[test]
fn test_jitter_within_latency_is_absorbed() {
    // ---
    let out = run_session(ArrivalSimulatorConfig {
        jitter_ms: LATENCY_MS,
        seed: 7,
        ..Default::default()
    });
    let reporter = &out.harness.reporter;

    assert_eq!(reporter.played_count(), FRAMES as u64);
    assert_eq!(reporter.underrun_count(), 0);
    assert_eq!(out.sim.in_flight(), 0);
}

/// Each lost frame costs exactly one block of silence; playback stays
/// aligned afterwards.
#[test]
fn test_lost_frames_become_silent_blocks() {
    // ---
    let out = run_session(ArrivalSimulatorConfig {
        loss_rate: 0.1,
        jitter_ms: 20,
        seed: 42,
        ..Default::default()
    });
    let reporter = &out.harness.reporter;
    let lost = out.stats().frames_lost;

    assert!(lost > 0);
    assert_eq!(reporter.underrun_count(), lost);
    assert_eq!(reporter.played_count(), FRAMES as u64 - lost);
    assert_eq!(reporter.stale_count(), 0);

    // A played block always carries the frame scheduled for its slot.
    for (slot, block) in out.blocks.iter().enumerate() {
        if block[0] != 0 {
            assert_eq!(block, &vec![value_of(slot as u32); BLOCK as usize]);
        }
    }
}

/// Reordered arrivals play in the order they reached the buffer, even
/// when that is out of timestamp order, and every frame is accounted for.
#[test]
fn test_reordering_plays_in_arrival_order() {
    // ---
    let out = run_session(ArrivalSimulatorConfig {
        loss_rate: 0.05,
        jitter_ms: 20,
        reorder_rate: 0.2,
        seed: 1234,
    });
    let reporter = &out.harness.reporter;
    let stats = out.stats();

    let position = |seq: u32| {
        out.arrivals
            .iter()
            .position(|&s| s == seq)
            .expect("played frame never arrived")
    };
    let played: Vec<usize> = reporter
        .played_sequences()
        .into_iter()
        .map(position)
        .collect();
    assert!(!played.is_empty());
    assert!(played.windows(2).all(|w| w[0] < w[1]));

    let accounted = reporter.played_count()
        + reporter.stale_count()
        + out.harness.player.ingest().len() as u64
        + out.sim.in_flight() as u64
        + stats.frames_lost;
    assert_eq!(accounted, stats.frames_sent);
    assert_eq!(
        out.arrivals.len() as u64 + out.sim.in_flight() as u64 + stats.frames_lost,
        stats.frames_sent
    );

    assert_eq!(
        reporter.played_count() + reporter.underrun_count(),
        out.blocks.len() as u64
    );
}
