//! Audio sink interface.
//!
//! The player drives a sink through `init`/`start`/`stop`/`set_volume`/
//! `close`; the sink calls the registered [`RenderCallback`] once per
//! hardware period on its own (real-time) thread.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use anyhow::{bail, Context, Result};
use tracing::{debug, info};

/// Render callback: `(output_block, current_time, output_dac_time)`.
///
/// Runs on the sink's audio thread and must fully populate the block
/// without blocking.
pub type RenderCallback = Box<dyn FnMut(&mut [i16], Duration, Duration) + Send + 'static>;

/// Hardware or OS audio output.
///
/// Not required to be `Send`: some backends (cpal on macOS) pin their
/// stream to the creating thread.
pub trait AudioSink {
    /// Registers the render callback and prepares the device, paused.
    fn init(&mut self, callback: RenderCallback) -> Result<()>;

    /// Starts invoking the render callback.
    fn start(&mut self) -> Result<()>;

    /// Stops invoking the render callback.
    fn stop(&mut self) -> Result<()>;

    /// Applies a volume level (dB, AirPlay convention: `-144.0` mutes).
    fn set_volume(&mut self, level: f64) -> Result<()>;

    /// Releases the device. The sink is unusable afterwards.
    fn close(&mut self) -> Result<()>;
}

/// Converts an AirPlay-style dB level into a linear gain.
///
/// Levels at or below `-144.0` mute; levels above 0 dB are clamped to
/// unity.
pub fn db_to_gain(level: f64) -> f32 {
    // ---
    if level <= -144.0 {
        return 0.0;
    }
    10f64.powf(level.min(0.0) / 20.0) as f32
}

/// Sink without audio hardware that renders on a timer thread.
///
/// Invokes the callback once per block period while started and discards
/// the output. Useful for headless hosts and soak tests of the timing
/// engine.
pub struct NullSink {
    // ---
    block_len: usize,
    period: Duration,
    callback: Option<RenderCallback>,
    running: Arc<AtomicBool>,
    worker: Option<JoinHandle<RenderCallback>>,
}

impl NullSink {
    /// Creates a sink rendering `block_len` samples every `period`.
    pub fn new(block_len: usize, period: Duration) -> Self {
        // ---
        Self {
            block_len,
            period,
            callback: None,
            running: Arc::new(AtomicBool::new(false)),
            worker: None,
        }
    }

    fn join_worker(&mut self) -> Result<()> {
        // ---
        if let Some(worker) = self.worker.take() {
            self.running.store(false, Ordering::SeqCst);
            let callback = worker
                .join()
                .map_err(|_| anyhow::anyhow!("null sink render thread panicked"))?;
            self.callback = Some(callback);
        }
        Ok(())
    }
}

impl AudioSink for NullSink {
    fn init(&mut self, callback: RenderCallback) -> Result<()> {
        // ---
        self.callback = Some(callback);
        info!(
            "Null sink ready: {} samples every {:?}",
            self.block_len, self.period
        );
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        // ---
        if self.worker.is_some() {
            return Ok(());
        }
        let Some(mut callback) = self.callback.take() else {
            bail!("null sink started before init");
        };

        self.running.store(true, Ordering::SeqCst);
        let running = Arc::clone(&self.running);
        let block_len = self.block_len;
        let period = self.period;

        let worker = thread::Builder::new()
            .name("null-sink-render".into())
            .spawn(move || {
                let origin = Instant::now();
                let mut block = vec![0i16; block_len];
                let mut next = origin;
                while running.load(Ordering::SeqCst) {
                    let now = origin.elapsed();
                    callback(&mut block, now, now + period);
                    next += period;
                    thread::sleep(next.saturating_duration_since(Instant::now()));
                }
                callback
            })
            .context("failed to spawn null sink render thread")?;

        self.worker = Some(worker);
        debug!("Null sink started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        // ---
        self.join_worker()?;
        debug!("Null sink stopped");
        Ok(())
    }

    fn set_volume(&mut self, level: f64) -> Result<()> {
        // ---
        debug!("Null sink volume {:.1} dB (gain {:.3})", level, db_to_gain(level));
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // ---
        self.join_worker()?;
        self.callback = None;
        Ok(())
    }
}

impl Drop for NullSink {
    fn drop(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        if let Some(worker) = self.worker.take() {
            let _ = worker.join();
        }
    }
}
