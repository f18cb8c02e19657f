//! Audio output using cpal.
//!
//! Implements [`AudioSink`] on the system's default output device. cpal
//! decides how many samples each hardware callback wants; the render path
//! works in fixed blocks, so a small adapter sits between the two.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, OutputCallbackInfo, Stream, StreamConfig, StreamInstant};
use tracing::{debug, info, warn};

use crate::sink::{db_to_gain, AudioSink, RenderCallback};

/// Audio sink for real-time PCM playback.
///
/// Uses cpal for cross-platform audio output. The stream is built paused
/// in [`init`](AudioSink::init) and toggled by `start`/`stop`.
///
/// # Thread Safety
///
/// cpal streams are not `Send` on every platform, so a `CpalSink` must
/// stay on the thread that created it. The render callback itself runs on
/// cpal's audio thread.
pub struct CpalSink {
    // ---
    device: Device,
    config: StreamConfig,
    block_len: usize,

    /// Linear gain as `f32` bits, read by the audio thread
    gain: Arc<AtomicU32>,

    /// Set on start so stale staging samples from before a pause are dropped
    resync: Arc<AtomicBool>,

    stream: Option<Stream>,
}

impl CpalSink {
    // ---
    /// Opens the default output device.
    ///
    /// # Arguments
    ///
    /// * `sample_rate` - Stream sample rate in Hz
    /// * `channels` - Interleaved channel count
    /// * `block_len` - Samples per render block (all channels)
    ///
    /// # Errors
    ///
    /// Returns error if no audio output device is available.
    pub fn new(sample_rate: u32, channels: u16, block_len: usize) -> Result<Self> {
        // ---
        info!("Initializing audio playback");

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .context("no output device available")?;

        info!("Using audio device: {}", device.name()?);

        let config = StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };
        debug!("Stream config: {:?}", config);

        Ok(Self {
            device,
            config,
            block_len,
            gain: Arc::new(AtomicU32::new(1.0f32.to_bits())),
            resync: Arc::new(AtomicBool::new(true)),
            stream: None,
        })
    }

    fn stream(&self) -> Result<&Stream> {
        self.stream
            .as_ref()
            .context("audio stream not initialized")
    }
}

impl AudioSink for CpalSink {
    fn init(&mut self, callback: RenderCallback) -> Result<()> {
        // ---
        let mut adapter = BlockAdapter::new(
            self.block_len,
            callback,
            Arc::clone(&self.gain),
            Arc::clone(&self.resync),
        );

        let stream = self
            .device
            .build_output_stream(
                &self.config,
                move |data: &mut [i16], info: &OutputCallbackInfo| {
                    adapter.fill(data, info);
                },
                |err| {
                    warn!("Audio stream error: {}", err);
                },
                None,
            )
            .context("failed to build output stream")?;

        // Some backends start streams on creation.
        stream.pause().context("failed to pause new audio stream")?;
        self.stream = Some(stream);

        info!("Audio stream created successfully");
        Ok(())
    }

    fn start(&mut self) -> Result<()> {
        // ---
        self.resync.store(true, Ordering::Release);
        self.stream()?
            .play()
            .context("failed to start audio stream")?;
        info!("Audio stream started");
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        // ---
        self.stream()?
            .pause()
            .context("failed to pause audio stream")?;
        info!("Audio stream paused");
        Ok(())
    }

    fn set_volume(&mut self, level: f64) -> Result<()> {
        // ---
        let gain = db_to_gain(level);
        self.gain.store(gain.to_bits(), Ordering::Relaxed);
        info!("Volume set to {:.1} dB (gain {:.3})", level, gain);
        Ok(())
    }

    fn close(&mut self) -> Result<()> {
        // ---
        if self.stream.take().is_some() {
            info!("Audio stream closed");
        }
        Ok(())
    }
}

/// Bridges cpal's variable-length callbacks to fixed render blocks.
///
/// Holds one staged block; whenever it is drained the render callback is
/// asked for the next one. Allocation happens only at construction.
struct BlockAdapter {
    // ---
    block: Vec<i16>,
    pos: usize,
    callback: RenderCallback,
    gain: Arc<AtomicU32>,
    resync: Arc<AtomicBool>,
    origin: Option<StreamInstant>,
}

impl BlockAdapter {
    fn new(
        block_len: usize,
        callback: RenderCallback,
        gain: Arc<AtomicU32>,
        resync: Arc<AtomicBool>,
    ) -> Self {
        // ---
        Self {
            block: vec![0; block_len],
            pos: block_len,
            callback,
            gain,
            resync,
            origin: None,
        }
    }

    fn fill(&mut self, data: &mut [i16], info: &OutputCallbackInfo) {
        // ---
        let ts = info.timestamp();
        let origin = *self.origin.get_or_insert(ts.callback);
        let now = ts.callback.duration_since(&origin).unwrap_or_default();
        let dac_time = ts.playback.duration_since(&origin).unwrap_or(now);

        self.fill_at(data, now, dac_time);
    }

    fn fill_at(&mut self, data: &mut [i16], now: Duration, dac_time: Duration) {
        // ---
        if self.resync.swap(false, Ordering::AcqRel) {
            self.pos = self.block.len();
        }

        let gain = f32::from_bits(self.gain.load(Ordering::Relaxed));
        let mut written = 0;

        while written < data.len() {
            if self.pos == self.block.len() {
                (self.callback)(&mut self.block, now, dac_time);
                self.pos = 0;
            }

            let n = (self.block.len() - self.pos).min(data.len() - written);
            let src = &self.block[self.pos..self.pos + n];
            let dst = &mut data[written..written + n];

            if gain == 1.0 {
                dst.copy_from_slice(src);
            } else {
                for (d, &s) in dst.iter_mut().zip(src) {
                    *d = (s as f32 * gain) as i16;
                }
            }

            self.pos += n;
            written += n;
        }
    }
}

#[cfg(test)]
mod tests {
    // ---
    use super::*;
    use std::sync::atomic::AtomicI16;

    fn adapter(block_len: usize) -> (BlockAdapter, Arc<AtomicU32>, Arc<AtomicBool>) {
        // ---
        let next = Arc::new(AtomicI16::new(1));
        let callback: RenderCallback = Box::new(move |block, _, _| {
            let value = next.fetch_add(1, Ordering::SeqCst);
            block.fill(value);
        });
        let gain = Arc::new(AtomicU32::new(1.0f32.to_bits()));
        let resync = Arc::new(AtomicBool::new(false));
        let adapter = BlockAdapter::new(block_len, callback, gain.clone(), resync.clone());
        (adapter, gain, resync)
    }

    #[test]
    fn test_adapter_spans_blocks() {
        // ---
        let (mut adapter, _, _) = adapter(4);
        let mut data = [0i16; 6];

        adapter.fill_at(&mut data, Duration::ZERO, Duration::ZERO);
        assert_eq!(data, [1, 1, 1, 1, 2, 2]);

        adapter.fill_at(&mut data, Duration::ZERO, Duration::ZERO);
        assert_eq!(data, [2, 2, 3, 3, 3, 3]);
    }

    #[test]
    fn test_adapter_applies_gain() {
        // ---
        let (mut adapter, gain, _) = adapter(4);
        gain.store(0.5f32.to_bits(), Ordering::Relaxed);

        let mut data = [0i16; 4];
        adapter.fill_at(&mut data, Duration::ZERO, Duration::ZERO);
        assert_eq!(data, [0; 4]); // 1 * 0.5 truncates to 0

        adapter.fill_at(&mut data, Duration::ZERO, Duration::ZERO);
        assert_eq!(data, [1; 4]); // 2 * 0.5
    }

    #[test]
    fn test_adapter_resync_drops_staged_samples() {
        // ---
        let (mut adapter, _, resync) = adapter(4);
        let mut data = [0i16; 2];
        adapter.fill_at(&mut data, Duration::ZERO, Duration::ZERO);
        assert_eq!(data, [1, 1]);

        resync.store(true, Ordering::Release);
        adapter.fill_at(&mut data, Duration::ZERO, Duration::ZERO);
        assert_eq!(data, [2, 2]);
    }

    #[test]
    fn test_cpal_sink_lifecycle() {
        // ---
        // This test requires an audio device, so it may fail in CI
        let Ok(mut sink) = CpalSink::new(44_100, 2, 2048) else {
            println!("Skipping: no audio device available (expected in CI)");
            return;
        };

        if sink.init(Box::new(|block, _, _| block.fill(0))).is_err() {
            println!("Skipping: device rejected the stream configuration");
            return;
        }
        assert!(sink.set_volume(-10.0).is_ok());
        assert!(sink.close().is_ok());
        assert!(sink.start().is_err());
    }
}
