// ABOUTME: Audio output device abstraction and cpal implementation
// ABOUTME: Blocking PCM writes feed a jitter queue drained by the device callback

use crate::audio::StreamFormat;
use crate::error::Error;
use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig, SupportedBufferSize};
use crossbeam::channel::{bounded, Sender};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Fallback device buffer size in frames when the host won't say
const FALLBACK_BUFFER_FRAMES: usize = 1024;

/// Internal queue size as a multiple of the device buffer, to absorb jitter
const QUEUE_BUFFER_MULTIPLE: usize = 6;

/// An audio output device.
///
/// The playback engine drives this through `write`; implementations may
/// block in `write` to pace the caller against real output progress.
pub trait AudioOutput {
    /// Write interleaved PCM bytes in the stream format the output was
    /// opened with. Blocks until the device has room.
    fn write(&mut self, pcm: &[u8]) -> crate::Result<()>;

    /// Apply a gain scalar, clamped to [0, 1].
    fn set_volume(&mut self, gain: f32);

    /// Smallest useful write size in bytes (one device buffer).
    fn min_buffer_bytes(&self) -> usize;

    /// Estimated microseconds between a `write` returning and that audio
    /// leaving the device.
    fn latency_micros(&self) -> i64;

    /// Stop and release the device. Further writes fail.
    fn stop(&mut self);
}

/// cpal-backed output device.
///
/// `write` converts 16-bit PCM to f32 samples and pushes them into a
/// bounded queue sized at [`QUEUE_BUFFER_MULTIPLE`] device buffers; the
/// cpal callback drains it, applying the current gain. A full queue makes
/// `write` block, which is what paces the playback loop against the DAC.
pub struct CpalOutput {
    stream: Option<cpal::Stream>,
    tx: Option<Sender<f32>>,
    gain_bits: Arc<AtomicU32>,
    min_buffer_bytes: usize,
    latency_micros: i64,
}

impl CpalOutput {
    /// Open the default output device for the given stream format.
    ///
    /// Fails for formats this crate does not play (anything but 16-bit
    /// stereo PCM) and for any device or stream construction error. The
    /// failure is fatal only to the current stream attempt.
    pub fn new(format: &StreamFormat) -> crate::Result<Self> {
        if format.codec != "pcm" {
            return Err(Error::Output(format!(
                "unsupported codec: {}",
                format.codec
            )));
        }
        if format.bit_depth != 16 {
            return Err(Error::Output(format!(
                "unsupported bit depth: {}",
                format.bit_depth
            )));
        }
        if format.channels == 0 {
            return Err(Error::Output("zero channels".to_string()));
        }

        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| Error::Output("no output device available".to_string()))?;

        let supported = device
            .default_output_config()
            .map_err(|e| Error::Output(e.to_string()))?;
        let buffer_frames = match supported.buffer_size() {
            SupportedBufferSize::Range { min, .. } => (*min as usize).max(256),
            SupportedBufferSize::Unknown => FALLBACK_BUFFER_FRAMES,
        };

        let channels = format.channels as usize;
        let bytes_per_sample = format.bit_depth as usize / 8;
        let min_buffer_bytes = buffer_frames * channels * bytes_per_sample;
        let queue_capacity = buffer_frames * channels * QUEUE_BUFFER_MULTIPLE;
        // Steady state runs with the queue about half full.
        let latency_micros = (buffer_frames as i64 * QUEUE_BUFFER_MULTIPLE as i64 / 2)
            * 1_000_000
            / format.sample_rate as i64;

        let config = StreamConfig {
            channels: format.channels as u16,
            sample_rate: SampleRate(format.sample_rate),
            buffer_size: cpal::BufferSize::Default,
        };

        let (tx, rx) = bounded::<f32>(queue_capacity);
        let gain_bits = Arc::new(AtomicU32::new(1.0f32.to_bits()));
        let gain_for_callback = Arc::clone(&gain_bits);

        let stream = device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let gain = f32::from_bits(gain_for_callback.load(Ordering::Relaxed));
                    for slot in data.iter_mut() {
                        // Underrun plays silence rather than stale samples.
                        *slot = rx.try_recv().map(|s| s * gain).unwrap_or(0.0);
                    }
                },
                move |err| {
                    log::warn!("Audio stream error: {}", err);
                },
                None,
            )
            .map_err(|e| Error::Output(e.to_string()))?;
        stream.play().map_err(|e| Error::Output(e.to_string()))?;

        log::debug!(
            "Output device opened: {} Hz, {} ch, device buffer {} frames",
            format.sample_rate,
            format.channels,
            buffer_frames
        );

        Ok(Self {
            stream: Some(stream),
            tx: Some(tx),
            gain_bits,
            min_buffer_bytes,
            latency_micros,
        })
    }
}

impl AudioOutput for CpalOutput {
    fn write(&mut self, pcm: &[u8]) -> crate::Result<()> {
        let tx = self
            .tx
            .as_ref()
            .ok_or_else(|| Error::Output("output stopped".to_string()))?;
        for sample_bytes in pcm.chunks_exact(2) {
            let sample = i16::from_le_bytes([sample_bytes[0], sample_bytes[1]]);
            tx.send(sample as f32 / 32_768.0)
                .map_err(|_| Error::Output("output stream closed".to_string()))?;
        }
        Ok(())
    }

    fn set_volume(&mut self, gain: f32) {
        self.gain_bits
            .store(gain.clamp(0.0, 1.0).to_bits(), Ordering::Relaxed);
    }

    fn min_buffer_bytes(&self) -> usize {
        self.min_buffer_bytes
    }

    fn latency_micros(&self) -> i64 {
        self.latency_micros
    }

    fn stop(&mut self) {
        self.tx.take();
        if let Some(stream) = self.stream.take() {
            let _ = stream.pause();
        }
    }
}

impl Drop for CpalOutput {
    fn drop(&mut self) {
        self.stop();
    }
}
