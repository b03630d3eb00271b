//! Microphone capture

use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, Stream, StreamConfig};
use tokio_util::sync::CancellationToken;

use super::utterance::UtteranceDetector;
use crate::{Error, Result};

/// Sample rate for audio capture (16kHz for speech)
pub const SAMPLE_RATE: u32 = 16000;

/// How often the capture buffer is drained into the detector
const POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Give up if nobody starts speaking within this window
const SPEECH_START_TIMEOUT: Duration = Duration::from_secs(6);

/// Whether the host exposes a default input device
#[must_use]
pub fn input_available() -> bool {
    cpal::default_host().default_input_device().is_some()
}

/// Captures audio from the default input device
///
/// The underlying stream is not `Send`; create and drop the capture on the
/// same thread (the recognizer runs it under `spawn_blocking`).
pub struct AudioCapture {
    config: StreamConfig,
    buffer: Arc<Mutex<Vec<f32>>>,
    stream: Option<Stream>,
}

impl AudioCapture {
    /// Open the default input device
    ///
    /// # Errors
    ///
    /// Returns `Capability` if there is no usable microphone
    pub fn new() -> Result<Self> {
        let host = cpal::default_host();

        let device = host
            .default_input_device()
            .ok_or_else(|| Error::Capability("no input device available".to_string()))?;

        let supported_config = device
            .supported_input_configs()
            .map_err(|e| Error::Capability(e.to_string()))?
            .find(|c| {
                c.channels() == 1
                    && c.min_sample_rate() <= SampleRate(SAMPLE_RATE)
                    && c.max_sample_rate() >= SampleRate(SAMPLE_RATE)
            })
            .ok_or_else(|| Error::Capability("microphone does not support 16kHz mono".to_string()))?;

        let config = supported_config
            .with_sample_rate(SampleRate(SAMPLE_RATE))
            .config();

        tracing::debug!(
            device = device.name().unwrap_or_default(),
            sample_rate = SAMPLE_RATE,
            "audio capture initialized"
        );

        Ok(Self {
            config,
            buffer: Arc::new(Mutex::new(Vec::new())),
            stream: None,
        })
    }

    /// Start capturing audio
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be started
    pub fn start(&mut self) -> Result<()> {
        if self.stream.is_some() {
            return Ok(());
        }

        let buffer = Arc::clone(&self.buffer);
        let device = cpal::default_host()
            .default_input_device()
            .ok_or_else(|| Error::Capability("no input device".to_string()))?;

        let stream = device
            .build_input_stream(
                &self.config,
                move |data: &[f32], _: &cpal::InputCallbackInfo| {
                    if let Ok(mut buf) = buffer.lock() {
                        buf.extend_from_slice(data);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio capture error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?;

        stream.play().map_err(|e| Error::Audio(e.to_string()))?;
        self.stream = Some(stream);

        tracing::debug!("audio capture started");
        Ok(())
    }

    /// Stop capturing audio
    pub fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            drop(stream);
            tracing::debug!("audio capture stopped");
        }
    }

    /// Take the samples captured since the last call
    #[must_use]
    pub fn take_buffer(&self) -> Vec<f32> {
        self.buffer
            .lock()
            .map(|mut buf| std::mem::take(&mut *buf))
            .unwrap_or_default()
    }

    /// Block until one utterance is captured
    ///
    /// Returns `None` if nobody spoke before the start timeout or `cancel`
    /// fired. Speech that runs past `max_duration` is cut off and returned
    /// as is.
    ///
    /// # Errors
    ///
    /// Returns error if the input stream cannot be started
    pub fn record_utterance(
        &mut self,
        max_duration: Duration,
        cancel: &CancellationToken,
    ) -> Result<Option<Vec<f32>>> {
        self.start()?;
        let outcome = collect_utterance(|| self.take_buffer(), max_duration, cancel);
        self.stop();
        Ok(outcome)
    }

    /// Check if currently capturing
    #[must_use]
    pub const fn is_capturing(&self) -> bool {
        self.stream.is_some()
    }
}

/// Poll `next_chunk` into an utterance detector until speech ends
///
/// Checked every [`POLL_INTERVAL`]; a cancelled token ends the loop with
/// `None` on the next poll.
pub fn collect_utterance<F>(
    mut next_chunk: F,
    max_duration: Duration,
    cancel: &CancellationToken,
) -> Option<Vec<f32>>
where
    F: FnMut() -> Vec<f32>,
{
    let mut detector = UtteranceDetector::new();
    let started = Instant::now();

    loop {
        std::thread::sleep(POLL_INTERVAL);
        if cancel.is_cancelled() {
            tracing::debug!("capture cancelled");
            return None;
        }

        if detector.process(&next_chunk()) {
            return Some(detector.take_speech_buffer());
        }

        let elapsed = started.elapsed();
        if !detector.heard_speech() && elapsed > SPEECH_START_TIMEOUT {
            tracing::debug!("no speech before timeout");
            return None;
        }
        if elapsed > max_duration {
            tracing::debug!(max_secs = max_duration.as_secs(), "listen limit reached");
            return detector
                .heard_speech()
                .then(|| detector.take_speech_buffer());
        }
    }
}

/// Convert f32 samples to WAV bytes for STT APIs
///
/// # Errors
///
/// Returns error if WAV encoding fails
pub fn samples_to_wav(samples: &[f32], sample_rate: u32) -> Result<Vec<u8>> {
    let spec = hound::WavSpec {
        channels: 1,
        sample_rate,
        bits_per_sample: 16,
        sample_format: hound::SampleFormat::Int,
    };

    let mut cursor = std::io::Cursor::new(Vec::new());
    {
        let mut writer =
            hound::WavWriter::new(&mut cursor, spec).map_err(|e| Error::Audio(e.to_string()))?;

        for &sample in samples {
            #[allow(clippy::cast_possible_truncation)]
            let sample_i16 = (sample * 32767.0).clamp(-32768.0, 32767.0) as i16;
            writer
                .write_sample(sample_i16)
                .map_err(|e| Error::Audio(e.to_string()))?;
        }

        writer.finalize().map_err(|e| Error::Audio(e.to_string()))?;
    }

    Ok(cursor.into_inner())
}
