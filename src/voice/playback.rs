//! Audio playback
//!
//! [`PlaybackController`] owns a single playback slot: starting new audio
//! always stops and releases the previous stream first, so there is never
//! more than one source playing.

use std::io::Cursor;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::thread::JoinHandle;
use std::time::Duration;

use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{SampleRate, StreamConfig};

use crate::{Error, Result};

/// How often the playback thread checks for stop requests
const STOP_POLL_INTERVAL: Duration = Duration::from_millis(20);

/// A sink that can start playing encoded audio
pub trait AudioOutput: Send + Sync {
    /// Decode `audio` and start playing it
    ///
    /// # Errors
    ///
    /// Returns error if the audio cannot be decoded or the device cannot start
    fn start(&self, audio: &[u8]) -> Result<Box<dyn ActiveAudio>>;
}

/// Handle to one playing stream
pub trait ActiveAudio: Send {
    /// Stop playback and release the stream; idempotent
    fn stop(&mut self);

    /// Whether playback ran to the end or was stopped
    fn is_finished(&self) -> bool;
}

/// Single-slot playback controller
pub struct PlaybackController {
    output: Arc<dyn AudioOutput>,
    current: Option<Box<dyn ActiveAudio>>,
}

impl PlaybackController {
    #[must_use]
    pub fn new(output: Arc<dyn AudioOutput>) -> Self {
        Self {
            output,
            current: None,
        }
    }

    /// Replace whatever is playing with `audio`
    ///
    /// Start failures are logged and leave the slot empty.
    pub fn play(&mut self, audio: &[u8]) {
        self.stop();

        match self.output.start(audio) {
            Ok(handle) => {
                tracing::debug!(bytes = audio.len(), "playback started");
                self.current = Some(handle);
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to start playback");
            }
        }
    }

    /// Stop and release the current stream, if any
    pub fn stop(&mut self) {
        if let Some(mut handle) = self.current.take() {
            handle.stop();
            tracing::debug!("playback stopped");
        }
    }

    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.current.as_ref().is_some_and(|h| !h.is_finished())
    }
}

impl Drop for PlaybackController {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Output used when no speaker is available; every start fails
#[derive(Debug, Default)]
pub struct NullOutput;

impl AudioOutput for NullOutput {
    fn start(&self, _audio: &[u8]) -> Result<Box<dyn ActiveAudio>> {
        Err(Error::Capability("no audio output available".to_string()))
    }
}

/// Output to the default speaker device via cpal
#[derive(Debug, Default)]
pub struct CpalOutput;

impl CpalOutput {
    /// Check that an output device exists
    ///
    /// # Errors
    ///
    /// Returns `Capability` if the host has no output device
    pub fn new() -> Result<Self> {
        cpal::default_host()
            .default_output_device()
            .ok_or_else(|| Error::Capability("no output device available".to_string()))?;
        Ok(Self)
    }
}

impl AudioOutput for CpalOutput {
    fn start(&self, audio: &[u8]) -> Result<Box<dyn ActiveAudio>> {
        let decoded = decode_mp3(audio)?;
        if decoded.samples.is_empty() {
            return Err(Error::Audio("no audio frames decoded".to_string()));
        }

        let stop = Arc::new(AtomicBool::new(false));
        let finished = Arc::new(AtomicBool::new(false));

        let thread = {
            let stop = Arc::clone(&stop);
            let finished = Arc::clone(&finished);
            std::thread::Builder::new()
                .name("ragchat-playback".to_string())
                .spawn(move || {
                    if let Err(e) = play_until_done(decoded, &stop, &finished) {
                        tracing::warn!(error = %e, "playback failed");
                    }
                    finished.store(true, Ordering::SeqCst);
                })?
        };

        Ok(Box::new(CpalStream {
            stop,
            finished,
            thread: Some(thread),
        }))
    }
}

/// A cpal stream running on its own thread
struct CpalStream {
    stop: Arc<AtomicBool>,
    finished: Arc<AtomicBool>,
    thread: Option<JoinHandle<()>>,
}

impl ActiveAudio for CpalStream {
    /// Signal the playback thread and detach it
    ///
    /// The thread drops its stream within one [`STOP_POLL_INTERVAL`]; the
    /// caller does not wait for that.
    fn stop(&mut self) {
        self.stop.store(true, Ordering::SeqCst);
        drop(self.thread.take());
    }

    fn is_finished(&self) -> bool {
        self.finished.load(Ordering::SeqCst)
    }
}

impl Drop for CpalStream {
    fn drop(&mut self) {
        self.stop();
    }
}

/// Build a stream for `decoded` and block until it ends or `stop` is set
fn play_until_done(decoded: DecodedAudio, stop: &AtomicBool, finished: &AtomicBool) -> Result<()> {
    let device = cpal::default_host()
        .default_output_device()
        .ok_or_else(|| Error::Audio("no output device".to_string()))?;

    let rate = SampleRate(decoded.sample_rate);
    let supported = device
        .supported_output_configs()
        .map_err(|e| Error::Audio(e.to_string()))?
        .filter(|c| c.min_sample_rate() <= rate && c.max_sample_rate() >= rate)
        .min_by_key(cpal::SupportedStreamConfigRange::channels)
        .ok_or_else(|| {
            Error::Audio(format!("no output config for {} Hz", decoded.sample_rate))
        })?;
    let config: StreamConfig = supported.with_sample_rate(rate).config();
    let channels = config.channels as usize;

    let samples = Arc::new(decoded.samples);
    let position = Arc::new(AtomicUsize::new(0));
    let done = Arc::new(AtomicBool::new(false));

    let stream = {
        let samples = Arc::clone(&samples);
        let position = Arc::clone(&position);
        let done = Arc::clone(&done);
        device
            .build_output_stream(
                &config,
                move |data: &mut [f32], _: &cpal::OutputCallbackInfo| {
                    let mut pos = position.load(Ordering::Relaxed);
                    for frame in data.chunks_mut(channels) {
                        let sample = samples.get(pos).copied().unwrap_or(0.0);
                        frame.fill(sample);
                        if pos < samples.len() {
                            pos += 1;
                        }
                    }
                    position.store(pos, Ordering::Relaxed);
                    if pos >= samples.len() {
                        done.store(true, Ordering::Relaxed);
                    }
                },
                |err| {
                    tracing::error!(error = %err, "audio playback error");
                },
                None,
            )
            .map_err(|e| Error::Audio(e.to_string()))?
    };

    stream.play().map_err(|e| Error::Audio(e.to_string()))?;

    while !stop.load(Ordering::SeqCst) && !done.load(Ordering::Relaxed) {
        std::thread::sleep(STOP_POLL_INTERVAL);
    }

    if !stop.load(Ordering::SeqCst) {
        // Let the device drain its last buffer
        std::thread::sleep(Duration::from_millis(100));
    }

    finished.store(true, Ordering::SeqCst);
    drop(stream);
    tracing::debug!(
        played = position.load(Ordering::Relaxed),
        total = samples.len(),
        "playback complete"
    );

    Ok(())
}

/// Mono PCM decoded from an MP3 payload
pub struct DecodedAudio {
    pub samples: Vec<f32>,
    pub sample_rate: u32,
}

/// Decode MP3 bytes to mono f32 samples
///
/// # Errors
///
/// Returns error if the payload is not valid MP3
pub fn decode_mp3(mp3_data: &[u8]) -> Result<DecodedAudio> {
    let mut decoder = minimp3::Decoder::new(Cursor::new(mp3_data));
    let mut samples = Vec::new();
    let mut sample_rate = 0;

    loop {
        match decoder.next_frame() {
            Ok(frame) => {
                sample_rate = u32::try_from(frame.sample_rate).unwrap_or(24000);
                if frame.channels == 2 {
                    samples.extend(frame.data.chunks(2).map(|chunk| {
                        let left = f32::from(chunk[0]) / 32768.0;
                        let right = f32::from(chunk.get(1).copied().unwrap_or(chunk[0])) / 32768.0;
                        f32::midpoint(left, right)
                    }));
                } else {
                    samples.extend(frame.data.iter().map(|&s| f32::from(s) / 32768.0));
                }
            }
            Err(minimp3::Error::SkippedData) => {}
            Err(minimp3::Error::Eof) => break,
            Err(e) => return Err(Error::Audio(format!("MP3 decode error: {e}"))),
        }
    }

    Ok(DecodedAudio {
        samples,
        sample_rate,
    })
}
