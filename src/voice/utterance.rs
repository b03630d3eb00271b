//! Energy-based utterance segmentation
//!
//! Decides when the user has started and finished speaking so a single
//! listening attempt can end without a push-to-talk release.

/// Minimum audio energy threshold to consider speech
const ENERGY_THRESHOLD: f32 = 0.03;

/// Minimum duration of speech to accept (in samples at 16kHz)
const MIN_SPEECH_SAMPLES: usize = 4800; // 0.3 seconds

/// Trailing silence that ends an utterance (in samples)
const SILENCE_SAMPLES: usize = 12000; // 0.75 seconds

/// State of the utterance detector
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UtteranceState {
    /// Waiting for speech
    Waiting,
    /// Speech started, accumulating
    Speaking,
    /// Enough speech followed by enough silence
    Complete,
}

/// Tracks one utterance from first speech to trailing silence
pub struct UtteranceDetector {
    state: UtteranceState,
    speech_buffer: Vec<f32>,
    silence_counter: usize,
    threshold: f32,
}

impl Default for UtteranceDetector {
    fn default() -> Self {
        Self::new()
    }
}

impl UtteranceDetector {
    #[must_use]
    pub const fn new() -> Self {
        Self::with_threshold(ENERGY_THRESHOLD)
    }

    /// Detector with a custom energy threshold (RMS, 0.0 to 1.0)
    #[must_use]
    pub const fn with_threshold(threshold: f32) -> Self {
        Self {
            state: UtteranceState::Waiting,
            speech_buffer: Vec::new(),
            silence_counter: 0,
            threshold,
        }
    }

    /// Feed a chunk of samples
    ///
    /// Returns true once the utterance is complete; later chunks are ignored.
    pub fn process(&mut self, samples: &[f32]) -> bool {
        let energy = calculate_energy(samples);
        let is_speech = energy > self.threshold;

        match self.state {
            UtteranceState::Waiting => {
                if is_speech {
                    self.state = UtteranceState::Speaking;
                    self.speech_buffer.clear();
                    self.speech_buffer.extend_from_slice(samples);
                    self.silence_counter = 0;
                    tracing::trace!(energy, "speech started");
                }
            }
            UtteranceState::Speaking => {
                self.speech_buffer.extend_from_slice(samples);

                if is_speech {
                    self.silence_counter = 0;
                } else {
                    self.silence_counter += samples.len();
                }

                if self.silence_counter > SILENCE_SAMPLES {
                    if self.speech_buffer.len() > MIN_SPEECH_SAMPLES + self.silence_counter {
                        tracing::debug!(
                            samples = self.speech_buffer.len(),
                            "utterance complete"
                        );
                        self.state = UtteranceState::Complete;
                    } else {
                        // A click or cough, not speech
                        tracing::trace!("discarding short noise burst");
                        self.reset();
                    }
                }
            }
            UtteranceState::Complete => {}
        }

        self.state == UtteranceState::Complete
    }

    /// Whether any speech has been heard yet
    #[must_use]
    pub fn heard_speech(&self) -> bool {
        self.state != UtteranceState::Waiting
    }

    /// Take the accumulated samples, leaving the detector waiting
    pub fn take_speech_buffer(&mut self) -> Vec<f32> {
        self.state = UtteranceState::Waiting;
        self.silence_counter = 0;
        std::mem::take(&mut self.speech_buffer)
    }

    #[must_use]
    pub fn speech_buffer(&self) -> &[f32] {
        &self.speech_buffer
    }

    /// Reset detector to waiting
    pub fn reset(&mut self) {
        self.state = UtteranceState::Waiting;
        self.speech_buffer.clear();
        self.silence_counter = 0;
    }

    #[must_use]
    pub const fn state(&self) -> UtteranceState {
        self.state
    }
}

/// Calculate RMS energy of audio samples
#[allow(clippy::cast_precision_loss)]
pub fn calculate_energy(samples: &[f32]) -> f32 {
    if samples.is_empty() {
        return 0.0;
    }

    let sum_squares: f32 = samples.iter().map(|s| s * s).sum();
    (sum_squares / samples.len() as f32).sqrt()
}
