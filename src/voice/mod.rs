//! Voice input and output
//!
//! Microphone capture with utterance detection, cloud speech-to-text, and
//! single-slot audio playback. Speech synthesis itself is done by the
//! backend (`GET /tts`).

mod capture;
mod listener;
mod playback;
mod recognizer;
mod stt;
mod utterance;

pub use capture::{AudioCapture, SAMPLE_RATE, input_available, samples_to_wav};
pub use listener::{CaptureState, SpeechCapture};
pub use playback::{
    ActiveAudio, AudioOutput, CpalOutput, DecodedAudio, NullOutput, PlaybackController, decode_mp3,
};
pub use recognizer::{MicrophoneRecognizer, SpeechRecognizer};
pub use stt::{SpeechToText, SttProviderKind};
pub use utterance::{UtteranceDetector, UtteranceState, calculate_energy};
