//! Speech recognition: capture one utterance and turn it into text

use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use super::capture::{AudioCapture, SAMPLE_RATE, input_available, samples_to_wav};
use super::stt::SpeechToText;
use crate::config::LanguageProfile;
use crate::{Error, Result};

/// Single-shot speech recognition
#[async_trait]
pub trait SpeechRecognizer: Send + Sync {
    /// Listen for one utterance in `language` and return its text
    ///
    /// `None` means nothing was said. Once `cancel` fires the microphone
    /// must be released and the result is `None`.
    async fn recognize(
        &self,
        language: &LanguageProfile,
        cancel: CancellationToken,
    ) -> Result<Option<String>>;
}

/// Recognizer backed by the default microphone and a cloud STT provider
pub struct MicrophoneRecognizer {
    stt: SpeechToText,
    max_listen: Duration,
}

impl MicrophoneRecognizer {
    /// Build a recognizer after checking that a microphone exists
    ///
    /// # Errors
    ///
    /// Returns `Capability` if there is no input device
    pub fn new(stt: SpeechToText, max_listen: Duration) -> Result<Self> {
        if !input_available() {
            return Err(Error::Capability("no microphone found".to_string()));
        }
        Ok(Self { stt, max_listen })
    }
}

#[async_trait]
impl SpeechRecognizer for MicrophoneRecognizer {
    async fn recognize(
        &self,
        language: &LanguageProfile,
        cancel: CancellationToken,
    ) -> Result<Option<String>> {
        let max_listen = self.max_listen;
        let capture_cancel = cancel.clone();
        let samples = tokio::task::spawn_blocking(move || {
            let mut capture = AudioCapture::new()?;
            capture.record_utterance(max_listen, &capture_cancel)
        })
        .await
        .map_err(|e| Error::Audio(format!("capture task failed: {e}")))??;

        let Some(samples) = samples else {
            return Ok(None);
        };
        if cancel.is_cancelled() {
            return Ok(None);
        }

        let wav = samples_to_wav(&samples, SAMPLE_RATE)?;
        let text = self.stt.transcribe(&wav, &language.code).await?;

        Ok((!text.is_empty()).then_some(text))
    }
}
