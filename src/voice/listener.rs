//! Speech capture controller
//!
//! Wraps a [`SpeechRecognizer`] into a single-shot "listen, then populate
//! the input" operation with at most one attempt in flight.

use std::sync::Arc;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use super::recognizer::SpeechRecognizer;
use crate::config::LanguageProfile;
use crate::{Error, Result};

/// Listening state
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CaptureState {
    Idle,
    Listening,
}

/// Owns the one capture attempt an orchestrator may have
pub struct SpeechCapture {
    recognizer: Option<Arc<dyn SpeechRecognizer>>,
    state: CaptureState,
    attempt: u64,
    task: Option<JoinHandle<()>>,
    cancel: Option<CancellationToken>,
    unavailable_reported: bool,
}

impl SpeechCapture {
    /// Controller over `recognizer`; `None` means speech input is unavailable
    #[must_use]
    pub fn new(recognizer: Option<Arc<dyn SpeechRecognizer>>) -> Self {
        Self {
            recognizer,
            state: CaptureState::Idle,
            attempt: 0,
            task: None,
            cancel: None,
            unavailable_reported: false,
        }
    }

    /// Start listening
    ///
    /// `on_done` receives the attempt id and the recognition result. Returns
    /// `Ok(false)` without starting anything while already listening, or when
    /// speech input was already reported unavailable.
    ///
    /// # Errors
    ///
    /// Returns `Capability` the first time capture is attempted without a
    /// recognizer
    pub fn begin<F>(&mut self, language: &LanguageProfile, on_done: F) -> Result<bool>
    where
        F: FnOnce(u64, Result<Option<String>>) + Send + 'static,
    {
        if self.state == CaptureState::Listening {
            tracing::debug!("already listening, ignoring");
            return Ok(false);
        }

        let Some(recognizer) = self.recognizer.clone() else {
            if self.unavailable_reported {
                return Ok(false);
            }
            self.unavailable_reported = true;
            return Err(Error::Capability(
                "speech recognition is not available".to_string(),
            ));
        };

        self.attempt += 1;
        let attempt = self.attempt;
        let language = language.clone();
        tracing::debug!(attempt, locale = %language.locale, "listening");

        let cancel = CancellationToken::new();
        let token = cancel.clone();
        self.task = Some(tokio::spawn(async move {
            let result = recognizer.recognize(&language, token).await;
            on_done(attempt, result);
        }));
        self.cancel = Some(cancel);
        self.state = CaptureState::Listening;

        Ok(true)
    }

    /// Accept the result of `attempt`
    ///
    /// Returns false for results of ended or superseded attempts, which the
    /// caller must discard.
    pub fn finish(&mut self, attempt: u64) -> bool {
        if self.state != CaptureState::Listening || attempt != self.attempt {
            tracing::debug!(attempt, current = self.attempt, "dropping stale capture result");
            return false;
        }
        self.state = CaptureState::Idle;
        self.task = None;
        self.cancel = None;
        true
    }

    /// Manually end the current attempt
    ///
    /// The recognizer's token is cancelled so it releases the microphone,
    /// then the task is aborted.
    pub fn end(&mut self) {
        self.release();
        if self.state == CaptureState::Listening {
            tracing::debug!(attempt = self.attempt, "listening ended by user");
        }
        self.state = CaptureState::Idle;
    }

    #[must_use]
    pub const fn state(&self) -> CaptureState {
        self.state
    }

    #[must_use]
    pub fn is_listening(&self) -> bool {
        self.state == CaptureState::Listening
    }

    /// Whether a recognizer is configured
    #[must_use]
    pub const fn is_available(&self) -> bool {
        self.recognizer.is_some()
    }
}

impl SpeechCapture {
    fn release(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel.cancel();
        }
        if let Some(task) = self.task.take() {
            task.abort();
        }
    }
}

impl Drop for SpeechCapture {
    fn drop(&mut self) {
        self.release();
    }
}
