//! Conversation orchestrator
//!
//! Owns the conversation state and drives the turn-taking protocol:
//!
//! ```text
//!   Idle ──submit──▶ AwaitingAnswer ──answer──▶ AwaitingSpeech ──audio──▶ Idle
//!                         │                          │
//!                         └──error: bot error turn──▶ Idle ◀── speech error
//! ```
//!
//! Network and recognition work runs on spawned tasks. Their results come
//! back as [`Completion`] values through [`Completions`], and the owner feeds
//! them to [`Orchestrator::apply`] one at a time, so every transition runs to
//! completion before the next one starts. Each `ask`/`synthesize` pair carries
//! a request token plus the session it was sent for; a completion that no
//! longer matches is dropped without touching the transcript.

mod state;

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{mpsc, watch};

use crate::backend::{Backend, Document, check_document_path, with_timeout};
use crate::config::{Config, LanguageConfig};
use crate::ingest::{self, IngestionClient};
use crate::sessions::SessionRegistry;
use crate::types::{Language, Session, SessionId, Turn};
use crate::voice::{AudioOutput, PlaybackController, SpeechCapture, SpeechRecognizer};
use crate::{Error, Result};

pub use state::{ConversationSnapshot, ConversationState, Notice, NoticeLevel, Phase};

/// Bot turn appended when a question cannot be answered
pub const ASK_FAILURE_TEXT: &str = "Error: Could not reach backend.";

/// Session id used against backends without session support
pub const SINGLE_SESSION_ID: &str = "default";

/// Tunables for an orchestrator
#[derive(Debug, Clone)]
pub struct OrchestratorOptions {
    pub languages: LanguageConfig,
    pub request_timeout: Duration,
    pub ingest_timeout: Duration,
    pub speak_answers: bool,
}

impl Default for OrchestratorOptions {
    fn default() -> Self {
        Self::from(&Config::default())
    }
}

impl From<&Config> for OrchestratorOptions {
    fn from(config: &Config) -> Self {
        Self {
            languages: config.languages.clone(),
            request_timeout: config.backend.request_timeout,
            ingest_timeout: config.backend.ingest_timeout,
            speak_answers: config.voice.enabled && config.voice.speak_answers,
        }
    }
}

/// Result of background work, to be passed to [`Orchestrator::apply`]
#[derive(Debug)]
pub struct Completion {
    kind: CompletionKind,
}

#[derive(Debug)]
enum CompletionKind {
    Answer {
        token: u64,
        session: SessionId,
        result: Result<String>,
    },
    Speech {
        token: u64,
        session: SessionId,
        result: Result<Vec<u8>>,
    },
    Ingested {
        target: String,
        fallback: &'static str,
        result: Result<()>,
    },
    Captured {
        attempt: u64,
        result: Result<Option<String>>,
    },
}

/// Receiving end for background results
pub struct Completions {
    rx: mpsc::UnboundedReceiver<Completion>,
}

impl Completions {
    /// Wait for the next completion
    pub async fn next(&mut self) -> Option<Completion> {
        self.rx.recv().await
    }

    /// Take a completion if one is already queued
    pub fn try_next(&mut self) -> Option<Completion> {
        self.rx.try_recv().ok()
    }
}

/// The request whose results are still honored
#[derive(Debug, Clone)]
struct InFlight {
    token: u64,
    session: SessionId,
    language: Language,
}

/// Coordinates sessions, the message log, ingestion, speech capture and
/// playback into one consistent conversation
pub struct Orchestrator {
    backend: Arc<dyn Backend>,
    options: OrchestratorOptions,
    registry: SessionRegistry,
    ingestion: IngestionClient,
    playback: PlaybackController,
    capture: SpeechCapture,
    state: ConversationState,
    next_token: u64,
    in_flight: Option<InFlight>,
    notices: Vec<Notice>,
    completions: mpsc::UnboundedSender<Completion>,
    snapshots: watch::Sender<ConversationSnapshot>,
}

impl Orchestrator {
    /// Create an orchestrator and the channel its background results arrive on
    #[must_use]
    pub fn new(
        backend: Arc<dyn Backend>,
        output: Arc<dyn AudioOutput>,
        recognizer: Option<Arc<dyn SpeechRecognizer>>,
        options: OrchestratorOptions,
    ) -> (Self, Completions) {
        let (tx, rx) = mpsc::unbounded_channel();
        let state = ConversationState {
            language: options.languages.default,
            ..ConversationState::default()
        };
        let (snapshots, _) = watch::channel(ConversationSnapshot::default());

        let orchestrator = Self {
            registry: SessionRegistry::new(Arc::clone(&backend), options.request_timeout),
            ingestion: IngestionClient::new(Arc::clone(&backend), options.ingest_timeout),
            backend,
            playback: PlaybackController::new(output),
            capture: SpeechCapture::new(recognizer),
            state,
            options,
            next_token: 0,
            in_flight: None,
            notices: Vec::new(),
            completions: tx,
            snapshots,
        };
        orchestrator.publish();

        (orchestrator, Completions { rx })
    }

    /// Current state
    #[must_use]
    pub const fn state(&self) -> &ConversationState {
        &self.state
    }

    /// Copy of the current state
    #[must_use]
    pub fn snapshot(&self) -> ConversationSnapshot {
        ConversationSnapshot {
            active_session: self.state.active_session.clone(),
            sessions: self.state.sessions.clone(),
            turns: self.state.turns().to_vec(),
            turns_generation: self.state.log.generation(),
            phase: self.state.phase,
            pending_request: self.state.pending_request(),
            language: self.state.language,
            input: self.state.input.clone(),
            listening: self.capture.is_listening(),
        }
    }

    /// Receive a snapshot after every state change
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<ConversationSnapshot> {
        self.snapshots.subscribe()
    }

    /// Take notices raised since the last call
    pub fn drain_notices(&mut self) -> Vec<Notice> {
        std::mem::take(&mut self.notices)
    }

    /// Whether audio is currently playing
    #[must_use]
    pub fn is_playing(&self) -> bool {
        self.playback.is_playing()
    }

    /// Fetch the session list; failure yields an empty list and a notice
    pub async fn refresh_sessions(&mut self) -> Vec<Session> {
        let (sessions, error) = self.registry.refresh().await;
        if let Some(e) = error {
            self.report(&e);
        }
        self.state.sessions.clone_from(&sessions);
        self.publish();
        sessions
    }

    /// Create a session, optionally seeded with a document from disk
    ///
    /// Returns the new session, or `None` after raising a notice.
    pub async fn create_session(&mut self, name: &str, seed: Option<&Path>) -> Option<Session> {
        let result = async {
            if name.trim().is_empty() {
                return Err(Error::Validation("session name is required".to_string()));
            }
            let seed = match seed {
                Some(path) => Some(Document::read(path).await?),
                None => None,
            };
            self.registry.create(name, seed).await
        }
        .await;

        match result {
            Ok(session) => {
                self.state.sessions = self.registry.cached().to_vec();
                self.notices
                    .push(Notice::transient(format!("Created session '{}'", session.name)));
                self.publish();
                Some(session)
            }
            Err(e) => {
                tracing::warn!(error = %e, name, "failed to create session");
                self.report(&e);
                None
            }
        }
    }

    /// Switch to another session; blank `id` clears the conversation
    ///
    /// Valid in every phase. An outstanding request is not cancelled, but
    /// its result will be discarded when it arrives.
    pub async fn select_session(&mut self, id: &str) {
        self.playback.stop();
        if let Some(stale) = self.in_flight.take() {
            tracing::debug!(token = stale.token, session = %stale.session, "abandoning in-flight request");
        }
        self.state.phase = Phase::Idle;

        let id = SessionId::parse(id);
        self.state.active_session.clone_from(&id);

        match id {
            None => {
                tracing::debug!("session cleared");
                self.state.log.clear();
            }
            Some(id) => {
                tracing::info!(session = %id, "selecting session");
                // Show nothing from the previous session while the fetch runs
                self.state.log.load(id.clone(), Vec::new());
                self.publish();

                match with_timeout(self.options.request_timeout, self.backend.fetch_turns(&id))
                    .await
                {
                    Ok(turns) => self.state.log.load(id, turns),
                    Err(e) => {
                        tracing::warn!(session = %id, error = %e, "failed to load session history");
                        self.notices.push(Notice::transient(format!(
                            "Could not load session history: {e}"
                        )));
                    }
                }
            }
        }

        self.publish();
    }

    /// Use the backend's single shared conversation (`POST /ask`)
    pub fn start_single_session(&mut self, greeting: &str) {
        let id = SessionId::new(SINGLE_SESSION_ID);
        let turns = if greeting.trim().is_empty() {
            Vec::new()
        } else {
            vec![Turn::bot(greeting)]
        };
        self.state.log.load(id.clone(), turns);
        self.state.active_session = Some(id);
        self.publish();
    }

    /// Replace the input buffer
    pub fn edit_input(&mut self, text: impl Into<String>) {
        self.playback.stop();
        self.state.input = text.into();
        self.publish();
    }

    /// Choose the language for the next question and capture attempt
    pub fn set_language(&mut self, language: Language) {
        if self.state.language != language {
            tracing::debug!(%language, "language changed");
            self.state.language = language;
            self.publish();
        }
    }

    /// Turn spoken answers on or off
    pub fn set_speak_answers(&mut self, enabled: bool) {
        self.options.speak_answers = enabled;
        if !enabled {
            self.playback.stop();
        }
    }

    #[must_use]
    pub const fn speaks_answers(&self) -> bool {
        self.options.speak_answers
    }

    /// Stop any playing audio
    pub fn stop_audio(&mut self) {
        self.playback.stop();
    }

    /// Submit the current input buffer
    pub fn submit_input(&mut self) -> bool {
        let text = self.state.input.clone();
        self.submit(&text)
    }

    /// Send a question
    ///
    /// Returns true if the question was dispatched. Blank text, a busy
    /// conversation, or a missing session change nothing; the missing
    /// session additionally raises a blocking notice.
    pub fn submit(&mut self, text: &str) -> bool {
        if text.trim().is_empty() {
            tracing::trace!("ignoring blank submit");
            return false;
        }
        let Some(session) = self.state.active_session.clone() else {
            self.report(&Error::Precondition(ingest::NO_SESSION_MESSAGE.to_string()));
            return false;
        };
        if self.state.phase != Phase::Idle {
            tracing::debug!(phase = ?self.state.phase, "busy, ignoring submit");
            return false;
        }

        self.playback.stop();
        self.state.log.append(Turn::user(text));
        self.state.input.clear();
        self.state.phase = Phase::AwaitingAnswer;
        self.dispatch_ask(session, text.to_string());
        self.publish();
        true
    }

    /// Upload a document into the active session's context
    ///
    /// Runs in the background; the outcome arrives as a notice.
    pub fn upload_file(&mut self, path: impl Into<PathBuf>) {
        let path = path.into();
        let session = match ingest::require_session(self.state.active_session.as_ref()).cloned() {
            Ok(session) => session,
            Err(e) => return self.report(&e),
        };
        if let Err(e) = check_document_path(&path) {
            return self.report(&e);
        }

        let client = self.ingestion.clone();
        let tx = self.completions.clone();
        let target = path
            .file_name()
            .map_or_else(|| path.display().to_string(), |n| n.to_string_lossy().into_owned());

        tracing::info!(session = %session, file = %target, "uploading document");
        tokio::spawn(async move {
            let result = client.upload_file(Some(&session), &path).await;
            send(
                &tx,
                CompletionKind::Ingested {
                    target,
                    fallback: "Failed to upload file",
                    result,
                },
            );
        });
    }

    /// Scrape a web page into the active session's context
    ///
    /// Runs in the background; the outcome arrives as a notice.
    pub fn scrape_url(&mut self, url: &str) {
        let session = match ingest::require_session(self.state.active_session.as_ref()).cloned() {
            Ok(session) => session,
            Err(e) => return self.report(&e),
        };
        let url = match ingest::validate_url(url) {
            Ok(url) => url,
            Err(e) => return self.report(&e),
        };

        let client = self.ingestion.clone();
        let tx = self.completions.clone();

        tracing::info!(session = %session, url = %url, "scraping url");
        tokio::spawn(async move {
            let result = client.scrape_url(Some(&session), &url).await;
            send(
                &tx,
                CompletionKind::Ingested {
                    target: url,
                    fallback: "Failed to scrape URL",
                    result,
                },
            );
        });
    }

    /// Start a single-shot speech capture into the input buffer
    pub fn start_listening(&mut self) {
        if self.capture.is_listening() {
            return;
        }
        if self.capture.is_available() {
            self.playback.stop();
        }

        let profile = self.options.languages.profile(self.state.language).clone();
        let tx = self.completions.clone();
        let started = self.capture.begin(&profile, move |attempt, result| {
            send(&tx, CompletionKind::Captured { attempt, result });
        });

        match started {
            Ok(true) => self.publish(),
            Ok(false) => {}
            Err(e) => self.report(&e),
        }
    }

    /// End the current capture without using its result
    pub fn stop_listening(&mut self) {
        if self.capture.is_listening() {
            self.capture.end();
            self.publish();
        }
    }

    /// Apply a background result
    pub fn apply(&mut self, completion: Completion) {
        match completion.kind {
            CompletionKind::Answer {
                token,
                session,
                result,
            } => self.on_answer(token, &session, result),
            CompletionKind::Speech {
                token,
                session,
                result,
            } => self.on_speech(token, &session, result),
            CompletionKind::Ingested {
                target,
                fallback,
                result,
            } => self.on_ingested(&target, fallback, result),
            CompletionKind::Captured { attempt, result } => self.on_captured(attempt, result),
        }
        self.publish();
    }

    fn dispatch_ask(&mut self, session: SessionId, question: String) {
        self.next_token += 1;
        let token = self.next_token;
        let language = self.state.language;
        let lang = self.options.languages.profile(language).code.clone();

        self.in_flight = Some(InFlight {
            token,
            session: session.clone(),
            language,
        });

        tracing::debug!(token, session = %session, lang = %lang, "asking");

        let backend = Arc::clone(&self.backend);
        let tx = self.completions.clone();
        let limit = self.options.request_timeout;
        tokio::spawn(async move {
            let result = with_timeout(limit, backend.ask(&session, &question, &lang)).await;
            send(
                &tx,
                CompletionKind::Answer {
                    token,
                    session,
                    result,
                },
            );
        });
    }

    fn dispatch_synthesize(&self, flight: &InFlight, text: String) {
        let token = flight.token;
        let session = flight.session.clone();
        let lang = self.options.languages.profile(flight.language).code.clone();

        let backend = Arc::clone(&self.backend);
        let tx = self.completions.clone();
        let limit = self.options.request_timeout;
        tokio::spawn(async move {
            let result = with_timeout(limit, backend.synthesize(&text, &lang)).await;
            send(
                &tx,
                CompletionKind::Speech {
                    token,
                    session,
                    result,
                },
            );
        });
    }

    /// The in-flight request, if `token` and `session` still refer to it
    fn current_flight(&self, token: u64, session: &SessionId, expected: Phase) -> Option<InFlight> {
        let flight = self.in_flight.as_ref()?;
        let current = flight.token == token
            && &flight.session == session
            && self.state.active_session.as_ref() == Some(session)
            && self.state.phase == expected;

        if current {
            Some(flight.clone())
        } else {
            tracing::debug!(token, session = %session, "dropping stale response");
            None
        }
    }

    fn on_answer(&mut self, token: u64, session: &SessionId, result: Result<String>) {
        let Some(flight) = self.current_flight(token, session, Phase::AwaitingAnswer) else {
            return;
        };

        match result {
            Ok(answer) => {
                tracing::debug!(token, chars = answer.len(), "answer received");
                self.state.log.append(Turn::bot(answer.clone()));

                if self.options.speak_answers {
                    self.state.phase = Phase::AwaitingSpeech;
                    self.dispatch_synthesize(&flight, answer);
                } else {
                    self.finish_request();
                }
            }
            Err(e) => {
                tracing::warn!(token, session = %session, error = %e, "ask failed");
                self.state.log.append(Turn::bot(ASK_FAILURE_TEXT));
                self.finish_request();
            }
        }
    }

    fn on_speech(&mut self, token: u64, session: &SessionId, result: Result<Vec<u8>>) {
        if self
            .current_flight(token, session, Phase::AwaitingSpeech)
            .is_none()
        {
            return;
        }
        self.finish_request();

        match result {
            // Capture and playback never overlap.
            Ok(_) if self.capture.is_listening() => {
                tracing::debug!(token, "microphone is listening, skipping answer audio");
            }
            Ok(audio) => self.playback.play(&audio),
            Err(e) => {
                tracing::warn!(token, error = %e, "speech synthesis failed");
                self.notices
                    .push(Notice::transient(format!("Could not play the answer: {e}")));
            }
        }
    }

    fn on_ingested(&mut self, target: &str, fallback: &str, result: Result<()>) {
        match result {
            Ok(()) => {
                self.notices
                    .push(Notice::transient(format!("Added {target} to the session")));
            }
            Err(e) => {
                tracing::warn!(target, error = %e, "ingestion failed");
                let message = ingest::failure_message(&e, fallback);
                self.notices.push(if e.is_blocking() {
                    Notice::blocking(message)
                } else {
                    Notice::transient(message)
                });
            }
        }
    }

    fn on_captured(&mut self, attempt: u64, result: Result<Option<String>>) {
        if !self.capture.finish(attempt) {
            return;
        }

        match result {
            Ok(Some(text)) => {
                tracing::debug!(attempt, chars = text.len(), "speech recognized");
                self.state.input = text;
            }
            Ok(None) => {
                tracing::debug!(attempt, "no speech recognized");
            }
            Err(e) => {
                tracing::warn!(attempt, error = %e, "speech recognition failed");
                self.report(&e);
            }
        }
    }

    fn finish_request(&mut self) {
        self.in_flight = None;
        self.state.phase = Phase::Idle;
    }

    fn report(&mut self, error: &Error) {
        self.notices.push(Notice::from_error(error));
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.snapshot());
    }
}

fn send(tx: &mpsc::UnboundedSender<Completion>, kind: CompletionKind) {
    if tx.send(Completion { kind }).is_err() {
        tracing::debug!("orchestrator dropped before background work finished");
    }
}
