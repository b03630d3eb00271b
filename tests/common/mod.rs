//! Shared test utilities

#![allow(dead_code)]

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use tokio_util::sync::CancellationToken;

use ragchat::config::LanguageProfile;
use ragchat::orchestrator::{Completions, Orchestrator, OrchestratorOptions};
use ragchat::voice::{ActiveAudio, AudioOutput, SpeechRecognizer};
use ragchat::{Backend, Document, Error, Result, Session, SessionId, Turn};

/// A backend call, as observed by [`FakeBackend`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    ListSessions,
    CreateSession { name: String, seed: Option<String> },
    FetchTurns(String),
    Ask { session: String, question: String, lang: String },
    Synthesize { text: String, lang: String },
    Upload { session: String, file: String },
    Scrape { session: String, url: String },
}

/// Scripted outcome of one `ask`
#[derive(Debug, Clone)]
pub enum Reply {
    Answer(String),
    Fail,
    Reject(u16, Option<String>),
}

impl Reply {
    fn into_result(self) -> Result<String> {
        match self {
            Self::Answer(text) => Ok(text),
            Self::Fail => Err(Error::Network("connection refused".to_string())),
            Self::Reject(status, detail) => Err(Error::Rejected { status, detail }),
        }
    }
}

/// In-memory backend with scripted replies and a call log
#[derive(Default)]
pub struct FakeBackend {
    sessions: Mutex<Vec<Session>>,
    turns: Mutex<HashMap<String, Vec<Turn>>>,
    replies: Mutex<VecDeque<(Duration, Reply)>>,
    tts_failure: Mutex<bool>,
    tts_delay: Mutex<Duration>,
    fetch_failure: Mutex<bool>,
    list_failure: Mutex<bool>,
    ingest_reply: Mutex<Option<Reply>>,
    next_id: Mutex<u32>,
    calls: Mutex<Vec<Call>>,
}

impl FakeBackend {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Backend that already knows `sessions`, each with its own history
    #[must_use]
    pub fn with_sessions(sessions: &[(&str, &str, Vec<Turn>)]) -> Arc<Self> {
        let backend = Self::default();
        for (id, name, turns) in sessions {
            backend.sessions.lock().unwrap().push(Session {
                id: SessionId::new(*id),
                name: (*name).to_string(),
            });
            backend
                .turns
                .lock()
                .unwrap()
                .insert((*id).to_string(), turns.clone());
        }
        Arc::new(backend)
    }

    /// Queue the outcome of the next `ask`
    pub fn script_reply(&self, reply: Reply) {
        self.script_delayed_reply(Duration::ZERO, reply);
    }

    /// Queue the outcome of the next `ask`, delivered after `delay`
    pub fn script_delayed_reply(&self, delay: Duration, reply: Reply) {
        self.replies.lock().unwrap().push_back((delay, reply));
    }

    pub fn fail_tts(&self) {
        *self.tts_failure.lock().unwrap() = true;
    }

    pub fn delay_tts(&self, delay: Duration) {
        *self.tts_delay.lock().unwrap() = delay;
    }

    pub fn fail_fetch(&self) {
        *self.fetch_failure.lock().unwrap() = true;
    }

    pub fn fail_list(&self) {
        *self.list_failure.lock().unwrap() = true;
    }

    /// Make every upload and scrape fail with `reply`
    pub fn fail_ingest(&self, reply: Reply) {
        *self.ingest_reply.lock().unwrap() = Some(reply);
    }

    #[must_use]
    pub fn calls(&self) -> Vec<Call> {
        self.calls.lock().unwrap().clone()
    }

    #[must_use]
    pub fn ask_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Ask { .. }))
            .count()
    }

    #[must_use]
    pub fn synthesize_count(&self) -> usize {
        self.calls()
            .iter()
            .filter(|c| matches!(c, Call::Synthesize { .. }))
            .count()
    }

    fn record(&self, call: Call) {
        self.calls.lock().unwrap().push(call);
    }

    fn ingest_result(&self) -> Result<()> {
        match self.ingest_reply.lock().unwrap().clone() {
            Some(reply) => reply.into_result().map(|_| ()),
            None => Ok(()),
        }
    }
}

#[async_trait]
impl Backend for FakeBackend {
    async fn list_sessions(&self) -> Result<Vec<Session>> {
        self.record(Call::ListSessions);
        if *self.list_failure.lock().unwrap() {
            return Err(Error::Network("connection refused".to_string()));
        }
        Ok(self.sessions.lock().unwrap().clone())
    }

    async fn create_session(&self, name: &str, seed: Option<Document>) -> Result<SessionId> {
        self.record(Call::CreateSession {
            name: name.to_string(),
            seed: seed.map(|d| d.file_name),
        });

        let id = {
            let mut next = self.next_id.lock().unwrap();
            *next += 1;
            SessionId::new(format!("new-{}", *next))
        };
        self.sessions.lock().unwrap().push(Session {
            id: id.clone(),
            name: name.to_string(),
        });
        Ok(id)
    }

    async fn fetch_turns(&self, session: &SessionId) -> Result<Vec<Turn>> {
        self.record(Call::FetchTurns(session.to_string()));
        if *self.fetch_failure.lock().unwrap() {
            return Err(Error::Network("connection reset".to_string()));
        }
        Ok(self
            .turns
            .lock()
            .unwrap()
            .get(session.as_str())
            .cloned()
            .unwrap_or_default())
    }

    async fn ask(&self, session: &SessionId, question: &str, lang: &str) -> Result<String> {
        self.record(Call::Ask {
            session: session.to_string(),
            question: question.to_string(),
            lang: lang.to_string(),
        });

        let scripted = self.replies.lock().unwrap().pop_front();
        let (delay, reply) =
            scripted.unwrap_or_else(|| (Duration::ZERO, Reply::Answer(format!("re: {question}"))));
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        reply.into_result()
    }

    async fn synthesize(&self, text: &str, lang: &str) -> Result<Vec<u8>> {
        self.record(Call::Synthesize {
            text: text.to_string(),
            lang: lang.to_string(),
        });

        let delay = *self.tts_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        if *self.tts_failure.lock().unwrap() {
            return Err(Error::Network("tts unavailable".to_string()));
        }
        Ok(text.as_bytes().to_vec())
    }

    async fn upload_file(&self, session: &SessionId, document: Document) -> Result<()> {
        self.record(Call::Upload {
            session: session.to_string(),
            file: document.file_name,
        });
        self.ingest_result()
    }

    async fn scrape_url(&self, session: &SessionId, url: &str) -> Result<()> {
        self.record(Call::Scrape {
            session: session.to_string(),
            url: url.to_string(),
        });
        self.ingest_result()
    }
}

/// Audio output that records start/stop events instead of playing
#[derive(Default)]
pub struct RecordingOutput {
    events: Arc<Mutex<Vec<String>>>,
    started: Mutex<usize>,
}

impl RecordingOutput {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    /// Events in order: `start:<n>:<payload>` and `stop:<n>`
    #[must_use]
    pub fn events(&self) -> Vec<String> {
        self.events.lock().unwrap().clone()
    }

    /// Payloads of every started stream
    #[must_use]
    pub fn played(&self) -> Vec<String> {
        self.events()
            .iter()
            .filter_map(|e| e.strip_prefix("start:"))
            .filter_map(|rest| rest.split_once(':').map(|(_, payload)| payload.to_string()))
            .collect()
    }

    /// Streams started but not yet stopped
    #[must_use]
    pub fn active(&self) -> usize {
        let events = self.events();
        let starts = events.iter().filter(|e| e.starts_with("start:")).count();
        let stops = events.iter().filter(|e| e.starts_with("stop:")).count();
        starts - stops
    }
}

impl AudioOutput for RecordingOutput {
    fn start(&self, audio: &[u8]) -> Result<Box<dyn ActiveAudio>> {
        let n = {
            let mut started = self.started.lock().unwrap();
            *started += 1;
            *started
        };
        self.events.lock().unwrap().push(format!(
            "start:{n}:{}",
            String::from_utf8_lossy(audio)
        ));
        Ok(Box::new(RecordingStream {
            n,
            events: Arc::clone(&self.events),
            stopped: false,
        }))
    }
}

struct RecordingStream {
    n: usize,
    events: Arc<Mutex<Vec<String>>>,
    stopped: bool,
}

impl ActiveAudio for RecordingStream {
    fn stop(&mut self) {
        if !self.stopped {
            self.stopped = true;
            self.events.lock().unwrap().push(format!("stop:{}", self.n));
        }
    }

    fn is_finished(&self) -> bool {
        self.stopped
    }
}

/// Recognizer that returns queued results after an optional delay
#[derive(Default)]
pub struct ScriptedRecognizer {
    results: Mutex<VecDeque<Result<Option<String>>>>,
    delay: Mutex<Duration>,
    locales: Mutex<Vec<String>>,
    tokens: Mutex<Vec<CancellationToken>>,
}

impl ScriptedRecognizer {
    #[must_use]
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn script(&self, result: Result<Option<String>>) {
        self.results.lock().unwrap().push_back(result);
    }

    pub fn set_delay(&self, delay: Duration) {
        *self.delay.lock().unwrap() = delay;
    }

    #[must_use]
    pub fn locales(&self) -> Vec<String> {
        self.locales.lock().unwrap().clone()
    }

    /// Cancellation tokens handed to each `recognize` call, oldest first
    #[must_use]
    pub fn tokens(&self) -> Vec<CancellationToken> {
        self.tokens.lock().unwrap().clone()
    }
}

#[async_trait]
impl SpeechRecognizer for ScriptedRecognizer {
    async fn recognize(
        &self,
        language: &LanguageProfile,
        cancel: CancellationToken,
    ) -> Result<Option<String>> {
        self.locales.lock().unwrap().push(language.locale.clone());
        self.tokens.lock().unwrap().push(cancel.clone());
        let delay = *self.delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::select! {
                () = tokio::time::sleep(delay) => {}
                () = cancel.cancelled() => return Ok(None),
            }
        }
        self.results.lock().unwrap().pop_front().unwrap_or(Ok(None))
    }
}

/// Options with short timeouts so failing tests finish quickly
#[must_use]
pub fn test_options() -> OrchestratorOptions {
    OrchestratorOptions {
        request_timeout: Duration::from_secs(2),
        ingest_timeout: Duration::from_secs(2),
        speak_answers: true,
        ..OrchestratorOptions::default()
    }
}

/// Orchestrator wired to fakes, without speech input
#[must_use]
pub fn orchestrator(
    backend: &Arc<FakeBackend>,
    output: &Arc<RecordingOutput>,
) -> (Orchestrator, Completions) {
    orchestrator_with(backend, output, None, test_options())
}

#[must_use]
pub fn orchestrator_with(
    backend: &Arc<FakeBackend>,
    output: &Arc<RecordingOutput>,
    recognizer: Option<Arc<ScriptedRecognizer>>,
    options: OrchestratorOptions,
) -> (Orchestrator, Completions) {
    let backend: Arc<dyn Backend> = backend.clone();
    let output: Arc<dyn AudioOutput> = output.clone();
    let recognizer = recognizer.map(|r| r as Arc<dyn SpeechRecognizer>);
    Orchestrator::new(backend, output, recognizer, options)
}

/// Apply the next `n` completions, failing the test if one takes too long
pub async fn pump(orch: &mut Orchestrator, completions: &mut Completions, n: usize) {
    for _ in 0..n {
        let completion = tokio::time::timeout(Duration::from_secs(5), completions.next())
            .await
            .expect("timed out waiting for a completion")
            .expect("completion channel closed");
        orch.apply(completion);
    }
}

/// Assert that no completion arrives within `wait`
pub async fn assert_quiet(completions: &mut Completions, wait: Duration) {
    let next = tokio::time::timeout(wait, completions.next()).await;
    assert!(next.is_err(), "unexpected completion");
}
