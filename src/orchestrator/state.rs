//! Conversation state, snapshots, and notices

use crate::Error;
use crate::transcript::MessageLog;
use crate::types::{Language, Session, SessionId, Turn};

/// Where the orchestrator is in the turn-taking protocol
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum Phase {
    /// Ready for a new question
    #[default]
    Idle,
    /// Question sent, waiting for the answer
    AwaitingAnswer,
    /// Answer shown, waiting for synthesized speech
    AwaitingSpeech,
}

/// Everything the orchestrator owns about the conversation
#[derive(Debug, Default)]
pub struct ConversationState {
    pub(crate) active_session: Option<SessionId>,
    pub(crate) sessions: Vec<Session>,
    pub(crate) log: MessageLog,
    pub(crate) phase: Phase,
    pub(crate) language: Language,
    pub(crate) input: String,
}

impl ConversationState {
    #[must_use]
    pub const fn active_session(&self) -> Option<&SessionId> {
        self.active_session.as_ref()
    }

    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        self.log.turns()
    }

    #[must_use]
    pub const fn phase(&self) -> Phase {
        self.phase
    }

    /// A question or its speech is still outstanding
    #[must_use]
    pub fn pending_request(&self) -> bool {
        self.phase != Phase::Idle
    }

    #[must_use]
    pub const fn language(&self) -> Language {
        self.language
    }

    #[must_use]
    pub fn input(&self) -> &str {
        &self.input
    }
}

/// Immutable copy of the state handed to renderers
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConversationSnapshot {
    pub active_session: Option<SessionId>,
    pub sessions: Vec<Session>,
    pub turns: Vec<Turn>,
    /// Changes whenever `turns` was replaced rather than appended to
    pub turns_generation: u64,
    pub phase: Phase,
    pub pending_request: bool,
    pub language: Language,
    pub input: String,
    pub listening: bool,
}

/// How urgently a notice must be shown
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NoticeLevel {
    /// Needs the user's attention before continuing
    Blocking,
    /// Informational; may scroll past
    Transient,
}

/// A user-facing message that is not part of the transcript
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Notice {
    pub level: NoticeLevel,
    pub message: String,
}

impl Notice {
    #[must_use]
    pub fn blocking(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Blocking,
            message: message.into(),
        }
    }

    #[must_use]
    pub fn transient(message: impl Into<String>) -> Self {
        Self {
            level: NoticeLevel::Transient,
            message: message.into(),
        }
    }

    /// Notice for an error, leveled by its kind
    #[must_use]
    pub fn from_error(error: &Error) -> Self {
        if error.is_blocking() {
            Self::blocking(error.to_string())
        } else {
            Self::transient(error.to_string())
        }
    }
}
