//! Append-only message log for the active session

use crate::types::{SessionId, Turn};

/// Ordered turns of one session
#[derive(Debug, Clone, Default)]
pub struct MessageLog {
    session: Option<SessionId>,
    turns: Vec<Turn>,
    local_appends: usize,
    generation: u64,
}

impl MessageLog {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the log with turns fetched for `session`
    pub fn load(&mut self, session: SessionId, turns: Vec<Turn>) {
        tracing::trace!(session = %session, turns = turns.len(), "loaded message log");
        self.session = Some(session);
        self.turns = turns;
        self.local_appends = 0;
        self.generation += 1;
    }

    /// Append one turn; existing turns are never touched
    pub fn append(&mut self, turn: Turn) {
        self.turns.push(turn);
        self.local_appends += 1;
    }

    /// Forget the session and its turns
    pub fn clear(&mut self) {
        self.session = None;
        self.turns.clear();
        self.local_appends = 0;
        self.generation += 1;
    }

    /// True while nothing was appended since the last load
    #[must_use]
    pub const fn is_pristine(&self) -> bool {
        self.local_appends == 0
    }

    /// Bumped by every `load` and `clear`, so a renderer knows when the
    /// turns it already showed were replaced
    #[must_use]
    pub const fn generation(&self) -> u64 {
        self.generation
    }

    #[must_use]
    pub const fn session(&self) -> Option<&SessionId> {
        self.session.as_ref()
    }

    #[must_use]
    pub fn turns(&self) -> &[Turn] {
        &self.turns
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.turns.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.turns.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_load_replaces_previous_session() {
        let mut log = MessageLog::new();
        log.load(SessionId::new("a"), vec![Turn::user("q"), Turn::bot("a")]);
        log.append(Turn::user("more"));

        log.load(SessionId::new("b"), vec![Turn::bot("welcome")]);
        assert_eq!(log.session(), Some(&SessionId::new("b")));
        assert_eq!(log.turns(), &[Turn::bot("welcome")]);
        assert!(log.is_pristine());
    }

    #[test]
    fn test_reload_same_session_is_idempotent() {
        let history = vec![Turn::user("hi"), Turn::bot("hello")];
        let mut log = MessageLog::new();

        log.load(SessionId::new("s1"), history.clone());
        let first = log.turns().to_vec();
        log.load(SessionId::new("s1"), history);

        assert_eq!(log.turns(), first.as_slice());
    }

    #[test]
    fn test_generation_changes_on_reload_not_append() {
        let mut log = MessageLog::new();
        log.load(SessionId::new("s1"), vec![Turn::bot("x")]);
        let loaded = log.generation();

        log.append(Turn::user("y"));
        assert_eq!(log.generation(), loaded);

        log.load(SessionId::new("s1"), vec![Turn::bot("x")]);
        assert!(log.generation() > loaded);

        let reloaded = log.generation();
        log.clear();
        assert!(log.generation() > reloaded);
    }

    #[test]
    fn test_append_is_monotonic() {
        let mut log = MessageLog::new();
        log.load(SessionId::new("s1"), vec![Turn::bot("first")]);
        log.append(Turn::user("second"));
        log.append(Turn::bot("third"));

        assert_eq!(log.len(), 3);
        assert_eq!(log.turns()[0], Turn::bot("first"));
        assert_eq!(log.turns()[2], Turn::bot("third"));
        assert!(!log.is_pristine());
    }

    #[test]
    fn test_clear() {
        let mut log = MessageLog::new();
        log.load(SessionId::new("s1"), vec![Turn::bot("x")]);
        log.clear();

        assert!(log.is_empty());
        assert!(log.session().is_none());
    }
}
