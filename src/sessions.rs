//! Session registry client
//!
//! Fetches and creates named sessions and keeps the last known list.

use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Backend, Document, with_timeout};
use crate::types::Session;
use crate::{Error, Result};

/// Client-side view of the backend's sessions
pub struct SessionRegistry {
    backend: Arc<dyn Backend>,
    timeout: Duration,
    sessions: Vec<Session>,
}

impl SessionRegistry {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, timeout: Duration) -> Self {
        Self {
            backend,
            timeout,
            sessions: Vec::new(),
        }
    }

    /// Fetch the session list
    ///
    /// # Errors
    ///
    /// Returns a network or timeout error if the backend cannot be reached
    pub async fn list(&mut self) -> Result<Vec<Session>> {
        let sessions = with_timeout(self.timeout, self.backend.list_sessions()).await?;
        self.sessions.clone_from(&sessions);
        Ok(sessions)
    }

    /// Fetch the session list, degrading to an empty list on failure
    ///
    /// The error is handed back so the caller can surface it.
    pub async fn refresh(&mut self) -> (Vec<Session>, Option<Error>) {
        match self.list().await {
            Ok(sessions) => (sessions, None),
            Err(e) => {
                tracing::warn!(error = %e, "failed to list sessions");
                self.sessions.clear();
                (Vec::new(), Some(e))
            }
        }
    }

    /// Create a session and refresh the cached list
    ///
    /// # Errors
    ///
    /// Returns `Validation` for a blank name (no network call is made), or a
    /// network/timeout error from the backend
    pub async fn create(&mut self, name: &str, seed: Option<Document>) -> Result<Session> {
        let name = name.trim();
        if name.is_empty() {
            return Err(Error::Validation("session name is required".to_string()));
        }

        let id = with_timeout(self.timeout, self.backend.create_session(name, seed)).await?;
        let session = Session {
            id,
            name: name.to_string(),
        };

        if let Err(e) = self.list().await {
            tracing::warn!(error = %e, "session created but list refresh failed");
            if !self.sessions.iter().any(|s| s.id == session.id) {
                self.sessions.push(session.clone());
            }
        }

        Ok(session)
    }

    /// Last fetched session list
    #[must_use]
    pub fn cached(&self) -> &[Session] {
        &self.sessions
    }
}
