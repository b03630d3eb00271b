//! Ingestion client: adds documents and web pages to a session's context
//!
//! Ingestion never touches the message log. Results are reported to the user
//! as notices only.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::backend::{Backend, Document, check_document_path, with_timeout};
use crate::types::SessionId;
use crate::{Error, Result};

/// Shown when no session is selected
pub const NO_SESSION_MESSAGE: &str = "Please select a session first.";

/// Uploads files and scrapes URLs into a session
#[derive(Clone)]
pub struct IngestionClient {
    backend: Arc<dyn Backend>,
    timeout: Duration,
}

impl IngestionClient {
    #[must_use]
    pub fn new(backend: Arc<dyn Backend>, timeout: Duration) -> Self {
        Self { backend, timeout }
    }

    /// Upload a document into the session's context
    ///
    /// # Errors
    ///
    /// `Precondition` without a session, `Validation` for unsupported file
    /// types, `Io` if the file cannot be read, otherwise the backend error
    pub async fn upload_file(&self, session: Option<&SessionId>, path: &Path) -> Result<()> {
        let session = require_session(session)?;
        check_document_path(path)?;

        let document = Document::read(path).await?;
        with_timeout(self.timeout, self.backend.upload_file(session, document)).await
    }

    /// Scrape a web page into the session's context
    ///
    /// # Errors
    ///
    /// `Precondition` without a session, `Validation` for malformed URLs,
    /// otherwise the backend error
    pub async fn scrape_url(&self, session: Option<&SessionId>, url: &str) -> Result<()> {
        let session = require_session(session)?;
        let url = validate_url(url)?;

        with_timeout(self.timeout, self.backend.scrape_url(session, &url)).await
    }
}

/// Fail with a precondition error when no session is selected
///
/// # Errors
///
/// Returns `Precondition` if `session` is `None`
pub fn require_session(session: Option<&SessionId>) -> Result<&SessionId> {
    session.ok_or_else(|| Error::Precondition(NO_SESSION_MESSAGE.to_string()))
}

/// Normalize and check a URL the user wants scraped
///
/// # Errors
///
/// Returns `Validation` for empty input or anything that is not http(s)
pub fn validate_url(raw: &str) -> Result<String> {
    let trimmed = raw.trim();
    if trimmed.is_empty() {
        return Err(Error::Validation("a URL is required".to_string()));
    }

    let parsed = url::Url::parse(trimmed)
        .map_err(|e| Error::Validation(format!("invalid URL '{trimmed}': {e}")))?;

    match parsed.scheme() {
        "http" | "https" => Ok(parsed.to_string()),
        scheme => Err(Error::Validation(format!(
            "unsupported URL scheme '{scheme}', expected http or https"
        ))),
    }
}

/// User-facing reason for an ingestion failure
///
/// The backend's `detail` is shown verbatim when present.
#[must_use]
pub fn failure_message(error: &Error, fallback: &str) -> String {
    match error {
        Error::Rejected {
            detail: Some(detail),
            ..
        } => detail.clone(),
        Error::Timeout(_)
        | Error::Precondition(_)
        | Error::Validation(_)
        | Error::Io(_) => format!("{fallback}: {error}"),
        _ => fallback.to_string(),
    }
}
