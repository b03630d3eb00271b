//! Question-answering backend contract
//!
//! Everything the client needs from the server goes through [`Backend`]:
//! session listing and creation, session history, questions, speech
//! synthesis, and context ingestion. [`HttpBackend`] speaks the HTTP
//! contract; tests substitute scripted implementations.

mod http;

use std::future::Future;
use std::path::Path;
use std::time::Duration;

use async_trait::async_trait;

use crate::types::{Session, SessionId, Turn};
use crate::{Error, Result};

pub use http::{AskRoute, HttpBackend};

/// File extensions the backend can ingest
pub const SUPPORTED_DOCUMENT_EXTENSIONS: &[&str] = &[
    "pdf", "txt", "md", "doc", "docx", "csv", "html", "htm", "json",
];

/// A document read from disk, ready to upload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Document {
    /// File name sent with the multipart part
    pub file_name: String,

    /// Raw file contents
    pub bytes: Vec<u8>,
}

impl Document {
    /// Build a document from in-memory bytes
    #[must_use]
    pub fn new(file_name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            file_name: file_name.into(),
            bytes,
        }
    }

    /// Read a document from disk after checking its extension
    ///
    /// # Errors
    ///
    /// Returns `Validation` for unsupported file types and `Io` if the file
    /// cannot be read
    pub async fn read(path: &Path) -> Result<Self> {
        check_document_path(path)?;

        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .ok_or_else(|| Error::Validation(format!("not a file: {}", path.display())))?;

        let bytes = tokio::fs::read(path).await?;
        tracing::debug!(file = %file_name, bytes = bytes.len(), "read document");

        Ok(Self { file_name, bytes })
    }

    /// MIME type derived from the extension
    #[must_use]
    pub fn mime_type(&self) -> &'static str {
        match extension(Path::new(&self.file_name)).as_deref() {
            Some("pdf") => "application/pdf",
            Some("txt") => "text/plain",
            Some("md") => "text/markdown",
            Some("doc") => "application/msword",
            Some("docx") => {
                "application/vnd.openxmlformats-officedocument.wordprocessingml.document"
            }
            Some("csv") => "text/csv",
            Some("html" | "htm") => "text/html",
            Some("json") => "application/json",
            _ => "application/octet-stream",
        }
    }
}

/// Reject paths whose extension the backend cannot ingest
///
/// # Errors
///
/// Returns `Validation` naming the accepted extensions
pub fn check_document_path(path: &Path) -> Result<()> {
    match extension(path) {
        Some(ext) if SUPPORTED_DOCUMENT_EXTENSIONS.contains(&ext.as_str()) => Ok(()),
        _ => Err(Error::Validation(format!(
            "unsupported document type: {} (expected one of: {})",
            path.display(),
            SUPPORTED_DOCUMENT_EXTENSIONS.join(", ")
        ))),
    }
}

fn extension(path: &Path) -> Option<String> {
    path.extension()
        .map(|e| e.to_string_lossy().to_lowercase())
}

/// Bound a backend call, mapping expiry to `Error::Timeout`
///
/// # Errors
///
/// Returns the call's own error, or `Timeout` if `limit` elapses first
pub async fn with_timeout<T>(limit: Duration, call: impl Future<Output = Result<T>>) -> Result<T> {
    tokio::time::timeout(limit, call)
        .await
        .unwrap_or(Err(Error::Timeout(limit)))
}

/// Remote question-answering service
#[async_trait]
pub trait Backend: Send + Sync {
    /// List all sessions known to the backend
    async fn list_sessions(&self) -> Result<Vec<Session>>;

    /// Create a named session, optionally seeded with a document
    async fn create_session(&self, name: &str, seed: Option<Document>) -> Result<SessionId>;

    /// Fetch the stored turns of a session
    async fn fetch_turns(&self, session: &SessionId) -> Result<Vec<Turn>>;

    /// Ask a question within a session's context
    async fn ask(&self, session: &SessionId, question: &str, lang: &str) -> Result<String>;

    /// Synthesize speech for `text`; returns encoded audio (MP3)
    async fn synthesize(&self, text: &str, lang: &str) -> Result<Vec<u8>>;

    /// Add a document to a session's context
    async fn upload_file(&self, session: &SessionId, document: Document) -> Result<()>;

    /// Add a scraped web page to a session's context
    async fn scrape_url(&self, session: &SessionId, url: &str) -> Result<()>;
}
