//! HTTP implementation of the backend contract

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};

use super::{Backend, Document};
use crate::types::{Session, SessionId, Turn};
use crate::{Error, Result};

/// Where questions are posted
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AskRoute {
    /// `POST /ask/{session_id}`
    PerSession,
    /// `POST /ask`, for backends without session support
    Shared,
}

/// Client for the question-answering backend's HTTP API
#[derive(Debug, Clone)]
pub struct HttpBackend {
    /// HTTP client
    client: Client,
    /// Base URL without trailing slash
    base_url: String,
    ask_route: AskRoute,
}

#[derive(Serialize)]
struct AskRequest<'a> {
    question: &'a str,
    lang: &'a str,
}

#[derive(Deserialize)]
struct AskResponse {
    answer: String,
}

#[derive(Deserialize)]
struct CreateSessionResponse {
    session_id: SessionId,
}

#[derive(Deserialize)]
struct SessionTurnsResponse {
    #[serde(default)]
    messages: Vec<Turn>,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<serde_json::Value>,
}

impl HttpBackend {
    /// Create a new backend client
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the backend (e.g., <http://localhost:8000>)
    /// * `ask_route` - Whether questions are scoped to a session
    #[must_use]
    pub fn new(base_url: impl Into<String>, ask_route: AskRoute) -> Self {
        Self::with_client(Client::new(), base_url, ask_route)
    }

    /// Create a backend client around a preconfigured `reqwest::Client`
    #[must_use]
    pub fn with_client(client: Client, base_url: impl Into<String>, ask_route: AskRoute) -> Self {
        let base_url = base_url.into().trim_end_matches('/').to_string();
        Self {
            client,
            base_url,
            ask_route,
        }
    }

    /// Base URL this client talks to
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }

    fn session_url(&self, prefix: &str, session: &SessionId) -> String {
        format!(
            "{}/{prefix}/{}",
            self.base_url,
            urlencoding::encode(session.as_str())
        )
    }
}

/// Turn a non-success response into `Error::Rejected`, keeping `detail`
async fn check(response: reqwest::Response) -> Result<reqwest::Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    let detail = serde_json::from_str::<ErrorBody>(&body)
        .ok()
        .and_then(|b| b.detail)
        .map(|d| match d {
            serde_json::Value::String(s) => s,
            other => other.to_string(),
        });

    tracing::warn!(status = %status, detail = ?detail, "backend rejected request");

    Err(Error::Rejected {
        status: status.as_u16(),
        detail,
    })
}

fn document_part(document: Document) -> Result<reqwest::multipart::Part> {
    let mime = document.mime_type();
    reqwest::multipart::Part::bytes(document.bytes)
        .file_name(document.file_name)
        .mime_str(mime)
        .map_err(|e| Error::Validation(e.to_string()))
}

#[async_trait]
impl Backend for HttpBackend {
    async fn list_sessions(&self) -> Result<Vec<Session>> {
        let response = self.client.get(self.url("/sessions")).send().await?;
        let sessions: Vec<Session> = check(response).await?.json().await?;

        tracing::debug!(count = sessions.len(), "listed sessions");
        Ok(sessions)
    }

    async fn create_session(&self, name: &str, seed: Option<Document>) -> Result<SessionId> {
        let mut form = reqwest::multipart::Form::new().text("session_name", name.to_string());
        if let Some(document) = seed {
            form = form.part("file", document_part(document)?);
        }

        let response = self
            .client
            .post(self.url("/create-session"))
            .multipart(form)
            .send()
            .await?;
        let created: CreateSessionResponse = check(response).await?.json().await?;

        tracing::info!(session = %created.session_id, name, "created session");
        Ok(created.session_id)
    }

    async fn fetch_turns(&self, session: &SessionId) -> Result<Vec<Turn>> {
        let response = self
            .client
            .get(self.session_url("session", session))
            .send()
            .await?;
        let body: SessionTurnsResponse = check(response).await?.json().await?;

        Ok(body.messages)
    }

    async fn ask(&self, session: &SessionId, question: &str, lang: &str) -> Result<String> {
        let url = match self.ask_route {
            AskRoute::PerSession => self.session_url("ask", session),
            AskRoute::Shared => self.url("/ask"),
        };

        let response = self
            .client
            .post(&url)
            .json(&AskRequest { question, lang })
            .send()
            .await?;
        let body: AskResponse = check(response).await?.json().await?;

        Ok(body.answer)
    }

    async fn synthesize(&self, text: &str, lang: &str) -> Result<Vec<u8>> {
        let response = self
            .client
            .get(self.url("/tts"))
            .query(&[("text", text), ("lang", lang)])
            .send()
            .await?;
        let audio = check(response).await?.bytes().await?;

        if audio.is_empty() {
            return Err(Error::Network("TTS returned no audio".to_string()));
        }

        tracing::debug!(bytes = audio.len(), lang, "synthesized speech");
        Ok(audio.to_vec())
    }

    async fn upload_file(&self, session: &SessionId, document: Document) -> Result<()> {
        let file_name = document.file_name.clone();
        let form = reqwest::multipart::Form::new().part("file", document_part(document)?);

        let response = self
            .client
            .post(self.session_url("upload", session))
            .multipart(form)
            .send()
            .await?;
        check(response).await?;

        tracing::info!(session = %session, file = %file_name, "uploaded document");
        Ok(())
    }

    async fn scrape_url(&self, session: &SessionId, url: &str) -> Result<()> {
        let response = self
            .client
            .post(self.session_url("scrape", session))
            .form(&[("url", url)])
            .send()
            .await?;
        check(response).await?;

        tracing::info!(session = %session, url, "scraped url into session");
        Ok(())
    }
}
