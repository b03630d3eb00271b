//! Ragchat - terminal client for a retrieval-augmented QA backend
//!
//! This library provides the client side of a conversational session:
//! - Named sessions with server-side history
//! - Strict question/answer turn-taking with stale-response protection
//! - Context ingestion (documents and web pages)
//! - Spoken answers and single-shot speech input
//!
//! # Architecture
//!
//! ```text
//! ┌─────────────────────────────────────────────────────┐
//! │                    Terminal REPL                     │
//! │   Input  │  Slash commands  │  Transcript renderer   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                  Orchestrator                        │
//! │  Sessions │ Message log │ Ingestion │ Capture/Play   │
//! └────────────────────┬────────────────────────────────┘
//!                      │
//! ┌────────────────────▼────────────────────────────────┐
//! │                QA backend (HTTP)                     │
//! │   Sessions  │  Ask  │  TTS  │  Upload  │  Scrape     │
//! └─────────────────────────────────────────────────────┘
//! ```

pub mod backend;
pub mod commands;
pub mod config;
pub mod error;
pub mod ingest;
pub mod orchestrator;
pub mod sessions;
pub mod setup;
pub mod transcript;
pub mod types;
pub mod voice;

pub use backend::{Backend, Document, HttpBackend};
pub use commands::Command;
pub use config::Config;
pub use error::{Error, ErrorKind, Result};
pub use orchestrator::{
    Completion, Completions, ConversationSnapshot, Notice, NoticeLevel, Orchestrator,
    OrchestratorOptions, Phase,
};
pub use types::{Language, Sender, Session, SessionId, Turn};
