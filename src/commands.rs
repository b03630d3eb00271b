//! Slash command parsing for the chat loop
//!
//! Plain lines are questions. Lines starting with `/` control sessions,
//! ingestion, language and voice.

use std::path::PathBuf;

use crate::backend::check_document_path;
use crate::types::Language;

/// One line of user input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Send a question
    Ask(String),
    /// List sessions
    Sessions,
    /// Create a session, optionally seeded with a document
    New { name: String, seed: Option<PathBuf> },
    /// Switch session; `None` clears the conversation
    Use(Option<String>),
    /// Upload a document into the active session
    Upload(PathBuf),
    /// Scrape a web page into the active session
    Scrape(String),
    /// Choose a language, or toggle when none is given
    Lang(Option<Language>),
    /// Capture one utterance into the input
    Listen,
    /// Stop playback and listening
    Stop,
    /// Toggle spoken answers
    Mute,
    Help,
    Quit,
    /// Malformed or unknown command, with the reason
    Invalid(String),
}

/// Parse one input line
///
/// Returns `None` for blank input.
#[must_use]
pub fn parse(input: &str) -> Option<Command> {
    let trimmed = input.trim();
    if trimmed.is_empty() {
        return None;
    }
    if !trimmed.starts_with('/') {
        return Some(Command::Ask(trimmed.to_string()));
    }

    let (cmd, arg) = trimmed
        .split_once(char::is_whitespace)
        .map_or((trimmed, ""), |(c, a)| (c, a.trim()));

    let command = match cmd.to_lowercase().as_str() {
        "/sessions" | "/ls" => Command::Sessions,
        "/new" => parse_new(arg),
        "/use" => Command::Use((!arg.is_empty()).then(|| arg.to_string())),
        "/upload" => {
            if arg.is_empty() {
                Command::Invalid("/upload requires a file path".to_string())
            } else {
                Command::Upload(PathBuf::from(arg))
            }
        }
        "/scrape" => {
            if arg.is_empty() {
                Command::Invalid("/scrape requires a URL".to_string())
            } else {
                Command::Scrape(arg.to_string())
            }
        }
        "/lang" => {
            if arg.is_empty() {
                Command::Lang(None)
            } else {
                match arg.parse() {
                    Ok(language) => Command::Lang(Some(language)),
                    Err(e) => Command::Invalid(e.to_string()),
                }
            }
        }
        "/listen" | "/mic" => Command::Listen,
        "/stop" => Command::Stop,
        "/mute" => Command::Mute,
        "/help" | "/h" | "/?" => Command::Help,
        "/quit" | "/exit" | "/q" => Command::Quit,
        other => Command::Invalid(format!("unknown command: {other}")),
    };

    Some(command)
}

/// `/new <name> [seed-file]`; a trailing document path becomes the seed
fn parse_new(arg: &str) -> Command {
    if arg.is_empty() {
        return Command::Invalid("/new requires a session name".to_string());
    }

    if let Some((name, last)) = arg.rsplit_once(char::is_whitespace) {
        let path = PathBuf::from(last);
        if check_document_path(&path).is_ok() && !name.trim().is_empty() {
            return Command::New {
                name: name.trim().to_string(),
                seed: Some(path),
            };
        }
    }

    Command::New {
        name: arg.to_string(),
        seed: None,
    }
}

/// Help text for the chat loop
pub const HELP: &str = "\
Type a question and press enter to ask it.

  /sessions               list sessions
  /new <name> [file]      create a session, optionally seeded with a document
  /use <id>               switch session (no id clears the conversation)
  /upload <path>          add a document to the session
  /scrape <url>           add a web page to the session
  /lang [primary|secondary]  choose or toggle the answer language
  /listen                 speak your question
  /stop                   stop audio and listening
  /mute                   toggle spoken answers
  /help                   show this help
  /quit                   exit";
