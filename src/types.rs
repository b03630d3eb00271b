//! Core data types shared across the client

use std::fmt;

use serde::{Deserialize, Serialize};

/// Opaque backend-issued session identifier
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct SessionId(String);

impl SessionId {
    /// Wrap a raw identifier
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Parse user input; blank input means "no session"
    #[must_use]
    pub fn parse(raw: &str) -> Option<Self> {
        let trimmed = raw.trim();
        (!trimmed.is_empty()).then(|| Self(trimmed.to_string()))
    }

    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for SessionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A named, backend-persisted conversation context
///
/// The backend stores sessions as `{_id, session_name}` documents; both that
/// spelling and the plain `{id, name}` form are accepted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    #[serde(alias = "_id")]
    pub id: SessionId,
    #[serde(alias = "session_name", default)]
    pub name: String,
}

/// Author of a turn
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Bot,
}

/// One message exchanged in a session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Turn {
    pub sender: Sender,
    pub text: String,
}

impl Turn {
    #[must_use]
    pub fn user(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::User,
            text: text.into(),
        }
    }

    #[must_use]
    pub fn bot(text: impl Into<String>) -> Self {
        Self {
            sender: Sender::Bot,
            text: text.into(),
        }
    }
}

/// Which of the two configured languages is active
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Language {
    #[default]
    Primary,
    Secondary,
}

impl Language {
    /// The other language
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Primary => Self::Secondary,
            Self::Secondary => Self::Primary,
        }
    }
}

impl std::str::FromStr for Language {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "primary" | "1" => Ok(Self::Primary),
            "secondary" | "2" => Ok(Self::Secondary),
            other => Err(crate::Error::Validation(format!(
                "unknown language '{other}', expected primary or secondary"
            ))),
        }
    }
}

impl fmt::Display for Language {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Primary => f.write_str("primary"),
            Self::Secondary => f.write_str("secondary"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_session_accepts_backend_field_names() {
        let raw = r#"[{"_id": "665f", "session_name": "physics"}, {"id": "s2", "name": "demo"}]"#;
        let sessions: Vec<Session> = serde_json::from_str(raw).unwrap();

        assert_eq!(sessions[0].id.as_str(), "665f");
        assert_eq!(sessions[0].name, "physics");
        assert_eq!(sessions[1].id, SessionId::new("s2"));
        assert_eq!(sessions[1].name, "demo");
    }

    #[test]
    fn test_turn_wire_format() {
        let turn: Turn = serde_json::from_str(r#"{"sender": "bot", "text": "hello"}"#).unwrap();
        assert_eq!(turn, Turn::bot("hello"));

        let json = serde_json::to_string(&Turn::user("hi")).unwrap();
        assert_eq!(json, r#"{"sender":"user","text":"hi"}"#);
    }

    #[test]
    fn test_session_id_parse_blank() {
        assert_eq!(SessionId::parse("   "), None);
        assert_eq!(SessionId::parse(" s1 "), Some(SessionId::new("s1")));
    }

    #[test]
    fn test_language_from_str() {
        assert_eq!("Secondary".parse::<Language>().unwrap(), Language::Secondary);
        assert!("klingon".parse::<Language>().is_err());
        assert_eq!(Language::Primary.toggled(), Language::Secondary);
    }
}
