//! Configuration management for the chat client

pub mod file;

use std::time::Duration;

use crate::types::Language;
use crate::voice::SttProviderKind;
use crate::{Error, Result};

use self::file::ConfigFile;

/// Greeting shown as the first bot turn in single-session mode
pub const DEFAULT_GREETING: &str = "Hello! Ask me anything about AI concepts.";

/// Client configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Backend connection
    pub backend: BackendConfig,

    /// Language pair and the one active at startup
    pub languages: LanguageConfig,

    /// Voice configuration
    pub voice: VoiceConfig,

    /// API keys
    pub api_keys: ApiKeys,

    /// First bot turn in single-session mode
    pub greeting: String,
}

/// Backend connection configuration
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL without trailing slash
    pub url: String,

    /// Backend has no session API; questions go to `POST /ask`
    pub single_session: bool,

    /// Bound on session, ask and TTS calls
    pub request_timeout: Duration,

    /// Bound on upload and scrape calls
    pub ingest_timeout: Duration,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            url: "http://localhost:8000".to_string(),
            single_session: false,
            request_timeout: Duration::from_secs(30),
            ingest_timeout: Duration::from_secs(120),
        }
    }
}

/// A language code sent to the backend plus the locale used for speech
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LanguageProfile {
    /// ISO 639-1 code sent as `lang` (e.g. "en")
    pub code: String,

    /// Speech locale (e.g. "en-US")
    pub locale: String,
}

impl LanguageProfile {
    #[must_use]
    pub fn new(code: impl Into<String>, locale: impl Into<String>) -> Self {
        Self {
            code: code.into(),
            locale: locale.into(),
        }
    }
}

/// The two selectable languages
#[derive(Debug, Clone)]
pub struct LanguageConfig {
    pub primary: LanguageProfile,
    pub secondary: LanguageProfile,
    pub default: Language,
}

impl LanguageConfig {
    /// Resolve a language selection to its profile
    #[must_use]
    pub const fn profile(&self, language: Language) -> &LanguageProfile {
        match language {
            Language::Primary => &self.primary,
            Language::Secondary => &self.secondary,
        }
    }
}

impl Default for LanguageConfig {
    fn default() -> Self {
        Self {
            primary: LanguageProfile::new("en", "en-US"),
            secondary: LanguageProfile::new("hi", "hi-IN"),
            default: Language::Primary,
        }
    }
}

/// Voice processing configuration
#[derive(Debug, Clone)]
pub struct VoiceConfig {
    /// Enable microphone input and audio output
    pub enabled: bool,

    /// Synthesize and play each answer
    pub speak_answers: bool,

    /// STT backend for microphone input
    pub stt_provider: SttProviderKind,

    /// STT model (e.g. "whisper-1", "nova-2")
    pub stt_model: String,

    /// Upper bound on one listening attempt
    pub max_listen: Duration,
}

impl Default for VoiceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            speak_answers: true,
            stt_provider: SttProviderKind::Whisper,
            stt_model: "whisper-1".to_string(),
            max_listen: Duration::from_secs(15),
        }
    }
}

/// API keys for external services
#[derive(Debug, Clone, Default)]
pub struct ApiKeys {
    /// `OpenAI` API key (for Whisper)
    pub openai: Option<String>,

    /// `Deepgram` API key (optional STT)
    pub deepgram: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            backend: BackendConfig::default(),
            languages: LanguageConfig::default(),
            voice: VoiceConfig::default(),
            api_keys: ApiKeys::default(),
            greeting: DEFAULT_GREETING.to_string(),
        }
    }
}

impl Config {
    /// Load configuration from environment and the config file
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load() -> Result<Self> {
        Self::load_with_options(false)
    }

    /// Load configuration with explicit voice disable option
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn load_with_options(disable_voice: bool) -> Result<Self> {
        let fc = file::load_config_file();
        let config = Self::from_sources(fc, |key| std::env::var(key).ok())?;

        if disable_voice {
            tracing::info!("voice explicitly disabled via --disable-voice");
            return Ok(Self {
                voice: VoiceConfig {
                    enabled: false,
                    ..config.voice
                },
                ..config
            });
        }

        Ok(config)
    }

    /// Merge environment over file values over defaults
    ///
    /// # Errors
    ///
    /// Returns error if a configured value is invalid
    pub fn from_sources(fc: ConfigFile, env: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let defaults = Self::default();

        let url = env("RAGCHAT_BACKEND_URL")
            .or(fc.backend.url)
            .unwrap_or(defaults.backend.url);
        let url = url.trim_end_matches('/').to_string();
        if url::Url::parse(&url).is_err() {
            return Err(Error::Config(format!("invalid backend url: {url}")));
        }

        let backend = BackendConfig {
            url,
            single_session: env("RAGCHAT_SINGLE_SESSION")
                .map(|v| parse_bool(&v))
                .or(fc.backend.single_session)
                .unwrap_or(defaults.backend.single_session),
            request_timeout: env("RAGCHAT_REQUEST_TIMEOUT_SECS")
                .and_then(|s| s.parse().ok())
                .or(fc.backend.request_timeout_secs)
                .map_or(defaults.backend.request_timeout, Duration::from_secs),
            ingest_timeout: fc
                .backend
                .ingest_timeout_secs
                .map_or(defaults.backend.ingest_timeout, Duration::from_secs),
        };

        let lang = fc.language;
        let primary_code = lang.primary.unwrap_or(defaults.languages.primary.code);
        let secondary_code = lang.secondary.unwrap_or(defaults.languages.secondary.code);
        let languages = LanguageConfig {
            primary: LanguageProfile {
                locale: lang
                    .primary_locale
                    .unwrap_or_else(|| default_locale(&primary_code)),
                code: primary_code,
            },
            secondary: LanguageProfile {
                locale: lang
                    .secondary_locale
                    .unwrap_or_else(|| default_locale(&secondary_code)),
                code: secondary_code,
            },
            default: match env("RAGCHAT_LANGUAGE").or(lang.default) {
                Some(raw) => raw.parse()?,
                None => defaults.languages.default,
            },
        };

        let stt_provider = match fc.voice.stt_provider {
            Some(raw) => raw.parse()?,
            None => defaults.voice.stt_provider,
        };
        let voice = VoiceConfig {
            enabled: fc.voice.enabled.unwrap_or(defaults.voice.enabled),
            speak_answers: fc.voice.speak_answers.unwrap_or(defaults.voice.speak_answers),
            stt_model: env("RAGCHAT_STT_MODEL")
                .or(fc.voice.stt_model)
                .unwrap_or_else(|| stt_provider.default_model().to_string()),
            stt_provider,
            max_listen: fc
                .voice
                .max_listen_secs
                .map_or(defaults.voice.max_listen, Duration::from_secs),
        };

        let api_keys = ApiKeys {
            openai: env("OPENAI_API_KEY").or(fc.api_keys.openai),
            deepgram: env("DEEPGRAM_API_KEY").or(fc.api_keys.deepgram),
        };

        Ok(Self {
            backend,
            languages,
            voice,
            api_keys,
            greeting: fc.greeting.unwrap_or(defaults.greeting),
        })
    }

    /// API key for the configured STT provider
    #[must_use]
    pub fn stt_api_key(&self) -> Option<&str> {
        match self.voice.stt_provider {
            SttProviderKind::Whisper => self.api_keys.openai.as_deref(),
            SttProviderKind::Deepgram => self.api_keys.deepgram.as_deref(),
        }
    }
}

fn parse_bool(raw: &str) -> bool {
    matches!(raw.trim().to_lowercase().as_str(), "1" | "true" | "yes" | "on")
}

/// Best-effort locale for a bare language code
fn default_locale(code: &str) -> String {
    match code {
        "en" => "en-US".to_string(),
        "hi" => "hi-IN".to_string(),
        "ja" => "ja-JP".to_string(),
        "zh" => "zh-CN".to_string(),
        other if other.contains('-') => other.to_string(),
        other => format!("{other}-{}", other.to_uppercase()),
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;
    use crate::config::file::{BackendFileConfig, LanguageFileConfig};

    fn env_from(pairs: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| ((*k).to_string(), (*v).to_string()))
            .collect();
        move |key| map.get(key).cloned()
    }

    #[test]
    fn test_defaults() {
        let config = Config::from_sources(ConfigFile::default(), env_from(&[])).unwrap();

        assert_eq!(config.backend.url, "http://localhost:8000");
        assert!(!config.backend.single_session);
        assert_eq!(config.backend.request_timeout, Duration::from_secs(30));
        assert_eq!(config.languages.primary.code, "en");
        assert_eq!(config.languages.default, Language::Primary);
        assert_eq!(config.greeting, DEFAULT_GREETING);
    }

    #[test]
    fn test_env_overrides_file() {
        let fc = ConfigFile {
            backend: BackendFileConfig {
                url: Some("http://file.local:8000/".to_string()),
                single_session: Some(false),
                ..BackendFileConfig::default()
            },
            ..ConfigFile::default()
        };
        let env = env_from(&[
            ("RAGCHAT_BACKEND_URL", "http://env.local:9000/"),
            ("RAGCHAT_SINGLE_SESSION", "true"),
        ]);

        let config = Config::from_sources(fc, env).unwrap();
        assert_eq!(config.backend.url, "http://env.local:9000");
        assert!(config.backend.single_session);
    }

    #[test]
    fn test_language_locale_derivation() {
        let fc = ConfigFile {
            language: LanguageFileConfig {
                secondary: Some("fr".to_string()),
                default: Some("secondary".to_string()),
                ..LanguageFileConfig::default()
            },
            ..ConfigFile::default()
        };

        let config = Config::from_sources(fc, env_from(&[])).unwrap();
        assert_eq!(config.languages.secondary, LanguageProfile::new("fr", "fr-FR"));
        assert_eq!(config.languages.default, Language::Secondary);
        assert_eq!(config.languages.profile(Language::Primary).locale, "en-US");
    }

    #[test]
    fn test_invalid_backend_url_rejected() {
        let env = env_from(&[("RAGCHAT_BACKEND_URL", "not a url")]);
        let err = Config::from_sources(ConfigFile::default(), env).unwrap_err();
        assert!(matches!(err, Error::Config(_)));
    }

    #[test]
    fn test_stt_key_follows_provider() {
        let env = env_from(&[("OPENAI_API_KEY", "sk-test"), ("DEEPGRAM_API_KEY", "dg")]);
        let mut config = Config::from_sources(ConfigFile::default(), env).unwrap();
        assert_eq!(config.stt_api_key(), Some("sk-test"));

        config.voice.stt_provider = SttProviderKind::Deepgram;
        assert_eq!(config.stt_api_key(), Some("dg"));
    }
}
