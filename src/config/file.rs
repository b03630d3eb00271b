//! TOML configuration file loading
//!
//! Supports `~/.config/ragchat/config.toml` as a persistent config source.
//! All fields are optional; the file is a partial overlay on top of defaults.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

/// Top-level TOML configuration file schema
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ConfigFile {
    /// First bot turn shown in single-session mode
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub greeting: Option<String>,

    /// Backend connection
    #[serde(default)]
    pub backend: BackendFileConfig,

    /// Language pair
    #[serde(default)]
    pub language: LanguageFileConfig,

    /// Voice input/output
    #[serde(default)]
    pub voice: VoiceFileConfig,

    /// API keys for speech-to-text providers
    #[serde(default)]
    pub api_keys: ApiKeysFileConfig,
}

/// Backend connection settings
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct BackendFileConfig {
    /// Base URL (e.g. "http://localhost:8000")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Talk to a backend without session support (`POST /ask`)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub single_session: Option<bool>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_timeout_secs: Option<u64>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub ingest_timeout_secs: Option<u64>,
}

/// Language pair settings
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct LanguageFileConfig {
    /// Primary language code (e.g. "en")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary: Option<String>,

    /// Primary speech locale (e.g. "en-US")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub primary_locale: Option<String>,

    /// Secondary language code (e.g. "hi")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary: Option<String>,

    /// Secondary speech locale (e.g. "hi-IN")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secondary_locale: Option<String>,

    /// "primary" or "secondary"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default: Option<String>,
}

/// Voice processing configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct VoiceFileConfig {
    /// Enable microphone input and spoken answers
    #[serde(skip_serializing_if = "Option::is_none")]
    pub enabled: Option<bool>,

    /// Play synthesized speech after each answer
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speak_answers: Option<bool>,

    /// "whisper" or "deepgram"
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stt_provider: Option<String>,

    /// STT model (e.g. "whisper-1")
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stt_model: Option<String>,

    /// Upper bound on a single listening attempt
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_listen_secs: Option<u64>,
}

/// API keys configuration
#[derive(Debug, Default, Serialize, Deserialize)]
pub struct ApiKeysFileConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub openai: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub deepgram: Option<String>,
}

/// Load the TOML config file from the standard path
///
/// Returns `ConfigFile::default()` if the file doesn't exist or can't be parsed.
pub fn load_config_file() -> ConfigFile {
    config_file_path().map_or_else(ConfigFile::default, |path| load_from(&path))
}

/// Load a config file from an explicit path, falling back to defaults
pub fn load_from(path: &Path) -> ConfigFile {
    if !path.exists() {
        return ConfigFile::default();
    }

    match std::fs::read_to_string(path) {
        Ok(content) => match toml::from_str(&content) {
            Ok(config) => {
                tracing::info!(path = %path.display(), "loaded config file");
                config
            }
            Err(e) => {
                tracing::warn!(
                    path = %path.display(),
                    error = %e,
                    "failed to parse config file, using defaults"
                );
                ConfigFile::default()
            }
        },
        Err(e) => {
            tracing::warn!(
                path = %path.display(),
                error = %e,
                "failed to read config file"
            );
            ConfigFile::default()
        }
    }
}

/// Return the config file path: `~/.config/ragchat/config.toml`
pub fn config_file_path() -> Option<PathBuf> {
    directories::BaseDirs::new().map(|d| d.config_dir().join("ragchat").join("config.toml"))
}
