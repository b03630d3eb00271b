//! Interactive first-run setup wizard (`ragchat setup`)

use std::path::{Path, PathBuf};

use dialoguer::{Confirm, Input, Select};

use crate::config::file::{
    ApiKeysFileConfig, BackendFileConfig, ConfigFile, LanguageFileConfig, VoiceFileConfig,
};
use crate::config::{BackendConfig, LanguageConfig};
use crate::voice::SttProviderKind;

/// Run the interactive setup wizard
///
/// # Errors
///
/// Returns error if user input fails or config cannot be written
pub fn run_setup() -> anyhow::Result<()> {
    println!("Ragchat Setup\n");

    // Load existing config if present
    let existing = crate::config::file::load_config_file();
    let config_path = crate::config::file::config_file_path()
        .unwrap_or_else(|| PathBuf::from("~/.config/ragchat/config.toml"));

    if config_path.exists() {
        println!("Existing config found at {}\n", config_path.display());
    }

    // 1. Backend
    let default_url = existing
        .backend
        .url
        .clone()
        .unwrap_or_else(|| BackendConfig::default().url);
    let url: String = Input::new()
        .with_prompt("Backend URL")
        .default(default_url)
        .validate_with(|input: &String| -> Result<(), String> {
            url::Url::parse(input)
                .map(|_| ())
                .map_err(|e| format!("invalid URL: {e}"))
        })
        .interact_text()?;

    let single_session = Confirm::new()
        .with_prompt("Does the backend use a single shared conversation (no sessions)?")
        .default(existing.backend.single_session.unwrap_or(false))
        .interact()?;

    // 2. Languages
    let defaults = LanguageConfig::default();
    let primary: String = Input::new()
        .with_prompt("Primary language code")
        .default(
            existing
                .language
                .primary
                .clone()
                .unwrap_or(defaults.primary.code),
        )
        .interact_text()?;
    let secondary: String = Input::new()
        .with_prompt("Secondary language code")
        .default(
            existing
                .language
                .secondary
                .clone()
                .unwrap_or(defaults.secondary.code),
        )
        .interact_text()?;

    let language_labels = [primary.as_str(), secondary.as_str()];
    let default_language = match existing.language.default.as_deref() {
        Some("secondary" | "2") => 1,
        _ => 0,
    };
    let language_idx = Select::new()
        .with_prompt("Language to start in")
        .items(&language_labels)
        .default(default_language)
        .interact()?;

    let language = LanguageFileConfig {
        default: Some(if language_idx == 0 { "primary" } else { "secondary" }.to_string()),
        primary_locale: existing.language.primary_locale.filter(|_| {
            existing.language.primary.as_deref() == Some(primary.as_str())
        }),
        secondary_locale: existing.language.secondary_locale.filter(|_| {
            existing.language.secondary.as_deref() == Some(secondary.as_str())
        }),
        primary: Some(primary),
        secondary: Some(secondary),
    };

    // 3. Voice (optional)
    let mut api_keys = existing.api_keys;
    let enable_voice = Confirm::new()
        .with_prompt("Enable voice (spoken answers and microphone input)?")
        .default(existing.voice.enabled.unwrap_or(true))
        .interact()?;

    let voice = if enable_voice {
        let providers = ["Whisper (OpenAI)", "Deepgram"];
        let default_provider = match existing.voice.stt_provider.as_deref() {
            Some("deepgram") => 1,
            _ => 0,
        };
        let provider_idx = Select::new()
            .with_prompt("Speech-to-text provider")
            .items(&providers)
            .default(default_provider)
            .interact()?;
        let provider = if provider_idx == 0 {
            SttProviderKind::Whisper
        } else {
            SttProviderKind::Deepgram
        };

        let (name, env_hint, slot) = match provider {
            SttProviderKind::Whisper => ("OpenAI", "OPENAI_API_KEY", &mut api_keys.openai),
            SttProviderKind::Deepgram => ("Deepgram", "DEEPGRAM_API_KEY", &mut api_keys.deepgram),
        };
        prompt_api_key(name, env_hint, slot)?;

        let stt_model = existing
            .voice
            .stt_model
            .filter(|_| existing.voice.stt_provider.as_deref() == Some(provider_key(provider)))
            .unwrap_or_else(|| provider.default_model().to_string());

        VoiceFileConfig {
            enabled: Some(true),
            speak_answers: Some(existing.voice.speak_answers.unwrap_or(true)),
            stt_provider: Some(provider_key(provider).to_string()),
            stt_model: Some(stt_model),
            max_listen_secs: existing.voice.max_listen_secs,
        }
    } else {
        VoiceFileConfig {
            enabled: Some(false),
            ..VoiceFileConfig::default()
        }
    };

    // 4. Build and write config
    let config_file = ConfigFile {
        greeting: existing.greeting,
        backend: BackendFileConfig {
            url: Some(url),
            single_session: Some(single_session),
            request_timeout_secs: existing.backend.request_timeout_secs,
            ingest_timeout_secs: existing.backend.ingest_timeout_secs,
        },
        language,
        voice,
        api_keys,
    };

    write_config(&config_path, &config_file)?;
    println!("\nConfig written to {}", config_path.display());
    println!("\nSetup complete! Run `ragchat` to start chatting.");

    Ok(())
}

/// Ask for an API key, keeping the current one on blank input
fn prompt_api_key(name: &str, env_hint: &str, slot: &mut Option<String>) -> anyhow::Result<()> {
    let prompt = match slot.as_deref() {
        Some(current) => format!("{name} API key (current: {}, leave blank to keep)", mask(current)),
        None => format!("{name} API key ({env_hint}, leave blank to skip)"),
    };

    let input: String = Input::new()
        .with_prompt(&prompt)
        .allow_empty(true)
        .interact_text()?;

    if !input.trim().is_empty() {
        *slot = Some(input.trim().to_string());
    }

    Ok(())
}

fn mask(key: &str) -> String {
    if key.len() > 8 && key.is_ascii() {
        format!("{}...{}", &key[..4], &key[key.len() - 4..])
    } else {
        "****".to_string()
    }
}

const fn provider_key(provider: SttProviderKind) -> &'static str {
    match provider {
        SttProviderKind::Whisper => "whisper",
        SttProviderKind::Deepgram => "deepgram",
    }
}

/// Serialize and write the config file
fn write_config(path: &Path, config: &ConfigFile) -> anyhow::Result<()> {
    // Ensure parent directory exists
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }

    std::fs::write(path, render_config(config)?)?;

    Ok(())
}

fn render_config(config: &ConfigFile) -> anyhow::Result<String> {
    Ok(toml::to_string_pretty(config)?)
}
