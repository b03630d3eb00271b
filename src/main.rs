use std::io::Write as _;
use std::process::ExitCode;
use std::sync::Arc;
use std::time::Duration;

use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing_subscriber::EnvFilter;

use ragchat::backend::{AskRoute, with_timeout};
use ragchat::commands::{self, Command};
use ragchat::voice::{
    AudioOutput, CpalOutput, MicrophoneRecognizer, NullOutput, SpeechRecognizer, SpeechToText,
};
use ragchat::{
    Backend, Config, ConversationSnapshot, HttpBackend, Language, NoticeLevel, Orchestrator,
    OrchestratorOptions, Sender,
};

/// Ragchat - chat with a retrieval-augmented QA backend from the terminal
#[derive(Parser)]
#[command(name = "ragchat", version, about)]
struct Cli {
    /// Increase verbosity (-v, -vv, -vvv)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Backend base URL (overrides config)
    #[arg(long)]
    backend_url: Option<String>,

    /// Backend has no session API; ask through `POST /ask`
    #[arg(long)]
    single_session: bool,

    /// Disable voice features (no microphone or speakers)
    #[arg(long, env = "RAGCHAT_DISABLE_VOICE")]
    disable_voice: bool,

    /// Language to start in: primary or secondary
    #[arg(long)]
    lang: Option<Language>,

    #[command(subcommand)]
    command: Option<CliCommand>,
}

#[derive(Subcommand)]
enum CliCommand {
    /// List sessions and exit
    Sessions,
    /// Synthesize text through the backend and play it
    Speak {
        /// Text to speak
        text: String,
    },
    /// Capture one utterance and print the transcript
    Listen,
    /// Interactive first-run setup
    Setup,
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    // Set up logging based on verbosity
    let filter = match cli.verbose {
        0 => "info,ragchat=info",
        1 => "info,ragchat=debug",
        2 => "debug",
        _ => "trace",
    };

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!("fatal: {e}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    if matches!(cli.command, Some(CliCommand::Setup)) {
        return ragchat::setup::run_setup();
    }

    let mut config = Config::load_with_options(cli.disable_voice)?;
    if let Some(url) = cli.backend_url {
        url::Url::parse(&url).map_err(|e| anyhow::anyhow!("invalid --backend-url: {e}"))?;
        config.backend.url = url.trim_end_matches('/').to_string();
    }
    if cli.single_session {
        config.backend.single_session = true;
    }
    if let Some(lang) = cli.lang {
        config.languages.default = lang;
    }
    tracing::debug!(?config, "loaded configuration");

    let backend = build_backend(&config)?;

    match cli.command {
        Some(CliCommand::Sessions) => list_sessions(&config, backend.as_ref()).await,
        Some(CliCommand::Speak { text }) => speak(&config, backend.as_ref(), &text).await,
        Some(CliCommand::Listen) => listen(&config).await,
        Some(CliCommand::Setup) => Ok(()),
        None => chat(config, backend).await,
    }
}

fn build_backend(config: &Config) -> anyhow::Result<Arc<HttpBackend>> {
    let client = reqwest::Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .user_agent(concat!("ragchat/", env!("CARGO_PKG_VERSION")))
        .build()?;

    let route = if config.backend.single_session {
        AskRoute::Shared
    } else {
        AskRoute::PerSession
    };

    tracing::info!(url = %config.backend.url, ?route, "using backend");
    Ok(Arc::new(HttpBackend::with_client(
        client,
        &config.backend.url,
        route,
    )))
}

/// Speaker output, or `None` when voice is off or no device exists
fn build_output(config: &Config) -> Option<Arc<dyn AudioOutput>> {
    if !config.voice.enabled {
        return None;
    }
    match CpalOutput::new() {
        Ok(output) => Some(Arc::new(output)),
        Err(e) => {
            tracing::warn!(error = %e, "audio output unavailable, answers will not be spoken");
            None
        }
    }
}

fn build_recognizer(config: &Config) -> ragchat::Result<Arc<dyn SpeechRecognizer>> {
    if !config.voice.enabled {
        return Err(ragchat::Error::Capability("voice is disabled".to_string()));
    }
    let key = config.stt_api_key().ok_or_else(|| {
        ragchat::Error::Capability(format!(
            "no API key configured for {:?} speech recognition",
            config.voice.stt_provider
        ))
    })?;

    let stt = SpeechToText::new(
        config.voice.stt_provider,
        key.to_string(),
        config.voice.stt_model.clone(),
    )?;
    Ok(Arc::new(MicrophoneRecognizer::new(
        stt,
        config.voice.max_listen,
    )?))
}

async fn list_sessions(config: &Config, backend: &dyn Backend) -> anyhow::Result<()> {
    let sessions = with_timeout(config.backend.request_timeout, backend.list_sessions()).await?;
    if sessions.is_empty() {
        println!("No sessions yet. Create one with `/new <name>` in the chat.");
    }
    for session in sessions {
        println!("{}\t{}", session.id, session.name);
    }
    Ok(())
}

async fn speak(config: &Config, backend: &dyn Backend, text: &str) -> anyhow::Result<()> {
    let lang = &config.languages.profile(config.languages.default).code;
    let audio = with_timeout(config.backend.request_timeout, backend.synthesize(text, lang)).await?;
    println!("Got {} bytes of audio", audio.len());

    let output = CpalOutput::new()?;
    let mut active = output.start(&audio)?;
    while !active.is_finished() {
        tokio::time::sleep(Duration::from_millis(100)).await;
    }
    active.stop();

    Ok(())
}

async fn listen(config: &Config) -> anyhow::Result<()> {
    let recognizer = build_recognizer(config)?;
    let profile = config.languages.profile(config.languages.default);

    println!("Listening ({})... speak now", profile.locale);
    match recognizer.recognize(profile, CancellationToken::new()).await? {
        Some(text) => println!("{text}"),
        None => println!("(no speech detected)"),
    }

    Ok(())
}

/// Interactive chat loop
async fn chat(config: Config, backend: Arc<HttpBackend>) -> anyhow::Result<()> {
    let mut options = OrchestratorOptions::from(&config);
    let output = build_output(&config);
    if output.is_none() {
        options.speak_answers = false;
    }
    let output = output.unwrap_or_else(|| Arc::new(NullOutput) as Arc<dyn AudioOutput>);

    let recognizer = match build_recognizer(&config) {
        Ok(r) => Some(r),
        Err(e) => {
            tracing::info!(reason = %e, "speech input unavailable");
            None
        }
    };

    let (mut orch, mut completions) = Orchestrator::new(backend, output, recognizer, options);
    let mut view = TranscriptView::default();

    println!("Connected to {}. Type /help for commands.", config.backend.url);
    if config.backend.single_session {
        orch.start_single_session(&config.greeting);
    } else {
        print_sessions(&orch.refresh_sessions().await);
    }
    view.render(&mut orch);

    let mut lines = BufReader::new(tokio::io::stdin()).lines();

    loop {
        tokio::select! {
            line = lines.next_line() => {
                let Some(line) = line? else { break };
                if !handle_line(&mut orch, &line, config.backend.single_session).await {
                    break;
                }
            }
            Some(completion) = completions.next() => orch.apply(completion),
            _ = tokio::signal::ctrl_c() => break,
        }
        view.render(&mut orch);
    }

    orch.stop_audio();
    orch.stop_listening();
    println!("Bye!");

    Ok(())
}

/// Execute one input line; returns false to quit
async fn handle_line(orch: &mut Orchestrator, line: &str, single_session: bool) -> bool {
    let Some(command) = commands::parse(line) else {
        // Blank line sends whatever speech put into the input
        orch.submit_input();
        return true;
    };

    match command {
        Command::Ask(text) => {
            if !orch.submit(&text) && orch.state().pending_request() {
                println!("(still waiting for the previous answer)");
            }
        }
        Command::Sessions => print_sessions(&orch.refresh_sessions().await),
        Command::New { name, seed } if !single_session => {
            if let Some(session) = orch.create_session(&name, seed.as_deref()).await {
                orch.select_session(session.id.as_str()).await;
            }
        }
        Command::Use(id) if !single_session => {
            orch.select_session(id.as_deref().unwrap_or_default()).await;
        }
        Command::New { .. } | Command::Use(_) => {
            println!("(the backend has a single shared conversation)");
        }
        Command::Upload(path) => orch.upload_file(path),
        Command::Scrape(url) => orch.scrape_url(&url),
        Command::Lang(language) => {
            let language = language.unwrap_or_else(|| orch.state().language().toggled());
            orch.set_language(language);
            println!("(language: {language})");
        }
        Command::Listen => orch.start_listening(),
        Command::Stop => {
            orch.stop_audio();
            orch.stop_listening();
        }
        Command::Mute => {
            let speak = !orch.speaks_answers();
            orch.set_speak_answers(speak);
            println!("(spoken answers {})", if speak { "on" } else { "off" });
        }
        Command::Help => println!("{}", commands::HELP),
        Command::Quit => return false,
        Command::Invalid(reason) => println!("(invalid command: {reason})"),
    }

    true
}

fn print_sessions(sessions: &[ragchat::Session]) {
    if sessions.is_empty() {
        println!("No sessions. Create one with /new <name>");
        return;
    }
    println!("Sessions:");
    for session in sessions {
        println!("  {}  {}", session.id, session.name);
    }
    println!("Switch with /use <id>");
}

/// Prints only what changed since the last render
#[derive(Default)]
struct TranscriptView {
    generation: u64,
    printed: usize,
    input: String,
    listening: bool,
}

impl TranscriptView {
    fn render(&mut self, orch: &mut Orchestrator) {
        let snapshot = orch.snapshot();
        self.render_turns(&snapshot);
        self.render_voice(&snapshot);

        for notice in orch.drain_notices() {
            match notice.level {
                NoticeLevel::Blocking => println!("! {}", notice.message),
                NoticeLevel::Transient => println!("- {}", notice.message),
            }
        }

        let _ = std::io::stdout().flush();
    }

    fn render_turns(&mut self, snapshot: &ConversationSnapshot) {
        if snapshot.turns_generation != self.generation {
            self.generation = snapshot.turns_generation;
            self.printed = 0;
            if let Some(id) = &snapshot.active_session {
                let name = snapshot
                    .sessions
                    .iter()
                    .find(|s| &s.id == id)
                    .map_or(id.as_str(), |s| s.name.as_str());
                println!("=== {name} ===");
            }
        }

        for turn in &snapshot.turns[self.printed..] {
            let who = match turn.sender {
                Sender::User => "you",
                Sender::Bot => "bot",
            };
            println!("{who}> {}", turn.text);
        }
        self.printed = snapshot.turns.len();
    }

    fn render_voice(&mut self, snapshot: &ConversationSnapshot) {
        if snapshot.listening && !self.listening {
            println!("(listening... speak now, /stop to cancel)");
        }
        self.listening = snapshot.listening;

        if snapshot.input != self.input {
            if !snapshot.input.is_empty() {
                println!("heard> {}  (press enter to send)", snapshot.input);
            }
            self.input.clone_from(&snapshot.input);
        }
    }
}
