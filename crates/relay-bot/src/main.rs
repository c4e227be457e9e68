//! relay-bot: answers end-to-end encrypted XMPP chats with a local text
//! generation server.
//!
//! Every flag falls back to a `RELAY_*` environment variable; a `.env` file
//! in the working directory is loaded first.
//!
//! ```bash
//! # talk to the bot on the console, no daemon needed
//! relay-bot --dry-run --persona config/defaults.json
//!
//! # relay through the sidecar daemon
//! RELAY_PASSWORD=... relay-bot --jid bot@example.org --daemon-url http://localhost:8090
//! ```

mod dry_run;

use std::error::Error;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clap::Parser;
use dialoguer::Password;
use futures::StreamExt;
use llm_backend::{Backend, BackendConfig, BackendMode, HttpBackend, DEFAULT_API_HOST};
use omemo_gateway::{EncryptionGateway, Omemo, StanzaSender};
use orchestrator::{
    drain_outbound, inbound_channel, parse_prefix, ChannelSender, CommandSynthesizer,
    Orchestrator, OrchestratorConfig, OutputMode, Worker, WorkerStats, DEFAULT_BOT_NAME,
    DEFAULT_PREFIX,
};
use relay_core::{PersonaConfig, SessionStore, DEFAULT_MAX_CHARS, DEFAULT_PERSONA_PATH};
use tracing::{error, info, warn};
use tracing_subscriber::EnvFilter;
use xmpp_daemon::{DaemonConfig, XmppClient, DEFAULT_DAEMON_URL};

use crate::dry_run::{LoopbackOmemo, StdoutSender};

const DAEMON_HEALTH_INTERVAL: Duration = Duration::from_secs(60);

#[derive(Debug, Parser)]
#[command(name = "relay-bot")]
#[command(about = "Relay OMEMO-encrypted XMPP chats to a local text generation server")]
struct Args {
    /// Account the bot signs in as
    #[arg(long, env = "RELAY_JID")]
    jid: Option<String>,

    /// Account password; prompted for when absent
    #[arg(long, env = "RELAY_PASSWORD", hide_env_values = true)]
    password: Option<String>,

    /// Multi-user chat room to join
    #[arg(long, env = "RELAY_ROOM")]
    room: Option<String>,

    /// Nickname in the room (defaults to the persona name)
    #[arg(long, env = "RELAY_NICK")]
    nick: Option<String>,

    /// Persona JSON profile
    #[arg(long, env = "RELAY_PERSONA", default_value = DEFAULT_PERSONA_PATH)]
    persona: PathBuf,

    /// Backend convention: completion (llama.cpp) or generate (KoboldCpp)
    #[arg(long, env = "RELAY_MODE", default_value = "completion", value_parser = parse_mode)]
    mode: BackendMode,

    /// Backend address
    #[arg(long, env = "RELAY_API_HOST", default_value = DEFAULT_API_HOST)]
    api_host: String,

    /// Sidecar daemon address
    #[arg(long, env = "RELAY_DAEMON_URL", default_value = DEFAULT_DAEMON_URL)]
    daemon_url: String,

    /// Daemon RPC timeout in seconds
    #[arg(long, env = "RELAY_DAEMON_TIMEOUT_SECS", default_value_t = 30)]
    daemon_timeout: u64,

    /// Command prefix character
    #[arg(long, env = "RELAY_PREFIX", default_value_t = DEFAULT_PREFIX, value_parser = parse_prefix_arg)]
    prefix: char,

    /// Bare address allowed to run admin commands (repeatable)
    #[arg(long, env = "RELAY_ADMINS", value_delimiter = ',')]
    admin: Vec<String>,

    /// Output mode: text, voice or both
    #[arg(long, env = "RELAY_OUTPUT", value_parser = parse_output)]
    output: Option<OutputMode>,

    /// Answer with text and a synthesized voice message
    #[arg(long, conflicts_with_all = ["text_only", "voice_only"])]
    tts: bool,

    /// Answer with text only
    #[arg(long, conflicts_with = "voice_only")]
    text_only: bool,

    /// Answer with a synthesized voice message only
    #[arg(long)]
    voice_only: bool,

    /// Program (and arguments) that turns reply segments into audio
    #[arg(long, env = "RELAY_SYNTH_COMMAND")]
    synth_command: Option<String>,

    /// Reference voice passed to the synthesizer (repeatable)
    #[arg(long, env = "RELAY_SPEAKERS", value_delimiter = ',')]
    speaker: Vec<String>,

    /// Longest text segment sent to the synthesizer
    #[arg(long, env = "RELAY_CHUNK_CHARS", default_value_t = DEFAULT_MAX_CHARS)]
    chunk_chars: usize,

    /// Seconds an admin shell command may run before it is killed
    #[arg(long, env = "RELAY_SHELL_TIMEOUT_SECS", default_value_t = 30)]
    shell_timeout: u64,

    /// Keep at most this many conversations, dropping the least recent
    #[arg(long, env = "RELAY_MAX_SESSIONS")]
    max_sessions: Option<usize>,

    /// Read messages from stdin and print replies instead of using the daemon
    #[arg(long)]
    dry_run: bool,

    /// Echo every message back instead of calling the backend
    #[arg(long, env = "RELAY_ECHO")]
    echo: bool,

    /// Echo unencrypted messages back in plain text
    #[arg(long, env = "RELAY_ECHO_UNENCRYPTED")]
    echo_unencrypted: bool,

    /// Only log warnings and errors
    #[arg(short, long, conflicts_with = "debug")]
    quiet: bool,

    /// Log debug output
    #[arg(short, long)]
    debug: bool,
}

impl Args {
    /// Output mode from the shortcut flags, then `--output`.
    fn output_mode(&self) -> OutputMode {
        if self.tts {
            OutputMode::Both
        } else if self.voice_only {
            OutputMode::Voice
        } else if self.text_only {
            OutputMode::Text
        } else {
            self.output.unwrap_or_default()
        }
    }

    fn orchestrator_config(&self) -> OrchestratorConfig {
        let jid = self.jid.as_deref().unwrap_or(DEFAULT_BOT_NAME);

        let mut config = OrchestratorConfig::new(jid)
            .with_prefix(self.prefix)
            .with_output(self.output_mode())
            .with_echo(self.echo)
            .with_echo_unencrypted(self.echo_unencrypted)
            .with_max_chunk_chars(self.chunk_chars)
            .with_shell_timeout(Duration::from_secs(self.shell_timeout));
        for admin in self.admin.iter().filter(|a| !a.trim().is_empty()) {
            config = config.with_admin(admin.trim());
        }
        for speaker in self.speaker.iter().filter(|s| !s.trim().is_empty()) {
            config = config.with_speaker(speaker.trim());
        }
        config
    }

    fn log_filter(&self) -> EnvFilter {
        if self.quiet {
            EnvFilter::new("warn")
        } else if self.debug {
            EnvFilter::new("debug")
        } else {
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
        }
    }
}

fn parse_mode(value: &str) -> Result<BackendMode, String> {
    value.parse().map_err(|e: relay_core::ConfigError| e.to_string())
}

fn parse_output(value: &str) -> Result<OutputMode, String> {
    value.parse().map_err(|e: orchestrator::OrchestratorError| e.to_string())
}

fn parse_prefix_arg(value: &str) -> Result<char, String> {
    parse_prefix(value).map_err(|e| e.to_string())
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to listen for Ctrl-C: {}", e);
        std::future::pending::<()>().await;
    }
}

async fn prompt_password(jid: &str) -> Result<String, Box<dyn Error>> {
    let prompt = format!("Password for {}", jid);
    let password = tokio::task::spawn_blocking(move || Password::new().with_prompt(prompt).interact())
        .await??;
    Ok(password)
}

/// Everything the pipeline needs apart from the encryption side.
struct Parts {
    config: OrchestratorConfig,
    sessions: Arc<SessionStore>,
    backend: Arc<dyn Backend>,
    synthesizer: Option<CommandSynthesizer>,
}

impl Parts {
    fn orchestrator(self, gateway: EncryptionGateway) -> Orchestrator {
        let orchestrator = Orchestrator::new(self.config, self.sessions, self.backend, gateway);
        match self.synthesizer {
            Some(synthesizer) => orchestrator.with_synthesizer(Arc::new(synthesizer)),
            None => orchestrator,
        }
    }
}

/// Run the worker until input ends or Ctrl-C, then flush the outbound queue.
async fn run_pipeline(
    parts: Parts,
    omemo: Arc<dyn Omemo>,
    transport: Arc<dyn StanzaSender>,
    inbound: tokio::sync::mpsc::UnboundedReceiver<relay_core::InboundStanza>,
) -> Result<WorkerStats, Box<dyn Error>> {
    let (sender, outbound) = ChannelSender::channel();
    let gateway = EncryptionGateway::new(omemo, Arc::new(sender));
    let orchestrator = Arc::new(parts.orchestrator(gateway));

    let drain = tokio::spawn(drain_outbound(outbound, transport));

    let stats = Worker::new(orchestrator, inbound)
        .run_with_shutdown(shutdown_signal())
        .await;

    // The worker owned the last queue sender, so the drain finishes.
    let delivered = drain.await?;
    info!(
        "Stopped: {} received, {} replied, {} failed, {} stanza(s) sent",
        stats.received, stats.replied, stats.failed, delivered
    );
    Ok(stats)
}

async fn run_dry_run(parts: Parts) -> Result<(), Box<dyn Error>> {
    let (tx, rx) = inbound_channel();
    let feeder = tokio::spawn(dry_run::feed_stdin(tx));

    run_pipeline(parts, Arc::new(LoopbackOmemo), Arc::new(StdoutSender), rx).await?;

    if feeder.is_finished() {
        let queued = feeder.await??;
        info!("Read {} message(s) from stdin", queued);
    } else {
        feeder.abort();
    }
    Ok(())
}

async fn run_daemon(args: &Args, parts: Parts) -> Result<(), Box<dyn Error>> {
    let jid = args
        .jid
        .clone()
        .ok_or("--jid (or RELAY_JID) is required unless --dry-run is given")?;

    let daemon_config = DaemonConfig::with_account(&args.daemon_url, &jid)
        .with_request_timeout(Duration::from_secs(args.daemon_timeout));
    let client = Arc::new(XmppClient::connect(daemon_config).await?);

    let password = match &args.password {
        Some(password) => password.clone(),
        None => prompt_password(&jid).await?,
    };
    client.login(&password).await?;

    if let Some(room) = &args.room {
        let nick = args
            .nick
            .clone()
            .unwrap_or_else(|| parts.sessions.persona().name.clone());
        client.join_room(room, &nick).await?;
        info!("Group chat messages in {} are not answered", room);
    }

    let mut stanzas = xmpp_daemon::subscribe(&client)?;
    let (tx, rx) = inbound_channel();
    let listener = tokio::spawn(async move {
        while let Some(item) = stanzas.next().await {
            match item {
                Ok(stanza) => {
                    if tx.send(stanza).is_err() {
                        break;
                    }
                }
                Err(e) => warn!("Event stream error: {}", e),
            }
        }
        info!("Event stream closed");
    });

    let monitor = client.start_health_monitor(DAEMON_HEALTH_INTERVAL);

    let result = run_pipeline(parts, client.clone(), client, rx).await;
    listener.abort();
    monitor.abort();
    result.map(|_| ())
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn Error>> {
    dotenvy::dotenv().ok();
    let args = Args::parse();

    tracing_subscriber::fmt().with_env_filter(args.log_filter()).init();

    let persona = PersonaConfig::load(&args.persona)?;
    info!(
        "Loaded persona {} ({}) from {}, seed fingerprint {}",
        persona.name,
        persona.format,
        args.persona.display(),
        persona.fingerprint()
    );

    let backend = HttpBackend::new(
        BackendConfig::builder()
            .api_host(args.api_host.as_str())
            .mode(args.mode)
            .build(),
    )?;

    if args.echo {
        info!("Echo mode: the backend is not used");
    } else if !backend.health_check().await {
        return Err(format!("Backend at {} is not responding", args.api_host).into());
    }

    let sessions = Arc::new(match args.max_sessions {
        Some(limit) => SessionStore::with_capacity_limit(persona, limit),
        None => SessionStore::new(persona),
    });

    let config = args.orchestrator_config();
    let synthesizer = args
        .synth_command
        .as_deref()
        .and_then(CommandSynthesizer::from_command_line);
    if config.output.wants_voice() && synthesizer.is_none() {
        warn!("Output mode {} needs --synth-command; answering with text", config.output);
    }
    info!(
        "Output {}, prefix {:?}, {} admin(s)",
        config.output,
        config.prefix,
        config.admins.len()
    );

    let parts = Parts {
        config,
        sessions,
        backend: Arc::new(backend),
        synthesizer,
    };

    if args.dry_run {
        run_dry_run(parts).await
    } else {
        run_daemon(&args, parts).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(argv: &[&str]) -> Args {
        let mut full = vec!["relay-bot"];
        full.extend_from_slice(argv);
        Args::try_parse_from(full).unwrap()
    }

    #[test]
    fn test_defaults() {
        let args = parse(&["--dry-run"]);
        assert_eq!(args.persona, PathBuf::from(DEFAULT_PERSONA_PATH));
        assert_eq!(args.mode, BackendMode::Completion);
        assert_eq!(args.prefix, DEFAULT_PREFIX);
        assert_eq!(args.output_mode(), OutputMode::Text);

        let config = args.orchestrator_config();
        assert_eq!(config.bot_jid, DEFAULT_BOT_NAME);
        assert!(config.admins.is_empty());
        assert_eq!(config.shell_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_output_shortcuts() {
        assert_eq!(parse(&["--tts"]).output_mode(), OutputMode::Both);
        assert_eq!(parse(&["--voice-only"]).output_mode(), OutputMode::Voice);
        assert_eq!(
            parse(&["--output", "voice", "--text-only"]).output_mode(),
            OutputMode::Text
        );
        assert_eq!(parse(&["--output", "both"]).output_mode(), OutputMode::Both);
    }

    #[test]
    fn test_conflicting_flags_rejected() {
        assert!(Args::try_parse_from(["relay-bot", "--tts", "--voice-only"]).is_err());
        assert!(Args::try_parse_from(["relay-bot", "-q", "-d"]).is_err());
        assert!(Args::try_parse_from(["relay-bot", "--mode", "chat"]).is_err());
        assert!(Args::try_parse_from(["relay-bot", "--prefix", "ab"]).is_err());
    }

    #[test]
    fn test_repeated_and_delimited_lists() {
        let args = parse(&[
            "--jid",
            "bot@example.org",
            "--admin",
            "alice@example.org,bob@example.org",
            "--admin",
            "carol@example.org",
            "--speaker",
            "voices/aria.wav",
            "--prefix",
            "#",
            "--mode",
            "generate",
            "--shell-timeout",
            "5",
        ]);
        let config = args.orchestrator_config();

        assert_eq!(config.bot_jid, "bot@example.org");
        assert_eq!(config.prefix, '#');
        assert!(config.is_admin("bob@example.org"));
        assert!(config.is_admin("Carol@Example.org"));
        assert_eq!(config.shell_timeout, Duration::from_secs(5));
        assert_eq!(config.speakers, vec!["voices/aria.wav"]);
        assert_eq!(args.mode, BackendMode::Generate);
    }
}
