//! Configuration for the relay pipeline.

use std::env;
use std::fmt;
use std::str::FromStr;
use std::time::Duration;

use relay_core::{Jid, DEFAULT_MAX_CHARS};

use crate::error::OrchestratorError;

/// Default command prefix.
pub const DEFAULT_PREFIX: char = '!';

/// How long an admin shell command may run before it is killed.
pub const DEFAULT_SHELL_TIMEOUT: Duration = Duration::from_secs(30);

/// Name used in the help text when no account is configured.
pub const DEFAULT_BOT_NAME: &str = "relay-bot";

/// Which representations of a reply are delivered.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OutputMode {
    /// The reply text only.
    #[default]
    Text,
    /// A link to the synthesized audio only.
    Voice,
    /// The reply text followed by the audio link.
    Both,
}

impl OutputMode {
    /// Whether the reply text is delivered.
    pub fn wants_text(self) -> bool {
        matches!(self, Self::Text | Self::Both)
    }

    /// Whether the reply is synthesized.
    pub fn wants_voice(self) -> bool {
        matches!(self, Self::Voice | Self::Both)
    }
}

impl fmt::Display for OutputMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Self::Text => "text",
            Self::Voice => "voice",
            Self::Both => "both",
        })
    }
}

impl FromStr for OutputMode {
    type Err = OrchestratorError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "text" => Ok(Self::Text),
            "voice" => Ok(Self::Voice),
            "both" | "text+voice" => Ok(Self::Both),
            other => Err(OrchestratorError::Config(format!(
                "unknown output mode {:?} (expected text, voice or both)",
                other
            ))),
        }
    }
}

/// Configuration for the [`Orchestrator`](crate::Orchestrator).
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// The relay's own account, named in the help text.
    pub bot_jid: String,

    /// Single character that starts a command.
    pub prefix: char,

    /// Bare addresses allowed to run `shell`.
    pub admins: Vec<String>,

    /// Limit on one `shell` command.
    pub shell_timeout: Duration,

    /// Which representations of a reply are delivered.
    pub output: OutputMode,

    /// Reply with the input instead of calling the backend.
    pub echo: bool,

    /// Echo unencrypted messages back in plain text instead of dropping them.
    pub echo_unencrypted: bool,

    /// Character cap for one synthesis segment.
    pub max_chunk_chars: usize,

    /// Reference voices passed to the synthesizer.
    pub speakers: Vec<String>,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            bot_jid: DEFAULT_BOT_NAME.to_string(),
            prefix: DEFAULT_PREFIX,
            admins: Vec::new(),
            shell_timeout: DEFAULT_SHELL_TIMEOUT,
            output: OutputMode::Text,
            echo: false,
            echo_unencrypted: false,
            max_chunk_chars: DEFAULT_MAX_CHARS,
            speakers: Vec::new(),
        }
    }
}

impl OrchestratorConfig {
    /// Create a configuration for the given account.
    pub fn new(bot_jid: impl Into<String>) -> Self {
        Self {
            bot_jid: bot_jid.into(),
            ..Default::default()
        }
    }

    /// Use `prefix` to start commands.
    pub fn with_prefix(mut self, prefix: char) -> Self {
        self.prefix = prefix;
        self
    }

    /// Allow `jid` (bare form) to run `shell`.
    pub fn with_admin(mut self, jid: impl AsRef<str>) -> Self {
        self.admins.push(normalize_address(jid.as_ref()));
        self
    }

    /// Kill `shell` commands that run longer than `timeout`.
    pub fn with_shell_timeout(mut self, timeout: Duration) -> Self {
        self.shell_timeout = timeout;
        self
    }

    /// Select which representations of a reply are delivered.
    pub fn with_output(mut self, output: OutputMode) -> Self {
        self.output = output;
        self
    }

    /// Enable or disable echo mode.
    pub fn with_echo(mut self, echo: bool) -> Self {
        self.echo = echo;
        self
    }

    /// Enable or disable echoing unencrypted messages.
    pub fn with_echo_unencrypted(mut self, echo_unencrypted: bool) -> Self {
        self.echo_unencrypted = echo_unencrypted;
        self
    }

    /// Set the synthesis segment cap.
    pub fn with_max_chunk_chars(mut self, max_chunk_chars: usize) -> Self {
        self.max_chunk_chars = max_chunk_chars;
        self
    }

    /// Add a reference voice for synthesis.
    pub fn with_speaker(mut self, speaker: impl Into<String>) -> Self {
        self.speakers.push(speaker.into());
        self
    }

    /// Whether `bare_jid` may run `shell`. The whole address must match,
    /// ignoring case in the local part and domain.
    pub fn is_admin(&self, bare_jid: &str) -> bool {
        let candidate = normalize_address(bare_jid);
        self.admins.iter().any(|admin| *admin == candidate)
    }

    /// Create configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `RELAY_JID` - The relay's account, shown in the help text
    /// - `RELAY_PREFIX` - Command prefix, one character (default: !)
    /// - `RELAY_ADMINS` - Comma-separated bare addresses allowed to run shell
    /// - `RELAY_SHELL_TIMEOUT_SECS` - Limit on one shell command (default: 30)
    /// - `RELAY_OUTPUT` - text, voice or both (default: text)
    /// - `RELAY_ECHO` - Echo mode (default: false)
    /// - `RELAY_ECHO_UNENCRYPTED` - Echo unencrypted messages (default: false)
    /// - `RELAY_CHUNK_CHARS` - Synthesis segment cap (default: 250)
    /// - `RELAY_SPEAKERS` - Comma-separated reference voice files
    pub fn from_env() -> Result<Self, OrchestratorError> {
        let mut config = Self::default();

        if let Ok(jid) = env::var("RELAY_JID") {
            if !jid.trim().is_empty() {
                config.bot_jid = jid.trim().to_string();
            }
        }

        if let Ok(prefix) = env::var("RELAY_PREFIX") {
            config.prefix = parse_prefix(&prefix)?;
        }

        if let Ok(admins) = env::var("RELAY_ADMINS") {
            config.admins = split_list(&admins)
                .iter()
                .map(|admin| normalize_address(admin))
                .collect();
        }

        if let Ok(secs) = env::var("RELAY_SHELL_TIMEOUT_SECS") {
            let secs: u64 = secs.trim().parse().map_err(|_| {
                OrchestratorError::Config(format!(
                    "RELAY_SHELL_TIMEOUT_SECS is not a number: {}",
                    secs
                ))
            })?;
            config.shell_timeout = Duration::from_secs(secs);
        }

        if let Ok(output) = env::var("RELAY_OUTPUT") {
            config.output = output.parse()?;
        }

        config.echo = env_flag("RELAY_ECHO");
        config.echo_unencrypted = env_flag("RELAY_ECHO_UNENCRYPTED");

        if let Ok(chars) = env::var("RELAY_CHUNK_CHARS") {
            config.max_chunk_chars = chars.trim().parse().map_err(|_| {
                OrchestratorError::Config(format!("RELAY_CHUNK_CHARS is not a number: {}", chars))
            })?;
        }

        if let Ok(speakers) = env::var("RELAY_SPEAKERS") {
            config.speakers = split_list(&speakers);
        }

        Ok(config)
    }
}

/// Canonical form of an address as written in configuration. Entries that
/// do not parse are kept trimmed so they simply never match.
fn normalize_address(value: &str) -> String {
    Jid::parse(value)
        .map(|jid| jid.to_string())
        .unwrap_or_else(|_| value.trim().to_string())
}

/// Parse a command prefix: exactly one non-whitespace character.
pub fn parse_prefix(value: &str) -> Result<char, OrchestratorError> {
    let mut chars = value.chars();
    match (chars.next(), chars.next()) {
        (Some(c), None) if !c.is_whitespace() && !c.is_alphanumeric() => Ok(c),
        _ => Err(OrchestratorError::Config(format!(
            "command prefix must be a single symbol, got {:?}",
            value
        ))),
    }
}

fn split_list(value: &str) -> Vec<String> {
    value
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
        .collect()
}

fn env_flag(name: &str) -> bool {
    env::var(name)
        .ok()
        .map(|v| v.to_lowercase() == "true" || v == "1")
        .unwrap_or(false)
}
