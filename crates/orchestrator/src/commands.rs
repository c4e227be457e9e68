//! Prefix commands.
//!
//! A message is a command when it starts with the prefix. The prefix must be
//! followed directly by a word (`[A-Za-z0-9_]+`), optionally followed by
//! whitespace and arguments. Words with no table entry are dropped without
//! a reply, as is a prefix with no word after it.

use std::sync::Arc;
use std::time::Duration;

use rand::Rng;
use relay_core::{Jid, SessionStore};
use tokio::process::Command as Process;
use tracing::{debug, info, warn};

use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;

/// Reply to a successful context reset.
pub const CONTEXT_CLEARED: &str = "NOTICE: CONTEXT WINDOW CLEARED SUCCESSFULLY.";

/// Entries of the command table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Command {
    /// `help`: usage text.
    Help,
    /// `rtd`: roll a six-sided die.
    RollTheDice,
    /// `resetcontext` / `rc`: start the conversation over.
    ResetContext,
    /// `shell`: run a shell command, admins only.
    Shell,
}

impl Command {
    /// Look up a command word. Case-sensitive.
    pub fn lookup(name: &str) -> Option<Self> {
        match name {
            "help" => Some(Self::Help),
            "rtd" => Some(Self::RollTheDice),
            "resetcontext" | "rc" => Some(Self::ResetContext),
            "shell" => Some(Self::Shell),
            _ => None,
        }
    }
}

/// A recognised command and its raw argument text.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandInvocation {
    pub command: Command,
    /// The word as typed (`rc` and `resetcontext` both map to one command).
    pub name: String,
    /// Everything after the word and the whitespace following it.
    pub raw_args: Option<String>,
}

/// How a decrypted message body is treated.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ParsedInput {
    /// Not a command; goes to the backend.
    Conversation,
    /// A command from the table.
    Command(CommandInvocation),
    /// Starts with the prefix but names no command; dropped.
    Unknown(String),
}

/// Parses and runs prefix commands.
#[derive(Debug, Clone)]
pub struct CommandDispatcher {
    config: Arc<OrchestratorConfig>,
    sessions: Arc<SessionStore>,
}

impl CommandDispatcher {
    /// Create a dispatcher over the shared session store.
    pub fn new(config: Arc<OrchestratorConfig>, sessions: Arc<SessionStore>) -> Self {
        Self { config, sessions }
    }

    /// Classify a message body.
    pub fn parse(&self, text: &str) -> ParsedInput {
        let Some(rest) = text.strip_prefix(self.config.prefix) else {
            return ParsedInput::Conversation;
        };

        let word_end = rest
            .find(|c: char| !(c.is_ascii_alphanumeric() || c == '_'))
            .unwrap_or(rest.len());
        let (name, tail) = rest.split_at(word_end);

        let Some(command) = Command::lookup(name) else {
            return ParsedInput::Unknown(name.to_string());
        };

        let raw_args = if tail.starts_with(char::is_whitespace) {
            Some(tail.trim_start().to_string()).filter(|args| !args.is_empty())
        } else {
            None
        };

        ParsedInput::Command(CommandInvocation {
            command,
            name: name.to_string(),
            raw_args,
        })
    }

    /// Run a command for `sender` and return the reply, if any.
    pub async fn dispatch(
        &self,
        sender: &Jid,
        invocation: &CommandInvocation,
    ) -> Result<Option<String>, OrchestratorError> {
        debug!("Command {} from {}", invocation.name, sender);

        match invocation.command {
            Command::Help => Ok(Some(self.help_text())),
            Command::RollTheDice => Ok(Some(roll_the_dice())),
            Command::ResetContext => {
                self.sessions.reset(&sender.bare()).await;
                info!("Cleared context for {}", sender.bare());
                Ok(Some(CONTEXT_CLEARED.to_string()))
            }
            Command::Shell => {
                let bare = sender.bare();
                if !self.config.is_admin(&bare) {
                    warn!("Refusing shell command from non-admin {}", bare);
                    return Ok(None);
                }
                match invocation.raw_args.as_deref() {
                    Some(script) => run_shell(script, self.config.shell_timeout).await.map(Some),
                    None => Ok(Some(format!("Usage: {}shell <command>", self.config.prefix))),
                }
            }
        }
    }

    /// Usage text naming the relay's account.
    pub fn help_text(&self) -> String {
        let p = self.config.prefix;
        format!(
            "Hello my name is {}\n\
             The following commands are available:\n\
             {p}rc Clear your current conversation with the chatbot\n\
             {p}rtd roll dice to decide a random number\n",
            self.config.bot_jid
        )
    }
}

/// Roll a fair six-sided die.
pub fn roll_the_dice() -> String {
    let n: u8 = rand::thread_rng().gen_range(1..=6);
    format!("Dice Roll Result: {}", n)
}

/// Run `script` with `sh -c` and return stdout followed by stderr.
///
/// The child is killed once `limit` passes and the reply says so.
async fn run_shell(script: &str, limit: Duration) -> Result<String, OrchestratorError> {
    info!("Running shell command: {}", script);

    let mut command = Process::new("sh");
    command.arg("-c").arg(script).kill_on_drop(true);

    let output = match tokio::time::timeout(limit, command.output()).await {
        Ok(output) => output.map_err(|e| OrchestratorError::Shell(e.to_string()))?,
        Err(_) => {
            warn!("Shell command timed out after {:?}: {}", limit, script);
            return Ok(format!("Command timed out after {}s", limit.as_secs_f32()));
        }
    };

    let mut combined = String::from_utf8_lossy(&output.stdout).into_owned();
    combined.push_str(&String::from_utf8_lossy(&output.stderr));

    if combined.trim().is_empty() {
        return Ok(format!("Command exited with {}", output.status));
    }
    Ok(combined)
}
