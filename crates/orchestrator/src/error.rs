//! Error types for orchestrator operations.

use omemo_gateway::{GatewayError, SendError};
use relay_core::{BackendError, SynthesisError};
use thiserror::Error;

/// Errors that can occur while handling one inbound stanza.
///
/// Anticipated failures (undecryptable messages, aborted deliveries, backend
/// errors) are reported to the user and do not show up here; these are the
/// unanticipated ones the worker logs before moving on.
#[derive(Debug, Error)]
pub enum OrchestratorError {
    /// The encryption layer failed in a way it could not report away.
    #[error("encryption gateway error: {0}")]
    Gateway(#[from] GatewayError),

    /// The transport refused a stanza.
    #[error("send failed: {0}")]
    Send(#[from] SendError),

    /// The backend failed.
    #[error("backend error: {0}")]
    Backend(#[from] BackendError),

    /// Speech synthesis failed.
    #[error("synthesis failed: {0}")]
    Synthesis(#[from] SynthesisError),

    /// A shell command could not be run.
    #[error("shell command failed: {0}")]
    Shell(String),

    /// A configuration value is unusable.
    #[error("invalid configuration: {0}")]
    Config(String),
}
