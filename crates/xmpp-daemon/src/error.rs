//! Error types for xmpp-daemon.

use omemo_gateway::{DecryptionError, DeviceProblem, NegotiationError, SendError};
use thiserror::Error;

use crate::types::ErrorData;

/// Errors that can occur when talking to the sidecar daemon.
#[derive(Debug, Error)]
pub enum DaemonError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    /// JSON serialization/deserialization failed.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// JSON-RPC error response from daemon.
    #[error("RPC error {code}: {message}")]
    Rpc {
        code: i32,
        message: String,
        data: Option<ErrorData>,
    },

    /// Connection to daemon failed.
    #[error("Connection failed: {0}")]
    Connection(String),

    /// Daemon health check failed.
    #[error("Health check failed")]
    HealthCheckFailed,

    /// SSE stream error.
    #[error("SSE error: {0}")]
    Sse(String),

    /// Invalid configuration.
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl DaemonError {
    fn is_transport(&self) -> bool {
        match self {
            Self::Http(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            Self::Connection(_) | Self::HealthCheckFailed => true,
            Self::Rpc {
                data: Some(ErrorData::Timeout { .. }),
                ..
            } => true,
            _ => false,
        }
    }

    /// Map a failed `encrypt` or `trust` call onto the negotiation error the
    /// gateway understands.
    pub fn into_negotiation_error(self) -> NegotiationError {
        if self.is_transport() {
            return NegotiationError::Transport(self.to_string());
        }

        match self {
            Self::Rpc {
                data: Some(data),
                message,
                ..
            } => match data {
                ErrorData::Undecided {
                    jid,
                    device,
                    identity_key,
                } => NegotiationError::Undecided {
                    jid,
                    device,
                    identity_key: identity_key.unwrap_or_default(),
                },
                ErrorData::Untrusted { jid, device } => NegotiationError::Untrusted { jid, device },
                ErrorData::MissingBundle { jid, device } => {
                    NegotiationError::Exhausted(vec![DeviceProblem::MissingBundle { jid, device }])
                }
                ErrorData::Exhausted { problems } => NegotiationError::Exhausted(problems),
                _ => NegotiationError::Other(message),
            },
            other => NegotiationError::Other(other.to_string()),
        }
    }

    /// Map a failed `decrypt` call onto the decryption error the gateway
    /// understands.
    pub fn into_decryption_error(self) -> DecryptionError {
        match self {
            Self::Rpc {
                data: Some(data),
                message,
                ..
            } => match data {
                ErrorData::MissingOwnKey => DecryptionError::MissingOwnKey,
                ErrorData::NoAvailableSession => DecryptionError::NoAvailableSession,
                ErrorData::Undecided { jid, device, .. } => DecryptionError::Undecided { jid, device },
                ErrorData::Untrusted { jid, device } => DecryptionError::Untrusted { jid, device },
                ErrorData::Exhausted { .. } => DecryptionError::Exhausted(message),
                _ => DecryptionError::Other(message),
            },
            other => DecryptionError::Other(other.to_string()),
        }
    }

    /// Map a failed `send` call onto a transport error.
    pub fn into_send_error(self) -> SendError {
        SendError::Transport(self.to_string())
    }
}
