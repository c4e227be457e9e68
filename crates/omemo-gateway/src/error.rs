//! Error types for omemo-gateway.

use std::fmt;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A problem with one recipient device, reported inside [`NegotiationError::Exhausted`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DeviceProblem {
    /// No key bundle could be fetched for the device.
    MissingBundle { jid: String, device: u32 },
    /// The device's identity key is explicitly distrusted.
    Untrusted { jid: String, device: u32 },
    /// Anything else the collaborator could not resolve.
    Other {
        #[serde(default)]
        jid: Option<String>,
        #[serde(default)]
        device: Option<u32>,
        #[serde(default)]
        message: String,
    },
    /// A problem kind this relay does not know. Never resolvable.
    #[serde(other)]
    Unknown,
}

impl fmt::Display for DeviceProblem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::MissingBundle { jid, device } => {
                write!(f, "missing bundle for device {} of {}", device, jid)
            }
            Self::Untrusted { jid, device } => write!(f, "device {} of {} is untrusted", device, jid),
            Self::Other { message, .. } => f.write_str(message),
            Self::Unknown => f.write_str("unrecognised device problem"),
        }
    }
}

fn describe(problems: &[DeviceProblem]) -> String {
    problems
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

/// Errors reported by the encryption collaborator while encrypting or trusting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum NegotiationError {
    /// A recipient device has an identity key nobody has decided on yet.
    #[error("device {device} of {jid} has an undecided identity key")]
    Undecided {
        jid: String,
        device: u32,
        identity_key: String,
    },

    /// A recipient device is explicitly distrusted.
    #[error("device {device} of {jid} is not trusted")]
    Untrusted { jid: String, device: u32 },

    /// The collaborator tried everything it could; each problem must be
    /// resolved or skipped by the caller.
    #[error("encryption could not be prepared: {}", describe(.0))]
    Exhausted(Vec<DeviceProblem>),

    /// Fetching recipient information failed or timed out.
    #[error("transport error: {0}")]
    Transport(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// Errors reported by the encryption collaborator while decrypting.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DecryptionError {
    /// The message was not encrypted for this account's device.
    #[error("message is not encrypted for our device")]
    MissingOwnKey,

    /// The message uses a session this device does not have.
    #[error("no session available for sender")]
    NoAvailableSession,

    /// The sending device's identity key is undecided.
    #[error("device {device} of {jid} has an undecided identity key")]
    Undecided { jid: String, device: u32 },

    /// The sending device is explicitly distrusted.
    #[error("device {device} of {jid} is not trusted")]
    Untrusted { jid: String, device: u32 },

    /// The collaborator gave up.
    #[error("decryption could not be completed: {0}")]
    Exhausted(String),

    /// Anything else.
    #[error("{0}")]
    Other(String),
}

/// Errors delivering a stanza to the transport.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SendError {
    /// The outbound queue or connection is gone.
    #[error("transport closed")]
    Closed,

    /// The transport rejected the stanza.
    #[error("send failed: {0}")]
    Transport(String),
}

/// Faults the gateway hands back to its caller.
///
/// Anticipated negotiation problems never surface here; they end in a
/// [`crate::DeliveryOutcome`] instead.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum GatewayError {
    /// An unanticipated encryption failure.
    #[error("encryption failed: {0}")]
    Encryption(#[from] NegotiationError),

    /// An unanticipated decryption failure.
    #[error("decryption failed: {0}")]
    Decryption(#[from] DecryptionError),

    /// A stanza could not be handed to the transport.
    #[error(transparent)]
    Send(#[from] SendError),
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_exhausted_display_lists_problems() {
        let err = NegotiationError::Exhausted(vec![
            DeviceProblem::MissingBundle {
                jid: "bob@example.org".to_string(),
                device: 7,
            },
            DeviceProblem::Other {
                jid: None,
                device: None,
                message: "boom".to_string(),
            },
        ]);
        assert_eq!(
            err.to_string(),
            "encryption could not be prepared: missing bundle for device 7 of bob@example.org; boom"
        );
    }

    #[test]
    fn test_gateway_error_from() {
        let err: GatewayError = SendError::Closed.into();
        assert_eq!(err.to_string(), "transport closed");

        let err: GatewayError = NegotiationError::Other("bad".to_string()).into();
        assert!(matches!(err, GatewayError::Encryption(_)));
    }
}
