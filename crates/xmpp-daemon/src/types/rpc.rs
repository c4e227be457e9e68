//! JSON-RPC parameter, result and error payloads.

use omemo_gateway::{DeviceProblem, SkipMap};
use relay_core::{EncryptedEnvelope, OutboundStanza};
use serde::{Deserialize, Serialize};

/// Parameters for the `login` method.
#[derive(Clone, Serialize, Deserialize)]
pub struct LoginParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub password: String,
}

impl std::fmt::Debug for LoginParams {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LoginParams")
            .field("account", &self.account)
            .field("password", &"<redacted>")
            .finish()
    }
}

/// Parameters for the `join_room` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct JoinRoomParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub room: String,
    pub nick: String,
}

/// Parameters for the `encrypt` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub plaintext: String,
    /// Bare recipient addresses.
    pub recipients: Vec<String>,
    /// Devices to leave out, per bare address.
    #[serde(default, skip_serializing_if = "SkipMap::is_empty")]
    pub skip: SkipMap,
}

/// Parameters for the `decrypt` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DecryptParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    /// Full sender address.
    pub sender: String,
    pub envelope: EncryptedEnvelope,
    pub allow_untrusted: bool,
}

/// Result of the `decrypt` method.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DecryptResult {
    /// Decrypted text; absent for key-transport envelopes.
    #[serde(default)]
    pub body: Option<String>,
}

/// Parameters for the `trust` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrustParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub jid: String,
    pub device: u32,
    pub identity_key: String,
}

/// Parameters for the `send` method.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SendParams {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub account: Option<String>,
    pub stanza: OutboundStanza,
}

/// Result of the `send` method.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SendResult {
    /// Stanza id assigned by the daemon, if any.
    #[serde(default)]
    pub id: Option<String>,
}

/// Structured `data` of a JSON-RPC error, tagged by `kind`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ErrorData {
    Undecided {
        jid: String,
        device: u32,
        #[serde(default, rename = "identityKey")]
        identity_key: Option<String>,
    },
    Untrusted {
        jid: String,
        device: u32,
    },
    MissingBundle {
        jid: String,
        device: u32,
    },
    Exhausted {
        #[serde(default)]
        problems: Vec<DeviceProblem>,
    },
    MissingOwnKey,
    NoAvailableSession,
    Timeout {
        #[serde(default)]
        message: Option<String>,
    },
    #[serde(other)]
    Unknown,
}
