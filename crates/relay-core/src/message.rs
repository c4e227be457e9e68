//! Addressing and stanza types exchanged with the transport.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// An XMPP address, `local@domain/resource`.
///
/// Local part and domain compare case-insensitively and are stored
/// lowercased; the resource keeps its case. Sessions are always keyed by
/// the bare form (see [`Jid::bare`]), so every device of one account
/// shares a conversation.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Jid {
    local: Option<String>,
    domain: String,
    resource: Option<String>,
}

/// Returned when a string is not a usable address.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("invalid JID: {0:?}")]
pub struct JidParseError(pub String);

impl Jid {
    /// Parse `local@domain/resource`; local part and resource are optional.
    pub fn parse(input: &str) -> Result<Self, JidParseError> {
        let input = input.trim();
        let (address, resource) = match input.split_once('/') {
            Some((address, resource)) if !resource.is_empty() => {
                (address, Some(resource.to_string()))
            }
            Some(_) => return Err(JidParseError(input.to_string())),
            None => (input, None),
        };

        let (local, domain) = match address.split_once('@') {
            Some((local, domain)) if !local.is_empty() => (Some(local.to_lowercase()), domain),
            Some(_) => return Err(JidParseError(input.to_string())),
            None => (None, address),
        };

        if domain.is_empty() || domain.contains('@') {
            return Err(JidParseError(input.to_string()));
        }

        Ok(Self {
            local,
            domain: domain.to_ascii_lowercase(),
            resource,
        })
    }

    /// The bare address (`local@domain`) as a string, used as session key.
    pub fn bare(&self) -> String {
        match &self.local {
            Some(local) => format!("{}@{}", local, self.domain),
            None => self.domain.clone(),
        }
    }

    /// A copy of this address without the resource.
    pub fn to_bare(&self) -> Jid {
        Self {
            local: self.local.clone(),
            domain: self.domain.clone(),
            resource: None,
        }
    }

    /// The resource part, if present.
    pub fn resource(&self) -> Option<&str> {
        self.resource.as_deref()
    }

    /// The domain part.
    pub fn domain(&self) -> &str {
        &self.domain
    }
}

impl fmt::Display for Jid {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.bare())?;
        if let Some(resource) = &self.resource {
            write!(f, "/{}", resource)?;
        }
        Ok(())
    }
}

impl FromStr for Jid {
    type Err = JidParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

impl TryFrom<String> for Jid {
    type Error = JidParseError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value)
    }
}

impl From<Jid> for String {
    fn from(jid: Jid) -> Self {
        jid.to_string()
    }
}

/// Message stanza type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MessageKind {
    #[default]
    Chat,
    Normal,
    Groupchat,
    Headline,
    Error,
}

impl MessageKind {
    /// Whether this kind is one-to-one traffic the relay answers.
    pub fn is_direct(self) -> bool {
        matches!(self, Self::Chat | Self::Normal)
    }
}

/// One per-device key slot of an encrypted envelope.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EnvelopeKey {
    /// Recipient device id.
    pub rid: u32,
    /// Bare address the device belongs to, when the collaborator reports it.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub jid: Option<String>,
    /// Whether this key slot carries a pre-key message.
    #[serde(default)]
    pub prekey: bool,
    /// Encoded key material, opaque to the relay.
    pub data: String,
}

/// An encrypted message body as produced by the encryption collaborator.
///
/// The relay never interprets the contents; it only routes them.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct EncryptedEnvelope {
    /// Sending device id.
    pub sid: u32,
    /// Encoded initialisation vector.
    pub iv: String,
    /// Key slots, one per recipient device.
    #[serde(default)]
    pub keys: Vec<EnvelopeKey>,
    /// Encoded ciphertext; absent for key-transport messages.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<String>,
}

impl EncryptedEnvelope {
    /// Device ids this envelope was encrypted for.
    pub fn recipient_devices(&self) -> Vec<u32> {
        self.keys.iter().map(|k| k.rid).collect()
    }
}

/// A message received from the network.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InboundStanza {
    /// Full sender address, including the device resource.
    pub from: Jid,
    /// Stanza type.
    #[serde(default, rename = "type")]
    pub kind: MessageKind,
    /// Plaintext body, if any.
    #[serde(default)]
    pub body: Option<String>,
    /// Encrypted element, if the stanza carries one.
    #[serde(default)]
    pub encrypted: Option<EncryptedEnvelope>,
}

impl InboundStanza {
    /// A plaintext one-to-one chat message.
    pub fn plain(from: Jid, body: impl Into<String>) -> Self {
        Self {
            from,
            kind: MessageKind::Chat,
            body: Some(body.into()),
            encrypted: None,
        }
    }

    /// An encrypted one-to-one chat message.
    pub fn encrypted(from: Jid, envelope: EncryptedEnvelope) -> Self {
        Self {
            from,
            kind: MessageKind::Chat,
            body: None,
            encrypted: Some(envelope),
        }
    }

    /// Set the stanza type.
    pub fn with_kind(mut self, kind: MessageKind) -> Self {
        self.kind = kind;
        self
    }

    /// Whether the stanza carries an encrypted element.
    pub fn is_encrypted(&self) -> bool {
        self.encrypted.is_some()
    }
}

/// Content of an outbound stanza.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "content", rename_all = "snake_case")]
pub enum Payload {
    /// Unencrypted side-channel text.
    Plain(String),
    /// Encrypted element for all non-skipped recipient devices.
    Encrypted(EncryptedEnvelope),
}

/// A message the relay wants delivered.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutboundStanza {
    pub to: Jid,
    #[serde(rename = "type")]
    pub kind: MessageKind,
    pub payload: Payload,
}

impl OutboundStanza {
    /// An unencrypted stanza.
    pub fn plain(to: Jid, kind: MessageKind, text: impl Into<String>) -> Self {
        Self {
            to,
            kind,
            payload: Payload::Plain(text.into()),
        }
    }

    /// An encrypted stanza.
    pub fn encrypted(to: Jid, kind: MessageKind, envelope: EncryptedEnvelope) -> Self {
        Self {
            to,
            kind,
            payload: Payload::Encrypted(envelope),
        }
    }

    /// Plain text, if this is a side-channel stanza.
    pub fn plain_text(&self) -> Option<&str> {
        match &self.payload {
            Payload::Plain(text) => Some(text),
            Payload::Encrypted(_) => None,
        }
    }

    /// Whether the payload is encrypted.
    pub fn is_encrypted(&self) -> bool {
        matches!(self.payload, Payload::Encrypted(_))
    }
}
