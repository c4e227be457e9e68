//! Collaborator seams: the encryption capability and the outbound transport.

use std::collections::{BTreeMap, BTreeSet};

use async_trait::async_trait;
use relay_core::{EncryptedEnvelope, Jid, OutboundStanza};

use crate::error::{DecryptionError, NegotiationError, SendError};

/// Devices to leave out of an encryption, per bare address.
pub type SkipMap = BTreeMap<String, BTreeSet<u32>>;

/// The end-to-end encryption capability.
///
/// The relay never implements the protocol itself; it drives an
/// implementation through this trait and reacts to its typed errors.
#[async_trait]
pub trait Omemo: Send + Sync {
    /// Encrypt `plaintext` for every known device of `recipients`, except
    /// those listed in `skip`.
    async fn encrypt(
        &self,
        plaintext: &str,
        recipients: &[Jid],
        skip: &SkipMap,
    ) -> Result<EncryptedEnvelope, NegotiationError>;

    /// Decrypt an envelope from `sender`.
    ///
    /// `Ok(None)` means the envelope carried no body (key transport).
    async fn decrypt(
        &self,
        envelope: &EncryptedEnvelope,
        sender: &Jid,
        allow_untrusted: bool,
    ) -> Result<Option<String>, DecryptionError>;

    /// Record `identity_key` of `device` as trusted.
    async fn trust(&self, jid: &str, device: u32, identity_key: &str)
        -> Result<(), NegotiationError>;
}

/// Hands finished stanzas to the transport.
#[async_trait]
pub trait StanzaSender: Send + Sync {
    /// Send one stanza.
    async fn send(&self, stanza: OutboundStanza) -> Result<(), SendError>;
}
