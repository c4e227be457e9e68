//! Inbound decryption policy.

use relay_core::{EncryptedEnvelope, Jid, MessageKind};
use tracing::{debug, error, info, warn};

use crate::error::{DecryptionError, GatewayError};
use crate::gateway::EncryptionGateway;
use crate::notices;

/// Why an inbound message was dropped.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DropReason {
    /// Not encrypted for our device.
    MissingOwnKey,
    /// Uses a session we do not have.
    NoAvailableSession,
    /// The collaborator gave up, or the sender stayed untrusted after retrying.
    Undecryptable,
}

/// Result of decrypting an inbound envelope.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum InboundOutcome {
    /// Decrypted text to process.
    Plaintext(String),
    /// Envelope without a body (key transport); nothing to do.
    Empty,
    /// The user has been told; the message is lost.
    Dropped(DropReason),
}

impl EncryptionGateway {
    /// Decrypt an inbound envelope, telling the sender about recoverable
    /// problems.
    ///
    /// A message from an undecided or untrusted device is announced and
    /// decrypted once more with `allow_untrusted` set. Unanticipated errors
    /// are reported to the sender and returned.
    pub async fn decrypt_inbound(
        &self,
        from: &Jid,
        kind: MessageKind,
        envelope: &EncryptedEnvelope,
    ) -> Result<InboundOutcome, GatewayError> {
        let mut allow_untrusted = false;

        loop {
            let result = self.omemo.decrypt(envelope, from, allow_untrusted).await;

            let err = match result {
                Ok(Some(body)) => return Ok(InboundOutcome::Plaintext(body)),
                Ok(None) => {
                    debug!("Ignoring body-less envelope from {}", from);
                    return Ok(InboundOutcome::Empty);
                }
                Err(err) => err,
            };

            match err {
                DecryptionError::MissingOwnKey => {
                    info!("Message from {} was not encrypted for our device", from);
                    self.send_plain(from, kind, notices::NEW_OWN_KEY).await?;
                    return Ok(InboundOutcome::Dropped(DropReason::MissingOwnKey));
                }
                DecryptionError::NoAvailableSession => {
                    warn!("Message from {} uses an unknown session", from);
                    self.deliver(from, kind, notices::UNKNOWN_SESSION).await?;
                    return Ok(InboundOutcome::Dropped(DropReason::NoAvailableSession));
                }
                DecryptionError::Undecided { jid, device }
                | DecryptionError::Untrusted { jid, device }
                    if !allow_untrusted =>
                {
                    info!("New device {} for {}, retrying untrusted", device, jid);
                    self.send_plain(from, kind, &notices::new_device(device, &jid))
                        .await?;
                    allow_untrusted = true;
                }
                DecryptionError::Undecided { .. }
                | DecryptionError::Untrusted { .. }
                | DecryptionError::Exhausted(_) => {
                    warn!("Unable to decrypt message from {}: {}", from, err);
                    self.send_plain(from, kind, notices::UNABLE_TO_DECRYPT).await?;
                    return Ok(InboundOutcome::Dropped(DropReason::Undecryptable));
                }
                DecryptionError::Other(_) => {
                    error!("Decryption of message from {} failed: {}", from, err);
                    self.send_plain(from, kind, &notices::decryption_exception(&err))
                        .await?;
                    return Err(GatewayError::Decryption(err));
                }
            }
        }
    }
}
