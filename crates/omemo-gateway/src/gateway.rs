//! Outbound encryption negotiation.
//!
//! Delivery is a small state machine. Each round asks the collaborator to
//! encrypt; anticipated problems are resolved (trust an undecided device,
//! skip a keyless one) and the round repeats. Every retry has to make
//! progress: a device reported undecided twice, or an exhausted report that
//! adds no new skip, aborts the delivery.

use std::collections::BTreeSet;
use std::sync::Arc;

use relay_core::{Jid, MessageKind, OutboundStanza};
use tracing::{debug, info, warn};

use crate::error::{DeviceProblem, GatewayError, NegotiationError, SendError};
use crate::notices;
use crate::traits::{Omemo, SkipMap, StanzaSender};

/// Upper bound on encryption rounds for one delivery.
///
/// Progress checks normally end a delivery long before this.
pub const MAX_ROUNDS: u32 = 64;

/// Why a delivery gave up without sending.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AbortReason {
    /// Recipient lookup failed on the wire.
    Transport(String),
    /// The same device was reported undecided after being trusted.
    RepeatedUndecided { jid: String, device: u32 },
    /// An exhausted report named no device that was not already skipped.
    NoProgress,
    /// An exhausted report contained a problem other than a missing bundle.
    Unresolvable(DeviceProblem),
    /// [`MAX_ROUNDS`] rounds without a result.
    RoundLimit,
}

/// How a delivery ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DeliveryOutcome {
    /// The encrypted stanza was handed to the transport.
    Sent {
        /// Number of encryption rounds.
        attempts: u32,
        /// Devices left out of this delivery.
        skipped: SkipMap,
    },
    /// Gave up; the message is lost.
    Aborted(AbortReason),
}

impl DeliveryOutcome {
    /// Whether the message went out.
    pub fn is_sent(&self) -> bool {
        matches!(self, Self::Sent { .. })
    }
}

/// State of one outbound delivery.
#[derive(Debug, Clone, Default)]
pub struct DeliveryAttempt {
    /// Bare addresses to encrypt for.
    pub recipients: Vec<Jid>,
    /// Devices skipped for this delivery only.
    pub skip_devices: SkipMap,
    /// Encryption rounds so far.
    pub attempts: u32,
    /// `None` while pending, then sent or aborted.
    pub outcome: Option<DeliveryOutcome>,
    trusted: BTreeSet<(String, u32)>,
}

impl DeliveryAttempt {
    /// A fresh attempt for one recipient, with nothing skipped.
    pub fn for_recipient(to: &Jid) -> Self {
        Self {
            recipients: vec![to.to_bare()],
            ..Self::default()
        }
    }

    /// Whether the attempt is still going.
    pub fn is_pending(&self) -> bool {
        self.outcome.is_none()
    }

    fn finish(&mut self, outcome: DeliveryOutcome) -> DeliveryOutcome {
        self.outcome = Some(outcome.clone());
        outcome
    }

    fn skip(&mut self, jid: &str, device: u32) -> bool {
        self.skip_devices
            .entry(jid.to_string())
            .or_default()
            .insert(device)
    }
}

/// What the state machine does after a round.
enum Step {
    Retry,
    Done(DeliveryOutcome),
}

/// Encrypts and sends replies, and applies the inbound decryption policy.
///
/// # Example
///
/// ```rust,ignore
/// let gateway = EncryptionGateway::new(omemo, sender);
/// match gateway.deliver(&to, MessageKind::Chat, "Hi there!").await? {
///     DeliveryOutcome::Sent { attempts, .. } => println!("sent after {} rounds", attempts),
///     DeliveryOutcome::Aborted(reason) => println!("gave up: {:?}", reason),
/// }
/// ```
#[derive(Clone)]
pub struct EncryptionGateway {
    pub(crate) omemo: Arc<dyn Omemo>,
    pub(crate) sender: Arc<dyn StanzaSender>,
}

impl EncryptionGateway {
    /// Create a gateway over an encryption capability and a transport.
    pub fn new(omemo: Arc<dyn Omemo>, sender: Arc<dyn StanzaSender>) -> Self {
        Self { omemo, sender }
    }

    /// Send unencrypted side-channel text.
    pub async fn send_plain(
        &self,
        to: &Jid,
        kind: MessageKind,
        text: &str,
    ) -> Result<(), SendError> {
        debug!("Sending plain notice to {}", to);
        self.sender
            .send(OutboundStanza::plain(to.clone(), kind, text))
            .await
    }

    /// Encrypt `body` for every device of `to`'s account and send it.
    ///
    /// Undecided devices are trusted on first use; devices without keys are
    /// skipped for this delivery and the user is told in plain text.
    /// Anticipated failures end in [`DeliveryOutcome::Aborted`]; anything
    /// else is reported to the user and returned as an error.
    pub async fn deliver(
        &self,
        to: &Jid,
        kind: MessageKind,
        body: &str,
    ) -> Result<DeliveryOutcome, GatewayError> {
        let mut attempt = DeliveryAttempt::for_recipient(to);
        self.run(to, kind, body, &mut attempt).await
    }

    /// Like [`deliver`](Self::deliver), but returns the finished attempt
    /// with its skip map, round count and outcome.
    pub async fn deliver_attempt(
        &self,
        to: &Jid,
        kind: MessageKind,
        body: &str,
    ) -> Result<DeliveryAttempt, GatewayError> {
        let mut attempt = DeliveryAttempt::for_recipient(to);
        self.run(to, kind, body, &mut attempt).await?;
        Ok(attempt)
    }

    async fn run(
        &self,
        to: &Jid,
        kind: MessageKind,
        body: &str,
        attempt: &mut DeliveryAttempt,
    ) -> Result<DeliveryOutcome, GatewayError> {
        loop {
            if attempt.attempts >= MAX_ROUNDS {
                warn!("Delivery to {} hit the round limit", to);
                return Ok(attempt.finish(DeliveryOutcome::Aborted(AbortReason::RoundLimit)));
            }
            attempt.attempts += 1;

            let result = self
                .omemo
                .encrypt(body, &attempt.recipients, &attempt.skip_devices)
                .await;

            let error = match result {
                Ok(envelope) => {
                    self.sender
                        .send(OutboundStanza::encrypted(to.clone(), kind, envelope))
                        .await?;
                    info!(
                        "Delivered encrypted message to {} after {} round(s)",
                        to, attempt.attempts
                    );
                    let sent = DeliveryOutcome::Sent {
                        attempts: attempt.attempts,
                        skipped: attempt.skip_devices.clone(),
                    };
                    return Ok(attempt.finish(sent));
                }
                Err(error) => error,
            };

            match self.resolve(to, kind, attempt, error).await? {
                Step::Retry => continue,
                Step::Done(outcome) => {
                    if let DeliveryOutcome::Aborted(reason) = &outcome {
                        warn!("Delivery to {} aborted: {:?}", to, reason);
                    }
                    return Ok(attempt.finish(outcome));
                }
            }
        }
    }

    async fn resolve(
        &self,
        to: &Jid,
        kind: MessageKind,
        attempt: &mut DeliveryAttempt,
        error: NegotiationError,
    ) -> Result<Step, GatewayError> {
        match error {
            NegotiationError::Undecided {
                jid,
                device,
                identity_key,
            } => {
                if !attempt.trusted.insert((jid.clone(), device)) {
                    return Ok(Step::Done(DeliveryOutcome::Aborted(
                        AbortReason::RepeatedUndecided { jid, device },
                    )));
                }
                info!("Trusting undecided device {} of {}", device, jid);
                match self.omemo.trust(&jid, device, &identity_key).await {
                    Ok(()) => Ok(Step::Retry),
                    Err(NegotiationError::Transport(message)) => {
                        self.abort_on_transport(to, kind, message).await
                    }
                    Err(e) => Err(self.report_encryption_failure(to, kind, e).await),
                }
            }
            NegotiationError::Exhausted(problems) => {
                if let Some(problem) = problems
                    .iter()
                    .find(|p| !matches!(p, DeviceProblem::MissingBundle { .. }))
                {
                    return Ok(Step::Done(DeliveryOutcome::Aborted(
                        AbortReason::Unresolvable(problem.clone()),
                    )));
                }

                let mut progressed = false;
                for problem in &problems {
                    if let DeviceProblem::MissingBundle { jid, device } = problem {
                        if attempt.skip(jid, *device) {
                            progressed = true;
                            debug!("Skipping keyless device {} of {}", device, jid);
                            self.send_plain(to, kind, &notices::missing_keys(*device, jid))
                                .await?;
                        }
                    }
                }

                if progressed {
                    Ok(Step::Retry)
                } else {
                    Ok(Step::Done(DeliveryOutcome::Aborted(AbortReason::NoProgress)))
                }
            }
            NegotiationError::Transport(message) => self.abort_on_transport(to, kind, message).await,
            other => Err(self.report_encryption_failure(to, kind, other).await),
        }
    }

    /// A failed round trip ends the delivery; it is not retried.
    async fn abort_on_transport(
        &self,
        to: &Jid,
        kind: MessageKind,
        message: String,
    ) -> Result<Step, GatewayError> {
        warn!("Recipient lookup for {} failed: {}", to, message);
        self.send_plain(to, kind, &notices::recipient_lookup_failed(&message))
            .await?;
        Ok(Step::Done(DeliveryOutcome::Aborted(AbortReason::Transport(
            message,
        ))))
    }

    async fn report_encryption_failure(
        &self,
        to: &Jid,
        kind: MessageKind,
        error: NegotiationError,
    ) -> GatewayError {
        if let Err(e) = self
            .send_plain(to, kind, &notices::encryption_failed(&error))
            .await
        {
            warn!("Could not report encryption failure to {}: {}", to, e);
        }
        GatewayError::Encryption(error)
    }
}
