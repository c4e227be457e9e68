//! The per-stanza relay pipeline.

use std::sync::Arc;

use omemo_gateway::{notices, DeliveryOutcome, DropReason, EncryptionGateway, InboundOutcome};
use relay_core::{
    append_assistant_turn, append_user_turn, normalize_for_speech, Backend, BackendError,
    EncryptedEnvelope, InboundStanza, Jid, MessageKind, SessionStore, Synthesizer, TextChunker,
    DEFAULT_SPEECH_RULES,
};
use tracing::{debug, error, info, warn};

use crate::commands::{CommandDispatcher, ParsedInput};
use crate::config::OrchestratorConfig;
use crate::error::OrchestratorError;

/// Why a stanza produced no reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum IgnoreReason {
    /// Not a one-to-one chat or normal message.
    NotDirect(MessageKind),
    /// Unencrypted, and echoing unencrypted messages is off.
    Unencrypted,
    /// Neither a body nor an encrypted element.
    NoContent,
    /// Decrypted to nothing (key transport).
    NoBody,
    /// The decryption policy dropped it after telling the sender.
    Dropped(DropReason),
    /// Started with the prefix but named no command.
    UnknownCommand(String),
    /// A command or turn that has nothing to say.
    NoReply,
}

/// Result of handling one inbound stanza.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum HandleOutcome {
    /// Nothing was sent back.
    Ignored(IgnoreReason),
    /// An unencrypted message was echoed in plain text.
    EchoedPlain,
    /// A reply went through the gateway, once per delivered representation.
    Replied { deliveries: Vec<DeliveryOutcome> },
    /// The backend failed; the user got a plain notice.
    BackendFailed,
}

/// Coordinates decryption, commands, conversation turns, speech output and
/// encrypted delivery for each inbound stanza.
///
/// ```text
/// InboundStanza
///      ↓
/// kind chat/normal? ── no ──→ ignored
///      ↓
/// encrypted? ── no ──→ plain echo or ignored
///      ↓
/// EncryptionGateway::decrypt_inbound
///      ↓
/// command? ── yes ──→ CommandDispatcher ──┐
///      ↓                                  │
/// lock session → user turn → backend      │
///   → assistant turn (or echo)            │
///      ↓                                  │
/// text and/or (normalise → chunk →        │
///   synthesize → audio link)              │
///      ↓                                  ↓
/// EncryptionGateway::deliver ←────────────┘
/// ```
pub struct Orchestrator {
    config: Arc<OrchestratorConfig>,
    sessions: Arc<SessionStore>,
    backend: Arc<dyn Backend>,
    gateway: EncryptionGateway,
    commands: CommandDispatcher,
    chunker: TextChunker,
    synthesizer: Option<Arc<dyn Synthesizer>>,
}

impl Orchestrator {
    /// Create an orchestrator with the given components.
    pub fn new(
        config: OrchestratorConfig,
        sessions: Arc<SessionStore>,
        backend: Arc<dyn Backend>,
        gateway: EncryptionGateway,
    ) -> Self {
        let config = Arc::new(config);
        let commands = CommandDispatcher::new(config.clone(), sessions.clone());
        let chunker = TextChunker::new(config.max_chunk_chars);

        Self {
            config,
            sessions,
            backend,
            gateway,
            commands,
            chunker,
            synthesizer: None,
        }
    }

    /// Use `synthesizer` for voice output.
    pub fn with_synthesizer(mut self, synthesizer: Arc<dyn Synthesizer>) -> Self {
        self.synthesizer = Some(synthesizer);
        self
    }

    /// The configuration in use.
    pub fn config(&self) -> &OrchestratorConfig {
        &self.config
    }

    /// The session store in use.
    pub fn sessions(&self) -> &Arc<SessionStore> {
        &self.sessions
    }

    /// Handle one inbound stanza end-to-end.
    ///
    /// Anticipated failures are reported to the sender and end in an `Ok`
    /// outcome. Anything else is reported with a generic notice (unless the
    /// gateway already told the sender) and returned.
    pub async fn handle(&self, stanza: InboundStanza) -> Result<HandleOutcome, OrchestratorError> {
        let from = &stanza.from;
        let kind = stanza.kind;

        if !kind.is_direct() {
            debug!("Ignoring {:?} stanza from {}", kind, from);
            return Ok(HandleOutcome::Ignored(IgnoreReason::NotDirect(kind)));
        }

        let Some(envelope) = &stanza.encrypted else {
            return self.handle_unencrypted(from, kind, stanza.body.as_deref()).await;
        };

        let result = self.handle_encrypted(from, kind, envelope).await;

        if let Err(e) = &result {
            error!("Failed to handle message from {}: {}", from, e);
            if needs_generic_notice(e) {
                if let Err(send_err) = self
                    .gateway
                    .send_plain(from, kind, notices::UNEXPECTED_FAILURE)
                    .await
                {
                    warn!("Could not notify {}: {}", from, send_err);
                }
            }
        }

        result
    }

    async fn handle_unencrypted(
        &self,
        from: &Jid,
        kind: MessageKind,
        body: Option<&str>,
    ) -> Result<HandleOutcome, OrchestratorError> {
        let Some(body) = body else {
            debug!("Stanza from {} has no content", from);
            return Ok(HandleOutcome::Ignored(IgnoreReason::NoContent));
        };

        if !self.config.echo_unencrypted {
            debug!("Dropping unencrypted message from {}", from);
            return Ok(HandleOutcome::Ignored(IgnoreReason::Unencrypted));
        }

        self.gateway
            .send_plain(from, kind, &format!("Echo unencrypted message: {}", body))
            .await?;
        Ok(HandleOutcome::EchoedPlain)
    }

    async fn handle_encrypted(
        &self,
        from: &Jid,
        kind: MessageKind,
        envelope: &EncryptedEnvelope,
    ) -> Result<HandleOutcome, OrchestratorError> {
        let text = match self.gateway.decrypt_inbound(from, kind, envelope).await? {
            InboundOutcome::Plaintext(text) => text,
            InboundOutcome::Empty => return Ok(HandleOutcome::Ignored(IgnoreReason::NoBody)),
            InboundOutcome::Dropped(reason) => {
                return Ok(HandleOutcome::Ignored(IgnoreReason::Dropped(reason)))
            }
        };

        info!("Processing message from {}", from);
        debug!("Message text: {}", text);

        match self.commands.parse(&text) {
            ParsedInput::Unknown(name) => {
                debug!("Dropping unknown command {:?} from {}", name, from);
                Ok(HandleOutcome::Ignored(IgnoreReason::UnknownCommand(name)))
            }
            ParsedInput::Command(invocation) => {
                match self.commands.dispatch(from, &invocation).await? {
                    Some(reply) => {
                        let outcome = self.gateway.deliver(from, kind, &reply).await?;
                        Ok(HandleOutcome::Replied {
                            deliveries: vec![outcome],
                        })
                    }
                    None => Ok(HandleOutcome::Ignored(IgnoreReason::NoReply)),
                }
            }
            ParsedInput::Conversation => self.converse(from, kind, &text).await,
        }
    }

    async fn converse(
        &self,
        from: &Jid,
        kind: MessageKind,
        text: &str,
    ) -> Result<HandleOutcome, OrchestratorError> {
        let reply = match self.run_turn(from, text).await {
            Ok(reply) => reply,
            Err(e) => {
                error!("Backend {} failed for {}: {}", self.backend.name(), from, e);
                self.gateway
                    .send_plain(from, kind, notices::BACKEND_FAILURE)
                    .await?;
                return Ok(HandleOutcome::BackendFailed);
            }
        };

        if reply.is_empty() {
            warn!("Backend returned an empty reply for {}", from);
            return Ok(HandleOutcome::Ignored(IgnoreReason::NoReply));
        }

        self.deliver_reply(from, kind, &reply).await
    }

    /// One conversation turn, holding the session for its whole duration.
    ///
    /// A failed backend call leaves the session as it was before the turn.
    async fn run_turn(&self, from: &Jid, text: &str) -> Result<String, BackendError> {
        let participant = from.bare();

        if self.config.echo {
            self.sessions.reset(&participant).await;
            return Ok(text.to_string());
        }

        let handle = self.sessions.get_or_create(&participant).await;
        let mut session = handle.lock().await;
        let before = session.clone();

        append_user_turn(&mut session, text);
        match self.backend.complete(&session).await {
            Ok(raw) => {
                debug!("Raw reply for {}: {:?}", participant, raw);
                Ok(append_assistant_turn(&mut session, &raw))
            }
            Err(e) => {
                *session = before;
                Err(e)
            }
        }
    }

    async fn deliver_reply(
        &self,
        from: &Jid,
        kind: MessageKind,
        reply: &str,
    ) -> Result<HandleOutcome, OrchestratorError> {
        let output = self.config.output;
        let mut deliveries = Vec::new();

        let synthesizer = match (&self.synthesizer, output.wants_voice()) {
            (Some(synthesizer), true) => Some(synthesizer),
            (None, true) => {
                warn!("Voice output requested but no synthesizer is configured");
                None
            }
            _ => None,
        };

        if output.wants_text() || synthesizer.is_none() {
            deliveries.push(self.gateway.deliver(from, kind, reply).await?);
        }

        if let Some(synthesizer) = synthesizer {
            let segments = self
                .chunker
                .split(&normalize_for_speech(reply, DEFAULT_SPEECH_RULES));
            if segments.is_empty() {
                debug!("Nothing to synthesize for {}", from);
            } else {
                let link = synthesizer
                    .synthesize(&segments, &self.config.speakers)
                    .await?;
                info!("Synthesized {} segment(s) for {}", segments.len(), from);
                deliveries.push(self.gateway.deliver(from, kind, &link).await?);
            }
        }

        Ok(HandleOutcome::Replied { deliveries })
    }
}

/// Gateway errors were already reported to the sender; a failed send means
/// the transport cannot carry a notice either.
fn needs_generic_notice(error: &OrchestratorError) -> bool {
    !matches!(
        error,
        OrchestratorError::Gateway(_) | OrchestratorError::Send(_)
    )
}
