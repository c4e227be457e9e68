//! Core types for the encrypted chat relay.
//!
//! This crate holds everything the relay needs that does not touch the
//! network:
//!
//! - [`Backend`] - The trait text generation backends implement
//! - [`Synthesizer`] - The trait speech synthesizers implement
//! - [`PersonaConfig`] - The character card every session is seeded from
//! - [`TemplateFormat`] - Prompt template families and reply cleanup
//! - [`SessionStore`] / [`ConversationSession`] - Per-participant prompt buffers
//! - [`TextChunker`] - Sentence-aligned splitting for speech synthesis
//! - [`Jid`], [`InboundStanza`], [`OutboundStanza`] - Addressing and stanzas
//!
//! # Example
//!
//! ```rust
//! use relay_core::{append_assistant_turn, append_user_turn, PersonaConfig, TemplateFormat};
//!
//! let persona = PersonaConfig::new(TemplateFormat::ChatMl, "Aria", "<|im_start|>user\n");
//! let mut session = persona.new_session("alice@example.org");
//!
//! append_user_turn(&mut session, "Hello");
//! let reply = append_assistant_turn(&mut session, "Hi!<|im_end|>");
//!
//! assert_eq!(reply, "Hi!");
//! assert!(session.prompt_buffer().ends_with("<|im_start|>user\n"));
//! ```

mod chunker;
mod error;
mod message;
mod persona;
mod session;
mod template;
mod trait_def;

pub use chunker::{normalize_for_speech, TextChunker, DEFAULT_MAX_CHARS, DEFAULT_SPEECH_RULES};
pub use error::{BackendError, ConfigError, SynthesisError};
pub use message::{
    EncryptedEnvelope, EnvelopeKey, InboundStanza, Jid, JidParseError, MessageKind,
    OutboundStanza, Payload,
};
pub use persona::{PersonaConfig, DEFAULT_PERSONA_PATH};
pub use session::{ConversationSession, SessionHandle, SessionStore};
pub use template::{append_assistant_turn, append_user_turn, FormatSpec, TemplateFormat};
pub use trait_def::{Backend, Synthesizer};

// Re-export async_trait for convenience
pub use async_trait::async_trait;
