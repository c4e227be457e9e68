//! Test doubles for the encrypted chat relay.
//!
//! This crate provides stand-ins for every external collaborator:
//! - `StaticBackend` / `ScriptedBackend` - Canned text generation
//! - `DelayedBackend` - Wraps another backend with artificial latency
//! - `MemoryKeyring` - Encryption capability with programmable device problems
//! - `RecordingSender` - Transport that records outbound stanzas
//! - `RecordingSynthesizer` - Speech synthesis that records its input
//!
//! # Example
//!
//! ```rust
//! use std::sync::Arc;
//!
//! use mock_relay::{DeviceState, MemoryKeyring, RecordingSender};
//! use omemo_gateway::EncryptionGateway;
//! use relay_core::{Jid, MessageKind};
//!
//! #[tokio::main]
//! async fn main() -> Result<(), omemo_gateway::GatewayError> {
//!     let keyring = Arc::new(
//!         MemoryKeyring::new(1).with_device("alice@example.org", 11, DeviceState::Trusted),
//!     );
//!     let sender = Arc::new(RecordingSender::new());
//!     let gateway = EncryptionGateway::new(keyring, sender.clone());
//!
//!     let to = Jid::parse("alice@example.org/phone").unwrap();
//!     let outcome = gateway.deliver(&to, MessageKind::Chat, "Hello!").await?;
//!
//!     assert!(outcome.is_sent());
//!     assert_eq!(sender.encrypted_count().await, 1);
//!     Ok(())
//! }
//! ```

mod backends;
mod delayed;
mod keyring;
mod sender;
mod synth;

pub use backends::{ScriptedBackend, StaticBackend};
pub use delayed::DelayedBackend;
pub use keyring::{DeviceState, EncryptCall, MemoryKeyring};
pub use sender::RecordingSender;
pub use synth::RecordingSynthesizer;
