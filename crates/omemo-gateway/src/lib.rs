//! Encryption negotiation for the encrypted chat relay.
//!
//! This crate sits between the relay pipeline and an end-to-end encryption
//! implementation. It provides:
//!
//! - [`Omemo`] - The encryption capability (encrypt, decrypt, trust)
//! - [`StanzaSender`] - The outbound transport
//! - [`EncryptionGateway`] - Trust-on-first-use delivery with per-delivery
//!   device skipping, and the inbound decryption policy
//! - [`notices`] - The literal texts users see when something goes wrong
//!
//! Delivery never loops on the same state twice: see [`AbortReason`].

mod error;
mod gateway;
mod inbound;
pub mod notices;
mod traits;

pub use error::{DecryptionError, DeviceProblem, GatewayError, NegotiationError, SendError};
pub use gateway::{AbortReason, DeliveryAttempt, DeliveryOutcome, EncryptionGateway, MAX_ROUNDS};
pub use inbound::{DropReason, InboundOutcome};
pub use traits::{Omemo, SkipMap, StanzaSender};

// Re-export async_trait for convenience
pub use async_trait::async_trait;
