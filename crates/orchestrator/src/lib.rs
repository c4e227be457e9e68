//! Relay pipeline for the encrypted chat relay.
//!
//! This crate provides the [`Orchestrator`], which takes one inbound stanza
//! at a time through decryption, command dispatch or a conversation turn,
//! optional speech synthesis, and encrypted delivery, plus the [`Worker`]
//! that feeds it from a queue.
//!
//! # Features
//!
//! - Prefix commands: `help`, `rtd`, `rc`/`resetcontext`, admin-only `shell`
//! - Per-participant sessions locked for the whole turn
//! - Text, voice or both as output; voice goes through a [`Synthesizer`]
//!   (see [`CommandSynthesizer`])
//! - Echo mode for running without a backend
//! - Inbound and outbound queues so the transport never blocks the pipeline
//!
//! # Example
//!
//! ```rust,ignore
//! use std::sync::Arc;
//! use orchestrator::{drain_outbound, inbound_channel, ChannelSender, Orchestrator,
//!     OrchestratorConfig, Worker};
//!
//! let (sender, outbound) = ChannelSender::channel();
//! let gateway = EncryptionGateway::new(omemo, Arc::new(sender));
//! let orchestrator = Orchestrator::new(OrchestratorConfig::from_env()?, sessions, backend, gateway);
//!
//! tokio::spawn(drain_outbound(outbound, transport));
//! let (tx, rx) = inbound_channel();
//! Worker::new(Arc::new(orchestrator), rx)
//!     .run_with_shutdown(async { let _ = tokio::signal::ctrl_c().await; })
//!     .await;
//! ```
//!
//! [`Synthesizer`]: relay_core::Synthesizer

mod commands;
mod config;
mod error;
mod orchestrator;
mod synth;
mod worker;

pub use commands::{
    roll_the_dice, Command, CommandDispatcher, CommandInvocation, ParsedInput, CONTEXT_CLEARED,
};
pub use config::{parse_prefix, OrchestratorConfig, OutputMode, DEFAULT_BOT_NAME, DEFAULT_PREFIX};
pub use error::OrchestratorError;
pub use orchestrator::{HandleOutcome, IgnoreReason, Orchestrator};
pub use synth::CommandSynthesizer;
pub use worker::{drain_outbound, inbound_channel, ChannelSender, Worker, WorkerStats};
