//! Channel-based worker.
//!
//! Inbound stanzas are queued on an unbounded channel and handled one at a
//! time, in arrival order. Outbound stanzas are queued on a second channel
//! and drained into the transport by a separate task, so a slow transport
//! never blocks the pipeline.

use std::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use omemo_gateway::{SendError, StanzaSender};
use relay_core::{InboundStanza, OutboundStanza};
use tokio::sync::mpsc;
use tracing::{debug, error, info, warn};

use crate::orchestrator::{HandleOutcome, Orchestrator};

/// Create the inbound queue.
pub fn inbound_channel() -> (
    mpsc::UnboundedSender<InboundStanza>,
    mpsc::UnboundedReceiver<InboundStanza>,
) {
    mpsc::unbounded_channel()
}

/// A [`StanzaSender`] that enqueues stanzas for [`drain_outbound`].
#[derive(Debug, Clone)]
pub struct ChannelSender {
    tx: mpsc::UnboundedSender<OutboundStanza>,
}

impl ChannelSender {
    /// Create a sender and the receiving end of its queue.
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<OutboundStanza>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

#[async_trait]
impl StanzaSender for ChannelSender {
    async fn send(&self, stanza: OutboundStanza) -> Result<(), SendError> {
        self.tx.send(stanza).map_err(|_| SendError::Closed)
    }
}

/// Forward queued stanzas to `transport` until every [`ChannelSender`] is
/// dropped. Returns the number of stanzas the transport accepted.
///
/// Transport failures are logged and the stanza is lost.
pub async fn drain_outbound(
    mut rx: mpsc::UnboundedReceiver<OutboundStanza>,
    transport: Arc<dyn StanzaSender>,
) -> usize {
    let mut delivered = 0;

    while let Some(stanza) = rx.recv().await {
        let to = stanza.to.clone();
        match transport.send(stanza).await {
            Ok(()) => {
                delivered += 1;
                debug!("Sent stanza to {}", to);
            }
            Err(e) => error!("Failed to send stanza to {}: {}", to, e),
        }
    }

    info!("Outbound queue closed after {} stanza(s)", delivered);
    delivered
}

/// Counters reported when a worker stops.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Stanzas taken off the queue.
    pub received: usize,
    /// Stanzas that produced a reply.
    pub replied: usize,
    /// Stanzas that ended in an error.
    pub failed: usize,
}

/// Consumes the inbound queue and runs each stanza through the
/// [`Orchestrator`].
pub struct Worker {
    orchestrator: Arc<Orchestrator>,
    inbound: mpsc::UnboundedReceiver<InboundStanza>,
    stats: WorkerStats,
}

impl Worker {
    /// Create a worker over an inbound queue.
    pub fn new(
        orchestrator: Arc<Orchestrator>,
        inbound: mpsc::UnboundedReceiver<InboundStanza>,
    ) -> Self {
        Self {
            orchestrator,
            inbound,
            stats: WorkerStats::default(),
        }
    }

    /// Handle one stanza and log the result. Errors never stop the worker.
    async fn process(&mut self, stanza: InboundStanza) {
        self.stats.received += 1;
        let from = stanza.from.clone();

        match self.orchestrator.handle(stanza).await {
            Ok(HandleOutcome::Replied { deliveries }) => {
                self.stats.replied += 1;
                let sent = deliveries.iter().filter(|d| d.is_sent()).count();
                debug!("Replied to {} ({}/{} delivered)", from, sent, deliveries.len());
            }
            Ok(HandleOutcome::EchoedPlain) => {
                self.stats.replied += 1;
                debug!("Echoed unencrypted message from {}", from);
            }
            Ok(HandleOutcome::Ignored(reason)) => {
                debug!("Skipped message from {}: {:?}", from, reason);
            }
            Ok(HandleOutcome::BackendFailed) => {
                warn!("Backend failure while answering {}", from);
            }
            Err(e) => {
                self.stats.failed += 1;
                // Log but continue processing
                warn!("Error processing message from {}: {}", from, e);
            }
        }
    }

    /// Run until the inbound queue is closed.
    pub async fn run(mut self) -> WorkerStats {
        info!("Starting relay worker");

        while let Some(stanza) = self.inbound.recv().await {
            self.process(stanza).await;
        }

        info!("Inbound queue closed");
        self.stats
    }

    /// Run until the inbound queue is closed or `shutdown_signal` completes.
    ///
    /// A stanza already being handled is finished first.
    pub async fn run_with_shutdown<S>(mut self, shutdown_signal: S) -> WorkerStats
    where
        S: Future<Output = ()> + Send,
    {
        info!("Starting relay worker (graceful shutdown enabled)");

        tokio::pin!(shutdown_signal);

        loop {
            tokio::select! {
                biased;

                () = &mut shutdown_signal => {
                    info!("Shutdown signal received, stopping relay worker");
                    return self.stats;
                }

                stanza = self.inbound.recv() => {
                    match stanza {
                        Some(stanza) => self.process(stanza).await,
                        None => {
                            info!("Inbound queue closed");
                            return self.stats;
                        }
                    }
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{Jid, MessageKind};

    fn stanza(text: &str) -> OutboundStanza {
        OutboundStanza::plain(
            Jid::parse("alice@example.org/phone").unwrap(),
            MessageKind::Chat,
            text,
        )
    }

    #[tokio::test]
    async fn test_channel_sender_preserves_order() {
        let (sender, mut rx) = ChannelSender::channel();
        sender.send(stanza("one")).await.unwrap();
        sender.send(stanza("two")).await.unwrap();

        assert_eq!(rx.recv().await.unwrap().plain_text(), Some("one"));
        assert_eq!(rx.recv().await.unwrap().plain_text(), Some("two"));
    }

    #[tokio::test]
    async fn test_channel_sender_closed() {
        let (sender, rx) = ChannelSender::channel();
        drop(rx);
        assert_eq!(sender.send(stanza("lost")).await, Err(SendError::Closed));
    }
}
