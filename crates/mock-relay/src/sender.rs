//! A transport that records everything it is asked to send.

use async_trait::async_trait;
use omemo_gateway::{SendError, StanzaSender};
use relay_core::OutboundStanza;
use tokio::sync::Mutex;

/// Records outbound stanzas instead of sending them.
#[derive(Debug, Default)]
pub struct RecordingSender {
    sent: Mutex<Vec<OutboundStanza>>,
    closed: bool,
}

impl RecordingSender {
    /// Create an open sender.
    pub fn new() -> Self {
        Self::default()
    }

    /// A sender whose transport is gone; every send fails.
    pub fn closed() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            closed: true,
        }
    }

    /// Every stanza sent so far, in order.
    pub async fn sent(&self) -> Vec<OutboundStanza> {
        self.sent.lock().await.clone()
    }

    /// Text of every plain stanza sent so far, in order.
    pub async fn plain_texts(&self) -> Vec<String> {
        self.sent
            .lock()
            .await
            .iter()
            .filter_map(|s| s.plain_text().map(str::to_string))
            .collect()
    }

    /// Number of encrypted stanzas sent so far.
    pub async fn encrypted_count(&self) -> usize {
        self.sent
            .lock()
            .await
            .iter()
            .filter(|s| s.is_encrypted())
            .count()
    }
}

#[async_trait]
impl StanzaSender for RecordingSender {
    async fn send(&self, stanza: OutboundStanza) -> Result<(), SendError> {
        if self.closed {
            return Err(SendError::Closed);
        }
        self.sent.lock().await.push(stanza);
        Ok(())
    }
}
