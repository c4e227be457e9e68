//! Delayed backend - wraps another backend with artificial latency.

use std::time::Duration;

use async_trait::async_trait;
use relay_core::{Backend, BackendError, ConversationSession};
use tokio::time::sleep;

/// A backend that wraps another backend and sleeps before every completion.
///
/// Useful for checking that turns from one participant do not interleave
/// while a slow generation is in flight.
pub struct DelayedBackend<B: Backend> {
    inner: B,
    delay: Duration,
}

impl<B: Backend> DelayedBackend<B> {
    /// Wrap `inner` with the given delay.
    pub fn new(inner: B, delay: Duration) -> Self {
        Self { inner, delay }
    }

    /// Wrap `inner` with a delay in milliseconds.
    pub fn with_millis(inner: B, millis: u64) -> Self {
        Self::new(inner, Duration::from_millis(millis))
    }
}

#[async_trait]
impl<B: Backend> Backend for DelayedBackend<B> {
    async fn complete(&self, session: &ConversationSession) -> Result<String, BackendError> {
        sleep(self.delay).await;
        self.inner.complete(session).await
    }

    async fn health_check(&self) -> bool {
        self.inner.health_check().await
    }

    fn name(&self) -> &str {
        "DelayedBackend"
    }
}
