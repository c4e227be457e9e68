//! Server-Sent Events (SSE) client for receiving stanzas.

use std::pin::Pin;
use std::task::{Context, Poll};
use std::time::Duration;

use futures::stream::Stream;
use relay_core::InboundStanza;
use reqwest_eventsource::{Event, EventSource, RequestBuilderExt};
use tracing::{debug, error, info, warn};

use crate::config::DaemonConfig;
use crate::error::DaemonError;
use crate::types::ReceiveEvent;
use crate::XmppClient;

/// Retry policy for the event stream.
#[derive(Debug, Clone)]
pub struct ReconnectConfig {
    /// Maximum number of retries (None = infinite).
    pub max_retries: Option<u32>,
    /// Initial delay before first retry.
    pub initial_delay: Duration,
    /// Maximum delay between retries.
    pub max_delay: Duration,
    /// Backoff multiplier for each retry.
    pub backoff_multiplier: f64,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            max_retries: None,
            initial_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

impl ReconnectConfig {
    /// Calculate delay for a given attempt number.
    pub fn delay_for_attempt(&self, attempt: u32) -> Duration {
        let delay_ms = self.initial_delay.as_millis() as f64
            * self.backoff_multiplier.powi(attempt as i32);
        let delay = Duration::from_millis(delay_ms as u64);
        delay.min(self.max_delay)
    }

    /// Check if we should retry after the given number of attempts.
    pub fn should_retry(&self, attempts: u32) -> bool {
        self.max_retries.map_or(true, |max| attempts < max)
    }

    /// Retry policy understood by the underlying event source.
    fn retry_policy(&self) -> reqwest_eventsource::retry::ExponentialBackoff {
        reqwest_eventsource::retry::ExponentialBackoff::new(
            self.initial_delay,
            self.backoff_multiplier,
            Some(self.max_delay),
            self.max_retries.map(|n| n as usize),
        )
    }
}

/// A stream of inbound stanzas from the daemon.
///
/// Transient connection errors are retried by the event source according
/// to the [`ReconnectConfig`]; they still surface as `Err` items so the
/// caller can log them.
pub struct StanzaStream {
    event_source: EventSource,
    reconnect_attempts: u32,
}

impl StanzaStream {
    /// Open the event stream for a client.
    pub fn new(client: &XmppClient) -> Result<Self, DaemonError> {
        Self::with_reconnect(client, ReconnectConfig::default())
    }

    /// Open the event stream with a custom retry policy.
    pub fn with_reconnect(
        client: &XmppClient,
        reconnect_config: ReconnectConfig,
    ) -> Result<Self, DaemonError> {
        Self::open(client.config(), &reconnect_config)
    }

    fn open(config: &DaemonConfig, reconnect_config: &ReconnectConfig) -> Result<Self, DaemonError> {
        let url = config.events_url();
        info!("Creating SSE connection to {}", url);

        // SSE connections are long-lived; this client has no timeout.
        let sse_client = reqwest::Client::builder()
            .build()
            .map_err(DaemonError::Http)?;

        let mut event_source = sse_client
            .get(&url)
            .eventsource()
            .map_err(|e| DaemonError::Sse(e.to_string()))?;
        event_source.set_retry_policy(Box::new(reconnect_config.retry_policy()));

        Ok(Self {
            event_source,
            reconnect_attempts: 0,
        })
    }

    /// Close the underlying connection.
    pub fn close(&mut self) {
        self.event_source.close();
    }
}

impl Stream for StanzaStream {
    type Item = Result<InboundStanza, DaemonError>;

    fn poll_next(mut self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        loop {
            match Pin::new(&mut self.event_source).poll_next(cx) {
                Poll::Ready(Some(Ok(event))) => match event {
                    Event::Open => {
                        debug!("SSE connection opened");
                        self.reconnect_attempts = 0;
                        continue;
                    }
                    Event::Message(msg) => {
                        if msg.event != "receive" {
                            debug!("Ignoring SSE event type: {}", msg.event);
                            continue;
                        }
                        match serde_json::from_str::<ReceiveEvent>(&msg.data) {
                            Ok(event) => return Poll::Ready(Some(Ok(event.stanza))),
                            Err(e) => {
                                warn!("Failed to parse SSE event data: {}", e);
                                debug!("Raw data: {}", msg.data);
                                continue;
                            }
                        }
                    }
                },
                Poll::Ready(Some(Err(e))) => {
                    self.reconnect_attempts += 1;
                    error!("SSE error (attempt {}): {}", self.reconnect_attempts, e);
                    return Poll::Ready(Some(Err(DaemonError::Sse(e.to_string()))));
                }
                Poll::Ready(None) => {
                    info!("SSE stream ended");
                    return Poll::Ready(None);
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}

/// Open the inbound stanza stream for a client.
pub fn subscribe(client: &XmppClient) -> Result<StanzaStream, DaemonError> {
    StanzaStream::new(client)
}

/// Open the inbound stanza stream with a custom retry policy.
pub fn subscribe_with_reconnect(
    client: &XmppClient,
    reconnect_config: ReconnectConfig,
) -> Result<StanzaStream, DaemonError> {
    StanzaStream::with_reconnect(client, reconnect_config)
}
