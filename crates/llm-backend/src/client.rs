//! HttpBackend implementation.

use async_trait::async_trait;
use relay_core::{Backend, BackendError, ConversationSession};
use reqwest::Client;
use serde_json::{Map, Value};
use tracing::{debug, info, warn};

use crate::api_types::{completion_request, extract_reply, health_request};
use crate::config::BackendConfig;

/// A backend that posts the whole prompt buffer to a local generation server.
///
/// The server is stateless from the relay's point of view; the session's
/// prompt buffer is the entire context. Generation calls carry no timeout.
pub struct HttpBackend {
    client: Client,
    config: BackendConfig,
}

impl HttpBackend {
    /// Create a new HttpBackend with the given configuration.
    pub fn new(config: BackendConfig) -> Result<Self, BackendError> {
        let client = Client::builder()
            .build()
            .map_err(|e| BackendError::Unavailable(format!("Failed to create HTTP client: {}", e)))?;

        info!(
            "HttpBackend initialized: mode={}, endpoint={}",
            config.mode,
            config.endpoint()
        );

        Ok(Self { client, config })
    }

    /// Create an HttpBackend from environment variables.
    ///
    /// See [`BackendConfig::from_env`] for the variables read.
    pub fn from_env() -> Result<Self, BackendError> {
        let config =
            BackendConfig::from_env().map_err(|e| BackendError::Unavailable(e.to_string()))?;
        Self::new(config)
    }

    /// Get the configuration.
    pub fn config(&self) -> &BackendConfig {
        &self.config
    }

    async fn post(&self, body: &Map<String, Value>) -> Result<Value, BackendError> {
        let url = self.config.endpoint();

        let response = self
            .client
            .post(&url)
            .json(body)
            .send()
            .await
            .map_err(|e| BackendError::Network(format!("Failed to send request: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(BackendError::Http {
                status: status.as_u16(),
                body,
            });
        }

        response
            .json()
            .await
            .map_err(|e| BackendError::Protocol(format!("Failed to parse response: {}", e)))
    }
}

#[async_trait]
impl Backend for HttpBackend {
    async fn complete(&self, session: &ConversationSession) -> Result<String, BackendError> {
        let body = completion_request(session);
        debug!(
            "Requesting completion for {} ({} prompt chars)",
            session.participant(),
            session.prompt_buffer().chars().count()
        );

        let response = self.post(&body).await?;
        let reply = extract_reply(self.config.mode, response)?;

        debug!("Backend replied with {} chars", reply.chars().count());
        Ok(reply)
    }

    async fn health_check(&self) -> bool {
        match self.post(&health_request(self.config.mode)).await {
            Ok(_) => true,
            Err(e) => {
                warn!("Backend health check failed: {}", e);
                false
            }
        }
    }

    fn name(&self) -> &str {
        "HttpBackend"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_backend_name() {
        let backend = HttpBackend::new(BackendConfig::default()).unwrap();
        assert_eq!(backend.name(), "HttpBackend");
        assert_eq!(backend.config().api_host, "http://127.0.0.1:8080");
    }
}
