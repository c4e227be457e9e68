//! Backends with canned replies.

use std::collections::VecDeque;

use async_trait::async_trait;
use relay_core::{Backend, BackendError, ConversationSession};
use tokio::sync::Mutex;

/// A backend that always returns the same raw reply.
#[derive(Debug, Clone)]
pub struct StaticBackend {
    reply: String,
    healthy: bool,
}

impl StaticBackend {
    /// Create a backend replying with `reply`.
    pub fn new(reply: impl Into<String>) -> Self {
        Self {
            reply: reply.into(),
            healthy: true,
        }
    }

    /// A backend whose health check fails.
    pub fn unhealthy() -> Self {
        Self {
            reply: String::new(),
            healthy: false,
        }
    }
}

#[async_trait]
impl Backend for StaticBackend {
    async fn complete(&self, _session: &ConversationSession) -> Result<String, BackendError> {
        if !self.healthy {
            return Err(BackendError::Network("connection refused".to_string()));
        }
        Ok(self.reply.clone())
    }

    async fn health_check(&self) -> bool {
        self.healthy
    }

    fn name(&self) -> &str {
        "StaticBackend"
    }
}

/// A backend that plays back a queue of results and records every prompt.
///
/// Once the queue is empty it answers with a protocol error.
///
/// # Example
///
/// ```rust
/// use mock_relay::ScriptedBackend;
///
/// let backend = ScriptedBackend::new()
///     .reply("Hi there!<|im_end|>")
///     .fail(relay_core::BackendError::Protocol("no content".into()));
/// ```
#[derive(Debug, Default)]
pub struct ScriptedBackend {
    script: Mutex<VecDeque<Result<String, BackendError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    /// Create a backend with an empty script.
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a successful raw reply.
    pub fn reply(mut self, raw: impl Into<String>) -> Self {
        self.script.get_mut().push_back(Ok(raw.into()));
        self
    }

    /// Queue a failure.
    pub fn fail(mut self, error: BackendError) -> Self {
        self.script.get_mut().push_back(Err(error));
        self
    }

    /// Every prompt buffer this backend was asked to continue, in order.
    pub async fn prompts(&self) -> Vec<String> {
        self.prompts.lock().await.clone()
    }

    /// Number of completion calls so far.
    pub async fn calls(&self) -> usize {
        self.prompts.lock().await.len()
    }
}

#[async_trait]
impl Backend for ScriptedBackend {
    async fn complete(&self, session: &ConversationSession) -> Result<String, BackendError> {
        self.prompts
            .lock()
            .await
            .push(session.prompt_buffer().to_string());

        self.script
            .lock()
            .await
            .pop_front()
            .unwrap_or_else(|| Err(BackendError::Protocol("script exhausted".to_string())))
    }

    fn name(&self) -> &str {
        "ScriptedBackend"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{PersonaConfig, TemplateFormat};

    fn session() -> ConversationSession {
        PersonaConfig::new(TemplateFormat::Raw, "Aria", "seed").new_session("a@x")
    }

    #[tokio::test]
    async fn test_static_backend() {
        let backend = StaticBackend::new("hello");
        assert_eq!(backend.complete(&session()).await.unwrap(), "hello");
        assert!(backend.health_check().await);
        assert!(!StaticBackend::unhealthy().health_check().await);
    }

    #[tokio::test]
    async fn test_scripted_backend_plays_in_order() {
        let backend = ScriptedBackend::new()
            .reply("one")
            .fail(BackendError::Http {
                status: 500,
                body: String::new(),
            })
            .reply("three");

        assert_eq!(backend.complete(&session()).await.unwrap(), "one");
        assert!(backend.complete(&session()).await.is_err());
        assert_eq!(backend.complete(&session()).await.unwrap(), "three");
        assert!(matches!(
            backend.complete(&session()).await,
            Err(BackendError::Protocol(_))
        ));
        assert_eq!(backend.calls().await, 4);
        assert_eq!(backend.prompts().await[0], "seed");
    }
}
