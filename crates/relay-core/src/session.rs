//! Per-participant conversation sessions.
//!
//! Sessions are keyed by bare identity and live for the process lifetime,
//! unless a capacity limit is set, in which case the least recently used
//! session is evicted. Each session sits behind its own async mutex so a
//! whole turn (user append, backend call, assistant append) can hold it.

use std::sync::Arc;

use indexmap::IndexMap;
use serde_json::{Map, Value};
use tokio::sync::Mutex;
use tracing::debug;

use crate::persona::PersonaConfig;
use crate::template::TemplateFormat;

/// Conversation state for one participant.
#[derive(Debug, Clone, PartialEq)]
pub struct ConversationSession {
    participant: String,
    prompt_buffer: String,
    template_format: TemplateFormat,
    persona_name: String,
    max_context_length: u32,
    parameters: Map<String, Value>,
}

impl ConversationSession {
    pub(crate) fn seeded(participant: String, persona: &PersonaConfig) -> Self {
        Self {
            participant,
            prompt_buffer: persona.prompt.clone(),
            template_format: persona.format,
            persona_name: persona.name.clone(),
            max_context_length: persona.max_context_length,
            parameters: persona.parameters.clone(),
        }
    }

    /// Bare identity this session belongs to.
    pub fn participant(&self) -> &str {
        &self.participant
    }

    /// Every turn so far, starting with the seed prompt.
    pub fn prompt_buffer(&self) -> &str {
        &self.prompt_buffer
    }

    /// Template format, fixed at creation.
    pub fn template_format(&self) -> TemplateFormat {
        self.template_format
    }

    /// Assistant name from the persona.
    pub fn persona_name(&self) -> &str {
        &self.persona_name
    }

    /// Context window size forwarded to the backend.
    pub fn max_context_length(&self) -> u32 {
        self.max_context_length
    }

    /// Pass-through request parameters from the persona.
    pub fn parameters(&self) -> &Map<String, Value> {
        &self.parameters
    }

    pub(crate) fn buffer_mut(&mut self) -> &mut String {
        &mut self.prompt_buffer
    }
}

/// Shared handle to one session.
pub type SessionHandle = Arc<Mutex<ConversationSession>>;

/// Owns every participant's session.
///
/// # Example
///
/// ```rust
/// use relay_core::{PersonaConfig, SessionStore, TemplateFormat};
///
/// #[tokio::main(flavor = "current_thread")]
/// async fn main() {
///     let persona = PersonaConfig::new(TemplateFormat::Raw, "Aria", "seed\n");
///     let store = SessionStore::new(persona);
///
///     let handle = store.get_or_create("alice@example.org").await;
///     assert_eq!(handle.lock().await.prompt_buffer(), "seed\n");
/// }
/// ```
#[derive(Debug)]
pub struct SessionStore {
    persona: Arc<PersonaConfig>,
    /// Insertion order doubles as recency order for eviction.
    sessions: Mutex<IndexMap<String, SessionHandle>>,
    max_sessions: Option<usize>,
}

impl SessionStore {
    /// Create an unbounded store seeded from `persona`.
    pub fn new(persona: PersonaConfig) -> Self {
        Self {
            persona: Arc::new(persona),
            sessions: Mutex::new(IndexMap::new()),
            max_sessions: None,
        }
    }

    /// Create a store that keeps at most `max_sessions` sessions.
    pub fn with_capacity_limit(persona: PersonaConfig, max_sessions: usize) -> Self {
        Self {
            max_sessions: Some(max_sessions.max(1)),
            ..Self::new(persona)
        }
    }

    /// The persona new sessions are seeded from.
    pub fn persona(&self) -> &PersonaConfig {
        &self.persona
    }

    /// Return the participant's session, creating it from the persona if absent.
    pub async fn get_or_create(&self, participant: &str) -> SessionHandle {
        let mut sessions = self.sessions.lock().await;

        let handle = match sessions.shift_remove(participant) {
            Some(handle) => handle,
            None => {
                debug!("Creating session for {}", participant);
                Arc::new(Mutex::new(self.persona.new_session(participant)))
            }
        };
        sessions.insert(participant.to_string(), handle.clone());

        if let Some(max) = self.max_sessions {
            while sessions.len() > max {
                if let Some((evicted, _)) = sessions.shift_remove_index(0) {
                    debug!("Evicted session for {}", evicted);
                }
            }
        }

        handle
    }

    /// Replace the participant's session with a fresh one and return a copy of it.
    ///
    /// Waits for any turn currently holding the session to finish.
    pub async fn reset(&self, participant: &str) -> ConversationSession {
        let handle = self.get_or_create(participant).await;
        let mut session = handle.lock().await;
        *session = self.persona.new_session(participant);
        debug!("Reset session for {}", participant);
        session.clone()
    }

    /// A copy of the participant's session, if one exists.
    pub async fn snapshot(&self, participant: &str) -> Option<ConversationSession> {
        let handle = self.sessions.lock().await.get(participant).cloned()?;
        let session = handle.lock().await;
        Some(session.clone())
    }

    /// Number of sessions currently held.
    pub async fn len(&self) -> usize {
        self.sessions.lock().await.len()
    }

    /// Whether no session exists yet.
    pub async fn is_empty(&self) -> bool {
        self.sessions.lock().await.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::template::{append_assistant_turn, append_user_turn};

    fn store() -> SessionStore {
        SessionStore::new(PersonaConfig::new(
            TemplateFormat::ChatMl,
            "Aria",
            "<|im_start|>user\n",
        ))
    }

    #[tokio::test]
    async fn test_get_or_create_is_lazy_and_stable() {
        let store = store();
        assert!(store.is_empty().await);

        let first = store.get_or_create("alice@example.org").await;
        append_user_turn(&mut *first.lock().await, "Hello");

        let again = store.get_or_create("alice@example.org").await;
        assert!(Arc::ptr_eq(&first, &again));
        assert!(again.lock().await.prompt_buffer().contains("Hello"));
        assert_eq!(store.len().await, 1);
    }

    #[tokio::test]
    async fn test_sessions_are_separate() {
        let store = store();
        let alice = store.get_or_create("alice@example.org").await;
        append_user_turn(&mut *alice.lock().await, "from alice");

        let bob = store.snapshot("bob@example.org").await;
        assert!(bob.is_none());

        let bob = store.get_or_create("bob@example.org").await;
        assert_eq!(bob.lock().await.prompt_buffer(), "<|im_start|>user\n");
    }

    #[tokio::test]
    async fn test_reset_is_idempotent() {
        let store = store();
        let handle = store.get_or_create("alice@example.org").await;
        {
            let mut session = handle.lock().await;
            append_user_turn(&mut session, "Hello");
            append_assistant_turn(&mut session, "Hi!");
        }

        let first = store.reset("alice@example.org").await;
        let second = store.reset("alice@example.org").await;

        assert_eq!(first.prompt_buffer(), "<|im_start|>user\n");
        assert_eq!(second.prompt_buffer(), "<|im_start|>user\n");
        assert_eq!(first, second);
        assert_eq!(handle.lock().await.prompt_buffer(), "<|im_start|>user\n");
    }

    #[tokio::test]
    async fn test_reset_keeps_template_format() {
        let store = store();
        let session = store.reset("carol@example.org").await;
        assert_eq!(session.template_format(), TemplateFormat::ChatMl);
        assert_eq!(session.persona_name(), "Aria");
    }

    #[tokio::test]
    async fn test_lru_eviction() {
        let store = SessionStore::with_capacity_limit(
            PersonaConfig::new(TemplateFormat::Raw, "Aria", ""),
            2,
        );

        store.get_or_create("a@x").await;
        store.get_or_create("b@x").await;
        store.get_or_create("a@x").await;
        store.get_or_create("c@x").await;

        assert_eq!(store.len().await, 2);
        assert!(store.snapshot("b@x").await.is_none());
        assert!(store.snapshot("a@x").await.is_some());
        assert!(store.snapshot("c@x").await.is_some());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_turns_from_one_participant_do_not_interleave() {
        let store = Arc::new(store());
        let mut tasks = Vec::new();

        for i in 0..16 {
            let store = store.clone();
            tasks.push(tokio::spawn(async move {
                let handle = store.get_or_create("alice@example.org").await;
                let mut session = handle.lock().await;
                append_user_turn(&mut session, &format!("q{}", i));
                tokio::task::yield_now().await;
                append_assistant_turn(&mut session, &format!("a{}", i));
            }));
        }
        for task in tasks {
            task.await.unwrap();
        }

        let buffer = store.snapshot("alice@example.org").await.unwrap();
        for i in 0..16 {
            let turn = format!(
                "q{i}<|im_end|>\n<|im_start|>assistant\na{i}<|im_end|>\n<|im_start|>user\n"
            );
            assert!(buffer.prompt_buffer().contains(&turn), "turn {} interleaved", i);
        }
    }
}
