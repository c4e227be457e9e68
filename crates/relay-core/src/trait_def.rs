//! The text generation backend trait.

use async_trait::async_trait;

use crate::error::{BackendError, SynthesisError};
use crate::session::ConversationSession;

/// A text generation backend.
///
/// Implementations receive the session with the user turn and open fragment
/// already appended, and return the raw continuation. Cleanup and session
/// mutation are the caller's job.
///
/// # Example
///
/// ```rust
/// use relay_core::{async_trait, Backend, BackendError, ConversationSession};
///
/// struct Fixed;
///
/// #[async_trait]
/// impl Backend for Fixed {
///     async fn complete(&self, _session: &ConversationSession) -> Result<String, BackendError> {
///         Ok("Hello!".to_string())
///     }
///
///     fn name(&self) -> &str {
///         "Fixed"
///     }
/// }
/// ```
#[async_trait]
pub trait Backend: Send + Sync {
    /// Generate a continuation of the session's prompt buffer.
    async fn complete(&self, session: &ConversationSession) -> Result<String, BackendError>;

    /// Check if the backend is reachable.
    async fn health_check(&self) -> bool {
        true
    }

    /// Name of this backend, for logs.
    fn name(&self) -> &str;
}

/// A speech synthesizer.
///
/// Receives text already normalised and split into segments no longer than
/// the chunker's cap, plus reference voices, and returns a link or path to
/// the finished audio.
#[async_trait]
pub trait Synthesizer: Send + Sync {
    /// Render `segments` in order into one audio artifact.
    async fn synthesize(
        &self,
        segments: &[String],
        speakers: &[String],
    ) -> Result<String, SynthesisError>;

    /// Name of this synthesizer, for logs.
    fn name(&self) -> &str;
}
