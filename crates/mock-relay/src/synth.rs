//! A synthesizer that records what it was asked to say.

use async_trait::async_trait;
use relay_core::{SynthesisError, Synthesizer};
use tokio::sync::Mutex;

/// Records every synthesis request and answers with a fixed artifact link.
#[derive(Debug)]
pub struct RecordingSynthesizer {
    artifact: String,
    failing: bool,
    requests: Mutex<Vec<(Vec<String>, Vec<String>)>>,
}

impl RecordingSynthesizer {
    /// Create a synthesizer that always returns `artifact`.
    pub fn new(artifact: impl Into<String>) -> Self {
        Self {
            artifact: artifact.into(),
            failing: false,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// A synthesizer that records the request and then fails.
    pub fn failing() -> Self {
        Self {
            failing: true,
            ..Self::new("")
        }
    }

    /// Every `(segments, speakers)` request so far.
    pub async fn requests(&self) -> Vec<(Vec<String>, Vec<String>)> {
        self.requests.lock().await.clone()
    }
}

#[async_trait]
impl Synthesizer for RecordingSynthesizer {
    async fn synthesize(
        &self,
        segments: &[String],
        speakers: &[String],
    ) -> Result<String, SynthesisError> {
        self.requests
            .lock()
            .await
            .push((segments.to_vec(), speakers.to_vec()));

        if self.failing {
            return Err(SynthesisError::NoArtifact);
        }
        Ok(self.artifact.clone())
    }

    fn name(&self) -> &str {
        "RecordingSynthesizer"
    }
}
