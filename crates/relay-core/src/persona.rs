//! Persona (character card) configuration.

use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use sha2::{Digest, Sha256};

use crate::error::ConfigError;
use crate::session::ConversationSession;
use crate::template::TemplateFormat;

/// Default persona file path.
pub const DEFAULT_PERSONA_PATH: &str = "config/defaults.json";

/// Static description of the assistant, loaded once per process.
///
/// Keys other than the four known ones (sampling parameters such as
/// `temperature` or `stop`) are kept verbatim and forwarded to the backend.
///
/// # Example
///
/// ```rust
/// use relay_core::{PersonaConfig, TemplateFormat};
///
/// let persona = PersonaConfig::from_json(r#"{
///     "format": "chatml",
///     "name": "Aria",
///     "max_context_length": 2048,
///     "prompt": "<|im_start|>user\n",
///     "temperature": 0.7
/// }"#).unwrap();
///
/// assert_eq!(persona.format, TemplateFormat::ChatMl);
/// assert_eq!(persona.parameters["temperature"], 0.7);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PersonaConfig {
    /// Prompt template family.
    pub format: TemplateFormat,
    /// Assistant name, used by formats that address it directly.
    pub name: String,
    /// Context window size forwarded to the backend.
    pub max_context_length: u32,
    /// Seed prompt every new session starts with.
    pub prompt: String,
    /// Additional request parameters.
    #[serde(flatten)]
    pub parameters: Map<String, Value>,
}

impl PersonaConfig {
    /// Create a persona with no extra parameters.
    pub fn new(format: TemplateFormat, name: impl Into<String>, prompt: impl Into<String>) -> Self {
        Self {
            format,
            name: name.into(),
            max_context_length: 2048,
            prompt: prompt.into(),
            parameters: Map::new(),
        }
    }

    /// Set the context window size.
    pub fn with_max_context_length(mut self, max_context_length: u32) -> Self {
        self.max_context_length = max_context_length;
        self
    }

    /// Add a pass-through request parameter.
    pub fn with_parameter(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.parameters.insert(key.into(), value.into());
        self
    }

    /// Parse a persona from JSON text.
    ///
    /// An unknown `format` is reported as [`ConfigError::UnknownFormat`]
    /// rather than a generic parse error.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let value: Value = serde_json::from_str(json)?;

        match value.get("format") {
            Some(Value::String(format)) => {
                format.parse::<TemplateFormat>()?;
            }
            Some(other) => {
                return Err(ConfigError::Invalid(format!(
                    "\"format\" must be a string, got {}",
                    other
                )))
            }
            None => {}
        }

        let persona: Self = serde_json::from_value(value)?;
        persona.validate()?;
        Ok(persona)
    }

    /// Load a persona from a JSON file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.name.trim().is_empty() {
            return Err(ConfigError::Invalid("persona name must not be empty".to_string()));
        }
        if self.max_context_length == 0 {
            return Err(ConfigError::Invalid(
                "max_context_length must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Stable SHA-256 fingerprint of the seed prompt, for logs.
    pub fn fingerprint(&self) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.prompt.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    /// A fresh session seeded from this persona.
    pub fn new_session(&self, participant: impl Into<String>) -> ConversationSession {
        ConversationSession::seeded(participant.into(), self)
    }
}
