//! Configuration for HttpBackend.

use std::env;
use std::fmt;
use std::str::FromStr;

use relay_core::ConfigError;

/// Default backend address.
pub const DEFAULT_API_HOST: &str = "http://127.0.0.1:8080";

/// Request/response convention of the text generation server.
///
/// Fixed at process start.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum BackendMode {
    /// `POST /completion`, reply in `content` (llama.cpp server style).
    #[default]
    Completion,
    /// `POST /api/v1/generate`, reply in `results[0].text` (KoboldCpp style).
    Generate,
}

impl BackendMode {
    /// Request path for this mode.
    pub fn path(self) -> &'static str {
        match self {
            Self::Completion => "/completion",
            Self::Generate => "/api/v1/generate",
        }
    }

    /// Name of the body field that limits generated tokens.
    pub fn token_limit_field(self) -> &'static str {
        match self {
            Self::Completion => "n_predict",
            Self::Generate => "max_length",
        }
    }
}

impl fmt::Display for BackendMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Completion => f.write_str("completion"),
            Self::Generate => f.write_str("generate"),
        }
    }
}

impl FromStr for BackendMode {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "completion" | "llama.cpp" | "llamacpp" => Ok(Self::Completion),
            "generate" | "kobold.cpp" | "koboldcpp" => Ok(Self::Generate),
            other => Err(ConfigError::Invalid(format!(
                "unknown backend mode {:?} (expected \"completion\" or \"generate\")",
                other
            ))),
        }
    }
}

/// Configuration for HttpBackend.
#[derive(Debug, Clone)]
pub struct BackendConfig {
    /// Base URL of the generation server, without trailing slash.
    pub api_host: String,

    /// Request/response convention.
    pub mode: BackendMode,
}

impl Default for BackendConfig {
    fn default() -> Self {
        Self {
            api_host: DEFAULT_API_HOST.to_string(),
            mode: BackendMode::default(),
        }
    }
}

impl BackendConfig {
    /// Create configuration from environment variables.
    ///
    /// Optional environment variables:
    /// - `RELAY_API_HOST` - Backend address (default: http://127.0.0.1:8080)
    /// - `RELAY_MODE` - `completion` or `generate` (default: completion)
    pub fn from_env() -> Result<Self, ConfigError> {
        let api_host = env::var("RELAY_API_HOST").unwrap_or_else(|_| DEFAULT_API_HOST.to_string());

        let mode = match env::var("RELAY_MODE") {
            Ok(value) => value.parse()?,
            Err(_) => BackendMode::default(),
        };

        Ok(Self::builder().api_host(api_host).mode(mode).build())
    }

    /// Create a new config builder.
    pub fn builder() -> BackendConfigBuilder {
        BackendConfigBuilder::default()
    }

    /// Full URL requests are posted to.
    pub fn endpoint(&self) -> String {
        format!("{}{}", self.api_host, self.mode.path())
    }
}

/// Builder for BackendConfig.
#[derive(Debug, Default)]
pub struct BackendConfigBuilder {
    config: BackendConfig,
}

impl BackendConfigBuilder {
    /// Set the backend address. A trailing slash is dropped.
    pub fn api_host(mut self, host: impl Into<String>) -> Self {
        let host = host.into();
        self.config.api_host = host.trim_end_matches('/').to_string();
        self
    }

    /// Set the request/response convention.
    pub fn mode(mut self, mode: BackendMode) -> Self {
        self.config.mode = mode;
        self
    }

    /// Build the configuration.
    pub fn build(self) -> BackendConfig {
        self.config
    }
}
