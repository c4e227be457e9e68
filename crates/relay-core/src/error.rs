//! Error types shared by relay components.

use std::path::PathBuf;

use thiserror::Error;

/// Errors raised while loading or validating static configuration.
///
/// These are fatal at startup; they never occur per message.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// The persona file could not be read.
    #[error("failed to read {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// The persona file is not valid JSON or is missing required keys.
    #[error("invalid persona JSON: {0}")]
    Parse(#[from] serde_json::Error),

    /// The persona names a template format that has no table entry.
    #[error("unknown template format: {0}")]
    UnknownFormat(String),

    /// A value is present but unusable.
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// Errors returned by text-generation backends.
#[derive(Debug, Error)]
pub enum BackendError {
    /// The request never produced an HTTP response.
    #[error("network error: {0}")]
    Network(String),

    /// The backend answered with a non-success status.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    /// The response did not have the shape the selected backend mode expects.
    ///
    /// Usually means the wrong mode was selected for the running server.
    #[error("unexpected backend response: {0}")]
    Protocol(String),

    /// The backend is not available in this process (e.g. echo mode).
    #[error("backend unavailable: {0}")]
    Unavailable(String),
}

/// Errors returned by speech synthesizers.
#[derive(Debug, Error)]
pub enum SynthesisError {
    /// The synthesizer could not be started or talked to.
    #[error("synthesizer I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// The synthesizer ran but reported failure.
    #[error("synthesizer exited with {status}: {stderr}")]
    Failed { status: String, stderr: String },

    /// The synthesizer finished without naming an artifact.
    #[error("synthesizer produced no artifact")]
    NoArtifact,
}
