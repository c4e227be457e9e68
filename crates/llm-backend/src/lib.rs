//! HTTP text generation backends.
//!
//! [`HttpBackend`] talks to a local generation server in one of two
//! conventions, chosen once at start:
//!
//! - [`BackendMode::Completion`] - `POST /completion`, reply in `content`
//! - [`BackendMode::Generate`] - `POST /api/v1/generate`, reply in `results[0].text`
//!
//! The request body is the persona's pass-through parameters plus the
//! session's prompt buffer and context length.
//!
//! # Usage
//!
//! ```rust,no_run
//! use llm_backend::{BackendConfig, BackendMode, HttpBackend};
//! use relay_core::Backend;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), Box<dyn std::error::Error>> {
//!     let config = BackendConfig::builder()
//!         .api_host("http://127.0.0.1:5001")
//!         .mode(BackendMode::Generate)
//!         .build();
//!     let backend = HttpBackend::new(config)?;
//!     assert!(backend.health_check().await);
//!     Ok(())
//! }
//! ```

mod api_types;
mod client;
mod config;

pub use api_types::{completion_request, health_request};
pub use client::HttpBackend;
pub use config::{BackendConfig, BackendConfigBuilder, BackendMode, DEFAULT_API_HOST};

// Re-export relay-core types for convenience
pub use relay_core::{async_trait, Backend, BackendError};
