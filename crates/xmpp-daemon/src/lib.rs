//! XMPP sidecar daemon client library.
//!
//! The relay does not speak XMPP or OMEMO itself. A sidecar daemon holds the
//! XMPP connection and the OMEMO key store and exposes them over HTTP:
//!
//! - JSON-RPC 2.0 on `POST /api/v1/rpc` with the methods `login`, `join_room`, `encrypt`,
//!   `decrypt`, `trust` and `send`
//! - inbound stanzas as SSE `receive` events on `GET /api/v1/events`
//! - a health check on `GET /api/v1/check`
//!
//! Negotiation failures come back as RPC errors whose `data` object carries
//! a `kind` tag (`undecided`, `missing_bundle`, `exhausted`, ...); the client
//! maps them onto the typed errors of `omemo-gateway`.
//!
//! # Example
//!
//! ```no_run
//! use futures::StreamExt;
//! use xmpp_daemon::{DaemonConfig, XmppClient};
//!
//! # async fn example() -> Result<(), xmpp_daemon::DaemonError> {
//! let config = DaemonConfig::with_account("http://localhost:8090", "bot@example.org");
//! let client = XmppClient::connect(config).await?;
//!
//! let mut stanzas = xmpp_daemon::subscribe(&client)?;
//! while let Some(result) = stanzas.next().await {
//!     match result {
//!         Ok(stanza) => println!("From {}: {:?}", stanza.from, stanza.body),
//!         Err(e) => eprintln!("Error: {}", e),
//!     }
//! }
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod error;
pub mod sse;
pub mod types;

pub use client::XmppClient;
pub use config::{DaemonConfig, DEFAULT_DAEMON_URL, DEFAULT_REQUEST_TIMEOUT};
pub use error::DaemonError;
pub use sse::{subscribe, subscribe_with_reconnect, ReconnectConfig, StanzaStream};
pub use types::*;
