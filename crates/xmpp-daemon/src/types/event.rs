//! Events pushed by the daemon over SSE.

use relay_core::InboundStanza;
use serde::{Deserialize, Serialize};

/// Payload of a `receive` event.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReceiveEvent {
    /// Account the stanza was received on.
    #[serde(default)]
    pub account: Option<String>,
    /// The received message stanza.
    pub stanza: InboundStanza,
}
