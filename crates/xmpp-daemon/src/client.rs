//! Sidecar daemon HTTP client.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use omemo_gateway::{
    DecryptionError, NegotiationError, Omemo, SendError, SkipMap, StanzaSender,
};
use relay_core::{EncryptedEnvelope, Jid, OutboundStanza};
use reqwest::Client;
use serde::{Deserialize, Serialize};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use crate::config::DaemonConfig;
use crate::error::DaemonError;
use crate::types::{
    DecryptParams, DecryptResult, EncryptParams, ErrorData, JoinRoomParams, LoginParams,
    SendParams, SendResult, TrustParams,
};

/// JSON-RPC 2.0 request structure.
#[derive(Debug, Serialize)]
struct RpcRequest<'a, T: Serialize> {
    jsonrpc: &'static str,
    method: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    params: Option<T>,
    id: u64,
}

/// JSON-RPC 2.0 response structure.
#[derive(Debug, Deserialize)]
struct RpcResponse<T> {
    result: Option<T>,
    error: Option<RpcError>,
}

/// JSON-RPC 2.0 error.
#[derive(Debug, Deserialize)]
struct RpcError {
    code: i32,
    message: String,
    #[serde(default)]
    data: Option<serde_json::Value>,
}

/// Client for the OMEMO-capable XMPP sidecar daemon.
///
/// The daemon owns the XMPP connection and the OMEMO key store; the client
/// drives it over JSON-RPC and implements [`Omemo`] and [`StanzaSender`] on
/// top of it.
#[derive(Clone)]
pub struct XmppClient {
    http: Client,
    config: DaemonConfig,
    request_id: Arc<AtomicU64>,
    connected: Arc<AtomicBool>,
}

impl XmppClient {
    /// Build a client without contacting the daemon.
    pub fn new(config: DaemonConfig) -> Result<Self, DaemonError> {
        let http = Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(DaemonError::Http)?;

        Ok(Self {
            http,
            config,
            request_id: Arc::new(AtomicU64::new(1)),
            connected: Arc::new(AtomicBool::new(false)),
        })
    }

    /// Connect to the daemon, failing if its health check does not pass.
    pub async fn connect(config: DaemonConfig) -> Result<Self, DaemonError> {
        let client = Self::new(config)?;

        if client.health_check().await? {
            info!("Connected to XMPP daemon at {}", client.config.base_url);
        } else {
            return Err(DaemonError::HealthCheckFailed);
        }

        Ok(client)
    }

    /// Check if the last health check succeeded.
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::SeqCst)
    }

    /// Perform a health check against the daemon.
    pub async fn health_check(&self) -> Result<bool, DaemonError> {
        let url = self.config.check_url();
        debug!("Health check: {}", url);

        match self.http.get(&url).send().await {
            Ok(resp) => {
                let ok = resp.status().is_success();
                self.connected.store(ok, Ordering::SeqCst);
                Ok(ok)
            }
            Err(e) => {
                self.connected.store(false, Ordering::SeqCst);
                Err(DaemonError::Http(e))
            }
        }
    }

    /// Ask the daemon to sign in to the account with `password`.
    ///
    /// Daemons that are already signed in accept this as a no-op.
    pub async fn login(&self, password: &str) -> Result<(), DaemonError> {
        let params = LoginParams {
            account: self.config.account.clone(),
            password: password.to_string(),
        };
        let _: serde_json::Value = self.rpc_call("login", Some(params)).await?;
        info!("Daemon signed in as {:?}", self.config.account);
        Ok(())
    }

    /// Join a multi-user chat room under `nick`.
    pub async fn join_room(&self, room: &str, nick: &str) -> Result<(), DaemonError> {
        let params = JoinRoomParams {
            account: self.config.account.clone(),
            room: room.to_string(),
            nick: nick.to_string(),
        };
        let _: serde_json::Value = self.rpc_call("join_room", Some(params)).await?;
        info!("Joined room {} as {}", room, nick);
        Ok(())
    }

    /// Encrypt `plaintext` for `recipients`, leaving out `skip`.
    pub async fn encrypt_message(
        &self,
        plaintext: &str,
        recipients: &[Jid],
        skip: &SkipMap,
    ) -> Result<EncryptedEnvelope, DaemonError> {
        let params = EncryptParams {
            account: self.config.account.clone(),
            plaintext: plaintext.to_string(),
            recipients: recipients.iter().map(Jid::bare).collect(),
            skip: skip.clone(),
        };
        self.rpc_call("encrypt", Some(params)).await
    }

    /// Decrypt an inbound envelope.
    pub async fn decrypt_message(
        &self,
        envelope: &EncryptedEnvelope,
        sender: &Jid,
        allow_untrusted: bool,
    ) -> Result<DecryptResult, DaemonError> {
        let params = DecryptParams {
            account: self.config.account.clone(),
            sender: sender.to_string(),
            envelope: envelope.clone(),
            allow_untrusted,
        };
        self.rpc_call("decrypt", Some(params)).await
    }

    /// Mark a device's identity key as trusted.
    pub async fn trust_device(
        &self,
        jid: &str,
        device: u32,
        identity_key: &str,
    ) -> Result<(), DaemonError> {
        let params = TrustParams {
            account: self.config.account.clone(),
            jid: jid.to_string(),
            device,
            identity_key: identity_key.to_string(),
        };
        // trust returns an empty result on success
        let _: serde_json::Value = self.rpc_call("trust", Some(params)).await?;
        Ok(())
    }

    /// Send a finished stanza.
    pub async fn send_stanza(&self, stanza: OutboundStanza) -> Result<SendResult, DaemonError> {
        let params = SendParams {
            account: self.config.account.clone(),
            stanza,
        };
        self.rpc_call("send", Some(params)).await
    }

    /// Poll the health endpoint every `interval` and log when the daemon
    /// goes away or comes back. Abort the handle to stop polling.
    pub fn start_health_monitor(&self, interval: Duration) -> JoinHandle<()> {
        let client = self.clone();

        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            // the first tick fires immediately; connect() just checked
            ticker.tick().await;
            let mut down_since: Option<u32> = None;

            loop {
                ticker.tick().await;

                let healthy = match client.health_check().await {
                    Ok(ok) => ok,
                    Err(e) => {
                        debug!("Daemon health check failed: {}", e);
                        false
                    }
                };

                down_since = match (healthy, down_since) {
                    (true, Some(misses)) => {
                        info!("Daemon reachable again after {} missed check(s)", misses);
                        None
                    }
                    (true, None) => None,
                    (false, None) => {
                        error!("Daemon at {} is not responding", client.config.base_url);
                        Some(1)
                    }
                    (false, Some(misses)) => {
                        warn!("Daemon still unreachable ({} missed checks)", misses + 1);
                        Some(misses + 1)
                    }
                };
            }
        })
    }

    /// Get the configuration.
    pub fn config(&self) -> &DaemonConfig {
        &self.config
    }

    /// Make a JSON-RPC call to the daemon.
    async fn rpc_call<P: Serialize, R: for<'de> Deserialize<'de>>(
        &self,
        method: &str,
        params: Option<P>,
    ) -> Result<R, DaemonError> {
        let id = self.request_id.fetch_add(1, Ordering::SeqCst);
        let url = self.config.rpc_url();

        let request = RpcRequest {
            jsonrpc: "2.0",
            method,
            params,
            id,
        };

        debug!("RPC call: {} (id={})", method, id);

        let response = self
            .http
            .post(&url)
            .json(&request)
            .send()
            .await
            .map_err(DaemonError::Http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(DaemonError::Connection(format!("HTTP {}: {}", status, body)));
        }

        let rpc_response: RpcResponse<R> = response.json().await.map_err(DaemonError::Http)?;

        if let Some(error) = rpc_response.error {
            let data = error
                .data
                .and_then(|value| serde_json::from_value::<ErrorData>(value).ok());
            debug!("RPC {} failed: {} ({:?})", method, error.message, data);
            return Err(DaemonError::Rpc {
                code: error.code,
                message: error.message,
                data,
            });
        }

        rpc_response.result.ok_or_else(|| DaemonError::Rpc {
            code: -1,
            message: "No result in response".to_string(),
            data: None,
        })
    }
}

impl std::fmt::Debug for XmppClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("XmppClient")
            .field("config", &self.config)
            .field("connected", &self.is_connected())
            .finish()
    }
}

#[async_trait]
impl Omemo for XmppClient {
    async fn encrypt(
        &self,
        plaintext: &str,
        recipients: &[Jid],
        skip: &SkipMap,
    ) -> Result<EncryptedEnvelope, NegotiationError> {
        self.encrypt_message(plaintext, recipients, skip)
            .await
            .map_err(DaemonError::into_negotiation_error)
    }

    async fn decrypt(
        &self,
        envelope: &EncryptedEnvelope,
        sender: &Jid,
        allow_untrusted: bool,
    ) -> Result<Option<String>, DecryptionError> {
        self.decrypt_message(envelope, sender, allow_untrusted)
            .await
            .map(|result| result.body)
            .map_err(DaemonError::into_decryption_error)
    }

    async fn trust(
        &self,
        jid: &str,
        device: u32,
        identity_key: &str,
    ) -> Result<(), NegotiationError> {
        self.trust_device(jid, device, identity_key)
            .await
            .map_err(DaemonError::into_negotiation_error)
    }
}

#[async_trait]
impl StanzaSender for XmppClient {
    async fn send(&self, stanza: OutboundStanza) -> Result<(), SendError> {
        let result = self
            .send_stanza(stanza)
            .await
            .map_err(DaemonError::into_send_error)?;
        if let Some(id) = result.id {
            debug!("Daemon accepted stanza {}", id);
        }
        Ok(())
    }
}
