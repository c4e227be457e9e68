//! An in-memory stand-in for the encryption capability.

use std::collections::{BTreeMap, VecDeque};

use async_trait::async_trait;
use omemo_gateway::{DecryptionError, DeviceProblem, NegotiationError, Omemo, SkipMap};
use relay_core::{EncryptedEnvelope, EnvelopeKey, Jid};
use tokio::sync::Mutex;

const SEALED_PREFIX: &str = "sealed:";

/// Trust state of a device in the keyring.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeviceState {
    /// Encrypts normally.
    Trusted,
    /// Reported undecided until trusted.
    Undecided,
    /// Reported undecided even after being trusted.
    StuckUndecided,
    /// Has no published key bundle.
    NoBundle,
}

/// A recorded `encrypt` call.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptCall {
    pub plaintext: String,
    pub recipients: Vec<String>,
    pub skip: SkipMap,
}

#[derive(Debug, Default)]
struct KeyringState {
    devices: BTreeMap<String, BTreeMap<u32, DeviceState>>,
    encrypt_script: VecDeque<NegotiationError>,
    decrypt_script: VecDeque<DecryptionError>,
    trust_script: VecDeque<NegotiationError>,
    encrypt_calls: Vec<EncryptCall>,
    trust_calls: Vec<(String, u32, String)>,
    decrypt_flags: Vec<bool>,
}

/// A fake keyring that behaves like an encryption library with
/// programmable device problems.
///
/// `encrypt` reports the first undecided, non-skipped device; otherwise it
/// reports every non-skipped device without a bundle as exhausted;
/// otherwise it seals the plaintext for the remaining devices. Sealed
/// envelopes decrypt back to their plaintext.
///
/// # Example
///
/// ```rust
/// use mock_relay::{DeviceState, MemoryKeyring};
///
/// let keyring = MemoryKeyring::new(1)
///     .with_device("alice@example.org", 11, DeviceState::Undecided)
///     .with_device("alice@example.org", 12, DeviceState::NoBundle);
/// ```
#[derive(Debug)]
pub struct MemoryKeyring {
    own_device: u32,
    state: Mutex<KeyringState>,
}

impl MemoryKeyring {
    /// Create a keyring for our own device id.
    pub fn new(own_device: u32) -> Self {
        Self {
            own_device,
            state: Mutex::new(KeyringState::default()),
        }
    }

    /// Register a recipient device.
    pub fn with_device(mut self, jid: &str, device: u32, state: DeviceState) -> Self {
        self.state
            .get_mut()
            .devices
            .entry(jid.to_string())
            .or_default()
            .insert(device, state);
        self
    }

    /// Make the next `encrypt` call fail with `error` before any device checks.
    pub fn fail_encrypt(mut self, error: NegotiationError) -> Self {
        self.state.get_mut().encrypt_script.push_back(error);
        self
    }

    /// Make the next `decrypt` call fail with `error`.
    pub fn fail_decrypt(mut self, error: DecryptionError) -> Self {
        self.state.get_mut().decrypt_script.push_back(error);
        self
    }

    /// Make the next `trust` call fail with `error`. The device stays as it was.
    pub fn fail_trust(mut self, error: NegotiationError) -> Self {
        self.state.get_mut().trust_script.push_back(error);
        self
    }

    /// Seal `plaintext` the way `encrypt` does, for building inbound envelopes.
    pub fn seal(sender_device: u32, recipient_device: u32, plaintext: &str) -> EncryptedEnvelope {
        EncryptedEnvelope {
            sid: sender_device,
            iv: "aXY=".to_string(),
            keys: vec![EnvelopeKey {
                rid: recipient_device,
                jid: None,
                prekey: false,
                data: format!("key-{}", recipient_device),
            }],
            payload: Some(format!("{}{}", SEALED_PREFIX, plaintext)),
        }
    }

    /// An envelope with no body, as sent for key transport.
    pub fn heartbeat(sender_device: u32) -> EncryptedEnvelope {
        EncryptedEnvelope {
            sid: sender_device,
            iv: "aXY=".to_string(),
            keys: Vec::new(),
            payload: None,
        }
    }

    /// Recover the plaintext of an envelope produced by this keyring.
    pub fn unseal(envelope: &EncryptedEnvelope) -> Option<String> {
        envelope
            .payload
            .as_deref()
            .and_then(|p| p.strip_prefix(SEALED_PREFIX))
            .map(str::to_string)
    }

    /// Every `encrypt` call so far.
    pub async fn encrypt_calls(&self) -> Vec<EncryptCall> {
        self.state.lock().await.encrypt_calls.clone()
    }

    /// Every `trust` call so far, as `(jid, device, identity_key)`.
    pub async fn trust_calls(&self) -> Vec<(String, u32, String)> {
        self.state.lock().await.trust_calls.clone()
    }

    /// The `allow_untrusted` flag of every `decrypt` call so far.
    pub async fn decrypt_flags(&self) -> Vec<bool> {
        self.state.lock().await.decrypt_flags.clone()
    }

    /// Current state of a device.
    pub async fn device_state(&self, jid: &str, device: u32) -> Option<DeviceState> {
        self.state
            .lock()
            .await
            .devices
            .get(jid)
            .and_then(|devices| devices.get(&device))
            .copied()
    }
}

fn is_skipped(skip: &SkipMap, jid: &str, device: u32) -> bool {
    skip.get(jid).is_some_and(|devices| devices.contains(&device))
}

#[async_trait]
impl Omemo for MemoryKeyring {
    async fn encrypt(
        &self,
        plaintext: &str,
        recipients: &[Jid],
        skip: &SkipMap,
    ) -> Result<EncryptedEnvelope, NegotiationError> {
        let mut state = self.state.lock().await;
        state.encrypt_calls.push(EncryptCall {
            plaintext: plaintext.to_string(),
            recipients: recipients.iter().map(Jid::bare).collect(),
            skip: skip.clone(),
        });

        if let Some(error) = state.encrypt_script.pop_front() {
            return Err(error);
        }

        let mut problems = Vec::new();
        let mut keys = Vec::new();

        for recipient in recipients {
            let jid = recipient.bare();
            let Some(devices) = state.devices.get(&jid) else {
                continue;
            };

            for (&device, &device_state) in devices {
                if is_skipped(skip, &jid, device) {
                    continue;
                }
                match device_state {
                    DeviceState::Undecided | DeviceState::StuckUndecided => {
                        return Err(NegotiationError::Undecided {
                            jid,
                            device,
                            identity_key: format!("ik-{}", device),
                        });
                    }
                    DeviceState::NoBundle => problems.push(DeviceProblem::MissingBundle {
                        jid: jid.clone(),
                        device,
                    }),
                    DeviceState::Trusted => keys.push(EnvelopeKey {
                        rid: device,
                        jid: Some(jid.clone()),
                        prekey: false,
                        data: format!("key-{}", device),
                    }),
                }
            }
        }

        if !problems.is_empty() {
            return Err(NegotiationError::Exhausted(problems));
        }

        Ok(EncryptedEnvelope {
            sid: self.own_device,
            iv: "aXY=".to_string(),
            keys,
            payload: Some(format!("{}{}", SEALED_PREFIX, plaintext)),
        })
    }

    async fn decrypt(
        &self,
        envelope: &EncryptedEnvelope,
        _sender: &Jid,
        allow_untrusted: bool,
    ) -> Result<Option<String>, DecryptionError> {
        let mut state = self.state.lock().await;
        state.decrypt_flags.push(allow_untrusted);

        if let Some(error) = state.decrypt_script.pop_front() {
            return Err(error);
        }

        match &envelope.payload {
            None => Ok(None),
            Some(_) => Self::unseal(envelope)
                .map(Some)
                .ok_or_else(|| DecryptionError::Other("payload was not sealed by this keyring".to_string())),
        }
    }

    async fn trust(
        &self,
        jid: &str,
        device: u32,
        identity_key: &str,
    ) -> Result<(), NegotiationError> {
        let mut state = self.state.lock().await;
        state
            .trust_calls
            .push((jid.to_string(), device, identity_key.to_string()));

        if let Some(error) = state.trust_script.pop_front() {
            return Err(error);
        }

        let entry = state
            .devices
            .entry(jid.to_string())
            .or_default()
            .entry(device)
            .or_insert(DeviceState::Trusted);
        if *entry == DeviceState::Undecided {
            *entry = DeviceState::Trusted;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn alice() -> Jid {
        Jid::parse("alice@example.org/phone").unwrap()
    }

    #[tokio::test]
    async fn test_trusted_devices_encrypt() {
        let keyring = MemoryKeyring::new(1).with_device("alice@example.org", 11, DeviceState::Trusted);

        let envelope = keyring
            .encrypt("hi", &[alice().to_bare()], &SkipMap::new())
            .await
            .unwrap();

        assert_eq!(envelope.recipient_devices(), vec![11]);
        assert_eq!(MemoryKeyring::unseal(&envelope).as_deref(), Some("hi"));
    }

    #[tokio::test]
    async fn test_undecided_until_trusted() {
        let keyring = MemoryKeyring::new(1).with_device("alice@example.org", 11, DeviceState::Undecided);
        let recipients = [alice().to_bare()];

        let err = keyring.encrypt("hi", &recipients, &SkipMap::new()).await.unwrap_err();
        assert!(matches!(err, NegotiationError::Undecided { device: 11, .. }));

        keyring.trust("alice@example.org", 11, "ik-11").await.unwrap();
        assert!(keyring.encrypt("hi", &recipients, &SkipMap::new()).await.is_ok());
    }

    #[tokio::test]
    async fn test_skipped_devices_are_left_out() {
        let keyring = MemoryKeyring::new(1)
            .with_device("alice@example.org", 11, DeviceState::Trusted)
            .with_device("alice@example.org", 12, DeviceState::NoBundle);
        let recipients = [alice().to_bare()];

        let err = keyring.encrypt("hi", &recipients, &SkipMap::new()).await.unwrap_err();
        assert!(matches!(err, NegotiationError::Exhausted(ref p) if p.len() == 1));

        let mut skip = SkipMap::new();
        skip.entry("alice@example.org".to_string()).or_default().insert(12);
        let envelope = keyring.encrypt("hi", &recipients, &skip).await.unwrap();
        assert_eq!(envelope.recipient_devices(), vec![11]);
    }

    #[tokio::test]
    async fn test_decrypt_round_trip_and_heartbeat() {
        let keyring = MemoryKeyring::new(1);
        let sealed = MemoryKeyring::seal(11, 1, "hello");

        assert_eq!(
            keyring.decrypt(&sealed, &alice(), false).await.unwrap().as_deref(),
            Some("hello")
        );
        assert_eq!(
            keyring
                .decrypt(&MemoryKeyring::heartbeat(11), &alice(), false)
                .await
                .unwrap(),
            None
        );
    }
}
