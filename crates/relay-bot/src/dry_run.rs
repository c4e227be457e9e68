//! Console loopback used by `--dry-run`.
//!
//! Lines typed on stdin become "encrypted" chat stanzas from a fixed local
//! sender and replies are printed to stdout. No daemon, no keys.

use async_trait::async_trait;
use omemo_gateway::{DecryptionError, NegotiationError, Omemo, SendError, SkipMap, StanzaSender};
use relay_core::{EncryptedEnvelope, InboundStanza, Jid, OutboundStanza, Payload};
use tokio::io::{AsyncBufReadExt, BufReader};
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

/// Sender address of every console line.
pub const CONSOLE_JID: &str = "console@localhost/tty";

/// Device id the loopback claims as its own.
const LOOPBACK_DEVICE: u32 = 1;

/// An [`Omemo`] that wraps plaintext in an envelope without encrypting it.
///
/// The payload field carries the text as-is, so the whole pipeline runs
/// with every device trusted.
#[derive(Debug, Default)]
pub struct LoopbackOmemo;

impl LoopbackOmemo {
    /// Envelope carrying `text` in the clear.
    pub fn seal(text: &str) -> EncryptedEnvelope {
        EncryptedEnvelope {
            sid: LOOPBACK_DEVICE,
            iv: String::new(),
            keys: Vec::new(),
            payload: Some(text.to_string()),
        }
    }
}

#[async_trait]
impl Omemo for LoopbackOmemo {
    async fn encrypt(
        &self,
        plaintext: &str,
        _recipients: &[Jid],
        _skip: &SkipMap,
    ) -> Result<EncryptedEnvelope, NegotiationError> {
        Ok(Self::seal(plaintext))
    }

    async fn decrypt(
        &self,
        envelope: &EncryptedEnvelope,
        _sender: &Jid,
        _allow_untrusted: bool,
    ) -> Result<Option<String>, DecryptionError> {
        Ok(envelope.payload.clone())
    }

    async fn trust(
        &self,
        _jid: &str,
        _device: u32,
        _identity_key: &str,
    ) -> Result<(), NegotiationError> {
        Ok(())
    }
}

/// Prints outbound stanzas instead of sending them.
#[derive(Debug, Default)]
pub struct StdoutSender;

/// What a stanza looks like on the console.
pub fn render(stanza: &OutboundStanza) -> String {
    match &stanza.payload {
        Payload::Plain(text) => format!("[plain] {}", text),
        Payload::Encrypted(envelope) => envelope.payload.clone().unwrap_or_default(),
    }
}

#[async_trait]
impl StanzaSender for StdoutSender {
    async fn send(&self, stanza: OutboundStanza) -> Result<(), SendError> {
        println!("{}", render(&stanza));
        Ok(())
    }
}

/// Feed stdin lines into the inbound queue until end of input.
///
/// Blank lines are skipped. Returns the number of lines queued.
pub async fn feed_stdin(tx: mpsc::UnboundedSender<InboundStanza>) -> std::io::Result<usize> {
    feed_lines(BufReader::new(tokio::io::stdin()), tx).await
}

async fn feed_lines<R>(reader: R, tx: mpsc::UnboundedSender<InboundStanza>) -> std::io::Result<usize>
where
    R: tokio::io::AsyncBufRead + Unpin,
{
    let from = Jid::parse(CONSOLE_JID)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e.0))?;
    let mut lines = reader.lines();
    let mut queued = 0;

    info!("Dry run: reading messages from stdin as {}", CONSOLE_JID);

    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }
        debug!("Console input: {}", line);
        if tx
            .send(InboundStanza::encrypted(from.clone(), LoopbackOmemo::seal(line)))
            .is_err()
        {
            warn!("Inbound queue closed, ignoring further input");
            break;
        }
        queued += 1;
    }

    Ok(queued)
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::MessageKind;

    #[tokio::test]
    async fn test_loopback_round_trip() {
        let omemo = LoopbackOmemo;
        let sender = Jid::parse(CONSOLE_JID).unwrap();

        let envelope = omemo.encrypt("hi", &[sender.clone()], &SkipMap::new()).await.unwrap();
        let text = omemo.decrypt(&envelope, &sender, false).await.unwrap();
        assert_eq!(text.as_deref(), Some("hi"));
    }

    #[test]
    fn test_render() {
        let to = Jid::parse(CONSOLE_JID).unwrap();
        let plain = OutboundStanza::plain(to.clone(), MessageKind::Chat, "notice");
        let sealed = OutboundStanza::encrypted(to, MessageKind::Chat, LoopbackOmemo::seal("reply"));

        assert_eq!(render(&plain), "[plain] notice");
        assert_eq!(render(&sealed), "reply");
    }

    #[tokio::test]
    async fn test_feed_lines_skips_blanks() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        let input: &[u8] = b"hello\n\n   \n!rtd\n";

        let queued = feed_lines(input, tx).await.unwrap();
        assert_eq!(queued, 2);

        let first = rx.recv().await.unwrap();
        assert_eq!(first.from.to_string(), CONSOLE_JID);
        assert_eq!(
            first.encrypted.and_then(|e| e.payload).as_deref(),
            Some("hello")
        );
        let second = rx.recv().await.unwrap();
        assert_eq!(second.encrypted.and_then(|e| e.payload).as_deref(), Some("!rtd"));
        assert!(rx.recv().await.is_none());
    }
}
