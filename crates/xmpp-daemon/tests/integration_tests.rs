//! Integration tests for xmpp-daemon.
//!
//! The daemon is replaced by a mock HTTP server; nothing here needs a real
//! XMPP account.

use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use omemo_gateway::{
    AbortReason, DecryptionError, DeliveryOutcome, DeviceProblem, EncryptionGateway,
    NegotiationError, Omemo, SkipMap, StanzaSender,
};
use relay_core::{EncryptedEnvelope, EnvelopeKey, Jid, MessageKind, OutboundStanza};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};
use xmpp_daemon::{DaemonConfig, DaemonError, ErrorData, ReconnectConfig, XmppClient};

fn alice() -> Jid {
    Jid::parse("alice@example.org/phone").unwrap()
}

fn envelope() -> EncryptedEnvelope {
    EncryptedEnvelope {
        sid: 11,
        iv: "aXY=".to_string(),
        keys: vec![EnvelopeKey {
            rid: 1,
            jid: None,
            prekey: false,
            data: "a2V5".to_string(),
        }],
        payload: Some("cA==".to_string()),
    }
}

fn rpc_error(kind_data: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({
        "jsonrpc": "2.0",
        "id": 1,
        "error": {"code": -32000, "message": "negotiation failed", "data": kind_data}
    }))
}

fn rpc_result(result: serde_json::Value) -> ResponseTemplate {
    ResponseTemplate::new(200).set_body_json(json!({"jsonrpc": "2.0", "id": 1, "result": result}))
}

async fn client_for(server: &MockServer) -> XmppClient {
    let config = DaemonConfig::with_account(server.uri(), "bot@example.org")
        .with_request_timeout(Duration::from_secs(2));
    XmppClient::new(config).unwrap()
}

// ============================================================================
// Configuration
// ============================================================================

mod config_tests {
    use super::*;

    #[test]
    fn test_daemon_config_default() {
        let config = DaemonConfig::default();
        assert_eq!(config.base_url, "http://localhost:8090");
        assert!(config.account.is_none());
        assert_eq!(config.request_timeout, Duration::from_secs(30));
    }

    #[test]
    fn test_daemon_config_urls() {
        let config = DaemonConfig::new("http://localhost:8090/");
        assert_eq!(config.rpc_url(), "http://localhost:8090/api/v1/rpc");
        assert_eq!(config.check_url(), "http://localhost:8090/api/v1/check");
        assert_eq!(config.events_url(), "http://localhost:8090/api/v1/events");
    }

    #[test]
    fn test_daemon_config_events_url_with_account() {
        let config = DaemonConfig::with_account("http://localhost:8090", "bot@example.org/relay");
        assert_eq!(
            config.events_url(),
            "http://localhost:8090/api/v1/events?account=bot%40example.org%2Frelay"
        );
    }

    #[test]
    fn test_from_env() {
        std::env::set_var("RELAY_DAEMON_URL", "http://10.0.0.5:9000");
        std::env::set_var("RELAY_JID", "bot@example.org");
        std::env::set_var("RELAY_DAEMON_TIMEOUT_SECS", "5");

        let config = DaemonConfig::from_env().unwrap();
        assert_eq!(config.base_url, "http://10.0.0.5:9000");
        assert_eq!(config.account.as_deref(), Some("bot@example.org"));
        assert_eq!(config.request_timeout, Duration::from_secs(5));

        std::env::set_var("RELAY_DAEMON_TIMEOUT_SECS", "soon");
        assert!(matches!(DaemonConfig::from_env(), Err(DaemonError::Config(_))));

        std::env::remove_var("RELAY_DAEMON_URL");
        std::env::remove_var("RELAY_JID");
        std::env::remove_var("RELAY_DAEMON_TIMEOUT_SECS");
    }
}

mod reconnect_tests {
    use super::*;

    #[test]
    fn test_backoff_grows_and_caps() {
        let config = ReconnectConfig::default();
        assert_eq!(config.delay_for_attempt(0), Duration::from_millis(500));
        assert_eq!(config.delay_for_attempt(1), Duration::from_millis(1000));
        assert_eq!(config.delay_for_attempt(20), Duration::from_secs(30));
    }

    #[test]
    fn test_should_retry() {
        let unlimited = ReconnectConfig::default();
        assert!(unlimited.should_retry(1_000));

        let limited = ReconnectConfig {
            max_retries: Some(3),
            ..Default::default()
        };
        assert!(limited.should_retry(2));
        assert!(!limited.should_retry(3));
    }
}

// ============================================================================
// Error mapping
// ============================================================================

mod error_mapping_tests {
    use super::*;

    fn rpc(data: ErrorData) -> DaemonError {
        DaemonError::Rpc {
            code: -32000,
            message: "failed".to_string(),
            data: Some(data),
        }
    }

    #[test]
    fn test_error_data_kinds_parse() {
        let data: ErrorData = serde_json::from_value(json!({
            "kind": "undecided", "jid": "alice@example.org", "device": 11, "identityKey": "ik"
        }))
        .unwrap();
        assert_eq!(
            data,
            ErrorData::Undecided {
                jid: "alice@example.org".to_string(),
                device: 11,
                identity_key: Some("ik".to_string())
            }
        );

        let data: ErrorData = serde_json::from_value(json!({"kind": "something_new"})).unwrap();
        assert_eq!(data, ErrorData::Unknown);

        let data: ErrorData = serde_json::from_value(json!({
            "kind": "exhausted",
            "problems": [{"kind": "no_eligible_devices"}, {"kind": "other", "device": 3}]
        }))
        .unwrap();
        assert_eq!(
            data,
            ErrorData::Exhausted {
                problems: vec![
                    DeviceProblem::Unknown,
                    DeviceProblem::Other {
                        jid: None,
                        device: Some(3),
                        message: String::new()
                    },
                ]
            }
        );
    }

    #[test]
    fn test_negotiation_mapping() {
        let err = rpc(ErrorData::MissingBundle {
            jid: "alice@example.org".to_string(),
            device: 12,
        })
        .into_negotiation_error();
        assert_eq!(
            err,
            NegotiationError::Exhausted(vec![DeviceProblem::MissingBundle {
                jid: "alice@example.org".to_string(),
                device: 12
            }])
        );

        let err = rpc(ErrorData::Timeout { message: None }).into_negotiation_error();
        assert!(matches!(err, NegotiationError::Transport(_)));

        let err = rpc(ErrorData::Unknown).into_negotiation_error();
        assert_eq!(err, NegotiationError::Other("failed".to_string()));

        let err = DaemonError::Connection("refused".to_string()).into_negotiation_error();
        assert!(matches!(err, NegotiationError::Transport(_)));
    }

    #[test]
    fn test_decryption_mapping() {
        assert_eq!(
            rpc(ErrorData::MissingOwnKey).into_decryption_error(),
            DecryptionError::MissingOwnKey
        );
        assert_eq!(
            rpc(ErrorData::NoAvailableSession).into_decryption_error(),
            DecryptionError::NoAvailableSession
        );
        assert_eq!(
            rpc(ErrorData::Untrusted {
                jid: "alice@example.org".to_string(),
                device: 11
            })
            .into_decryption_error(),
            DecryptionError::Untrusted {
                jid: "alice@example.org".to_string(),
                device: 11
            }
        );
        assert!(matches!(
            rpc(ErrorData::Exhausted { problems: vec![] }).into_decryption_error(),
            DecryptionError::Exhausted(_)
        ));
    }
}

// ============================================================================
// RPC against a mock daemon
// ============================================================================

mod rpc_tests {
    use super::*;

    #[tokio::test]
    async fn test_connect_requires_healthy_daemon() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/check"))
            .respond_with(ResponseTemplate::new(200))
            .mount(&server)
            .await;

        let client = XmppClient::connect(DaemonConfig::new(server.uri())).await.unwrap();
        assert!(client.is_connected());
    }

    #[tokio::test]
    async fn test_connect_fails_on_unhealthy_daemon() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .and(path("/api/v1/check"))
            .respond_with(ResponseTemplate::new(503))
            .mount(&server)
            .await;

        let result = XmppClient::connect(DaemonConfig::new(server.uri())).await;
        assert!(matches!(result, Err(DaemonError::HealthCheckFailed)));
    }

    #[tokio::test]
    async fn test_login_and_join_room() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/rpc"))
            .and(body_partial_json(json!({
                "method": "login",
                "params": {"account": "bot@example.org", "password": "hunter2"}
            })))
            .respond_with(rpc_result(json!({})))
            .expect(1)
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/rpc"))
            .and(body_partial_json(json!({
                "method": "join_room",
                "params": {"room": "lounge@conference.example.org", "nick": "aria"}
            })))
            .respond_with(rpc_result(json!({"joined": true})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        client.login("hunter2").await.unwrap();
        client
            .join_room("lounge@conference.example.org", "aria")
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn test_login_rejected() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/rpc"))
            .respond_with(ResponseTemplate::new(200).set_body_json(json!({
                "jsonrpc": "2.0",
                "id": 1,
                "error": {"code": -32001, "message": "not-authorized"}
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        assert!(client.login("wrong").await.is_err());
    }

    #[tokio::test]
    async fn test_encrypt_sends_bare_recipients_and_skips() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/rpc"))
            .and(body_partial_json(json!({
                "jsonrpc": "2.0",
                "method": "encrypt",
                "params": {
                    "account": "bot@example.org",
                    "plaintext": "Hello",
                    "recipients": ["alice@example.org"],
                    "skip": {"alice@example.org": [12]}
                }
            })))
            .respond_with(rpc_result(serde_json::to_value(envelope()).unwrap()))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let mut skip = SkipMap::new();
        skip.entry("alice@example.org".to_string()).or_default().insert(12);

        let result = Omemo::encrypt(&client, "Hello", &[alice()], &skip).await.unwrap();
        assert_eq!(result, envelope());
    }

    #[tokio::test]
    async fn test_encrypt_undecided_is_typed() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/rpc"))
            .respond_with(rpc_error(json!({
                "kind": "undecided", "jid": "alice@example.org", "device": 11, "identityKey": "ik-11"
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = Omemo::encrypt(&client, "Hello", &[alice()], &SkipMap::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            NegotiationError::Undecided {
                jid: "alice@example.org".to_string(),
                device: 11,
                identity_key: "ik-11".to_string()
            }
        );
    }

    #[tokio::test]
    async fn test_encrypt_exhausted_problems() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/rpc"))
            .respond_with(rpc_error(json!({
                "kind": "exhausted",
                "problems": [{"kind": "missing_bundle", "jid": "alice@example.org", "device": 12}]
            })))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = Omemo::encrypt(&client, "Hello", &[alice()], &SkipMap::new())
            .await
            .unwrap_err();

        assert_eq!(
            err,
            NegotiationError::Exhausted(vec![DeviceProblem::MissingBundle {
                jid: "alice@example.org".to_string(),
                device: 12
            }])
        );
    }

    #[tokio::test]
    async fn test_exhausted_with_unrecognised_problem_aborts_delivery() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/rpc"))
            .and(body_partial_json(json!({"method": "encrypt"})))
            .respond_with(rpc_error(json!({
                "kind": "exhausted",
                "problems": [
                    {"kind": "missing_bundle", "jid": "alice@example.org", "device": 12},
                    {"kind": "no_eligible_devices", "jid": "alice@example.org"}
                ]
            })))
            .expect(2)
            .mount(&server)
            .await;

        let client = Arc::new(client_for(&server).await);
        let err = Omemo::encrypt(client.as_ref(), "Hello", &[alice()], &SkipMap::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            NegotiationError::Exhausted(vec![
                DeviceProblem::MissingBundle {
                    jid: "alice@example.org".to_string(),
                    device: 12
                },
                DeviceProblem::Unknown,
            ])
        );

        let gateway = EncryptionGateway::new(client.clone(), client);
        let outcome = gateway
            .deliver(&alice(), MessageKind::Chat, "Hello")
            .await
            .unwrap();
        assert_eq!(
            outcome,
            DeliveryOutcome::Aborted(AbortReason::Unresolvable(DeviceProblem::Unknown))
        );
    }

    #[tokio::test]
    async fn test_decrypt_and_trust() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/rpc"))
            .and(body_partial_json(json!({
                "method": "decrypt",
                "params": {"sender": "alice@example.org/phone", "allowUntrusted": true}
            })))
            .respond_with(rpc_result(json!({"body": "Hello"})))
            .mount(&server)
            .await;
        Mock::given(method("POST"))
            .and(path("/api/v1/rpc"))
            .and(body_partial_json(json!({
                "method": "trust",
                "params": {"jid": "alice@example.org", "device": 11, "identityKey": "ik-11"}
            })))
            .respond_with(rpc_result(json!({})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;

        let body = client.decrypt(&envelope(), &alice(), true).await.unwrap();
        assert_eq!(body.as_deref(), Some("Hello"));

        client.trust("alice@example.org", 11, "ik-11").await.unwrap();
    }

    #[tokio::test]
    async fn test_decrypt_missing_own_key() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/rpc"))
            .respond_with(rpc_error(json!({"kind": "missing_own_key"})))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let err = client.decrypt(&envelope(), &alice(), false).await.unwrap_err();
        assert_eq!(err, DecryptionError::MissingOwnKey);
    }

    #[tokio::test]
    async fn test_send_stanza() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/rpc"))
            .and(body_partial_json(json!({
                "method": "send",
                "params": {
                    "stanza": {
                        "to": "alice@example.org/phone",
                        "type": "chat",
                        "payload": {"type": "plain", "content": "notice"}
                    }
                }
            })))
            .respond_with(rpc_result(json!({"id": "abc"})))
            .expect(1)
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let stanza = OutboundStanza::plain(alice(), MessageKind::Chat, "notice");
        StanzaSender::send(&client, stanza).await.unwrap();
    }

    #[tokio::test]
    async fn test_http_failure_on_send() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/v1/rpc"))
            .respond_with(ResponseTemplate::new(500).set_body_string("down"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let stanza = OutboundStanza::plain(alice(), MessageKind::Chat, "notice");
        assert!(StanzaSender::send(&client, stanza).await.is_err());
    }
}

// ============================================================================
// Event stream
// ============================================================================

mod sse_tests {
    use super::*;

    #[tokio::test]
    async fn test_receive_events_become_stanzas() {
        let server = MockServer::start().await;
        let body = concat!(
            "event: typing\ndata: {}\n\n",
            "event: receive\ndata: {\"account\":\"bot@example.org\",\"stanza\":",
            "{\"from\":\"alice@example.org/phone\",\"type\":\"chat\",\"body\":\"hi\"}}\n\n",
        );
        Mock::given(method("GET"))
            .and(path("/api/v1/events"))
            .respond_with(ResponseTemplate::new(200).set_body_raw(body, "text/event-stream"))
            .mount(&server)
            .await;

        let client = client_for(&server).await;
        let mut stream = xmpp_daemon::subscribe(&client).unwrap();

        let stanza = tokio::time::timeout(Duration::from_secs(5), stream.next())
            .await
            .unwrap()
            .unwrap()
            .unwrap();

        assert_eq!(stanza.from, alice());
        assert_eq!(stanza.kind, MessageKind::Chat);
        assert_eq!(stanza.body.as_deref(), Some("hi"));
        stream.close();
    }
}
