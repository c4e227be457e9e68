//! HttpBackend tests against a mock generation server.

use llm_backend::{Backend, BackendConfig, BackendError, BackendMode, HttpBackend};
use relay_core::{append_user_turn, PersonaConfig, TemplateFormat};
use serde_json::json;
use wiremock::matchers::{body_partial_json, method, path};
use wiremock::{Mock, MockServer, ResponseTemplate};

fn backend_for(server: &MockServer, mode: BackendMode) -> HttpBackend {
    let config = BackendConfig::builder()
        .api_host(server.uri())
        .mode(mode)
        .build();
    HttpBackend::new(config).unwrap()
}

fn persona() -> PersonaConfig {
    PersonaConfig::new(TemplateFormat::ChatMl, "Aria", "<|im_start|>user\n")
        .with_max_context_length(2048)
        .with_parameter("n_predict", 128)
        .with_parameter("stop", json!(["<|im_end|>"]))
}

#[tokio::test]
async fn test_completion_mode_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/completion"))
        .and(body_partial_json(json!({
            "prompt": "<|im_start|>user\nHello<|im_end|>\n<|im_start|>assistant\n",
            "max_context_length": 2048,
            "n_predict": 128,
            "stop": ["<|im_end|>"]
        })))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "content": "Hi there!<|im_end|>",
            "stop": true
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server, BackendMode::Completion);
    let mut session = persona().new_session("alice@example.org");
    append_user_turn(&mut session, "Hello");

    let reply = backend.complete(&session).await.unwrap();
    assert_eq!(reply, "Hi there!<|im_end|>");
}

#[tokio::test]
async fn test_generate_mode_round_trip() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/generate"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"text": " General Kenobi."}]
        })))
        .mount(&server)
        .await;

    let backend = backend_for(&server, BackendMode::Generate);
    let session = persona().new_session("bob@example.org");

    let reply = backend.complete(&session).await.unwrap();
    assert_eq!(reply, " General Kenobi.");
}

#[tokio::test]
async fn test_wrong_mode_surfaces_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/completion"))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({
            "results": [{"text": "meant for generate mode"}]
        })))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server, BackendMode::Completion);
    let session = persona().new_session("alice@example.org");

    let err = backend.complete(&session).await.unwrap_err();
    assert!(matches!(err, BackendError::Protocol(_)), "got {:?}", err);
}

#[tokio::test]
async fn test_non_json_body_is_protocol_error() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/completion"))
        .respond_with(ResponseTemplate::new(200).set_body_string("<html>proxy</html>"))
        .mount(&server)
        .await;

    let backend = backend_for(&server, BackendMode::Completion);
    let session = persona().new_session("alice@example.org");

    assert!(matches!(
        backend.complete(&session).await,
        Err(BackendError::Protocol(_))
    ));
}

#[tokio::test]
async fn test_http_error_status() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/completion"))
        .respond_with(ResponseTemplate::new(503).set_body_string("loading model"))
        .mount(&server)
        .await;

    let backend = backend_for(&server, BackendMode::Completion);
    let session = persona().new_session("alice@example.org");

    match backend.complete(&session).await {
        Err(BackendError::Http { status, body }) => {
            assert_eq!(status, 503);
            assert_eq!(body, "loading model");
        }
        other => panic!("expected HTTP error, got {:?}", other),
    }
}

#[tokio::test]
async fn test_health_check_sends_empty_prompt() {
    let server = MockServer::start().await;
    Mock::given(method("POST"))
        .and(path("/api/v1/generate"))
        .and(body_partial_json(json!({"prompt": "", "max_length": 0})))
        .respond_with(ResponseTemplate::new(200).set_body_json(json!({"results": [{"text": ""}]})))
        .expect(1)
        .mount(&server)
        .await;

    let backend = backend_for(&server, BackendMode::Generate);
    assert!(backend.health_check().await);
}

#[tokio::test]
async fn test_health_check_fails_when_unreachable() {
    let server = MockServer::start().await;
    let uri = server.uri();
    drop(server);

    let config = BackendConfig::builder().api_host(uri).build();
    let backend = HttpBackend::new(config).unwrap();
    assert!(!backend.health_check().await);
}
