//! Request and response bodies for the generation server.

use relay_core::{BackendError, ConversationSession};
use serde::Deserialize;
use serde_json::{Map, Value};

use crate::config::BackendMode;

/// Build the request body for a session: pass-through persona parameters,
/// then `prompt` and `max_context_length`.
pub fn completion_request(session: &ConversationSession) -> Map<String, Value> {
    let mut body = session.parameters().clone();
    body.insert(
        "prompt".to_string(),
        Value::String(session.prompt_buffer().to_string()),
    );
    body.insert(
        "max_context_length".to_string(),
        Value::from(session.max_context_length()),
    );
    body
}

/// Body for the startup health check: empty prompt, nothing generated.
pub fn health_request(mode: BackendMode) -> Map<String, Value> {
    let mut body = Map::new();
    body.insert("prompt".to_string(), Value::String(String::new()));
    body.insert(mode.token_limit_field().to_string(), Value::from(0));
    body
}

/// `/completion` response.
#[derive(Debug, Deserialize)]
pub struct CompletionResponse {
    pub content: Option<String>,
}

/// `/api/v1/generate` response.
#[derive(Debug, Deserialize)]
pub struct GenerateResponse {
    #[serde(default)]
    pub results: Vec<GenerateResult>,
}

#[derive(Debug, Deserialize)]
pub struct GenerateResult {
    pub text: Option<String>,
}

/// Pull the generated text out of a response body.
pub fn extract_reply(mode: BackendMode, body: Value) -> Result<String, BackendError> {
    match mode {
        BackendMode::Completion => {
            let response: CompletionResponse = serde_json::from_value(body)
                .map_err(|e| BackendError::Protocol(format!("malformed completion response: {}", e)))?;
            response
                .content
                .ok_or_else(|| BackendError::Protocol("response has no \"content\" field".to_string()))
        }
        BackendMode::Generate => {
            let response: GenerateResponse = serde_json::from_value(body)
                .map_err(|e| BackendError::Protocol(format!("malformed generate response: {}", e)))?;
            response
                .results
                .into_iter()
                .next()
                .and_then(|result| result.text)
                .ok_or_else(|| BackendError::Protocol("response has no \"results[0].text\"".to_string()))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use relay_core::{PersonaConfig, TemplateFormat};
    use serde_json::json;

    #[test]
    fn test_request_carries_parameters_and_prompt() {
        let persona = PersonaConfig::new(TemplateFormat::Alpaca, "Aria", "seed\n")
            .with_max_context_length(4096)
            .with_parameter("temperature", 0.7)
            .with_parameter("prompt", "overwritten");
        let session = persona.new_session("alice@example.org");

        let body = completion_request(&session);
        assert_eq!(body["prompt"], "seed\n");
        assert_eq!(body["max_context_length"], 4096);
        assert_eq!(body["temperature"], 0.7);
        assert!(!body.contains_key("format"));
    }

    #[test]
    fn test_health_request_per_mode() {
        let completion = health_request(BackendMode::Completion);
        assert_eq!(Value::Object(completion), json!({"prompt": "", "n_predict": 0}));

        let generate = health_request(BackendMode::Generate);
        assert_eq!(Value::Object(generate), json!({"prompt": "", "max_length": 0}));
    }

    #[test]
    fn test_extract_completion() {
        let reply = extract_reply(BackendMode::Completion, json!({"content": "Hi", "stop": true}));
        assert_eq!(reply.unwrap(), "Hi");
    }

    #[test]
    fn test_extract_generate() {
        let reply = extract_reply(BackendMode::Generate, json!({"results": [{"text": "Hi"}]}));
        assert_eq!(reply.unwrap(), "Hi");
    }

    #[test]
    fn test_wrong_mode_is_protocol_error() {
        let err = extract_reply(BackendMode::Completion, json!({"results": [{"text": "Hi"}]}));
        assert!(matches!(err, Err(BackendError::Protocol(_))));

        let err = extract_reply(BackendMode::Generate, json!({"content": "Hi"}));
        assert!(matches!(err, Err(BackendError::Protocol(_))));

        let err = extract_reply(BackendMode::Generate, json!({"results": []}));
        assert!(matches!(err, Err(BackendError::Protocol(_))));
    }
}
