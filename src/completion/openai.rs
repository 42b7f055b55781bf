use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::debug;

use super::{CompletionError, CompletionModel, CompletionRequest, Message};

/// Completion model behind an OpenAI-compatible `/chat/completions` endpoint
/// (Groq by default).
pub struct OpenAICompletionModel {
    base_url: String,
    api_key: String,
    default_max_tokens: u32,
    default_temperature: f64,
    http_client: reqwest::Client,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<Message>,
    max_tokens: u32,
    temperature: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_format: Option<ResponseFormat>,
}

#[derive(Serialize)]
struct ResponseFormat {
    #[serde(rename = "type")]
    kind: &'static str,
}

#[derive(Deserialize)]
struct ChatResponse {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: Option<String>,
}

impl OpenAICompletionModel {
    pub fn new(
        base_url: &str,
        api_key: &str,
        default_max_tokens: u32,
        default_temperature: f64,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let http_client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            default_max_tokens,
            default_temperature,
            http_client,
        })
    }
}

#[async_trait]
impl CompletionModel for OpenAICompletionModel {
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError> {
        let body = ChatRequest {
            model: request.model.as_str(),
            messages: request.messages(),
            max_tokens: request.max_tokens.unwrap_or(self.default_max_tokens),
            temperature: request.temperature.unwrap_or(self.default_temperature),
            response_format: request
                .json_response
                .then_some(ResponseFormat { kind: "json_object" }),
        };
        debug!("Calling chat completion with model {}", body.model);

        let resp = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        if !resp.status().is_success() {
            let status = resp.status().as_u16();
            let body = resp.text().await.unwrap_or_default();
            return Err(CompletionError::Api { status, body });
        }

        let response: ChatResponse = resp.json().await?;
        response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .map(|content| content.trim().to_string())
            .filter(|content| !content.is_empty())
            .ok_or(CompletionError::MissingContent)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::completion::ChatModel;
    use httpmock::prelude::*;
    use serde_json::json;

    fn model(server: &MockServer) -> OpenAICompletionModel {
        OpenAICompletionModel::new(&server.url("/openai/v1"), "gsk-test", 150, 0.75, Duration::from_secs(5))
            .unwrap()
    }

    #[test]
    fn test_chat_request_serialization() {
        let req = ChatRequest {
            model: "llama-3.3-70b-versatile",
            messages: vec![Message::new("user", "Hello")],
            max_tokens: 150,
            temperature: 0.75,
            response_format: None,
        };
        let json = serde_json::to_value(&req).unwrap();
        assert_eq!(json["model"], "llama-3.3-70b-versatile");
        assert_eq!(json["max_tokens"], 150);
        assert!(json.get("response_format").is_none());
    }

    #[test]
    fn test_chat_response_deserialization() {
        let json = r#"{
            "choices": [
                {
                    "message": {"role": "assistant", "content": "(*smiles*) (\"Hello there.\")"},
                    "finish_reason": "stop"
                }
            ],
            "usage": {"prompt_tokens": 10, "completion_tokens": 6, "total_tokens": 16}
        }"#;
        let resp: ChatResponse = serde_json::from_str(json).unwrap();
        assert!(resp.choices[0].message.content.is_some());
    }

    #[tokio::test]
    async fn test_complete_sends_whitelisted_model_and_trims() {
        let server = MockServer::start_async().await;
        let mock = server
            .mock_async(|when, then| {
                when.method(POST)
                    .path("/openai/v1/chat/completions")
                    .body_includes("\"mistral-saba-24b\"")
                    .body_includes("json_object");
                then.status(200).json_body(json!({
                    "choices": [{"message": {"role": "assistant", "content": "  {\"title\": \"x\"}\n"}}]
                }));
            })
            .await;

        let mut req = CompletionRequest::new("system", "user", ChatModel::MistralSaba24b);
        req.json_response = true;
        let text = model(&server).complete(&req).await.unwrap();
        assert_eq!(text, "{\"title\": \"x\"}");
        mock.assert_async().await;
    }

    #[tokio::test]
    async fn test_complete_missing_content_is_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/openai/v1/chat/completions");
                then.status(200)
                    .json_body(json!({"choices": [{"message": {"role": "assistant", "content": null}}]}));
            })
            .await;

        let req = CompletionRequest::new("system", "user", ChatModel::default());
        let err = model(&server).complete(&req).await.unwrap_err();
        assert!(matches!(err, CompletionError::MissingContent));
    }

    #[tokio::test]
    async fn test_complete_http_error() {
        let server = MockServer::start_async().await;
        server
            .mock_async(|when, then| {
                when.method(POST).path("/openai/v1/chat/completions");
                then.status(500).body("boom");
            })
            .await;

        let req = CompletionRequest::new("system", "user", ChatModel::default());
        let err = model(&server).complete(&req).await.unwrap_err();
        assert!(matches!(err, CompletionError::Api { status: 500, .. }));
    }
}
