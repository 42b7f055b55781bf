pub mod openai;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// A message in a chat conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: String,
    pub content: String,
}

impl Message {
    pub fn new(role: &str, content: impl Into<String>) -> Self {
        Self {
            role: role.to_string(),
            content: content.into(),
        }
    }
}

/// Chat models the service is allowed to call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ChatModel {
    #[default]
    Llama33Versatile70b,
    Llama3_8b,
    Llama3_70b,
    QwenQwq32b,
    DeepseekR1DistillLlama70b,
    MistralSaba24b,
}

impl ChatModel {
    pub const ALL: [ChatModel; 6] = [
        ChatModel::Llama33Versatile70b,
        ChatModel::Llama3_8b,
        ChatModel::Llama3_70b,
        ChatModel::QwenQwq32b,
        ChatModel::DeepseekR1DistillLlama70b,
        ChatModel::MistralSaba24b,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            ChatModel::Llama33Versatile70b => "llama-3.3-70b-versatile",
            ChatModel::Llama3_8b => "llama3-8b-8192",
            ChatModel::Llama3_70b => "llama3-70b-8192",
            ChatModel::QwenQwq32b => "qwen-qwq-32b",
            ChatModel::DeepseekR1DistillLlama70b => "deepseek-r1-distill-llama-70b",
            ChatModel::MistralSaba24b => "mistral-saba-24b",
        }
    }

    /// Map an identifier onto the whitelist; anything unknown falls back to the default.
    pub fn resolve(identifier: Option<&str>) -> ChatModel {
        identifier
            .map(str::trim)
            .and_then(|id| Self::ALL.into_iter().find(|m| m.as_str() == id))
            .unwrap_or_default()
    }
}

/// A single chat-completion call.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system_prompt: String,
    pub user_message: String,
    /// Prior conversation, oldest first, placed between system and user messages.
    pub history: Vec<Message>,
    pub model: ChatModel,
    pub max_tokens: Option<u32>,
    pub temperature: Option<f64>,
    /// Ask the provider for a JSON object response.
    pub json_response: bool,
}

impl CompletionRequest {
    pub fn new(system_prompt: impl Into<String>, user_message: impl Into<String>, model: ChatModel) -> Self {
        Self {
            system_prompt: system_prompt.into(),
            user_message: user_message.into(),
            history: Vec::new(),
            model,
            max_tokens: None,
            temperature: None,
            json_response: false,
        }
    }

    /// Flatten into the wire message order: system, history, user.
    pub fn messages(&self) -> Vec<Message> {
        let mut messages = Vec::with_capacity(self.history.len() + 2);
        messages.push(Message::new("system", self.system_prompt.clone()));
        messages.extend(self.history.iter().cloned());
        messages.push(Message::new("user", self.user_message.clone()));
        messages
    }
}

#[derive(Debug, Error)]
pub enum CompletionError {
    #[error("Completion API error ({status}): {body}")]
    Api { status: u16, body: String },
    #[error("Completion request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("Completion response is missing message content")]
    MissingContent,
}

/// Abstract completion model interface.
#[async_trait]
pub trait CompletionModel: Send + Sync {
    /// Generate a completion and return the trimmed text.
    async fn complete(&self, request: &CompletionRequest) -> Result<String, CompletionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_known_model() {
        assert_eq!(ChatModel::resolve(Some("qwen-qwq-32b")), ChatModel::QwenQwq32b);
        assert_eq!(ChatModel::resolve(Some(" llama3-8b-8192 ")), ChatModel::Llama3_8b);
    }

    #[test]
    fn test_resolve_unknown_falls_back() {
        assert_eq!(ChatModel::resolve(Some("gpt-99")), ChatModel::Llama33Versatile70b);
        assert_eq!(ChatModel::resolve(None), ChatModel::default());
    }

    #[test]
    fn test_messages_order() {
        let mut req = CompletionRequest::new("be Mira", "Hello Mira", ChatModel::default());
        req.history.push(Message::new("assistant", "Hi"));
        let roles: Vec<_> = req.messages().into_iter().map(|m| m.role).collect();
        assert_eq!(roles, vec!["system", "assistant", "user"]);
    }
}
