use reqwest::Client;
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::error::{ChatError, Result};
use crate::state::{ChatMessage, ChatRole};

#[derive(Serialize)]
struct CompletionRequestBody<'a> {
    model: &'a str,
    messages: &'a [ChatMessage],
    max_tokens: u32,
}

#[derive(Deserialize)]
struct CompletionChoice {
    message: CompletionResponseMessage,
}

#[derive(Deserialize)]
struct CompletionResponseMessage {
    #[serde(default)]
    role: Option<String>,
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize)]
struct CompletionResponse {
    choices: Vec<CompletionChoice>,
}

/// The first choice of a completion response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CompletionReply {
    pub role: ChatRole,
    pub content: String,
}

/// Client for an OpenAI-compatible `chat/completions` endpoint
#[derive(Clone)]
pub struct CompletionClient {
    client: Client,
    base_url: String,
    api_key: String,
    model: String,
}

impl CompletionClient {
    pub fn new(base_url: &str, api_key: &str, model: &str) -> Self {
        Self {
            client: Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key: api_key.to_string(),
            model: model.to_string(),
        }
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    pub fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    pub async fn request_completion(
        &self,
        messages: &[ChatMessage],
        max_tokens: u32,
    ) -> Result<CompletionReply> {
        let request = CompletionRequestBody {
            model: &self.model,
            messages,
            max_tokens,
        };

        debug!(
            model = %self.model,
            messages = messages.len(),
            max_tokens,
            "sending completion request"
        );

        let response = self
            .client
            .post(self.endpoint())
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(&request)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            let body = response.text().await.unwrap_or_default();
            return Err(ChatError::Api { status, body });
        }

        let body = response.text().await?;
        let parsed: CompletionResponse = serde_json::from_str(&body)
            .map_err(|e| ChatError::MalformedResponse(e.to_string()))?;

        let choice = parsed
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| {
                ChatError::MalformedResponse("response contained no choices".to_string())
            })?;

        Ok(CompletionReply {
            role: choice
                .message
                .role
                .as_deref()
                .and_then(ChatRole::from_str)
                .unwrap_or(ChatRole::Assistant),
            content: choice.message.content.unwrap_or_default(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_endpoint_joins_with_single_slash() {
        let with_slash = CompletionClient::new("https://openrouter.ai/api/v1/", "k", "gpt-4o");
        let without = CompletionClient::new("https://openrouter.ai/api/v1", "k", "gpt-4o");
        assert_eq!(with_slash.endpoint(), "https://openrouter.ai/api/v1/chat/completions");
        assert_eq!(without.endpoint(), with_slash.endpoint());
    }

    #[test]
    fn test_request_body_shape() {
        let messages = vec![
            ChatMessage { role: ChatRole::System, content: "Act as guide".to_string() },
            ChatMessage { role: ChatRole::User, content: "Hello".to_string() },
        ];
        let body = CompletionRequestBody {
            model: "gpt-4o",
            messages: &messages,
            max_tokens: 500,
        };
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(
            json,
            serde_json::json!({
                "model": "gpt-4o",
                "messages": [
                    {"role": "system", "content": "Act as guide"},
                    {"role": "user", "content": "Hello"}
                ],
                "max_tokens": 500
            })
        );
    }
}
