use async_trait::async_trait;
use driftbot_core::types::{ChatMessage, LLMResponse, ToolCallRequest};
use driftbot_core::{Error, Result};
use reqwest::Client;
use serde::Deserialize;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::client::build_http_client;
use crate::Provider;

/// Backend for OpenAI-compatible chat completions APIs. Covers OpenAI
/// itself plus OpenRouter, DeepSeek and Groq, which all speak the same
/// `/chat/completions` dialect.
pub struct OpenAIProvider {
    client: Client,
    api_key: String,
    api_base: String,
    model: String,
    max_tokens: u32,
    temperature: f32,
}

impl OpenAIProvider {
    pub fn new(
        api_key: &str,
        api_base: Option<&str>,
        model: &str,
        max_tokens: u32,
        temperature: f32,
        proxy: Option<&str>,
    ) -> Self {
        let resolved_base = api_base
            .unwrap_or("https://api.openai.com/v1")
            .trim_end_matches('/')
            .to_string();
        let client = build_http_client(proxy, &resolved_base, Duration::from_secs(120));
        Self {
            client,
            api_key: api_key.to_string(),
            api_base: resolved_base,
            model: model.to_string(),
            max_tokens,
            temperature,
        }
    }

    fn build_request(&self, messages: &[ChatMessage], tools: &[Value]) -> Value {
        let mut request = serde_json::json!({
            "model": self.model,
            "messages": messages,
            "max_tokens": self.max_tokens,
            "temperature": self.temperature,
        });
        if !tools.is_empty() {
            request["tools"] = Value::Array(tools.to_vec());
            request["tool_choice"] = Value::String("auto".to_string());
        }
        request
    }

    fn parse_response(raw_body: &str) -> Result<LLMResponse> {
        let resp: ChatCompletionResponse = serde_json::from_str(raw_body).map_err(|e| {
            let preview_end = raw_body
                .char_indices()
                .nth(500)
                .map(|(i, _)| i)
                .unwrap_or(raw_body.len());
            Error::Provider(format!(
                "Failed to parse chat completion response: {}. Body: {}",
                e,
                &raw_body[..preview_end]
            ))
        })?;

        let choice = resp
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| Error::Provider("Chat completion response has no choices".to_string()))?;

        let tool_calls = choice.message.tool_calls.unwrap_or_default();
        let content = choice.message.content.filter(|c| !c.is_empty());

        let finish_reason = if !tool_calls.is_empty() {
            "tool_calls".to_string()
        } else {
            choice.finish_reason.unwrap_or_else(|| "stop".to_string())
        };

        Ok(LLMResponse {
            content,
            tool_calls,
            finish_reason,
            usage: resp.usage.unwrap_or(Value::Null),
        })
    }
}

#[async_trait]
impl Provider for OpenAIProvider {
    async fn chat(&self, messages: &[ChatMessage], tools: &[Value]) -> Result<LLMResponse> {
        let url = format!("{}/chat/completions", self.api_base);
        let request = self.build_request(messages, tools);

        info!(
            url = %url,
            model = %self.model,
            tools_count = tools.len(),
            messages_count = messages.len(),
            "Calling chat completions API"
        );

        let response = self
            .client
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Provider(format!("Chat completion request failed: {}", e)))?;

        let status = response.status();
        let raw_body = response.text().await.unwrap_or_default();

        if !status.is_success() {
            error!(status = %status, body = %raw_body, "Chat completions API error");
            return Err(Error::Provider(format!(
                "Chat completions API error {}: {}",
                status, raw_body
            )));
        }

        debug!(body_len = raw_body.len(), "Chat completions raw response");

        let parsed = Self::parse_response(&raw_body)?;

        info!(
            content_len = parsed.content.as_deref().map(str::len).unwrap_or(0),
            tool_calls_count = parsed.tool_calls.len(),
            finish_reason = %parsed.finish_reason,
            "Chat completion parsed"
        );

        Ok(parsed)
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    #[serde(default)]
    usage: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatResponseMessage,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatResponseMessage {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Option<Vec<ToolCallRequest>>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_request_with_tools() {
        let provider = OpenAIProvider::new("sk-test", None, "gpt-4o-mini", 1024, 0.5, None);
        let messages = vec![ChatMessage::user("hello")];
        let tools = vec![serde_json::json!({
            "type": "function",
            "function": {"name": "web_search", "parameters": {}}
        })];
        let request = provider.build_request(&messages, &tools);
        assert_eq!(request["model"], "gpt-4o-mini");
        assert_eq!(request["tool_choice"], "auto");
        assert_eq!(request["tools"].as_array().unwrap().len(), 1);

        let bare = provider.build_request(&messages, &[]);
        assert!(bare.get("tools").is_none());
    }

    #[test]
    fn test_parse_content_response() {
        let body = r#"{
            "choices": [{"message": {"content": "done"}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 10, "completion_tokens": 2}
        }"#;
        let resp = OpenAIProvider::parse_response(body).unwrap();
        assert_eq!(resp.content.as_deref(), Some("done"));
        assert!(resp.tool_calls.is_empty());
        assert_eq!(resp.finish_reason, "stop");
        assert_eq!(resp.usage["prompt_tokens"], 10);
    }

    #[test]
    fn test_parse_tool_call_response() {
        let body = r#"{
            "choices": [{
                "message": {
                    "content": null,
                    "tool_calls": [{
                        "id": "call_1",
                        "type": "function",
                        "function": {"name": "browse", "arguments": "{\"url\": \"https://example.com\"}"}
                    }]
                },
                "finish_reason": "tool_calls"
            }]
        }"#;
        let resp = OpenAIProvider::parse_response(body).unwrap();
        assert!(resp.content.is_none());
        assert_eq!(resp.tool_calls.len(), 1);
        assert_eq!(resp.tool_calls[0].name, "browse");
        assert_eq!(resp.tool_calls[0].arguments["url"], "https://example.com");
        assert_eq!(resp.finish_reason, "tool_calls");
    }

    #[test]
    fn test_parse_empty_choices_is_error() {
        let body = r#"{"choices": []}"#;
        assert!(OpenAIProvider::parse_response(body).is_err());
    }
}
