use crate::{config, log_internal};
use anyhow::Result;

#[derive(Clone, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ChatMessage {
    pub role: ChatMessageRole,
    pub content: String,
}

#[allow(non_camel_case_types)] // Serialized literally; case matters
#[derive(Clone, Copy, Debug, PartialEq, serde::Serialize, serde::Deserialize)]
pub enum ChatMessageRole {
    system,
    user,
    assistant,
}

impl ChatMessage {
    pub fn system(content: impl Into<String>) -> Self {
        Self {
            role: ChatMessageRole::system,
            content: content.into(),
        }
    }

    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatMessageRole::user,
            content: content.into(),
        }
    }
}

/// Something that continues a chat conversation.
#[serenity::async_trait]
pub trait LanguageModel: Send + Sync {
    /// Returns the assistant's reply.  With `json` set the reply is asked to be a JSON document.
    async fn chat(&self, messages: Vec<ChatMessage>, json: bool) -> Result<String>;
}

#[derive(serde::Serialize)]
struct LlmChatRequest<'a> {
    /// LLM model name
    model: &'a str,
    /// Whether to stream one token at a time, or return entire response is one go
    stream: bool,
    /// Chat conversation to continue.
    messages: Vec<ChatMessage>,
    /// Constrain the output format, e.g. `json`
    #[serde(skip_serializing_if = "Option::is_none")]
    format: Option<&'static str>,
    options: LlmOptions,
}

#[derive(serde::Serialize)]
struct LlmOptions {
    /// Context size
    num_ctx: usize,
    /// LLM temperature
    temperature: f32,
}

#[derive(serde::Deserialize)]
struct LlmChatResponse {
    message: ChatMessage,
}

/// HTTP chat endpoint speaking the Ollama `/api/chat` format.
pub struct ChatEndpoint {
    client: reqwest::Client,
    settings: config::Llm,
}

impl ChatEndpoint {
    pub fn new(settings: config::Llm) -> Self {
        Self {
            client: reqwest::Client::new(),
            settings,
        }
    }
}

#[serenity::async_trait]
impl LanguageModel for ChatEndpoint {
    async fn chat(&self, messages: Vec<ChatMessage>, json: bool) -> Result<String> {
        let url = self.settings.chat_url.as_str();
        let request = LlmChatRequest {
            model: &self.settings.model_name,
            stream: false,
            messages,
            format: json.then_some("json"),
            options: LlmOptions {
                num_ctx: self.settings.context_size,
                temperature: self.settings.temperature,
            },
        };

        log_internal!("Sending request to chat endpoint {}... ", url);
        let mut builder = self.client.post(url).json(&request);
        if !self.settings.api_key.is_empty() {
            builder = builder.bearer_auth(&self.settings.api_key);
        }
        let response = builder
            .send()
            .await?
            .error_for_status()?
            .json::<LlmChatResponse>()
            .await?;
        log_internal!("Sending request to chat endpoint {}... done", url);

        Ok(response.message.content)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn request_serializes_in_chat_format() {
        let request = LlmChatRequest {
            model: "m",
            stream: false,
            messages: vec![ChatMessage::system("s"), ChatMessage::user("u")],
            format: Some("json"),
            options: LlmOptions {
                num_ctx: 2048,
                temperature: 0.5,
            },
        };

        assert_eq!(
            serde_json::to_value(&request).unwrap(),
            json!({
                "model": "m",
                "stream": false,
                "messages": [
                    {"role": "system", "content": "s"},
                    {"role": "user", "content": "u"},
                ],
                "format": "json",
                "options": {"num_ctx": 2048, "temperature": 0.5},
            })
        );
    }

    #[test]
    fn plain_requests_omit_format() {
        let request = LlmChatRequest {
            model: "m",
            stream: false,
            messages: Vec::new(),
            format: None,
            options: LlmOptions {
                num_ctx: 1,
                temperature: 0.0,
            },
        };

        let value = serde_json::to_value(&request).unwrap();
        assert!(value.get("format").is_none());
    }

    #[test]
    fn response_message_is_extracted() {
        let response: LlmChatResponse = serde_json::from_value(json!({
            "model": "m",
            "message": {"role": "assistant", "content": "hello"},
            "done": true,
        }))
        .unwrap();

        assert_eq!(response.message.role, ChatMessageRole::assistant);
        assert_eq!(response.message.content, "hello");
    }
}
