use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};

use crate::assistant::{Assistant, AssistantOptions, DEFAULT_CHAT_MODEL, http_client, read_body};
use crate::error::{AssistantError, ConfigError};

const PROVIDER: &str = "ollama";

#[derive(Serialize)]
struct Payload<'a> {
    model: &'a str,
    messages: [ChatMessage<'a>; 1],
    stream: bool,
}

#[derive(Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Deserialize)]
struct ChatResponse {
    message: Option<ResponseMessage>,
}

#[derive(Deserialize)]
struct ResponseMessage {
    content: Option<String>,
}

/// Talks to `api/chat` servers (Ollama and OpenAI-alike) with a single
/// text-only user message. History is not sent: every request stands alone.
#[derive(Debug)]
pub struct ChatAssistant {
    client: Client,
    endpoint: Url,
    model: String,
    options: AssistantOptions,
}

impl ChatAssistant {
    pub fn new(mut options: AssistantOptions) -> Result<Self, ConfigError> {
        let endpoint = options.endpoint()?;
        let model = options
            .model
            .take()
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| DEFAULT_CHAT_MODEL.to_string());
        options.model = Some(model.clone());

        Ok(Self {
            client: http_client()?,
            endpoint,
            model,
            options,
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn parse(body: &[u8]) -> Result<String, AssistantError> {
        let response: ChatResponse =
            serde_json::from_slice(body).map_err(|e| AssistantError::MalformedResponse {
                provider: PROVIDER.to_string(),
                message: format!("failed to parse chat response: {e}"),
            })?;

        response
            .message
            .and_then(|m| m.content)
            .filter(|c| !c.is_empty())
            .ok_or_else(|| AssistantError::EmptyReply {
                provider: PROVIDER.to_string(),
            })
    }
}

#[async_trait]
impl Assistant for ChatAssistant {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn acknowledge(&self, input: &str) -> Result<String, AssistantError> {
        let payload = Payload {
            model: &self.model,
            messages: [ChatMessage {
                role: "user",
                content: input,
            }],
            stream: false,
        };

        let request = self.client.post(self.endpoint.clone()).json(&payload);
        let response = self.options.authorize(request).send().await;
        let body = read_body(PROVIDER, response).await?;

        Self::parse(&body)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn model_defaults_when_missing_or_blank() {
        let a = ChatAssistant::new(AssistantOptions::new("http://localhost:11434/api/chat"))
            .unwrap();
        assert_eq!(a.model(), "llama3");

        let a = ChatAssistant::new(AssistantOptions {
            model: Some(" ".to_string()),
            ..AssistantOptions::new("http://localhost:11434/api/chat")
        })
        .unwrap();
        assert_eq!(a.model(), "llama3");

        let a = ChatAssistant::new(AssistantOptions {
            model: Some("mistral".to_string()),
            ..AssistantOptions::new("http://localhost:11434/api/chat")
        })
        .unwrap();
        assert_eq!(a.model(), "mistral");
    }

    #[test]
    fn payload_has_single_user_message() {
        let payload = Payload {
            model: "llama3",
            messages: [ChatMessage {
                role: "user",
                content: "Hello",
            }],
            stream: false,
        };
        let v = serde_json::to_value(&payload).unwrap();
        assert_eq!(v["model"], "llama3");
        assert_eq!(v["messages"][0]["role"], "user");
        assert_eq!(v["messages"][0]["content"], "Hello");
        assert_eq!(v["messages"].as_array().unwrap().len(), 1);
        assert_eq!(v["stream"], false);
    }

    #[test]
    fn parse_distinguishes_empty_from_malformed() {
        assert_eq!(
            ChatAssistant::parse(br#"{"message":{"role":"assistant","content":"hi"}}"#).unwrap(),
            "hi"
        );
        assert!(matches!(
            ChatAssistant::parse(br#"{"message":{"content":""}}"#),
            Err(AssistantError::EmptyReply { .. })
        ));
        assert!(matches!(
            ChatAssistant::parse(br#"{"done":true}"#),
            Err(AssistantError::EmptyReply { .. })
        ));
        assert!(matches!(
            ChatAssistant::parse(b"<html>bad gateway</html>"),
            Err(AssistantError::MalformedResponse { .. })
        ));
    }
}
