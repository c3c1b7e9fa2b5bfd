pub mod chat;
pub mod query;

use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, RequestBuilder, Response, Url};

use crate::error::{AssistantError, ConfigError};

pub use chat::ChatAssistant;
pub use query::QueryAssistant;

/// Cap on backend response bodies (2MB).
pub const MAX_RESPONSE_BYTES: usize = 2 * 1024 * 1024;

/// Model used by the chat backend when none is configured.
pub const DEFAULT_CHAT_MODEL: &str = "llama3";

/// A text-generation backend. Each implementation translates its own wire
/// shape into this contract and performs exactly one remote call per
/// invocation. Retries belong to the engine, never to the assistant.
#[async_trait]
pub trait Assistant: Send + Sync {
    /// Provider name used in logs and error messages.
    fn provider(&self) -> &str;

    /// Returns a non-empty reply for `input`. An empty reply is an error.
    async fn acknowledge(&self, input: &str) -> Result<String, AssistantError>;
}

/// Configuration shared by every [`Assistant`] implementation.
#[derive(Clone, Default)]
pub struct AssistantOptions {
    /// Endpoint of the prompt server. Required.
    pub url: String,
    /// Bearer token for authenticated servers.
    pub api_key: Option<String>,
    /// Pretrained model name, for servers that host more than one.
    pub model: Option<String>,
}

impl std::fmt::Debug for AssistantOptions {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AssistantOptions")
            .field("url", &self.url)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("model", &self.model)
            .finish()
    }
}

impl AssistantOptions {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    /// Parse the endpoint. An empty URL is a construction error, not a request error.
    pub(crate) fn endpoint(&self) -> Result<Url, ConfigError> {
        let url = self.url.trim();
        if url.is_empty() {
            return Err(ConfigError::MissingUrl);
        }
        Url::parse(url).map_err(|e| ConfigError::InvalidUrl {
            url: url.to_string(),
            message: e.to_string(),
        })
    }

    pub(crate) fn authorize(&self, builder: RequestBuilder) -> RequestBuilder {
        match self.api_key.as_deref().filter(|k| !k.is_empty()) {
            Some(key) => builder.bearer_auth(key),
            None => builder,
        }
    }
}

/// Which backend wire shape to talk to.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AssistantKind {
    /// `api/chat` servers (Ollama, OpenAI-alike).
    Chat,
    /// Plain GET endpoint taking `?text=` and returning `{"output": ...}`.
    #[default]
    Query,
}

impl FromStr for AssistantKind {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "chat" | "ollama" => Ok(Self::Chat),
            "query" | "transformers" => Ok(Self::Query),
            other => Err(ConfigError::UnknownValue {
                field: "backend",
                value: other.to_string(),
            }),
        }
    }
}

/// Construct the assistant for `kind`. Fails before any network I/O on bad config.
pub fn build(
    kind: AssistantKind,
    options: AssistantOptions,
) -> Result<Arc<dyn Assistant>, ConfigError> {
    Ok(match kind {
        AssistantKind::Chat => Arc::new(ChatAssistant::new(options)?),
        AssistantKind::Query => Arc::new(QueryAssistant::new(options)?),
    })
}

/// One connection per call: adapters keep no pooled state between invocations.
pub(crate) fn http_client() -> Result<Client, ConfigError> {
    Client::builder()
        .connect_timeout(Duration::from_secs(10))
        .pool_max_idle_per_host(0)
        .build()
        .map_err(|e| ConfigError::Client(e.to_string()))
}

/// Check status and read the body under [`MAX_RESPONSE_BYTES`].
pub(crate) async fn read_body(
    provider: &str,
    response: Result<Response, reqwest::Error>,
) -> Result<Vec<u8>, AssistantError> {
    let transport = |message: String, status: Option<u16>| AssistantError::TransportFailure {
        provider: provider.to_string(),
        message,
        status,
    };
    // An oversized body will be oversized again; not worth a retry.
    let too_large = |len: u64| AssistantError::MalformedResponse {
        provider: provider.to_string(),
        message: format!("response too large: {len} bytes (max {MAX_RESPONSE_BYTES})"),
    };

    let response = response.map_err(|e| transport(format!("request failed: {e}"), None))?;
    let status = response.status();
    if !status.is_success() {
        let body = response.bytes().await.unwrap_or_default();
        let truncated = &body[..body.len().min(512)];
        return Err(transport(
            format!("{status}: {}", String::from_utf8_lossy(truncated)),
            Some(status.as_u16()),
        ));
    }

    if let Some(len) = response.content_length()
        && len > MAX_RESPONSE_BYTES as u64
    {
        return Err(too_large(len));
    }

    let bytes = response
        .bytes()
        .await
        .map_err(|e| transport(format!("failed to read response body: {e}"), None))?;

    if bytes.len() > MAX_RESPONSE_BYTES {
        return Err(too_large(bytes.len() as u64));
    }

    Ok(bytes.to_vec())
}
