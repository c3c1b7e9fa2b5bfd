use async_trait::async_trait;
use reqwest::{Client, Url};
use serde::Deserialize;

use crate::assistant::{Assistant, AssistantOptions, http_client, read_body};
use crate::error::{AssistantError, ConfigError};

const PROVIDER: &str = "transformers";

/// Expected shape: `{"output": "..."}`
#[derive(Deserialize)]
struct QueryResponse {
    output: Option<String>,
}

/// Read-only assistant for fine-tuned endpoints that take the prompt as a
/// `text` query parameter, such as a HuggingFace Docker space.
#[derive(Debug)]
pub struct QueryAssistant {
    client: Client,
    endpoint: Url,
    options: AssistantOptions,
}

impl QueryAssistant {
    pub fn new(options: AssistantOptions) -> Result<Self, ConfigError> {
        Ok(Self {
            client: http_client()?,
            endpoint: options.endpoint()?,
            options,
        })
    }

    /// Append `text=<input>`, keeping any query the endpoint already carries.
    fn url_for(&self, input: &str) -> Url {
        let mut url = self.endpoint.clone();
        url.query_pairs_mut().append_pair("text", input);
        url
    }

    fn parse(body: &[u8]) -> Result<String, AssistantError> {
        let response: QueryResponse =
            serde_json::from_slice(body).map_err(|e| AssistantError::MalformedResponse {
                provider: PROVIDER.to_string(),
                message: format!("failed to parse query response: {e}"),
            })?;

        response
            .output
            .filter(|o| !o.is_empty())
            .ok_or_else(|| AssistantError::EmptyReply {
                provider: PROVIDER.to_string(),
            })
    }
}

#[async_trait]
impl Assistant for QueryAssistant {
    fn provider(&self) -> &str {
        PROVIDER
    }

    async fn acknowledge(&self, input: &str) -> Result<String, AssistantError> {
        let request = self.client.get(self.url_for(input));
        let response = self.options.authorize(request).send().await;
        let body = read_body(PROVIDER, response).await?;

        Self::parse(&body)
    }
}
