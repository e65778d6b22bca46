use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use tracing::debug;

use super::{ChatCompletion, ChatCompletionRequest, ModelClient};
use crate::config::ProviderConfig;
use crate::error::{Error, Result};

/// Chat completions over HTTP against any OpenAI-compatible endpoint
pub struct OpenAiCompatibleClient {
    base_url: String,
    api_key: String,
    http_client: reqwest::Client,
}

impl OpenAiCompatibleClient {
    /// Default timeout for model requests (5 minutes)
    pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(300);
    pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(30);

    pub fn new(config: &ProviderConfig) -> Result<Self> {
        let http_client = reqwest::Client::builder()
            .timeout(Self::DEFAULT_TIMEOUT)
            .connect_timeout(Self::CONNECT_TIMEOUT)
            .build()?;

        Ok(Self {
            base_url: config.base_url.trim_end_matches('/').to_string(),
            api_key: config.api_key.clone(),
            http_client,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/chat/completions", self.base_url)
    }

    fn headers(&self) -> Result<HeaderMap> {
        let mut headers = HeaderMap::new();
        if !self.api_key.is_empty() {
            let value = HeaderValue::from_str(&format!("Bearer {}", self.api_key))
                .map_err(|_| Error::Config("Invalid API key format".to_string()))?;
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

#[async_trait]
impl ModelClient for OpenAiCompatibleClient {
    async fn complete(&self, request: ChatCompletionRequest) -> Result<ChatCompletion> {
        let url = self.endpoint();
        debug!(
            %url,
            model = %request.model,
            messages = request.messages.len(),
            tools = request.tools.len(),
            "Requesting chat completion"
        );

        let response = self
            .http_client
            .post(&url)
            .headers(self.headers()?)
            .json(&request)
            .send()
            .await
            .map_err(|e| Error::Model(format!("Failed to fetch {} {}", url, e)))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            let reason = if body.is_empty() {
                status.to_string()
            } else {
                format!("{}: {}", status, body)
            };
            return Err(Error::Model(format!("Failed to fetch {} {}", url, reason)));
        }

        let completion: ChatCompletion = response
            .json()
            .await
            .map_err(|e| Error::Model(format!("Failed to parse completion from {}: {}", url, e)))?;

        if let Some(usage) = completion.usage {
            debug!(
                prompt_tokens = usage.prompt_tokens,
                completion_tokens = usage.completion_tokens,
                "Chat completion usage"
            );
        }

        Ok(completion)
    }
}
