use async_trait::async_trait;
use serde::Deserialize;
use serde_json::json;
use tracing::debug;

use crate::config::LlmConfig;
use crate::error::ApiError;

#[async_trait]
pub trait LlmClient: Send + Sync {
    /// Single-turn completion. Opaque, possibly-failing remote call.
    async fn complete(&self, prompt: &str) -> Result<String, ApiError>;
}

/// OpenAI-compatible chat-completions API client.
pub struct ChatCompletionsClient {
    http: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl ChatCompletionsClient {
    pub fn new(config: &LlmConfig) -> anyhow::Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(std::time::Duration::from_secs(20))
            .build()?;
        Ok(Self {
            http,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            model: config.model.clone(),
            api_key: config.api_key.clone(),
        })
    }
}

#[derive(Deserialize)]
struct Completion {
    choices: Vec<Choice>,
}

#[derive(Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Deserialize)]
struct ChoiceMessage {
    content: String,
}

#[async_trait]
impl LlmClient for ChatCompletionsClient {
    async fn complete(&self, prompt: &str) -> Result<String, ApiError> {
        let api_key = self
            .api_key
            .as_ref()
            .ok_or_else(|| ApiError::Upstream("language model is not configured".into()))?;

        let body = json!({
            "model": self.model,
            "messages": [{ "role": "user", "content": prompt }],
        });

        let response = self
            .http
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;

        if !response.status().is_success() {
            return Err(ApiError::Upstream(format!(
                "completion request failed with status {}",
                response.status()
            )));
        }

        let completion: Completion = response
            .json()
            .await
            .map_err(|e| ApiError::Upstream(e.to_string()))?;

        let text = completion
            .choices
            .into_iter()
            .next()
            .map(|c| c.message.content)
            .ok_or_else(|| ApiError::Upstream("completion response had no choices".into()))?;

        debug!(model = %self.model, chars = text.len(), "completion received");
        Ok(text)
    }
}
