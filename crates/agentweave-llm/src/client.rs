use crate::types::*;
use anyhow::{Context, Result, anyhow};
use std::sync::Arc;
use tracing::{debug, info};

#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub base_url: String,
    pub api_key: Option<String>,
    pub model: String,
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            // LM Studio default
            base_url: "http://localhost:1234/v1".to_string(),
            api_key: None,
            model: "local-model".to_string(),
            temperature: Some(0.7),
            max_tokens: Some(4096),
        }
    }
}

/// The seam every generation call goes through. [`LlmClient`] talks to an
/// OpenAI-compatible endpoint; tests substitute scripted backends.
pub trait ChatBackend: Send + Sync {
    fn model_name(&self) -> &str;

    fn chat(
        &self,
        messages: Vec<Message>,
        overrides: Option<ModelOverrides>,
    ) -> impl Future<Output = Result<ChatResponse>> + Send;
}

impl<T: ChatBackend> ChatBackend for Arc<T> {
    fn model_name(&self) -> &str {
        (**self).model_name()
    }

    fn chat(
        &self,
        messages: Vec<Message>,
        overrides: Option<ModelOverrides>,
    ) -> impl Future<Output = Result<ChatResponse>> + Send {
        (**self).chat(messages, overrides)
    }
}

pub struct LlmClient {
    config: LlmConfig,
    http: reqwest::Client,
}

impl LlmClient {
    pub fn new(config: LlmConfig) -> Self {
        Self {
            config,
            http: reqwest::Client::new(),
        }
    }
}

impl ChatBackend for LlmClient {
    fn model_name(&self) -> &str {
        &self.config.model
    }

    async fn chat(
        &self,
        messages: Vec<Message>,
        overrides: Option<ModelOverrides>,
    ) -> Result<ChatResponse> {
        let url = format!("{}/chat/completions", self.config.base_url.trim_end_matches('/'));
        let overrides = overrides.unwrap_or_default();

        let request = ChatRequest {
            model: overrides
                .model
                .unwrap_or_else(|| self.config.model.clone()),
            messages,
            temperature: overrides.temperature.or(self.config.temperature),
            max_tokens: self.config.max_tokens,
        };

        debug!(
            "LLM request to {} (model={}, messages={})",
            url,
            request.model,
            request.messages.len()
        );

        let mut req_builder = self.http.post(&url).json(&request);

        if let Some(api_key) = &self.config.api_key {
            req_builder = req_builder.bearer_auth(api_key);
        }

        let response = req_builder
            .send()
            .await
            .context("Failed to send request to LLM")?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("LLM request failed ({}): {}", status, error_text);
        }

        let chat_response: ChatResponse = response
            .json()
            .await
            .context("Failed to parse LLM response")?;

        info!(
            "LLM response: finish_reason={:?}, usage={:?}",
            chat_response
                .choices
                .first()
                .and_then(|c| c.finish_reason.as_ref()),
            chat_response.usage.as_ref().map(|u| u.total_tokens)
        );

        Ok(chat_response)
    }
}

/// One-shot generation: a system instruction plus a user prompt in, the
/// model's text out.
pub async fn generate(
    backend: &impl ChatBackend,
    prompt: &str,
    system_instruction: &str,
    overrides: Option<ModelOverrides>,
) -> Result<String> {
    let messages = vec![Message::system(system_instruction), Message::user(prompt)];
    let response = backend.chat(messages, overrides).await?;
    response
        .first_text()
        .map(str::to_string)
        .ok_or_else(|| anyhow!("{} returned no text content", backend.model_name()))
}
