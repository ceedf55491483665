use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::error::{ProviderError, ProviderResult};
use crate::llm::{clean_completion, ChatPrompt, Completion, LlmOptions, LlmProvider};

/// Chat client for OpenAI-compatible endpoints.
///
/// Both the hosted DeepSeek API and the local qwen3 deployment speak this
/// protocol; they differ only in base URL, key, and model name.
pub struct OpenAiCompatProvider {
    name: String,
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
    model: String,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<ChatMessage<'a>>,
    temperature: f32,
    max_tokens: u32,
}

#[derive(Debug, Serialize)]
struct ChatMessage<'a> {
    role: &'static str,
    content: &'a str,
}

#[derive(Debug, Deserialize)]
struct ChatResponse {
    choices: Vec<Choice>,
    #[serde(default)]
    usage: Option<Usage>,
}

#[derive(Debug, Deserialize)]
struct Choice {
    message: ChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChoiceMessage {
    #[serde(default)]
    content: String,
}

#[derive(Debug, Deserialize)]
struct Usage {
    #[serde(default)]
    total_tokens: u32,
}

impl OpenAiCompatProvider {
    pub fn new(
        name: impl Into<String>,
        base_url: String,
        api_key: Option<String>,
        model: String,
        timeout: Duration,
    ) -> ProviderResult<Self> {
        let name = name.into();
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProviderError::from_http)?;
        info!(provider = %name, %base_url, %model, "LLM provider configured");
        Ok(Self {
            name,
            client,
            base_url,
            api_key,
            model,
        })
    }

    fn endpoint(&self) -> String {
        format!(
            "{}/chat/completions",
            self.base_url.trim_end_matches('/')
        )
    }
}

#[async_trait]
impl LlmProvider for OpenAiCompatProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, prompt: &ChatPrompt, opts: &LlmOptions) -> ProviderResult<Completion> {
        let mut messages = Vec::with_capacity(2);
        if let Some(system) = &prompt.system {
            messages.push(ChatMessage {
                role: "system",
                content: system,
            });
        }
        messages.push(ChatMessage {
            role: "user",
            content: &prompt.user,
        });

        let model = opts.model.as_deref().unwrap_or(&self.model);
        let request = ChatRequest {
            model,
            messages,
            temperature: opts.temperature,
            max_tokens: opts.max_tokens,
        };

        let mut builder = self.client.post(self.endpoint()).json(&request);
        if let Some(key) = &self.api_key {
            builder = builder.bearer_auth(key);
        }

        let response = builder.send().await.map_err(ProviderError::from_http)?;
        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let body: ChatResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let choice = body
            .choices
            .into_iter()
            .next()
            .ok_or_else(|| ProviderError::Decode("completion had no choices".into()))?;

        let text = clean_completion(&choice.message.content);
        let usage_tokens = body.usage.map(|u| u.total_tokens).unwrap_or(0);
        debug!(provider = %self.name, chars = text.len(), usage_tokens, "completion received");

        Ok(Completion { text, usage_tokens })
    }

    async fn ready(&self) -> bool {
        // The chat endpoint has no cheap probe; configuration presence is the
        // readiness signal, matching how the sidecars are reported.
        !self.base_url.is_empty()
    }
}
