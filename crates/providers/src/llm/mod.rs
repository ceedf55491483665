pub mod openai_compat;

use async_trait::async_trait;

use crate::error::ProviderResult;

/// A resolved prompt pair.
#[derive(Debug, Clone, Default)]
pub struct ChatPrompt {
    pub system: Option<String>,
    pub user: String,
}

#[derive(Debug, Clone)]
pub struct LlmOptions {
    /// Sampling temperature in [0, 2].
    pub temperature: f32,
    pub max_tokens: u32,
    /// Overrides the provider's configured model when set.
    pub model: Option<String>,
}

impl Default for LlmOptions {
    fn default() -> Self {
        Self {
            temperature: 0.7,
            max_tokens: 2000,
            model: None,
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Completion {
    pub text: String,
    pub usage_tokens: u32,
}

/// Contract for chat-completion providers.
#[async_trait]
pub trait LlmProvider: Send + Sync + 'static {
    fn name(&self) -> &str;

    async fn complete(&self, prompt: &ChatPrompt, opts: &LlmOptions) -> ProviderResult<Completion>;

    async fn ready(&self) -> bool;
}

/// Strips reasoning blocks and stray markdown fences that some models emit
/// before the actual minutes.
pub fn clean_completion(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    let mut rest = text;
    while let Some(open) = rest.find("<think>") {
        out.push_str(&rest[..open]);
        match rest[open..].find("</think>") {
            Some(close) => rest = &rest[open + close + "</think>".len()..],
            None => {
                rest = "";
                break;
            }
        }
    }
    out.push_str(rest);

    out.replace("```markdown", "")
        .replace("```", "")
        .trim()
        .to_string()
}
