use std::path::Path;

use serde::Deserialize;
use tracing::{debug, warn};

use scribeflow_providers::llm::ChatPrompt;

use crate::error::{ServiceError, ServiceResult};

const DEFAULT_PRESET: &str = include_str!("../presets/default.json");
const SIMPLE_PRESET: &str = include_str!("../presets/simple.json");
const ACTION_ITEMS_PRESET: &str = include_str!("../presets/action-items.json");

/// Embedded presets in display order.
const ALL_PRESETS: &[(&str, &str)] = &[
    ("default", DEFAULT_PRESET),
    ("simple", SIMPLE_PRESET),
    ("action-items", ACTION_ITEMS_PRESET),
];

#[derive(Debug, Deserialize)]
struct PresetFile {
    #[allow(dead_code)]
    id: String,
    system_prompt: String,
}

/// An inline JSON template: `{"prompt": "..."}` with optional name.
#[derive(Debug, Deserialize)]
struct InlineTemplate {
    prompt: Option<String>,
    system_prompt: Option<String>,
}

/// The resolved system prompt plus where it came from (for logging).
#[derive(Debug, Clone)]
pub struct ResolvedTemplate {
    pub system: String,
    pub source: &'static str,
}

/// Resolves the request `template` field and renders the final prompt pair.
pub struct TemplateResolver {
    max_prompt_tokens: usize,
}

impl TemplateResolver {
    pub fn new(max_prompt_tokens: usize) -> Self {
        Self { max_prompt_tokens }
    }

    /// Resolution order: preset id, existing file path, inline JSON object
    /// with a prompt key, then the raw string as the system prompt.
    pub fn resolve(&self, template: &str) -> ResolvedTemplate {
        let template = template.trim();
        let template = if template.is_empty() { "default" } else { template };

        if let Some((_, raw)) = ALL_PRESETS.iter().find(|(id, _)| *id == template) {
            let preset: PresetFile =
                serde_json::from_str(raw).expect("embedded presets are valid JSON");
            debug!(preset = template, "using embedded template preset");
            return ResolvedTemplate {
                system: preset.system_prompt,
                source: "preset",
            };
        }

        let path = Path::new(template);
        if path.is_file() {
            if let Some(resolved) = self.resolve_file(path) {
                return resolved;
            }
        }

        if template.starts_with('{') {
            if let Ok(inline) = serde_json::from_str::<InlineTemplate>(template) {
                if let Some(prompt) = inline.prompt.or(inline.system_prompt) {
                    debug!("using inline JSON template");
                    return ResolvedTemplate {
                        system: prompt,
                        source: "inline-json",
                    };
                }
            }
            warn!("template looked like JSON but had no prompt key, using it verbatim");
        }

        ResolvedTemplate {
            system: template.to_string(),
            source: "raw",
        }
    }

    fn resolve_file(&self, path: &Path) -> Option<ResolvedTemplate> {
        let extension = path.extension()?.to_str()?.to_ascii_lowercase();
        let content = match std::fs::read_to_string(path) {
            Ok(content) => content,
            Err(e) => {
                warn!(path = %path.display(), %e, "template file unreadable, falling back");
                return None;
            }
        };

        match extension.as_str() {
            "md" | "txt" => Some(ResolvedTemplate {
                system: content,
                source: "file",
            }),
            "json" => match serde_json::from_str::<InlineTemplate>(&content) {
                Ok(inline) => inline
                    .prompt
                    .or(inline.system_prompt)
                    .map(|system| ResolvedTemplate {
                        system,
                        source: "file",
                    }),
                Err(e) => {
                    warn!(path = %path.display(), %e, "template file is not valid JSON");
                    None
                }
            },
            _ => None,
        }
    }

    /// Renders the `(system, user)` pair: transcript, then historical
    /// context, then the user requirement.
    pub fn render(
        &self,
        template: &ResolvedTemplate,
        transcript: &str,
        history: Option<&str>,
        user_requirement: Option<&str>,
    ) -> ServiceResult<ChatPrompt> {
        let mut user = String::with_capacity(transcript.len() + 256);
        user.push_str("【会议转录文本】\n");
        user.push_str(transcript);

        if let Some(history) = history.filter(|h| !h.trim().is_empty()) {
            user.push_str("\n\n【历史会议参考】\n");
            user.push_str(history);
            user.push_str("\n请在生成纪要时考虑历史背景和延续性。");
        }

        if let Some(requirement) = user_requirement.filter(|r| !r.trim().is_empty()) {
            user.push_str("\n\n【用户特别要求】\n");
            user.push_str(requirement);
            user.push_str("\n请重点关注用户要求的内容。");
        }

        let estimated = estimate_tokens(&template.system) + estimate_tokens(&user);
        if estimated > self.max_prompt_tokens {
            return Err(ServiceError::ContextLength(format!(
                "prompt is ~{} tokens, limit is {}",
                estimated, self.max_prompt_tokens
            )));
        }

        Ok(ChatPrompt {
            system: Some(template.system.clone()),
            user,
        })
    }

    pub fn preset_ids() -> Vec<&'static str> {
        ALL_PRESETS.iter().map(|(id, _)| *id).collect()
    }
}

/// Rough token estimate: CJK is ~1 token per character, ASCII ~4 characters
/// per token.
fn estimate_tokens(text: &str) -> usize {
    let mut ascii = 0usize;
    let mut wide = 0usize;
    for c in text.chars() {
        if c.is_ascii() {
            ascii += 1;
        } else {
            wide += 1;
        }
    }
    ascii / 4 + wide
}
