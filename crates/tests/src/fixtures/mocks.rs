use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;

use scribeflow_providers::asr::{AsrInput, AsrOptions, AsrOutcome, AsrProvider, AsrSegment};
use scribeflow_providers::error::{ProviderError, ProviderResult};
use scribeflow_providers::llm::{ChatPrompt, Completion, LlmOptions, LlmProvider};
use scribeflow_transcription::voiceprint_match::SpeakerEmbedder;

/// ASR mock producing a fixed two-speaker conversation inside [0, 30] s.
pub struct MockAsr;

#[async_trait]
impl AsrProvider for MockAsr {
    fn name(&self) -> &str {
        "mock-asr"
    }

    fn accepts_bytes(&self) -> bool {
        true
    }

    fn accepts_url(&self) -> bool {
        true
    }

    async fn recognize(&self, _input: AsrInput, opts: &AsrOptions) -> ProviderResult<AsrOutcome> {
        let mut segments = vec![
            AsrSegment {
                text: "大家好，我们开始今天的评审。".into(),
                start_s: 0.5,
                end_s: 8.0,
                speaker_label: None,
            },
            AsrSegment {
                text: "好的，我先汇报数据中台的进展。".into(),
                start_s: 8.5,
                end_s: 20.0,
                speaker_label: None,
            },
            AsrSegment {
                text: "辛苦了，下周继续跟进。".into(),
                start_s: 20.5,
                end_s: 29.0,
                speaker_label: None,
            },
        ];
        if opts.enable_diarization {
            segments[0].speaker_label = Some("SPEAKER_00".into());
            segments[1].speaker_label = Some("SPEAKER_01".into());
            segments[2].speaker_label = Some("SPEAKER_00".into());
        }
        let full_text = segments
            .iter()
            .map(|s| s.text.as_str())
            .collect::<Vec<_>>()
            .join("");
        Ok(AsrOutcome {
            full_text,
            segments,
        })
    }

    async fn ready(&self) -> bool {
        true
    }
}

/// One scripted LLM response step.
pub enum LlmStep {
    Text(String),
    Timeout,
}

/// LLM mock with a consumable failure script and a call counter.
///
/// When the script is exhausted, every call answers with fixed minutes.
pub struct MockLlm {
    pub calls: AtomicU32,
    script: Mutex<Vec<LlmStep>>,
}

impl MockLlm {
    pub fn new(script: Vec<LlmStep>) -> Arc<Self> {
        Arc::new(Self {
            calls: AtomicU32::new(0),
            script: Mutex::new(script),
        })
    }

    pub fn call_count(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    fn default_minutes() -> String {
        "# 会议纪要\n\n## 决策事项\n- 确认里程碑\n\n## 行动项\n| 任务 | 负责人 | 截止日期 |\n|------|--------|---------|\n| 联调 | 张三 | 未明确 |".into()
    }
}

#[async_trait]
impl LlmProvider for MockLlm {
    fn name(&self) -> &str {
        "mock-llm"
    }

    async fn complete(
        &self,
        _prompt: &ChatPrompt,
        _opts: &LlmOptions,
    ) -> ProviderResult<Completion> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let step = {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                None
            } else {
                Some(script.remove(0))
            }
        };
        match step {
            Some(LlmStep::Timeout) => Err(ProviderError::Timeout("injected".into())),
            Some(LlmStep::Text(text)) => Ok(Completion {
                text,
                usage_tokens: 321,
            }),
            None => Ok(Completion {
                text: Self::default_minutes(),
                usage_tokens: 321,
            }),
        }
    }

    async fn ready(&self) -> bool {
        true
    }
}

/// Speaker embedder returning one fixed vector for every clip.
pub struct MockSpeakerEmbedder {
    pub vector: Vec<f32>,
}

impl MockSpeakerEmbedder {
    pub fn matching(vector: Vec<f32>) -> Arc<Self> {
        Arc::new(Self { vector })
    }
}

#[async_trait]
impl SpeakerEmbedder for MockSpeakerEmbedder {
    async fn embed_speaker(&self, _wav_bytes: &[u8]) -> ProviderResult<Vec<f32>> {
        Ok(self.vector.clone())
    }

    async fn ready(&self) -> bool {
        true
    }
}
