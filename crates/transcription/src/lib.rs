pub mod audio;
pub mod diarize;
pub mod engine;
pub mod hotwords;
pub mod preprocess;
pub mod voiceprint_match;

use serde::{Deserialize, Serialize};

pub use engine::{AsrEngine, EngineError};
pub use hotwords::{HotwordRegistry, HotwordStats, HotwordTable};
pub use preprocess::AudioPreprocessor;
pub use voiceprint_match::{SpeakerEmbedder, VoiceprintMatcher};

/// One speaker-attributed utterance of the final transcript.
///
/// `speaker_id` is dense and 0-based after normalization; the identity
/// fields are only present when the voiceprint matcher cleared the
/// similarity threshold.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TranscriptSegment {
    pub text: String,
    pub start_s: f64,
    pub end_s: f64,
    pub speaker_id: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub speaker_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub employee_id: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub voice_similarity: Option<f64>,
}

impl TranscriptSegment {
    pub fn new(text: impl Into<String>, start_s: f64, end_s: f64, speaker_id: u32) -> Self {
        Self {
            text: text.into(),
            start_s,
            end_s,
            speaker_id,
            speaker_name: None,
            employee_id: None,
            voice_similarity: None,
        }
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Transcript {
    pub segments: Vec<TranscriptSegment>,
    pub full_text: String,
}

impl Transcript {
    pub fn from_segments(segments: Vec<TranscriptSegment>) -> Self {
        let full_text = join_segments(&segments);
        Self {
            segments,
            full_text,
        }
    }
}

/// Joins segment texts in order.
///
/// Latin word boundaries get a single space; CJK text and punctuation
/// boundaries concatenate directly, so the join is lossless up to
/// whitespace.
pub fn join_segments(segments: &[TranscriptSegment]) -> String {
    let mut out = String::new();
    for segment in segments {
        let text = segment.text.trim();
        if text.is_empty() {
            continue;
        }
        if let Some(last) = out.chars().last() {
            let first = text.chars().next().unwrap();
            if last.is_ascii_alphanumeric() && first.is_ascii_alphanumeric() {
                out.push(' ');
            }
        }
        out.push_str(text);
    }
    out
}
