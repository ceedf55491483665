use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use tracing::{debug, info};

use crate::asr::{AsrInput, AsrOptions, AsrOutcome, AsrProvider, AsrSegment};
use crate::error::{ProviderError, ProviderResult};

/// Client for the FunASR sidecar service.
///
/// The sidecar exposes `POST /transcribe` (multipart `file` or form
/// `audio_url`, plus `hotword`) and returns sentence-level segments with
/// millisecond timings and optional `spk` labels.
pub struct FunasrProvider {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Debug, Deserialize)]
struct TranscribeResponse {
    #[serde(default)]
    text: String,
    #[serde(default)]
    sentences: Vec<SentenceItem>,
}

#[derive(Debug, Deserialize)]
struct SentenceItem {
    #[serde(default)]
    text: String,
    /// Milliseconds.
    #[serde(default)]
    start: f64,
    /// Milliseconds.
    #[serde(default)]
    end: f64,
    #[serde(default)]
    spk: Option<serde_json::Value>,
}

impl FunasrProvider {
    pub fn new(base_url: String, timeout: Duration) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProviderError::from_http)?;
        info!(%base_url, "FunASR provider configured");
        Ok(Self { client, base_url })
    }

    fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url.trim_end_matches('/'), path)
    }

    fn parse(body: TranscribeResponse) -> AsrOutcome {
        let segments: Vec<AsrSegment> = body
            .sentences
            .into_iter()
            .filter(|s| !s.text.trim().is_empty())
            .map(|s| AsrSegment {
                text: s.text.trim().to_string(),
                start_s: s.start / 1000.0,
                end_s: s.end / 1000.0,
                speaker_label: s.spk.map(|v| match v {
                    serde_json::Value::String(label) => label,
                    other => other.to_string(),
                }),
            })
            .collect();

        AsrOutcome {
            full_text: body.text,
            segments,
        }
    }
}

#[async_trait]
impl AsrProvider for FunasrProvider {
    fn name(&self) -> &str {
        "funasr"
    }

    fn accepts_bytes(&self) -> bool {
        true
    }

    fn accepts_url(&self) -> bool {
        true
    }

    async fn recognize(&self, input: AsrInput, opts: &AsrOptions) -> ProviderResult<AsrOutcome> {
        let mut form = multipart::Form::new()
            .text("hotword", opts.hotword_blob.clone())
            .text("use_punc", if opts.enable_punctuation { "1" } else { "0" })
            .text("use_spk", if opts.enable_diarization { "1" } else { "0" });
        if let Some(lang) = &opts.language_hint {
            form = form.text("language", lang.clone());
        }

        form = match input {
            AsrInput::Bytes { filename, data } => {
                let part = multipart::Part::bytes(data).file_name(filename);
                form.part("file", part)
            }
            AsrInput::Url(url) => form.text("audio_url", url),
        };

        let response = self
            .client
            .post(self.endpoint("/transcribe"))
            .multipart(form)
            .send()
            .await
            .map_err(ProviderError::from_http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let body: TranscribeResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        let outcome = Self::parse(body);
        debug!(
            segments = outcome.segments.len(),
            chars = outcome.full_text.len(),
            "FunASR transcription complete"
        );
        Ok(outcome)
    }

    async fn ready(&self) -> bool {
        match self.client.get(self.endpoint("/health")).send().await {
            Ok(resp) => resp.status().is_success(),
            Err(_) => false,
        }
    }
}
