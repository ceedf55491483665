use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::multipart;
use serde::Deserialize;
use tracing::{debug, info, warn};

use scribeflow_providers::error::{ProviderError, ProviderResult};
use scribeflow_providers::voiceprint::VoiceprintStore;

use crate::audio::WavAudio;
use crate::{audio, TranscriptSegment};

/// Extracts a fixed-dimension speaker embedding from a voice clip.
#[async_trait]
pub trait SpeakerEmbedder: Send + Sync + 'static {
    async fn embed_speaker(&self, wav_bytes: &[u8]) -> ProviderResult<Vec<f32>>;

    async fn ready(&self) -> bool;
}

#[derive(Debug, Deserialize)]
struct EmbeddingResponse {
    #[serde(default)]
    embedding: Vec<f32>,
}

/// Client for the speaker-embedding sidecar
/// (`POST {base}/voiceprint/embedding`, Cam++ 192-dim output).
pub struct RemoteSpeakerEmbedder {
    client: reqwest::Client,
    base_url: String,
}

impl RemoteSpeakerEmbedder {
    pub fn new(base_url: String, timeout: Duration) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProviderError::from_http)?;
        info!(%base_url, "speaker embedder configured");
        Ok(Self { client, base_url })
    }
}

#[async_trait]
impl SpeakerEmbedder for RemoteSpeakerEmbedder {
    async fn embed_speaker(&self, wav_bytes: &[u8]) -> ProviderResult<Vec<f32>> {
        let part = multipart::Part::bytes(wav_bytes.to_vec()).file_name("clip.wav");
        let form = multipart::Form::new().part("file", part);

        let response = self
            .client
            .post(format!(
                "{}/voiceprint/embedding",
                self.base_url.trim_end_matches('/')
            ))
            .multipart(form)
            .send()
            .await
            .map_err(ProviderError::from_http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let body: EmbeddingResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        if body.embedding.is_empty() {
            return Err(ProviderError::Decode("empty speaker embedding".into()));
        }
        Ok(body.embedding)
    }

    async fn ready(&self) -> bool {
        self.client
            .get(format!("{}/health", self.base_url.trim_end_matches('/')))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}

/// Attaches employee identities to diarized segments.
///
/// Best-effort by contract: any failure (short clip, embedder error, store
/// unavailable) leaves the numeric speaker ids untouched.
pub struct VoiceprintMatcher {
    embedder: Arc<dyn SpeakerEmbedder>,
    store: Arc<VoiceprintStore>,
    similarity_threshold: f64,
    clip_secs: f64,
}

impl VoiceprintMatcher {
    pub fn new(
        embedder: Arc<dyn SpeakerEmbedder>,
        store: Arc<VoiceprintStore>,
        similarity_threshold: f64,
        clip_secs: f64,
    ) -> Self {
        Self {
            embedder,
            store,
            similarity_threshold,
            clip_secs,
        }
    }

    /// Runs matching over the full request audio and its segments.
    pub async fn match_speakers(&self, recording: &WavAudio, segments: &mut [TranscriptSegment]) {
        let registered = match self.store.count().await {
            Ok(0) => {
                debug!("voiceprint collection empty, skipping match");
                return;
            }
            Ok(n) => n,
            Err(e) => {
                warn!(%e, "voiceprint store unavailable, skipping match");
                return;
            }
        };
        debug!(registered, "matching speakers against voiceprint library");

        // Longest contiguous utterance per speaker id.
        let mut best_clip: HashMap<u32, (f64, f64)> = HashMap::new();
        for segment in segments.iter() {
            let length = segment.end_s - segment.start_s;
            let entry = best_clip
                .entry(segment.speaker_id)
                .or_insert((segment.start_s, segment.end_s));
            if length > entry.1 - entry.0 {
                *entry = (segment.start_s, segment.end_s);
            }
        }

        for (speaker_id, (start, end)) in best_clip {
            let clip = recording.slice(start, end).central_trim(self.clip_secs);
            if clip.duration_secs() < 0.5 {
                debug!(speaker_id, "clip too short for voiceprint matching");
                continue;
            }
            let Ok(wav) = audio::encode_wav(&clip) else {
                continue;
            };

            let embedding = match self.embedder.embed_speaker(&wav).await {
                Ok(embedding) => embedding,
                Err(e) => {
                    warn!(speaker_id, %e, "speaker embedding failed");
                    continue;
                }
            };

            let hit = match self.store.match_top1(&embedding).await {
                Ok(Some(hit)) => hit,
                Ok(None) => continue,
                Err(e) => {
                    warn!(speaker_id, %e, "voiceprint query failed");
                    continue;
                }
            };

            if hit.similarity < self.similarity_threshold {
                debug!(
                    speaker_id,
                    similarity = hit.similarity,
                    "best match below threshold"
                );
                continue;
            }

            info!(
                speaker_id,
                employee_id = %hit.employee_id,
                name = %hit.name,
                similarity = hit.similarity,
                "speaker identified"
            );
            for segment in segments.iter_mut() {
                if segment.speaker_id == speaker_id {
                    segment.speaker_name = Some(hit.name.clone());
                    segment.employee_id = Some(hit.employee_id.clone());
                    segment.voice_similarity = Some(hit.similarity);
                }
            }
        }
    }
}
