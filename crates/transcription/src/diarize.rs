use std::collections::HashMap;
use std::time::Duration;

use reqwest::multipart;
use serde::Deserialize;
use tracing::{debug, info};

use scribeflow_providers::asr::{AsrInput, AsrSegment};
use scribeflow_providers::error::{ProviderError, ProviderResult};

use crate::TranscriptSegment;

/// One speaker-homogeneous region produced by the diarizer.
#[derive(Debug, Clone, PartialEq)]
pub struct DiarizerTurn {
    pub start_s: f64,
    pub end_s: f64,
    pub label: String,
}

/// Parses RTTM content:
/// `SPEAKER <file> 1 <start> <duration> <NA> <NA> <speaker> <NA> <NA>`.
pub fn parse_rttm(content: &str) -> Vec<DiarizerTurn> {
    let mut turns: Vec<DiarizerTurn> = content
        .lines()
        .filter(|line| !line.trim().is_empty() && !line.starts_with(";;"))
        .filter_map(|line| {
            let parts: Vec<&str> = line.split_whitespace().collect();
            if parts.len() < 8 || parts[0] != "SPEAKER" {
                return None;
            }
            let start: f64 = parts[3].parse().ok()?;
            let duration: f64 = parts[4].parse().ok()?;
            Some(DiarizerTurn {
                start_s: start,
                end_s: start + duration,
                label: parts[7].to_string(),
            })
        })
        .collect();
    turns.sort_by(|a, b| a.start_s.total_cmp(&b.start_s));
    turns
}

/// Picks the diarizer turn for `[start, end]` by maximum overlap; ties break
/// toward the earlier turn start, and a segment overlapping nothing goes to
/// the turn whose midpoint is nearest.
pub fn pick_turn<'a>(turns: &'a [DiarizerTurn], start: f64, end: f64) -> Option<&'a DiarizerTurn> {
    if turns.is_empty() {
        return None;
    }

    let mut best: Option<(&DiarizerTurn, f64)> = None;
    for turn in turns {
        let overlap = (end.min(turn.end_s) - start.max(turn.start_s)).max(0.0);
        let better = match best {
            None => true,
            Some((current, best_overlap)) => {
                overlap > best_overlap
                    || (overlap == best_overlap && turn.start_s < current.start_s)
            }
        };
        if better {
            best = Some((turn, overlap));
        }
    }

    let (chosen, best_overlap) = best?;
    if best_overlap > 0.0 {
        return Some(chosen);
    }

    // No overlap at all: nearest midpoint wins.
    let midpoint = (start + end) / 2.0;
    turns.iter().min_by(|a, b| {
        let da = ((a.start_s + a.end_s) / 2.0 - midpoint).abs();
        let db = ((b.start_s + b.end_s) / 2.0 - midpoint).abs();
        da.total_cmp(&db)
    })
}

/// Assigns diarizer labels to ASR segments that came back unlabeled.
pub fn assign_speakers(segments: &mut [AsrSegment], turns: &[DiarizerTurn]) {
    for segment in segments.iter_mut() {
        if segment.speaker_label.is_none() {
            segment.speaker_label =
                pick_turn(turns, segment.start_s, segment.end_s).map(|t| t.label.clone());
        }
    }
}

/// Converts raw provider segments into transcript segments with dense
/// 0-based speaker ids, assigned in order of first appearance.
pub fn densify(segments: Vec<AsrSegment>) -> Vec<TranscriptSegment> {
    let mut ids: HashMap<String, u32> = HashMap::new();
    let mut next = 0u32;

    segments
        .into_iter()
        .map(|segment| {
            let label = segment.speaker_label.unwrap_or_else(|| "0".to_string());
            let id = *ids.entry(label).or_insert_with(|| {
                let id = next;
                next += 1;
                id
            });
            TranscriptSegment::new(segment.text, segment.start_s, segment.end_s, id)
        })
        .collect()
}

#[derive(Debug, Deserialize)]
struct RttmResponse {
    #[serde(default)]
    rttm: String,
}

/// Client for the diarization sidecar (`POST {base}/rttm`).
///
/// Optional subsystem: constructed only when a sidecar URL is configured;
/// call sites branch on `Option<Diarizer>`.
pub struct Diarizer {
    client: reqwest::Client,
    base_url: String,
}

impl Diarizer {
    pub fn new(base_url: String, timeout: Duration) -> ProviderResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(ProviderError::from_http)?;
        info!(%base_url, "diarizer sidecar configured");
        Ok(Self { client, base_url })
    }

    pub async fn diarize(&self, input: AsrInput) -> ProviderResult<Vec<DiarizerTurn>> {
        let form = match input {
            AsrInput::Bytes { filename, data } => multipart::Form::new()
                .part("file", multipart::Part::bytes(data).file_name(filename)),
            AsrInput::Url(url) => multipart::Form::new().text("audio_url", url),
        };

        let response = self
            .client
            .post(format!("{}/rttm", self.base_url.trim_end_matches('/')))
            .multipart(form)
            .send()
            .await
            .map_err(ProviderError::from_http)?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), body));
        }

        let body: RttmResponse = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;
        let turns = parse_rttm(&body.rttm);
        debug!(turns = turns.len(), "diarization complete");
        Ok(turns)
    }

    pub async fn ready(&self) -> bool {
        self.client
            .get(format!("{}/health", self.base_url.trim_end_matches('/')))
            .send()
            .await
            .map(|r| r.status().is_success())
            .unwrap_or(false)
    }
}
