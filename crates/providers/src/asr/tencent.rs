use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use hmac::{Hmac, Mac};
use serde::Deserialize;
use serde_json::json;
use sha2::{Digest, Sha256};
use tracing::{debug, info, warn};

use crate::asr::{AsrInput, AsrOptions, AsrOutcome, AsrProvider, AsrSegment};
use crate::error::{ProviderError, ProviderResult};

const ENDPOINT: &str = "asr.tencentcloudapi.com";
const SERVICE: &str = "asr";
const API_VERSION: &str = "2019-06-14";
const POLL_INTERVAL: Duration = Duration::from_secs(3);

/// Tencent cloud recording-file recognition.
///
/// The CreateRecTask API only accepts publicly reachable URLs, so this
/// provider rejects byte inputs; the engine maps that to a dedicated error
/// instead of silently downgrading.
pub struct TencentAsrProvider {
    client: reqwest::Client,
    secret_id: String,
    secret_key: String,
    region: String,
    engine_model: String,
    poll_budget: Duration,
}

#[derive(Debug, Deserialize)]
struct ApiEnvelope {
    #[serde(rename = "Response")]
    response: ApiResponse,
}

#[derive(Debug, Deserialize)]
struct ApiResponse {
    #[serde(rename = "Data")]
    data: Option<TaskData>,
    #[serde(rename = "Error")]
    error: Option<ApiError>,
}

#[derive(Debug, Deserialize)]
struct ApiError {
    #[serde(rename = "Code")]
    code: String,
    #[serde(rename = "Message")]
    message: String,
}

#[derive(Debug, Deserialize)]
struct TaskData {
    #[serde(rename = "TaskId", default)]
    task_id: u64,
    #[serde(rename = "Status", default)]
    status: i32,
    #[serde(rename = "Result", default)]
    result: String,
    #[serde(rename = "ErrorMsg", default)]
    error_msg: String,
}

impl TencentAsrProvider {
    pub fn new(
        secret_id: String,
        secret_key: String,
        region: String,
        engine_model: String,
        poll_budget: Duration,
    ) -> ProviderResult<Self> {
        if secret_id.is_empty() || secret_key.is_empty() {
            return Err(ProviderError::NotConfigured(
                "tencent secret id/key missing".into(),
            ));
        }
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(60))
            .build()
            .map_err(ProviderError::from_http)?;
        info!(%region, %engine_model, "Tencent ASR provider configured");
        Ok(Self {
            client,
            secret_id,
            secret_key,
            region,
            engine_model,
            poll_budget,
        })
    }

    /// TC3-HMAC-SHA256 request signing, per the cloud API v3 convention.
    fn sign(&self, action: &str, payload: &str, timestamp: i64) -> String {
        let date = chrono::DateTime::from_timestamp(timestamp, 0)
            .map(|dt| dt.format("%Y-%m-%d").to_string())
            .unwrap_or_default();

        let canonical_headers = format!(
            "content-type:application/json\nhost:{}\nx-tc-action:{}\n",
            ENDPOINT,
            action.to_lowercase()
        );
        let signed_headers = "content-type;host;x-tc-action";
        let hashed_payload = hex::encode(Sha256::digest(payload.as_bytes()));
        let canonical_request = format!(
            "POST\n/\n\n{}\n{}\n{}",
            canonical_headers, signed_headers, hashed_payload
        );

        let credential_scope = format!("{}/{}/tc3_request", date, SERVICE);
        let string_to_sign = format!(
            "TC3-HMAC-SHA256\n{}\n{}\n{}",
            timestamp,
            credential_scope,
            hex::encode(Sha256::digest(canonical_request.as_bytes()))
        );

        let secret_date = hmac_sha256(format!("TC3{}", self.secret_key).as_bytes(), date.as_bytes());
        let secret_service = hmac_sha256(&secret_date, SERVICE.as_bytes());
        let secret_signing = hmac_sha256(&secret_service, b"tc3_request");
        let signature = hex::encode(hmac_sha256(&secret_signing, string_to_sign.as_bytes()));

        format!(
            "TC3-HMAC-SHA256 Credential={}/{}, SignedHeaders={}, Signature={}",
            self.secret_id, credential_scope, signed_headers, signature
        )
    }

    async fn call(&self, action: &str, payload: serde_json::Value) -> ProviderResult<TaskData> {
        let body = payload.to_string();
        let timestamp = Utc::now().timestamp();
        let authorization = self.sign(action, &body, timestamp);

        let response = self
            .client
            .post(format!("https://{}", ENDPOINT))
            .header("Authorization", authorization)
            .header("Content-Type", "application/json")
            .header("Host", ENDPOINT)
            .header("X-TC-Action", action)
            .header("X-TC-Version", API_VERSION)
            .header("X-TC-Region", &self.region)
            .header("X-TC-Timestamp", timestamp.to_string())
            .body(body)
            .send()
            .await
            .map_err(ProviderError::from_http)?;

        let status = response.status();
        if !status.is_success() {
            let text = response.text().await.unwrap_or_default();
            return Err(ProviderError::from_status(status.as_u16(), text));
        }

        let envelope: ApiEnvelope = response
            .json()
            .await
            .map_err(|e| ProviderError::Decode(e.to_string()))?;

        if let Some(err) = envelope.response.error {
            return Err(match err.code.as_str() {
                c if c.starts_with("AuthFailure") => ProviderError::Auth(err.message),
                "RequestLimitExceeded" => ProviderError::RateLimited(err.message),
                c if c.starts_with("InternalError") => ProviderError::Unavailable {
                    status: 500,
                    message: err.message,
                },
                _ => ProviderError::BadRequest(format!("{}: {}", err.code, err.message)),
            });
        }

        envelope
            .response
            .data
            .ok_or_else(|| ProviderError::Decode("missing Data in response".into()))
    }

    async fn poll(&self, task_id: u64) -> ProviderResult<TaskData> {
        let deadline = tokio::time::Instant::now() + self.poll_budget;
        loop {
            if tokio::time::Instant::now() >= deadline {
                return Err(ProviderError::Timeout(format!(
                    "recognition task {} did not finish in time",
                    task_id
                )));
            }

            let data = self
                .call("DescribeTaskStatus", json!({ "TaskId": task_id }))
                .await?;

            match data.status {
                2 => return Ok(data),
                3 => {
                    return Err(ProviderError::BadRequest(format!(
                        "recognition failed: {}",
                        data.error_msg
                    )))
                }
                _ => tokio::time::sleep(POLL_INTERVAL).await,
            }
        }
    }

    /// Parses the `[m:s.xxx,m:s.xxx,channel]  text` line format the recording
    /// API returns in sentence mode.
    fn parse_result(result: &str) -> Vec<AsrSegment> {
        result
            .lines()
            .filter_map(parse_result_line)
            .collect()
    }
}

fn parse_result_line(line: &str) -> Option<AsrSegment> {
    let line = line.trim();
    let rest = line.strip_prefix('[')?;
    let (header, text) = rest.split_once(']')?;
    let mut parts = header.split(',');
    let start_s = parse_clock(parts.next()?)?;
    let end_s = parse_clock(parts.next()?)?;
    let speaker = parts.next().map(|s| s.trim().to_string());
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    Some(AsrSegment {
        text: text.to_string(),
        start_s,
        end_s,
        speaker_label: speaker,
    })
}

fn parse_clock(value: &str) -> Option<f64> {
    let (minutes, seconds) = value.trim().split_once(':')?;
    let minutes: f64 = minutes.parse().ok()?;
    let seconds: f64 = seconds.parse().ok()?;
    Some(minutes * 60.0 + seconds)
}

fn hmac_sha256(key: &[u8], message: &[u8]) -> Vec<u8> {
    let mut mac =
        Hmac::<Sha256>::new_from_slice(key).expect("HMAC accepts keys of any length");
    mac.update(message);
    mac.finalize().into_bytes().to_vec()
}

#[async_trait]
impl AsrProvider for TencentAsrProvider {
    fn name(&self) -> &str {
        "tencent"
    }

    fn accepts_bytes(&self) -> bool {
        false
    }

    fn accepts_url(&self) -> bool {
        true
    }

    async fn recognize(&self, input: AsrInput, opts: &AsrOptions) -> ProviderResult<AsrOutcome> {
        let url = match input {
            AsrInput::Url(url) => url,
            AsrInput::Bytes { .. } => {
                return Err(ProviderError::UnsupportedInput(
                    "tencent recording recognition requires a publicly reachable URL".into(),
                ))
            }
        };

        if !opts.hotword_blob.is_empty() {
            // The recording API takes pre-registered hotword table ids, not
            // inline vocabularies.
            warn!("inline hotwords are not supported by the tencent provider, ignoring");
        }

        let created = self
            .call(
                "CreateRecTask",
                json!({
                    "EngineModelType": self.engine_model,
                    "ChannelNum": 1,
                    "ResTextFormat": 0,
                    "SourceType": 0,
                    "Url": url,
                    "SpeakerDiarization": if opts.enable_diarization { 1 } else { 0 },
                    "SpeakerNumber": 0,
                    "FilterPunc": if opts.enable_punctuation { 0 } else { 1 },
                    "ConvertNumMode": 1,
                }),
            )
            .await?;

        if created.task_id == 0 {
            return Err(ProviderError::Decode("no TaskId in response".into()));
        }
        debug!(task_id = created.task_id, "recognition task submitted");

        let finished = self.poll(created.task_id).await?;
        let segments = Self::parse_result(&finished.result);
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
        !self.secret_id.is_empty() && !self.secret_key.is_empty()
    }
}
