use axum::{Json, extract::Multipart, extract::State, http::StatusCode};
use serde::Serialize;
use serde_json::json;
use tracing::{info, warn};

use scribeflow_providers::voiceprint::VOICEPRINT_DIM;
use scribeflow_transcription::audio;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
pub struct RegisterResponse {
    pub code: u16,
    pub message: String,
    pub data: Option<serde_json::Value>,
}

/// Registers an employee voiceprint from a short voice clip.
///
/// Codes follow the upstream convention: 200 ok, 400 audio too short or
/// quality failure, 500 internal.
pub async fn register(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<(StatusCode, Json<RegisterResponse>), ApiError> {
    let mut clip: Option<(String, Vec<u8>)> = None;
    let mut name: Option<String> = None;
    let mut employee_id: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("multipart error: {}", e)))?
    {
        match field.name().unwrap_or("") {
            "file" => {
                let filename = field.file_name().unwrap_or("clip.wav").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read file: {}", e)))?;
                clip = Some((filename, bytes.to_vec()));
            }
            "name" => name = Some(field.text().await.unwrap_or_default()),
            "employee_id" => employee_id = Some(field.text().await.unwrap_or_default()),
            _ => {}
        }
    }

    let (_, data) = clip.ok_or_else(|| ApiError::bad_request("missing 'file' field"))?;
    let name = name
        .filter(|n| !n.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("missing 'name' field"))?;
    let employee_id = employee_id
        .filter(|e| !e.trim().is_empty())
        .ok_or_else(|| ApiError::bad_request("missing 'employee_id' field"))?;

    let Some(embedder) = &state.speaker_embedder else {
        return Ok(reply(500, "声纹服务未配置，请联系管理员".into(), None));
    };

    // Quality gate: probe WAV duration before spending an embedder call.
    if audio::is_wav(&data) {
        match audio::wav_duration_secs(&data) {
            Ok(duration) if duration < state.settings.voiceprint.min_register_secs => {
                return Ok(reply(400, "音频过短，无法提取声纹特征，请重录".into(), None));
            }
            _ => {}
        }
    }

    let embedding = match embedder.embed_speaker(&data).await {
        Ok(embedding) => embedding,
        Err(e) => {
            warn!(%e, "voiceprint extraction failed");
            return Ok(reply(400, "音频质量过差或过短，无法提取声纹特征，请重录".into(), None));
        }
    };

    if embedding.len() != VOICEPRINT_DIM {
        warn!(dim = embedding.len(), "unexpected voiceprint dimension");
        return Ok(reply(500, "声纹模型返回了异常维度".into(), None));
    }

    state
        .providers
        .voiceprints
        .register(&employee_id, &name, embedding)
        .await
        .map_err(|e| ApiError::internal(e.to_string()))?;

    info!(%employee_id, %name, "voiceprint registered");
    Ok(reply(
        200,
        "注册成功".into(),
        Some(json!({
            "employee_id": employee_id,
            "name": name,
            "vector_dim": VOICEPRINT_DIM,
        })),
    ))
}

fn reply(
    code: u16,
    message: String,
    data: Option<serde_json::Value>,
) -> (StatusCode, Json<RegisterResponse>) {
    let status = StatusCode::from_u16(code).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    (status, Json(RegisterResponse { code, message, data }))
}
