use std::str::FromStr;

use axum::{Json, extract::Multipart, extract::State};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::info;

use scribeflow_providers::factory::{AsrKind, LlmKind};
use scribeflow_services::{
    AudioSource, FileError, HistoryMode, HistoryRequest, InputKind, ProcessRequest,
};
use scribeflow_transcription::TranscriptSegment;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Serialize)]
pub struct MeetingResponse {
    pub status: &'static str,
    pub message: String,
    pub raw_text: String,
    pub transcript: Vec<TranscriptSegment>,
    pub need_rag: bool,
    pub structured_data: String,
    pub html_content: String,
    pub usage_tokens: u32,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub file_errors: Vec<FileError>,
}

#[derive(Default)]
struct ProcessForm {
    files: Vec<(String, Vec<u8>)>,
    file_paths: Option<String>,
    audio_urls: Option<String>,
    audio_id: Option<i64>,
    document_file: Option<(String, Vec<u8>)>,
    text_content: Option<String>,
    template: String,
    user_requirement: Option<String>,
    history_meeting_ids: Option<String>,
    history_mode: String,
    asr_model: String,
    llm_model: String,
    llm_temperature: f32,
    llm_max_tokens: u32,
}

impl ProcessForm {
    fn new() -> Self {
        Self {
            template: "default".into(),
            history_mode: "auto".into(),
            asr_model: "auto".into(),
            llm_model: "auto".into(),
            llm_temperature: 0.7,
            llm_max_tokens: 2000,
            ..Default::default()
        }
    }
}

/// Main ingest endpoint: multipart form with exactly one input kind.
pub async fn process(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<MeetingResponse>, ApiError> {
    let mut form = ProcessForm::new();

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::bad_request(format!("multipart error: {}", e)))?
    {
        let name = field.name().unwrap_or("").to_string();
        match name.as_str() {
            "files" => {
                let filename = field.file_name().unwrap_or("audio.wav").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read file: {}", e)))?;
                form.files.push((filename, bytes.to_vec()));
            }
            "document_file" => {
                let filename = field.file_name().unwrap_or("document").to_string();
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read file: {}", e)))?;
                form.document_file = Some((filename, bytes.to_vec()));
            }
            other => {
                let text = field
                    .text()
                    .await
                    .map_err(|e| ApiError::bad_request(format!("failed to read field: {}", e)))?;
                match other {
                    "file_paths" => form.file_paths = Some(text),
                    "audio_urls" => form.audio_urls = Some(text),
                    "audio_id" => {
                        form.audio_id = Some(text.trim().parse().map_err(|_| {
                            ApiError::bad_request("audio_id must be an integer")
                        })?)
                    }
                    "text_content" => form.text_content = Some(text),
                    "template" => form.template = text,
                    "user_requirement" => form.user_requirement = Some(text),
                    "history_meeting_ids" => form.history_meeting_ids = Some(text),
                    "history_mode" => form.history_mode = text,
                    "asr_model" => form.asr_model = text,
                    "llm_model" => form.llm_model = text,
                    "llm_temperature" => {
                        form.llm_temperature = text.trim().parse().map_err(|_| {
                            ApiError::bad_request("llm_temperature must be a number")
                        })?
                    }
                    "llm_max_tokens" => {
                        form.llm_max_tokens = text.trim().parse().map_err(|_| {
                            ApiError::bad_request("llm_max_tokens must be an integer")
                        })?
                    }
                    _ => {}
                }
            }
        }
    }

    let request = build_request(form)?;
    info!("process request accepted");

    let outcome = state
        .pipeline
        .process(request, CancellationToken::new())
        .await?;

    Ok(Json(MeetingResponse {
        status: "success",
        message: "处理成功".into(),
        raw_text: outcome.raw_text,
        transcript: outcome.transcript,
        need_rag: outcome.need_rag,
        structured_data: outcome.markdown,
        html_content: outcome.html_content,
        usage_tokens: outcome.usage_tokens,
        file_errors: outcome.file_errors,
    }))
}

fn build_request(form: ProcessForm) -> Result<ProcessRequest, ApiError> {
    let mut inputs: Vec<InputKind> = Vec::new();

    if !form.files.is_empty() {
        inputs.push(InputKind::Audio(
            form.files
                .into_iter()
                .map(|(filename, data)| AudioSource::Upload { filename, data })
                .collect(),
        ));
    }
    if let Some(paths) = form.file_paths.filter(|p| !p.trim().is_empty()) {
        inputs.push(InputKind::Audio(
            paths
                .split(',')
                .map(|p| AudioSource::LocalPath(p.trim().into()))
                .collect(),
        ));
    }
    if let Some(urls) = form.audio_urls.filter(|u| !u.trim().is_empty()) {
        inputs.push(InputKind::Audio(
            urls.split(',')
                .map(|u| AudioSource::RemoteUrl(u.trim().trim_matches('"').to_string()))
                .collect(),
        ));
    }
    if let Some(id) = form.audio_id {
        inputs.push(InputKind::Audio(vec![AudioSource::StoredId(id)]));
    }
    if let Some((filename, data)) = form.document_file {
        inputs.push(InputKind::Document { filename, data });
    }
    if let Some(text) = form.text_content {
        inputs.push(InputKind::Text(text));
    }

    let input = match inputs.len() {
        0 => {
            return Err(ApiError::bad_request(
                "supply exactly one of files, file_paths, audio_urls, audio_id, document_file, text_content",
            ))
        }
        1 => inputs.remove(0),
        n => {
            return Err(ApiError::bad_request(format!(
                "{} input kinds supplied, expected exactly one",
                n
            )))
        }
    };

    let ids = match form.history_meeting_ids.filter(|s| !s.trim().is_empty()) {
        Some(raw) => raw
            .split(',')
            .map(|part| {
                part.trim()
                    .parse::<i64>()
                    .map_err(|_| ApiError::bad_request("history_meeting_ids must be integers"))
            })
            .collect::<Result<Vec<_>, _>>()?,
        None => Vec::new(),
    };
    let mode = HistoryMode::from_str(form.history_mode.trim()).map_err(ApiError::bad_request)?;

    Ok(ProcessRequest {
        input,
        template: form.template,
        user_requirement: form.user_requirement.filter(|r| !r.trim().is_empty()),
        history: HistoryRequest { ids, mode },
        asr_model: AsrKind::from_str(form.asr_model.trim()).map_err(ApiError::bad_request)?,
        llm_model: LlmKind::from_str(form.llm_model.trim()).map_err(ApiError::bad_request)?,
        llm_temperature: form.llm_temperature,
        llm_max_tokens: form.llm_max_tokens,
    })
}
