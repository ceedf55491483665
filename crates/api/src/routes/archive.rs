use axum::{Json, extract::State};
use serde::{Deserialize, Serialize};
use tracing::info;

use scribeflow_services::MinuteRecord;

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct ArchiveRequest {
    pub minutes_id: i64,
    pub markdown_content: String,
    #[serde(default)]
    pub user_id: Option<String>,
    #[serde(default)]
    pub meeting_date: Option<String>,
    #[serde(default)]
    pub department: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct ArchiveResponse {
    pub status: &'static str,
    pub message: String,
    pub chunks_count: usize,
}

/// Archives an approved minute into the semantic knowledge base.
pub async fn archive(
    State(state): State<AppState>,
    Json(request): Json<ArchiveRequest>,
) -> Result<Json<ArchiveResponse>, ApiError> {
    info!(
        minutes_id = request.minutes_id,
        chars = request.markdown_content.len(),
        "archive request accepted"
    );

    let record = MinuteRecord {
        source_id: request.minutes_id,
        markdown: request.markdown_content,
        user_id: request.user_id,
        meeting_date: request.meeting_date,
        department: request.department,
    };
    let outcome = state.archive.archive(&record).await?;

    Ok(Json(ArchiveResponse {
        status: "success",
        message: "已成功存入知识库".into(),
        chunks_count: outcome.chunks_count,
    }))
}
