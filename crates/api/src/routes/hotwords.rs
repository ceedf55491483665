use axum::{Json, extract::State};
use serde_json::json;
use tracing::info;

use crate::{error::ApiError, state::AppState};

/// Current hotword table: categories, rendered vocabulary, and counts.
pub async fn list(State(state): State<AppState>) -> Json<serde_json::Value> {
    let table = state.hotwords.snapshot();
    let stats = state.hotwords.stats();

    Json(json!({
        "categories": table.categories.iter().map(|(name, _)| name).collect::<Vec<_>>(),
        "hotwords": state.hotwords.render(),
        "stats": stats.per_category,
        "total": stats.total,
    }))
}

/// Re-reads the hotword file and atomically swaps the table.
pub async fn reload(
    State(state): State<AppState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let stats = state
        .hotwords
        .reload()
        .map_err(|e| ApiError::internal(format!("hotword reload failed: {}", e)))?;
    info!(total = stats.total, "hotwords reloaded");

    let table = state.hotwords.snapshot();
    Ok(Json(json!({
        "message": "热词重载成功",
        "categories": table.categories.iter().map(|(name, _)| name).collect::<Vec<_>>(),
        "hotwords": state.hotwords.render(),
        "stats": stats.per_category,
        "total": stats.total,
    })))
}
