use axum::{Json, extract::State};
use serde_json::json;

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<serde_json::Value> {
    let providers = state.providers.health().await;

    Json(json!({
        "status": "healthy",
        "version": env!("CARGO_PKG_VERSION"),
        "mode": state.settings.vector.kind,
        "providers": {
            "asr": providers.asr,
            "llm": providers.llm,
            "embedding": providers.embedding,
            "vector": providers.vector,
        },
    }))
}
