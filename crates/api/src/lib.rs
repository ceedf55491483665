pub mod error;
pub mod routes;
pub mod state;

use axum::{
    Router,
    http::HeaderValue,
    routing::{get, post},
};
use state::AppState;
use tower_http::{
    cors::{AllowOrigin, Any, CorsLayer},
    trace::TraceLayer,
};

pub fn build_router(state: AppState) -> Router {
    // An empty origin list means the service is open (internal deployment).
    let cors = if state.settings.app.cors_origins.is_empty() {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<HeaderValue> = state
            .settings
            .app
            .cors_origins
            .iter()
            .filter_map(|origin| origin.parse().ok())
            .collect();
        CorsLayer::new()
            .allow_origin(AllowOrigin::list(origins))
            .allow_methods(Any)
            .allow_headers(Any)
    };

    Router::new()
        .route("/process", post(routes::process::process))
        .route("/archive", post(routes::archive::archive))
        .route("/voice/register", post(routes::voice::register))
        .route("/hotwords", get(routes::hotwords::list))
        .route("/hotwords/reload", post(routes::hotwords::reload))
        .route("/health", get(routes::health::health))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(state)
}
