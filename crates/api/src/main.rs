use scribeflow_api::{build_router, state::AppState};
use scribeflow_config::Settings;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

const EXIT_CONFIG: i32 = 2;
const EXIT_PROVIDERS: i32 = 3;
const EXIT_SIGNAL: i32 = 130;

#[tokio::main]
async fn main() {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| {
            "scribeflow_api=debug,scribeflow_services=debug,scribeflow_providers=debug,scribeflow_transcription=debug,tower_http=debug"
                .into()
        }))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let settings = match Settings::load() {
        Ok(settings) => settings,
        Err(e) => {
            error!("configuration error: {}", e);
            std::process::exit(EXIT_CONFIG);
        }
    };
    info!(
        "starting Scribeflow on {}:{}",
        settings.app.host, settings.app.port
    );

    let app_state = match AppState::new(settings.clone()) {
        Ok(state) => state,
        Err(e) => {
            error!("provider initialization failed: {}", e);
            std::process::exit(EXIT_PROVIDERS);
        }
    };

    let app = build_router(app_state);

    let addr = format!("{}:{}", settings.app.host, settings.app.port);
    let listener = match tokio::net::TcpListener::bind(&addr).await {
        Ok(listener) => listener,
        Err(e) => {
            error!("failed to bind {}: {}", addr, e);
            std::process::exit(EXIT_CONFIG);
        }
    };
    info!("listening on {}", addr);

    let serve = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal());
    if let Err(e) = serve.await {
        error!("server error: {}", e);
        std::process::exit(EXIT_PROVIDERS);
    }

    info!("shut down on signal");
    std::process::exit(EXIT_SIGNAL);
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install ctrl-c handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
