//! CLI command implementations
//!
//! Server bootstrap lives here rather than in `main.rs` so it can be tested.

// CLI glue code - relaxed lint requirements
#![allow(clippy::missing_errors_doc)]

use std::sync::Arc;

use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, EnvFilter};

use crate::{
    api::{create_router, AppState},
    config::{ServeConfig, DEFAULT_ADAPTER_PATH, DEFAULT_BASE_MODEL, DEFAULT_PORT},
    error::{CentinelaError, Result},
    generate::TextGenerator,
    model::GuardedModel,
};

/// Install the global log subscriber (`RUST_LOG`, default `info`)
pub fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    // Ignore a second install, e.g. when embedded in tests
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

/// Build router state around an already loaded generator
///
/// # Errors
///
/// Returns error if the configuration is invalid.
pub fn build_state(config: &ServeConfig, generator: Arc<dyn TextGenerator>) -> Result<AppState> {
    config.validate()?;
    Ok(AppState::new(generator)
        .with_max_concurrent_generations(config.max_concurrent_generations)
        .with_timeout(config.generation_timeout()))
}

/// Load the model and build router state
///
/// Loading happens before the listener binds, so a broken model stops the
/// process instead of serving errors.
pub fn prepare_serve_state(config: &ServeConfig) -> Result<AppState> {
    config.validate()?;
    let model = GuardedModel::load(&config.model_config())?;
    info!(model = ?model, "Model loaded");
    build_state(config, Arc::new(model))
}

/// Serve `state` on the configured address until Ctrl-C or SIGTERM
pub async fn serve_state(config: &ServeConfig, state: AppState) -> Result<()> {
    let addr = config.socket_addr()?;
    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .map_err(|e| CentinelaError::ServerError(format!("Failed to bind {addr}: {e}")))?;

    info!(%addr, "Listening (POST /inference, GET /health, GET /metrics)");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .map_err(|e| CentinelaError::ServerError(format!("Server error: {e}")))
}

/// `centinela serve`
pub async fn handle_serve(config: ServeConfig) -> Result<()> {
    info!(
        base_model = %config.base_model,
        adapter_path = %config.adapter_path.display(),
        slots = config.max_concurrent_generations,
        timeout_secs = config.generation_timeout_secs,
        "Starting centinela"
    );
    let blocking_config = config.clone();
    let state = tokio::task::spawn_blocking(move || prepare_serve_state(&blocking_config))
        .await
        .map_err(|e| CentinelaError::ServerError(format!("Model loader failed: {e}")))??;
    serve_state(&config, state).await
}

/// Text printed by `centinela info`
#[must_use]
pub fn info_text() -> String {
    format!(
        "Centinela v{}\n\
         Guardrail inference server\n\
         \n\
         Endpoints:\n\
         \x20 POST /inference - Generate and flag out-of-scope responses\n\
         \x20 GET  /health    - Health check\n\
         \x20 GET  /metrics   - Prometheus metrics\n\
         \n\
         Defaults:\n\
         \x20 BASE_MODEL   {DEFAULT_BASE_MODEL}\n\
         \x20 ADAPTER_PATH {DEFAULT_ADAPTER_PATH}\n\
         \x20 PORT         {DEFAULT_PORT}\n",
        crate::VERSION
    )
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = signal::ctrl_c().await {
            tracing::error!(error = %e, "Failed to install Ctrl+C handler");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            },
            Err(e) => {
                tracing::error!(error = %e, "Failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            },
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }

    info!("Signal received, starting graceful shutdown");
}
