//! HTTP API for guarded inference
//!
//! ## Endpoints
//!
//! - `POST /inference` - Generate a completion and flag refusals
//! - `GET /health` - Liveness check
//! - `GET /metrics` - Prometheus-formatted metrics
//!
//! ## Example
//!
//! ```rust,ignore
//! use centinela::api::{create_router, AppState};
//!
//! let state = AppState::new(Arc::new(model)).with_max_concurrent_generations(2);
//! let app = create_router(state);
//! axum::serve(listener, app).await?;
//! ```

pub mod types;

#[cfg(test)]
pub(crate) mod test_helpers;
#[cfg(test)]
mod tests;

use std::sync::Arc;
use std::time::{Duration, Instant};

use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use tokio::sync::Semaphore;
use tracing::{error, info, warn};

pub use types::{ErrorResponse, HealthResponse, InferenceRequest, InferenceResponse};

use crate::{
    error::{CentinelaError, Result},
    generate::{GenerationConfig, TextGenerator},
    guard,
    metrics::MetricsCollector,
    prompt,
};

/// Time budget per request when none is configured
pub const DEFAULT_GENERATION_TIMEOUT: Duration = Duration::from_secs(300);

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    /// Model runtime (or a stand-in under test)
    generator: Arc<dyn TextGenerator>,
    /// Generation slots; a permit lives as long as its worker
    limiter: Arc<Semaphore>,
    /// Budget for queueing plus generation
    timeout: Duration,
    /// Metrics collector for monitoring
    metrics: Arc<MetricsCollector>,
}

impl std::fmt::Debug for AppState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AppState")
            .field("model_id", &self.generator.model_id())
            .field("available_slots", &self.limiter.available_permits())
            .field("timeout", &self.timeout)
            .finish()
    }
}

impl AppState {
    /// State with one generation slot and the default timeout
    #[must_use]
    pub fn new(generator: Arc<dyn TextGenerator>) -> Self {
        Self {
            generator,
            limiter: Arc::new(Semaphore::new(1)),
            timeout: DEFAULT_GENERATION_TIMEOUT,
            metrics: Arc::new(MetricsCollector::new()),
        }
    }

    /// Allow up to `slots` generations at once (minimum 1)
    #[must_use]
    pub fn with_max_concurrent_generations(mut self, slots: usize) -> Self {
        self.limiter = Arc::new(Semaphore::new(slots.max(1)));
        self
    }

    /// Set the per-request time budget
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Injected generator
    #[must_use]
    pub fn generator(&self) -> &Arc<dyn TextGenerator> {
        &self.generator
    }

    /// Metrics collected so far
    #[must_use]
    pub fn metrics(&self) -> &MetricsCollector {
        &self.metrics
    }

    /// Generation slots not currently held by a worker
    #[must_use]
    pub fn available_slots(&self) -> usize {
        self.limiter.available_permits()
    }

    /// Run the generator on a bounded blocking worker within the time budget
    ///
    /// The permit moves into the worker, so a request that times out keeps
    /// its slot until the worker really returns.
    async fn generate(&self, prompt: String, config: GenerationConfig) -> Result<String> {
        let generator = Arc::clone(&self.generator);
        let limiter = Arc::clone(&self.limiter);

        let work = async move {
            let permit = limiter.acquire_owned().await.map_err(|e| {
                CentinelaError::ServerError(format!("Generation pool closed: {e}"))
            })?;
            tokio::task::spawn_blocking(move || {
                let _permit = permit;
                generator.generate(&prompt, &config)
            })
            .await
            .map_err(|e| CentinelaError::ServerError(format!("Generation worker failed: {e}")))?
        };

        tokio::time::timeout(self.timeout, work)
            .await
            .map_err(|_| CentinelaError::Timeout {
                seconds: self.timeout.as_secs(),
            })?
    }
}

/// Create the API router with all endpoints
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/inference", post(inference_handler))
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        .with_state(state)
}

/// Health check handler
async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "healthy".to_string(),
    })
}

/// Metrics handler - returns Prometheus-formatted metrics
async fn metrics_handler(State(state): State<AppState>) -> String {
    state.metrics.to_prometheus()
}

fn error_response(err: &CentinelaError) -> (StatusCode, Json<ErrorResponse>) {
    (
        err.status_code(),
        Json(ErrorResponse {
            detail: err.to_string(),
        }),
    )
}

/// Inference handler
#[tracing::instrument(name = "inference", skip_all)]
async fn inference_handler(
    State(state): State<AppState>,
    payload: std::result::Result<Json<InferenceRequest>, JsonRejection>,
) -> std::result::Result<Json<InferenceResponse>, (StatusCode, Json<ErrorResponse>)> {
    let Json(request) = payload.map_err(|rejection| {
        state.metrics.record_failure();
        warn!(status = %rejection.status(), "Rejected request body");
        (
            rejection.status(),
            Json(ErrorResponse {
                detail: rejection.body_text(),
            }),
        )
    })?;

    let start = Instant::now();
    match infer(&state, request).await {
        Ok(result) => {
            let in_scope = guard::is_in_scope(&result);
            state
                .metrics
                .record_success(result.chars().count(), in_scope, start.elapsed());
            info!(
                in_scope,
                elapsed_ms = start.elapsed().as_millis() as u64,
                "Inference complete"
            );
            Ok(Json(InferenceResponse { result, in_scope }))
        },
        Err(e) => {
            state.metrics.record_failure();
            if e.status_code().is_server_error() {
                error!(error = %e, "Inference failed");
            } else {
                warn!(error = %e, "Invalid inference request");
            }
            Err(error_response(&e))
        },
    }
}

async fn infer(state: &AppState, request: InferenceRequest) -> Result<String> {
    if request.prompt.is_empty() {
        return Err(CentinelaError::InvalidRequest(
            "prompt must not be empty".to_string(),
        ));
    }
    let config = GenerationConfig::default()
        .with_max_new_tokens(request.max_new_tokens)
        .with_temperature(request.temperature);
    config.validate()?;

    let prompt = prompt::compose(&request.prompt, request.resource.as_ref())?;
    info!(
        prompt_chars = prompt.chars().count(),
        has_resource = request.resource.as_ref().is_some_and(|r| !r.is_empty()),
        max_new_tokens = config.max_new_tokens,
        sampling = config.sampling().is_sampling(),
        "Inference request"
    );

    state.generate(prompt, config).await
}
