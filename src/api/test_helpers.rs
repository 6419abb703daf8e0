//! Test helpers for api tests
//!
//! Stand-in generators and request helpers shared by the test parts.

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::{
    body::Body,
    http::{Request, StatusCode},
    Router,
};
use tower::util::ServiceExt;

use super::*;

/// Returns the same decoded text for every instruction
pub struct CannedGenerator {
    pub decoded: String,
}

impl CannedGenerator {
    pub fn new(decoded: &str) -> Self {
        Self {
            decoded: decoded.to_string(),
        }
    }
}

impl TextGenerator for CannedGenerator {
    fn run(&self, _instruction: &str, _config: &GenerationConfig) -> Result<String> {
        Ok(self.decoded.clone())
    }

    fn model_id(&self) -> &str {
        "canned"
    }
}

/// Records every instruction and config it is called with
#[derive(Default)]
pub struct RecordingGenerator {
    pub calls: Mutex<Vec<(String, GenerationConfig)>>,
}

impl RecordingGenerator {
    pub fn calls(&self) -> Vec<(String, GenerationConfig)> {
        self.calls.lock().unwrap().clone()
    }
}

impl TextGenerator for RecordingGenerator {
    fn run(&self, instruction: &str, config: &GenerationConfig) -> Result<String> {
        self.calls
            .lock()
            .unwrap()
            .push((instruction.to_string(), *config));
        Ok(format!("{instruction} ok"))
    }

    fn model_id(&self) -> &str {
        "recording"
    }
}

/// Always fails with an inference error
pub struct FailingGenerator;

impl TextGenerator for FailingGenerator {
    fn run(&self, _instruction: &str, _config: &GenerationConfig) -> Result<String> {
        Err(CentinelaError::InferenceError("CUDA out of memory".to_string()))
    }

    fn model_id(&self) -> &str {
        "failing"
    }
}

/// Panics inside the worker
pub struct PanickingGenerator;

impl TextGenerator for PanickingGenerator {
    fn run(&self, _instruction: &str, _config: &GenerationConfig) -> Result<String> {
        panic!("generator exploded");
    }

    fn model_id(&self) -> &str {
        "panicking"
    }
}

/// Sleeps before answering and tracks peak concurrency
#[derive(Default)]
pub struct SlowGenerator {
    pub delay: Duration,
    pub in_flight: AtomicUsize,
    pub peak: AtomicUsize,
}

impl SlowGenerator {
    pub fn new(delay: Duration) -> Self {
        Self {
            delay,
            ..Default::default()
        }
    }

    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl TextGenerator for SlowGenerator {
    fn run(&self, _instruction: &str, _config: &GenerationConfig) -> Result<String> {
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);
        std::thread::sleep(self.delay);
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        Ok("Response: done".to_string())
    }

    fn model_id(&self) -> &str {
        "slow"
    }
}

/// Router over `generator` with default limits
pub fn create_test_app(generator: impl TextGenerator + 'static) -> Router {
    create_router(AppState::new(Arc::new(generator)))
}

/// POST a raw JSON body to `/inference`
pub async fn post_inference(app: Router, body: &str) -> (StatusCode, serde_json::Value) {
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/inference")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    let json = serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null);
    (status, json)
}

/// GET `uri` and return the body as text
pub async fn get_text(app: Router, uri: &str) -> (StatusCode, String) {
    let response = app
        .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
        .await
        .unwrap();
    let status = response.status();
    let bytes = axum::body::to_bytes(response.into_body(), usize::MAX)
        .await
        .unwrap();
    (status, String::from_utf8(bytes.to_vec()).unwrap())
}
