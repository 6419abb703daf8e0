//! Request and response bodies
//!
//! Field names and defaults are part of the public contract: clients send
//! `{"prompt", "resource", "max_new_tokens", "temperature"}` and receive
//! `{"result", "in_scope"}` or `{"detail"}`.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::generate::{DEFAULT_MAX_NEW_TOKENS, DEFAULT_TEMPERATURE};

/// Inference request
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InferenceRequest {
    /// User text to classify / answer
    pub prompt: String,
    /// Optional structured context appended to the prompt
    #[serde(default)]
    pub resource: Option<Map<String, Value>>,
    /// Maximum tokens to generate
    #[serde(default = "default_max_new_tokens")]
    pub max_new_tokens: usize,
    /// Sampling temperature (0.0 = greedy)
    #[serde(default = "default_temperature")]
    pub temperature: f64,
}

pub(crate) fn default_max_new_tokens() -> usize {
    DEFAULT_MAX_NEW_TOKENS
}

pub(crate) fn default_temperature() -> f64 {
    DEFAULT_TEMPERATURE
}

/// Inference response
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct InferenceResponse {
    /// Text after the response marker
    pub result: String,
    /// False when the result reads as a refusal
    pub in_scope: bool,
}

/// Error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    /// Human-readable failure description
    pub detail: String,
}

/// Health check response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    /// Always `"healthy"`
    pub status: String,
}
