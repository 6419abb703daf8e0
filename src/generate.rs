//! Generation parameters and the generator seam
//!
//! [`TextGenerator`] is the boundary between request handling and the model
//! runtime. The production implementation is
//! [`GuardedModel`](crate::model::GuardedModel); tests substitute canned
//! generators.

use candle_transformers::generation::Sampling;

use crate::error::{CentinelaError, Result};
use crate::prompt;

/// Default number of tokens to generate
pub const DEFAULT_MAX_NEW_TOKENS: usize = 256;

/// Default sampling temperature
pub const DEFAULT_TEMPERATURE: f64 = 0.2;

/// Token selection mode derived from temperature
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum SamplingMode {
    /// Deterministic argmax decoding
    Greedy,
    /// Multinomial sampling over temperature-scaled logits
    Sample {
        /// Softmax temperature (> 0)
        temperature: f64,
    },
}

impl SamplingMode {
    /// Greedy for `temperature <= 0`, sampling at `temperature` otherwise
    #[must_use]
    pub fn from_temperature(temperature: f64) -> Self {
        if temperature > 0.0 {
            Self::Sample { temperature }
        } else {
            Self::Greedy
        }
    }

    /// Whether tokens are drawn at random
    #[must_use]
    pub fn is_sampling(&self) -> bool {
        matches!(self, Self::Sample { .. })
    }
}

impl From<SamplingMode> for Sampling {
    fn from(mode: SamplingMode) -> Self {
        match mode {
            SamplingMode::Greedy => Sampling::ArgMax,
            SamplingMode::Sample { temperature } => Sampling::All { temperature },
        }
    }
}

/// Per-call generation parameters
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GenerationConfig {
    /// Upper bound on generated tokens
    pub max_new_tokens: usize,
    /// Sampling temperature (0.0 = greedy)
    pub temperature: f64,
}

impl Default for GenerationConfig {
    fn default() -> Self {
        Self {
            max_new_tokens: DEFAULT_MAX_NEW_TOKENS,
            temperature: DEFAULT_TEMPERATURE,
        }
    }
}

impl GenerationConfig {
    /// Set the generated token limit
    #[must_use]
    pub fn with_max_new_tokens(mut self, max_new_tokens: usize) -> Self {
        self.max_new_tokens = max_new_tokens;
        self
    }

    /// Set the temperature (0.0 = greedy)
    #[must_use]
    pub fn with_temperature(mut self, temperature: f64) -> Self {
        self.temperature = temperature;
        self
    }

    /// Sampling mode implied by the temperature
    #[must_use]
    pub fn sampling(&self) -> SamplingMode {
        SamplingMode::from_temperature(self.temperature)
    }

    /// Check the parameters are usable
    ///
    /// # Errors
    ///
    /// Returns [`CentinelaError::InvalidRequest`] if `max_new_tokens` is zero
    /// or the temperature is negative or not finite.
    pub fn validate(&self) -> Result<()> {
        if self.max_new_tokens == 0 {
            return Err(CentinelaError::InvalidRequest(
                "max_new_tokens must be a positive integer".to_string(),
            ));
        }
        if !self.temperature.is_finite() || self.temperature < 0.0 {
            return Err(CentinelaError::InvalidRequest(format!(
                "temperature must be a non-negative number, got {}",
                self.temperature
            )));
        }
        Ok(())
    }
}

/// Something that turns an instruction into decoded model output
///
/// Implementors provide [`run`](Self::run), which receives an already
/// formatted instruction and returns the decoded sequence as the runtime
/// produced it (the echoed instruction included). [`generate`](Self::generate)
/// wraps it with instruction formatting and response extraction.
pub trait TextGenerator: Send + Sync {
    /// Run the runtime on a formatted instruction
    ///
    /// # Errors
    ///
    /// Returns error if tokenization, the forward pass or decoding fails.
    fn run(&self, instruction: &str, config: &GenerationConfig) -> Result<String>;

    /// Identifier of the loaded model, for logs and `info`
    fn model_id(&self) -> &str;

    /// Generate a completion for `prompt`
    ///
    /// # Errors
    ///
    /// Propagates any error from [`run`](Self::run) unchanged.
    fn generate(&self, prompt: &str, config: &GenerationConfig) -> Result<String> {
        let instruction = prompt::format_instruction(prompt);
        let decoded = self.run(&instruction, config)?;
        Ok(prompt::extract_response(&decoded).to_string())
    }
}
