//! Supported causal LM architectures
//!
//! The architecture is picked from `model_type` in the model's
//! `config.json`. Each variant wraps the matching candle-transformers model;
//! a [`Session`] is a per-call view with its own KV cache so the loaded
//! weights are never mutated.

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::models::{gemma, gemma2, gemma3, llama, qwen2};
use serde_json::{Map, Value};

use crate::error::{CentinelaError, Result};

/// Model families the service can load
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Architecture {
    /// Gemma 3 text models (`gemma3`, `gemma3_text`)
    Gemma3,
    /// Gemma 2
    Gemma2,
    /// Gemma 1
    Gemma,
    /// Qwen 2 / 2.5
    Qwen2,
    /// Llama and Mistral checkpoints
    Llama,
}

impl Architecture {
    /// Map a `config.json` `model_type` to an architecture
    ///
    /// # Errors
    ///
    /// Returns error for model types without a loader.
    pub fn from_model_type(model_type: &str) -> Result<Self> {
        match model_type {
            "gemma3" | "gemma3_text" => Ok(Self::Gemma3),
            "gemma2" => Ok(Self::Gemma2),
            "gemma" => Ok(Self::Gemma),
            "qwen2" => Ok(Self::Qwen2),
            "llama" | "mistral" => Ok(Self::Llama),
            other => Err(CentinelaError::InvalidConfiguration(format!(
                "Unsupported model_type '{other}'"
            ))),
        }
    }

    /// Read `model_type` from a parsed `config.json`
    ///
    /// # Errors
    ///
    /// Returns error if the field is absent or unsupported.
    pub fn detect(model_config: &Value) -> Result<Self> {
        let model_type = model_config
            .get("model_type")
            .and_then(Value::as_str)
            .ok_or_else(|| {
                CentinelaError::InvalidConfiguration(
                    "config.json has no model_type".to_string(),
                )
            })?;
        Self::from_model_type(model_type)
    }
}

/// A loaded causal language model
#[derive(Clone)]
pub enum CausalLm {
    /// Gemma 3
    Gemma3(gemma3::Model),
    /// Gemma 2
    Gemma2(gemma2::Model),
    /// Gemma 1
    Gemma(gemma::Model),
    /// Qwen 2
    Qwen2(qwen2::ModelForCausalLM),
    /// Llama; the cache is created per session
    Llama {
        /// Weights
        model: llama::Llama,
        /// Runtime config, needed to size the KV cache
        config: llama::Config,
        /// Activation dtype for the KV cache
        dtype: DType,
    },
}

impl std::fmt::Debug for CausalLm {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("CausalLm")
            .field(&self.architecture())
            .finish()
    }
}

fn parse_config<T: serde::de::DeserializeOwned>(raw: &str, arch: Architecture) -> Result<T> {
    serde_json::from_str(raw).map_err(|e| invalid_config(arch, &e))
}

fn invalid_config(arch: Architecture, err: &serde_json::Error) -> CentinelaError {
    CentinelaError::InvalidConfiguration(format!("Invalid {arch:?} config.json: {err}"))
}

/// Parse a Gemma 3 config, accepting both the old and the `layer_types` layout
///
/// Newer exports drop `sliding_window_pattern` in favour of
/// `_sliding_window_pattern` plus a per-layer `layer_types` list.
fn gemma3_config(raw: &str) -> Result<gemma3::Config> {
    let mut value: Value = parse_config(raw, Architecture::Gemma3)?;
    if let Some(fields) = value.as_object_mut() {
        if !fields.contains_key("sliding_window_pattern") {
            if let Some(pattern) = sliding_window_pattern(fields) {
                fields.insert("sliding_window_pattern".to_string(), Value::from(pattern));
            }
        }
    }
    serde_json::from_value(value).map_err(|e| invalid_config(Architecture::Gemma3, &e))
}

/// Every `pattern`-th layer uses full attention, the rest a sliding window
fn sliding_window_pattern(fields: &Map<String, Value>) -> Option<u64> {
    if let Some(pattern) = fields.get("_sliding_window_pattern").and_then(Value::as_u64) {
        return Some(pattern);
    }
    let layer_types = fields.get("layer_types")?.as_array()?;
    let first_full = layer_types
        .iter()
        .position(|kind| kind.as_str() == Some("full_attention"))?;
    u64::try_from(first_full + 1).ok()
}

impl CausalLm {
    /// Build the model for `arch` from raw `config.json` text and weights
    ///
    /// # Errors
    ///
    /// Returns error if the config does not parse or a weight is missing.
    pub fn load(arch: Architecture, raw_config: &str, vb: VarBuilder) -> Result<Self> {
        let dtype = vb.dtype();
        let model = match arch {
            Architecture::Gemma3 => {
                let cfg = gemma3_config(raw_config)?;
                Self::Gemma3(gemma3::Model::new(false, &cfg, vb)?)
            },
            Architecture::Gemma2 => {
                let cfg: gemma2::Config = parse_config(raw_config, arch)?;
                Self::Gemma2(gemma2::Model::new(false, &cfg, vb)?)
            },
            Architecture::Gemma => {
                let cfg: gemma::Config = parse_config(raw_config, arch)?;
                Self::Gemma(gemma::Model::new(false, &cfg, vb)?)
            },
            Architecture::Qwen2 => {
                let cfg: qwen2::Config = parse_config(raw_config, arch)?;
                Self::Qwen2(qwen2::ModelForCausalLM::new(&cfg, vb)?)
            },
            Architecture::Llama => {
                let cfg: llama::LlamaConfig = parse_config(raw_config, arch)?;
                let config = cfg.into_config(false);
                let model = llama::Llama::load(vb, &config)?;
                Self::Llama {
                    model,
                    config,
                    dtype,
                }
            },
        };
        Ok(model)
    }

    /// Architecture of this model
    #[must_use]
    pub fn architecture(&self) -> Architecture {
        match self {
            Self::Gemma3(_) => Architecture::Gemma3,
            Self::Gemma2(_) => Architecture::Gemma2,
            Self::Gemma(_) => Architecture::Gemma,
            Self::Qwen2(_) => Architecture::Qwen2,
            Self::Llama { .. } => Architecture::Llama,
        }
    }

    /// Start a generation session with an empty KV cache
    ///
    /// # Errors
    ///
    /// Returns error if the KV cache cannot be allocated.
    pub fn session(&self, device: &Device) -> Result<Session<'_>> {
        let session = match self {
            Self::Gemma3(model) => {
                let mut model = model.clone();
                model.clear_kv_cache();
                Session::Gemma3(model)
            },
            Self::Gemma2(model) => {
                let mut model = model.clone();
                model.clear_kv_cache();
                Session::Gemma2(model)
            },
            Self::Gemma(model) => {
                let mut model = model.clone();
                model.clear_kv_cache();
                Session::Gemma(model)
            },
            Self::Qwen2(model) => {
                let mut model = model.clone();
                model.clear_kv_cache();
                Session::Qwen2(model)
            },
            Self::Llama {
                model,
                config,
                dtype,
            } => Session::Llama {
                model,
                cache: llama::Cache::new(true, *dtype, config, device)?,
            },
        };
        Ok(session)
    }
}

/// Per-generation model state
pub enum Session<'a> {
    /// Gemma 3 clone owning its KV cache
    Gemma3(gemma3::Model),
    /// Gemma 2 clone owning its KV cache
    Gemma2(gemma2::Model),
    /// Gemma 1 clone owning its KV cache
    Gemma(gemma::Model),
    /// Qwen 2 clone owning its KV cache
    Qwen2(qwen2::ModelForCausalLM),
    /// Shared Llama weights with a private cache
    Llama {
        /// Weights
        model: &'a llama::Llama,
        /// KV cache
        cache: llama::Cache,
    },
}

impl Session<'_> {
    /// Logits for the last position of `input_ids` as a 1-D f32 tensor
    ///
    /// `offset` is the number of tokens already in the KV cache.
    ///
    /// # Errors
    ///
    /// Returns error if the forward pass fails.
    pub fn forward(&mut self, input_ids: &Tensor, offset: usize) -> Result<Tensor> {
        let logits = match self {
            Self::Gemma3(model) => model.forward(input_ids, offset)?,
            Self::Gemma2(model) => model.forward(input_ids, offset)?,
            Self::Gemma(model) => model.forward(input_ids, offset)?,
            Self::Qwen2(model) => model.forward(input_ids, offset)?,
            Self::Llama { model, cache } => model.forward(input_ids, offset, cache)?,
        };
        Ok(logits.flatten_all()?.to_dtype(DType::F32)?)
    }
}
