//! Guarded model: base causal LM plus optional LoRA adapter
//!
//! [`GuardedModel::load`] resolves the base model, merges the adapter into
//! the base weights when one is present, and keeps everything read-only
//! afterwards. Each call to [`TextGenerator::run`] opens a fresh
//! [`Session`](arch::Session), so concurrent generations never share KV
//! state.
//!
//! # Example
//!
//! ```rust,ignore
//! use centinela::generate::{GenerationConfig, TextGenerator};
//! use centinela::model::{GuardedModel, ModelConfig};
//!
//! let model = GuardedModel::load(&ModelConfig::new("google/gemma-3-270m"))?;
//! let answer = model.generate("What is 2+2?", &GenerationConfig::default())?;
//! ```

pub mod adapter;
pub mod arch;
pub mod files;

use std::collections::HashMap;
use std::fmt::Debug;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use candle_core::{DType, Device, Tensor};
use candle_nn::VarBuilder;
use candle_transformers::generation::LogitsProcessor;
use serde_json::Value;
use tokenizers::{PaddingParams, Tokenizer};
use tracing::{debug, info, warn};

pub use adapter::{AdapterConfig, LoraAdapter};
pub use arch::{Architecture, CausalLm};
pub use files::ModelFiles;

use crate::config::DEFAULT_SEED;
use crate::error::{CentinelaError, Result};
use crate::generate::{GenerationConfig, TextGenerator};

/// Tokens tried, in order, when `config.json` carries no `eos_token_id`
pub const EOS_TOKEN_CANDIDATES: [&str; 4] = ["<eos>", "</s>", "<|endoftext|>", "<|im_end|>"];

/// Settings for [`GuardedModel::load`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelConfig {
    /// Local directory or Hugging Face Hub repository id
    pub base_model: String,
    /// Adapter directory; `None` disables the adapter
    pub adapter_path: Option<PathBuf>,
    /// Stay on CPU even when CUDA is available
    pub force_cpu: bool,
    /// Base seed for the sampler
    pub seed: u64,
}

impl ModelConfig {
    /// Configuration for `base_model` without an adapter
    #[must_use]
    pub fn new(base_model: impl Into<String>) -> Self {
        Self {
            base_model: base_model.into(),
            adapter_path: None,
            force_cpu: false,
            seed: DEFAULT_SEED,
        }
    }

    /// Merge the adapter at `path` if it exists
    #[must_use]
    pub fn with_adapter(mut self, path: impl Into<PathBuf>) -> Self {
        self.adapter_path = Some(path.into());
        self
    }

    /// Force CPU execution
    #[must_use]
    pub fn with_cpu(mut self, force_cpu: bool) -> Self {
        self.force_cpu = force_cpu;
        self
    }
}

/// Base model with its adapter merged in, ready for generation
pub struct GuardedModel {
    model: CausalLm,
    tokenizer: Tokenizer,
    device: Device,
    dtype: DType,
    eos_token_ids: Vec<u32>,
    model_id: String,
    adapter: Option<PathBuf>,
    seed: u64,
    calls: AtomicU64,
}

impl Debug for GuardedModel {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedModel")
            .field("model_id", &self.model_id)
            .field("architecture", &self.model.architecture())
            .field("adapter", &self.adapter)
            .field("device", &self.device)
            .field("dtype", &self.dtype)
            .field("eos_token_ids", &self.eos_token_ids)
            .finish()
    }
}

impl GuardedModel {
    /// Load the base model and merge the adapter, if any
    ///
    /// A configured adapter path that does not exist is logged and skipped.
    ///
    /// # Errors
    ///
    /// Returns error if:
    /// - Model files cannot be resolved or downloaded
    /// - `config.json` names an unsupported architecture
    /// - The tokenizer cannot be loaded
    /// - The adapter is malformed or targets a missing base weight
    pub fn load(config: &ModelConfig) -> Result<Self> {
        let device = select_device(config.force_cpu)?;
        let dtype = precision_for(&device);
        info!(
            base_model = %config.base_model,
            device = ?device,
            dtype = ?dtype,
            "Loading base model"
        );

        let files = ModelFiles::resolve(&config.base_model)?;
        let raw_config = std::fs::read_to_string(&files.config).map_err(|e| {
            CentinelaError::IoError {
                message: format!("Failed to read {}: {e}", files.config.display()),
            }
        })?;
        let model_json: Value = serde_json::from_str(&raw_config).map_err(|e| {
            CentinelaError::InvalidConfiguration(format!("Invalid config.json: {e}"))
        })?;
        let architecture = Architecture::detect(&model_json)?;

        let mut tokenizer = Tokenizer::from_file(&files.tokenizer).map_err(|e| {
            CentinelaError::TokenizerError(format!(
                "Failed to load {}: {e}",
                files.tokenizer.display()
            ))
        })?;
        let eos_token_ids = eos_token_ids(&model_json, &tokenizer);
        if eos_token_ids.is_empty() {
            warn!("No EOS token found; generation always runs to max_new_tokens");
        }
        ensure_padding(&mut tokenizer, &model_json, eos_token_ids.first().copied());

        let adapter = match &config.adapter_path {
            Some(path) if path.exists() => Some(LoraAdapter::load(path, &device)?),
            Some(path) => {
                warn!(
                    adapter_path = %path.display(),
                    "Adapter path not found, serving the base model"
                );
                None
            },
            None => None,
        };

        let vb = var_builder(&files.weights, adapter.as_ref(), dtype, &device)?;
        let model = CausalLm::load(architecture, &raw_config, vb).map_err(|e| {
            CentinelaError::ModelLoad {
                model: config.base_model.clone(),
                reason: e.to_string(),
            }
        })?;

        info!(
            architecture = ?architecture,
            adapter = adapter.is_some(),
            "Model ready"
        );

        Ok(Self {
            model,
            tokenizer,
            device,
            dtype,
            eos_token_ids,
            model_id: config.base_model.clone(),
            adapter: adapter
                .is_some()
                .then(|| config.adapter_path.clone())
                .flatten(),
            seed: config.seed,
            calls: AtomicU64::new(0),
        })
    }

    /// Architecture of the base model
    #[must_use]
    pub fn architecture(&self) -> Architecture {
        self.model.architecture()
    }

    /// Path of the merged adapter, if one was applied
    #[must_use]
    pub fn adapter_path(&self) -> Option<&Path> {
        self.adapter.as_deref()
    }

    /// Device the model runs on
    #[must_use]
    pub fn device(&self) -> &Device {
        &self.device
    }

    fn next_seed(&self) -> u64 {
        self.seed
            .wrapping_add(self.calls.fetch_add(1, Ordering::Relaxed))
    }
}

impl TextGenerator for GuardedModel {
    fn run(&self, instruction: &str, config: &GenerationConfig) -> Result<String> {
        let encoding = self
            .tokenizer
            .encode(instruction, true)
            .map_err(|e| CentinelaError::TokenizerError(format!("Encoding failed: {e}")))?;
        let mut tokens = encoding.get_ids().to_vec();
        if tokens.is_empty() {
            return Err(CentinelaError::InferenceError(
                "Instruction encoded to zero tokens".to_string(),
            ));
        }
        let prompt_len = tokens.len();

        let mut session = self.model.session(&self.device)?;
        let mut sampler = LogitsProcessor::from_sampling(self.next_seed(), config.sampling().into());
        let start = Instant::now();

        for step in 0..config.max_new_tokens {
            let (context, offset) = if step == 0 {
                (&tokens[..], 0)
            } else {
                let last = tokens.len() - 1;
                (&tokens[last..], last)
            };
            let input = Tensor::new(context, &self.device)?.unsqueeze(0)?;
            let logits = session.forward(&input, offset)?;
            let next = sampler.sample(&logits)?;
            tokens.push(next);
            if self.eos_token_ids.contains(&next) {
                break;
            }
        }

        debug!(
            prompt_tokens = prompt_len,
            new_tokens = tokens.len() - prompt_len,
            elapsed_ms = start.elapsed().as_millis() as u64,
            "Generation finished"
        );

        self.tokenizer
            .decode(&tokens, true)
            .map_err(|e| CentinelaError::TokenizerError(format!("Decoding failed: {e}")))
    }

    fn model_id(&self) -> &str {
        &self.model_id
    }
}

/// CUDA device 0 when available (and not disabled), CPU otherwise
///
/// # Errors
///
/// Returns error if CUDA is present but fails to initialise.
pub fn select_device(force_cpu: bool) -> Result<Device> {
    if force_cpu {
        Ok(Device::Cpu)
    } else {
        Ok(Device::cuda_if_available(0)?)
    }
}

/// bf16 on accelerators, f32 on CPU
#[must_use]
pub fn precision_for(device: &Device) -> DType {
    if device.is_cpu() {
        DType::F32
    } else {
        DType::BF16
    }
}

/// EOS ids from `config.json`, falling back to well-known EOS tokens
#[must_use]
pub fn eos_token_ids(model_config: &Value, tokenizer: &Tokenizer) -> Vec<u32> {
    let as_id = |v: &Value| v.as_u64().and_then(|id| u32::try_from(id).ok());
    let configured: Vec<u32> = match model_config.get("eos_token_id") {
        Some(Value::Array(ids)) => ids.iter().filter_map(as_id).collect(),
        Some(id) => as_id(id).into_iter().collect(),
        None => Vec::new(),
    };
    if !configured.is_empty() {
        return configured;
    }

    EOS_TOKEN_CANDIDATES
        .iter()
        .find_map(|token| tokenizer.token_to_id(token))
        .into_iter()
        .collect()
}

/// Pad id the model ships with: `pad_token_id` in `config.json`, else `<pad>`
#[must_use]
pub fn pad_token_id(model_config: &Value, tokenizer: &Tokenizer) -> Option<u32> {
    model_config
        .get("pad_token_id")
        .and_then(Value::as_u64)
        .and_then(|id| u32::try_from(id).ok())
        .filter(|id| tokenizer.id_to_token(*id).is_some())
        .or_else(|| tokenizer.token_to_id("<pad>"))
}

/// Set up padding, reusing the EOS token only when the model has no pad token
fn ensure_padding(tokenizer: &mut Tokenizer, model_config: &Value, eos: Option<u32>) {
    if tokenizer.get_padding().is_some() {
        return;
    }
    let Some(pad_id) = pad_token_id(model_config, tokenizer).or(eos) else {
        return;
    };
    let Some(pad_token) = tokenizer.id_to_token(pad_id) else {
        return;
    };
    tokenizer.with_padding(Some(PaddingParams {
        pad_id,
        pad_token,
        ..Default::default()
    }));
}

fn var_builder(
    weights: &[PathBuf],
    adapter: Option<&LoraAdapter>,
    dtype: DType,
    device: &Device,
) -> Result<VarBuilder<'static>> {
    let Some(adapter) = adapter else {
        // SAFETY: weight files are not modified while the server runs
        let vb = unsafe { VarBuilder::from_mmaped_safetensors(weights, dtype, device) }
            .map_err(|e| CentinelaError::IoError {
                message: format!("Failed to map model weights: {e}"),
            })?;
        return Ok(vb);
    };

    let mut tensors: HashMap<String, Tensor> = HashMap::new();
    for path in weights {
        let shard = candle_core::safetensors::load(path, device).map_err(|e| {
            CentinelaError::IoError {
                message: format!("Failed to read {}: {e}", path.display()),
            }
        })?;
        tensors.extend(shard);
    }
    let merged = adapter.merge_into(&mut tensors)?;
    info!(
        merged_weights = merged,
        rank = adapter.config().r,
        scale = adapter.config().scale(),
        "Merged LoRA adapter into base weights"
    );
    Ok(VarBuilder::from_tensors(tensors, dtype, device))
}
