//! LoRA adapter loading and weight merging
//!
//! Reads PEFT-format adapters (`adapter_config.json` plus
//! `adapter_model.safetensors`) and folds every `lora_A`/`lora_B` pair into
//! the base weight it targets:
//!
//! ```text
//! W' = W + scale · (B · A)      scale = alpha / r   (alpha / √r with rsLoRA)
//! ```
//!
//! Merging happens once at startup, so inference runs on plain weights.

use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use candle_core::{DType, Device, Tensor};
use serde::Deserialize;
use tracing::warn;

use crate::error::{CentinelaError, Result};

/// Adapter hyper-parameters file
pub const ADAPTER_CONFIG_FILE: &str = "adapter_config.json";

/// Adapter weights file
pub const ADAPTER_WEIGHTS_FILE: &str = "adapter_model.safetensors";

/// Prefix PEFT puts in front of the wrapped model's tensor names
const PEFT_PREFIX: &str = "base_model.model.";

/// Subset of PEFT's `adapter_config.json` needed for merging
#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct AdapterConfig {
    /// LoRA rank
    pub r: usize,
    /// LoRA alpha
    pub lora_alpha: f64,
    /// Rank-stabilised scaling (`alpha / √r`)
    #[serde(default)]
    pub use_rslora: bool,
    /// Target layers store weights as (in, out)
    #[serde(default)]
    pub fan_in_fan_out: bool,
    /// PEFT method name; only `LORA` is supported
    #[serde(default)]
    pub peft_type: Option<String>,
    /// Base model the adapter was trained on
    #[serde(default)]
    pub base_model_name_or_path: Option<String>,
}

impl AdapterConfig {
    /// Read and validate an adapter config file
    ///
    /// # Errors
    ///
    /// Returns error if the file is unreadable, malformed or not a LoRA config.
    pub fn from_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path).map_err(|e| {
            CentinelaError::AdapterError(format!("Failed to read {}: {e}", path.display()))
        })?;
        let config: Self = serde_json::from_str(&raw).map_err(|e| {
            CentinelaError::AdapterError(format!("Invalid {}: {e}", path.display()))
        })?;
        config.validate()?;
        Ok(config)
    }

    /// Factor applied to `B · A` before merging
    #[must_use]
    pub fn scale(&self) -> f64 {
        let rank = self.r as f64;
        if self.use_rslora {
            self.lora_alpha / rank.sqrt()
        } else {
            self.lora_alpha / rank
        }
    }

    fn validate(&self) -> Result<()> {
        if self.r == 0 {
            return Err(CentinelaError::AdapterError(
                "LoRA rank r must be positive".to_string(),
            ));
        }
        match self.peft_type.as_deref() {
            None | Some("LORA") => Ok(()),
            Some(other) => Err(CentinelaError::AdapterError(format!(
                "Unsupported peft_type '{other}', only LORA adapters can be merged"
            ))),
        }
    }
}

/// Low-rank factors for one base weight
#[derive(Debug, Clone)]
pub struct LoraPair {
    /// Base tensor name, e.g. `model.layers.0.self_attn.q_proj.weight`
    pub target: String,
    /// Down projection, shape (r, in)
    pub a: Tensor,
    /// Up projection, shape (out, r)
    pub b: Tensor,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum LoraHalf {
    A,
    B,
}

/// A loaded LoRA adapter ready to be merged into base weights
#[derive(Debug, Clone)]
pub struct LoraAdapter {
    config: AdapterConfig,
    pairs: Vec<LoraPair>,
}

impl LoraAdapter {
    /// Load an adapter directory onto `device`
    ///
    /// # Errors
    ///
    /// Returns error if the config or weights are missing or inconsistent.
    pub fn load(dir: &Path, device: &Device) -> Result<Self> {
        let config = AdapterConfig::from_file(&dir.join(ADAPTER_CONFIG_FILE))?;
        let weights_path = dir.join(ADAPTER_WEIGHTS_FILE);
        let tensors = candle_core::safetensors::load(&weights_path, device).map_err(|e| {
            CentinelaError::AdapterError(format!(
                "Failed to load {}: {e}",
                weights_path.display()
            ))
        })?;
        Self::from_tensors(config, tensors)
    }

    /// Pair up `lora_A`/`lora_B` tensors by the module they adapt
    ///
    /// Tensors that are not LoRA factors (e.g. `modules_to_save` copies) are
    /// skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns error if a factor has no counterpart or nothing was found.
    pub fn from_tensors(config: AdapterConfig, tensors: HashMap<String, Tensor>) -> Result<Self> {
        config.validate()?;

        let mut halves: BTreeMap<String, (Option<Tensor>, Option<Tensor>)> = BTreeMap::new();
        for (name, tensor) in tensors {
            match split_lora_key(&name) {
                Some((module, LoraHalf::A)) => halves.entry(module).or_default().0 = Some(tensor),
                Some((module, LoraHalf::B)) => halves.entry(module).or_default().1 = Some(tensor),
                None => warn!(tensor = %name, "Skipping adapter tensor that is not a LoRA factor"),
            }
        }

        let pairs = halves
            .into_iter()
            .map(|(module, halves)| match halves {
                (Some(a), Some(b)) => Ok(LoraPair {
                    target: format!("{module}.weight"),
                    a,
                    b,
                }),
                (Some(_), None) => Err(CentinelaError::AdapterError(format!(
                    "{module} has lora_A but no lora_B"
                ))),
                (None, _) => Err(CentinelaError::AdapterError(format!(
                    "{module} has lora_B but no lora_A"
                ))),
            })
            .collect::<Result<Vec<_>>>()?;

        if pairs.is_empty() {
            return Err(CentinelaError::AdapterError(
                "Adapter contains no LoRA weights".to_string(),
            ));
        }

        Ok(Self { config, pairs })
    }

    /// Adapter hyper-parameters
    #[must_use]
    pub fn config(&self) -> &AdapterConfig {
        &self.config
    }

    /// Number of adapted weights
    #[must_use]
    pub fn len(&self) -> usize {
        self.pairs.len()
    }

    /// Whether the adapter adapts nothing (never true once loaded)
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.pairs.is_empty()
    }

    /// Names of the base tensors this adapter modifies
    pub fn targets(&self) -> impl Iterator<Item = &str> {
        self.pairs.iter().map(|p| p.target.as_str())
    }

    /// Fold every pair into `weights`, returning the number merged
    ///
    /// # Errors
    ///
    /// Returns error if a target is missing from `weights` or its shape does
    /// not match `B · A`.
    pub fn merge_into(&self, weights: &mut HashMap<String, Tensor>) -> Result<usize> {
        let scale = self.config.scale();
        for pair in &self.pairs {
            let base = weights.get(&pair.target).ok_or_else(|| {
                CentinelaError::AdapterError(format!(
                    "Base model has no weight '{}' for this adapter",
                    pair.target
                ))
            })?;
            let merged = merge_weight(base, pair, scale, self.config.fan_in_fan_out)?;
            weights.insert(pair.target.clone(), merged);
        }
        Ok(self.pairs.len())
    }
}

/// `base + scale · (B · A)`, computed in f32 and cast back
fn merge_weight(base: &Tensor, pair: &LoraPair, scale: f64, fan_in_fan_out: bool) -> Result<Tensor> {
    let a = pair.a.to_dtype(DType::F32)?;
    let b = pair.b.to_dtype(DType::F32)?;
    let mut delta = b.matmul(&a)?.affine(scale, 0.0)?;
    if fan_in_fan_out {
        delta = delta.t()?;
    }
    if delta.dims() != base.dims() {
        return Err(CentinelaError::AdapterError(format!(
            "Shape mismatch for {}: base {:?}, adapter delta {:?}",
            pair.target,
            base.dims(),
            delta.dims()
        )));
    }
    let merged = (base.to_dtype(DType::F32)? + delta)?;
    Ok(merged.to_dtype(base.dtype())?)
}

/// Split `base_model.model.<module>.lora_A[.<name>].weight` into module and half
fn split_lora_key(name: &str) -> Option<(String, LoraHalf)> {
    let name = name.strip_prefix(PEFT_PREFIX).unwrap_or(name);
    [(".lora_A", LoraHalf::A), (".lora_B", LoraHalf::B)]
        .into_iter()
        .find_map(|(marker, half)| {
            let idx = name.find(marker)?;
            let rest = &name[idx + marker.len()..];
            rest.ends_with(".weight")
                .then(|| (name[..idx].to_string(), half))
        })
}
