//! Process configuration
//!
//! Every setting is read from the environment and can be overridden with a
//! flag on `centinela serve`. Defaults match the published service contract:
//! port 8000, `google/gemma-3-270m`, adapter at `./guard_adapter-mini`.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use clap::Args;

use crate::error::{CentinelaError, Result};
use crate::model::ModelConfig;

/// Base model loaded when `BASE_MODEL` is unset
pub const DEFAULT_BASE_MODEL: &str = "google/gemma-3-270m";

/// Adapter directory tried when `ADAPTER_PATH` is unset
pub const DEFAULT_ADAPTER_PATH: &str = "./guard_adapter-mini";

/// Listener port when `PORT` is unset
pub const DEFAULT_PORT: u16 = 8000;

/// Sampler seed when `SEED` is unset
pub const DEFAULT_SEED: u64 = 299_792_458;

/// Server configuration for `centinela serve`
#[derive(Debug, Clone, Args)]
pub struct ServeConfig {
    /// Host to bind to
    #[arg(short = 'H', long, env = "HOST", default_value = "0.0.0.0")]
    pub host: String,

    /// Port to bind to
    #[arg(short, long, env = "PORT", default_value_t = DEFAULT_PORT)]
    pub port: u16,

    /// Base model: local directory or Hugging Face Hub repository id
    #[arg(long, env = "BASE_MODEL", default_value = DEFAULT_BASE_MODEL)]
    pub base_model: String,

    /// LoRA adapter directory (ignored if it does not exist)
    #[arg(long, env = "ADAPTER_PATH", default_value = DEFAULT_ADAPTER_PATH)]
    pub adapter_path: PathBuf,

    /// Skip the adapter even if the path exists
    #[arg(long)]
    pub no_adapter: bool,

    /// Concurrent generation slots
    #[arg(long, env = "MAX_CONCURRENT_GENERATIONS", default_value_t = 1)]
    pub max_concurrent_generations: usize,

    /// Time budget per request (queueing + generation), in seconds
    #[arg(long, env = "GENERATION_TIMEOUT_SECS", default_value_t = 300)]
    pub generation_timeout_secs: u64,

    /// Seed for the token sampler
    #[arg(long, env = "SEED", default_value_t = DEFAULT_SEED)]
    pub seed: u64,

    /// Run on CPU even if CUDA is available
    #[arg(long, env = "CENTINELA_CPU")]
    pub cpu: bool,
}

impl ServeConfig {
    /// Check numeric settings
    ///
    /// # Errors
    ///
    /// Returns error if the concurrency bound or the timeout is zero.
    pub fn validate(&self) -> Result<()> {
        if self.max_concurrent_generations == 0 {
            return Err(CentinelaError::InvalidConfiguration(
                "MAX_CONCURRENT_GENERATIONS must be at least 1".to_string(),
            ));
        }
        if self.generation_timeout_secs == 0 {
            return Err(CentinelaError::InvalidConfiguration(
                "GENERATION_TIMEOUT_SECS must be at least 1".to_string(),
            ));
        }
        Ok(())
    }

    /// Address the listener binds to
    ///
    /// # Errors
    ///
    /// Returns error if host and port do not form a socket address.
    pub fn socket_addr(&self) -> Result<SocketAddr> {
        format!("{}:{}", self.host, self.port).parse().map_err(|e| {
            CentinelaError::InvalidConfiguration(format!(
                "Invalid address {}:{}: {e}",
                self.host, self.port
            ))
        })
    }

    /// Per-request time budget
    #[must_use]
    pub fn generation_timeout(&self) -> Duration {
        Duration::from_secs(self.generation_timeout_secs)
    }

    /// Model settings derived from this configuration
    #[must_use]
    pub fn model_config(&self) -> ModelConfig {
        ModelConfig {
            base_model: self.base_model.clone(),
            adapter_path: (!self.no_adapter).then(|| self.adapter_path.clone()),
            force_cpu: self.cpu,
            seed: self.seed,
        }
    }
}
