//! Locating base model artifacts
//!
//! A base model is a directory (local or a Hub snapshot) holding
//! `config.json`, `tokenizer.json` and safetensors weights, either a single
//! `model.safetensors` or shards listed in `model.safetensors.index.json`.

use std::collections::BTreeSet;
use std::path::{Path, PathBuf};

use hf_hub::api::sync::{Api, ApiRepo};

use crate::error::{CentinelaError, Result};

const CONFIG_FILE: &str = "config.json";
const TOKENIZER_FILE: &str = "tokenizer.json";
const WEIGHTS_FILE: &str = "model.safetensors";
const WEIGHTS_INDEX_FILE: &str = "model.safetensors.index.json";

/// Resolved paths of a base model's files
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelFiles {
    /// Model `config.json`
    pub config: PathBuf,
    /// Tokenizer `tokenizer.json`
    pub tokenizer: PathBuf,
    /// Safetensors weight files, in shard order
    pub weights: Vec<PathBuf>,
}

impl ModelFiles {
    /// Resolve a base model identifier
    ///
    /// An existing directory is used as is; anything else is fetched from
    /// the Hugging Face Hub (honouring the local cache).
    ///
    /// # Errors
    ///
    /// Returns error if a required file is missing or cannot be downloaded.
    pub fn resolve(base_model: &str) -> Result<Self> {
        let local = Path::new(base_model);
        if local.is_dir() {
            Self::from_dir(local)
        } else {
            Self::from_hub(base_model)
        }
    }

    /// Resolve files inside a local model directory
    ///
    /// # Errors
    ///
    /// Returns error if `config.json`, `tokenizer.json` or the weights are
    /// missing.
    pub fn from_dir(dir: &Path) -> Result<Self> {
        let require = |name: &str| -> Result<PathBuf> {
            let path = dir.join(name);
            if path.is_file() {
                Ok(path)
            } else {
                Err(CentinelaError::IoError {
                    message: format!("{} not found", path.display()),
                })
            }
        };

        let config = require(CONFIG_FILE)?;
        let tokenizer = require(TOKENIZER_FILE)?;
        let weights = if dir.join(WEIGHTS_FILE).is_file() {
            vec![dir.join(WEIGHTS_FILE)]
        } else {
            let index = require(WEIGHTS_INDEX_FILE)?;
            shard_names(&index)?
                .into_iter()
                .map(|name| require(&name))
                .collect::<Result<Vec<_>>>()?
        };

        Ok(Self {
            config,
            tokenizer,
            weights,
        })
    }

    fn from_hub(repo_id: &str) -> Result<Self> {
        let api = Api::new().map_err(|e| CentinelaError::IoError {
            message: format!("Failed to initialise Hugging Face Hub client: {e}"),
        })?;
        let repo = api.model(repo_id.to_string());

        let config = fetch(&repo, repo_id, CONFIG_FILE)?;
        let tokenizer = fetch(&repo, repo_id, TOKENIZER_FILE)?;
        let weights = match repo.get(WEIGHTS_FILE) {
            Ok(path) => vec![path],
            Err(_) => {
                let index = fetch(&repo, repo_id, WEIGHTS_INDEX_FILE)?;
                shard_names(&index)?
                    .into_iter()
                    .map(|name| fetch(&repo, repo_id, &name))
                    .collect::<Result<Vec<_>>>()?
            },
        };

        Ok(Self {
            config,
            tokenizer,
            weights,
        })
    }
}

fn fetch(repo: &ApiRepo, repo_id: &str, file: &str) -> Result<PathBuf> {
    repo.get(file).map_err(|e| CentinelaError::IoError {
        message: format!("Failed to fetch {file} from {repo_id}: {e}"),
    })
}

/// Distinct shard file names referenced by a safetensors index, sorted
///
/// # Errors
///
/// Returns error if the index cannot be read or has no `weight_map`.
pub fn shard_names(index_path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(index_path).map_err(|e| CentinelaError::IoError {
        message: format!("Failed to read {}: {e}", index_path.display()),
    })?;
    let index: serde_json::Value = serde_json::from_str(&raw).map_err(|e| {
        CentinelaError::InvalidConfiguration(format!(
            "Invalid weight index {}: {e}",
            index_path.display()
        ))
    })?;
    let weight_map = index
        .get("weight_map")
        .and_then(serde_json::Value::as_object)
        .ok_or_else(|| {
            CentinelaError::InvalidConfiguration(format!(
                "{} has no weight_map",
                index_path.display()
            ))
        })?;

    let shards: BTreeSet<String> = weight_map
        .values()
        .filter_map(|v| v.as_str().map(str::to_string))
        .collect();
    Ok(shards.into_iter().collect())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    fn touch(dir: &Path, name: &str, contents: &str) {
        fs::write(dir.join(name), contents).unwrap();
    }

    #[test]
    fn test_from_dir_single_file() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "config.json", "{}");
        touch(dir.path(), "tokenizer.json", "{}");
        touch(dir.path(), "model.safetensors", "");

        let files = ModelFiles::from_dir(dir.path()).unwrap();
        assert_eq!(files.config, dir.path().join("config.json"));
        assert_eq!(files.tokenizer, dir.path().join("tokenizer.json"));
        assert_eq!(files.weights, vec![dir.path().join("model.safetensors")]);
    }

    #[test]
    fn test_from_dir_sharded() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "config.json", "{}");
        touch(dir.path(), "tokenizer.json", "{}");
        touch(
            dir.path(),
            "model.safetensors.index.json",
            r#"{"weight_map": {
                "a.weight": "model-00002-of-00002.safetensors",
                "b.weight": "model-00001-of-00002.safetensors",
                "c.weight": "model-00001-of-00002.safetensors"
            }}"#,
        );
        touch(dir.path(), "model-00001-of-00002.safetensors", "");
        touch(dir.path(), "model-00002-of-00002.safetensors", "");

        let files = ModelFiles::from_dir(dir.path()).unwrap();
        assert_eq!(
            files.weights,
            vec![
                dir.path().join("model-00001-of-00002.safetensors"),
                dir.path().join("model-00002-of-00002.safetensors"),
            ]
        );
    }

    #[test]
    fn test_from_dir_missing_tokenizer() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "config.json", "{}");
        touch(dir.path(), "model.safetensors", "");

        let err = ModelFiles::from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("tokenizer.json"));
    }

    #[test]
    fn test_from_dir_missing_shard() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "config.json", "{}");
        touch(dir.path(), "tokenizer.json", "{}");
        touch(
            dir.path(),
            "model.safetensors.index.json",
            r#"{"weight_map": {"a.weight": "missing.safetensors"}}"#,
        );

        let err = ModelFiles::from_dir(dir.path()).unwrap_err();
        assert!(err.to_string().contains("missing.safetensors"));
    }

    #[test]
    fn test_shard_names_without_weight_map() {
        let dir = TempDir::new().unwrap();
        touch(dir.path(), "index.json", r#"{"metadata": {}}"#);

        let err = shard_names(&dir.path().join("index.json")).unwrap_err();
        assert!(matches!(err, CentinelaError::InvalidConfiguration(_)));
    }
}
