//! Model asset downloading and caching via hf-hub.

use crate::config::ModelConfig;
use crate::error::{PipelineError, Result};
use std::path::PathBuf;
use tracing::info;

/// Manages downloading and caching of inference model files.
pub struct ModelManager {
    cache_dir: PathBuf,
}

impl ModelManager {
    /// Create a new model manager.
    ///
    /// # Errors
    ///
    /// Returns an error if the cache directory cannot be created.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        std::fs::create_dir_all(&config.cache_dir)?;
        info!("model cache directory: {}", config.cache_dir.display());

        Ok(Self {
            cache_dir: config.cache_dir.clone(),
        })
    }

    /// Get the path to a cached model file, downloading if necessary.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be downloaded.
    pub fn get_model_path(&self, repo_id: &str, filename: &str) -> Result<PathBuf> {
        let api = hf_hub::api::sync::Api::new()
            .map_err(|e| PipelineError::Model(format!("failed to create HF API: {e}")))?;

        let repo = api.model(repo_id.to_owned());
        let path = repo.get(filename).map_err(|e| {
            PipelineError::Model(format!("failed to download {filename} from {repo_id}: {e}"))
        })?;

        Ok(path)
    }

    /// Get the snapshot directory containing all cached files for a repo.
    ///
    /// Some engines (Parakeet TDT) expect a directory path rather than
    /// individual files. hf-hub stores files under a snapshot directory;
    /// resolving any file and taking its parent finds it.
    ///
    /// # Errors
    ///
    /// Returns an error if the repo directory cannot be determined.
    pub fn get_repo_dir(&self, repo_id: &str) -> Result<PathBuf> {
        let api = hf_hub::api::sync::Api::new()
            .map_err(|e| PipelineError::Model(format!("failed to create HF API: {e}")))?;

        let repo = api.model(repo_id.to_owned());
        let repo_info = repo.info().map_err(|e| {
            PipelineError::Model(format!("failed to get repo info for {repo_id}: {e}"))
        })?;

        if let Some(sibling) = repo_info.siblings.first() {
            let file_path = repo.get(&sibling.rfilename).map_err(|e| {
                PipelineError::Model(format!(
                    "failed to download {} from {repo_id}: {e}",
                    sibling.rfilename
                ))
            })?;

            if let Some(parent) = file_path.parent() {
                return Ok(parent.to_path_buf());
            }
        }

        Err(PipelineError::Model(format!(
            "could not determine repo directory for {repo_id}"
        )))
    }

    /// The configured cache directory.
    pub fn cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }
}
