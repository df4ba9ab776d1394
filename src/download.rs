//! Model weight fetching with streaming downloads and atomic installation
//!
//! Weights are streamed from `HuggingFace` repositories into a staging
//! directory inside the cache root and moved into place with a rename, so a
//! failed download never leaves a partial model in the cache.

use crate::cache::{ModelCache, ModelManifest};
use crate::error::{ClosetError, Result};
use crate::models::{ModelSource, ModelVariant, DEFAULT_MODEL_URL};
use crate::progress::ProgressSink;
use chrono::Utc;
use futures_util::stream::TryStreamExt;
use reqwest::Client;
use sha2::{Digest, Sha256};
use std::fs;
use std::path::{Path, PathBuf};
use tokio::io::AsyncWriteExt;
use tokio_util::io::StreamReader;

/// Fetches model weights into the local cache
#[derive(Debug, Clone)]
pub struct ModelFetcher {
    client: Client,
    cache: ModelCache,
}

impl ModelFetcher {
    /// Create a fetcher backed by the default cache location
    ///
    /// # Errors
    /// - Failed to create HTTP client
    /// - Failed to initialize model cache
    pub fn new() -> Result<Self> {
        Self::with_cache(ModelCache::new()?)
    }

    /// Create a fetcher backed by a specific cache
    ///
    /// # Errors
    /// - Failed to create HTTP client
    pub fn with_cache(cache: ModelCache) -> Result<Self> {
        let client = Client::builder()
            .timeout(std::time::Duration::from_secs(300))
            .build()
            .map_err(|e| ClosetError::network(format!("Failed to create HTTP client: {e}")))?;

        Ok(Self { client, cache })
    }

    /// The cache backing this fetcher
    #[must_use]
    pub fn cache(&self) -> &ModelCache {
        &self.cache
    }

    /// Resolve a model source to a weight file on disk, downloading if needed
    ///
    /// External sources must already exist; downloaded sources are served
    /// from the cache when present, otherwise fetched. The empty URL resolves
    /// to the default model repository.
    ///
    /// # Errors
    /// - External weight file missing
    /// - Network or filesystem failure during download
    pub async fn ensure_weights(
        &self,
        source: &ModelSource,
        variant: ModelVariant,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf> {
        match source {
            ModelSource::External(path) => {
                if path.is_file() {
                    Ok(path.clone())
                } else {
                    Err(ClosetError::model_init(format!(
                        "External model weights not found: {}",
                        path.display()
                    )))
                }
            },
            ModelSource::Downloaded(url) => {
                let url = if url.is_empty() { DEFAULT_MODEL_URL } else { url };
                let model_id = ModelCache::url_to_model_id(url);

                if self.cache.has_variant(&model_id, variant) {
                    log::debug!("Cache hit for {} ({})", model_id, variant);
                    return Ok(self.cache.weight_path(&model_id, variant));
                }

                self.fetch_variant(url, &model_id, variant, None, progress)
                    .await
            },
        }
    }

    /// Download one weight variant into the cache
    ///
    /// Streams into a staging directory on the cache filesystem, optionally
    /// verifies a SHA-256 checksum, then renames the file into place.
    ///
    /// # Errors
    /// - Unsupported URL, network failure, checksum mismatch, or filesystem
    ///   failure
    pub async fn fetch_variant(
        &self,
        url: &str,
        model_id: &str,
        variant: ModelVariant,
        expected_sha256: Option<&str>,
        progress: &dyn ProgressSink,
    ) -> Result<PathBuf> {
        validate_model_url(url)?;
        log::info!("Downloading {} variant of {} from {}", variant, model_id, url);

        // Staging lives under the cache root so the final rename stays on
        // one filesystem
        let staging = tempfile::tempdir_in(self.cache.current_cache_dir()).map_err(|e| {
            ClosetError::file_io_error("create staging directory", self.cache.current_cache_dir(), e)
        })?;
        let staged_file = staging.path().join(variant.weight_file());

        let file_url = weight_url(url, variant);
        let actual_sha256 = self
            .download_file(&file_url, &staged_file, progress)
            .await?;

        if let Some(expected) = expected_sha256 {
            if !actual_sha256.eq_ignore_ascii_case(expected) {
                return Err(ClosetError::model_init(format!(
                    "Checksum mismatch for {file_url}: expected {expected}, got {actual_sha256}"
                )));
            }
            log::debug!("Checksum verified for {}", file_url);
        }

        let model_dir = self.cache.model_path(model_id);
        fs::create_dir_all(&model_dir)
            .map_err(|e| ClosetError::file_io_error("create model directory", &model_dir, e))?;

        let final_path = self.cache.weight_path(model_id, variant);
        fs::rename(&staged_file, &final_path).map_err(|e| {
            ClosetError::file_io_error("install downloaded weights", &final_path, e)
        })?;

        let manifest = ModelManifest {
            url: url.to_string(),
            fetched_at: Utc::now(),
        };
        if let Err(e) = self.cache.write_manifest(model_id, &manifest) {
            log::warn!("Failed to write model manifest for {}: {}", model_id, e);
        }

        log::info!("Installed {} ({})", model_id, variant);
        Ok(final_path)
    }

    /// Stream a single file to disk, returning its SHA-256 hex digest
    async fn download_file(
        &self,
        url: &str,
        local_path: &Path,
        progress: &dyn ProgressSink,
    ) -> Result<String> {
        log::debug!("Downloading: {} -> {}", url, local_path.display());

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| ClosetError::network(format!("Failed to download {url}: {e}")))?;

        if !response.status().is_success() {
            return Err(ClosetError::network(format!(
                "HTTP error {} for {}",
                response.status(),
                url
            )));
        }

        let total_size = response.content_length();
        progress.on_progress(0);

        let mut file = tokio::fs::File::create(local_path)
            .await
            .map_err(|e| ClosetError::file_io_error("create file", local_path, e))?;

        let mut stream = StreamReader::new(
            response
                .bytes_stream()
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::Other, e)),
        );

        let mut hasher = Sha256::new();
        let mut downloaded = 0u64;
        let mut buffer = vec![0; 8192];

        loop {
            let bytes_read = tokio::io::AsyncReadExt::read(&mut stream, &mut buffer)
                .await
                .map_err(|e| {
                    ClosetError::network(format!("Failed to read download stream: {e}"))
                })?;

            if bytes_read == 0 {
                break;
            }

            let chunk = buffer.get(..bytes_read).unwrap_or(&[]);
            hasher.update(chunk);
            file.write_all(chunk)
                .await
                .map_err(|e| ClosetError::file_io_error("write to file", local_path, e))?;

            downloaded += bytes_read as u64;

            if let Some(total) = total_size {
                if total > 0 {
                    let percent = downloaded.saturating_mul(100) / total;
                    progress.on_progress(u8::try_from(percent.min(100)).unwrap_or(100));
                }
            }
        }

        file.flush()
            .await
            .map_err(|e| ClosetError::file_io_error("flush file", local_path, e))?;

        log::debug!("Downloaded {} bytes to {}", downloaded, local_path.display());
        Ok(format!("{:x}", hasher.finalize()))
    }
}

/// Weight file URL inside a `HuggingFace` repository
fn weight_url(base_url: &str, variant: ModelVariant) -> String {
    format!(
        "{}/resolve/main/{}",
        base_url.trim_end_matches('/'),
        variant.repo_file()
    )
}

/// Validate that a URL is a supported model repository
///
/// Only `HuggingFace` repositories are supported.
///
/// # Errors
/// - Empty URL, wrong host, or missing repository path
pub fn validate_model_url(url: &str) -> Result<()> {
    if url.is_empty() {
        return Err(ClosetError::invalid_config(
            "Model URL cannot be empty".to_string(),
        ));
    }

    if !url.starts_with("https://huggingface.co/") {
        return Err(ClosetError::invalid_config(format!(
            "Unsupported URL format: {url}. Only HuggingFace repositories are supported (https://huggingface.co/...)"
        )));
    }

    let repo_path = url.trim_start_matches("https://huggingface.co/");
    if repo_path.is_empty() || !repo_path.contains('/') {
        return Err(ClosetError::invalid_config(format!(
            "Invalid HuggingFace repository URL: {url}. Expected format: https://huggingface.co/username/repo-name"
        )));
    }

    Ok(())
}
