//! Model cache management for downloaded weights
//!
//! Cached models live in an XDG-compliant directory, one subdirectory per
//! model id, holding the weight file per variant plus a small manifest
//! recording where the weights came from.

use crate::error::{ClosetError, Result};
use crate::models::{ModelVariant, DEFAULT_MODEL_URL};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

/// Environment variable overriding the cache root
pub const CACHE_DIR_ENV: &str = "CLOSETKIT_CACHE_DIR";

/// Sidecar written next to downloaded weights
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelManifest {
    /// Source URL the weights were fetched from
    pub url: String,
    /// When the fetch completed
    pub fetched_at: DateTime<Utc>,
}

/// Information about a cached model
#[derive(Debug, Clone)]
pub struct CachedModelInfo {
    /// Model identifier (derived from URL)
    pub model_id: String,
    /// Path to the cached model directory
    pub path: PathBuf,
    /// Variants present on disk
    pub variants: Vec<ModelVariant>,
    /// Source URL, when the manifest survives
    pub source_url: Option<String>,
    /// Total size of the model directory in bytes
    pub size_bytes: u64,
}

/// Model cache manager
#[derive(Debug, Clone)]
pub struct ModelCache {
    cache_dir: PathBuf,
}

impl ModelCache {
    /// Create a cache manager rooted at the platform cache directory
    ///
    /// Linux/macOS: `~/.cache/closetkit/models/`; overridable with
    /// `CLOSETKIT_CACHE_DIR`.
    ///
    /// # Errors
    /// - Failed to determine or create the cache directory
    pub fn new() -> Result<Self> {
        let cache_dir = Self::resolve_cache_dir()?;
        if !cache_dir.exists() {
            fs::create_dir_all(&cache_dir).map_err(|e| {
                ClosetError::file_io_error("create cache directory", &cache_dir, e)
            })?;
        }
        Ok(Self { cache_dir })
    }

    /// Create a cache manager under a custom root
    ///
    /// # Errors
    /// - Failed to create the cache directory
    pub fn with_custom_cache_dir(cache_dir: &Path) -> Result<Self> {
        let models_dir = cache_dir.join("models");
        if !models_dir.exists() {
            fs::create_dir_all(&models_dir).map_err(|e| {
                ClosetError::file_io_error("create custom cache directory", &models_dir, e)
            })?;
        }
        Ok(Self {
            cache_dir: models_dir,
        })
    }

    fn resolve_cache_dir() -> Result<PathBuf> {
        if let Ok(cache_override) = std::env::var(CACHE_DIR_ENV) {
            return Ok(PathBuf::from(cache_override).join("models"));
        }

        Ok(dirs::cache_dir()
            .ok_or_else(|| {
                ClosetError::invalid_config(format!(
                    "Failed to determine cache directory. Set {CACHE_DIR_ENV}."
                ))
            })?
            .join("closetkit")
            .join("models"))
    }

    /// Generate a model id from a URL
    ///
    /// HuggingFace URLs map to `owner--repo`; anything else hashes to a
    /// stable `url-<hex>` identifier.
    ///
    /// # Examples
    /// ```
    /// use closetkit::cache::ModelCache;
    ///
    /// let id = ModelCache::url_to_model_id("https://huggingface.co/imgly/isnet-general-onnx");
    /// assert_eq!(id, "imgly--isnet-general-onnx");
    /// ```
    #[must_use]
    pub fn url_to_model_id(url: &str) -> String {
        let prefix = "https://huggingface.co/";
        if url.starts_with(prefix) {
            url.get(prefix.len()..).unwrap_or(url).replace('/', "--")
        } else {
            use sha2::{Digest, Sha256};
            let mut hasher = Sha256::new();
            hasher.update(url.as_bytes());
            let digest = format!("{:x}", hasher.finalize());
            format!("url-{}", digest.get(..16).unwrap_or(&digest))
        }
    }

    /// The id the empty-source `ModelSpec` resolves to
    #[must_use]
    pub fn default_model_id() -> String {
        Self::url_to_model_id(DEFAULT_MODEL_URL)
    }

    /// Path of a model's cache directory (may not exist)
    #[must_use]
    pub fn model_path(&self, model_id: &str) -> PathBuf {
        self.cache_dir.join(model_id)
    }

    /// Path of one variant's weight file (may not exist)
    #[must_use]
    pub fn weight_path(&self, model_id: &str, variant: ModelVariant) -> PathBuf {
        self.model_path(model_id).join(variant.weight_file())
    }

    /// Whether a variant's weights are present on disk
    #[must_use]
    pub fn has_variant(&self, model_id: &str, variant: ModelVariant) -> bool {
        self.weight_path(model_id, variant).is_file()
    }

    /// Whether any variant of the model is present
    #[must_use]
    pub fn is_model_cached(&self, model_id: &str) -> bool {
        self.has_variant(model_id, ModelVariant::Fp32)
            || self.has_variant(model_id, ModelVariant::Fp16)
    }

    /// Write the manifest sidecar for a model
    ///
    /// # Errors
    /// - Serialization or file write failure
    pub fn write_manifest(&self, model_id: &str, manifest: &ModelManifest) -> Result<()> {
        let path = self.model_path(model_id).join("manifest.json");
        let json = serde_json::to_string_pretty(manifest)
            .map_err(|e| ClosetError::invalid_config(format!("Manifest encoding failed: {e}")))?;
        fs::write(&path, json)
            .map_err(|e| ClosetError::file_io_error("write model manifest", &path, e))
    }

    /// Read the manifest sidecar, if one exists and parses
    #[must_use]
    pub fn read_manifest(&self, model_id: &str) -> Option<ModelManifest> {
        let path = self.model_path(model_id).join("manifest.json");
        let content = fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    /// Scan the cache and return all models that hold at least one variant
    ///
    /// # Errors
    /// - Failed to read the cache directory
    pub fn scan_cached_models(&self) -> Result<Vec<CachedModelInfo>> {
        let mut models = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(models);
        }

        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            ClosetError::file_io_error("read cache directory", &self.cache_dir, e)
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                ClosetError::file_io_error("read cache directory entry", &self.cache_dir, e)
            })?;

            let path = entry.path();
            if !path.is_dir() {
                continue;
            }

            let Some(model_id) = path.file_name().and_then(|name| name.to_str()) else {
                continue;
            };

            let variants: Vec<ModelVariant> = [ModelVariant::Fp32, ModelVariant::Fp16]
                .into_iter()
                .filter(|variant| self.has_variant(model_id, *variant))
                .collect();

            if variants.is_empty() {
                log::debug!("Skipping cache entry without weights: {}", path.display());
                continue;
            }

            models.push(CachedModelInfo {
                model_id: model_id.to_string(),
                path: path.clone(),
                variants,
                source_url: self.read_manifest(model_id).map(|m| m.url),
                size_bytes: directory_size(&path).unwrap_or(0),
            });
        }

        models.sort_by(|a, b| a.model_id.cmp(&b.model_id));
        Ok(models)
    }

    /// Remove one cached model
    ///
    /// Returns `true` if the model existed and was removed.
    ///
    /// # Errors
    /// - Failed to remove the model directory
    pub fn clear_model(&self, model_id: &str) -> Result<bool> {
        let model_path = self.model_path(model_id);
        if !model_path.exists() {
            return Ok(false);
        }

        log::info!("Removing cached model: {}", model_id);
        fs::remove_dir_all(&model_path)
            .map_err(|e| ClosetError::file_io_error("remove cached model", &model_path, e))?;
        Ok(true)
    }

    /// Remove every cached model, returning the removed ids
    ///
    /// # Errors
    /// - Failed to access or remove cache entries
    pub fn clear_all_models(&self) -> Result<Vec<String>> {
        let mut removed = Vec::new();

        if !self.cache_dir.exists() {
            return Ok(removed);
        }

        let entries = fs::read_dir(&self.cache_dir).map_err(|e| {
            ClosetError::file_io_error("read cache directory", &self.cache_dir, e)
        })?;

        for entry in entries {
            let entry = entry.map_err(|e| {
                ClosetError::file_io_error("read cache directory entry", &self.cache_dir, e)
            })?;

            let path = entry.path();
            if path.is_dir() {
                let model_id = path
                    .file_name()
                    .and_then(|name| name.to_str())
                    .unwrap_or("unknown")
                    .to_string();

                log::info!("Removing cached model: {}", model_id);
                fs::remove_dir_all(&path).map_err(|e| {
                    ClosetError::file_io_error("remove cached model directory", &path, e)
                })?;
                removed.push(model_id);
            }
        }

        Ok(removed)
    }

    /// The cache directory currently in use
    #[must_use]
    pub fn current_cache_dir(&self) -> &PathBuf {
        &self.cache_dir
    }
}

/// Total size of a directory in bytes
fn directory_size(dir: &Path) -> std::io::Result<u64> {
    let mut total = 0;
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.is_dir() {
            total += directory_size(&path)?;
        } else {
            total += entry.metadata()?.len();
        }
    }
    Ok(total)
}

/// Format file size in human-readable form
#[must_use]
pub fn format_size(bytes: u64) -> String {
    const UNITS: &[&str] = &["B", "KB", "MB", "GB", "TB"];
    let mut size = bytes as f64;
    let mut unit_index = 0;

    while size >= 1024.0 && unit_index < UNITS.len() - 1 {
        size /= 1024.0;
        unit_index += 1;
    }

    if unit_index == 0 {
        format!("{} {}", bytes, UNITS.get(unit_index).unwrap_or(&"B"))
    } else {
        format!("{:.1} {}", size, UNITS.get(unit_index).unwrap_or(&"B"))
    }
}
