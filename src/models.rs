//! Model identity: sources, variants, and the fixed input profile

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Default segmentation model repository
///
/// A general foreground-matting model that performs well on garment shots;
/// callers point `ModelSpec` elsewhere for domain-tuned weights.
pub const DEFAULT_MODEL_URL: &str = "https://huggingface.co/imgly/isnet-general-onnx";

/// Model source specification
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelSource {
    /// Weights file on the local filesystem
    External(PathBuf),
    /// Downloaded model in the cache, by model id
    Downloaded(String),
}

impl ModelSource {
    /// Get a display name for tracing and logging
    #[must_use]
    pub fn display_name(&self) -> String {
        match self {
            ModelSource::External(path) => {
                format!(
                    "external:{}",
                    path.file_name().unwrap_or_default().to_string_lossy()
                )
            },
            ModelSource::Downloaded(model_id) => {
                if model_id.is_empty() {
                    "cached:default".to_string()
                } else {
                    format!("cached:{model_id}")
                }
            },
        }
    }
}

/// Weight precision variants published per model
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ModelVariant {
    /// Half precision, smaller and faster
    Fp16,
    /// Full precision
    Fp32,
}

impl ModelVariant {
    /// Weight file name inside a model's cache directory
    #[must_use]
    pub const fn weight_file(self) -> &'static str {
        match self {
            Self::Fp16 => "model_fp16.onnx",
            Self::Fp32 => "model.onnx",
        }
    }

    /// Path of the weight file inside a HuggingFace repository
    #[must_use]
    pub const fn repo_file(self) -> &'static str {
        match self {
            Self::Fp16 => "onnx/model_fp16.onnx",
            Self::Fp32 => "onnx/model.onnx",
        }
    }
}

impl std::fmt::Display for ModelVariant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fp16 => write!(f, "fp16"),
            Self::Fp32 => write!(f, "fp32"),
        }
    }
}

impl std::str::FromStr for ModelVariant {
    type Err = crate::error::ClosetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fp16" => Ok(Self::Fp16),
            "fp32" => Ok(Self::Fp32),
            other => Err(crate::error::ClosetError::invalid_config(format!(
                "Unknown model variant '{other}' (expected 'fp16' or 'fp32')"
            ))),
        }
    }
}

/// Complete model specification including source and optional variant
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ModelSpec {
    pub source: ModelSource,
    /// Weight precision; `None` lets the engine pick its default
    pub variant: Option<ModelVariant>,
}

impl Default for ModelSpec {
    fn default() -> Self {
        // Empty id resolves to the default model at fetch time
        Self {
            source: ModelSource::Downloaded(String::new()),
            variant: None,
        }
    }
}

/// The model's fixed input contract
///
/// Segmentation models here take a fixed square input normalized per channel
/// with `(x/255 - mean) / std`, NCHW layout. The values are part of the
/// pipeline contract rather than per-model metadata.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InputProfile {
    /// Square edge length of the model input
    pub size: u32,
    /// Per-channel normalization mean
    pub mean: [f32; 3],
    /// Per-channel normalization scale
    pub std: [f32; 3],
}

/// Profile shared by both engines
pub const INPUT_PROFILE: InputProfile = InputProfile {
    size: 1024,
    mean: [0.5, 0.5, 0.5],
    std: [0.5, 0.5, 0.5],
};
