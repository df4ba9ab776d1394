//! Tract backend for the quality segmentation engine
//!
//! Pure Rust inference with no external runtime. The optimized plan costs
//! more to compile and run than ONNX Runtime, so this backend serves the
//! quality engine where portability matters more than latency.

use crate::config::ScanConfig;
use crate::download::ModelFetcher;
use crate::error::{ClosetError, Result};
use crate::inference::Segmenter;
use crate::models::INPUT_PROFILE;
use crate::preprocessing;
use crate::progress::NoOpProgress;
use async_trait::async_trait;
use image::{DynamicImage, RgbaImage};
use ndarray::Array4;
use std::sync::Arc;
use tokio::sync::OnceCell;
use tract_onnx::prelude::*;

/// Type alias for the complex Tract model type to reduce complexity warnings
type TractModel = RunnableModel<TypedFact, Box<dyn TypedOp>, Graph<TypedFact, Box<dyn TypedOp>>>;

// Use instant crate for cross-platform time compatibility
use instant::Instant;

/// Quality segmentation engine running entirely in Rust
///
/// Weights resolve through the same cache as the fast engine. The plan
/// compiles once on first use; Tract plans run from shared references, so
/// concurrent scans need no request queue here.
pub struct TractSegmenter {
    config: ScanConfig,
    fetcher: ModelFetcher,
    model: OnceCell<Arc<TractModel>>,
}

impl TractSegmenter {
    /// Create a quality engine for the given configuration
    ///
    /// # Errors
    /// - Model cache directory cannot be resolved or created
    /// - HTTP client construction fails
    pub fn new(config: ScanConfig) -> Result<Self> {
        Ok(Self {
            config,
            fetcher: ModelFetcher::new()?,
            model: OnceCell::new(),
        })
    }

    /// Create a quality engine with an injected fetcher (custom cache location)
    #[must_use]
    pub fn with_fetcher(config: ScanConfig, fetcher: ModelFetcher) -> Self {
        Self {
            config,
            fetcher,
            model: OnceCell::new(),
        }
    }

    /// Resolve weights and compile the optimized plan once
    async fn model(&self) -> Result<&Arc<TractModel>> {
        self.model
            .get_or_try_init(|| async {
                let variant = self
                    .config
                    .model_spec
                    .variant
                    .unwrap_or(self.config.engine.default_variant());
                let weights_path = self
                    .fetcher
                    .ensure_weights(&self.config.model_spec.source, variant, &NoOpProgress)
                    .await?;

                let model_data = tokio::fs::read(&weights_path).await.map_err(|e| {
                    ClosetError::file_io_error("read model weights", &weights_path, e)
                })?;

                log::debug!(
                    "Compiling Tract plan from {} ({} bytes)",
                    weights_path.display(),
                    model_data.len()
                );
                let compile_start = Instant::now();

                let model = tokio::task::spawn_blocking(move || compile_plan(&model_data))
                    .await
                    .map_err(|e| {
                        ClosetError::model_init(format!("Plan compilation task failed: {e}"))
                    })??;

                log::info!(
                    "Tract plan ready in {:.2}ms",
                    compile_start.elapsed().as_secs_f64() * 1000.0
                );

                Ok(Arc::new(model))
            })
            .await
    }
}

/// Parse, optimize and seal an ONNX graph into a runnable Tract plan
fn compile_plan(model_data: &[u8]) -> Result<TractModel> {
    onnx()
        .model_for_read(&mut std::io::Cursor::new(model_data))
        .map_err(|e| ClosetError::model_init(format!("Failed to load ONNX model: {e}")))?
        .into_optimized()
        .map_err(|e| ClosetError::model_init(format!("Failed to optimize model: {e}")))?
        .into_runnable()
        .map_err(|e| ClosetError::model_init(format!("Failed to create runnable model: {e}")))
}

/// Run one matting pass through the plan
fn run_plan(model: &TractModel, input: Array4<f32>) -> Result<Array4<f32>> {
    let inference_start = Instant::now();

    let input_tensor = Tensor::from(input);
    let outputs = model
        .run(tvec![input_tensor.into()])
        .map_err(|e| ClosetError::inference(format!("Tract inference failed: {e}")))?;

    let output_tensor = outputs
        .into_iter()
        .next()
        .ok_or_else(|| ClosetError::inference("No output tensors found"))?
        .into_arc_tensor();

    let output_data = output_tensor
        .to_array_view::<f32>()
        .map_err(|e| ClosetError::inference(format!("Failed to extract output tensor: {e}")))?;

    let output_shape = output_data.shape();
    if output_shape.len() != 4 {
        return Err(ClosetError::inference(format!(
            "Expected 4D output tensor, got {}D",
            output_shape.len()
        )));
    }

    let result = Array4::from_shape_vec(
        (
            output_shape.first().copied().unwrap_or(1),
            output_shape.get(1).copied().unwrap_or(1),
            output_shape.get(2).copied().unwrap_or(1),
            output_shape.get(3).copied().unwrap_or(1),
        ),
        output_data.to_owned().into_raw_vec_and_offset().0,
    )
    .map_err(|e| ClosetError::inference(format!("Failed to reshape output tensor: {e}")))?;

    log::debug!(
        "📊 Tract inference complete: {:.2}ms",
        inference_start.elapsed().as_secs_f64() * 1000.0
    );

    Ok(result)
}

#[async_trait]
impl Segmenter for TractSegmenter {
    async fn segment(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let model = Arc::clone(self.model().await?);

        let input_image = image.clone();
        let mask = tokio::task::spawn_blocking(move || {
            let tensor = preprocessing::image_to_tensor(&input_image, &INPUT_PROFILE);
            run_plan(&model, tensor)
        })
        .await
        .map_err(|e| ClosetError::segmentation(format!("Inference task failed: {e}")))??;

        let composite_image = image.clone();
        tokio::task::spawn_blocking(move || preprocessing::mask_to_alpha(&composite_image, &mask))
            .await
            .map_err(|e| ClosetError::segmentation(format!("Compositing task failed: {e}")))?
    }
}

#[cfg(all(test, feature = "tract"))]
mod tests {
    use super::*;
    use crate::cache::ModelCache;
    use crate::models::{ModelSource, ModelSpec};
    use tempfile::TempDir;

    fn config_with_missing_weights(temp: &TempDir) -> ScanConfig {
        ScanConfig::builder()
            .model_spec(ModelSpec {
                source: ModelSource::External(temp.path().join("missing.onnx")),
                variant: None,
            })
            .build()
            .unwrap()
    }

    #[test]
    fn test_compile_plan_rejects_garbage() {
        let result = compile_plan(b"definitely not an onnx graph");
        assert!(matches!(result, Err(ClosetError::ModelInit(_))));
    }

    #[tokio::test]
    async fn test_segment_fails_without_weights() {
        let temp = TempDir::new().unwrap();
        let cache = ModelCache::with_custom_cache_dir(temp.path()).unwrap();
        let fetcher = ModelFetcher::with_cache(cache).unwrap();
        let segmenter = TractSegmenter::with_fetcher(config_with_missing_weights(&temp), fetcher);

        let image = DynamicImage::new_rgb8(8, 8);
        let result = segmenter.segment(&image).await;
        assert!(matches!(result, Err(ClosetError::ModelInit(_))));
    }

    #[tokio::test]
    async fn test_plan_compile_failure_is_not_cached() {
        let temp = TempDir::new().unwrap();
        let weights = temp.path().join("broken.onnx");
        std::fs::write(&weights, b"junk bytes").unwrap();

        let cache = ModelCache::with_custom_cache_dir(temp.path()).unwrap();
        let fetcher = ModelFetcher::with_cache(cache).unwrap();
        let config = ScanConfig::builder()
            .model_spec(ModelSpec {
                source: ModelSource::External(weights),
                variant: None,
            })
            .build()
            .unwrap();
        let segmenter = TractSegmenter::with_fetcher(config, fetcher);

        let image = DynamicImage::new_rgb8(8, 8);
        assert!(segmenter.segment(&image).await.is_err());
        // OnceCell must not have been poisoned with a half-built plan
        assert!(segmenter.segment(&image).await.is_err());
    }
}
