//! ONNX Runtime backend for the fast segmentation engine
//!
//! Builds ONNX Runtime sessions with execution provider auto-detection
//! (CUDA, CoreML, CPU) and runs garment matting inference through the
//! shared [`ModelManager`] request queue.

use crate::config::{ExecutionProvider, ScanConfig};
use crate::error::{ClosetError, Result};
use crate::inference::Segmenter;
use crate::models::INPUT_PROFILE;
use crate::preprocessing;
use crate::session::{InferenceSession, ModelManager, SessionFactory};
use async_trait::async_trait;
use image::{DynamicImage, RgbaImage};
use ndarray::Array4;
use ort::execution_providers::{
    CUDAExecutionProvider, CoreMLExecutionProvider, ExecutionProvider as OrtExecutionProvider,
};
use ort::session::{builder::GraphOptimizationLevel, Session};
use ort::{self, value::Value};
use std::sync::Arc;

/// Builds ONNX Runtime sessions for the [`ModelManager`]
///
/// Session construction honors the configured execution provider. When an
/// accelerated build fails outright, construction is retried once on the
/// CPU provider so a broken driver stack degrades to slow instead of broken.
#[derive(Debug, Default, Clone, Copy)]
pub struct OnnxSessionFactory;

impl SessionFactory for OnnxSessionFactory {
    fn build(&self, model_data: &[u8], config: &ScanConfig) -> Result<Box<dyn InferenceSession>> {
        match build_session(model_data, config, config.execution_provider) {
            Ok((session, provider)) => Ok(Box::new(OnnxSession { session, provider })),
            Err(err) if config.execution_provider != ExecutionProvider::Cpu => {
                log::warn!(
                    "Session construction failed with provider '{}' ({err}); retrying on CPU",
                    config.execution_provider
                );
                let (session, provider) =
                    build_session(model_data, config, ExecutionProvider::Cpu)?;
                Ok(Box::new(OnnxSession { session, provider }))
            },
            Err(err) => Err(err),
        }
    }
}

/// Create an ONNX Runtime session, returning the provider it resolved to
fn build_session(
    model_data: &[u8],
    config: &ScanConfig,
    requested: ExecutionProvider,
) -> Result<(Session, ExecutionProvider)> {
    let mut session_builder = Session::builder()
        .map_err(|e| ClosetError::model_init(format!("Failed to create session builder: {e}")))?
        .with_optimization_level(GraphOptimizationLevel::Level3)
        .map_err(|e| ClosetError::model_init(format!("Failed to set optimization level: {e}")))?;

    let mut resolved = ExecutionProvider::Cpu;

    // Configure execution providers with availability checking
    session_builder = match requested {
        ExecutionProvider::Auto => {
            // Auto-detect: try CUDA > CoreML > CPU
            let mut providers = Vec::new();

            let cuda_provider = CUDAExecutionProvider::default();
            if OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false) {
                log::info!("🚀 CUDA execution provider is available and will be used");
                resolved = ExecutionProvider::Cuda;
                providers.push(cuda_provider.build());
            } else {
                log::debug!("CUDA execution provider is not available");
            }

            let coreml_provider = CoreMLExecutionProvider::default();
            if OrtExecutionProvider::is_available(&coreml_provider).unwrap_or(false) {
                log::info!("🍎 CoreML execution provider is available and will be used");
                if resolved == ExecutionProvider::Cpu {
                    resolved = ExecutionProvider::CoreMl;
                }
                // Subgraph support improves CoreML throughput on segmentation graphs
                providers.push(CoreMLExecutionProvider::default().with_subgraphs(true).build());
            } else {
                log::debug!("CoreML execution provider is not available");
            }

            if providers.is_empty() {
                log::info!("No hardware acceleration available, using CPU");
                session_builder
            } else {
                session_builder.with_execution_providers(providers).map_err(|e| {
                    ClosetError::model_init(format!("Failed to set auto execution providers: {e}"))
                })?
            }
        },
        ExecutionProvider::Cpu => {
            log::info!("Using CPU execution provider");
            session_builder
        },
        ExecutionProvider::Cuda => {
            let cuda_provider = CUDAExecutionProvider::default();
            if OrtExecutionProvider::is_available(&cuda_provider).unwrap_or(false) {
                log::info!("Using CUDA execution provider");
                resolved = ExecutionProvider::Cuda;
                session_builder
                    .with_execution_providers([cuda_provider.build()])
                    .map_err(|e| {
                        ClosetError::model_init(format!(
                            "Failed to set CUDA execution provider: {e}"
                        ))
                    })?
            } else {
                log::warn!(
                    "CUDA execution provider requested but not available, falling back to CPU"
                );
                session_builder
            }
        },
        ExecutionProvider::CoreMl => {
            let coreml_provider = CoreMLExecutionProvider::default();
            if OrtExecutionProvider::is_available(&coreml_provider).unwrap_or(false) {
                log::info!("🍎 Using CoreML execution provider");
                resolved = ExecutionProvider::CoreMl;
                session_builder
                    .with_execution_providers([CoreMLExecutionProvider::default()
                        .with_subgraphs(true)
                        .build()])
                    .map_err(|e| {
                        ClosetError::model_init(format!(
                            "Failed to set CoreML execution provider: {e}"
                        ))
                    })?
            } else {
                log::warn!(
                    "CoreML execution provider requested but not available, falling back to CPU"
                );
                session_builder
            }
        },
    };

    // Calculate optimal threading if auto-detect (0)
    let intra_threads = if config.intra_threads > 0 {
        config.intra_threads
    } else {
        std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(8)
    };

    let inter_threads = if config.inter_threads > 0 {
        config.inter_threads
    } else {
        (std::thread::available_parallelism()
            .map(std::num::NonZero::get)
            .unwrap_or(8)
            / 4)
        .max(1)
    };

    let session = session_builder
        .with_parallel_execution(true)
        .map_err(|e| ClosetError::model_init(format!("Failed to enable parallel execution: {e}")))?
        .with_intra_threads(intra_threads)
        .map_err(|e| ClosetError::model_init(format!("Failed to set intra threads: {e}")))?
        .with_inter_threads(inter_threads)
        .map_err(|e| ClosetError::model_init(format!("Failed to set inter threads: {e}")))?
        .commit_from_memory(model_data)
        .map_err(|e| {
            ClosetError::model_init(format!("Failed to create session from model data: {e}"))
        })?;

    log::debug!("✅ ONNX Runtime session created successfully");
    log::debug!("  - Requested provider: {requested}, resolved: {resolved}");
    log::debug!("  - Threading: {intra_threads} intra-op threads, {inter_threads} inter-op threads");
    log::debug!("  - Optimization level: Level3");

    Ok((session, resolved))
}

/// A committed ONNX Runtime session serving matting requests
struct OnnxSession {
    session: Session,
    provider: ExecutionProvider,
}

impl InferenceSession for OnnxSession {
    fn run(&mut self, input: Array4<f32>) -> Result<Array4<f32>> {
        use std::time::Instant;

        let inference_start = Instant::now();
        log::debug!("🚀 Starting inference with input shape: {:?}", input.dim());

        let input_value = Value::from_array(input).map_err(|e| {
            ClosetError::inference(format!("Failed to convert input tensor: {e}"))
        })?;

        // Positional inputs eliminate tensor name dependencies across model revisions
        let outputs = self.session.run(ort::inputs![input_value]).map_err(|e| {
            ClosetError::inference_error_with_provider(
                &self.provider.to_string(),
                "run segmentation model",
                &e.to_string(),
                &["retry with the cpu execution provider"],
            )
        })?;

        // Extract output tensor using positional access (first output)
        let output_tensor = {
            let keys: Vec<_> = outputs.keys().collect();
            if let Some(first_key) = keys.first() {
                outputs
                    .get(first_key)
                    .ok_or_else(|| ClosetError::inference("First output tensor not found"))?
                    .try_extract_array::<f32>()
                    .map_err(|e| {
                        ClosetError::inference(format!("Failed to extract output tensor: {e}"))
                    })?
            } else {
                return Err(ClosetError::inference("No output tensors found"));
            }
        };

        let output_shape = output_tensor.shape();
        let output_data = output_tensor.view().to_owned();

        let result = if output_shape.len() == 4 {
            Array4::from_shape_vec(
                (
                    output_shape.first().copied().unwrap_or(1),
                    output_shape.get(1).copied().unwrap_or(1),
                    output_shape.get(2).copied().unwrap_or(1),
                    output_shape.get(3).copied().unwrap_or(1),
                ),
                output_data.into_raw_vec_and_offset().0,
            )
            .map_err(|e| ClosetError::inference(format!("Failed to reshape output tensor: {e}")))
        } else {
            Err(ClosetError::inference(format!(
                "Expected 4D output tensor, got {}D",
                output_shape.len()
            )))
        };

        log::debug!(
            "📊 Inference complete: {:.2}ms total",
            inference_start.elapsed().as_secs_f64() * 1000.0
        );

        result
    }
}

/// Fast segmentation engine backed by ONNX Runtime
///
/// Stateless apart from the shared [`ModelManager`]; several segmenters may
/// share one manager and its queued session.
pub struct OnnxSegmenter {
    manager: Arc<ModelManager>,
}

impl OnnxSegmenter {
    /// Create a segmenter on top of an existing manager
    #[must_use]
    pub fn new(manager: Arc<ModelManager>) -> Self {
        Self { manager }
    }

    /// The manager serving this segmenter
    #[must_use]
    pub fn manager(&self) -> &Arc<ModelManager> {
        &self.manager
    }
}

#[async_trait]
impl Segmenter for OnnxSegmenter {
    async fn segment(&self, image: &DynamicImage) -> Result<RgbaImage> {
        let input_image = image.clone();
        let tensor = tokio::task::spawn_blocking(move || {
            preprocessing::image_to_tensor(&input_image, &INPUT_PROFILE)
        })
        .await
        .map_err(|e| ClosetError::segmentation(format!("Preprocessing task failed: {e}")))?;

        let mask = self.manager.infer(tensor).await?;

        let composite_image = image.clone();
        tokio::task::spawn_blocking(move || preprocessing::mask_to_alpha(&composite_image, &mask))
            .await
            .map_err(|e| ClosetError::segmentation(format!("Compositing task failed: {e}")))?
    }
}
