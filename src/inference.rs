//! Segmentation engine abstraction and selection

use crate::config::{EngineKind, ScanConfig};
use crate::error::Result;
use async_trait::async_trait;
use image::{DynamicImage, RgbaImage};

/// A segmentation engine: garment photo in, background-free RGBA out
///
/// Both engines satisfy this contract and are interchangeable at the call
/// site; selection happens through [`ScanConfig::engine`]. Implementations
/// must tolerate concurrent calls.
#[async_trait]
pub trait Segmenter: Send + Sync {
    /// Isolate the garment in `image`, returning it with background pixels
    /// made transparent
    ///
    /// # Errors
    /// - Model acquisition or session construction failures
    /// - Inference failures
    /// - Zero-sized or malformed model output
    async fn segment(&self, image: &DynamicImage) -> Result<RgbaImage>;
}

/// Build the segmentation engine selected by `config.engine`
///
/// The fast engine lazily acquires weights and builds its session on first
/// use, so this returns quickly even before any model is cached.
///
/// # Errors
/// - Selected engine's feature is not compiled in
/// - Model cache or HTTP client construction fails
pub fn create_segmenter(config: &ScanConfig) -> Result<Box<dyn Segmenter>> {
    let fetcher = crate::download::ModelFetcher::new()?;
    create_segmenter_with_fetcher(config, fetcher)
}

/// Build the selected engine with an explicit [`ModelFetcher`]
///
/// Lets callers point the engine at a non-default model cache.
///
/// # Errors
/// - Selected engine's feature is not compiled in
pub fn create_segmenter_with_fetcher(
    config: &ScanConfig,
    fetcher: crate::download::ModelFetcher,
) -> Result<Box<dyn Segmenter>> {
    match config.engine {
        EngineKind::Fast => {
            #[cfg(feature = "onnx")]
            {
                let manager = std::sync::Arc::new(crate::session::ModelManager::with_factory(
                    config.clone(),
                    fetcher,
                    std::sync::Arc::new(crate::backends::OnnxSessionFactory),
                ));
                Ok(Box::new(crate::backends::OnnxSegmenter::new(manager)))
            }
            #[cfg(not(feature = "onnx"))]
            {
                let _ = fetcher;
                Err(crate::error::ClosetError::invalid_config(
                    "Fast engine requires the 'onnx' feature",
                ))
            }
        },
        EngineKind::Quality => {
            #[cfg(feature = "tract")]
            {
                Ok(Box::new(crate::backends::TractSegmenter::with_fetcher(
                    config.clone(),
                    fetcher,
                )))
            }
            #[cfg(not(feature = "tract"))]
            {
                let _ = fetcher;
                Err(crate::error::ClosetError::invalid_config(
                    "Quality engine requires the 'tract' feature",
                ))
            }
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[cfg(feature = "onnx")]
    #[test]
    fn test_create_fast_segmenter() {
        let dir = tempfile::tempdir().unwrap();
        let cache = crate::cache::ModelCache::with_custom_cache_dir(dir.path()).unwrap();
        let fetcher = crate::download::ModelFetcher::with_cache(cache).unwrap();

        let config = ScanConfig::default();
        assert!(create_segmenter_with_fetcher(&config, fetcher).is_ok());
    }

    #[cfg(feature = "tract")]
    #[test]
    fn test_create_quality_segmenter() {
        let dir = tempfile::tempdir().unwrap();
        let cache = crate::cache::ModelCache::with_custom_cache_dir(dir.path()).unwrap();
        let fetcher = crate::download::ModelFetcher::with_cache(cache).unwrap();

        let config = ScanConfig::builder()
            .engine(EngineKind::Quality)
            .build()
            .unwrap();
        assert!(create_segmenter_with_fetcher(&config, fetcher).is_ok());
    }
}
