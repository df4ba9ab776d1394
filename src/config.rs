//! Configuration types for garment scanning operations

use crate::models::ModelSpec;
use crate::records::Category;
use serde::{Deserialize, Serialize};

/// Execution provider options for ONNX Runtime
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ExecutionProvider {
    /// Auto-detect best available provider (CUDA > `CoreML` > CPU)
    Auto,
    /// CPU execution (always available)
    Cpu,
    /// NVIDIA CUDA GPU acceleration
    Cuda,
    /// Apple Silicon GPU acceleration
    CoreMl,
}

impl Default for ExecutionProvider {
    fn default() -> Self {
        Self::Auto
    }
}

impl std::fmt::Display for ExecutionProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Auto => write!(f, "auto"),
            Self::Cpu => write!(f, "cpu"),
            Self::Cuda => write!(f, "cuda"),
            Self::CoreMl => write!(f, "coreml"),
        }
    }
}

/// Which segmentation engine a scan runs on
///
/// `Fast` is the ONNX Runtime session with hardware acceleration where
/// available; `Quality` is the pure-Rust Tract engine with a higher-latency,
/// full-precision profile. Both satisfy the same [`crate::Segmenter`]
/// contract and are interchangeable at the call site.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum EngineKind {
    /// Hardware-accelerated ONNX Runtime engine
    Fast,
    /// Pure-Rust Tract engine
    Quality,
}

impl EngineKind {
    /// Weight precision used when [`ModelSpec::variant`] does not pin one
    #[must_use]
    pub const fn default_variant(self) -> crate::models::ModelVariant {
        match self {
            Self::Fast => crate::models::ModelVariant::Fp16,
            Self::Quality => crate::models::ModelVariant::Fp32,
        }
    }
}

impl Default for EngineKind {
    fn default() -> Self {
        Self::Fast
    }
}

impl std::fmt::Display for EngineKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fast => write!(f, "fast"),
            Self::Quality => write!(f, "quality"),
        }
    }
}

impl std::str::FromStr for EngineKind {
    type Err = crate::error::ClosetError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "fast" => Ok(Self::Fast),
            "quality" => Ok(Self::Quality),
            other => Err(crate::error::ClosetError::invalid_config(format!(
                "Unknown engine '{other}' (expected 'fast' or 'quality')"
            ))),
        }
    }
}

/// Configuration for garment scanning operations
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScanConfig {
    /// Which segmentation engine to run
    pub engine: EngineKind,

    /// Execution provider for the ONNX Runtime engine
    pub execution_provider: ExecutionProvider,

    /// Model specification including source and variant
    pub model_spec: ModelSpec,

    /// Long-side cap applied to the input before segmentation
    pub max_dimension: u32,

    /// Category assigned to scan results until the caller overrides it
    pub default_category: Category,

    /// Number of intra-op threads for inference (0 = auto)
    pub intra_threads: usize,

    /// Number of inter-op threads for inference (0 = auto)
    pub inter_threads: usize,
}

impl Default for ScanConfig {
    fn default() -> Self {
        Self {
            engine: EngineKind::default(),
            execution_provider: ExecutionProvider::default(),
            model_spec: ModelSpec::default(),
            max_dimension: 1024,
            default_category: Category::Other,
            intra_threads: 0,
            inter_threads: 0,
        }
    }
}

impl ScanConfig {
    /// Create a new configuration builder for fluent construction
    ///
    /// # Examples
    ///
    /// ```rust
    /// use closetkit::{ScanConfig, EngineKind};
    ///
    /// let config = ScanConfig::builder()
    ///     .engine(EngineKind::Quality)
    ///     .max_dimension(2048)
    ///     .build()
    ///     .unwrap();
    /// ```
    #[must_use]
    pub fn builder() -> ScanConfigBuilder {
        ScanConfigBuilder::default()
    }

    /// Validate all configuration parameters
    ///
    /// # Errors
    /// - `max_dimension` outside 1-16384
    pub fn validate(&self) -> crate::Result<()> {
        if self.max_dimension == 0 || self.max_dimension > 16_384 {
            return Err(crate::error::ClosetError::config_value_error(
                "max_dimension",
                self.max_dimension,
                "1-16384",
                Some(1024),
            ));
        }

        Ok(())
    }
}

/// Builder for [`ScanConfig`]
#[derive(Debug, Default)]
pub struct ScanConfigBuilder {
    config: ScanConfig,
}

impl ScanConfigBuilder {
    /// Set the segmentation engine
    #[must_use]
    pub fn engine(mut self, engine: EngineKind) -> Self {
        self.config.engine = engine;
        self
    }

    /// Set execution provider
    #[must_use]
    pub fn execution_provider(mut self, provider: ExecutionProvider) -> Self {
        self.config.execution_provider = provider;
        self
    }

    /// Set the model specification
    #[must_use]
    pub fn model_spec(mut self, model_spec: ModelSpec) -> Self {
        self.config.model_spec = model_spec;
        self
    }

    /// Set the pre-segmentation long-side cap
    #[must_use]
    pub fn max_dimension(mut self, max_dimension: u32) -> Self {
        self.config.max_dimension = max_dimension;
        self
    }

    /// Set the category assigned to results until the caller overrides it
    #[must_use]
    pub fn default_category(mut self, category: Category) -> Self {
        self.config.default_category = category;
        self
    }

    /// Set number of intra-op threads
    #[must_use]
    pub fn intra_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self
    }

    /// Set number of inter-op threads
    #[must_use]
    pub fn inter_threads(mut self, threads: usize) -> Self {
        self.config.inter_threads = threads;
        self
    }

    /// Set both thread pools from one total (inter = total/2, minimum 1)
    #[must_use]
    pub fn num_threads(mut self, threads: usize) -> Self {
        self.config.intra_threads = threads;
        self.config.inter_threads = if threads > 0 { (threads / 2).max(1) } else { 0 };
        self
    }

    /// Build and validate the configuration
    ///
    /// # Errors
    /// Returns `ClosetError::InvalidConfig` when a parameter is out of range.
    pub fn build(self) -> crate::Result<ScanConfig> {
        let config = self.config;
        config.validate()?;
        Ok(config)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = ScanConfig::default();
        assert_eq!(config.engine, EngineKind::Fast);
        assert_eq!(config.execution_provider, ExecutionProvider::Auto);
        assert_eq!(config.max_dimension, 1024);
        assert_eq!(config.default_category, Category::Other);
    }

    #[test]
    fn test_config_builder_chaining() {
        let config = ScanConfig::builder()
            .engine(EngineKind::Quality)
            .execution_provider(ExecutionProvider::Cpu)
            .max_dimension(2048)
            .default_category(Category::Top)
            .num_threads(8)
            .build()
            .unwrap();

        assert_eq!(config.engine, EngineKind::Quality);
        assert_eq!(config.execution_provider, ExecutionProvider::Cpu);
        assert_eq!(config.max_dimension, 2048);
        assert_eq!(config.default_category, Category::Top);
        assert_eq!(config.intra_threads, 8);
        assert_eq!(config.inter_threads, 4);
    }

    #[test]
    fn test_config_validation() {
        let mut config = ScanConfig::default();
        assert!(config.validate().is_ok());

        config.max_dimension = 0;
        assert!(config.validate().is_err());

        config.max_dimension = 20_000;
        let result = config.validate();
        assert!(result.is_err());
        assert!(result.unwrap_err().to_string().contains("max_dimension"));
    }

    #[test]
    fn test_num_threads_ratios() {
        let config = ScanConfig::builder().num_threads(7).build().unwrap();
        assert_eq!(config.intra_threads, 7);
        assert_eq!(config.inter_threads, 3);

        let config = ScanConfig::builder().num_threads(1).build().unwrap();
        assert_eq!(config.inter_threads, 1);

        let config = ScanConfig::builder().num_threads(0).build().unwrap();
        assert_eq!(config.intra_threads, 0);
        assert_eq!(config.inter_threads, 0);
    }

    #[test]
    fn test_engine_kind_parsing() {
        assert_eq!("fast".parse::<EngineKind>().unwrap(), EngineKind::Fast);
        assert_eq!("QUALITY".parse::<EngineKind>().unwrap(), EngineKind::Quality);
        assert!("balanced".parse::<EngineKind>().is_err());

        assert_eq!(format!("{}", EngineKind::Fast), "fast");
        assert_eq!(format!("{}", EngineKind::Quality), "quality");
    }

    #[test]
    fn test_execution_provider_display() {
        assert_eq!(format!("{}", ExecutionProvider::Auto), "auto");
        assert_eq!(format!("{}", ExecutionProvider::Cpu), "cpu");
        assert_eq!(format!("{}", ExecutionProvider::Cuda), "cuda");
        assert_eq!(format!("{}", ExecutionProvider::CoreMl), "coreml");
    }

    #[test]
    fn test_config_serde_round_trip() {
        let config = ScanConfig::builder()
            .engine(EngineKind::Quality)
            .max_dimension(512)
            .build()
            .unwrap();

        let json = serde_json::to_string(&config).unwrap();
        let deserialized: ScanConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(config, deserialized);
    }
}
