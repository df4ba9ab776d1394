#![allow(clippy::too_many_lines)]
#![allow(clippy::missing_errors_doc)]
#![allow(clippy::missing_panics_doc)]
#![allow(clippy::uninlined_format_args)]
#![allow(clippy::unused_async)]

//! # closetkit
//!
//! An on-device garment scanning and wardrobe engine: photograph a piece of
//! clothing, isolate it from the background with a segmentation model,
//! extract its representative color, and keep the result in a local wardrobe
//! store that can suggest color-compatible outfits.
//!
//! Everything runs locally. Model weights are fetched once and cached; no
//! image ever leaves the machine.
//!
//! ## Features
//!
//! - **Two engines**: ONNX Runtime (`fast`, hardware acceleration via CUDA
//!   or `CoreML`) and Tract (`quality`, pure Rust)
//! - **Garment isolation**: ISNet-style matting with soft alpha edges
//! - **Color intelligence**: dominant-hue swatch extraction and a
//!   hue-distance compatibility rule for outfit suggestions
//! - **Local wardrobe**: embedded `sled` store for garments and outfits,
//!   newest-first reads, additive schema migration
//! - **Model management**: automatic downloading and caching of weights
//!   from `HuggingFace`, with FP16/FP32 variants
//! - **CLI integration**: optional command-line interface (enable with the
//!   `cli` feature)
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use closetkit::{Category, GarmentProcessor, ScanConfig, WardrobeStore};
//!
//! # async fn example() -> anyhow::Result<()> {
//! // Scan a photo: decode, isolate the garment, extract the swatch color
//! let processor = GarmentProcessor::new(ScanConfig::default())?;
//! let photo = tokio::fs::read("shirt.jpg").await?;
//! let scan = processor.scan_bytes(&photo).await?;
//! println!("swatch color: {}", scan.color);
//!
//! // Keep it in the wardrobe
//! let store = WardrobeStore::open_default()?;
//! let record = scan.into_garment_record(Category::Top)?;
//! store.put_garment(&record).await?;
//! # Ok(())
//! # }
//! ```
//!
//! ## Library vs CLI Usage
//!
//! This crate works both as a library and as a CLI application:
//!
//! - **Library usage**: scanning, color rules, persistence and model
//!   management are available by default
//! - **CLI usage**: enable the `cli` feature for the `closetkit` binary and
//!   progress reporting
//!
//! ### Feature Flags
//!
//! - `onnx` (default): ONNX Runtime engine with hardware acceleration
//! - `tract` (default): pure Rust engine
//! - `cli` (default): command-line interface
//!
//! ### Library-Only Usage
//!
//! ```toml
//! [dependencies]
//! closetkit = { version = "0.1", default-features = false, features = ["onnx", "tract"] }
//! ```
//!
//! ## Engine Selection
//!
//! ```rust,no_run
//! use closetkit::{EngineKind, GarmentProcessor, ScanConfig};
//!
//! # fn example() -> anyhow::Result<()> {
//! // The quality engine trades latency for a pure-Rust, full-precision path
//! let config = ScanConfig::builder().engine(EngineKind::Quality).build()?;
//! let processor = GarmentProcessor::new(config)?;
//! # let _ = processor;
//! # Ok(())
//! # }
//! ```

pub mod backends;
pub mod cache;
#[cfg(feature = "cli")]
pub mod cli;
pub mod color;
pub mod config;
pub mod download;
pub mod error;
pub mod inference;
pub mod models;
pub mod preprocessing;
pub mod processor;
pub mod progress;
pub mod records;
pub mod session;
pub mod store;

// Internal imports for lib functions
use tokio::io::AsyncRead;

// Public API exports
pub use backends::*;
pub use cache::{format_size, CachedModelInfo, ModelCache};
pub use color::{analyze, is_compatible, NEUTRAL_FALLBACK_HEX};
pub use config::{EngineKind, ExecutionProvider, ScanConfig, ScanConfigBuilder};
pub use download::{validate_model_url, ModelFetcher};
pub use error::{ClosetError, Result};
pub use inference::{create_segmenter, create_segmenter_with_fetcher, Segmenter};
pub use models::{ModelSource, ModelSpec, ModelVariant, DEFAULT_MODEL_URL};
pub use processor::{GarmentProcessor, ScanResult, ScanTimings};
pub use progress::{NoOpProgress, ProgressSink};
pub use records::{BodySlot, Category, GarmentRecord, OutfitBuilder, OutfitRecord};
pub use session::{InferenceSession, ModelManager, SessionFactory};
pub use store::{default_data_dir, WardrobeStore};

/// Scan a garment photo provided as encoded bytes
///
/// One-shot convenience over [`GarmentProcessor`]: suitable when a single
/// image is scanned per configuration. Callers scanning many images should
/// build one processor and reuse it so the model session is shared.
///
/// # Examples
///
/// ```rust,no_run
/// use closetkit::{scan_garment_from_bytes, ScanConfig};
///
/// # async fn example(upload: Vec<u8>) -> anyhow::Result<()> {
/// let scan = scan_garment_from_bytes(&upload, &ScanConfig::default()).await?;
/// tokio::fs::write("cutout.png", scan.to_png_bytes()?).await?;
/// # Ok(())
/// # }
/// ```
pub async fn scan_garment_from_bytes(
    image_bytes: &[u8],
    config: &ScanConfig,
) -> Result<ScanResult> {
    let processor = GarmentProcessor::new(config.clone())?;
    processor.scan_bytes(image_bytes).await
}

/// Scan an already-decoded garment photo
///
/// # Examples
///
/// ```rust,no_run
/// use closetkit::{scan_garment_from_image, ScanConfig};
/// use image::DynamicImage;
///
/// # async fn example(photo: DynamicImage) -> anyhow::Result<()> {
/// let scan = scan_garment_from_image(photo, &ScanConfig::default()).await?;
/// println!("{} ({} ms)", scan.color, scan.timings.total_ms);
/// # Ok(())
/// # }
/// ```
pub async fn scan_garment_from_image(
    image: image::DynamicImage,
    config: &ScanConfig,
) -> Result<ScanResult> {
    let processor = GarmentProcessor::new(config.clone())?;
    processor.scan_image(image).await
}

/// Scan a garment photo from an async reader stream
///
/// # Examples
///
/// ```rust,no_run
/// use closetkit::{scan_garment_from_reader, ScanConfig};
/// use tokio::fs::File;
///
/// # async fn example() -> anyhow::Result<()> {
/// let file = File::open("jacket.jpg").await?;
/// let scan = scan_garment_from_reader(file, &ScanConfig::default()).await?;
/// println!("degraded: {}", scan.degraded);
/// # Ok(())
/// # }
/// ```
pub async fn scan_garment_from_reader<R: AsyncRead + Unpin>(
    mut reader: R,
    config: &ScanConfig,
) -> Result<ScanResult> {
    let mut buffer = Vec::new();
    tokio::io::AsyncReadExt::read_to_end(&mut reader, &mut buffer)
        .await
        .map_err(|e| ClosetError::decode(format!("Failed to read from stream: {}", e)))?;

    scan_garment_from_bytes(&buffer, config).await
}
