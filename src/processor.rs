//! Garment scan orchestrator
//!
//! `GarmentProcessor` drives the full pipeline: decode, cap to the working
//! size, isolate the garment on the selected engine, extract the swatch
//! color, and package the result for display or persistence. Both the CLI
//! and library callers go through this type so behavior stays consistent.

use crate::{
    color,
    config::ScanConfig,
    error::{ClosetError, Result},
    inference::{create_segmenter, Segmenter},
    preprocessing,
    records::{Category, GarmentRecord},
};
use image::{DynamicImage, RgbaImage};
use instant::Instant;
use tracing::{debug as trace_debug, info as trace_info, instrument, span, Instrument, Level};

/// Per-stage wall-clock timings for one scan, in milliseconds
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanTimings {
    /// Image decode (zero when the caller supplied a decoded image)
    pub decode_ms: u64,
    /// Garment isolation on the selected engine
    pub segmentation_ms: u64,
    /// Palette extraction
    pub color_ms: u64,
    /// End to end, including stages not broken out above
    pub total_ms: u64,
}

/// Outcome of one garment scan
pub struct ScanResult {
    /// Cutout with background pixels transparent (or the capped original
    /// at full alpha when the scan degraded)
    pub image: RgbaImage,
    /// Representative swatch color as `#RRGGBB`
    pub color: String,
    /// Category the processor was configured to assign by default
    pub category: Category,
    /// Whether segmentation failed and the original photo was kept
    pub degraded: bool,
    /// Per-stage timings
    pub timings: ScanTimings,
}

impl ScanResult {
    /// Encode the scan image as PNG
    ///
    /// # Errors
    /// - PNG encoding failures
    pub fn to_png_bytes(&self) -> Result<Vec<u8>> {
        let mut buffer = std::io::Cursor::new(Vec::new());
        self.image.write_to(&mut buffer, image::ImageFormat::Png)?;
        Ok(buffer.into_inner())
    }

    /// Turn the scan into a storable record under the given category
    ///
    /// # Errors
    /// - PNG encoding failures
    pub fn into_garment_record(self, category: Category) -> Result<GarmentRecord> {
        let png = self.to_png_bytes()?;
        Ok(GarmentRecord::new(png, category, self.color))
    }
}

impl std::fmt::Debug for ScanResult {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanResult")
            .field("dimensions", &(self.image.width(), self.image.height()))
            .field("color", &self.color)
            .field("category", &self.category)
            .field("degraded", &self.degraded)
            .field("timings", &self.timings)
            .finish()
    }
}

/// Top-level scan pipeline over a selected segmentation engine
pub struct GarmentProcessor {
    config: ScanConfig,
    engine: Box<dyn Segmenter>,
}

impl GarmentProcessor {
    /// Build a processor with the engine selected by `config`
    ///
    /// # Errors
    /// - Selected engine's feature is not compiled in
    /// - Engine construction failures
    pub fn new(config: ScanConfig) -> Result<Self> {
        let engine = create_segmenter(&config)?;
        Ok(Self { config, engine })
    }

    /// Build a processor over a caller-supplied engine
    #[must_use]
    pub fn with_engine(config: ScanConfig, engine: Box<dyn Segmenter>) -> Self {
        Self { config, engine }
    }

    /// The configuration this processor runs with
    #[must_use]
    pub fn config(&self) -> &ScanConfig {
        &self.config
    }

    /// Scan a garment photo from encoded bytes (JPEG, PNG, WebP, ...)
    ///
    /// # Errors
    /// - `ClosetError::Decode` when the bytes are not a readable image;
    ///   unlike later stages this is fatal, there is no photo to keep
    pub async fn scan_bytes(&self, bytes: &[u8]) -> Result<ScanResult> {
        let total_start = Instant::now();

        let decode_start = Instant::now();
        let owned = bytes.to_vec();
        let image = tokio::task::spawn_blocking(move || preprocessing::decode_image(&owned))
            .await
            .map_err(|e| ClosetError::decode(format!("Decode task failed: {e}")))??;
        let decode_ms = elapsed_ms(decode_start);

        let mut result = self.scan_image(image).await?;
        result.timings.decode_ms = decode_ms;
        result.timings.total_ms = elapsed_ms(total_start);
        Ok(result)
    }

    /// Scan an already-decoded garment photo
    ///
    /// Inputs larger than the configured working size are capped first;
    /// if segmentation fails the capped original is returned at full alpha
    /// with the neutral sentinel color instead of failing the scan.
    ///
    /// # Errors
    /// - Internal task failures (a worker panicked or was torn down)
    #[instrument(
        skip(self, image),
        fields(
            engine = %self.config.engine,
            dimensions = %format!("{}x{}", image.width(), image.height())
        )
    )]
    pub async fn scan_image(&self, image: DynamicImage) -> Result<ScanResult> {
        let total_start = Instant::now();
        let mut timings = ScanTimings::default();

        trace_info!(engine = %self.config.engine, "Starting garment scan");

        let max_dimension = self.config.max_dimension;
        let capped =
            tokio::task::spawn_blocking(move || preprocessing::resize_to_fit(&image, max_dimension))
                .await
                .map_err(|e| ClosetError::segmentation(format!("Resize task failed: {e}")))?;
        trace_debug!(
            capped = %format!("{}x{}", capped.width(), capped.height()),
            "Working image ready"
        );

        let segmentation_start = Instant::now();
        let segmented = self
            .engine
            .segment(&capped)
            .instrument(span!(Level::INFO, "segmentation", engine = %self.config.engine))
            .await;
        timings.segmentation_ms = elapsed_ms(segmentation_start);

        let (final_image, swatch, degraded) = match segmented {
            Ok(cutout) => {
                let color_start = Instant::now();
                let (cutout, swatch) = tokio::task::spawn_blocking(move || {
                    let swatch = color::analyze(&cutout);
                    (cutout, swatch)
                })
                .instrument(span!(Level::DEBUG, "color_analysis"))
                .await
                .map_err(|e| {
                    ClosetError::segmentation(format!("Color analysis task failed: {e}"))
                })?;
                timings.color_ms = elapsed_ms(color_start);
                (cutout, swatch, false)
            },
            // Losing background removal is better than losing the photo,
            // so keep the capped original opaque and mark it degraded. The
            // sentinel color stands in because palette stats over an
            // unsegmented photo would mostly measure the background.
            Err(err) => {
                log::warn!("Segmentation failed, keeping original photo: {err}");
                (
                    opaque_fallback(&capped),
                    color::NEUTRAL_FALLBACK_HEX.to_string(),
                    true,
                )
            },
        };

        timings.total_ms = elapsed_ms(total_start);
        trace_info!(
            color = %swatch,
            degraded = degraded,
            total_ms = timings.total_ms,
            "Garment scan complete"
        );

        Ok(ScanResult {
            image: final_image,
            color: swatch,
            category: self.config.default_category,
            degraded,
            timings,
        })
    }
}

/// Promote the original to RGBA with every pixel fully opaque
fn opaque_fallback(image: &DynamicImage) -> RgbaImage {
    let mut rgba = image.to_rgba8();
    for pixel in rgba.pixels_mut() {
        pixel[3] = 255;
    }
    rgba
}

fn elapsed_ms(start: Instant) -> u64 {
    u64::try_from(start.elapsed().as_millis()).unwrap_or(u64::MAX)
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use image::Rgba;

    /// Engine stub: passes the image through or fails on demand
    struct FixedSegmenter {
        fail: bool,
    }

    #[async_trait]
    impl Segmenter for FixedSegmenter {
        async fn segment(&self, image: &DynamicImage) -> Result<RgbaImage> {
            if self.fail {
                Err(ClosetError::inference("synthetic failure"))
            } else {
                Ok(image.to_rgba8())
            }
        }
    }

    fn processor(fail: bool) -> GarmentProcessor {
        GarmentProcessor::with_engine(
            ScanConfig::default(),
            Box::new(FixedSegmenter { fail }),
        )
    }

    fn solid_png(width: u32, height: u32, rgb: [u8; 3]) -> Vec<u8> {
        let image = image::RgbaImage::from_pixel(width, height, Rgba([rgb[0], rgb[1], rgb[2], 255]));
        let mut buffer = std::io::Cursor::new(Vec::new());
        image
            .write_to(&mut buffer, image::ImageFormat::Png)
            .unwrap();
        buffer.into_inner()
    }

    #[tokio::test]
    async fn test_scan_solid_color_extracts_matching_hue() {
        let result = processor(false)
            .scan_bytes(&solid_png(64, 64, [0, 0, 255]))
            .await
            .unwrap();

        assert!(!result.degraded);
        assert_ne!(result.color, color::NEUTRAL_FALLBACK_HEX);
        // The swatch is a normalized rendering of the dominant hue, so it
        // must sit in the same compatibility window as the source blue
        assert!(color::is_compatible(&result.color, "#0000FF"));
    }

    #[tokio::test]
    async fn test_segmentation_failure_degrades_instead_of_erroring() {
        let result = processor(true)
            .scan_bytes(&solid_png(32, 24, [200, 30, 30]))
            .await
            .unwrap();

        assert!(result.degraded);
        assert_eq!(result.color, color::NEUTRAL_FALLBACK_HEX);
        assert_eq!((result.image.width(), result.image.height()), (32, 24));
        assert!(result.image.pixels().all(|p| p[3] == 255));
    }

    #[tokio::test]
    async fn test_undecodable_bytes_are_fatal() {
        let result = processor(true).scan_bytes(b"not an image at all").await;
        assert!(matches!(result, Err(ClosetError::Decode(_))));
    }

    #[tokio::test]
    async fn test_oversized_input_is_capped() {
        let result = processor(false)
            .scan_bytes(&solid_png(2048, 1024, [10, 200, 80]))
            .await
            .unwrap();

        assert_eq!((result.image.width(), result.image.height()), (1024, 512));
    }

    #[tokio::test]
    async fn test_timings_are_recorded() {
        let result = processor(false)
            .scan_bytes(&solid_png(16, 16, [255, 255, 255]))
            .await
            .unwrap();

        assert!(result.timings.total_ms >= result.timings.segmentation_ms);
    }

    #[tokio::test]
    async fn test_into_garment_record_round_trips_png() {
        let result = processor(false)
            .scan_bytes(&solid_png(20, 20, [0, 128, 0]))
            .await
            .unwrap();
        let color = result.color.clone();

        let record = result.into_garment_record(Category::Top).unwrap();
        assert_eq!(record.category, Category::Top);
        assert_eq!(record.color, color);

        let decoded = image::load_from_memory(&record.image_bytes).unwrap();
        assert_eq!((decoded.width(), decoded.height()), (20, 20));
    }
}
