//! Scan pipeline integration testing
//!
//! Runs the garment processor end to end with deterministic engines: decode,
//! size capping, segmentation, color extraction, degraded fallback, and the
//! hand-off into the wardrobe store.

use async_trait::async_trait;
use closetkit::{
    Category, ClosetError, GarmentProcessor, ScanConfig, Segmenter, WardrobeStore,
    NEUTRAL_FALLBACK_HEX,
};
use image::{DynamicImage, Rgba, RgbaImage};
use std::io::Cursor;
use tempfile::TempDir;

/// Marks near-white pixels as background, everything else as garment
struct WhiteBackgroundSegmenter;

#[async_trait]
impl Segmenter for WhiteBackgroundSegmenter {
    async fn segment(&self, image: &DynamicImage) -> closetkit::Result<RgbaImage> {
        let mut rgba = image.to_rgba8();
        for pixel in rgba.pixels_mut() {
            let background = pixel[0] > 240 && pixel[1] > 240 && pixel[2] > 240;
            pixel[3] = if background { 0 } else { 255 };
        }
        Ok(rgba)
    }
}

struct FailingSegmenter;

#[async_trait]
impl Segmenter for FailingSegmenter {
    async fn segment(&self, _image: &DynamicImage) -> closetkit::Result<RgbaImage> {
        Err(ClosetError::inference("engine exploded"))
    }
}

fn png_bytes(image: &RgbaImage) -> Vec<u8> {
    let mut bytes = Vec::new();
    DynamicImage::ImageRgba8(image.clone())
        .write_to(&mut Cursor::new(&mut bytes), image::ImageFormat::Png)
        .unwrap();
    bytes
}

/// Blue square centered on a white background
fn blue_square_on_white(width: u32, height: u32) -> RgbaImage {
    let mut image = RgbaImage::from_pixel(width, height, Rgba([255, 255, 255, 255]));
    for y in height / 4..3 * height / 4 {
        for x in width / 4..3 * width / 4 {
            image.put_pixel(x, y, Rgba([20, 40, 220, 255]));
        }
    }
    image
}

fn channel(hex: &str, range: std::ops::Range<usize>) -> u8 {
    u8::from_str_radix(&hex[range], 16).unwrap()
}

#[tokio::test]
async fn test_scan_cuts_background_and_reads_color() {
    let processor =
        GarmentProcessor::with_engine(ScanConfig::default(), Box::new(WhiteBackgroundSegmenter));

    let input = blue_square_on_white(200, 200);
    let result = processor.scan_bytes(&png_bytes(&input)).await.unwrap();

    assert!(!result.degraded);
    assert_eq!(result.image.dimensions(), (200, 200));
    assert_eq!(result.image.get_pixel(100, 100)[3], 255);

    // Every 10x10 corner block is background
    for (corner_x, corner_y) in [(0, 0), (190, 0), (0, 190), (190, 190)] {
        for dy in 0..10 {
            for dx in 0..10 {
                assert_eq!(result.image.get_pixel(corner_x + dx, corner_y + dy)[3], 0);
            }
        }
    }

    // The swatch sits in the blue family
    assert_ne!(result.color, NEUTRAL_FALLBACK_HEX);
    let r = channel(&result.color, 1..3);
    let g = channel(&result.color, 3..5);
    let b = channel(&result.color, 5..7);
    assert!(b > r && b > g, "expected a blue swatch, got {}", result.color);
}

#[tokio::test]
async fn test_failed_segmentation_degrades_to_original() {
    let processor =
        GarmentProcessor::with_engine(ScanConfig::default(), Box::new(FailingSegmenter));

    let input = blue_square_on_white(64, 48);
    let result = processor.scan_bytes(&png_bytes(&input)).await.unwrap();

    assert!(result.degraded);
    assert_eq!(result.color, NEUTRAL_FALLBACK_HEX);
    assert_eq!(result.image.dimensions(), (64, 48));
    assert!(result.image.pixels().all(|p| p[3] == 255));
}

#[tokio::test]
async fn test_oversized_photos_are_capped() {
    let processor =
        GarmentProcessor::with_engine(ScanConfig::default(), Box::new(WhiteBackgroundSegmenter));

    let input = RgbaImage::from_pixel(2048, 1024, Rgba([10, 200, 60, 255]));
    let result = processor.scan_bytes(&png_bytes(&input)).await.unwrap();

    assert_eq!(result.image.dimensions(), (1024, 512));
    assert!(result.timings.total_ms >= result.timings.segmentation_ms);
}

#[tokio::test]
async fn test_garbage_bytes_are_a_decode_error() {
    let processor =
        GarmentProcessor::with_engine(ScanConfig::default(), Box::new(WhiteBackgroundSegmenter));

    let err = processor
        .scan_bytes(b"definitely not an image")
        .await
        .unwrap_err();
    assert!(matches!(err, ClosetError::Decode(_)));
}

#[tokio::test]
async fn test_scan_to_wardrobe_round_trip() {
    let dir = TempDir::new().unwrap();
    let store = WardrobeStore::open(dir.path()).unwrap();
    let processor =
        GarmentProcessor::with_engine(ScanConfig::default(), Box::new(WhiteBackgroundSegmenter));

    let result = processor
        .scan_bytes(&png_bytes(&blue_square_on_white(120, 90)))
        .await
        .unwrap();
    let color = result.color.clone();

    let record = result.into_garment_record(Category::Top).unwrap();
    store.put_garment(&record).await.unwrap();

    let loaded = store.get_garment(record.id).await.unwrap().unwrap();
    assert_eq!(loaded.category, Category::Top);
    assert_eq!(loaded.color, color);

    // The stored bytes decode back to the same cutout, alpha included
    let decoded = image::load_from_memory(&loaded.image_bytes)
        .unwrap()
        .to_rgba8();
    assert_eq!(decoded.dimensions(), (120, 90));
    assert_eq!(decoded.get_pixel(0, 0)[3], 0);
    assert_eq!(decoded.get_pixel(60, 45)[3], 255);
}

#[tokio::test]
async fn test_rescan_refreshes_a_stored_garment_in_place() {
    let dir = TempDir::new().unwrap();
    let store = WardrobeStore::open(dir.path()).unwrap();
    let processor =
        GarmentProcessor::with_engine(ScanConfig::default(), Box::new(WhiteBackgroundSegmenter));

    let result = processor
        .scan_bytes(&png_bytes(&blue_square_on_white(100, 100)))
        .await
        .unwrap();
    let record = result.into_garment_record(Category::Top).unwrap();
    store.put_garment(&record).await.unwrap();

    // The cutout keeps the original RGB under the cleared alpha, so the
    // stored bytes support a second scan from scratch
    let mut stored = store.get_garment(record.id).await.unwrap().unwrap();
    let rescan = processor.scan_bytes(&stored.image_bytes).await.unwrap();
    assert!(!rescan.degraded);
    assert_eq!(rescan.color, stored.color);

    stored.reprocess(rescan.to_png_bytes().unwrap(), rescan.color);
    store.put_garment(&stored).await.unwrap();

    let refreshed = store.get_garment(record.id).await.unwrap().unwrap();
    assert_eq!(refreshed.id, record.id);
    assert_eq!(refreshed.created_at, record.created_at);
    assert_eq!(refreshed.category, Category::Top);
    assert_eq!(refreshed.color, record.color);
}

#[cfg(feature = "onnx")]
mod fast_engine {
    use super::*;
    use closetkit::{
        InferenceSession, ModelCache, ModelFetcher, ModelManager, ModelSource, ModelSpec,
        OnnxSegmenter, SessionFactory,
    };
    use ndarray::Array4;
    use std::sync::Arc;

    /// Emits a mask that clears the top-left quarter of each axis
    struct CornerMaskSession;

    impl InferenceSession for CornerMaskSession {
        fn run(&mut self, input: Array4<f32>) -> closetkit::Result<Array4<f32>> {
            assert_eq!(input.shape(), &[1, 3, 1024, 1024]);
            Ok(Array4::from_shape_fn((1, 1, 32, 32), |(_, _, y, x)| {
                if x < 8 && y < 8 {
                    0.0
                } else {
                    1.0
                }
            }))
        }
    }

    struct CornerMaskFactory;

    impl SessionFactory for CornerMaskFactory {
        fn build(
            &self,
            model_data: &[u8],
            _config: &ScanConfig,
        ) -> closetkit::Result<Box<dyn InferenceSession>> {
            assert_eq!(model_data, b"stub-onnx-weights");
            Ok(Box::new(CornerMaskSession))
        }
    }

    #[tokio::test]
    async fn test_fast_engine_runs_through_the_model_manager() {
        let cache_dir = TempDir::new().unwrap();
        let weights = cache_dir.path().join("weights.onnx");
        std::fs::write(&weights, b"stub-onnx-weights").unwrap();

        let config = ScanConfig::builder()
            .model_spec(ModelSpec {
                source: ModelSource::External(weights),
                variant: None,
            })
            .build()
            .unwrap();

        let cache = ModelCache::with_custom_cache_dir(cache_dir.path()).unwrap();
        let fetcher = ModelFetcher::with_cache(cache).unwrap();
        let manager = Arc::new(ModelManager::with_factory(
            config.clone(),
            fetcher,
            Arc::new(CornerMaskFactory),
        ));
        let processor = GarmentProcessor::with_engine(
            config,
            Box::new(OnnxSegmenter::new(Arc::clone(&manager))),
        );

        let input = RgbaImage::from_pixel(512, 256, Rgba([20, 40, 220, 255]));
        let result = processor.scan_bytes(&png_bytes(&input)).await.unwrap();

        assert!(!result.degraded);
        assert!(manager.is_ready().await);
        assert_eq!(result.image.dimensions(), (512, 256));
        assert_ne!(result.color, NEUTRAL_FALLBACK_HEX);

        // Mask zeros cover the top-left quarter of each axis
        assert_eq!(result.image.get_pixel(0, 0)[3], 0);
        assert_eq!(result.image.get_pixel(400, 200)[3], 255);
    }
}
