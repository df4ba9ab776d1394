//! Dominant-color extraction over the visible foreground

use super::{format_hex, hsl_of, is_neutral_hsl, rgb_of, NEUTRAL_FALLBACK_HEX};
use image::RgbaImage;

/// Pixels below this alpha are background and never sampled
const VISIBILITY_ALPHA_MIN: u8 = 128;

/// Hue range is discretized into this many equal bins
const HUE_BUCKETS: usize = 12;

/// Width of one hue bin in degrees
const BUCKET_WIDTH: f32 = 360.0 / HUE_BUCKETS as f32;

/// A dominant bucket below this share of visible samples is noise
const DOMINANT_SHARE_MIN: f32 = 0.05;

/// Swatch saturation is raised to at least this
const SWATCH_SATURATION_FLOOR: f32 = 0.4;

/// Swatch lightness is fixed here for legibility
const SWATCH_LIGHTNESS: f32 = 0.6;

/// Upper bound on sampled pixels; the stride grows with the image instead
const TARGET_SAMPLES: u64 = 65_536;

#[derive(Debug, Default, Clone, Copy)]
struct HueBucket {
    count: u64,
    sum_r: u64,
    sum_g: u64,
    sum_b: u64,
}

/// Compute one representative, UI-friendly swatch color for a cutout
///
/// Samples visible pixels (alpha ≥ 128) on a regular stride, classifies each
/// as neutral or hued, and buckets hued pixels into twelve 30° bins. The
/// most populated bin wins if it holds at least 5% of the visible samples;
/// its average color is then re-rendered at fixed lightness with a
/// saturation floor so the swatch stays legible on light and dark surfaces.
/// Transparent, fully neutral, and degenerate images all yield the neutral
/// sentinel, so the result is always a valid `#RRGGBB` string.
#[must_use]
pub fn analyze(image: &RgbaImage) -> String {
    let (width, height) = image.dimensions();
    if width == 0 || height == 0 {
        return NEUTRAL_FALLBACK_HEX.to_string();
    }

    let stride = sample_stride(width, height);
    let mut buckets = [HueBucket::default(); HUE_BUCKETS];
    let mut visible: u64 = 0;

    for y in (0..height).step_by(stride) {
        for x in (0..width).step_by(stride) {
            let pixel = image.get_pixel(x, y);
            if pixel[3] < VISIBILITY_ALPHA_MIN {
                continue;
            }
            visible += 1;

            let (hue, saturation, lightness) = hsl_of(pixel[0], pixel[1], pixel[2]);
            if is_neutral_hsl(saturation, lightness) {
                // Neutrals count toward the share denominator but carry no hue
                continue;
            }

            let index = bucket_index(hue);
            if let Some(bucket) = buckets.get_mut(index) {
                bucket.count += 1;
                bucket.sum_r += u64::from(pixel[0]);
                bucket.sum_g += u64::from(pixel[1]);
                bucket.sum_b += u64::from(pixel[2]);
            }
        }
    }

    if visible == 0 {
        return NEUTRAL_FALLBACK_HEX.to_string();
    }

    let dominant = buckets
        .iter()
        .max_by_key(|bucket| bucket.count)
        .copied()
        .unwrap_or_default();
    if dominant.count == 0 {
        return NEUTRAL_FALLBACK_HEX.to_string();
    }

    let share = dominant.count as f32 / visible as f32;
    if share < DOMINANT_SHARE_MIN {
        return NEUTRAL_FALLBACK_HEX.to_string();
    }

    let avg_r = (dominant.sum_r / dominant.count) as u8;
    let avg_g = (dominant.sum_g / dominant.count) as u8;
    let avg_b = (dominant.sum_b / dominant.count) as u8;

    let (hue, saturation, _) = hsl_of(avg_r, avg_g, avg_b);
    let [r, g, b] = rgb_of(
        hue,
        saturation.max(SWATCH_SATURATION_FLOOR),
        SWATCH_LIGHTNESS,
    );
    format_hex(r, g, b)
}

/// Pick a stride so roughly `TARGET_SAMPLES` pixels get visited
fn sample_stride(width: u32, height: u32) -> usize {
    let pixels = u64::from(width) * u64::from(height);
    let per_axis = ((pixels / TARGET_SAMPLES) as f64).sqrt().ceil() as usize;
    per_axis.max(1)
}

fn bucket_index(hue: f32) -> usize {
    // Positive degrees in [0, 360); guard the wrap-around anyway
    let index = (hue / BUCKET_WIDTH) as usize;
    index.min(HUE_BUCKETS - 1)
}
