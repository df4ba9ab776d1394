//! Swatch color extraction and outfit color compatibility
//!
//! All color math runs in HSL: hue drives bucketing and compatibility,
//! saturation and lightness drive the neutral classification. Conversions go
//! through `palette`.

mod extract;
mod harmony;

pub use extract::analyze;
pub use harmony::{circular_hue_distance, is_compatible};

use palette::{FromColor, Hsl, Srgb};

/// Sentinel swatch for transparent, fully neutral, or unanalyzable images
pub const NEUTRAL_FALLBACK_HEX: &str = "#A1A1AA";

/// Saturation below this is neutral (grayscale)
pub const NEUTRAL_SATURATION_MAX: f32 = 0.15;

/// Lightness below this is neutral (near-black)
pub const NEUTRAL_LIGHTNESS_MIN: f32 = 0.15;

/// Lightness above this is neutral (near-white)
pub const NEUTRAL_LIGHTNESS_MAX: f32 = 0.9;

/// Convert 8-bit RGB to (hue in positive degrees, saturation, lightness)
#[must_use]
pub fn hsl_of(r: u8, g: u8, b: u8) -> (f32, f32, f32) {
    let rgb = Srgb::new(
        f32::from(r) / 255.0,
        f32::from(g) / 255.0,
        f32::from(b) / 255.0,
    );
    let hsl = Hsl::from_color(rgb);
    (
        hsl.hue.into_positive_degrees(),
        hsl.saturation,
        hsl.lightness,
    )
}

/// Convert HSL back to an 8-bit RGB triple
#[must_use]
pub fn rgb_of(hue: f32, saturation: f32, lightness: f32) -> [u8; 3] {
    let rgb: Srgb = Srgb::from_color(Hsl::new(hue, saturation, lightness));
    let rgb = rgb.into_format::<u8>();
    [rgb.red, rgb.green, rgb.blue]
}

/// Whether saturation/lightness place a color outside hue classification
#[must_use]
pub fn is_neutral_hsl(saturation: f32, lightness: f32) -> bool {
    saturation < NEUTRAL_SATURATION_MAX
        || lightness < NEUTRAL_LIGHTNESS_MIN
        || lightness > NEUTRAL_LIGHTNESS_MAX
}

/// Whether `s` is a syntactically valid `#RRGGBB` color
#[must_use]
pub fn is_valid_hex(s: &str) -> bool {
    parse_hex(s).is_some()
}

/// Parse `#RRGGBB` (case-insensitive) into an RGB triple
#[must_use]
pub fn parse_hex(s: &str) -> Option<[u8; 3]> {
    let digits = s.strip_prefix('#')?;
    if digits.len() != 6 || !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    let r = u8::from_str_radix(digits.get(0..2)?, 16).ok()?;
    let g = u8::from_str_radix(digits.get(2..4)?, 16).ok()?;
    let b = u8::from_str_radix(digits.get(4..6)?, 16).ok()?;
    Some([r, g, b])
}

/// Format an RGB triple as `#RRGGBB`
#[must_use]
pub fn format_hex(r: u8, g: u8, b: u8) -> String {
    format!("#{r:02X}{g:02X}{b:02X}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hex_parse_and_format() {
        assert_eq!(parse_hex("#A1A1AA"), Some([0xA1, 0xA1, 0xAA]));
        assert_eq!(parse_hex("#a1a1aa"), Some([0xA1, 0xA1, 0xAA]));
        assert_eq!(parse_hex("A1A1AA"), None);
        assert_eq!(parse_hex("#A1A1A"), None);
        assert_eq!(parse_hex("#GGHHII"), None);
        assert_eq!(parse_hex(""), None);

        assert_eq!(format_hex(0xA1, 0xA1, 0xAA), "#A1A1AA");
        assert!(is_valid_hex(NEUTRAL_FALLBACK_HEX));
    }

    #[test]
    fn test_hsl_primaries() {
        let (h, s, l) = hsl_of(255, 0, 0);
        assert!(h.abs() < 0.5, "red hue was {h}");
        assert!((s - 1.0).abs() < 1e-3);
        assert!((l - 0.5).abs() < 1e-3);

        let (h, _, _) = hsl_of(0, 255, 0);
        assert!((h - 120.0).abs() < 0.5, "green hue was {h}");

        let (h, _, _) = hsl_of(0, 0, 255);
        assert!((h - 240.0).abs() < 0.5, "blue hue was {h}");
    }

    #[test]
    fn test_hsl_round_trip_preserves_hue() {
        let [r, g, b] = rgb_of(210.0, 0.65, 0.55);
        let (h, s, l) = hsl_of(r, g, b);
        assert!((h - 210.0).abs() < 1.0, "hue drifted to {h}");
        assert!((s - 0.65).abs() < 0.02);
        assert!((l - 0.55).abs() < 0.02);
    }

    #[test]
    fn test_neutral_classification() {
        // Grays: saturation 0
        let (_, s, l) = hsl_of(128, 128, 128);
        assert!(is_neutral_hsl(s, l));

        // Near-black and near-white
        let (_, s, l) = hsl_of(10, 10, 20);
        assert!(is_neutral_hsl(s, l));
        let (_, s, l) = hsl_of(250, 250, 245);
        assert!(is_neutral_hsl(s, l));

        // A saturated mid-lightness color is not neutral
        let (_, s, l) = hsl_of(200, 60, 40);
        assert!(!is_neutral_hsl(s, l));
    }
}
