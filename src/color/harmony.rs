//! Color compatibility rules for outfit suggestions

use super::{hsl_of, is_neutral_hsl, parse_hex};

/// Hue distances below this are analogous or near-identical
const ANALOGOUS_MAX: f32 = 45.0;

/// Near-complementary window (exclusive bounds)
const COMPLEMENTARY_MIN: f32 = 160.0;
const COMPLEMENTARY_MAX: f32 = 200.0;

/// Triadic-adjacent window (exclusive bounds)
const TRIADIC_MIN: f32 = 100.0;
const TRIADIC_MAX: f32 = 140.0;

/// Decide whether two swatch colors read as visually compatible
///
/// Neutrals (grays, near-black, near-white) pair with everything. Hued
/// colors are compatible when their circular hue distance is analogous
/// (< 45°), near-complementary (160°–200°), or triadic-adjacent
/// (100°–140°). Symmetric and deterministic; an unparseable string is
/// treated as neutral rather than an error.
#[must_use]
pub fn is_compatible(color_a: &str, color_b: &str) -> bool {
    let (Some([ar, ag, ab]), Some([br, bg, bb])) = (parse_hex(color_a), parse_hex(color_b))
    else {
        return true;
    };

    let (hue_a, sat_a, light_a) = hsl_of(ar, ag, ab);
    let (hue_b, sat_b, light_b) = hsl_of(br, bg, bb);

    if is_neutral_hsl(sat_a, light_a) || is_neutral_hsl(sat_b, light_b) {
        return true;
    }

    windows_allow(circular_hue_distance(hue_a, hue_b))
}

/// Shortest angular distance between two hues on the 360° circle
#[must_use]
pub fn circular_hue_distance(hue_a: f32, hue_b: f32) -> f32 {
    let diff = (hue_a - hue_b).abs() % 360.0;
    diff.min(360.0 - diff)
}

fn windows_allow(distance: f32) -> bool {
    distance < ANALOGOUS_MAX
        || (distance > COMPLEMENTARY_MIN && distance < COMPLEMENTARY_MAX)
        || (distance > TRIADIC_MIN && distance < TRIADIC_MAX)
}
