//! Image preprocessing and mask compositing for the segmentation pipeline
//!
//! Covers the stages around inference: decoding, the dimension cap, tensor
//! conversion, and writing the predicted foreground probabilities back into
//! the image's alpha channel.

use crate::error::{ClosetError, Result};
use crate::models::InputProfile;
use image::{imageops::FilterType, DynamicImage, ImageBuffer, RgbaImage};
use ndarray::Array4;

/// Probabilities below this become fully transparent
const DEAD_ZONE_LOW: f32 = 0.1;
/// Probabilities above this become fully opaque
const DEAD_ZONE_HIGH: f32 = 0.8;

/// Decode raw bytes into an image
///
/// # Errors
/// - Malformed or unsupported input data
pub fn decode_image(bytes: &[u8]) -> Result<DynamicImage> {
    image::load_from_memory(bytes)
        .map_err(|e| ClosetError::decode(format!("Failed to decode input image: {e}")))
}

/// Cap an image to `max_dim` on its longer side, preserving aspect ratio
///
/// Images already within bounds are returned unchanged.
#[must_use]
pub fn resize_to_fit(image: &DynamicImage, max_dim: u32) -> DynamicImage {
    let (width, height) = (image.width(), image.height());
    if width <= max_dim && height <= max_dim {
        return image.clone();
    }

    image.resize(max_dim, max_dim, FilterType::Triangle)
}

/// Convert an image to a normalized NCHW tensor at the model's input size
///
/// The image is stretched to the fixed square input resolution on both axes
/// independently; the model expects exactly that shape, so aspect ratio is
/// not preserved here.
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
// Casting is acceptable for image processing math - precision loss is expected
#[must_use]
pub fn image_to_tensor(image: &DynamicImage, profile: &InputProfile) -> Array4<f32> {
    let size = profile.size;
    let rgb_image = image.to_rgb8();
    let square = image::imageops::resize(&rgb_image, size, size, FilterType::Triangle);

    let size_usize = size as usize;
    let mut tensor = Array4::<f32>::zeros((1, 3, size_usize, size_usize));

    #[allow(clippy::indexing_slicing)]
    // Safe: tensor dimensions pre-allocated to match the square image
    for (y, row) in square.rows().enumerate() {
        for (x, pixel) in row.enumerate() {
            tensor[[0, 0, y, x]] = (f32::from(pixel[0]) / 255.0 - profile.mean[0]) / profile.std[0];
            tensor[[0, 1, y, x]] = (f32::from(pixel[1]) / 255.0 - profile.mean[1]) / profile.std[1];
            tensor[[0, 2, y, x]] = (f32::from(pixel[2]) / 255.0 - profile.mean[2]) / profile.std[2];
        }
    }

    tensor
}

/// Write a foreground probability map into an image's alpha channel
///
/// The single-channel mask is upscaled (or downscaled) to the image's
/// resolution by nearest-neighbor index mapping; RGB values pass through
/// untouched. Probabilities are clamped to `[0, 1]`, then mapped through a
/// dead-zone threshold so faint background residue drops out while partial
/// edges keep a soft alpha.
///
/// # Errors
/// - Mask tensor is not shaped `[1, 1, h, w]`
/// - Zero-sized image or mask
pub fn mask_to_alpha(image: &DynamicImage, mask: &Array4<f32>) -> Result<RgbaImage> {
    let shape = mask.shape();
    let (batch, channels) = (
        shape.first().copied().unwrap_or(0),
        shape.get(1).copied().unwrap_or(0),
    );
    let mask_height = shape.get(2).copied().unwrap_or(0);
    let mask_width = shape.get(3).copied().unwrap_or(0);

    if batch != 1 || channels != 1 || mask_height == 0 || mask_width == 0 {
        return Err(ClosetError::segmentation(format!(
            "Unexpected mask tensor shape: {shape:?}"
        )));
    }

    let rgba = image.to_rgba8();
    let (width, height) = rgba.dimensions();
    if width == 0 || height == 0 {
        return Err(ClosetError::segmentation(
            "Cannot composite mask onto a zero-sized image",
        ));
    }

    let mut result = ImageBuffer::new(width, height);
    for (x, y, pixel) in rgba.enumerate_pixels() {
        let mask_x = x as usize * mask_width / width as usize;
        let mask_y = y as usize * mask_height / height as usize;
        let probability = mask
            .get([0, 0, mask_y, mask_x])
            .copied()
            .unwrap_or(0.0)
            .clamp(0.0, 1.0);

        let alpha = dead_zone_alpha(probability);
        result.put_pixel(x, y, image::Rgba([pixel[0], pixel[1], pixel[2], alpha]));
    }

    Ok(result)
}

/// Map a clamped probability to an alpha byte through the dead-zone threshold
#[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss)]
// Casting is acceptable: value is clamped to [0, 255] before the cast
fn dead_zone_alpha(probability: f32) -> u8 {
    let p = probability.clamp(0.0, 1.0);
    if p < DEAD_ZONE_LOW {
        0
    } else if p > DEAD_ZONE_HIGH {
        255
    } else {
        (p * 255.0) as u8
    }
}
