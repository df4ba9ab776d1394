//! Backend implementations for the segmentation engines
//!
//! Two engines satisfy the [`Segmenter`](crate::inference::Segmenter)
//! contract:
//! - ONNX Runtime backend (fast, hardware acceleration where available)
//! - Tract backend (pure Rust, no external runtime)

#[cfg(feature = "onnx")]
pub mod onnx;

#[cfg(feature = "tract")]
pub mod tract;

// Re-export backends based on enabled features
#[cfg(feature = "onnx")]
pub use self::onnx::{OnnxSegmenter, OnnxSessionFactory};

#[cfg(feature = "tract")]
pub use self::tract::TractSegmenter;
