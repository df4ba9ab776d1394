//! Error types for garment scanning and wardrobe storage

use thiserror::Error;

/// Result type alias for closetkit operations
pub type Result<T> = std::result::Result<T, ClosetError>;

/// Comprehensive error types for the scanning and storage pipeline
#[derive(Error, Debug)]
pub enum ClosetError {
    /// Input/output errors (file not found, permission denied, etc.)
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// Image format or processing errors
    #[error("Image processing error: {0}")]
    Image(#[from] image::ImageError),

    /// Malformed or unreadable input image; fatal to the single request only
    #[error("Decode error: {0}")]
    Decode(String),

    /// Model acquisition or session construction failed; the session reverts
    /// to unloaded so callers may retry
    #[error("Model initialization error: {0}")]
    ModelInit(String),

    /// A queued inference call failed; later calls on the same session are
    /// unaffected
    #[error("Inference error: {0}")]
    Inference(String),

    /// Pipeline-level segmentation failure
    #[error("Segmentation error: {0}")]
    Segmentation(String),

    /// Wardrobe store transaction failed
    #[error("Storage error: {0}")]
    Storage(String),

    /// Network failure while fetching model weights
    #[error("Network error: {0}")]
    Network(String),

    /// Invalid configuration or parameters
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),
}

impl ClosetError {
    /// Create a new decode error
    pub fn decode<S: Into<String>>(msg: S) -> Self {
        Self::Decode(msg.into())
    }

    /// Create a new model initialization error
    pub fn model_init<S: Into<String>>(msg: S) -> Self {
        Self::ModelInit(msg.into())
    }

    /// Create a new inference error
    pub fn inference<S: Into<String>>(msg: S) -> Self {
        Self::Inference(msg.into())
    }

    /// Create a new segmentation error
    pub fn segmentation<S: Into<String>>(msg: S) -> Self {
        Self::Segmentation(msg.into())
    }

    /// Create a new storage error
    pub fn storage<S: Into<String>>(msg: S) -> Self {
        Self::Storage(msg.into())
    }

    /// Create a new network error
    pub fn network<S: Into<String>>(msg: S) -> Self {
        Self::Network(msg.into())
    }

    /// Create a new invalid configuration error
    pub fn invalid_config<S: Into<String>>(msg: S) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create file I/O error with operation context
    pub fn file_io_error<P: AsRef<std::path::Path>>(
        operation: &str,
        path: P,
        error: std::io::Error,
    ) -> Self {
        let path_display = path.as_ref().display();
        Self::Io(std::io::Error::new(
            error.kind(),
            format!("Failed to {} '{}': {}", operation, path_display, error),
        ))
    }

    /// Create configuration error with valid ranges
    pub fn config_value_error<T: std::fmt::Display>(
        parameter: &str,
        value: T,
        valid_range: &str,
        recommended: Option<T>,
    ) -> Self {
        let recommendation = match recommended {
            Some(rec) => format!(" Recommended: {}", rec),
            None => String::new(),
        };

        Self::InvalidConfig(format!(
            "Invalid {}: {} (valid range: {}).{}",
            parameter, value, valid_range, recommendation
        ))
    }

    /// Create inference error with provider context
    pub fn inference_error_with_provider(
        provider: &str,
        operation: &str,
        error: &str,
        fallback_suggestions: &[&str],
    ) -> Self {
        let suggestions = if fallback_suggestions.is_empty() {
            String::new()
        } else {
            format!(" Try: {}", fallback_suggestions.join(" or "))
        };

        Self::Inference(format!(
            "{} failed using '{}' provider: {}.{}",
            operation, provider, error, suggestions
        ))
    }

    /// Create storage error with operation context
    pub fn storage_op_error(operation: &str, collection: &str, error: &impl std::fmt::Display) -> Self {
        Self::Storage(format!("Failed to {} in '{}': {}", operation, collection, error))
    }

    /// Whether a retry of the same operation can reasonably succeed
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            Self::ModelInit(_) | Self::Network(_) | Self::Storage(_) | Self::Io(_)
        )
    }
}

impl From<sled::Error> for ClosetError {
    fn from(error: sled::Error) -> Self {
        Self::Storage(error.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_creation() {
        let err = ClosetError::decode("truncated JPEG");
        assert!(matches!(err, ClosetError::Decode(_)));

        let err = ClosetError::storage("tree unavailable");
        assert!(matches!(err, ClosetError::Storage(_)));
    }

    #[test]
    fn test_error_display() {
        let err = ClosetError::invalid_config("max_dimension must be positive");
        assert_eq!(
            err.to_string(),
            "Invalid configuration: max_dimension must be positive"
        );

        let err = ClosetError::model_init("weights missing");
        assert_eq!(err.to_string(), "Model initialization error: weights missing");
    }

    #[test]
    fn test_retryable_classification() {
        assert!(ClosetError::model_init("download interrupted").is_retryable());
        assert!(ClosetError::network("connection reset").is_retryable());
        assert!(ClosetError::storage("lock contention").is_retryable());
        assert!(!ClosetError::decode("not an image").is_retryable());
        assert!(!ClosetError::inference("shape mismatch").is_retryable());
    }

    #[test]
    fn test_enhanced_error_context() {
        let io_error = std::io::Error::new(std::io::ErrorKind::PermissionDenied, "access denied");
        let err = ClosetError::file_io_error("read weights", std::path::Path::new("/cache/model.onnx"), io_error);
        let error_string = err.to_string();
        assert!(error_string.contains("read weights"));
        assert!(error_string.contains("/cache/model.onnx"));

        let err = ClosetError::config_value_error("max_dimension", 0, "1-16384", Some(1024));
        let error_string = err.to_string();
        assert!(error_string.contains("max_dimension"));
        assert!(error_string.contains("Recommended: 1024"));

        let err = ClosetError::inference_error_with_provider(
            "CUDA",
            "Session construction",
            "driver mismatch",
            &["use the cpu provider"],
        );
        let error_string = err.to_string();
        assert!(error_string.contains("CUDA"));
        assert!(error_string.contains("Try: use the cpu provider"));

        let err = ClosetError::storage_op_error("insert record", "garments", &"tree closed");
        assert!(err.to_string().contains("garments"));
    }

    #[test]
    fn test_sled_conversion() {
        let err: ClosetError = sled::Error::Unsupported("test".to_string()).into();
        assert!(matches!(err, ClosetError::Storage(_)));
    }
}
