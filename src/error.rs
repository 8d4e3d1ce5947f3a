//! Error types for the capture stitcher

use thiserror::Error;

/// Result type alias for capture operations
pub type Result<T> = std::result::Result<T, Error>;

/// Errors that can occur while capturing a page
#[derive(Error, Debug)]
pub enum Error {
    /// Another capture (full page or single viewport) is still running
    #[error("Capture already in progress")]
    CaptureInProgress,

    /// The surface has no usable capture primitive
    #[error("Capture not supported: {0}")]
    CaptureUnsupported(String),

    /// The capture primitive failed on a specific tile
    #[error("Tile {index} capture failed: {message}")]
    TileCapture { index: usize, message: String },

    /// Invalid capture configuration
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A page accessor (scroll, metrics, styles) failed
    #[error("Surface error: {0}")]
    Surface(String),

    /// Failed to encode the composite image
    #[error("Encoding failed: {0}")]
    Encode(String),

    /// CDP-specific error
    #[cfg(feature = "cdp")]
    #[error("CDP error: {0}")]
    CdpError(String),

    /// Generic error
    #[error("{0}")]
    Other(String),
}

impl Error {
    /// Whether the caller may reasonably retry the same request later.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::CaptureInProgress)
    }
}

impl From<image::ImageError> for Error {
    fn from(err: image::ImageError) -> Self {
        Error::Encode(err.to_string())
    }
}

#[cfg(feature = "cdp")]
impl From<anyhow::Error> for Error {
    fn from(err: anyhow::Error) -> Self {
        Error::CdpError(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn only_concurrent_capture_is_retryable() {
        assert!(Error::CaptureInProgress.is_retryable());
        assert!(!Error::CaptureUnsupported("no canvas".into()).is_retryable());
        assert!(!Error::TileCapture { index: 2, message: "tainted".into() }.is_retryable());
    }

    #[test]
    fn tile_error_message_names_the_tile() {
        let e = Error::TileCapture { index: 3, message: "cross-origin image".into() };
        assert_eq!(e.to_string(), "Tile 3 capture failed: cross-origin image");
    }
}
