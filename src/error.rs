// ============================================================================
// ERRORS — everything a canvas transition, query or export can fail with
// ============================================================================

use crate::service::ServiceError;

/// Errors surfaced by viewport transitions, exports and the host channel.
///
/// Drag gestures never produce an error: they clamp silently so that a live
/// drag is never interrupted.  Only explicit numeric entry is validated.
#[derive(Debug, Clone, PartialEq)]
pub enum CanvasError {
    /// An export or transform was requested before any image was loaded.
    NotLoaded,
    /// Explicit canvas size entry below the handle-clamped minimum.
    DegenerateGeometry { width: f32, height: f32, min: f32 },
    /// Pointer or stroke coordinate that is NaN or infinite.
    NonFinitePoint { x: f32, y: f32 },
    /// Aspect ratio string that is not `W:H` with two positive numbers.
    InvalidAspectRatio(String),
    /// MIME type or data-URI header the codec does not handle.
    UnsupportedFormat(String),
    Decode(String),
    Encode(String),
    /// Opaque failure of the remote generation service.  Never retried here.
    ExternalService(ServiceError),
    /// The remote service answered, but without a usable image payload.
    UnsupportedOutput,
    /// Malformed bytes on the host command channel.
    Protocol(String),
}

impl std::fmt::Display for CanvasError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CanvasError::NotLoaded => write!(f, "No image is loaded"),
            CanvasError::DegenerateGeometry { width, height, min } => write!(
                f,
                "Canvas size {}×{} is below the minimum of {}×{}",
                width, height, min, min
            ),
            CanvasError::NonFinitePoint { x, y } => {
                write!(f, "Pointer position ({}, {}) is not a finite coordinate", x, y)
            }
            CanvasError::InvalidAspectRatio(s) => write!(f, "Invalid aspect ratio: '{}'", s),
            CanvasError::UnsupportedFormat(s) => write!(f, "Unsupported image format: {}", s),
            CanvasError::Decode(e) => write!(f, "Failed to decode image: {}", e),
            CanvasError::Encode(e) => write!(f, "Failed to encode image: {}", e),
            CanvasError::ExternalService(e) => write!(f, "Operation failed, retry: {}", e),
            CanvasError::UnsupportedOutput => {
                write!(f, "The service response contained no usable image")
            }
            CanvasError::Protocol(e) => write!(f, "Malformed host message: {}", e),
        }
    }
}

impl std::error::Error for CanvasError {}

impl From<image::ImageError> for CanvasError {
    fn from(e: image::ImageError) -> Self {
        match e {
            image::ImageError::Unsupported(u) => CanvasError::UnsupportedFormat(u.to_string()),
            other => CanvasError::Decode(other.to_string()),
        }
    }
}

impl From<ServiceError> for CanvasError {
    fn from(e: ServiceError) -> Self {
        CanvasError::ExternalService(e)
    }
}

impl From<Box<bincode::ErrorKind>> for CanvasError {
    fn from(e: Box<bincode::ErrorKind>) -> Self {
        CanvasError::Protocol(e.to_string())
    }
}

/// Convenience alias used throughout the crate.
pub type CanvasResult<T> = Result<T, CanvasError>;
