//! Error types for mapscape

use thiserror::Error;

/// Main error type for terrain compositing and object placement
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed grid, modification or request. Only that item is rejected.
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("No suitable position found for '{object_type}' after {attempts} attempts")]
    NoSuitablePosition { object_type: String, attempts: u32 },

    #[error("Model provider failed for '{object_type}': {reason}")]
    ProviderFailure { object_type: String, reason: String },

    #[error("Position ({x}, {z}) is outside the terrain")]
    OutOfBounds { x: f32, z: f32 },

    #[error("Batch cancelled")]
    Cancelled,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),
}

impl Error {
    /// Short category label used for failure breakdowns.
    pub fn kind(&self) -> &'static str {
        match self {
            Error::InvalidInput(_) => "invalid_input",
            Error::NoSuitablePosition { .. } => "no_suitable_position",
            Error::ProviderFailure { .. } => "provider_failure",
            Error::OutOfBounds { .. } => "out_of_bounds",
            Error::Cancelled => "cancelled",
            Error::Io(_) => "io",
            Error::Json(_) => "json",
            Error::Image(_) => "image",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_no_suitable_position() {
        let err = Error::NoSuitablePosition { object_type: "house".into(), attempts: 6 };
        assert_eq!(
            err.to_string(),
            "No suitable position found for 'house' after 6 attempts"
        );
        assert_eq!(err.kind(), "no_suitable_position");
    }

    #[test]
    fn test_io_conversion() {
        let io = std::io::Error::new(std::io::ErrorKind::NotFound, "missing");
        let err: Error = io.into();
        assert_eq!(err.kind(), "io");
    }
}
