use thiserror::Error;

/// Errors raised while rendering a frame into a DNG byte stream.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("Invalid sensor arrangement '{0}'")]
    InvalidArrangement(String),

    #[error("Frame plane too small: expected {expected} samples, got {actual}")]
    ShortPlane { expected: usize, actual: usize },

    #[error("Frame has invalid dimensions {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },
}
