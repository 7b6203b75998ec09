use thiserror::Error;

/// Errors reported by the quantization codec.
#[derive(Debug, Clone, PartialEq, Error)]
pub enum QuantizationError {
    #[error("bit width must be between 1 and 16, got {0}")]
    InvalidBitWidth(u8),

    #[error("block size must be positive, got {0}")]
    InvalidBlockSize(usize),

    /// NaN or infinite input value.
    #[error("non-finite weight at index {index}")]
    NonFiniteInput { index: usize },

    /// Block range too wide or too narrow for a normal f32 scale.
    #[error("block {block} range is not representable")]
    InvalidScale { block: usize },

    #[error("output buffer too small: need {needed}, got {got}")]
    OutputTooSmall { needed: usize, got: usize },

    #[error("packed stream length mismatch: expected {expected} bytes, got {got}")]
    PackedLengthMismatch { expected: usize, got: usize },

    /// Codebook was produced with a different bit width or block size.
    #[error("codebook does not match quantizer parameters")]
    CodebookMismatch,

    #[error("no configuration registered under '{0}'")]
    UnknownConfig(String),

    #[error("no quantizer created for '{0}'")]
    UnknownQuantizer(String),
}

pub type Result<T> = std::result::Result<T, QuantizationError>;
