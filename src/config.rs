use serde::{Deserialize, Serialize};

use crate::error::{QuantizationError, Result};
use crate::packing::{MAX_BIT_WIDTH, MIN_BIT_WIDTH};

/// Bit width and block size of a block quantizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct QuantizationConfig {
    /// Bits per code, 1 to 16.
    pub bit_width: u8,
    /// Number of weights sharing one scale/zero-point pair.
    pub block_size: usize,
}

impl Default for QuantizationConfig {
    fn default() -> Self {
        Self::int8()
    }
}

impl QuantizationConfig {
    pub fn new(bit_width: u8, block_size: usize) -> Result<Self> {
        let config = QuantizationConfig {
            bit_width,
            block_size,
        };
        config.validate()?;
        Ok(config)
    }

    /// Aggressive compression.
    pub fn int4() -> Self {
        QuantizationConfig {
            bit_width: 4,
            block_size: 64,
        }
    }

    pub fn int8() -> Self {
        QuantizationConfig {
            bit_width: 8,
            block_size: 128,
        }
    }

    /// Near-lossless for most weight distributions.
    pub fn int16() -> Self {
        QuantizationConfig {
            bit_width: 16,
            block_size: 256,
        }
    }

    pub fn validate(&self) -> Result<()> {
        if !(MIN_BIT_WIDTH..=MAX_BIT_WIDTH).contains(&self.bit_width) {
            return Err(QuantizationError::InvalidBitWidth(self.bit_width));
        }
        if self.block_size == 0 {
            return Err(QuantizationError::InvalidBlockSize(self.block_size));
        }
        Ok(())
    }

    /// Size reduction of the codes alone relative to f32, ignoring the codebook.
    pub fn compression_ratio(&self) -> f32 {
        32.0 / self.bit_width as f32
    }
}

/// Ratio of `original_bits * length` to `compressed_bits * length`.
///
/// Returns 0 when there is nothing compressed to compare against.
pub fn calculate_compression_ratio(original_bits: u32, compressed_bits: u32, length: usize) -> f32 {
    let compressed = compressed_bits as f64 * length as f64;
    if compressed == 0.0 {
        return 0.0;
    }
    (original_bits as f64 * length as f64 / compressed) as f32
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_are_valid() {
        for config in [
            QuantizationConfig::default(),
            QuantizationConfig::int4(),
            QuantizationConfig::int8(),
            QuantizationConfig::int16(),
        ] {
            assert!(config.validate().is_ok(), "{config:?}");
        }
        assert_eq!(QuantizationConfig::default(), QuantizationConfig::int8());
    }

    #[test]
    fn new_rejects_invalid_parameters() {
        assert_eq!(
            QuantizationConfig::new(0, 16),
            Err(QuantizationError::InvalidBitWidth(0))
        );
        assert_eq!(
            QuantizationConfig::new(17, 16),
            Err(QuantizationError::InvalidBitWidth(17))
        );
        assert_eq!(
            QuantizationConfig::new(4, 0),
            Err(QuantizationError::InvalidBlockSize(0))
        );
        assert!(QuantizationConfig::new(3, 1000).is_ok());
    }

    #[test]
    fn compression_ratios() {
        assert_eq!(QuantizationConfig::int4().compression_ratio(), 8.0);
        assert_eq!(QuantizationConfig::int16().compression_ratio(), 2.0);
        assert_eq!(calculate_compression_ratio(32, 4, 1000), 8.0);
        assert!((calculate_compression_ratio(32, 3, 7) - 32.0 / 3.0).abs() < 1e-6);
        assert_eq!(calculate_compression_ratio(32, 8, 0), 0.0);
        assert_eq!(calculate_compression_ratio(32, 0, 10), 0.0);
    }

    #[test]
    fn deserializes_with_defaults() {
        let config: QuantizationConfig = serde_json::from_str(r#"{"bit_width": 4}"#).unwrap();
        assert_eq!(config.bit_width, 4);
        assert_eq!(config.block_size, 128);

        let config: QuantizationConfig =
            serde_json::from_str(r#"{"bit_width": 2, "block_size": 32}"#).unwrap();
        assert_eq!(config, QuantizationConfig::new(2, 32).unwrap());
    }
}
