//! Named quantization configurations and the quantizers built from them.

use std::collections::HashMap;

use crate::block_quantizer::{stream_len, BlockQuantizer, Codebook};
use crate::config::QuantizationConfig;
use crate::error::{QuantizationError, Result};

/// Byte sizes of a weight tensor before and after quantization.
#[derive(Debug, Clone, PartialEq)]
pub struct CompressionStats {
    pub original_size: usize,
    pub compressed_size: usize,
    pub compression_ratio: f32,
    pub space_saved: usize,
}

#[derive(Debug)]
pub struct QuantizerRegistry {
    configs: HashMap<String, QuantizationConfig>,
    quantizers: HashMap<String, BlockQuantizer>,
}

impl QuantizerRegistry {
    pub fn new() -> Self {
        Self {
            configs: HashMap::new(),
            quantizers: HashMap::new(),
        }
    }

    /// Register (or replace) a configuration under `name`.
    pub fn register_config(&mut self, name: impl Into<String>, config: QuantizationConfig) -> Result<()> {
        config.validate()?;
        self.configs.insert(name.into(), config);
        Ok(())
    }

    /// Build the quantizer for a registered configuration.
    pub fn create_quantizer(&mut self, name: &str) -> Result<()> {
        let config = self
            .configs
            .get(name)
            .ok_or_else(|| QuantizationError::UnknownConfig(name.to_string()))?;

        let quantizer = BlockQuantizer::from_config(config)?;
        log::debug!("created quantizer '{name}': {quantizer:?}");
        self.quantizers.insert(name.to_string(), quantizer);
        Ok(())
    }

    pub fn quantizer(&self, name: &str) -> Result<&BlockQuantizer> {
        self.quantizers
            .get(name)
            .ok_or_else(|| QuantizationError::UnknownQuantizer(name.to_string()))
    }

    pub fn quantize_with_name(&self, name: &str, weights: &[f32]) -> Result<(Vec<u8>, Codebook)> {
        self.quantizer(name)?.quantize(weights)
    }

    pub fn dequantize_with_name(&self, name: &str, packed: &[u8], codebook: &Codebook) -> Result<Vec<f32>> {
        self.quantizer(name)?.dequantize(packed, codebook)
    }

    /// Quantize several tensors independently; stops at the first failure.
    pub fn batch_quantize(&self, name: &str, batches: &[&[f32]]) -> Result<Vec<(Vec<u8>, Codebook)>> {
        let quantizer = self.quantizer(name)?;
        batches
            .iter()
            .map(|weights| quantizer.quantize(weights))
            .collect()
    }

    /// Sizes for `original_len` f32 weights under the named configuration.
    pub fn compression_stats(&self, name: &str, original_len: usize) -> Option<CompressionStats> {
        let config = self.configs.get(name)?;
        let original_size = original_len * std::mem::size_of::<f32>();
        let compressed_size = stream_len(original_len, config.block_size, config.bit_width);

        Some(CompressionStats {
            original_size,
            compressed_size,
            compression_ratio: config.compression_ratio(),
            space_saved: original_size - compressed_size,
        })
    }

    /// Registered configuration names, sorted.
    pub fn list_configs(&self) -> Vec<String> {
        let mut names: Vec<String> = self.configs.keys().cloned().collect();
        names.sort();
        names
    }

    pub fn config(&self, name: &str) -> Option<&QuantizationConfig> {
        self.configs.get(name)
    }

    pub fn remove_quantizer(&mut self, name: &str) -> bool {
        self.quantizers.remove(name).is_some()
    }
}

impl Default for QuantizerRegistry {
    fn default() -> Self {
        let mut registry = Self::new();
        registry.configs.insert("int4".to_string(), QuantizationConfig::int4());
        registry.configs.insert("int8".to_string(), QuantizationConfig::int8());
        registry.configs.insert("int16".to_string(), QuantizationConfig::int16());
        registry
    }
}
