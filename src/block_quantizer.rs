//! Block-wise affine quantization of f32 weights into a packed n-bit stream.
//!
//! The input is split into blocks of `block_size` values (the last one may be
//! shorter). Each block gets its own min-max calibrated scale/zero-point and
//! is packed into `ceil(block_len * bit_width / 8)` bytes. Blocks are laid out
//! back to back, so a block never shares a byte with its neighbour.

use std::ops::Range;

use crate::config::QuantizationConfig;
use crate::error::{QuantizationError, Result};
use crate::kernels::{select_kernel, QuantKernel};
use crate::packing::{pack_bits, packed_len, unpack_bits, MAX_BIT_WIDTH, MIN_BIT_WIDTH};
use crate::quantization::{calibrate, AffineQuantizer};

/// Calibration parameters of one block.
pub type QuantizationBlock = AffineQuantizer;

/// Per-block parameters produced by one [`BlockQuantizer::quantize`] call.
///
/// Carries the element count, block size and bit width as well so the block
/// partition of the packed stream can be rebuilt when dequantizing.
#[derive(Debug, Clone, PartialEq)]
pub struct Codebook {
    bit_width: u8,
    block_size: usize,
    len: usize,
    blocks: Vec<QuantizationBlock>,
}

impl Codebook {
    pub fn bit_width(&self) -> u8 {
        self.bit_width
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    /// Number of quantized elements.
    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn blocks(&self) -> &[QuantizationBlock] {
        &self.blocks
    }

    pub fn num_blocks(&self) -> usize {
        self.blocks.len()
    }

    /// Byte length of the packed stream this codebook describes.
    pub fn packed_len(&self) -> usize {
        stream_len(self.len, self.block_size, self.bit_width)
    }

    /// Element range covered by each block, in block order.
    pub fn block_ranges(&self) -> impl Iterator<Item = Range<usize>> + '_ {
        block_ranges(self.len, self.block_size)
    }
}

fn block_ranges(len: usize, block_size: usize) -> impl Iterator<Item = Range<usize>> {
    (0..len)
        .step_by(block_size)
        .map(move |start| start..(start + block_size).min(len))
}

pub(crate) fn stream_len(len: usize, block_size: usize, bit_width: u8) -> usize {
    let full_blocks = len / block_size;
    let tail = len % block_size;
    full_blocks * packed_len(block_size, bit_width) + packed_len(tail, bit_width)
}

/// Quantizer for a fixed bit width and block size.
///
/// Holds no per-call state; the [`Codebook`] returned by `quantize` is what
/// ties a packed stream to its dequantization parameters.
pub struct BlockQuantizer {
    bit_width: u8,
    block_size: usize,
    kernel: &'static dyn QuantKernel,
}

impl std::fmt::Debug for BlockQuantizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("BlockQuantizer")
            .field("bit_width", &self.bit_width)
            .field("block_size", &self.block_size)
            .field("kernel", &self.kernel.name())
            .finish()
    }
}

impl BlockQuantizer {
    pub fn new(bit_width: u8, block_size: usize) -> Result<Self> {
        if !(MIN_BIT_WIDTH..=MAX_BIT_WIDTH).contains(&bit_width) {
            return Err(QuantizationError::InvalidBitWidth(bit_width));
        }
        if block_size == 0 {
            return Err(QuantizationError::InvalidBlockSize(block_size));
        }

        Ok(BlockQuantizer {
            bit_width,
            block_size,
            kernel: select_kernel(),
        })
    }

    pub fn from_config(config: &QuantizationConfig) -> Result<Self> {
        Self::new(config.bit_width, config.block_size)
    }

    /// Same quantizer, but running on a specific kernel instead of the
    /// process-wide one.
    pub fn with_kernel(mut self, kernel: &'static dyn QuantKernel) -> Self {
        self.kernel = kernel;
        self
    }

    pub fn bit_width(&self) -> u8 {
        self.bit_width
    }

    pub fn block_size(&self) -> usize {
        self.block_size
    }

    pub fn kernel_name(&self) -> &'static str {
        self.kernel.name()
    }

    /// Exact byte length of the packed stream for `len` weights.
    pub fn packed_len(&self, len: usize) -> usize {
        stream_len(len, self.block_size, self.bit_width)
    }

    pub fn quantize(&self, weights: &[f32]) -> Result<(Vec<u8>, Codebook)> {
        let mut packed = vec![0u8; self.packed_len(weights.len())];
        let codebook = self.quantize_into(weights, &mut packed)?;
        Ok((packed, codebook))
    }

    /// Quantize into a caller-owned buffer of at least `packed_len(weights.len())` bytes.
    ///
    /// All parameters are computed and checked before `out` is touched, so on
    /// error the buffer is left as it was.
    pub fn quantize_into(&self, weights: &[f32], out: &mut [u8]) -> Result<Codebook> {
        let needed = self.packed_len(weights.len());
        if out.len() < needed {
            return Err(QuantizationError::OutputTooSmall {
                needed,
                got: out.len(),
            });
        }
        if let Some(index) = weights.iter().position(|w| !w.is_finite()) {
            return Err(QuantizationError::NonFiniteInput { index });
        }

        let mut blocks = Vec::with_capacity(weights.len().div_ceil(self.block_size));
        for (block, range) in block_ranges(weights.len(), self.block_size).enumerate() {
            let params = calibrate(&weights[range], self.bit_width);
            if !params.scale.is_normal() {
                return Err(QuantizationError::InvalidScale { block });
            }
            blocks.push(params);
        }

        let mut codes = vec![0u16; self.block_size.min(weights.len())];
        let mut offset = 0;
        for (range, params) in block_ranges(weights.len(), self.block_size).zip(&blocks) {
            let block = &weights[range];
            let block_bytes = packed_len(block.len(), self.bit_width);
            let dst = &mut out[offset..offset + block_bytes];

            if self.bit_width == 8 {
                // One code per byte, the kernel output is the packed stream.
                self.kernel
                    .quantize_block(block, params.scale, params.zero_point, dst);
            } else {
                let codes = &mut codes[..block.len()];
                params.quantize_slice(block, codes);
                pack_bits(codes, self.bit_width, dst);
            }

            offset += block_bytes;
        }

        log::debug!(
            "quantized {} weights into {} blocks ({} bytes, {} bits, {})",
            weights.len(),
            blocks.len(),
            offset,
            self.bit_width,
            self.kernel.name()
        );

        Ok(Codebook {
            bit_width: self.bit_width,
            block_size: self.block_size,
            len: weights.len(),
            blocks,
        })
    }

    pub fn dequantize(&self, packed: &[u8], codebook: &Codebook) -> Result<Vec<f32>> {
        let mut out = vec![0f32; codebook.len()];
        self.dequantize_into(packed, codebook, &mut out)?;
        Ok(out)
    }

    /// Reconstruct `codebook.len()` weights into a caller-owned buffer.
    ///
    /// `packed` must be exactly the stream `codebook` was produced with.
    pub fn dequantize_into(&self, packed: &[u8], codebook: &Codebook, out: &mut [f32]) -> Result<()> {
        if codebook.bit_width != self.bit_width || codebook.block_size != self.block_size {
            return Err(QuantizationError::CodebookMismatch);
        }
        let expected = codebook.packed_len();
        if packed.len() != expected {
            return Err(QuantizationError::PackedLengthMismatch {
                expected,
                got: packed.len(),
            });
        }
        if out.len() < codebook.len() {
            return Err(QuantizationError::OutputTooSmall {
                needed: codebook.len(),
                got: out.len(),
            });
        }

        let mut codes = vec![0u16; self.block_size.min(codebook.len())];
        let mut offset = 0;
        for (range, params) in codebook.block_ranges().zip(codebook.blocks()) {
            let block_len = range.len();
            let block_bytes = packed_len(block_len, self.bit_width);
            let src = &packed[offset..offset + block_bytes];
            let dst = &mut out[range];

            if self.bit_width == 8 {
                self.kernel
                    .dequantize_block(src, params.scale, params.zero_point, dst);
            } else {
                let codes = &mut codes[..block_len];
                unpack_bits(src, self.bit_width, codes);
                params.dequantize_slice(codes, dst);
            }

            offset += block_bytes;
        }

        log::debug!(
            "dequantized {} weights from {} blocks",
            codebook.len(),
            codebook.num_blocks()
        );

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernels::available_kernels;
    use proptest::prelude::*;
    use rand::Rng;

    fn random_weights(len: usize, range: std::ops::Range<f32>) -> Vec<f32> {
        let mut rng = rand::rng();
        (0..len).map(|_| rng.random_range(range.clone())).collect()
    }

    /// Half a quantization step plus f32 rounding slack.
    fn error_bound(params: &QuantizationBlock, x: f32) -> f32 {
        params.scale / 2.0 + (x.abs() + params.zero_point.abs() + 1.0) * 1e-5
    }

    fn assert_within_half_step(original: &[f32], restored: &[f32], codebook: &Codebook) {
        assert_eq!(original.len(), restored.len());
        for (range, params) in codebook.block_ranges().zip(codebook.blocks()) {
            for i in range {
                let bound = error_bound(params, original[i]);
                let err = (original[i] - restored[i]).abs();
                assert!(
                    err <= bound,
                    "index {i}: {} vs {} (err {err}, bound {bound})",
                    original[i],
                    restored[i]
                );
            }
        }
    }

    #[test]
    fn construction_validates_parameters() {
        assert_eq!(
            BlockQuantizer::new(0, 32).unwrap_err(),
            QuantizationError::InvalidBitWidth(0)
        );
        assert_eq!(
            BlockQuantizer::new(17, 32).unwrap_err(),
            QuantizationError::InvalidBitWidth(17)
        );
        assert_eq!(
            BlockQuantizer::new(8, 0).unwrap_err(),
            QuantizationError::InvalidBlockSize(0)
        );
        assert!(BlockQuantizer::new(1, 1).is_ok());
        assert!(BlockQuantizer::new(16, 4096).is_ok());
    }

    #[test]
    fn eight_bit_example() {
        let quantizer = BlockQuantizer::new(8, 4).unwrap();
        let weights = [0.0, 1.0, 2.0, 3.0];

        let (packed, codebook) = quantizer.quantize(&weights).unwrap();
        assert_eq!(packed, vec![0, 85, 170, 255]);
        assert_eq!(codebook.num_blocks(), 1);
        assert_eq!(codebook.blocks()[0].zero_point, 0.0);
        assert!((codebook.blocks()[0].scale - 3.0 / 255.0).abs() < 1e-9);

        let restored = quantizer.dequantize(&packed, &codebook).unwrap();
        assert_within_half_step(&weights, &restored, &codebook);
        assert_eq!(restored[0], 0.0);
    }

    #[test]
    fn short_last_block_uses_its_own_length() {
        // 10 weights, blocks of 4 at 3 bits: 4 -> 2 bytes, 4 -> 2 bytes, 2 -> 1 byte.
        let quantizer = BlockQuantizer::new(3, 4).unwrap();
        let weights = random_weights(10, -1.0..1.0);

        assert_eq!(quantizer.packed_len(10), 5);
        let (packed, codebook) = quantizer.quantize(&weights).unwrap();
        assert_eq!(packed.len(), 5);
        assert_eq!(codebook.num_blocks(), 3);
        assert_eq!(codebook.block_ranges().last(), Some(8..10));

        let restored = quantizer.dequantize(&packed, &codebook).unwrap();
        assert_within_half_step(&weights, &restored, &codebook);
    }

    #[test]
    fn constant_block_is_all_zero_codes() {
        let quantizer = BlockQuantizer::new(5, 8).unwrap();
        let mut weights = vec![-3.5f32; 8];
        weights.extend(random_weights(8, 0.0..1.0));

        let (packed, codebook) = quantizer.quantize(&weights).unwrap();
        assert!(packed[..5].iter().all(|&b| b == 0));
        assert_eq!(codebook.blocks()[0].scale, 1.0);

        let restored = quantizer.dequantize(&packed, &codebook).unwrap();
        assert!(restored[..8].iter().all(|&x| x == -3.5));
    }

    #[test]
    fn empty_input_round_trips() {
        let quantizer = BlockQuantizer::new(4, 16).unwrap();
        let (packed, codebook) = quantizer.quantize(&[]).unwrap();

        assert!(packed.is_empty());
        assert!(codebook.is_empty());
        assert_eq!(codebook.num_blocks(), 0);
        assert!(quantizer.dequantize(&packed, &codebook).unwrap().is_empty());
    }

    #[test]
    fn rejects_non_finite_weights() {
        let quantizer = BlockQuantizer::new(8, 4).unwrap();
        let mut out = vec![0xAAu8; 4];

        let err = quantizer
            .quantize_into(&[1.0, f32::NAN, 2.0, 3.0], &mut out)
            .unwrap_err();
        assert_eq!(err, QuantizationError::NonFiniteInput { index: 1 });
        assert!(out.iter().all(|&b| b == 0xAA));
    }

    #[test]
    fn rejects_overflowing_range() {
        let quantizer = BlockQuantizer::new(8, 2).unwrap();
        let err = quantizer.quantize(&[0.0, 1.0, -f32::MAX, f32::MAX]).unwrap_err();
        assert_eq!(err, QuantizationError::InvalidScale { block: 1 });
    }

    #[test]
    fn rejects_subnormal_range() {
        // Scale underflows to a subnormal.
        let quantizer = BlockQuantizer::new(16, 2).unwrap();
        let err = quantizer.quantize(&[0.0, 1e-40]).unwrap_err();
        assert_eq!(err, QuantizationError::InvalidScale { block: 0 });

        // Scale underflows to zero.
        let quantizer = BlockQuantizer::new(8, 2).unwrap();
        let mut out = [0xAAu8; 4];
        let err = quantizer
            .quantize_into(&[1.0, 2.0, 0.0, 1e-44], &mut out)
            .unwrap_err();
        assert_eq!(err, QuantizationError::InvalidScale { block: 1 });
        assert!(out.iter().all(|&b| b == 0xAA));
        assert_eq!(err.to_string(), "block 1 range is not representable");

        // Constant subnormal blocks keep the unit scale.
        let (packed, codebook) = quantizer.quantize(&[1e-44, 1e-44]).unwrap();
        assert_eq!(quantizer.dequantize(&packed, &codebook).unwrap(), [1e-44, 1e-44]);
    }

    #[test]
    fn rejects_small_output_buffer() {
        let quantizer = BlockQuantizer::new(4, 4).unwrap();
        let err = quantizer
            .quantize_into(&[1.0, 2.0, 3.0], &mut [0u8; 1])
            .unwrap_err();
        assert_eq!(err, QuantizationError::OutputTooSmall { needed: 2, got: 1 });
    }

    #[test]
    fn dequantize_checks_codebook_and_stream() {
        let quantizer = BlockQuantizer::new(4, 4).unwrap();
        let (packed, codebook) = quantizer.quantize(&random_weights(9, 0.0..1.0)).unwrap();

        let other = BlockQuantizer::new(4, 8).unwrap();
        assert_eq!(
            other.dequantize(&packed, &codebook).unwrap_err(),
            QuantizationError::CodebookMismatch
        );

        assert_eq!(
            quantizer.dequantize(&packed[..3], &codebook).unwrap_err(),
            QuantizationError::PackedLengthMismatch {
                expected: 5,
                got: 3
            }
        );

        let mut out = [0f32; 4];
        assert_eq!(
            quantizer
                .dequantize_into(&packed, &codebook, &mut out)
                .unwrap_err(),
            QuantizationError::OutputTooSmall { needed: 9, got: 4 }
        );
    }

    #[test]
    fn every_kernel_produces_the_same_stream() {
        let weights = random_weights(301, -10.0..10.0);
        let reference = BlockQuantizer::new(8, 37)
            .unwrap()
            .with_kernel(&crate::kernels::ScalarKernel);
        let (expected, expected_book) = reference.quantize(&weights).unwrap();
        let expected_restored = reference.dequantize(&expected, &expected_book).unwrap();

        for kernel in available_kernels() {
            let quantizer = BlockQuantizer::new(8, 37).unwrap().with_kernel(kernel);
            let (packed, codebook) = quantizer.quantize(&weights).unwrap();
            assert_eq!(packed, expected, "kernel {}", kernel.name());
            assert_eq!(codebook, expected_book);

            let restored = quantizer.dequantize(&packed, &codebook).unwrap();
            assert_eq!(restored, expected_restored, "kernel {}", kernel.name());
        }
    }

    #[test]
    fn eight_bit_path_matches_generic_packing() {
        // The kernel path and the scalar quantizer + packer must agree on 8-bit streams.
        let weights = random_weights(64, -2.0..5.0);
        let quantizer = BlockQuantizer::new(8, 16).unwrap();
        let (packed, codebook) = quantizer.quantize(&weights).unwrap();

        let mut generic = vec![0u8; packed.len()];
        let mut codes = [0u16; 16];
        for ((range, params), dst) in codebook
            .block_ranges()
            .zip(codebook.blocks())
            .zip(generic.chunks_mut(16))
        {
            params.quantize_slice(&weights[range], &mut codes);
            pack_bits(&codes, 8, dst);
        }
        assert_eq!(packed, generic);
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(128))]

        #[test]
        fn prop_round_trip_error_is_bounded(
            bit_width in 1u8..=16,
            block_size in 1usize..70,
            weights in prop::collection::vec(-1000.0f32..1000.0, 0..300),
        ) {
            let quantizer = BlockQuantizer::new(bit_width, block_size).unwrap();
            let (packed, codebook) = quantizer.quantize(&weights).unwrap();
            prop_assert_eq!(packed.len(), quantizer.packed_len(weights.len()));
            prop_assert_eq!(codebook.num_blocks(), weights.len().div_ceil(block_size));

            let restored = quantizer.dequantize(&packed, &codebook).unwrap();
            prop_assert_eq!(restored.len(), weights.len());
            for (range, params) in codebook.block_ranges().zip(codebook.blocks()) {
                for i in range {
                    let err = (weights[i] - restored[i]).abs();
                    prop_assert!(err <= error_bound(params, weights[i]));
                }
            }
        }
    }
}
