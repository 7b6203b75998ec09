//! Block-wise affine quantization of f32 weights to densely packed 1–16 bit codes.

pub mod block_quantizer;
pub mod config;
pub mod error;
pub mod ffi;
pub mod kernels;
pub mod packing;
pub mod quantization;
pub mod registry;

pub use block_quantizer::{BlockQuantizer, Codebook, QuantizationBlock};
pub use config::{calculate_compression_ratio, QuantizationConfig};
pub use error::{QuantizationError, Result};
pub use kernels::{
    dequantize_block_simd, has_narrow_simd_support, has_wide_simd_support, quantize_block_simd,
    select_kernel, QuantKernel,
};
pub use packing::{pack_bits, packed_len, unpack_bits, unpacked_len};
pub use quantization::{calibrate, AffineQuantizer, Quantizer};
pub use registry::{CompressionStats, QuantizerRegistry};
