//! 8-bit block quantize/dequantize kernels.
//!
//! Every kernel computes
//!
//! `code = clamp(trunc((x - zero_point) / scale + 0.5), 0, 255)`
//!
//! and `x = code * scale + zero_point` with a separate multiply and add, so the
//! vector paths are byte-identical to the scalar one. Tails shorter than the
//! vector width go through the scalar formula.
//!
//! The kernel is chosen once per process by probing CPU features, see
//! [`select_kernel`].

use std::sync::OnceLock;

#[cfg(target_arch = "x86_64")]
mod avx2;
#[cfg(target_arch = "aarch64")]
mod neon;
mod scalar;
#[cfg(target_arch = "x86_64")]
mod sse41;

#[cfg(target_arch = "x86_64")]
pub use avx2::Avx2Kernel;
#[cfg(target_arch = "aarch64")]
pub use neon::NeonKernel;
pub use scalar::ScalarKernel;
#[cfg(target_arch = "x86_64")]
pub use sse41::Sse41Kernel;

pub trait QuantKernel: Send + Sync {
    fn name(&self) -> &'static str;

    /// Elements processed per vector step.
    fn lanes(&self) -> usize;

    /// Quantize `input` into `output[..input.len()]`.
    ///
    /// # Panics
    /// If `output` is shorter than `input`.
    fn quantize_block(&self, input: &[f32], scale: f32, zero_point: f32, output: &mut [u8]);

    /// Dequantize `input` into `output[..input.len()]`.
    ///
    /// # Panics
    /// If `output` is shorter than `input`.
    fn dequantize_block(&self, input: &[u8], scale: f32, zero_point: f32, output: &mut [f32]);
}

static SELECTED: OnceLock<&'static dyn QuantKernel> = OnceLock::new();

/// 256-bit integer/float SIMD is available.
pub fn has_wide_simd_support() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        std::arch::is_x86_feature_detected!("avx2")
    }
    #[cfg(not(target_arch = "x86_64"))]
    {
        false
    }
}

/// 128-bit SIMD with the rounding and packing instructions the kernels need.
pub fn has_narrow_simd_support() -> bool {
    #[cfg(target_arch = "x86_64")]
    {
        std::arch::is_x86_feature_detected!("sse4.1")
    }
    #[cfg(target_arch = "aarch64")]
    {
        std::arch::is_aarch64_feature_detected!("neon")
    }
    #[cfg(not(any(target_arch = "x86_64", target_arch = "aarch64")))]
    {
        false
    }
}

fn probe() -> &'static dyn QuantKernel {
    #[cfg(target_arch = "x86_64")]
    {
        if let Some(kernel) = Avx2Kernel::detect() {
            return kernel;
        }
        if let Some(kernel) = Sse41Kernel::detect() {
            return kernel;
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        if let Some(kernel) = NeonKernel::detect() {
            return kernel;
        }
    }
    &ScalarKernel
}

/// Kernel picked for this process. Probed on first call, fixed afterwards.
pub fn select_kernel() -> &'static dyn QuantKernel {
    *SELECTED.get_or_init(|| {
        let kernel = probe();
        log::info!(
            "quantization kernel: {} ({} lanes)",
            kernel.name(),
            kernel.lanes()
        );
        kernel
    })
}

/// Every kernel the running CPU can execute, widest first.
pub fn available_kernels() -> Vec<&'static dyn QuantKernel> {
    let mut kernels: Vec<&'static dyn QuantKernel> = Vec::new();
    #[cfg(target_arch = "x86_64")]
    {
        if let Some(kernel) = Avx2Kernel::detect() {
            kernels.push(kernel);
        }
        if let Some(kernel) = Sse41Kernel::detect() {
            kernels.push(kernel);
        }
    }
    #[cfg(target_arch = "aarch64")]
    {
        if let Some(kernel) = NeonKernel::detect() {
            kernels.push(kernel);
        }
    }
    kernels.push(&ScalarKernel);
    kernels
}

/// Quantize with the process-wide kernel.
pub fn quantize_block_simd(input: &[f32], scale: f32, zero_point: f32, output: &mut [u8]) {
    select_kernel().quantize_block(input, scale, zero_point, output)
}

/// Dequantize with the process-wide kernel.
pub fn dequantize_block_simd(input: &[u8], scale: f32, zero_point: f32, output: &mut [f32]) {
    select_kernel().dequantize_block(input, scale, zero_point, output)
}
