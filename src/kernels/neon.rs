use std::arch::aarch64::*;

use super::scalar::{dequantize_tail, quantize_tail};
use super::QuantKernel;

const LANES: usize = 4;

/// NEON, four elements per step.
pub struct NeonKernel {
    _probed: (),
}

static KERNEL: NeonKernel = NeonKernel { _probed: () };

impl NeonKernel {
    /// The kernel, if this CPU supports NEON.
    pub fn detect() -> Option<&'static NeonKernel> {
        std::arch::is_aarch64_feature_detected!("neon").then_some(&KERNEL)
    }
}

impl QuantKernel for NeonKernel {
    fn name(&self) -> &'static str {
        "neon"
    }

    fn lanes(&self) -> usize {
        LANES
    }

    fn quantize_block(&self, input: &[f32], scale: f32, zero_point: f32, output: &mut [u8]) {
        assert!(output.len() >= input.len());
        // SAFETY: only reachable through `detect`, which checked for NEON.
        unsafe { quantize_neon(input, scale, zero_point, output) }
    }

    fn dequantize_block(&self, input: &[u8], scale: f32, zero_point: f32, output: &mut [f32]) {
        assert!(output.len() >= input.len());
        // SAFETY: as above.
        unsafe { dequantize_neon(input, scale, zero_point, output) }
    }
}

#[target_feature(enable = "neon")]
unsafe fn quantize_neon(input: &[f32], scale: f32, zero_point: f32, output: &mut [u8]) {
    let len = input.len();
    let body = len - len % LANES;
    let in_ptr = input.as_ptr();

    let scale_vec = vdupq_n_f32(scale);
    let zero_vec = vdupq_n_f32(zero_point);
    let half_vec = vdupq_n_f32(0.5);
    let low_vec = vdupq_n_f32(0.0);
    let high_vec = vdupq_n_f32(255.0);

    let mut lanes = [0u32; LANES];
    let mut i = 0;
    while i < body {
        let x = vld1q_f32(in_ptr.add(i));
        let normalized = vaddq_f32(vdivq_f32(vsubq_f32(x, zero_vec), scale_vec), half_vec);
        // NaN survives max/min here and converts to 0, same as the scalar path.
        let clamped = vminq_f32(vmaxq_f32(normalized, low_vec), high_vec);
        vst1q_u32(lanes.as_mut_ptr(), vcvtq_u32_f32(clamped));

        for (dst, &code) in output[i..i + LANES].iter_mut().zip(&lanes) {
            *dst = code as u8;
        }

        i += LANES;
    }

    quantize_tail(&input[body..], scale, zero_point, &mut output[body..]);
}

#[target_feature(enable = "neon")]
unsafe fn dequantize_neon(input: &[u8], scale: f32, zero_point: f32, output: &mut [f32]) {
    let len = input.len();
    let body = len - len % LANES;

    let scale_vec = vdupq_n_f32(scale);
    let zero_vec = vdupq_n_f32(zero_point);

    let mut i = 0;
    while i < body {
        let codes = [
            input[i] as u32,
            input[i + 1] as u32,
            input[i + 2] as u32,
            input[i + 3] as u32,
        ];
        let values = vcvtq_f32_u32(vld1q_u32(codes.as_ptr()));
        let x = vaddq_f32(vmulq_f32(values, scale_vec), zero_vec);
        vst1q_f32(output.as_mut_ptr().add(i), x);

        i += LANES;
    }

    dequantize_tail(&input[body..], scale, zero_point, &mut output[body..]);
}
