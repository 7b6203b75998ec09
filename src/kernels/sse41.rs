use std::arch::x86_64::*;

use super::scalar::{dequantize_tail, quantize_tail};
use super::QuantKernel;

const LANES: usize = 4;

/// SSE4.1, four elements per step.
pub struct Sse41Kernel {
    _probed: (),
}

static KERNEL: Sse41Kernel = Sse41Kernel { _probed: () };

impl Sse41Kernel {
    /// The kernel, if this CPU supports SSE4.1.
    pub fn detect() -> Option<&'static Sse41Kernel> {
        std::arch::is_x86_feature_detected!("sse4.1").then_some(&KERNEL)
    }
}

impl QuantKernel for Sse41Kernel {
    fn name(&self) -> &'static str {
        "sse4.1"
    }

    fn lanes(&self) -> usize {
        LANES
    }

    fn quantize_block(&self, input: &[f32], scale: f32, zero_point: f32, output: &mut [u8]) {
        assert!(output.len() >= input.len());
        // SAFETY: only reachable through `detect`, which checked for SSE4.1.
        unsafe { quantize_sse41(input, scale, zero_point, output) }
    }

    fn dequantize_block(&self, input: &[u8], scale: f32, zero_point: f32, output: &mut [f32]) {
        assert!(output.len() >= input.len());
        // SAFETY: as above.
        unsafe { dequantize_sse41(input, scale, zero_point, output) }
    }
}

#[target_feature(enable = "sse4.1")]
unsafe fn quantize_sse41(input: &[f32], scale: f32, zero_point: f32, output: &mut [u8]) {
    let len = input.len();
    let body = len - len % LANES;
    let in_ptr = input.as_ptr();

    let scale_vec = _mm_set1_ps(scale);
    let zero_vec = _mm_set1_ps(zero_point);
    let half_vec = _mm_set1_ps(0.5);
    let low_vec = _mm_setzero_ps();
    let high_vec = _mm_set1_ps(255.0);

    let mut i = 0;
    while i < body {
        let x = _mm_loadu_ps(in_ptr.add(i));
        let normalized = _mm_add_ps(_mm_div_ps(_mm_sub_ps(x, zero_vec), scale_vec), half_vec);
        let clamped = _mm_min_ps(_mm_max_ps(normalized, low_vec), high_vec);
        let ints = _mm_cvttps_epi32(clamped);

        let words = _mm_packus_epi32(ints, ints);
        let bytes = _mm_packus_epi16(words, words);
        let packed = _mm_cvtsi128_si32(bytes) as u32;
        output[i..i + LANES].copy_from_slice(&packed.to_le_bytes());

        i += LANES;
    }

    quantize_tail(&input[body..], scale, zero_point, &mut output[body..]);
}

#[target_feature(enable = "sse4.1")]
unsafe fn dequantize_sse41(input: &[u8], scale: f32, zero_point: f32, output: &mut [f32]) {
    let len = input.len();
    let body = len - len % LANES;

    let scale_vec = _mm_set1_ps(scale);
    let zero_vec = _mm_set1_ps(zero_point);

    let mut i = 0;
    while i < body {
        let word = i32::from_le_bytes([input[i], input[i + 1], input[i + 2], input[i + 3]]);
        let ints = _mm_cvtepu8_epi32(_mm_cvtsi32_si128(word));
        let x = _mm_add_ps(_mm_mul_ps(_mm_cvtepi32_ps(ints), scale_vec), zero_vec);
        _mm_storeu_ps(output.as_mut_ptr().add(i), x);

        i += LANES;
    }

    dequantize_tail(&input[body..], scale, zero_point, &mut output[body..]);
}
