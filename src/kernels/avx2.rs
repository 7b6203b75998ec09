use std::arch::x86_64::*;

use super::scalar::{dequantize_tail, quantize_tail};
use super::QuantKernel;

const LANES: usize = 8;

/// AVX2, eight elements per step.
pub struct Avx2Kernel {
    _probed: (),
}

static KERNEL: Avx2Kernel = Avx2Kernel { _probed: () };

impl Avx2Kernel {
    /// The kernel, if this CPU supports AVX2.
    pub fn detect() -> Option<&'static Avx2Kernel> {
        std::arch::is_x86_feature_detected!("avx2").then_some(&KERNEL)
    }
}

impl QuantKernel for Avx2Kernel {
    fn name(&self) -> &'static str {
        "avx2"
    }

    fn lanes(&self) -> usize {
        LANES
    }

    fn quantize_block(&self, input: &[f32], scale: f32, zero_point: f32, output: &mut [u8]) {
        assert!(output.len() >= input.len());
        // SAFETY: only reachable through `detect`, which checked for AVX2.
        unsafe { quantize_avx2(input, scale, zero_point, output) }
    }

    fn dequantize_block(&self, input: &[u8], scale: f32, zero_point: f32, output: &mut [f32]) {
        assert!(output.len() >= input.len());
        // SAFETY: as above.
        unsafe { dequantize_avx2(input, scale, zero_point, output) }
    }
}

#[target_feature(enable = "avx2")]
unsafe fn quantize_avx2(input: &[f32], scale: f32, zero_point: f32, output: &mut [u8]) {
    let len = input.len();
    let body = len - len % LANES;
    let in_ptr = input.as_ptr();
    let out_ptr = output.as_mut_ptr();

    let scale_vec = _mm256_set1_ps(scale);
    let zero_vec = _mm256_set1_ps(zero_point);
    let half_vec = _mm256_set1_ps(0.5);
    let low_vec = _mm256_setzero_ps();
    let high_vec = _mm256_set1_ps(255.0);

    let mut i = 0;
    while i < body {
        let x = _mm256_loadu_ps(in_ptr.add(i));
        let normalized = _mm256_add_ps(
            _mm256_div_ps(_mm256_sub_ps(x, zero_vec), scale_vec),
            half_vec,
        );
        // NaN lanes take the second operand of max, i.e. zero.
        let clamped = _mm256_min_ps(_mm256_max_ps(normalized, low_vec), high_vec);
        let ints = _mm256_cvttps_epi32(clamped);

        // 8 x i32 -> 8 x u16 -> 8 x u8, all values already in [0, 255]
        let words = _mm_packus_epi32(
            _mm256_castsi256_si128(ints),
            _mm256_extracti128_si256::<1>(ints),
        );
        let bytes = _mm_packus_epi16(words, words);
        _mm_storel_epi64(out_ptr.add(i) as *mut __m128i, bytes);

        i += LANES;
    }

    quantize_tail(&input[body..], scale, zero_point, &mut output[body..]);
}

#[target_feature(enable = "avx2")]
unsafe fn dequantize_avx2(input: &[u8], scale: f32, zero_point: f32, output: &mut [f32]) {
    let len = input.len();
    let body = len - len % LANES;
    let in_ptr = input.as_ptr();
    let out_ptr = output.as_mut_ptr();

    let scale_vec = _mm256_set1_ps(scale);
    let zero_vec = _mm256_set1_ps(zero_point);

    let mut i = 0;
    while i < body {
        let codes = _mm_loadl_epi64(in_ptr.add(i) as *const __m128i);
        let values = _mm256_cvtepi32_ps(_mm256_cvtepu8_epi32(codes));
        let x = _mm256_add_ps(_mm256_mul_ps(values, scale_vec), zero_vec);
        _mm256_storeu_ps(out_ptr.add(i), x);

        i += LANES;
    }

    dequantize_tail(&input[body..], scale, zero_point, &mut output[body..]);
}
