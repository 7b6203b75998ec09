use super::QuantKernel;

#[inline(always)]
pub(crate) fn quantize_one(x: f32, scale: f32, zero_point: f32) -> u8 {
    let normalized = (x - zero_point) / scale + 0.5;
    normalized.max(0.0).min(255.0) as u8
}

#[inline(always)]
pub(crate) fn dequantize_one(q: u8, scale: f32, zero_point: f32) -> f32 {
    q as f32 * scale + zero_point
}

pub(crate) fn quantize_tail(input: &[f32], scale: f32, zero_point: f32, output: &mut [u8]) {
    for (q, &x) in output.iter_mut().zip(input) {
        *q = quantize_one(x, scale, zero_point);
    }
}

pub(crate) fn dequantize_tail(input: &[u8], scale: f32, zero_point: f32, output: &mut [f32]) {
    for (x, &q) in output.iter_mut().zip(input) {
        *x = dequantize_one(q, scale, zero_point);
    }
}

/// One element per step, runs everywhere.
pub struct ScalarKernel;

impl QuantKernel for ScalarKernel {
    fn name(&self) -> &'static str {
        "scalar"
    }

    fn lanes(&self) -> usize {
        1
    }

    fn quantize_block(&self, input: &[f32], scale: f32, zero_point: f32, output: &mut [u8]) {
        assert!(output.len() >= input.len());
        quantize_tail(input, scale, zero_point, output);
    }

    fn dequantize_block(&self, input: &[u8], scale: f32, zero_point: f32, output: &mut [f32]) {
        assert!(output.len() >= input.len());
        dequantize_tail(input, scale, zero_point, output);
    }
}
