pub trait Quantizer {
    fn quantize(&self, real_val: f32) -> u16;
    fn dequantize(&self, q_val: u16) -> f32;
}

/// Largest code representable in `bit_width` bits.
#[inline]
pub fn max_code(bit_width: u8) -> u32 {
    (1u32 << bit_width) - 1
}

/// Asymmetric affine quantization scheme anchored at the range minimum.
///
/// Codes range from 0 to `2^bit_width - 1` and map back to reals as
/// `code * scale + zero_point`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AffineQuantizer {
    pub scale: f32,
    pub zero_point: f32,
    pub bit_width: u8,
}

impl AffineQuantizer {
    /// Calibrate to `[min_val, max_val]`.
    ///
    /// A constant range gets `scale = 1` with `zero_point` at the constant
    /// rather than 0, so its codes (all 0) reconstruct exactly.
    pub fn new(min_val: f32, max_val: f32, bit_width: u8) -> Self {
        if max_val == min_val {
            // Every value maps to code 0 and reconstructs exactly.
            return AffineQuantizer {
                scale: 1.0,
                zero_point: min_val,
                bit_width,
            };
        }

        let scale = (max_val - min_val) / max_code(bit_width) as f32;
        AffineQuantizer {
            scale,
            zero_point: min_val,
            bit_width,
        }
    }

    /// Parameters used for an empty block.
    pub fn identity(bit_width: u8) -> Self {
        AffineQuantizer {
            scale: 1.0,
            zero_point: 0.0,
            bit_width,
        }
    }

    pub fn quantize_slice(&self, src: &[f32], dst: &mut [u16]) {
        for (q, &x) in dst.iter_mut().zip(src) {
            *q = self.quantize(x);
        }
    }

    pub fn dequantize_slice(&self, src: &[u16], dst: &mut [f32]) {
        for (x, &q) in dst.iter_mut().zip(src) {
            *x = self.dequantize(q);
        }
    }
}

impl Quantizer for AffineQuantizer {
    /// Round half up via `+0.5` and truncation, then clamp to the code range.
    fn quantize(&self, real_val: f32) -> u16 {
        let normalized = (real_val - self.zero_point) / self.scale + 0.5;
        normalized.max(0.0).min(max_code(self.bit_width) as f32) as u16
    }

    fn dequantize(&self, q_val: u16) -> f32 {
        q_val as f32 * self.scale + self.zero_point
    }
}

/// Smallest and largest value of a slice, `None` when empty.
pub fn min_and_max(values: &[f32]) -> Option<(f32, f32)> {
    let (&first, rest) = values.split_first()?;
    Some(
        rest.iter()
            .fold((first, first), |(lo, hi), &x| (lo.min(x), hi.max(x))),
    )
}

/// Per-block min-max calibration producing the full-range affine map.
pub fn calibrate(values: &[f32], bit_width: u8) -> AffineQuantizer {
    match min_and_max(values) {
        Some((min_val, max_val)) => AffineQuantizer::new(min_val, max_val, bit_width),
        None => AffineQuantizer::identity(bit_width),
    }
}
