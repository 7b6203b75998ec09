//! Dense LSB-first bit packing of n-bit codes.
//!
//! Code `i` occupies bits `[i * bit_width, (i + 1) * bit_width)` of the stream,
//! where bit `k` is bit `k % 8` of byte `k / 8`. A code may straddle up to three
//! bytes once `bit_width > 9`.

pub const MIN_BIT_WIDTH: u8 = 1;
pub const MAX_BIT_WIDTH: u8 = 16;

/// Number of bytes needed to hold `count` codes of `bit_width` bits.
#[inline]
pub fn packed_len(count: usize, bit_width: u8) -> usize {
    (count * bit_width as usize + 7) / 8
}

/// Number of whole codes contained in `byte_len` bytes.
#[inline]
pub fn unpacked_len(byte_len: usize, bit_width: u8) -> usize {
    (byte_len * 8) / bit_width as usize
}

fn check_bit_width(bit_width: u8) {
    assert!(
        (MIN_BIT_WIDTH..=MAX_BIT_WIDTH).contains(&bit_width),
        "bit width {bit_width} out of range"
    );
}

/// Pack `values` into `out`, returning the number of bytes written.
///
/// Each value is masked to its low `bit_width` bits. The written region of
/// `out` is cleared first, bytes past it are left untouched.
///
/// # Panics
/// If `bit_width` is outside `1..=16` or `out` is shorter than
/// `packed_len(values.len(), bit_width)`.
pub fn pack_bits(values: &[u16], bit_width: u8, out: &mut [u8]) -> usize {
    check_bit_width(bit_width);
    let written = packed_len(values.len(), bit_width);
    assert!(
        out.len() >= written,
        "pack output holds {} bytes, need {written}",
        out.len()
    );

    if bit_width == 8 {
        for (dst, &v) in out.iter_mut().zip(values) {
            *dst = v as u8;
        }
        return written;
    }

    let out = &mut out[..written];
    out.fill(0);

    let width = bit_width as usize;
    let mask = (1u32 << width) - 1;
    let mut pos = 0usize;
    for &v in values {
        let byte_index = pos / 8;
        let bit_offset = pos % 8;
        let shifted = (v as u32 & mask) << bit_offset;

        out[byte_index] |= shifted as u8;
        if bit_offset + width > 8 {
            out[byte_index + 1] |= (shifted >> 8) as u8;
        }
        if bit_offset + width > 16 {
            out[byte_index + 2] |= (shifted >> 16) as u8;
        }

        pos += width;
    }

    written
}

/// Unpack codes from `input` into `out`, returning the number recovered.
///
/// The stream holds `unpacked_len(input.len(), bit_width)` codes; decoding
/// stops early if `out` is shorter. Trailing padding bits of a short final
/// block decode as extra zero codes, so callers that know the true count
/// should size `out` to it.
///
/// # Panics
/// If `bit_width` is outside `1..=16`.
pub fn unpack_bits(input: &[u8], bit_width: u8, out: &mut [u16]) -> usize {
    check_bit_width(bit_width);
    let count = unpacked_len(input.len(), bit_width).min(out.len());

    if bit_width == 8 {
        for (dst, &b) in out[..count].iter_mut().zip(input) {
            *dst = b as u16;
        }
        return count;
    }

    let width = bit_width as usize;
    let mask = (1u32 << width) - 1;
    // (i + 1) * width <= input.len() * 8 for every i < count, so the last
    // byte touched by any code is in bounds.
    for (i, slot) in out[..count].iter_mut().enumerate() {
        let pos = i * width;
        let byte_index = pos / 8;
        let bit_offset = pos % 8;

        let mut window = input[byte_index] as u32;
        if bit_offset + width > 8 {
            window |= (input[byte_index + 1] as u32) << 8;
        }
        if bit_offset + width > 16 {
            window |= (input[byte_index + 2] as u32) << 16;
        }

        *slot = ((window >> bit_offset) & mask) as u16;
    }

    count
}
