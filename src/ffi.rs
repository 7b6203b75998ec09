//! C ABI for host applications.
//!
//! Every entry point reports failure as `false`, a null handle or `-1`.
//! Panics are caught here and never unwind into the caller.

use std::ffi::{c_float, c_int};
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::ptr;
use std::slice;

use crate::block_quantizer::{BlockQuantizer, Codebook};
use crate::error::Result;
use crate::{config, kernels, packing};

/// Opaque quantizer handle.
///
/// Holds the codebook of the last successful `quantize_weights` call, which
/// `dequantize_weights` reads. Not safe for concurrent use.
pub struct QuantizerHandle {
    quantizer: BlockQuantizer,
    codebook: Option<Codebook>,
}

fn guarded(op: &str, f: impl FnOnce() -> Result<()>) -> bool {
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => true,
        Ok(Err(e)) => {
            log::warn!("{op} failed: {e}");
            false
        }
        Err(_) => {
            log::warn!("{op} panicked");
            false
        }
    }
}

fn to_len(length: c_int) -> Option<usize> {
    usize::try_from(length).ok()
}

fn to_bit_width(bits: c_int) -> Option<u8> {
    u8::try_from(bits)
        .ok()
        .filter(|b| (packing::MIN_BIT_WIDTH..=packing::MAX_BIT_WIDTH).contains(b))
}

fn to_c_int(n: usize) -> c_int {
    c_int::try_from(n).unwrap_or(-1)
}

/// Borrow `len` elements at `ptr`; a null pointer is only accepted for `len == 0`.
unsafe fn input_slice<'a, T>(ptr: *const T, len: usize) -> Option<&'a [T]> {
    if len == 0 {
        Some(&[])
    } else if ptr.is_null() {
        None
    } else {
        Some(slice::from_raw_parts(ptr, len))
    }
}

unsafe fn output_slice<'a, T>(ptr: *mut T, len: usize) -> Option<&'a mut [T]> {
    if len == 0 {
        Some(&mut [])
    } else if ptr.is_null() {
        None
    } else {
        Some(slice::from_raw_parts_mut(ptr, len))
    }
}

/// Create a quantizer. Returns null if `bits` is outside 1..=16 or
/// `block_size` is not positive.
///
/// The handle must be released with `destroy_quantizer`.
#[no_mangle]
pub extern "C" fn create_quantizer(bits: c_int, block_size: c_int) -> *mut QuantizerHandle {
    let block_size = usize::try_from(block_size).unwrap_or(0);
    let bits = u8::try_from(bits).unwrap_or(0);

    match BlockQuantizer::new(bits, block_size) {
        Ok(quantizer) => Box::into_raw(Box::new(QuantizerHandle {
            quantizer,
            codebook: None,
        })),
        Err(e) => {
            log::warn!("create_quantizer failed: {e}");
            ptr::null_mut()
        }
    }
}

/// Release a handle. Null is ignored.
///
/// # Safety
/// `handle` must be null or come from `create_quantizer` and not have been
/// destroyed already.
#[no_mangle]
pub unsafe extern "C" fn destroy_quantizer(handle: *mut QuantizerHandle) {
    if !handle.is_null() {
        drop(Box::from_raw(handle));
    }
}

/// Bytes `quantize_weights` writes for `length` weights, or -1.
///
/// # Safety
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn quantized_size(handle: *const QuantizerHandle, length: c_int) -> c_int {
    match (handle.as_ref(), to_len(length)) {
        (Some(handle), Some(len)) => to_c_int(handle.quantizer.packed_len(len)),
        _ => -1,
    }
}

/// Number of weights the current codebook reconstructs, or -1 if no
/// quantization has succeeded yet.
///
/// # Safety
/// `handle` must be null or a live handle.
#[no_mangle]
pub unsafe extern "C" fn dequantized_size(handle: *const QuantizerHandle) -> c_int {
    match handle.as_ref().and_then(|h| h.codebook.as_ref()) {
        Some(codebook) => to_c_int(codebook.len()),
        None => -1,
    }
}

/// Quantize `length` weights into `output` and keep the codebook on the handle.
///
/// # Safety
/// - `handle` must be null or a live handle, not used concurrently
/// - `weights` must point to `length` floats
/// - `output` must hold `quantized_size(handle, length)` bytes
#[no_mangle]
pub unsafe extern "C" fn quantize_weights(
    handle: *mut QuantizerHandle,
    weights: *const c_float,
    length: c_int,
    output: *mut u8,
) -> bool {
    let Some(handle) = handle.as_mut() else {
        return false;
    };
    let Some(len) = to_len(length) else {
        return false;
    };
    let Some(weights) = input_slice(weights, len) else {
        return false;
    };
    let Some(out) = output_slice(output, handle.quantizer.packed_len(len)) else {
        return false;
    };

    guarded("quantize_weights", || {
        let codebook = handle.quantizer.quantize_into(weights, out)?;
        handle.codebook = Some(codebook);
        Ok(())
    })
}

/// Reconstruct weights from a packed stream using the handle's codebook.
///
/// Fails if no `quantize_weights` call has succeeded on this handle or if
/// `length` is not the size of that call's packed stream.
///
/// # Safety
/// - `handle` must be null or a live handle, not used concurrently
/// - `packed` must point to `length` bytes
/// - `output` must hold `dequantized_size(handle)` floats
#[no_mangle]
pub unsafe extern "C" fn dequantize_weights(
    handle: *mut QuantizerHandle,
    packed: *const u8,
    length: c_int,
    output: *mut c_float,
) -> bool {
    let Some(handle) = handle.as_ref() else {
        return false;
    };
    let Some(codebook) = handle.codebook.as_ref() else {
        log::warn!("dequantize_weights called before a successful quantize");
        return false;
    };
    let Some(len) = to_len(length) else {
        return false;
    };
    let Some(packed) = input_slice(packed, len) else {
        return false;
    };
    let Some(out) = output_slice(output, codebook.len()) else {
        return false;
    };

    guarded("dequantize_weights", || {
        handle.quantizer.dequantize_into(packed, codebook, out)
    })
}

/// Pack `length` codes of `bits` bits. Returns bytes written or -1.
///
/// # Safety
/// `input` must point to `length` codes and `output` to
/// `ceil(length * bits / 8)` bytes.
#[no_mangle]
pub unsafe extern "C" fn pack_bits(input: *const u16, length: c_int, bits: c_int, output: *mut u8) -> c_int {
    let (Some(len), Some(bit_width)) = (to_len(length), to_bit_width(bits)) else {
        return -1;
    };
    let (Some(values), Some(out)) = (
        input_slice(input, len),
        output_slice(output, packing::packed_len(len, bit_width)),
    ) else {
        return -1;
    };

    catch_unwind(AssertUnwindSafe(|| {
        to_c_int(packing::pack_bits(values, bit_width, out))
    }))
    .unwrap_or(-1)
}

/// Unpack all codes held in `length` bytes. Returns codes written or -1.
///
/// # Safety
/// `input` must point to `length` bytes and `output` to
/// `floor(length * 8 / bits)` codes.
#[no_mangle]
pub unsafe extern "C" fn unpack_bits(input: *const u8, length: c_int, bits: c_int, output: *mut u16) -> c_int {
    let (Some(len), Some(bit_width)) = (to_len(length), to_bit_width(bits)) else {
        return -1;
    };
    let (Some(bytes), Some(out)) = (
        input_slice(input, len),
        output_slice(output, packing::unpacked_len(len, bit_width)),
    ) else {
        return -1;
    };

    catch_unwind(AssertUnwindSafe(|| {
        to_c_int(packing::unpack_bits(bytes, bit_width, out))
    }))
    .unwrap_or(-1)
}

/// 8-bit quantization of one block with the process-wide kernel.
///
/// # Safety
/// `input` must point to `length` floats and `output` to `length` bytes.
#[no_mangle]
pub unsafe extern "C" fn quantize_block_simd(
    input: *const c_float,
    length: c_int,
    scale: c_float,
    zero_point: c_float,
    output: *mut u8,
) -> bool {
    let Some(len) = to_len(length) else {
        return false;
    };
    let (Some(values), Some(out)) = (input_slice(input, len), output_slice(output, len)) else {
        return false;
    };

    catch_unwind(AssertUnwindSafe(|| {
        kernels::quantize_block_simd(values, scale, zero_point, out)
    }))
    .is_ok()
}

/// 8-bit dequantization of one block with the process-wide kernel.
///
/// # Safety
/// `input` must point to `length` bytes and `output` to `length` floats.
#[no_mangle]
pub unsafe extern "C" fn dequantize_block_simd(
    input: *const u8,
    length: c_int,
    scale: c_float,
    zero_point: c_float,
    output: *mut c_float,
) -> bool {
    let Some(len) = to_len(length) else {
        return false;
    };
    let (Some(codes), Some(out)) = (input_slice(input, len), output_slice(output, len)) else {
        return false;
    };

    catch_unwind(AssertUnwindSafe(|| {
        kernels::dequantize_block_simd(codes, scale, zero_point, out)
    }))
    .is_ok()
}

#[no_mangle]
pub extern "C" fn has_wide_simd_support() -> bool {
    kernels::has_wide_simd_support()
}

#[no_mangle]
pub extern "C" fn has_narrow_simd_support() -> bool {
    kernels::has_narrow_simd_support()
}

/// Negative arguments yield 0.
#[no_mangle]
pub extern "C" fn calculate_compression_ratio(
    original_bits: c_int,
    compressed_bits: c_int,
    length: c_int,
) -> c_float {
    match (
        u32::try_from(original_bits),
        u32::try_from(compressed_bits),
        to_len(length),
    ) {
        (Ok(original), Ok(compressed), Some(len)) => {
            config::calculate_compression_ratio(original, compressed, len)
        }
        _ => 0.0,
    }
}
