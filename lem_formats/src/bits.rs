//! Bit-order reversal for the narrow fields of the DAT bitstream.
//!
//! Every multi-bit field in a compressed chunk is stored most-significant bit
//! first while the accumulator is consumed least-significant bit first, so the
//! decoder reverses each field after masking it to its width.

/// Reverse the low `count` bits of `value`; higher bits are discarded.
#[inline]
pub const fn reverse_bits(value: u32, count: u32) -> u32 {
    debug_assert!(count >= 1 && count <= 32);
    value.reverse_bits() >> (32 - count)
}

#[inline]
pub const fn reverse3(value: u32) -> u32 {
    reverse_bits(value & 0x7, 3)
}

#[inline]
pub const fn reverse8(value: u32) -> u32 {
    reverse_bits(value & 0xFF, 8)
}

#[inline]
pub const fn reverse9(value: u32) -> u32 {
    reverse_bits(value & 0x1FF, 9)
}

#[inline]
pub const fn reverse10(value: u32) -> u32 {
    reverse_bits(value & 0x3FF, 10)
}

#[inline]
pub const fn reverse12(value: u32) -> u32 {
    reverse_bits(value & 0xFFF, 12)
}
