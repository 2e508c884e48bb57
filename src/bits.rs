// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Bit Manipulation Utilities
//!
//! Field packing and alignment checks used by the register encoders and
//! the translation table builder. Everything here is `const fn` so layout
//! checks can run at compile time.

/// Place `val` into a `count`-bit field starting at bit `base`.
///
/// Bits of `val` above the field width are discarded.
#[inline]
pub const fn bm(base: u32, count: u32, val: u64) -> u64 {
    (val & mask(count)) << base
}

/// Extract the `count`-bit field starting at bit `base`.
#[inline]
pub const fn bits_shift(value: u64, base: u32, count: u32) -> u64 {
    (value >> base) & mask(count)
}

/// Low `count` bits set.
#[inline]
pub const fn mask(count: u32) -> u64 {
    if count >= 64 {
        u64::MAX
    } else {
        (1u64 << count) - 1
    }
}

/// Check if a bit is set
#[inline]
pub const fn is_bit_set(value: u64, bit: u32) -> bool {
    value & (1u64 << bit) != 0
}

/// `align` must be a power of two.
#[inline]
pub const fn is_aligned(value: u64, align: u64) -> bool {
    value & (align - 1) == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_field_packing() {
        assert_eq!(bm(16, 3, 5), 5 << 16);
        assert_eq!(bm(0, 6, 0xff), 0x3f);
        assert_eq!(bits_shift(0x00ff_0400, 8, 8), 0x04);
        assert_eq!(mask(64), u64::MAX);
        assert!(is_bit_set(1 << 31, 31));
    }

    #[test]
    fn test_alignment() {
        assert!(is_aligned(0x20_0000, 0x20_0000));
        assert!(!is_aligned(0x1001, 0x1000));
    }
}
