// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Register Access Module
//!
//! Volatile MMIO accessors and the busy-wait delay used by the serial
//! drivers. Addresses are absolute: physical while the MMU is off, fixmap
//! virtual addresses afterwards.

/// Read a 32-bit register
///
/// # Safety
///
/// `addr` must be a mapped, 4-byte aligned device register.
#[inline]
pub unsafe fn read_reg32(addr: usize) -> u32 {
    core::ptr::read_volatile(addr as *const u32)
}

/// Write a 32-bit register
///
/// # Safety
///
/// `addr` must be a mapped, 4-byte aligned device register.
#[inline]
pub unsafe fn write_reg32(addr: usize, val: u32) {
    core::ptr::write_volatile(addr as *mut u32, val)
}

/// Spin for roughly `cycles` iterations.
///
/// Only used for the GPIO pull-up/down setup window, which needs about
/// 150 cycles and has no upper bound.
#[inline(never)]
pub fn delay(cycles: u32) {
    for _ in 0..cycles {
        core::hint::spin_loop();
    }
}
