// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM64 (AArch64) Architecture Implementation
//!
//! EL2 bring-up: register encoders, the boot translation tables, the fixmap
//! and the sequencer that turns them on.

pub mod boot;
pub mod boot_mmu;
pub mod fixmap;
pub mod mmu;
pub mod registers;
pub mod sysreg;

/// Park the core for good.
pub fn halt() -> ! {
    loop {
        #[cfg(target_arch = "aarch64")]
        aarch64_cpu::asm::wfe();

        #[cfg(not(target_arch = "aarch64"))]
        core::hint::spin_loop();
    }
}
