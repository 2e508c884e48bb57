// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM64 System Register Access
//!
//! Every system register operation the boot sequencer performs goes through
//! [`SystemRegisters`]. The hardware backend writes the EL2 translation
//! regime; register values arrive already encoded by
//! [`registers`](super::registers).
//!
//! Writes to the EL2 registers are legal from EL3 as well, which lets a core
//! that reset at EL3 prepare EL2 translation before dropping to it.

use crate::kernel::arch::arm64::registers::{
    ExceptionLevel, Hcr, Mair, PhysicalAddressSize, Scr, Sctlr, Spsr, Tcr,
};
use crate::kernel::vm::{PAddr, VAddr};

pub trait SystemRegisters {
    fn current_el(&self) -> ExceptionLevel;

    /// Largest output address size the core implements.
    fn supported_pa_size(&self) -> PhysicalAddressSize;

    fn write_mair(&mut self, mair: Mair);
    fn write_tcr(&mut self, tcr: Tcr);
    fn write_ttbr0(&mut self, root: PAddr);

    /// Clean and invalidate `[start, start + len)` to the point of coherency,
    /// so the table walker sees what was written with caches off.
    fn clean_dcache_range(&mut self, start: PAddr, len: u64);

    /// Invalidate all EL2 TLB entries and wait for completion.
    fn invalidate_tlb(&mut self);

    /// Write SCTLR_EL2.
    ///
    /// # Safety
    ///
    /// When this sets the M bit, TTBR0 must point at tables that map the
    /// executing code and the current stack.
    unsafe fn write_sctlr(&mut self, sctlr: Sctlr);

    fn write_hcr(&mut self, hcr: Hcr);
    fn write_scr(&mut self, scr: Scr);
    fn write_spsr(&mut self, spsr: Spsr);

    /// Return address for the exception return.
    fn write_elr(&mut self, entry: VAddr);

    /// Stack pointer of the level entered by the exception return.
    fn write_lower_sp(&mut self, sp: VAddr);

    /// `eret` with `args` in x0 and x1.
    ///
    /// # Safety
    ///
    /// ELR, SPSR, SCR and the lower stack pointer must be programmed.
    unsafe fn exception_return(&mut self, args: [u64; 2]);

    /// Switch to `sp` and branch to `entry` with `args` in x0 and x1.
    ///
    /// # Safety
    ///
    /// `entry` and `sp` must be mapped by the live translation tables.
    unsafe fn branch(&mut self, entry: VAddr, sp: VAddr, args: [u64; 2]);
}

// ============================================================================
// Hardware backend
// ============================================================================

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
pub use hw::Arm64Registers;

#[cfg(all(target_arch = "aarch64", target_os = "none"))]
mod hw {
    use super::*;
    use aarch64_cpu::asm::barrier;
    use aarch64_cpu::registers::{
        CurrentEL, Readable, Writeable, HCR_EL2, ID_AA64MMFR0_EL1, MAIR_EL2, SCTLR_EL2, TCR_EL2,
        TTBR0_EL2,
    };
    use core::arch::asm;

    /// Smallest data cache line of the supported cores
    const CACHE_LINE: u64 = 64;

    /// The executing core
    pub struct Arm64Registers;

    impl SystemRegisters for Arm64Registers {
        fn current_el(&self) -> ExceptionLevel {
            ExceptionLevel::from_current_el(CurrentEL.get())
        }

        fn supported_pa_size(&self) -> PhysicalAddressSize {
            // 52-bit ranges need LPA descriptors, clamp to 48
            let range = ID_AA64MMFR0_EL1.read(ID_AA64MMFR0_EL1::PARange).min(5);
            PhysicalAddressSize::from_encoding(range).unwrap_or(PhysicalAddressSize::Bits32)
        }

        fn write_mair(&mut self, mair: Mair) {
            MAIR_EL2.set(mair.bits());
        }

        fn write_tcr(&mut self, tcr: Tcr) {
            TCR_EL2.set(tcr.bits());
        }

        fn write_ttbr0(&mut self, root: PAddr) {
            TTBR0_EL2.set(root);
            barrier::isb(barrier::SY);
        }

        fn clean_dcache_range(&mut self, start: PAddr, len: u64) {
            let mut line = start & !(CACHE_LINE - 1);
            while line < start + len {
                unsafe {
                    asm!("dc civac, {}", in(reg) line, options(nostack));
                }
                line += CACHE_LINE;
            }
            barrier::dsb(barrier::SY);
        }

        fn invalidate_tlb(&mut self) {
            unsafe {
                asm!("tlbi alle2", "dsb ish", "isb", options(nostack));
            }
        }

        unsafe fn write_sctlr(&mut self, sctlr: Sctlr) {
            barrier::dsb(barrier::SY);
            barrier::isb(barrier::SY);
            SCTLR_EL2.set(sctlr.bits());
            barrier::isb(barrier::SY);
        }

        fn write_hcr(&mut self, hcr: Hcr) {
            HCR_EL2.set(hcr.bits());
        }

        fn write_scr(&mut self, scr: Scr) {
            unsafe {
                asm!("msr scr_el3, {}", in(reg) scr.bits(), options(nomem, nostack));
            }
        }

        fn write_spsr(&mut self, spsr: Spsr) {
            unsafe {
                asm!("msr spsr_el3, {}", in(reg) spsr.bits(), options(nomem, nostack));
            }
        }

        fn write_elr(&mut self, entry: VAddr) {
            unsafe {
                asm!("msr elr_el3, {}", in(reg) entry, options(nomem, nostack));
            }
        }

        fn write_lower_sp(&mut self, sp: VAddr) {
            unsafe {
                asm!("msr sp_el2, {}", in(reg) sp, options(nomem, nostack));
            }
        }

        unsafe fn exception_return(&mut self, args: [u64; 2]) {
            asm!(
                "isb",
                "eret",
                in("x0") args[0],
                in("x1") args[1],
                options(noreturn)
            );
        }

        unsafe fn branch(&mut self, entry: VAddr, sp: VAddr, args: [u64; 2]) {
            asm!(
                "mov sp, {sp}",
                "br {entry}",
                sp = in(reg) sp,
                entry = in(reg) entry,
                in("x0") args[0],
                in("x1") args[1],
                options(noreturn)
            );
        }
    }
}

// ============================================================================
// Recording backend
// ============================================================================

#[cfg(test)]
pub use recording::{RecordingRegisters, RegisterWrite};
