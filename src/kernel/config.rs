// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Boot Configuration
//!
//! Compile-time settings for bring-up. Cargo features select the console
//! (`pl011-console`) and the log level (`verbose`); everything else is a
//! constant checked against the hardware at boot.

use log::LevelFilter;

use crate::kernel::arch::arm64::registers::{
    Cacheability, ExceptionLevel, PhysicalAddressSize, Shareability, TcrConfig,
};

/// Serial device carrying the early console
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConsoleKind {
    MiniUart,
    Pl011,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootConfig {
    /// Level the hypervisor runs at after bring-up
    pub target_level: ExceptionLevel,
    /// Translation control for the EL2 regime
    pub tcr: TcrConfig,
    pub console: ConsoleKind,
    pub log_level: LevelFilter,
    pub use_colors: bool,
}

impl BootConfig {
    /// First virtual address past the TTBR0 range.
    pub const fn va_limit(&self) -> u64 {
        1u64 << self.tcr.input_address_bits
    }

    /// First physical address past the configured output range.
    pub const fn pa_limit(&self) -> u64 {
        self.tcr.physical_address_size.limit()
    }
}

/// Cortex-A53 implements a 40-bit physical address space.
pub const BOOT_CONFIG: BootConfig = BootConfig {
    target_level: ExceptionLevel::El2,
    tcr: TcrConfig {
        input_address_bits: 48,
        inner: Cacheability::WriteBackWriteAllocate,
        outer: Cacheability::WriteBackWriteAllocate,
        shareability: Shareability::InnerShareable,
        physical_address_size: PhysicalAddressSize::Bits40,
    },
    console: if cfg!(feature = "pl011-console") {
        ConsoleKind::Pl011
    } else {
        ConsoleKind::MiniUart
    },
    log_level: if cfg!(feature = "verbose") {
        LevelFilter::Trace
    } else {
        LevelFilter::Info
    },
    use_colors: true,
};
