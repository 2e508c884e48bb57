// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM64 System Register Encoders
//!
//! Structured values for the registers programmed during bring-up. Each
//! type packs its architected fields and exposes accessors for them, so
//! field boundaries and reserved bits can be checked independently of the
//! code that writes the hardware.
//!
//! | Type    | Register   | Used for                                  |
//! |---------|------------|-------------------------------------------|
//! | `Mair`  | MAIR_EL2   | memory attribute slots 0..7               |
//! | `Tcr`   | TCR_EL2    | TTBR0 walk geometry and attributes        |
//! | `Sctlr` | SCTLR_EL2  | MMU and cache enable                      |
//! | `Hcr`   | HCR_EL2    | lower level execution state               |
//! | `Scr`   | SCR_EL3    | security state and EL2 width              |
//! | `Spsr`  | SPSR_EL3   | mode and masks restored by `eret`         |

use bitflags::bitflags;

use crate::bits::{bits_shift, bm, is_bit_set};
use crate::err::{BootError, Result};

/// Register fields that carry a range precondition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegisterField {
    /// MAIR attribute slot (0..=7)
    MairIndex,
    /// TCR input address size, in bits
    InputAddressSize,
}

// ============================================================================
// MAIR_EL2
// ============================================================================

/// Memory types the boot tables use
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MemoryAttribute {
    /// Device-nGnRnE, strongly ordered
    DeviceNgnrne,
    /// Device-nGnRE, early write acknowledgement
    DeviceNgnre,
    /// Normal, inner/outer write-back non-transient, read/write allocate
    NormalWriteBack,
}

impl MemoryAttribute {
    pub const ALL: [MemoryAttribute; 3] = [
        MemoryAttribute::DeviceNgnrne,
        MemoryAttribute::DeviceNgnre,
        MemoryAttribute::NormalWriteBack,
    ];

    /// MAIR attribute byte
    pub const fn encoding(self) -> u8 {
        match self {
            MemoryAttribute::DeviceNgnrne => 0x00,
            MemoryAttribute::DeviceNgnre => 0x04,
            MemoryAttribute::NormalWriteBack => 0xff,
        }
    }

    pub const fn from_encoding(byte: u8) -> Option<Self> {
        match byte {
            0x00 => Some(MemoryAttribute::DeviceNgnrne),
            0x04 => Some(MemoryAttribute::DeviceNgnre),
            0xff => Some(MemoryAttribute::NormalWriteBack),
            _ => None,
        }
    }

    /// Slot this attribute occupies in the boot MAIR value.
    pub const fn index(self) -> u8 {
        match self {
            MemoryAttribute::DeviceNgnrne => 0,
            MemoryAttribute::DeviceNgnre => 1,
            MemoryAttribute::NormalWriteBack => 2,
        }
    }

    pub const fn is_device(self) -> bool {
        !matches!(self, MemoryAttribute::NormalWriteBack)
    }
}

/// Number of attribute slots in MAIR
pub const MAIR_SLOTS: u8 = 8;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Mair(u64);

impl Mair {
    pub const fn empty() -> Self {
        Mair(0)
    }

    /// The value programmed at boot: every [`MemoryAttribute`] at its own
    /// [`MemoryAttribute::index`].
    pub const fn boot() -> Self {
        let mut value = 0;
        let mut i = 0;
        while i < MemoryAttribute::ALL.len() {
            let attr = MemoryAttribute::ALL[i];
            value |= bm(attr.index() as u32 * 8, 8, attr.encoding() as u64);
            i += 1;
        }
        Mair(value)
    }

    /// Place `attr` in slot `index`, replacing what was there.
    pub fn with(self, index: u8, attr: MemoryAttribute) -> Result<Self> {
        if index >= MAIR_SLOTS {
            return Err(BootError::FieldOutOfRange {
                field: RegisterField::MairIndex,
                value: index as u64,
            });
        }
        let shift = index as u32 * 8;
        let cleared = self.0 & !bm(shift, 8, 0xff);
        Ok(Mair(cleared | bm(shift, 8, attr.encoding() as u64)))
    }

    /// Raw attribute byte in slot `index`.
    pub const fn attribute_byte(&self, index: u8) -> u8 {
        bits_shift(self.0, (index as u32 % MAIR_SLOTS as u32) * 8, 8) as u8
    }

    /// Decode slot `index`; `None` for slots holding an unknown byte.
    pub const fn attribute(&self, index: u8) -> Option<MemoryAttribute> {
        if index >= MAIR_SLOTS {
            return None;
        }
        MemoryAttribute::from_encoding(self.attribute_byte(index))
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }
}

// ============================================================================
// TCR_EL2
// ============================================================================

/// Cacheability of table walks (IRGN0/ORGN0)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Cacheability {
    NonCacheable = 0,
    WriteBackWriteAllocate = 1,
    WriteThrough = 2,
    WriteBackNoWriteAllocate = 3,
}

impl Cacheability {
    const fn from_bits(bits: u64) -> Self {
        match bits & 3 {
            0 => Cacheability::NonCacheable,
            1 => Cacheability::WriteBackWriteAllocate,
            2 => Cacheability::WriteThrough,
            _ => Cacheability::WriteBackNoWriteAllocate,
        }
    }
}

/// Shareability of table walks (SH0) and of mapped pages
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Shareability {
    NonShareable = 0,
    OuterShareable = 2,
    InnerShareable = 3,
}

impl Shareability {
    pub const fn from_bits(bits: u64) -> Option<Self> {
        match bits & 3 {
            0 => Some(Shareability::NonShareable),
            2 => Some(Shareability::OuterShareable),
            3 => Some(Shareability::InnerShareable),
            _ => None,
        }
    }
}

/// Output address size (TCR.PS, ID_AA64MMFR0_EL1.PARange)
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum PhysicalAddressSize {
    Bits32 = 0,
    Bits36 = 1,
    Bits40 = 2,
    Bits42 = 3,
    Bits44 = 4,
    Bits48 = 5,
}

impl PhysicalAddressSize {
    pub const fn from_encoding(value: u64) -> Option<Self> {
        match value {
            0 => Some(PhysicalAddressSize::Bits32),
            1 => Some(PhysicalAddressSize::Bits36),
            2 => Some(PhysicalAddressSize::Bits40),
            3 => Some(PhysicalAddressSize::Bits42),
            4 => Some(PhysicalAddressSize::Bits44),
            5 => Some(PhysicalAddressSize::Bits48),
            _ => None,
        }
    }

    pub const fn bits(self) -> u32 {
        match self {
            PhysicalAddressSize::Bits32 => 32,
            PhysicalAddressSize::Bits36 => 36,
            PhysicalAddressSize::Bits40 => 40,
            PhysicalAddressSize::Bits42 => 42,
            PhysicalAddressSize::Bits44 => 44,
            PhysicalAddressSize::Bits48 => 48,
        }
    }

    /// First physical address past the range.
    pub const fn limit(self) -> u64 {
        1u64 << self.bits()
    }
}

/// Symbolic TCR request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TcrConfig {
    pub input_address_bits: u8,
    pub inner: Cacheability,
    pub outer: Cacheability,
    pub shareability: Shareability,
    pub physical_address_size: PhysicalAddressSize,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Tcr(u64);

impl Tcr {
    /// Smallest input range that still starts the walk at level 0
    pub const MIN_INPUT_BITS: u8 = 40;
    pub const MAX_INPUT_BITS: u8 = 48;

    /// RES1 bits of TCR_EL2 without E2H
    pub const RES1: u64 = (1 << 31) | (1 << 23);

    const T0SZ_SHIFT: u32 = 0;
    const IRGN0_SHIFT: u32 = 8;
    const ORGN0_SHIFT: u32 = 10;
    const SH0_SHIFT: u32 = 12;
    const TG0_SHIFT: u32 = 14;
    const PS_SHIFT: u32 = 16;

    /// TG0 encoding for the 4 KiB granule
    const TG0_4K: u64 = 0;

    pub fn encode(config: &TcrConfig) -> Result<Self> {
        let bits = config.input_address_bits;
        if !(Self::MIN_INPUT_BITS..=Self::MAX_INPUT_BITS).contains(&bits) {
            return Err(BootError::FieldOutOfRange {
                field: RegisterField::InputAddressSize,
                value: bits as u64,
            });
        }

        Ok(Tcr(Self::RES1
            | bm(Self::T0SZ_SHIFT, 6, 64 - bits as u64)
            | bm(Self::IRGN0_SHIFT, 2, config.inner as u64)
            | bm(Self::ORGN0_SHIFT, 2, config.outer as u64)
            | bm(Self::SH0_SHIFT, 2, config.shareability as u64)
            | bm(Self::TG0_SHIFT, 2, Self::TG0_4K)
            | bm(Self::PS_SHIFT, 3, config.physical_address_size as u64)))
    }

    pub const fn t0sz(&self) -> u8 {
        bits_shift(self.0, Self::T0SZ_SHIFT, 6) as u8
    }

    pub const fn input_address_bits(&self) -> u8 {
        64 - self.t0sz()
    }

    pub const fn inner_cacheability(&self) -> Cacheability {
        Cacheability::from_bits(bits_shift(self.0, Self::IRGN0_SHIFT, 2))
    }

    pub const fn outer_cacheability(&self) -> Cacheability {
        Cacheability::from_bits(bits_shift(self.0, Self::ORGN0_SHIFT, 2))
    }

    pub const fn shareability(&self) -> Option<Shareability> {
        Shareability::from_bits(bits_shift(self.0, Self::SH0_SHIFT, 2))
    }

    pub const fn granule_is_4k(&self) -> bool {
        bits_shift(self.0, Self::TG0_SHIFT, 2) == Self::TG0_4K
    }

    pub const fn physical_address_size(&self) -> Option<PhysicalAddressSize> {
        PhysicalAddressSize::from_encoding(bits_shift(self.0, Self::PS_SHIFT, 3))
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }
}

// ============================================================================
// SCTLR_EL2, HCR_EL2, SCR_EL3
// ============================================================================

bitflags! {
    /// SCTLR_EL2 (non-VHE layout)
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Sctlr: u64 {
        /// MMU enable
        const M = 1 << 0;
        /// Alignment check
        const A = 1 << 1;
        /// Data cache enable
        const C = 1 << 2;
        /// Stack alignment check
        const SA = 1 << 3;
        /// Instruction cache enable
        const I = 1 << 12;
        /// Write implies execute-never
        const WXN = 1 << 19;
        /// Big-endian data accesses
        const EE = 1 << 25;
        /// Reserved, must be one
        const RES1 = (1 << 4) | (1 << 5) | (1 << 11) | (1 << 16) | (1 << 18)
            | (1 << 22) | (1 << 23) | (1 << 28) | (1 << 29);
    }
}

impl Sctlr {
    /// Translation off, instruction cache on.
    pub const fn mmu_disabled() -> Self {
        Sctlr::RES1.union(Sctlr::I)
    }

    /// Translation and both caches on.
    pub const fn mmu_enabled() -> Self {
        Self::mmu_disabled().union(Sctlr::M).union(Sctlr::C)
    }

    pub const fn is_mmu_enabled(&self) -> bool {
        self.contains(Sctlr::M)
    }
}

bitflags! {
    /// HCR_EL2
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Hcr: u64 {
        /// Stage 2 translation enable
        const VM = 1 << 0;
        /// Set/way invalidation override
        const SWIO = 1 << 1;
        /// Route physical FIQ to EL2
        const FMO = 1 << 3;
        /// Route physical IRQ to EL2
        const IMO = 1 << 4;
        /// Route SError to EL2
        const AMO = 1 << 5;
        /// Trap SMC
        const TSC = 1 << 19;
        /// EL1 executes in AArch64
        const RW = 1 << 31;
    }
}

impl Hcr {
    pub const fn boot() -> Self {
        Hcr::RW
    }
}

bitflags! {
    /// SCR_EL3
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Scr: u64 {
        /// Lower levels are non-secure
        const NS = 1 << 0;
        /// Reserved, must be one
        const RES1 = 3 << 4;
        /// SMC disable
        const SMD = 1 << 7;
        /// HVC enable
        const HCE = 1 << 8;
        /// Next lower level is AArch64
        const RW = 1 << 10;
    }
}

impl Scr {
    pub const fn boot() -> Self {
        Scr::RES1.union(Scr::RW).union(Scr::NS)
    }
}

// ============================================================================
// Exception levels and SPSR
// ============================================================================

#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ExceptionLevel {
    El0 = 0,
    El1 = 1,
    El2 = 2,
    El3 = 3,
}

impl ExceptionLevel {
    /// Decode the CurrentEL register (level in bits [3:2]).
    pub const fn from_current_el(raw: u64) -> Self {
        match bits_shift(raw, 2, 2) {
            0 => ExceptionLevel::El0,
            1 => ExceptionLevel::El1,
            2 => ExceptionLevel::El2,
            _ => ExceptionLevel::El3,
        }
    }

    /// Mode that runs at this level on its own stack.
    pub const fn handler_mode(self) -> PsrMode {
        match self {
            ExceptionLevel::El0 => PsrMode::El0t,
            ExceptionLevel::El1 => PsrMode::El1h,
            ExceptionLevel::El2 => PsrMode::El2h,
            ExceptionLevel::El3 => PsrMode::El3h,
        }
    }
}

/// AArch64 PSTATE.M encodings
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PsrMode {
    El0t = 0x0,
    El1t = 0x4,
    El1h = 0x5,
    El2t = 0x8,
    El2h = 0x9,
    El3t = 0xc,
    El3h = 0xd,
}

impl PsrMode {
    pub const fn from_bits(bits: u64) -> Option<Self> {
        match bits & 0x1f {
            0x0 => Some(PsrMode::El0t),
            0x4 => Some(PsrMode::El1t),
            0x5 => Some(PsrMode::El1h),
            0x8 => Some(PsrMode::El2t),
            0x9 => Some(PsrMode::El2h),
            0xc => Some(PsrMode::El3t),
            0xd => Some(PsrMode::El3h),
            _ => None,
        }
    }
}

bitflags! {
    /// PSTATE exception masks
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct Daif: u64 {
        const D = 1 << 9;
        const A = 1 << 8;
        const I = 1 << 7;
        const F = 1 << 6;
    }
}

impl Daif {
    /// SError, IRQ and FIQ masked
    pub const INTERRUPTS: Daif = Daif::A.union(Daif::I).union(Daif::F);
}

/// Saved program status for an exception return
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Spsr(u64);

impl Spsr {
    const MODE_AARCH32: u64 = 1 << 4;

    pub const fn new(mode: PsrMode, mask: Daif) -> Self {
        Spsr(mask.bits() | mode as u64)
    }

    /// Enter `target` in its handler mode with every interrupt masked.
    pub const fn boot(target: ExceptionLevel) -> Self {
        Self::new(target.handler_mode(), Daif::INTERRUPTS)
    }

    pub const fn mode(&self) -> Option<PsrMode> {
        if is_bit_set(self.0, 4) {
            return None;
        }
        PsrMode::from_bits(self.0)
    }

    pub const fn mask(&self) -> Daif {
        Daif::from_bits_truncate(self.0)
    }

    pub const fn is_aarch32(&self) -> bool {
        self.0 & Self::MODE_AARCH32 != 0
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn boot_tcr() -> TcrConfig {
        TcrConfig {
            input_address_bits: 48,
            inner: Cacheability::WriteBackWriteAllocate,
            outer: Cacheability::WriteBackWriteAllocate,
            shareability: Shareability::InnerShareable,
            physical_address_size: PhysicalAddressSize::Bits40,
        }
    }

    #[test]
    fn test_mair_boot_value() {
        assert_eq!(Mair::boot().bits(), 0x00ff_0400);
    }

    #[test]
    fn test_mair_attribute_roundtrip() {
        for attr in MemoryAttribute::ALL {
            for index in 0..MAIR_SLOTS {
                let mair = Mair::empty().with(index, attr).unwrap();
                assert_eq!(mair.attribute_byte(index), attr.encoding());
                assert_eq!(mair.bits() >> (index * 8), attr.encoding() as u64);
                assert_eq!(mair.attribute(index), Some(attr));
            }
        }
    }

    #[test]
    fn test_mair_with_replaces_slot() {
        let mair = Mair::boot().with(2, MemoryAttribute::DeviceNgnre).unwrap();
        assert_eq!(mair.attribute(2), Some(MemoryAttribute::DeviceNgnre));
        assert_eq!(mair.attribute(0), Some(MemoryAttribute::DeviceNgnrne));
        assert_eq!(mair.attribute(3), Some(MemoryAttribute::DeviceNgnrne));
    }

    #[test]
    fn test_mair_index_out_of_range() {
        assert_eq!(
            Mair::empty().with(8, MemoryAttribute::NormalWriteBack),
            Err(BootError::FieldOutOfRange { field: RegisterField::MairIndex, value: 8 })
        );
        assert_eq!(Mair::boot().attribute(8), None);
    }

    #[test]
    fn test_tcr_fields() {
        let tcr = Tcr::encode(&boot_tcr()).unwrap();
        assert_eq!(tcr.t0sz(), 16);
        assert_eq!(tcr.input_address_bits(), 48);
        assert_eq!(tcr.inner_cacheability(), Cacheability::WriteBackWriteAllocate);
        assert_eq!(tcr.outer_cacheability(), Cacheability::WriteBackWriteAllocate);
        assert_eq!(tcr.shareability(), Some(Shareability::InnerShareable));
        assert!(tcr.granule_is_4k());
        assert_eq!(tcr.physical_address_size(), Some(PhysicalAddressSize::Bits40));
        assert_eq!(tcr.bits() & Tcr::RES1, Tcr::RES1);
        assert_eq!(tcr.bits(), 0x8082_3510);
    }

    #[test]
    fn test_tcr_rejects_input_size() {
        for bits in [0u8, 39, 49, 64] {
            let config = TcrConfig { input_address_bits: bits, ..boot_tcr() };
            assert_eq!(
                Tcr::encode(&config),
                Err(BootError::FieldOutOfRange {
                    field: RegisterField::InputAddressSize,
                    value: bits as u64
                })
            );
        }
        let config = TcrConfig { input_address_bits: 40, ..boot_tcr() };
        assert_eq!(Tcr::encode(&config).unwrap().t0sz(), 24);
    }

    #[test]
    fn test_sctlr() {
        assert!(!Sctlr::mmu_disabled().is_mmu_enabled());
        assert_eq!(Sctlr::mmu_disabled().bits(), 0x30C5_1830);
        let on = Sctlr::mmu_enabled();
        assert!(on.is_mmu_enabled());
        assert!(on.contains(Sctlr::C | Sctlr::I | Sctlr::RES1));
        assert!(!on.contains(Sctlr::EE));
    }

    #[test]
    fn test_level_transition_values() {
        assert_eq!(Hcr::boot().bits(), 1 << 31);
        assert_eq!(Scr::boot().bits(), 0x431);
        let spsr = Spsr::boot(ExceptionLevel::El2);
        assert_eq!(spsr.bits(), 0x1C9);
        assert_eq!(spsr.mode(), Some(PsrMode::El2h));
        assert!(spsr.mask().contains(Daif::INTERRUPTS));
        assert!(!spsr.is_aarch32());
        assert_eq!(Spsr::boot(ExceptionLevel::El1).bits(), 0x1C5);
    }

    #[test]
    fn test_current_el() {
        assert_eq!(ExceptionLevel::from_current_el(0b1100), ExceptionLevel::El3);
        assert_eq!(ExceptionLevel::from_current_el(0b1000), ExceptionLevel::El2);
        assert_eq!(ExceptionLevel::from_current_el(0b0100), ExceptionLevel::El1);
        assert!(ExceptionLevel::El3 > ExceptionLevel::El2);
    }
}
