// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Boot Error Codes
//!
//! Every failure the bring-up path can detect. None of them is recoverable:
//! the boot sequencer halts on the first one, before the MMU-enable write
//! when the failure belongs to table or fixmap construction.
//!
//! | Class     | Variants                                                  |
//! |-----------|-----------------------------------------------------------|
//! | Layout    | `LayoutOverlap`, `LayoutMisaligned`, `LayoutOutOfWindow`, `LayoutNotPacked`, `FixmapSlotOutOfRange` |
//! | Alignment | `Misaligned`, `AddressOutOfRange`                         |
//! | Conflict  | `RangeConflict`                                           |
//! | Resources | `TablePoolExhausted`                                      |
//! | Registers | `FieldOutOfRange`, `UnsupportedPhysicalAddressSize`       |
//! | Sequence  | `FixmapLive`, `FixmapNotReserved`, `OutOfOrder`, `UnsupportedExceptionLevel` |

use core::fmt;

use crate::kernel::arch::arm64::boot::BootState;
use crate::kernel::arch::arm64::registers::{ExceptionLevel, PhysicalAddressSize, RegisterField};
use crate::kernel::vm::layout::RegionName;
use crate::kernel::vm::{PAddr, VAddr};

/// Result alias used by the whole boot path
pub type Result<T = ()> = core::result::Result<T, BootError>;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BootError {
    /// Two layout regions share virtual addresses
    LayoutOverlap { first: RegionName, second: RegionName },

    /// A layout region base or size is not page aligned, or a region of
    /// 2 MiB or more is not 2 MiB aligned
    LayoutMisaligned { region: RegionName },

    /// A layout region leaves the window of its top-level table slot
    LayoutOutOfWindow { region: RegionName },

    /// A layout region does not start where the previous one ends
    LayoutNotPacked { region: RegionName, expected: VAddr },

    /// Fixmap slot index beyond the fixmap region
    FixmapSlotOutOfRange { slot: usize },

    /// Mapping range not page aligned at its start or end
    Misaligned { vaddr: VAddr, paddr: PAddr, size: u64 },

    /// Mapping range beyond the configured input or output address size
    AddressOutOfRange { vaddr: VAddr, paddr: PAddr, size: u64 },

    /// A page is already mapped with a different descriptor
    RangeConflict { vaddr: VAddr, existing: u64, requested: u64 },

    /// The static table pool has no free table left
    TablePoolExhausted,

    /// A register field value is not representable
    FieldOutOfRange { field: RegisterField, value: u64 },

    /// Configured PA size exceeds what the core implements
    UnsupportedPhysicalAddressSize {
        requested: PhysicalAddressSize,
        supported: PhysicalAddressSize,
    },

    /// Fixmap slot remap attempted after the tables went live
    FixmapLive { slot: usize },

    /// Fixmap used before its level 3 table was reserved
    FixmapNotReserved,

    /// Boot step requested from the wrong state
    OutOfOrder { expected: BootState, actual: BootState },

    /// Boot entered below the target exception level
    UnsupportedExceptionLevel { current: ExceptionLevel, target: ExceptionLevel },
}

impl BootError {
    /// Stable numeric code, printed by the pre-MMU halt path.
    pub const fn code(&self) -> u32 {
        match self {
            BootError::LayoutOverlap { .. } => 1,
            BootError::LayoutMisaligned { .. } => 2,
            BootError::LayoutOutOfWindow { .. } => 3,
            BootError::FixmapSlotOutOfRange { .. } => 4,
            BootError::Misaligned { .. } => 5,
            BootError::AddressOutOfRange { .. } => 6,
            BootError::RangeConflict { .. } => 7,
            BootError::TablePoolExhausted => 8,
            BootError::FieldOutOfRange { .. } => 9,
            BootError::UnsupportedPhysicalAddressSize { .. } => 10,
            BootError::FixmapLive { .. } => 11,
            BootError::FixmapNotReserved => 12,
            BootError::OutOfOrder { .. } => 13,
            BootError::UnsupportedExceptionLevel { .. } => 14,
            BootError::LayoutNotPacked { .. } => 15,
        }
    }

    /// The address or index that identifies the failing item, if any.
    pub const fn detail(&self) -> u64 {
        match *self {
            BootError::FixmapSlotOutOfRange { slot } | BootError::FixmapLive { slot } => slot as u64,
            BootError::Misaligned { vaddr, .. }
            | BootError::AddressOutOfRange { vaddr, .. }
            | BootError::RangeConflict { vaddr, .. } => vaddr,
            BootError::FieldOutOfRange { value, .. } => value,
            BootError::LayoutMisaligned { region }
            | BootError::LayoutOutOfWindow { region }
            | BootError::LayoutNotPacked { region, .. } => region as u64,
            BootError::LayoutOverlap { first, .. } => first as u64,
            _ => 0,
        }
    }
}

impl fmt::Display for BootError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BootError::LayoutOverlap { first, second } => {
                write!(f, "layout regions {} and {} overlap", first, second)
            }
            BootError::LayoutMisaligned { region } => {
                write!(f, "layout region {} is misaligned", region)
            }
            BootError::LayoutNotPacked { region, expected } => {
                write!(f, "layout region {} does not start at {:#x}", region, expected)
            }
            BootError::LayoutOutOfWindow { region } => {
                write!(f, "layout region {} leaves the addressable window", region)
            }
            BootError::FixmapSlotOutOfRange { slot } => {
                write!(f, "fixmap slot {} is outside the fixmap region", slot)
            }
            BootError::Misaligned { vaddr, paddr, size } => write!(
                f,
                "range {:#x} -> {:#x} ({:#x} bytes) is not page aligned",
                vaddr, paddr, size
            ),
            BootError::AddressOutOfRange { vaddr, paddr, size } => write!(
                f,
                "range {:#x} -> {:#x} ({:#x} bytes) exceeds the address size",
                vaddr, paddr, size
            ),
            BootError::RangeConflict { vaddr, existing, requested } => write!(
                f,
                "page {:#x} already mapped as {:#x}, requested {:#x}",
                vaddr, existing, requested
            ),
            BootError::TablePoolExhausted => write!(f, "translation table pool exhausted"),
            BootError::FieldOutOfRange { field, value } => {
                write!(f, "register field {:?} cannot hold {:#x}", field, value)
            }
            BootError::UnsupportedPhysicalAddressSize { requested, supported } => write!(
                f,
                "physical address size {} bits exceeds supported {} bits",
                requested.bits(),
                supported.bits()
            ),
            BootError::FixmapLive { slot } => {
                write!(f, "fixmap slot {} cannot be remapped once live", slot)
            }
            BootError::FixmapNotReserved => write!(f, "fixmap table not reserved"),
            BootError::OutOfOrder { expected, actual } => {
                write!(f, "boot step needs state {:?}, sequencer is in {:?}", expected, actual)
            }
            BootError::UnsupportedExceptionLevel { current, target } => {
                write!(f, "entered at {:?}, cannot raise to {:?}", current, target)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_are_distinct() {
        let errors = [
            BootError::LayoutOverlap { first: RegionName::Hypervisor, second: RegionName::Fixmap },
            BootError::LayoutMisaligned { region: RegionName::BootStack },
            BootError::LayoutOutOfWindow { region: RegionName::Fixmap },
            BootError::LayoutNotPacked { region: RegionName::Fixmap, expected: 0 },
            BootError::FixmapSlotOutOfRange { slot: 600 },
            BootError::Misaligned { vaddr: 0, paddr: 0, size: 0x1001 },
            BootError::AddressOutOfRange { vaddr: 0, paddr: 0, size: 0 },
            BootError::RangeConflict { vaddr: 0x1000, existing: 0, requested: 0 },
            BootError::TablePoolExhausted,
            BootError::FieldOutOfRange { field: RegisterField::MairIndex, value: 8 },
            BootError::FixmapLive { slot: 0 },
            BootError::FixmapNotReserved,
        ];
        for (i, a) in errors.iter().enumerate() {
            for b in &errors[i + 1..] {
                assert_ne!(a.code(), b.code());
            }
        }
    }

    #[test]
    fn test_detail_identifies_item() {
        assert_eq!(BootError::FixmapSlotOutOfRange { slot: 513 }.detail(), 513);
        assert_eq!(
            BootError::RangeConflict { vaddr: 0x1000, existing: 1, requested: 2 }.detail(),
            0x1000
        );
    }

    #[test]
    fn test_display_names_item() {
        assert_eq!(
            BootError::Misaligned { vaddr: 0x20_0000, paddr: 0x8_0000, size: 0x1001 }.to_string(),
            "range 0x200000 -> 0x80000 (0x1001 bytes) is not page aligned"
        );
        assert_eq!(
            BootError::LayoutMisaligned { region: RegionName::Hypervisor }.to_string(),
            "layout region hypervisor is misaligned"
        );
        assert_eq!(
            BootError::LayoutNotPacked { region: RegionName::BootStack, expected: 0x80_0060_0000 }
                .to_string(),
            "layout region boot-stack does not start at 0x8000600000"
        );
        assert_eq!(
            BootError::FixmapLive { slot: 2 }.to_string(),
            "fixmap slot 2 cannot be remapped once live"
        );
    }
}
