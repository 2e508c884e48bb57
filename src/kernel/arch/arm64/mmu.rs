// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM64 Translation Table Format
//!
//! VMSAv8-64 stage 1 descriptors for the 4 KiB granule, as used by the
//! EL2 regime. Four levels, 512 entries per table, 9 index bits per level:
//!
//! | Level | Shift | Entry covers |
//! |-------|-------|--------------|
//! | 0     | 39    | 512 GiB      |
//! | 1     | 30    | 1 GiB        |
//! | 2     | 21    | 2 MiB        |
//! | 3     | 12    | 4 KiB        |

use bitflags::bitflags;

use crate::bits::{bits_shift, bm};
use crate::kernel::arch::arm64::registers::{MemoryAttribute, Shareability};
use crate::kernel::vm::{PAddr, VAddr, PAGE_SHIFT};

// ============================================================================
// Geometry
// ============================================================================

pub const MMU_LEVELS: u8 = 4;
pub const MMU_INDEX_BITS: u32 = 9;
pub const MMU_ENTRIES_PER_TABLE: usize = 1 << MMU_INDEX_BITS;

/// Address shift selecting the index at `level`.
pub const fn level_shift(level: u8) -> u32 {
    PAGE_SHIFT + MMU_INDEX_BITS * (MMU_LEVELS as u32 - 1 - level as u32)
}

/// Bytes covered by one entry at `level`.
pub const fn level_size(level: u8) -> u64 {
    1 << level_shift(level)
}

/// Index into the table at `level` for `vaddr`.
pub const fn table_index(vaddr: VAddr, level: u8) -> usize {
    ((vaddr >> level_shift(level)) & 0x1FF) as usize
}

const _: () = assert!(level_shift(3) == 12);
const _: () = assert!(level_shift(0) == 39);
const _: () = assert!(core::mem::size_of::<PageTable>() == 4096);

// ============================================================================
// Descriptor bits
// ============================================================================

pub const MMU_PTE_DESCRIPTOR_INVALID: u64 = bm(0, 2, 0);
pub const MMU_PTE_DESCRIPTOR_MASK: u64 = bm(0, 2, 3);

// L0/L1/L2 descriptor types
pub const MMU_PTE_L012_DESCRIPTOR_BLOCK: u64 = bm(0, 2, 1);
pub const MMU_PTE_L012_DESCRIPTOR_TABLE: u64 = bm(0, 2, 3);

// L3 descriptor types
pub const MMU_PTE_L3_DESCRIPTOR_PAGE: u64 = bm(0, 2, 3);

pub const MMU_PTE_OUTPUT_ADDR_MASK: u64 = bm(12, 36, 0xf_ffff_ffff);

const MMU_PTE_ATTR_INDEX_SHIFT: u32 = 2;
const MMU_PTE_ATTR_SH_SHIFT: u32 = 8;

/// AP[1], reserved one in the EL2 regime
pub const MMU_PTE_ATTR_AP_RES1: u64 = 1 << 6;
/// AP[2], read-only
pub const MMU_PTE_ATTR_AP_RO: u64 = 1 << 7;
pub const MMU_PTE_ATTR_AF: u64 = 1 << 10;
/// Execute-never (XN for EL2)
pub const MMU_PTE_ATTR_XN: u64 = 1 << 54;

bitflags! {
    /// Access rights of a leaf mapping at EL2
    #[derive(Debug, Clone, Copy, PartialEq, Eq)]
    pub struct AccessRights: u8 {
        const READ = 1 << 0;
        const WRITE = 1 << 1;
        const EXECUTE = 1 << 2;
    }
}

impl AccessRights {
    pub const RW: AccessRights = AccessRights::READ.union(AccessRights::WRITE);
    pub const RX: AccessRights = AccessRights::READ.union(AccessRights::EXECUTE);
    pub const RWX: AccessRights = AccessRights::all();
}

/// Memory type and permissions of a leaf mapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PageAttributes {
    pub memory: MemoryAttribute,
    pub access: AccessRights,
}

impl PageAttributes {
    pub const fn normal(access: AccessRights) -> Self {
        Self { memory: MemoryAttribute::NormalWriteBack, access }
    }

    /// Device registers: read/write, never executable.
    pub const fn device() -> Self {
        Self { memory: MemoryAttribute::DeviceNgnre, access: AccessRights::RW }
    }

    pub const fn shareability(&self) -> Shareability {
        if self.memory.is_device() {
            Shareability::NonShareable
        } else {
            Shareability::InnerShareable
        }
    }

    const fn leaf_bits(&self) -> u64 {
        let mut bits = MMU_PTE_ATTR_AF
            | MMU_PTE_ATTR_AP_RES1
            | bm(MMU_PTE_ATTR_INDEX_SHIFT, 3, self.memory.index() as u64)
            | bm(MMU_PTE_ATTR_SH_SHIFT, 2, self.shareability() as u64);
        if !self.access.contains(AccessRights::WRITE) {
            bits |= MMU_PTE_ATTR_AP_RO;
        }
        if !self.access.contains(AccessRights::EXECUTE) {
            bits |= MMU_PTE_ATTR_XN;
        }
        bits
    }
}

// ============================================================================
// Descriptors
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DescriptorKind {
    Invalid,
    Table,
    Block,
    Page,
    /// Encoding with no meaning at this level
    Reserved,
}

/// One translation table entry
#[repr(transparent)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Descriptor(u64);

impl Descriptor {
    pub const INVALID: Descriptor = Descriptor(MMU_PTE_DESCRIPTOR_INVALID);

    /// Level 0-2 entry pointing at the next level table.
    pub const fn table(next: PAddr) -> Self {
        Descriptor((next & MMU_PTE_OUTPUT_ADDR_MASK) | MMU_PTE_L012_DESCRIPTOR_TABLE)
    }

    /// Level 3 entry mapping one page.
    pub const fn page(paddr: PAddr, attrs: PageAttributes) -> Self {
        Descriptor((paddr & MMU_PTE_OUTPUT_ADDR_MASK) | attrs.leaf_bits() | MMU_PTE_L3_DESCRIPTOR_PAGE)
    }

    /// Level 1 or 2 entry mapping a whole block.
    pub const fn block(paddr: PAddr, attrs: PageAttributes) -> Self {
        Descriptor((paddr & MMU_PTE_OUTPUT_ADDR_MASK) | attrs.leaf_bits() | MMU_PTE_L012_DESCRIPTOR_BLOCK)
    }

    pub const fn bits(&self) -> u64 {
        self.0
    }

    pub const fn is_valid(&self) -> bool {
        self.0 & 1 != 0
    }

    pub const fn kind(&self, level: u8) -> DescriptorKind {
        match (self.0 & MMU_PTE_DESCRIPTOR_MASK, level) {
            (0, _) | (2, _) => DescriptorKind::Invalid,
            (3, 3) => DescriptorKind::Page,
            (3, _) => DescriptorKind::Table,
            (_, 1) | (_, 2) => DescriptorKind::Block,
            _ => DescriptorKind::Reserved,
        }
    }

    pub const fn output_address(&self) -> PAddr {
        self.0 & MMU_PTE_OUTPUT_ADDR_MASK
    }

    /// MAIR slot selected by a leaf entry.
    pub const fn attr_index(&self) -> u8 {
        bits_shift(self.0, MMU_PTE_ATTR_INDEX_SHIFT, 3) as u8
    }

    pub const fn shareability(&self) -> Option<Shareability> {
        Shareability::from_bits(bits_shift(self.0, MMU_PTE_ATTR_SH_SHIFT, 2))
    }

    pub const fn access(&self) -> AccessRights {
        let mut access = AccessRights::READ;
        if self.0 & MMU_PTE_ATTR_AP_RO == 0 {
            access = access.union(AccessRights::WRITE);
        }
        if self.0 & MMU_PTE_ATTR_XN == 0 {
            access = access.union(AccessRights::EXECUTE);
        }
        access
    }
}

/// A 4 KiB aligned table of 512 descriptors
#[repr(C, align(4096))]
#[derive(Clone)]
pub struct PageTable {
    entries: [Descriptor; MMU_ENTRIES_PER_TABLE],
}

impl PageTable {
    pub const fn new() -> Self {
        Self { entries: [Descriptor::INVALID; MMU_ENTRIES_PER_TABLE] }
    }

    pub fn entry(&self, index: usize) -> Descriptor {
        self.entries[index]
    }

    pub fn set_entry(&mut self, index: usize, desc: Descriptor) {
        self.entries[index] = desc;
    }
}
