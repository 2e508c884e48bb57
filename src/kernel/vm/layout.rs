// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Hypervisor Virtual Address Layout
//!
//! The hypervisor runs in a single level 0 slot of the EL2 translation
//! regime. Its regions are packed back to back from [`LAYOUT_BASE`]:
//!
//! | Region      | Offset  | Size      | Contents                        |
//! |-------------|---------|-----------|---------------------------------|
//! | hypervisor  | 0       | 2 MiB     | image text, data and bss        |
//! | fixmap      | 2 MiB   | 2 MiB     | one page per device slot        |
//! | boot-stack  | 4 MiB   | 16 KiB    | alias of the boot stack pages   |
//!
//! The fixmap is exactly one level 3 table wide and 2 MiB aligned, so every
//! slot lives in the same table. The layout is checked when the crate is
//! compiled; a bad constant fails the build rather than the boot.

use core::fmt;

use crate::bits::is_aligned;
use crate::err::{BootError, Result};
use crate::kernel::vm::{is_page_aligned, VAddr, PAGE_SIZE, SECTION_SIZE};

// ============================================================================
// Layout Constants
// ============================================================================

/// Span of one level 0 table entry
pub const TOP_LEVEL_SPAN: u64 = 1 << 39;

/// Highest virtual address reachable with a 48-bit input range
pub const VIRTUAL_ADDRESS_LIMIT: u64 = 1 << 48;

/// Start of the packed layout: level 0 slot 1, leaving the first 2 MiB free
pub const LAYOUT_BASE: VAddr = TOP_LEVEL_SPAN + SECTION_SIZE;

/// Hypervisor image region size
pub const HYP_SIZE: u64 = 2 * 1024 * 1024;

/// Fixmap region size
pub const FIXMAP_SIZE: u64 = 2 * 1024 * 1024;

/// Boot stack size
pub const STACK_SIZE: u64 = 4 * PAGE_SIZE;

/// Number of page slots in the fixmap
pub const FIXMAP_SLOTS: usize = (FIXMAP_SIZE / PAGE_SIZE) as usize;

/// The layout used by the image
pub const HYP_LAYOUT: VirtualLayout =
    VirtualLayout::packed(LAYOUT_BASE, HYP_SIZE, FIXMAP_SIZE, STACK_SIZE);

const _: () = assert!(HYP_LAYOUT.validate().is_ok(), "invalid hypervisor layout");

pub const HYP_VIRT_START: VAddr = HYP_LAYOUT.region_of(RegionName::Hypervisor).base;
pub const FIXMAP_VIRT_START: VAddr = HYP_LAYOUT.region_of(RegionName::Fixmap).base;
pub const BOOT_STACK_VIRT_START: VAddr = HYP_LAYOUT.region_of(RegionName::BootStack).base;

// ============================================================================
// Regions
// ============================================================================

/// Named layout regions
#[repr(u8)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RegionName {
    Hypervisor = 0,
    Fixmap = 1,
    BootStack = 2,
}

impl RegionName {
    pub const ALL: [RegionName; 3] = [RegionName::Hypervisor, RegionName::Fixmap, RegionName::BootStack];

    pub const fn as_str(self) -> &'static str {
        match self {
            RegionName::Hypervisor => "hypervisor",
            RegionName::Fixmap => "fixmap",
            RegionName::BootStack => "boot-stack",
        }
    }
}

impl fmt::Display for RegionName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A virtual region
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Region {
    pub base: VAddr,
    pub size: u64,
}

impl Region {
    pub const fn new(base: VAddr, size: u64) -> Self {
        Self { base, size }
    }

    /// End address (exclusive)
    pub const fn end(&self) -> VAddr {
        self.base + self.size
    }

    pub const fn overlaps(&self, other: &Region) -> bool {
        self.base < other.end() && other.base < self.end()
    }
}

// ============================================================================
// Layout Table
// ============================================================================

/// Immutable description of the hypervisor's virtual regions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VirtualLayout {
    top_base: VAddr,
    regions: [Region; 3],
}

impl VirtualLayout {
    /// Pack the regions consecutively from `top_base`.
    pub const fn packed(top_base: VAddr, hyp_size: u64, fixmap_size: u64, stack_size: u64) -> Self {
        let hyp = Region::new(top_base, hyp_size);
        let fixmap = Region::new(hyp.end(), fixmap_size);
        let stack = Region::new(fixmap.end(), stack_size);
        Self { top_base, regions: [hyp, fixmap, stack] }
    }

    /// Build a layout from explicit regions, indexed by [`RegionName`].
    pub const fn from_regions(top_base: VAddr, regions: [Region; 3]) -> Self {
        Self { top_base, regions }
    }

    pub const fn top_base(&self) -> VAddr {
        self.top_base
    }

    pub const fn region_of(&self, name: RegionName) -> Region {
        self.regions[name as usize]
    }

    /// Virtual address of fixmap slot `slot`.
    pub const fn fixmap_address(&self, slot: usize) -> Result<VAddr> {
        let fixmap = self.region_of(RegionName::Fixmap);
        if slot as u64 >= fixmap.size / PAGE_SIZE {
            return Err(BootError::FixmapSlotOutOfRange { slot });
        }
        Ok(fixmap.base + slot as u64 * PAGE_SIZE)
    }

    /// Check alignment, containment, packing and disjointness of every
    /// region.
    ///
    /// Regions of 2 MiB or more must be 2 MiB aligned so they own whole
    /// level 3 tables. All regions must sit inside the level 0 slot that
    /// holds `top_base`, in [`RegionName`] order with no gap between them.
    pub const fn validate(&self) -> Result {
        let slot_start = self.top_base & !(TOP_LEVEL_SPAN - 1);
        let slot_end = slot_start + TOP_LEVEL_SPAN;

        let mut i = 0;
        while i < self.regions.len() {
            let region = self.regions[i];
            let name = RegionName::ALL[i];

            if region.size == 0 || !is_page_aligned(region.base) || !is_page_aligned(region.size) {
                return Err(BootError::LayoutMisaligned { region: name });
            }
            if region.size >= SECTION_SIZE
                && (!is_aligned(region.base, SECTION_SIZE) || !is_aligned(region.size, SECTION_SIZE))
            {
                return Err(BootError::LayoutMisaligned { region: name });
            }
            if region.base < self.top_base
                || region.base > slot_end
                || region.size > slot_end - region.base
                || slot_end > VIRTUAL_ADDRESS_LIMIT
            {
                return Err(BootError::LayoutOutOfWindow { region: name });
            }

            let expected = if i == 0 { self.top_base } else { self.regions[i - 1].end() };
            if region.base != expected {
                return Err(BootError::LayoutNotPacked { region: name, expected });
            }

            let mut j = i + 1;
            while j < self.regions.len() {
                if region.overlaps(&self.regions[j]) {
                    return Err(BootError::LayoutOverlap { first: name, second: RegionName::ALL[j] });
                }
                j += 1;
            }
            i += 1;
        }
        Ok(())
    }
}

/// Region lookup in the image layout
pub const fn region_of(name: RegionName) -> Region {
    HYP_LAYOUT.region_of(name)
}

/// Fixmap slot address in the image layout
pub const fn fixmap_address(slot: usize) -> Result<VAddr> {
    HYP_LAYOUT.fixmap_address(slot)
}


