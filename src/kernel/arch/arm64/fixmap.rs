// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM64 Fixmap
//!
//! A 2 MiB window of single-page slots, each mapping one device page with
//! the device memory attribute. Drivers reach their registers through the
//! slot address, so they do not depend on where the device sits in the
//! physical map.
//!
//! The window is covered by exactly one level 3 table, reserved from the
//! boot table tree before any slot is written. Slot `n` is entry `n` of that
//! table. Once the tables are live the slots are frozen.

use crate::err::{BootError, Result};
use crate::kernel::arch::arm64::boot_mmu::{MapRange, TableId, TranslationTables};
use crate::kernel::arch::arm64::mmu::{table_index, Descriptor, PageAttributes};
use crate::kernel::vm::layout::{Region, FIXMAP_SLOTS, FIXMAP_VIRT_START};
use crate::kernel::vm::{PAddr, VAddr, PAGE_MASK, PAGE_SIZE};
use crate::platform::{AUX_BASE, GPIO_BASE, UART0_BASE};

// ============================================================================
// Static Slots
// ============================================================================

pub const FIXMAP_UART: usize = 0;
pub const FIXMAP_GPIO: usize = 1;
pub const FIXMAP_PL011: usize = 2;

/// Devices with a reserved fixmap slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FixmapDevice {
    MiniUart,
    Gpio,
    Pl011,
}

impl FixmapDevice {
    pub const ALL: [FixmapDevice; 3] = [FixmapDevice::MiniUart, FixmapDevice::Gpio, FixmapDevice::Pl011];

    pub const fn slot(self) -> usize {
        match self {
            FixmapDevice::MiniUart => FIXMAP_UART,
            FixmapDevice::Gpio => FIXMAP_GPIO,
            FixmapDevice::Pl011 => FIXMAP_PL011,
        }
    }

    /// Physical address of the first register.
    pub const fn phys_base(self) -> PAddr {
        match self {
            FixmapDevice::MiniUart => AUX_BASE,
            FixmapDevice::Gpio => GPIO_BASE,
            FixmapDevice::Pl011 => UART0_BASE,
        }
    }

    pub const fn phys_page(self) -> PAddr {
        self.phys_base() & !PAGE_MASK
    }

    /// Register window through the fixmap, valid once the MMU is on.
    pub const fn virtual_base(self) -> VAddr {
        FIXMAP_VIRT_START + self.slot() as u64 * PAGE_SIZE + (self.phys_base() & PAGE_MASK)
    }

    pub const fn name(self) -> &'static str {
        match self {
            FixmapDevice::MiniUart => "mini-uart",
            FixmapDevice::Gpio => "gpio",
            FixmapDevice::Pl011 => "pl011",
        }
    }
}

const _: () = assert!(FIXMAP_PL011 < FIXMAP_SLOTS);

/// Mini UART registers through the fixmap
pub const fn early_uart_virtual_address() -> VAddr {
    FixmapDevice::MiniUart.virtual_base()
}

// ============================================================================
// Fixmap Manager
// ============================================================================

pub struct Fixmap {
    region: Region,
    table: Option<TableId>,
    live: bool,
}

impl Fixmap {
    pub const fn new(region: Region) -> Self {
        Self { region, table: None, live: false }
    }

    /// Reserve the level 3 table backing the window.
    pub fn reserve(&mut self, tables: &mut TranslationTables<'_>) -> Result {
        if self.table.is_none() {
            self.table = Some(tables.walk_create(self.region.base, 3)?);
        }
        Ok(())
    }

    pub fn slot_virtual_address(&self, slot: usize) -> Result<VAddr> {
        if slot as u64 >= self.region.size / PAGE_SIZE {
            return Err(BootError::FixmapSlotOutOfRange { slot });
        }
        Ok(self.region.base + slot as u64 * PAGE_SIZE)
    }

    /// Map `slot` to the device page at `phys_page`.
    ///
    /// Writing the same page again is a no-op. Changing a slot is refused
    /// once the window is live.
    pub fn map_slot(&mut self, tables: &mut TranslationTables<'_>, slot: usize, phys_page: PAddr) -> Result {
        let table = self.table.ok_or(BootError::FixmapNotReserved)?;
        let vaddr = self.slot_virtual_address(slot)?;
        let attrs = PageAttributes::device();
        tables.check_range(&MapRange::new(vaddr, phys_page, PAGE_SIZE, attrs))?;

        let index = table_index(vaddr, 3);
        let desc = Descriptor::page(phys_page, attrs);
        if tables.entry(table, index) == desc {
            return Ok(());
        }
        if self.live {
            return Err(BootError::FixmapLive { slot });
        }
        tables.set_entry(table, index, desc);
        Ok(())
    }

    /// Physical page currently behind `slot`.
    #[cfg(test)]
    pub fn lookup(&self, tables: &TranslationTables<'_>, slot: usize) -> Option<PAddr> {
        let table = self.table?;
        let vaddr = self.slot_virtual_address(slot).ok()?;
        let desc = tables.entry(table, table_index(vaddr, 3));
        desc.is_valid().then(|| desc.output_address())
    }

    /// Freeze the slots; called right before translation is enabled.
    pub fn seal(&mut self) {
        self.live = true;
    }

    pub fn is_live(&self) -> bool {
        self.live
    }
}
