// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM64 Boot Sequencer
//!
//! Drives the core from reset to running through the hypervisor virtual map:
//!
//! ```text
//! Reset -> TablesBuilt -> FixmapReady -> MmuEnabled -> LevelTransitioned -> Running
//!                                                   \_____________________/
//!                                                    already at the target level
//! ```
//!
//! Each step checks the current state and refuses to run out of order, so the
//! SCTLR write that turns translation on is only reachable once the tables
//! and the fixmap are complete. Every check that can fail happens before the
//! first register write of its step.

use core::cmp::Ordering;

use crate::err::{BootError, Result};
use crate::kernel::arch::arm64::boot_mmu::{MapRange, TableArena, TranslationTables};
use crate::kernel::arch::arm64::fixmap::{Fixmap, FixmapDevice};
use crate::kernel::arch::arm64::mmu::{AccessRights, PageAttributes};
use crate::kernel::arch::arm64::registers::{
    ExceptionLevel, Hcr, Mair, Scr, Sctlr, Spsr, Tcr,
};
use crate::kernel::arch::arm64::sysreg::SystemRegisters;
use crate::kernel::config::BootConfig;
use crate::kernel::vm::layout::{
    region_of, RegionName, BOOT_STACK_VIRT_START, HYP_SIZE, HYP_VIRT_START, STACK_SIZE,
};
use crate::kernel::vm::{PAddr, VAddr};

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum BootState {
    Reset,
    TablesBuilt,
    FixmapReady,
    MmuEnabled,
    LevelTransitioned,
    Running,
}

/// Arguments handed over by the reset entry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootArgs {
    /// Load address minus link address
    pub boot_phys_offset: u64,
    /// Physical address of the device tree blob, passed through untouched
    pub fdt_paddr: PAddr,
}

impl BootArgs {
    pub const fn new(boot_phys_offset: u64, fdt_paddr: PAddr) -> Self {
        Self { boot_phys_offset, fdt_paddr }
    }

    /// Physical address backing a link-time virtual address of the image.
    pub const fn virt_to_phys(&self, vaddr: VAddr) -> PAddr {
        vaddr.wrapping_add(self.boot_phys_offset)
    }

    /// Link-time virtual address of a physical address inside the image.
    pub const fn phys_to_virt(&self, paddr: PAddr) -> VAddr {
        paddr.wrapping_sub(self.boot_phys_offset)
    }

    /// x0 and x1 for the entry at the target level.
    pub const fn registers(&self) -> [u64; 2] {
        [self.boot_phys_offset, self.fdt_paddr]
    }
}

/// The mappings needed to turn the MMU on and keep running.
///
/// The identity map covers the loaded image so the instruction after the
/// SCTLR write still fetches. The hypervisor map places the same pages at the
/// link address, and the stack pages get a non-executable alias in the stack
/// region.
pub fn boot_ranges(args: &BootArgs, stack_phys: PAddr) -> [MapRange; 3] {
    let hyp_phys = args.virt_to_phys(HYP_VIRT_START);
    let code = PageAttributes::normal(AccessRights::RWX);
    [
        MapRange::identity(hyp_phys, HYP_SIZE, code),
        MapRange::new(HYP_VIRT_START, hyp_phys, HYP_SIZE, code),
        MapRange::new(
            BOOT_STACK_VIRT_START,
            stack_phys,
            STACK_SIZE,
            PageAttributes::normal(AccessRights::RW),
        ),
    ]
}

/// Slot assignments populated before the MMU is enabled.
pub fn boot_fixmap_slots() -> [(usize, PAddr); 3] {
    FixmapDevice::ALL.map(|device| (device.slot(), device.phys_page()))
}

pub struct BootSequencer<'a, R: SystemRegisters> {
    regs: R,
    tables: TranslationTables<'a>,
    fixmap: Fixmap,
    config: BootConfig,
    state: BootState,
}

impl<'a, R: SystemRegisters> BootSequencer<'a, R> {
    pub fn new(regs: R, arena: TableArena<'a>, config: &BootConfig) -> Result<Self> {
        let tables = TranslationTables::new(arena, config.va_limit(), config.pa_limit())?;
        Ok(Self {
            regs,
            tables,
            fixmap: Fixmap::new(region_of(RegionName::Fixmap)),
            config: *config,
            state: BootState::Reset,
        })
    }

    pub fn state(&self) -> BootState {
        self.state
    }

    pub fn tables(&self) -> &TranslationTables<'a> {
        &self.tables
    }

    pub fn fixmap(&self) -> &Fixmap {
        &self.fixmap
    }

    fn expect(&self, expected: BootState) -> Result {
        if self.state != expected {
            return Err(BootError::OutOfOrder { expected, actual: self.state });
        }
        Ok(())
    }

    /// Reset -> TablesBuilt: install the identity and hypervisor mappings.
    pub fn build_tables(&mut self, ranges: &[MapRange]) -> Result {
        self.expect(BootState::Reset)?;
        self.tables.map_all(ranges)?;
        self.state = BootState::TablesBuilt;
        Ok(())
    }

    /// TablesBuilt -> FixmapReady: reserve the fixmap table and fill `slots`.
    pub fn populate_fixmap(&mut self, slots: &[(usize, PAddr)]) -> Result {
        self.expect(BootState::TablesBuilt)?;
        self.fixmap.reserve(&mut self.tables)?;
        for &(slot, phys_page) in slots {
            self.fixmap.map_slot(&mut self.tables, slot, phys_page)?;
        }
        self.state = BootState::FixmapReady;
        Ok(())
    }

    /// FixmapReady -> MmuEnabled: program MAIR, TCR and TTBR0, then SCTLR.
    ///
    /// The exception level and the hardware PA size are checked, and both
    /// register values encoded, before anything is written.
    ///
    /// # Safety
    ///
    /// The installed ranges must map the executing code and the current stack
    /// at their present addresses.
    pub unsafe fn enable_mmu(&mut self) -> Result {
        self.expect(BootState::FixmapReady)?;

        let current = self.regs.current_el();
        let target = self.config.target_level;
        if current < target {
            return Err(BootError::UnsupportedExceptionLevel { current, target });
        }

        let requested = self.config.tcr.physical_address_size;
        let supported = self.regs.supported_pa_size();
        if requested > supported {
            return Err(BootError::UnsupportedPhysicalAddressSize { requested, supported });
        }

        let mair = Mair::boot();
        let tcr = Tcr::encode(&self.config.tcr)?;

        self.regs.write_mair(mair);
        self.regs.write_tcr(tcr);
        let (start, len) = self.tables.arena().span();
        self.regs.clean_dcache_range(start, len);
        self.regs.write_ttbr0(self.tables.root_address());
        self.regs.invalidate_tlb();

        self.fixmap.seal();
        self.regs.write_sctlr(Sctlr::mmu_enabled());
        self.state = BootState::MmuEnabled;
        Ok(())
    }

    /// MmuEnabled -> LevelTransitioned, or straight to Running when the core
    /// is already at the target level.
    ///
    /// From EL3 this programs HCR_EL2, SCR_EL3, SP_EL2, SPSR_EL3 and ELR_EL3
    /// and returns into `entry` at EL2 with interrupts masked. At EL2 it
    /// switches to `stack_top` and branches to `entry`. On hardware neither
    /// path comes back.
    ///
    /// # Safety
    ///
    /// `entry` and `stack_top` must be mapped by the live tables.
    pub unsafe fn enter_target_level(
        &mut self,
        entry: VAddr,
        stack_top: VAddr,
        args: &BootArgs,
    ) -> Result<BootState> {
        self.expect(BootState::MmuEnabled)?;

        let current = self.regs.current_el();
        let target = self.config.target_level;
        match current.cmp(&target) {
            Ordering::Greater if current == ExceptionLevel::El3 && target == ExceptionLevel::El2 => {
                self.regs.write_hcr(Hcr::boot());
                self.regs.write_scr(Scr::boot());
                self.regs.write_lower_sp(stack_top);
                self.regs.write_spsr(Spsr::boot(target));
                self.regs.write_elr(entry);
                self.state = BootState::LevelTransitioned;
                self.regs.exception_return(args.registers());
            }
            Ordering::Equal => {
                self.state = BootState::Running;
                self.regs.branch(entry, stack_top, args.registers());
            }
            _ => return Err(BootError::UnsupportedExceptionLevel { current, target }),
        }
        Ok(self.state)
    }

    /// LevelTransitioned -> Running.
    pub fn complete(&mut self) -> Result {
        self.expect(BootState::LevelTransitioned)?;
        self.state = BootState::Running;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::arch::arm64::mmu::PageTable;
    use crate::kernel::arch::arm64::registers::{MemoryAttribute, PhysicalAddressSize};
    use crate::kernel::arch::arm64::sysreg::{RecordingRegisters, RegisterWrite};
    use crate::kernel::config::BOOT_CONFIG;
    use crate::kernel::vm::PAGE_SIZE;
    use crate::platform::AUX_BASE;

    const LOAD_ADDR: PAddr = 0x8_0000;
    const STACK_PHYS: PAddr = 0x9_0000;
    const FDT: PAddr = 0x100;

    fn pool() -> Box<[PageTable]> {
        (0..16).map(|_| PageTable::new()).collect::<Vec<_>>().into_boxed_slice()
    }

    fn args() -> BootArgs {
        BootArgs::new(LOAD_ADDR.wrapping_sub(HYP_VIRT_START), FDT)
    }

    fn stack_top() -> VAddr {
        BOOT_STACK_VIRT_START + STACK_SIZE
    }

    fn prepared<'a>(storage: &'a mut [PageTable], el: ExceptionLevel) -> BootSequencer<'a, RecordingRegisters> {
        let mut seq =
            BootSequencer::new(RecordingRegisters::new(el), TableArena::new(storage), &BOOT_CONFIG).unwrap();
        seq.build_tables(&boot_ranges(&args(), STACK_PHYS)).unwrap();
        seq.populate_fixmap(&boot_fixmap_slots()).unwrap();
        seq
    }

    #[test]
    fn test_boot_args() {
        let args = args();
        assert_eq!(args.virt_to_phys(HYP_VIRT_START + 0x40), LOAD_ADDR + 0x40);
        assert_eq!(args.phys_to_virt(LOAD_ADDR), HYP_VIRT_START);
        assert_eq!(args.registers(), [args.boot_phys_offset, FDT]);
    }

    #[test]
    fn test_tables_cover_boot_mappings() {
        let mut storage = pool();
        let seq = prepared(&mut storage, ExceptionLevel::El2);
        let tables = seq.tables();

        let identity = tables.translate(LOAD_ADDR + 0x1234).unwrap();
        assert_eq!(identity.paddr, LOAD_ADDR + 0x1234);
        let hyp = tables.translate(HYP_VIRT_START + 0x1234).unwrap();
        assert_eq!(hyp.paddr, LOAD_ADDR + 0x1234);
        assert_eq!(hyp.access, AccessRights::RWX);

        let stack = tables.translate(stack_top() - 8).unwrap();
        assert_eq!(stack.paddr, STACK_PHYS + STACK_SIZE - 8);
        assert_eq!(stack.access, AccessRights::RW);

        let uart = tables.translate(FixmapDevice::MiniUart.virtual_base()).unwrap();
        assert_eq!(uart.paddr, AUX_BASE);
        assert_eq!(uart.attr_index, MemoryAttribute::DeviceNgnre.index());
        assert_eq!(seq.state(), BootState::FixmapReady);
    }

    #[test]
    fn test_el2_sequence() {
        let mut storage = pool();
        let mut seq = prepared(&mut storage, ExceptionLevel::El2);
        let root = seq.tables().root_address();
        let (start, len) = seq.tables().arena().span();
        assert_eq!(start, root);
        assert_eq!(len, seq.tables().arena().used() as u64 * PAGE_SIZE);

        unsafe { seq.enable_mmu().unwrap() };
        assert_eq!(seq.state(), BootState::MmuEnabled);
        assert!(seq.fixmap().is_live());

        let entry = HYP_VIRT_START + 0x800;
        let state = unsafe { seq.enter_target_level(entry, stack_top(), &args()) }.unwrap();
        assert_eq!(state, BootState::Running);

        assert_eq!(
            seq.regs.writes,
            [
                RegisterWrite::Mair(0x00FF_0400),
                RegisterWrite::Tcr(0x8082_3510),
                RegisterWrite::CleanCache { start, len },
                RegisterWrite::Ttbr0(root),
                RegisterWrite::TlbInvalidate,
                RegisterWrite::Sctlr(0x30C5_1835),
                RegisterWrite::Branch { entry, sp: stack_top(), args: args().registers() },
            ]
        );
    }

    #[test]
    fn test_el3_sequence() {
        let mut storage = pool();
        let mut seq = prepared(&mut storage, ExceptionLevel::El3);
        unsafe { seq.enable_mmu().unwrap() };
        let mmu_writes = seq.regs.writes.len();

        let entry = HYP_VIRT_START + 0x800;
        let state = unsafe { seq.enter_target_level(entry, stack_top(), &args()) }.unwrap();
        assert_eq!(state, BootState::LevelTransitioned);
        assert_eq!(
            seq.regs.writes[mmu_writes..],
            [
                RegisterWrite::Hcr(1 << 31),
                RegisterWrite::Scr(0x431),
                RegisterWrite::LowerSp(stack_top()),
                RegisterWrite::Spsr(0x1C9),
                RegisterWrite::Elr(entry),
                RegisterWrite::ExceptionReturn(args().registers()),
            ]
        );

        seq.complete().unwrap();
        assert_eq!(seq.state(), BootState::Running);
    }

    #[test]
    fn test_steps_refuse_out_of_order() {
        let mut storage = pool();
        let mut seq =
            BootSequencer::new(RecordingRegisters::new(ExceptionLevel::El2), TableArena::new(&mut storage), &BOOT_CONFIG)
                .unwrap();

        assert_eq!(
            unsafe { seq.enable_mmu() },
            Err(BootError::OutOfOrder { expected: BootState::FixmapReady, actual: BootState::Reset })
        );
        assert_eq!(
            seq.populate_fixmap(&boot_fixmap_slots()),
            Err(BootError::OutOfOrder { expected: BootState::TablesBuilt, actual: BootState::Reset })
        );
        assert!(seq.complete().is_err());

        seq.build_tables(&boot_ranges(&args(), STACK_PHYS)).unwrap();
        assert_eq!(
            seq.build_tables(&boot_ranges(&args(), STACK_PHYS)),
            Err(BootError::OutOfOrder { expected: BootState::Reset, actual: BootState::TablesBuilt })
        );
        assert!(matches!(
            unsafe { seq.enter_target_level(HYP_VIRT_START, stack_top(), &args()) },
            Err(BootError::OutOfOrder { expected: BootState::MmuEnabled, .. })
        ));
        assert!(seq.regs.writes.is_empty());
    }

    #[test]
    fn test_conflict_performs_no_register_writes() {
        let mut storage = pool();
        let mut seq =
            BootSequencer::new(RecordingRegisters::new(ExceptionLevel::El2), TableArena::new(&mut storage), &BOOT_CONFIG)
                .unwrap();
        let ranges = [
            MapRange::identity(0x1000, PAGE_SIZE, PageAttributes::normal(AccessRights::RWX)),
            MapRange::identity(0x1000, PAGE_SIZE, PageAttributes::device()),
        ];

        assert!(matches!(
            seq.build_tables(&ranges),
            Err(BootError::RangeConflict { vaddr: 0x1000, .. })
        ));
        assert_eq!(seq.state(), BootState::Reset);
        assert!(seq.populate_fixmap(&boot_fixmap_slots()).is_err());
        assert!(unsafe { seq.enable_mmu() }.is_err());
        assert!(seq.regs.writes.is_empty());
    }

    #[test]
    fn test_unsupported_pa_size() {
        let mut storage = pool();
        let mut seq = prepared(&mut storage, ExceptionLevel::El2);
        seq.regs.pa_size = PhysicalAddressSize::Bits36;

        assert_eq!(
            unsafe { seq.enable_mmu() },
            Err(BootError::UnsupportedPhysicalAddressSize {
                requested: PhysicalAddressSize::Bits40,
                supported: PhysicalAddressSize::Bits36,
            })
        );
        assert_eq!(seq.state(), BootState::FixmapReady);
        assert!(!seq.fixmap().is_live());
        assert!(seq.regs.writes.is_empty());
    }

    #[test]
    fn test_entry_below_target_level() {
        let mut storage = pool();
        let mut seq = prepared(&mut storage, ExceptionLevel::El1);
        assert_eq!(
            unsafe { seq.enable_mmu() },
            Err(BootError::UnsupportedExceptionLevel {
                current: ExceptionLevel::El1,
                target: ExceptionLevel::El2,
            })
        );
        assert!(seq.regs.writes.is_empty());
    }

    #[test]
    fn test_fixmap_slot_is_frozen_after_enable() {
        let mut storage = pool();
        let mut seq = prepared(&mut storage, ExceptionLevel::El2);
        unsafe { seq.enable_mmu().unwrap() };

        let slot = FixmapDevice::Gpio.slot();
        let BootSequencer { fixmap, tables, .. } = &mut seq;
        assert_eq!(fixmap.map_slot(tables, slot, FixmapDevice::Gpio.phys_page()), Ok(()));
        assert_eq!(
            fixmap.map_slot(tables, slot, AUX_BASE),
            Err(BootError::FixmapLive { slot })
        );
    }
}
