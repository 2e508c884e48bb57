// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM64 Boot Translation Tables
//!
//! Builds the EL2 stage 1 table tree used to turn the MMU on: the identity
//! map of the loaded image and the hypervisor virtual map share one level 0
//! root. Tables come from a fixed pool handed in by the caller; nothing is
//! ever freed.
//!
//! Runs from physical addresses with the MMU disabled, so a table's address
//! as seen by this code is its physical address. This code should stay
//! position independent: plain loops over integers and slices only.

use crate::err::{BootError, Result};
use crate::kernel::arch::arm64::mmu::{
    level_size, table_index, AccessRights, Descriptor, DescriptorKind, PageAttributes, PageTable,
    MMU_ENTRIES_PER_TABLE, MMU_LEVELS,
};
use crate::kernel::vm::{is_page_aligned, PAddr, VAddr, PAGE_MASK, PAGE_SIZE};

/// Tables reserved for the boot mappings
pub const BOOT_TABLE_COUNT: usize = 16;

/// Index of a table inside the arena
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct TableId(usize);

// ============================================================================
// Table Arena
// ============================================================================

/// Bump allocator over pre-reserved tables
pub struct TableArena<'a> {
    tables: &'a mut [PageTable],
    used: usize,
}

impl<'a> TableArena<'a> {
    pub fn new(tables: &'a mut [PageTable]) -> Self {
        Self { tables, used: 0 }
    }

    fn alloc(&mut self) -> Result<TableId> {
        if self.used == self.tables.len() {
            return Err(BootError::TablePoolExhausted);
        }
        let id = TableId(self.used);
        self.used += 1;

        // avoid memset: with the MMU off this is device memory, where
        // dc zva faults
        let slot = &mut self.tables[id.0] as *mut PageTable as *mut Descriptor;
        for i in 0..MMU_ENTRIES_PER_TABLE {
            unsafe { core::ptr::write_volatile(slot.add(i), Descriptor::INVALID) };
        }
        Ok(id)
    }

    fn base_address(&self) -> PAddr {
        self.tables.as_ptr() as PAddr
    }

    /// Address the hardware walker sees for `id`.
    pub fn phys_addr(&self, id: TableId) -> PAddr {
        self.base_address() + (id.0 as u64) * PAGE_SIZE
    }

    fn id_of(&self, paddr: PAddr) -> Option<TableId> {
        let offset = paddr.checked_sub(self.base_address())?;
        let index = (offset / PAGE_SIZE) as usize;
        (offset & PAGE_MASK == 0 && index < self.used).then_some(TableId(index))
    }

    pub fn table(&self, id: TableId) -> &PageTable {
        &self.tables[id.0]
    }

    fn table_mut(&mut self, id: TableId) -> &mut PageTable {
        &mut self.tables[id.0]
    }

    pub fn used(&self) -> usize {
        self.used
    }

    /// Start and length of the tables handed out so far.
    pub fn span(&self) -> (PAddr, u64) {
        (self.base_address(), self.used as u64 * PAGE_SIZE)
    }
}

// ============================================================================
// Mapping Ranges
// ============================================================================

/// One contiguous mapping request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MapRange {
    pub vaddr: VAddr,
    pub paddr: PAddr,
    pub size: u64,
    pub attrs: PageAttributes,
}

impl MapRange {
    pub const fn new(vaddr: VAddr, paddr: PAddr, size: u64, attrs: PageAttributes) -> Self {
        Self { vaddr, paddr, size, attrs }
    }

    /// Virtual address equal to physical address.
    pub const fn identity(paddr: PAddr, size: u64, attrs: PageAttributes) -> Self {
        Self::new(paddr, paddr, size, attrs)
    }

    fn page(&self, offset: u64) -> Descriptor {
        Descriptor::page(self.paddr + offset, self.attrs)
    }

    fn misaligned(&self) -> BootError {
        BootError::Misaligned { vaddr: self.vaddr, paddr: self.paddr, size: self.size }
    }
}

/// Result of a table walk
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Translation {
    pub paddr: PAddr,
    pub attr_index: u8,
    pub access: AccessRights,
    /// Level holding the leaf entry
    pub level: u8,
}

// ============================================================================
// Translation Tables
// ============================================================================

pub struct TranslationTables<'a> {
    arena: TableArena<'a>,
    root: TableId,
    va_limit: u64,
    pa_limit: u64,
}

impl<'a> TranslationTables<'a> {
    /// Take the level 0 root from `arena`.
    ///
    /// `va_limit` and `pa_limit` are the first addresses past the configured
    /// input and output ranges.
    pub fn new(mut arena: TableArena<'a>, va_limit: u64, pa_limit: u64) -> Result<Self> {
        let root = arena.alloc()?;
        Ok(Self { arena, root, va_limit, pa_limit })
    }

    /// Physical address of the level 0 table, for TTBR0.
    pub fn root_address(&self) -> PAddr {
        self.arena.phys_addr(self.root)
    }

    pub fn arena(&self) -> &TableArena<'a> {
        &self.arena
    }

    /// Validate every range, then install all of them.
    ///
    /// Nothing is written when any range is misaligned, out of range or
    /// disagrees with another range on a shared page.
    pub fn map_all(&mut self, ranges: &[MapRange]) -> Result {
        for range in ranges {
            self.check_range(range)?;
        }
        for (i, first) in ranges.iter().enumerate() {
            for second in &ranges[i + 1..] {
                check_overlap(first, second)?;
            }
        }
        for range in ranges {
            self.install(range)?;
        }
        Ok(())
    }

    /// Validate and install a single range.
    pub fn map_range(&mut self, range: &MapRange) -> Result {
        self.check_range(range)?;
        self.install(range)
    }

    pub(crate) fn check_range(&self, range: &MapRange) -> Result {
        if range.size == 0
            || !is_page_aligned(range.vaddr)
            || !is_page_aligned(range.paddr)
            || !is_page_aligned(range.size)
        {
            return Err(range.misaligned());
        }

        let out_of_range = BootError::AddressOutOfRange {
            vaddr: range.vaddr,
            paddr: range.paddr,
            size: range.size,
        };
        match (range.vaddr.checked_add(range.size), range.paddr.checked_add(range.size)) {
            (Some(vend), Some(pend)) if vend <= self.va_limit && pend <= self.pa_limit => Ok(()),
            _ => Err(out_of_range),
        }
    }

    fn install(&mut self, range: &MapRange) -> Result {
        let mut leaf: Option<TableId> = None;
        let mut offset = 0;
        while offset < range.size {
            let vaddr = range.vaddr + offset;
            let index = table_index(vaddr, 3);

            let table = match leaf {
                Some(table) if index != 0 => table,
                _ => self.walk_create(vaddr, 3)?,
            };
            leaf = Some(table);

            let requested = range.page(offset);
            let existing = self.arena.table(table).entry(index);
            if existing.is_valid() {
                if existing != requested {
                    return Err(BootError::RangeConflict {
                        vaddr,
                        existing: existing.bits(),
                        requested: requested.bits(),
                    });
                }
            } else {
                self.arena.table_mut(table).set_entry(index, requested);
            }
            offset += PAGE_SIZE;
        }
        Ok(())
    }

    /// Walk from the root to the table at `level` covering `vaddr`,
    /// allocating missing intermediate tables.
    pub fn walk_create(&mut self, vaddr: VAddr, level: u8) -> Result<TableId> {
        let mut table = self.root;
        for current in 0..level.min(MMU_LEVELS - 1) {
            let index = table_index(vaddr, current);
            let desc = self.arena.table(table).entry(index);
            table = match desc.kind(current) {
                DescriptorKind::Invalid => {
                    let child = self.arena.alloc()?;
                    let next = Descriptor::table(self.arena.phys_addr(child));
                    self.arena.table_mut(table).set_entry(index, next);
                    child
                }
                DescriptorKind::Table => match self.arena.id_of(desc.output_address()) {
                    Some(child) => child,
                    None => return Err(self.blocked(vaddr, current, desc)),
                },
                _ => return Err(self.blocked(vaddr, current, desc)),
            };
        }
        Ok(table)
    }

    fn blocked(&self, vaddr: VAddr, level: u8, desc: Descriptor) -> BootError {
        BootError::RangeConflict {
            vaddr: vaddr & !(level_size(level) - 1),
            existing: desc.bits(),
            requested: Descriptor::table(0).bits(),
        }
    }

    pub fn entry(&self, table: TableId, index: usize) -> Descriptor {
        self.arena.table(table).entry(index)
    }

    pub(crate) fn set_entry(&mut self, table: TableId, index: usize, desc: Descriptor) {
        self.arena.table_mut(table).set_entry(index, desc)
    }

    /// Resolve `vaddr` the way the hardware walker would.
    pub fn translate(&self, vaddr: VAddr) -> Option<Translation> {
        let mut table = self.root;
        for level in 0..MMU_LEVELS {
            let desc = self.arena.table(table).entry(table_index(vaddr, level));
            match desc.kind(level) {
                DescriptorKind::Table => table = self.arena.id_of(desc.output_address())?,
                DescriptorKind::Block | DescriptorKind::Page => {
                    let offset_mask = level_size(level) - 1;
                    return Some(Translation {
                        paddr: (desc.output_address() & !offset_mask) | (vaddr & offset_mask),
                        attr_index: desc.attr_index(),
                        access: desc.access(),
                        level,
                    });
                }
                DescriptorKind::Invalid | DescriptorKind::Reserved => return None,
            }
        }
        None
    }
}

/// Ranges sharing a virtual page must produce identical descriptors there.
fn check_overlap(first: &MapRange, second: &MapRange) -> Result {
    let start = first.vaddr.max(second.vaddr);
    let end = (first.vaddr + first.size).min(second.vaddr + second.size);
    if start >= end {
        return Ok(());
    }

    let existing = first.page(start - first.vaddr);
    let requested = second.page(start - second.vaddr);
    let same_offset = first.paddr.wrapping_sub(first.vaddr) == second.paddr.wrapping_sub(second.vaddr);
    if existing != requested || !same_offset {
        return Err(BootError::RangeConflict {
            vaddr: start,
            existing: existing.bits(),
            requested: requested.bits(),
        });
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::arch::arm64::registers::MemoryAttribute;

    const MIB: u64 = 1024 * 1024;
    const VA_LIMIT: u64 = 1 << 48;
    const PA_LIMIT: u64 = 1 << 40;

    fn pool(count: usize) -> Box<[PageTable]> {
        (0..count).map(|_| PageTable::new()).collect::<Vec<_>>().into_boxed_slice()
    }

    fn normal() -> PageAttributes {
        PageAttributes::normal(AccessRights::RWX)
    }

    #[test]
    fn test_identity_map_2mib() {
        let mut storage = pool(8);
        let mut tables = TranslationTables::new(TableArena::new(&mut storage), VA_LIMIT, PA_LIMIT).unwrap();
        tables.map_all(&[MapRange::identity(0, 2 * MIB, normal())]).unwrap();

        // root, level 1, level 2, level 3
        assert_eq!(tables.arena().used(), 4);
        let leaf = tables.walk_create(0, 3).unwrap();
        for index in 0..512 {
            let desc = tables.entry(leaf, index);
            assert_eq!(desc.kind(3), DescriptorKind::Page);
            assert_eq!(desc.output_address(), index as u64 * PAGE_SIZE);
            assert_eq!(desc.attr_index(), MemoryAttribute::NormalWriteBack.index());
        }
        assert_eq!(tables.arena().used(), 4);
    }

    #[test]
    fn test_translate_within_range() {
        let mut storage = pool(16);
        let mut tables = TranslationTables::new(TableArena::new(&mut storage), VA_LIMIT, PA_LIMIT).unwrap();
        let range = MapRange::new(0x80_0020_0000, 0x8_0000, 2 * MIB, normal());
        tables.map_all(&[range]).unwrap();

        for offset in [0, 0x1234, 0xF_FFF8, 2 * MIB - 1] {
            let t = tables.translate(range.vaddr + offset).unwrap();
            assert_eq!(t.paddr, range.paddr + offset);
            assert_eq!(t.level, 3);
            assert_eq!(t.access, AccessRights::RWX);
        }
        assert_eq!(tables.translate(range.vaddr + 2 * MIB), None);
        assert_eq!(tables.translate(range.vaddr - PAGE_SIZE), None);
    }

    #[test]
    fn test_range_crossing_tables() {
        let mut storage = pool(16);
        let mut tables = TranslationTables::new(TableArena::new(&mut storage), VA_LIMIT, PA_LIMIT).unwrap();
        let range = MapRange::identity(2 * MIB - 2 * PAGE_SIZE, 4 * PAGE_SIZE, normal());
        tables.map_all(&[range]).unwrap();

        for page in 0..4 {
            let va = range.vaddr + page * PAGE_SIZE;
            assert_eq!(tables.translate(va).map(|t| t.paddr), Some(va));
        }
        // root, level 1, level 2, two level 3 tables
        assert_eq!(tables.arena().used(), 5);
    }

    #[test]
    fn test_alignment_boundary() {
        let mut storage = pool(8);
        let mut tables = TranslationTables::new(TableArena::new(&mut storage), VA_LIMIT, PA_LIMIT).unwrap();

        let one_page = MapRange::identity(0x1000, PAGE_SIZE, normal());
        assert_eq!(tables.map_all(&[one_page]), Ok(()));

        let one_byte_over = MapRange::identity(0x4000, PAGE_SIZE + 1, normal());
        assert_eq!(
            tables.map_all(&[one_byte_over]),
            Err(BootError::Misaligned { vaddr: 0x4000, paddr: 0x4000, size: PAGE_SIZE + 1 })
        );

        let misaligned_base = MapRange::new(0x8000, 0x8800, PAGE_SIZE, normal());
        assert!(matches!(tables.map_range(&misaligned_base), Err(BootError::Misaligned { .. })));
        assert_eq!(tables.translate(0x4000), None);
    }

    #[test]
    fn test_conflicting_attributes() {
        let mut storage = pool(8);
        let mut tables = TranslationTables::new(TableArena::new(&mut storage), VA_LIMIT, PA_LIMIT).unwrap();
        let ranges = [
            MapRange::identity(0, 2 * PAGE_SIZE, normal()),
            MapRange::identity(0x1000, PAGE_SIZE, PageAttributes::device()),
        ];
        let err = tables.map_all(&ranges).unwrap_err();
        assert!(matches!(err, BootError::RangeConflict { vaddr: 0x1000, .. }));

        // validation happens before any table is touched
        assert_eq!(tables.arena().used(), 1);
        assert_eq!(tables.translate(0), None);
    }

    #[test]
    fn test_conflict_with_installed_page() {
        let mut storage = pool(8);
        let mut tables = TranslationTables::new(TableArena::new(&mut storage), VA_LIMIT, PA_LIMIT).unwrap();
        tables.map_range(&MapRange::identity(0x1000, PAGE_SIZE, normal())).unwrap();

        let remap = MapRange::new(0x1000, 0x5000, PAGE_SIZE, normal());
        assert!(matches!(
            tables.map_range(&remap),
            Err(BootError::RangeConflict { vaddr: 0x1000, .. })
        ));
        assert_eq!(tables.translate(0x1000).map(|t| t.paddr), Some(0x1000));
    }

    #[test]
    fn test_identical_overlap_is_accepted() {
        let mut storage = pool(8);
        let mut tables = TranslationTables::new(TableArena::new(&mut storage), VA_LIMIT, PA_LIMIT).unwrap();
        let ranges = [
            MapRange::identity(0, 4 * PAGE_SIZE, normal()),
            MapRange::identity(2 * PAGE_SIZE, 4 * PAGE_SIZE, normal()),
        ];
        assert_eq!(tables.map_all(&ranges), Ok(()));
        assert_eq!(tables.map_all(&ranges), Ok(()));
        assert_eq!(tables.translate(5 * PAGE_SIZE).map(|t| t.paddr), Some(5 * PAGE_SIZE));
    }

    #[test]
    fn test_address_limits() {
        let mut storage = pool(8);
        let mut tables = TranslationTables::new(TableArena::new(&mut storage), VA_LIMIT, PA_LIMIT).unwrap();
        let high_pa = MapRange::new(0x1000, PA_LIMIT, PAGE_SIZE, normal());
        assert!(matches!(tables.map_range(&high_pa), Err(BootError::AddressOutOfRange { .. })));
        let high_va = MapRange::new(VA_LIMIT - PAGE_SIZE, 0, 2 * PAGE_SIZE, normal());
        assert!(matches!(tables.map_range(&high_va), Err(BootError::AddressOutOfRange { .. })));
    }

    #[test]
    fn test_pool_exhaustion() {
        let mut storage = pool(3);
        let mut tables = TranslationTables::new(TableArena::new(&mut storage), VA_LIMIT, PA_LIMIT).unwrap();
        assert_eq!(
            tables.map_range(&MapRange::identity(0, PAGE_SIZE, normal())),
            Err(BootError::TablePoolExhausted)
        );
    }

    #[test]
    fn test_block_entry_blocks_walk() {
        let mut storage = pool(8);
        let mut tables = TranslationTables::new(TableArena::new(&mut storage), VA_LIMIT, PA_LIMIT).unwrap();
        let l2 = tables.walk_create(0, 2).unwrap();
        tables.set_entry(l2, 1, Descriptor::block(2 * MIB, normal()));

        let t = tables.translate(2 * MIB + 0x42).unwrap();
        assert_eq!(t.paddr, 2 * MIB + 0x42);
        assert_eq!(t.level, 2);
        assert!(matches!(
            tables.map_range(&MapRange::identity(2 * MIB, PAGE_SIZE, normal())),
            Err(BootError::RangeConflict { vaddr, .. }) if vaddr == 2 * MIB
        ));
    }

    #[test]
    fn test_table_outside_arena_blocks_walk() {
        let mut storage = pool(8);
        let mut tables = TranslationTables::new(TableArena::new(&mut storage), VA_LIMIT, PA_LIMIT).unwrap();
        let l1 = tables.walk_create(0, 1).unwrap();

        // Past the end of the pool, so not a table the tree owns.
        let (base, _) = tables.arena().span();
        let foreign = Descriptor::table(base + 64 * PAGE_SIZE);
        tables.set_entry(l1, 0, foreign);

        assert!(tables.translate(0x1000).is_none());
        assert!(matches!(
            tables.map_range(&MapRange::identity(0x1000, PAGE_SIZE, normal())),
            Err(BootError::RangeConflict { vaddr: 0, existing, .. }) if existing == foreign.bits()
        ));

        // An unused pool slot is not owned either.
        let unused = Descriptor::table(base + 7 * PAGE_SIZE);
        tables.set_entry(l1, 1, unused);
        assert!(tables.translate(1 << 30).is_none());
        assert!(tables.walk_create(1 << 30, 3).is_err());
    }
}
