// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Virtual Memory Definitions
//!
//! Address types, page geometry and the static virtual layout of the
//! hypervisor image. Run-time memory management builds on top of this
//! later; nothing here allocates or frees.
//!
//! # Organization
//!
//! - [`layout`] - Virtual address layout of the hypervisor

pub mod layout;

/// Virtual address type
pub type VAddr = u64;

/// Physical address type
pub type PAddr = u64;

/// Page size shift (4 KiB granule)
pub const PAGE_SHIFT: u32 = 12;

/// Page size
pub const PAGE_SIZE: u64 = 1 << PAGE_SHIFT;

/// Mask for the offset within a page
pub const PAGE_MASK: u64 = PAGE_SIZE - 1;

/// Size covered by one level 2 entry (one full level 3 table)
pub const SECTION_SIZE: u64 = 1 << 21;

#[inline]
pub const fn is_page_aligned(addr: u64) -> bool {
    addr & PAGE_MASK == 0
}
