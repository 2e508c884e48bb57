// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Device Drivers
//!
//! Polling drivers for the early console. Each one takes its register window
//! as a base address, so the same driver runs from the physical address
//! before the MMU is on and from its fixmap slot afterwards.

// GPIO function select and pulls
pub mod gpio;

// UART drivers
pub mod uart;

#[cfg(test)]
pub(crate) mod testing {
    /// Word-addressed memory standing in for a register block
    pub struct FakeRegisters {
        words: Box<[u32]>,
        base: usize,
    }

    impl FakeRegisters {
        pub fn new() -> Self {
            let mut words = vec![0u32; 64].into_boxed_slice();
            let base = words.as_mut_ptr() as usize;
            Self { words, base }
        }

        pub fn base(&self) -> usize {
            self.base
        }

        pub fn get(&self, offset: usize) -> u32 {
            assert!(offset / 4 < self.words.len());
            unsafe { core::ptr::read_volatile((self.base() + offset) as *const u32) }
        }

        pub fn set(&mut self, offset: usize, value: u32) {
            assert!(offset / 4 < self.words.len());
            unsafe { core::ptr::write_volatile((self.base + offset) as *mut u32, value) }
        }
    }
}
