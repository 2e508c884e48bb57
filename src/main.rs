// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Rustux Hypervisor - Main Entry Point
//!
//! The image starts in `start.S`, which calls
//! `kernel::init::arm64_boot_main` with the MMU off. Host builds compile the
//! same tree against std to run the unit tests.

#![cfg_attr(not(test), no_std)]
#![cfg_attr(not(test), no_main)]

pub mod bits;
pub mod err;
pub mod kernel;
pub mod platform;
pub mod reg;

/// Panic handler
///
/// Logs the panic through the console logger, if it is installed, and
/// parks the core.
#[cfg(not(test))]
#[panic_handler]
fn panic(info: &core::panic::PanicInfo) -> ! {
    log::error!("panic: {}", info);
    kernel::arch::arm64::halt()
}
