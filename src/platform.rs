// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! Platform Definitions
//!
//! Raspberry Pi 3 (BCM2837) peripheral addresses as seen by the ARM cores.

use crate::kernel::vm::PAddr;

/// Start of the peripheral window
pub const PERIPHERAL_BASE: PAddr = 0x3F00_0000;

/// GPIO controller
pub const GPIO_BASE: PAddr = PERIPHERAL_BASE + 0x20_0000;

/// PL011 UART0
pub const UART0_BASE: PAddr = PERIPHERAL_BASE + 0x20_1000;

/// Auxiliary peripherals (mini UART, SPI1/2)
pub const AUX_BASE: PAddr = PERIPHERAL_BASE + 0x21_5000;

/// Core clock feeding the mini UART baud generator
pub const SYSTEM_CLOCK_HZ: u32 = 250_000_000;

/// Reference clock of the PL011
pub const UART0_CLOCK_HZ: u32 = 3_000_000;
