// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! BCM2837 GPIO Controller
//!
//! Only what the serial console needs: routing pins 14 and 15 to a UART
//! and switching their pull-up/down off.
//!
//! # Register Map
//!
//! | Offset | Name      | Description                      |
//! |--------|-----------|----------------------------------|
//! | 0x00   | GPFSEL0   | Function select, pins 0-9        |
//! | 0x04   | GPFSEL1   | Function select, pins 10-19      |
//! | 0x94   | GPPUD     | Pull-up/down control             |
//! | 0x98   | GPPUDCLK0 | Pull-up/down clock, pins 0-31    |

use crate::reg::{delay, read_reg32, write_reg32};

// ============================================================================
// Register Offsets
// ============================================================================

const GPFSEL0: usize = 0x00;
const GPPUD: usize = 0x94;
const GPPUDCLK0: usize = 0x98;

/// Setup time of the pull-up/down control signal, in cycles
const PULL_SETUP_CYCLES: u32 = 150;

pub const UART_TX_PIN: u32 = 14;
pub const UART_RX_PIN: u32 = 15;

/// Three-bit GPFSEL encodings
#[repr(u32)]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PinFunction {
    Input = 0b000,
    Output = 0b001,
    /// PL011 TXD0/RXD0 on pins 14/15
    Alt0 = 0b100,
    /// Mini UART TXD1/RXD1 on pins 14/15
    Alt5 = 0b010,
}

/// GPFSEL register holding `pin`.
const fn fsel_offset(pin: u32) -> usize {
    GPFSEL0 + (pin / 10) as usize * 4
}

/// `current` with the field of `pin` replaced by `function`.
pub const fn fsel_update(current: u32, pin: u32, function: PinFunction) -> u32 {
    let shift = (pin % 10) * 3;
    (current & !(0b111 << shift)) | ((function as u32) << shift)
}

pub struct Gpio {
    base: usize,
}

impl Gpio {
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    /// # Safety
    ///
    /// The register window must be mapped.
    pub unsafe fn select(&self, pin: u32, function: PinFunction) {
        let addr = self.base + fsel_offset(pin);
        write_reg32(addr, fsel_update(read_reg32(addr), pin, function));
    }

    /// Turn off pull-up/down for every pin set in `pins` (pins 0-31).
    ///
    /// # Safety
    ///
    /// The register window must be mapped.
    pub unsafe fn disable_pulls(&self, pins: u32) {
        write_reg32(self.base + GPPUD, 0);
        delay(PULL_SETUP_CYCLES);
        write_reg32(self.base + GPPUDCLK0, pins);
        delay(PULL_SETUP_CYCLES);
        write_reg32(self.base + GPPUDCLK0, 0);
    }

    /// Route pins 14/15 to the UART behind `function`.
    ///
    /// # Safety
    ///
    /// The register window must be mapped.
    pub unsafe fn setup_uart_pins(&self, function: PinFunction) {
        self.select(UART_TX_PIN, function);
        self.select(UART_RX_PIN, function);
        self.disable_pulls((1 << UART_TX_PIN) | (1 << UART_RX_PIN));
    }
}
