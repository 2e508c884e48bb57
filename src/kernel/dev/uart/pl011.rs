// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! ARM PL011 UART Driver
//!
//! Polling driver for the PrimeCell PL011 (UART0 on BCM2837), 8N1 at
//! 115200 baud from the 3 MHz UART reference clock, FIFOs on, every
//! interrupt masked.
//!
//! # Register Map
//!
//! | Offset | Name    | Description                |
//! |--------|---------|----------------------------|
//! | 0x00   | DR      | Data Register              |
//! | 0x18   | FR      | Flag Register              |
//! | 0x24   | IBRD    | Integer Baud Rate Divisor  |
//! | 0x28   | FBRD    | Fractional Baud Rate Div.  |
//! | 0x2C   | LCRH    | Line Control Register      |
//! | 0x30   | CR      | Control Register           |
//! | 0x38   | IMSC    | Interrupt Mask Set/Clear   |
//! | 0x44   | ICR     | Interrupt Clear Register   |

use super::SerialConsole;
use crate::kernel::dev::gpio::{Gpio, PinFunction};
use crate::platform::UART0_CLOCK_HZ;
use crate::reg::{read_reg32, write_reg32};

// ============================================================================
// Register Offsets
// ============================================================================

const UART_DR: usize = 0x00; // Data Register
const UART_FR: usize = 0x18; // Flag Register
const UART_IBRD: usize = 0x24; // Integer Baud Rate Divisor
const UART_FBRD: usize = 0x28; // Fractional Baud Rate Divisor
const UART_LCRH: usize = 0x2C; // Line Control Register
const UART_CR: usize = 0x30; // Control Register
const UART_IMSC: usize = 0x38; // Interrupt Mask Set/Clear
const UART_ICR: usize = 0x44; // Interrupt Clear Register

// ============================================================================
// Register Bits
// ============================================================================

const FR_TXFF: u32 = 1 << 5; // TX FIFO Full
const FR_RXFE: u32 = 1 << 4; // RX FIFO Empty

const LCRH_FEN: u32 = 1 << 4; // FIFO Enable
const LCRH_WLEN_8: u32 = 0b11 << 5; // 8-bit words

const CR_RXE: u32 = 1 << 9; // RX Enable
const CR_TXE: u32 = 1 << 8; // TX Enable
const CR_UARTEN: u32 = 1 << 0; // UART Enable

/// CTS and every RX/TX/error interrupt
const IMSC_ALL: u32 = (1 << 1) | (0x7F << 4);
const ICR_ALL: u32 = 0x7FF;

pub const BAUD_RATE: u32 = 115_200;

/// IBRD and FBRD for `baud` from a `clock` reference, FBRD rounded.
pub const fn baud_divisors(clock: u32, baud: u32) -> (u32, u32) {
    let div = 16 * baud;
    let integer = clock / div;
    let fraction = ((clock % div) * 64 + div / 2) / div;
    (integer, fraction)
}

pub struct Pl011 {
    base: usize,
}

impl Pl011 {
    pub const fn new(base: usize) -> Self {
        Self { base }
    }

    pub fn base(&self) -> usize {
        self.base
    }

    /// # Safety
    ///
    /// Both register windows must be mapped.
    pub unsafe fn init(&mut self, gpio: &Gpio) {
        write_reg32(self.base + UART_CR, 0);

        gpio.setup_uart_pins(PinFunction::Alt0);

        write_reg32(self.base + UART_ICR, ICR_ALL);
        let (ibrd, fbrd) = baud_divisors(UART0_CLOCK_HZ, BAUD_RATE);
        write_reg32(self.base + UART_IBRD, ibrd);
        write_reg32(self.base + UART_FBRD, fbrd);
        write_reg32(self.base + UART_LCRH, LCRH_FEN | LCRH_WLEN_8);
        write_reg32(self.base + UART_IMSC, IMSC_ALL);
        write_reg32(self.base + UART_CR, CR_UARTEN | CR_TXE | CR_RXE);
    }
}

impl SerialConsole for Pl011 {
    fn putc(&mut self, c: u8) {
        unsafe {
            // Wait while TX FIFO is full
            while read_reg32(self.base + UART_FR) & FR_TXFF != 0 {
                core::hint::spin_loop();
            }
            write_reg32(self.base + UART_DR, c as u32);
        }
    }

    fn try_getc(&mut self) -> Option<u8> {
        unsafe {
            if read_reg32(self.base + UART_FR) & FR_RXFE == 0 {
                Some(read_reg32(self.base + UART_DR) as u8)
            } else {
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kernel::dev::testing::FakeRegisters;

    #[test]
    fn test_baud_divisors() {
        assert_eq!(baud_divisors(UART0_CLOCK_HZ, BAUD_RATE), (1, 40));
        assert_eq!(baud_divisors(48_000_000, BAUD_RATE), (26, 3));
    }

    #[test]
    fn test_init_programs_uart() {
        let uart0 = FakeRegisters::new();
        let gpio_regs = FakeRegisters::new();
        let mut uart = Pl011::new(uart0.base());
        unsafe { uart.init(&Gpio::new(gpio_regs.base())) };

        assert_eq!(uart0.get(UART_ICR), 0x7FF);
        assert_eq!(uart0.get(UART_IBRD), 1);
        assert_eq!(uart0.get(UART_FBRD), 40);
        assert_eq!(uart0.get(UART_LCRH), 0x70);
        assert_eq!(uart0.get(UART_IMSC), 0x7F2);
        assert_eq!(uart0.get(UART_CR), 0x301);
        assert_eq!(gpio_regs.get(0x04), (4 << 12) | (4 << 15));
    }

    #[test]
    fn test_putc_and_getc() {
        let mut uart0 = FakeRegisters::new();
        let mut uart = Pl011::new(uart0.base());

        uart0.set(UART_FR, FR_RXFE);
        assert_eq!(uart.try_getc(), None);

        uart0.set(UART_FR, 0);
        uart0.set(UART_DR, b'z' as u32);
        assert_eq!(uart.try_getc(), Some(b'z'));

        uart.putc(b'?');
        assert_eq!(uart0.get(UART_DR), b'?' as u32);
    }
}
