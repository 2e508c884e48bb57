// Copyright 2025 The Rustux Authors
//
// Use of this source code is governed by a MIT-style
// license that can be found in the LICENSE file or at
// https://opensource.org/licenses/MIT

//! UART Drivers
//!
//! Polling serial drivers for the early console.
//!
//! # Supported UARTs
//!
//! - **Mini UART**: BCM2837 auxiliary UART1, the default console
//! - **PL011**: ARM PrimeCell PL011 UART0, selected by `pl011-console`
//!
//! The output helpers on [`SerialConsole`] avoid `core::fmt`, so they are
//! usable before the MMU is on.

pub mod mini_uart;
pub mod pl011;

pub use mini_uart::MiniUart;
pub use pl011::Pl011;

pub trait SerialConsole {
    /// Write one byte, waiting for room in the transmitter.
    fn putc(&mut self, c: u8);

    /// Read one byte if one is waiting.
    fn try_getc(&mut self) -> Option<u8>;

    /// Wait for a byte.
    fn getc(&mut self) -> u8 {
        loop {
            if let Some(c) = self.try_getc() {
                return c;
            }
            core::hint::spin_loop();
        }
    }

    /// Write `s`, expanding `\n` to `\r\n`.
    fn puts(&mut self, s: &str) {
        for c in s.bytes() {
            if c == b'\n' {
                self.putc(b'\r');
            }
            self.putc(c);
        }
    }

    /// Write `value` as `0x` and 16 hex digits.
    fn put_hex(&mut self, value: u64) {
        self.putc(b'0');
        self.putc(b'x');
        for shift in (0..16).rev() {
            let nibble = ((value >> (shift * 4)) & 0xf) as u8;
            self.putc(if nibble < 10 { b'0' + nibble } else { b'a' + nibble - 10 });
        }
    }
}

/// The console selected at build time
pub enum EarlyConsole {
    MiniUart(MiniUart),
    Pl011(Pl011),
}

impl SerialConsole for EarlyConsole {
    fn putc(&mut self, c: u8) {
        match self {
            EarlyConsole::MiniUart(uart) => uart.putc(c),
            EarlyConsole::Pl011(uart) => uart.putc(c),
        }
    }

    fn try_getc(&mut self) -> Option<u8> {
        match self {
            EarlyConsole::MiniUart(uart) => uart.try_getc(),
            EarlyConsole::Pl011(uart) => uart.try_getc(),
        }
    }
}
